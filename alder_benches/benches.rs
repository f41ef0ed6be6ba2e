use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use alder::runtime::ops::new_i64;
use alder::runtime::values::{array_set, new_array, new_cons};
use alder::{types, Task};

fn bench_descriptor_interning(c: &mut Criterion) {
    let t = types();
    c.bench_function("intern_array_descriptor", |b| {
        b.iter(|| black_box(t.array(t.u32, 8)))
    });
    c.bench_function("intern_boxed_any_array", |b| {
        b.iter(|| black_box(t.boxed_array(t.any, 0)))
    });
}

fn bench_symbol_interning(c: &mut Criterion) {
    c.bench_function("intern_symbol_hit", |b| {
        alder::intern_symbol("bench-symbol");
        b.iter(|| black_box(alder::intern_symbol("bench-symbol")))
    });
}

fn bench_alloc_collect(c: &mut Criterion) {
    c.bench_function("alloc_and_collect_1000_conses", |b| {
        b.iter(|| {
            let mut task = Task::new();
            let mut head = alder_gc::Any::nil();
            for i in 0..1000 {
                head = new_cons(&mut task, new_i64(i), head);
            }
            task.push_root_frame();
            unsafe {
                task.root_any(&mut head);
            }
            task.collect();
            task.pop_root_frame();
            task.collect();
            black_box(task.heap.num_boxes())
        })
    });
}

fn bench_rooted_array_survival(c: &mut Criterion) {
    c.bench_function("collect_rooted_array", |b| {
        let mut task = Task::new();
        let t = types();
        let mut array = new_array(&mut task, 64, t.boxed_array(t.any, 0));
        for i in 0..64 {
            let cell = new_cons(&mut task, new_i64(i), alder_gc::Any::nil());
            array_set(array, i as usize, cell);
        }
        task.push_root_frame();
        unsafe {
            task.root_any(&mut array);
        }
        b.iter(|| {
            task.collect();
            black_box(task.heap.num_boxes())
        });
        task.pop_root_frame();
    });
}

criterion_group!(
    benches,
    bench_descriptor_interning,
    bench_symbol_interning,
    bench_alloc_collect,
    bench_rooted_array_survival
);
criterion_main!(benches);
