//! GC scenarios driven through the embedding API, with a free hook recording
//! exactly which boxes each collection reclaims.

use std::cell::RefCell;
use std::rc::Rc;

use alder::runtime::ops::new_u8;
use alder::runtime::values::{car, new_cons};
use alder::Task;
use alder_gc::Any;

struct FreedLog(Rc<RefCell<Vec<usize>>>);

impl FreedLog {
    fn install(task: &mut Task) -> FreedLog {
        let freed = Rc::new(RefCell::new(Vec::new()));
        let hook_freed = freed.clone();
        task.heap
            .set_free_hook(move |payload| hook_freed.borrow_mut().push(payload.as_ptr() as usize));
        FreedLog(freed)
    }

    fn count(&self) -> usize {
        self.0.borrow().len()
    }

    fn contains(&self, any: Any) -> bool {
        let addr = unsafe { any.as_raw_ptr() } as usize;
        self.0.borrow().contains(&addr)
    }
}

#[test]
fn simple_unreferenced_is_collected() {
    let mut task = Task::new();
    let freed = FreedLog::install(&mut task);

    let cell = new_cons(&mut task, Any::nil(), Any::nil());
    task.collect();

    assert_eq!(freed.count(), 1);
    assert!(freed.contains(cell));
    assert_eq!(task.heap.num_boxes(), 0);
}

#[test]
fn simple_referenced_is_not_collected() {
    let mut task = Task::new();
    let freed = FreedLog::install(&mut task);

    let mut cell = new_cons(&mut task, new_u8(7), Any::nil());
    task.push_root_frame();
    unsafe {
        task.root_any(&mut cell);
    }
    task.collect();

    assert_eq!(freed.count(), 0);
    assert!(alder::runtime::ops::equals(car(cell), new_u8(7)));

    task.pop_root_frame();
    task.collect();
    assert_eq!(freed.count(), 1);
}

#[test]
fn nested_list_collected_as_a_whole() {
    let mut task = Task::new();
    let freed = FreedLog::install(&mut task);

    let inner = new_cons(&mut task, Any::nil(), Any::nil());
    let mut outer = new_cons(&mut task, inner, Any::nil());

    task.push_root_frame();
    unsafe {
        task.root_any(&mut outer);
    }
    task.collect();
    assert_eq!(freed.count(), 0);

    task.pop_root_frame();
    task.collect();
    assert_eq!(freed.count(), 2);
    assert!(freed.contains(inner));
    assert!(freed.contains(outer));
}

#[test]
fn source_map_keys_are_roots() {
    let mut task = Task::new();
    let freed = FreedLog::install(&mut task);

    let form = alder::read(&mut task, "(keep these cells)").unwrap();
    task.collect();

    // Every cons of the read form is keyed in the source map and survives.
    assert_eq!(freed.count(), 0);
    assert!(alder::runtime::values::is_cons(form));

    task.module.clear_sourcemap();
    task.collect();
    assert_eq!(freed.count(), 3);
}
