//! GC tests.
//!
//! Exercises descriptor interning plus the collection scenarios that could
//! cause leaks or corruption: rooted retention, weak clearing, interior
//! pointers, cycles.

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::mem::{offset_of, size_of};
use core::ptr::NonNull;

use crate::{Any, BoxHeader, Heap, Kind, RootStack, StructField, TypeRef, TypeRegistry};

/// A cons-like test object: two `Any` fields, stored boxed.
#[repr(C)]
struct Pair {
    head: Any,
    tail: Any,
}

struct TestTypes {
    any: TypeRef,
    boxed_pair: TypeRef,
    weak_pair: TypeRef,
    boxed_any_array: TypeRef,
    tail_ptr: TypeRef,
}

fn test_types() -> TestTypes {
    let mut registry = TypeRegistry::new();
    let any = registry.simple(Kind::Any, size_of::<Any>());
    let pair = registry.struct_type(
        Some("pair"),
        size_of::<Pair>(),
        vec![
            StructField::new(any, "head", offset_of!(Pair, head)),
            StructField::new(any, "tail", offset_of!(Pair, tail)),
        ],
    );
    let boxed_pair = registry.boxed(pair);
    let weak_pair = registry.weak(boxed_pair);
    let boxed_any_array = registry.boxed_array(any, 0);
    let tail_ptr = registry.box_ptr(any, pair, offset_of!(Pair, tail));
    TestTypes { any, boxed_pair, weak_pair, boxed_any_array, tail_ptr }
}

/// Heap with a free hook recording every reclaimed payload address.
struct TestHeap {
    heap: Heap,
    freed: Rc<RefCell<Vec<usize>>>,
}

fn test_heap() -> TestHeap {
    let freed = Rc::new(RefCell::new(Vec::new()));
    let mut heap = Heap::new();
    let hook_freed = freed.clone();
    heap.set_free_hook(move |payload| hook_freed.borrow_mut().push(payload.as_ptr() as usize));
    TestHeap { heap, freed }
}

impl TestHeap {
    fn num_freed(&self) -> usize {
        self.freed.borrow().len()
    }

    fn was_freed(&self, any: Any) -> bool {
        let addr = unsafe { any.as_raw_ptr() } as usize;
        self.freed.borrow().contains(&addr)
    }

    fn collect(&mut self, roots: &RootStack) {
        self.heap.collect(|tracer| roots.visit(tracer));
    }
}

fn new_pair(heap: &mut Heap, tt: &TestTypes, head: Any, tail: Any) -> Any {
    let payload = heap.alloc(size_of::<Pair>());
    unsafe {
        let pair = payload.as_ptr() as *mut Pair;
        (*pair).head = head;
        (*pair).tail = tail;
    }
    Any::from_ptr(tt.boxed_pair, payload.as_ptr())
}

unsafe fn pair_mut(any: Any) -> *mut Pair {
    any.as_raw_ptr() as *mut Pair
}

fn new_any_array(heap: &mut Heap, tt: &TestTypes, length: usize) -> Any {
    let payload = heap.alloc(size_of::<usize>() + length * size_of::<Any>());
    unsafe {
        *(payload.as_ptr() as *mut usize) = length;
    }
    Any::from_ptr(tt.boxed_any_array, payload.as_ptr())
}

unsafe fn array_set(array: Any, index: usize, value: Any) {
    let base = array.as_raw_ptr().add(size_of::<usize>()) as *mut Any;
    *base.add(index) = value;
}

unsafe fn array_get(array: Any, index: usize) -> Any {
    let base = array.as_raw_ptr().add(size_of::<usize>()) as *const Any;
    *base.add(index)
}

unsafe fn root_any(roots: &mut RootStack, tt: &TestTypes, any: &mut Any) {
    roots.push_slot(NonNull::from(any).cast(), tt.any);
}

// ============================================================================
// Descriptor interning
// ============================================================================

#[test]
fn test_simple_types_interned() {
    let mut registry = TypeRegistry::new();
    let a = registry.simple(Kind::Unsigned, 4);
    let b = registry.simple(Kind::Unsigned, 4);
    assert!(core::ptr::eq(a, b));
    assert_eq!(a.desc(), "u32");

    let c = registry.simple(Kind::Unsigned, 8);
    assert!(!core::ptr::eq(a, c));
    let d = registry.simple(Kind::Signed, 4);
    assert!(!core::ptr::eq(a, d));
}

#[test]
fn test_array_types_interned() {
    let mut registry = TypeRegistry::new();
    let u32t = registry.simple(Kind::Unsigned, 4);
    let any = registry.simple(Kind::Any, size_of::<Any>());

    assert!(core::ptr::eq(registry.array(u32t, 8), registry.array(u32t, 8)));
    assert!(!core::ptr::eq(registry.array(u32t, 8), registry.array(u32t, 7)));
    assert_eq!(registry.array(u32t, 8).size(), 32);
    assert_eq!(registry.array(u32t, 0).size(), 0);

    let boxed = registry.boxed_array(any, 0);
    assert!(core::ptr::eq(boxed, registry.boxed_array(any, 0)));
}

#[test]
fn test_struct_types_interned() {
    let mut registry = TypeRegistry::new();
    let any = registry.simple(Kind::Any, size_of::<Any>());

    let fields = || {
        vec![
            StructField::new(any, "head", 0),
            StructField::new(any, "tail", size_of::<Any>()),
        ]
    };
    let a = registry.struct_type(Some("pair"), size_of::<Pair>(), fields());
    let b = registry.struct_type(Some("pair"), size_of::<Pair>(), fields());
    assert!(core::ptr::eq(a, b));
    assert_eq!(a.desc(), "struct pair");

    // Same shape, different field name: distinct descriptor.
    let c = registry.struct_type(
        Some("pair"),
        size_of::<Pair>(),
        vec![
            StructField::new(any, "first", 0),
            StructField::new(any, "tail", size_of::<Any>()),
        ],
    );
    assert!(!core::ptr::eq(a, c));
}

#[test]
fn test_weak_types() {
    let mut registry = TypeRegistry::new();
    let any = registry.simple(Kind::Any, size_of::<Any>());
    let pair = registry.struct_type(
        Some("pair"),
        size_of::<Pair>(),
        vec![
            StructField::new(any, "head", 0),
            StructField::new(any, "tail", size_of::<Any>()),
        ],
    );
    let boxed = registry.boxed(pair);
    let weak = registry.weak(boxed);

    assert!(weak.is_weak());
    assert_eq!(weak.kind(), Kind::Ptr);
    assert!(weak.box_type().is_some());
    // Weakening is idempotent.
    assert!(core::ptr::eq(registry.weak(weak), weak));
    assert!(core::ptr::eq(registry.weak_boxed(pair), weak));
}

#[test]
fn test_gc_mark_flag_propagation() {
    let mut registry = TypeRegistry::new();
    let any = registry.simple(Kind::Any, size_of::<Any>());
    let u8t = registry.simple(Kind::Unsigned, 1);
    let u64t = registry.simple(Kind::Unsigned, 8);

    // Scalar-only subgraphs are never traced.
    assert!(!u8t.needs_gc_mark());
    assert!(!registry.array(u8t, 0).needs_gc_mark());
    assert!(!registry.ptr(u64t).needs_gc_mark());
    let bytes = registry.array(u8t, 0);
    let chars_struct = registry.struct_type(
        Some("string"),
        0,
        vec![StructField::new(bytes, "chars", 0)],
    );
    assert!(!chars_struct.needs_gc_mark());

    // Anything that can transitively reach a box carries the flag.
    assert!(any.needs_gc_mark());
    assert!(registry.array(any, 0).needs_gc_mark());
    assert!(registry.boxed(chars_struct).needs_gc_mark());
    assert!(registry.ptr(any).needs_gc_mark());
    let holder = registry.struct_type(
        Some("holder"),
        size_of::<Any>() + 8,
        vec![
            StructField::new(u64t, "id", 0),
            StructField::new(any, "value", 8),
        ],
    );
    assert!(holder.needs_gc_mark());
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_alloc_linkage() {
    let mut heap = Heap::new();
    let first = heap.alloc(16);
    let second = heap.alloc(32);

    unsafe {
        let second_header = BoxHeader::from_payload(second.as_ptr(), 0);
        let first_header = BoxHeader::from_payload(first.as_ptr(), 0);
        assert_eq!(heap.head_box(), second_header);
        assert_eq!((*second_header).next(), first_header);
        assert_eq!((*first_header).next(), core::ptr::null_mut());
        assert_eq!((*second_header).alloc_size(), 32);
    }
    assert_eq!(heap.num_boxes(), 2);
    assert!(heap.bytes_allocated() > 48);
}

#[test]
fn test_alloc_zero_filled() {
    let mut heap = Heap::new();
    let payload = heap.alloc(size_of::<Pair>());
    unsafe {
        let pair = &*(payload.as_ptr() as *const Pair);
        assert!(pair.head.is_nil());
        assert!(pair.tail.is_nil());
    }
}

// ============================================================================
// Collection
// ============================================================================

#[test]
fn test_unreferenced_is_collected() {
    let tt = test_types();
    let mut th = test_heap();

    let pair = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    assert_eq!(th.heap.num_boxes(), 1);

    th.collect(&RootStack::new());

    assert_eq!(th.heap.num_boxes(), 0);
    assert_eq!(th.num_freed(), 1);
    assert!(th.was_freed(pair));
}

#[test]
fn test_referenced_is_not_collected() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let mut pair = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut pair);
    }

    th.collect(&roots);

    assert_eq!(th.heap.num_boxes(), 1);
    assert_eq!(th.num_freed(), 0);
    unsafe {
        assert!((*pair_mut(pair)).head.is_nil());
    }

    // Mark bits are cleared by the sweep.
    unsafe {
        assert!(!(*heap_header(pair)).is_marked());
    }

    roots.pop_frame();
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 0);
    assert!(th.was_freed(pair));
}

unsafe fn heap_header(any: Any) -> *mut BoxHeader {
    BoxHeader::from_payload(any.as_raw_ptr(), 0)
}

#[test]
fn test_transitive_retention() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let inner = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let mut outer = new_pair(&mut th.heap, &tt, inner, Any::nil());

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut outer);
    }
    th.collect(&roots);

    assert_eq!(th.heap.num_boxes(), 2);
    assert_eq!(th.num_freed(), 0);
}

#[test]
fn test_cycle_is_collected() {
    let tt = test_types();
    let mut th = test_heap();

    let a = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let b = new_pair(&mut th.heap, &tt, Any::nil(), a);
    unsafe {
        (*pair_mut(a)).tail = b;
    }

    th.collect(&RootStack::new());

    assert_eq!(th.heap.num_boxes(), 0);
    assert_eq!(th.num_freed(), 2);
}

#[test]
fn test_rooted_cycle_survives() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let mut a = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let b = new_pair(&mut th.heap, &tt, Any::nil(), a);
    unsafe {
        (*pair_mut(a)).tail = b;
    }

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut a);
    }
    th.collect(&roots);

    assert_eq!(th.heap.num_boxes(), 2);
    assert_eq!(th.num_freed(), 0);
}

#[test]
fn test_deep_list_collects_without_leaks() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let mut head = Any::nil();
    for _ in 0..1000 {
        head = new_pair(&mut th.heap, &tt, Any::nil(), head);
    }
    assert_eq!(th.heap.num_boxes(), 1000);

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut head);
    }
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 1000);

    roots.pop_frame();
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 0);
    assert_eq!(th.num_freed(), 1000);
}

#[test]
fn test_zero_length_array() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let mut array = new_any_array(&mut th.heap, &tt, 0);
    unsafe {
        assert_eq!(*(array.as_raw_ptr() as *const usize), 0);
    }

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut array);
    }
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 1);
}

#[test]
fn test_free_all() {
    let tt = test_types();
    let mut th = test_heap();

    for _ in 0..10 {
        new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    }
    assert_eq!(th.heap.num_boxes(), 10);

    th.heap.free_all();
    assert_eq!(th.heap.num_boxes(), 0);
    assert_eq!(th.heap.bytes_allocated(), 0);
    assert_eq!(th.num_freed(), 10);
}

// ============================================================================
// Weak references
// ============================================================================

#[test]
fn test_weak_slot_cleared_when_referent_dies() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let pair = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let mut array = new_any_array(&mut th.heap, &tt, 2);
    unsafe {
        array_set(array, 0, pair);
        array_set(array, 1, pair.with_type(tt.weak_pair));
    }

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut array);
    }

    // The strong element keeps the pair alive; the weak one still reads it.
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 2);
    unsafe {
        assert!(!array_get(array, 1).is_nil());
    }

    // Drop the strong reference; the weak slot must read as nil afterwards.
    unsafe {
        array_set(array, 0, Any::nil());
    }
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 1);
    assert!(th.was_freed(pair));
    unsafe {
        assert!(array_get(array, 1).is_nil());
    }
}

#[test]
fn test_weak_to_already_dead_referent() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let pair = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let mut array = new_any_array(&mut th.heap, &tt, 1);
    unsafe {
        array_set(array, 0, pair.with_type(tt.weak_pair));
    }

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut array);
    }
    th.collect(&roots);

    assert!(th.was_freed(pair));
    unsafe {
        assert!(array_get(array, 0).is_nil());
    }
}

#[test]
fn test_weak_root_slot_cleared() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let pair = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let mut weak = pair.with_type(tt.weak_pair);

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut weak);
    }
    th.collect(&roots);

    // Only a weak reference was registered, so the pair dies and the rooted
    // slot itself is rewritten to nil.
    assert_eq!(th.heap.num_boxes(), 0);
    assert!(weak.is_nil());
}

#[test]
fn test_weak_referent_survives_when_strongly_held() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let mut pair = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let mut weak = pair.with_type(tt.weak_pair);

    roots.push_frame();
    unsafe {
        root_any(&mut roots, &tt, &mut pair);
        root_any(&mut roots, &tt, &mut weak);
    }
    th.collect(&roots);

    assert_eq!(th.heap.num_boxes(), 1);
    assert!(!weak.is_nil());
    unsafe {
        assert_eq!(weak.as_raw_ptr(), pair.as_raw_ptr());
    }
}

// ============================================================================
// Interior pointers
// ============================================================================

#[test]
fn test_interior_pointer_keeps_box_alive() {
    let tt = test_types();
    let mut th = test_heap();
    let mut roots = RootStack::new();

    let head_value = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let tail_value = new_pair(&mut th.heap, &tt, Any::nil(), Any::nil());
    let outer = new_pair(&mut th.heap, &tt, head_value, tail_value);

    // Point into the middle of the outer box and root only that pointer.
    let mut interior: *mut u8 =
        unsafe { outer.as_raw_ptr().add(offset_of!(Pair, tail)) };

    roots.push_frame();
    unsafe {
        roots.push_slot(NonNull::from(&mut interior).cast(), tt.tail_ptr);
    }
    th.collect(&roots);

    // The whole box stays alive, and so does everything it references.
    assert_eq!(th.heap.num_boxes(), 3);
    assert_eq!(th.num_freed(), 0);
    unsafe {
        assert!(!(*pair_mut(outer)).head.is_nil());
        assert!(!(*pair_mut(outer)).tail.is_nil());
    }

    roots.pop_frame();
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 0);
}

#[test]
fn test_scalar_subgraph_not_traced() {
    // A box typed as raw bytes has no mark flag; tracing a pointer to it
    // still marks the box itself but never descends into the payload.
    let mut registry = TypeRegistry::new();
    let u8t = registry.simple(Kind::Unsigned, 1);
    let bytes = registry.array(u8t, 0);
    let boxed_bytes = registry.boxed(bytes);

    let mut th = test_heap();
    let payload = th.heap.alloc(size_of::<usize>() + 4);
    unsafe {
        *(payload.as_ptr() as *mut usize) = 4;
        // Garbage that would crash the tracer if interpreted as pointers.
        payload.as_ptr().add(size_of::<usize>()).write_bytes(0xAB, 4);
    }
    let mut ptr: *mut u8 = payload.as_ptr();

    let mut roots = RootStack::new();
    roots.push_frame();
    unsafe {
        roots.push_slot(NonNull::from(&mut ptr).cast(), boxed_bytes);
    }
    th.collect(&roots);
    assert_eq!(th.heap.num_boxes(), 1);
}
