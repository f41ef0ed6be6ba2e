//! Heap - the managed allocator and stop-the-world collector.
//!
//! Design:
//! - Uses the global allocator for box memory (zero-filled on allocation)
//! - Maintains an intrusive linked list of all allocated boxes
//! - Collection is descriptor-driven: the tracer recurses over `Type`
//!   structure, marking every box reachable from the roots
//! - Weak edges are recorded during marking and resolved before the sweep,
//!   so a cleared slot never observes a freed referent
//!
//! The runtime provides root enumeration through the callback passed to
//! `collect`; the standard provider is `RootStack::visit`.

use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::{self, NonNull};

use crate::{
    box_header::{link_next, link_set_next, BoxHeader},
    types::{Kind, TypeData, TypeRef},
    value::Any,
};

/// A weak-edge site recorded during the mark phase.
///
/// `slot` is the pointer field itself; `desc_slot` is additionally set when
/// the field sits inside an `Any`, so the descriptor can be cleared too and
/// the slot reads as nil afterwards.
struct WeakEdge {
    slot: *mut *mut u8,
    desc_slot: Option<*mut Option<TypeRef>>,
    ty: TypeRef,
}

/// The managed heap of one task.
pub struct Heap {
    /// Head link of the all-boxes list. Works like a box header link word
    /// whose mark bit is always clear.
    head_link: usize,

    /// Number of boxes currently allocated.
    num_boxes: usize,

    /// Bytes currently allocated, headers included.
    bytes_allocated: usize,

    /// Weak-edge sites recorded during the current mark phase.
    weak_edges: Vec<WeakEdge>,

    /// Observes every freed box payload before deallocation. Used by tests.
    free_hook: Option<Box<dyn FnMut(NonNull<u8>)>>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            head_link: 0,
            num_boxes: 0,
            bytes_allocated: 0,
            weak_edges: Vec::new(),
            free_hook: None,
        }
    }

    /// Number of boxes currently allocated.
    #[inline]
    pub fn num_boxes(&self) -> usize {
        self.num_boxes
    }

    /// Bytes currently allocated, headers included.
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Head of the all-boxes list; the most recent allocation.
    #[inline]
    pub fn head_box(&self) -> *mut BoxHeader {
        link_next(self.head_link)
    }

    /// Install a hook observing every freed box payload. Used by tests to
    /// assert exactly which boxes a collection reclaims.
    pub fn set_free_hook(&mut self, hook: impl FnMut(NonNull<u8>) + 'static) {
        self.free_hook = Some(Box::new(hook));
    }

    /// Allocate a zero-filled box with `size` payload bytes and link it at
    /// the head of the box list. Returns the payload address; the caller
    /// casts to the appropriate layout.
    pub fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let layout = BoxHeader::layout_for_size(size);
        unsafe {
            let ptr = alloc_zeroed(layout);
            if ptr.is_null() {
                handle_alloc_error(layout);
            }
            let header = ptr as *mut BoxHeader;
            (*header).size = size;
            (*header).set_next(self.head_box());
            link_set_next(&mut self.head_link, header);

            self.num_boxes += 1;
            self.bytes_allocated += layout.size();

            NonNull::new_unchecked(ptr.add(BoxHeader::SIZE))
        }
    }

    /// Run a full collection.
    ///
    /// `roots` is called once with a tracer and must report every live
    /// location that could reach a box. Ordering within the collection:
    /// clear weak buffer, mark from roots, resolve weak edges, sweep, free.
    pub fn collect<F>(&mut self, roots: F)
    where
        F: FnOnce(&mut Tracer<'_>),
    {
        self.weak_edges.clear();
        {
            let mut tracer = Tracer { weak_edges: &mut self.weak_edges };
            roots(&mut tracer);
        }
        self.resolve_weak_edges();
        self.sweep();
    }

    /// Null out every recorded weak edge whose referent did not get marked.
    /// Runs before the sweep, so dead referents are still readable.
    fn resolve_weak_edges(&mut self) {
        for edge in self.weak_edges.drain(..) {
            unsafe {
                let target = *edge.slot;
                if target.is_null() {
                    continue;
                }
                let header = BoxHeader::from_payload(target, edge.ty.box_offset());
                if !(*header).is_marked() {
                    *edge.slot = ptr::null_mut();
                    if let Some(desc_slot) = edge.desc_slot {
                        *desc_slot = None;
                    }
                }
            }
        }
    }

    /// Unlink every unmarked box and free it, clearing marks on survivors.
    fn sweep(&mut self) {
        unsafe {
            let mut slot: *mut usize = &mut self.head_link;
            let mut unreachable: *mut BoxHeader = ptr::null_mut();
            loop {
                let header = link_next(*slot);
                if header.is_null() {
                    break;
                }
                if (*header).is_marked() {
                    (*header).clear_mark();
                    slot = &mut (*header).link;
                } else {
                    link_set_next(&mut *slot, (*header).next());
                    (*header).set_next(unreachable);
                    unreachable = header;
                }
            }
            self.free_box_list(unreachable);
        }
    }

    /// Free every box regardless of reachability. Used at task shutdown.
    pub fn free_all(&mut self) {
        let head = self.head_box();
        self.head_link = 0;
        unsafe {
            self.free_box_list(head);
        }
    }

    unsafe fn free_box_list(&mut self, mut header: *mut BoxHeader) {
        while !header.is_null() {
            let next = (*header).next();
            let layout = BoxHeader::layout_for_size((*header).alloc_size());
            if let Some(hook) = self.free_hook.as_mut() {
                hook(NonNull::new_unchecked((*header).payload_ptr()));
            }
            dealloc(header as *mut u8, layout);
            self.num_boxes -= 1;
            self.bytes_allocated -= layout.size();
            header = next;
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.free_all();
    }
}

// ============================================================================
// Tracer - descriptor-driven marking
// ============================================================================

/// Marks boxes reachable from reported roots, recording weak edges for the
/// resolution pass. Handed to the root-enumeration callback of `collect`.
pub struct Tracer<'a> {
    weak_edges: &'a mut Vec<WeakEdge>,
}

impl Tracer<'_> {
    /// Trace a root: a storage location typed by `ty`.
    ///
    /// # Safety
    /// `location` must point to a valid value of type `ty`, and every box
    /// reachable from it must be live.
    pub unsafe fn trace_slot(&mut self, location: NonNull<u8>, ty: TypeRef) {
        self.mark_value(location.as_ptr(), ty);
    }

    /// Trace an already-loaded boxed pointer value (e.g. a hash-map key that
    /// has no addressable slot). The box it points into is marked.
    ///
    /// # Safety
    /// `value` must be a payload pointer obtained from a live box, matching
    /// the boxed pointer descriptor `ptr_ty`.
    pub unsafe fn trace_boxed(&mut self, value: NonNull<u8>, ptr_ty: TypeRef) {
        let box_type = ptr_ty.box_type().expect("trace_boxed requires a boxed pointer type");
        let header = BoxHeader::from_payload(value.as_ptr(), ptr_ty.box_offset());
        self.mark_box(header, box_type);
    }

    /// Mark the box containing `header`, then trace its contents once.
    unsafe fn mark_box(&mut self, header: *mut BoxHeader, box_type: TypeRef) {
        if !(*header).is_marked() {
            (*header).set_mark();
            self.mark_value((*header).payload_ptr(), box_type);
        }
    }

    unsafe fn mark_value(&mut self, ptr: *mut u8, ty: TypeRef) {
        if !ty.needs_gc_mark() {
            return;
        }
        match ty.kind() {
            Kind::Any => {
                let any = &mut *(ptr as *mut Any);
                if let Some(inner) = any.ty() {
                    let payload = any.payload_slot() as *mut u8;
                    if inner.is_weak() {
                        let slot = payload as *mut *mut u8;
                        if !(*slot).is_null() {
                            self.weak_edges.push(WeakEdge {
                                slot,
                                desc_slot: Some(any.ty_slot()),
                                ty: inner,
                            });
                        }
                    } else {
                        self.mark_value(payload, inner);
                    }
                }
            }
            Kind::Ptr => {
                let slot = ptr as *mut *mut u8;
                let target_ptr = *slot;
                if target_ptr.is_null() {
                    return;
                }
                let (target, box_type, box_offset) = match ty.data() {
                    TypeData::Ptr { target, box_type, box_offset } => {
                        (*target, *box_type, *box_offset)
                    }
                    _ => unreachable!(),
                };
                match box_type {
                    Some(box_type) => {
                        if ty.is_weak() {
                            self.weak_edges.push(WeakEdge { slot, desc_slot: None, ty });
                        } else {
                            let header = BoxHeader::from_payload(target_ptr, box_offset);
                            self.mark_box(header, box_type);
                        }
                    }
                    None => self.mark_value(target_ptr, target),
                }
            }
            Kind::Struct => {
                for field in ty.fields() {
                    self.mark_value(ptr.add(field.offset), field.ty);
                }
            }
            Kind::Array => {
                let elem = ty.elem_type();
                let elem_size = elem.size();
                debug_assert!(elem_size > 0);
                let (mut ptr, length) = if ty.size() != 0 {
                    (ptr, ty.size() / elem_size)
                } else {
                    // An unsized array starts with its length.
                    let length = *(ptr as *const usize);
                    (ptr.add(core::mem::size_of::<usize>()), length)
                };
                for _ in 0..length {
                    self.mark_value(ptr, elem);
                    ptr = ptr.add(elem_size);
                }
            }
            _ => {}
        }
    }
}
