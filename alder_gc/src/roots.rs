//! Root registration.
//!
//! The collector is precise: every live location that could reach a box must
//! be registered before a collection. Roots are grouped into frames pushed
//! and popped at scope boundaries, mirroring the call stack.

use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::{heap::Tracer, types::TypeRef};

/// A registered root: a storage location plus the descriptor of the value
/// stored there.
#[derive(Clone, Copy)]
pub struct TypedSlot {
    pub location: NonNull<u8>,
    pub ty: TypeRef,
}

/// Stack of root frames scanned during the mark phase.
///
/// A frame is pushed before registering slots and popped (LIFO) when its
/// scope exits. Slot addresses must stay valid for the lifetime of their
/// frame; the collector reads and may write through them (weak clearing).
pub struct RootStack {
    frames: Vec<Vec<TypedSlot>>,
}

impl RootStack {
    pub fn new() -> RootStack {
        RootStack { frames: Vec::new() }
    }

    /// Number of frames currently pushed.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop().expect("no root frame to pop");
    }

    /// Register a typed location in the top frame.
    ///
    /// # Safety
    /// `location` must point to a valid value of type `ty` and remain valid
    /// until the frame is popped.
    pub unsafe fn push_slot(&mut self, location: NonNull<u8>, ty: TypeRef) {
        self.frames
            .last_mut()
            .expect("push_slot requires a pushed root frame")
            .push(TypedSlot { location, ty });
    }

    /// Trace every registered slot.
    pub fn visit(&self, tracer: &mut Tracer<'_>) {
        for frame in &self.frames {
            for slot in frame {
                unsafe {
                    tracer.trace_slot(slot.location, slot.ty);
                }
            }
        }
    }
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}
