//! Conservative root scanning.
//!
//! The collector cannot know which machine words on the native stack (or
//! in callee-saved registers) are cell references, so it treats every
//! aligned word that the heap membership predicate accepts as one. This
//! may keep garbage alive; it never frees a cell a native frame still
//! refers to.
//!
//! This is the only module in the crate that contains `unsafe` code:
//! volatile reads of raw stack memory and the register spill.
//!
//! References are 64-bit words, so native stack scanning only finds them
//! on 64-bit targets. Caller-supplied word buffers are scanned everywhere.

#![allow(unsafe_code)]

use std::mem::size_of;

use lone_core::CellRef;

use crate::runtime::Runtime;

/// Callee-saved registers spilled before a native stack scan.
const SPILL_WORDS: usize = 12;

/// Conservative roots for one collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct StackRoots<'a> {
    /// Address of the outermost native frame to scan up to, recorded by
    /// `Runtime::anchor_stack`. `None` disables native scanning.
    pub native_anchor: Option<usize>,
    /// Extra words to scan, such as an evaluator's own value stack.
    pub words: &'a [usize],
}

impl<'a> StackRoots<'a> {
    /// No conservative roots at all.
    pub const NONE: StackRoots<'static> = StackRoots {
        native_anchor: None,
        words: &[],
    };

    /// Scan only the given word buffer.
    pub fn words(words: &'a [usize]) -> Self {
        Self {
            native_anchor: None,
            words,
        }
    }
}

impl Runtime {
    /// Record `anchor` as the outermost native frame to scan.
    ///
    /// Every later collection scans the native stack from its own frame up
    /// to `anchor`, so cells referenced only from locals of frames nested
    /// inside the anchoring frame survive.
    ///
    /// # Safety
    ///
    /// The frame holding `anchor` must stay active (not returned from)
    /// until [`Runtime::release_stack_anchor`] is called or the runtime is
    /// dropped, and every collection must happen on the same thread, in a
    /// frame nested inside it. Otherwise a collection reads stack memory
    /// that is no longer part of the thread's live stack.
    pub unsafe fn anchor_stack<T>(&mut self, anchor: &T) {
        self.stack_anchor = Some(std::ptr::from_ref(anchor).expose_provenance());
    }
}

/// Every word in `roots` that `resolve` accepts, in scan order.
///
/// Caller words are scanned first, then the spilled registers and the
/// native stack between the current frame and the anchor.
pub fn conservative_candidates(
    roots: &StackRoots<'_>,
    mut resolve: impl FnMut(u64) -> Option<CellRef>,
) -> Vec<CellRef> {
    let mut found = Vec::new();
    found.extend(roots.words.iter().filter_map(|&w| resolve(w as u64)));
    if let Some(anchor) = roots.native_anchor {
        if cfg!(target_pointer_width = "64") {
            scan_native_stack(anchor, &mut resolve, &mut found);
        }
    }
    found
}

/// Spill registers, then scan from this frame to `anchor`.
///
/// Never inlined, so this frame (holding the spill buffer) sits below every
/// frame of the caller chain.
#[inline(never)]
fn scan_native_stack(
    anchor: usize,
    resolve: &mut dyn FnMut(u64) -> Option<CellRef>,
    found: &mut Vec<CellRef>,
) {
    let mut registers = [0usize; SPILL_WORDS];
    spill_registers(&mut registers);
    let registers = std::hint::black_box(&registers);

    let here = registers.as_ptr().expose_provenance();
    let (low, high) = if here < anchor {
        (here, anchor)
    } else {
        // Upward-growing stack: the spill buffer is the newest data.
        (anchor, here + size_of::<[usize; SPILL_WORDS]>())
    };

    // SAFETY: `low..high` spans the live frames between the anchor's frame
    // (still active, per the contract of `Runtime::anchor_stack`) and this
    // one, including `registers`. That memory is mapped and readable for
    // the duration of the call.
    unsafe { scan_range(low, high, resolve, found) };
}

/// Read every aligned word in `[low, high)` and keep those `resolve`
/// accepts.
///
/// # Safety
///
/// Every aligned word in the range must be readable for the duration of
/// the call. Values need not be initialized as references; they are read
/// as plain integers through volatile loads.
unsafe fn scan_range(
    low: usize,
    high: usize,
    resolve: &mut dyn FnMut(u64) -> Option<CellRef>,
    found: &mut Vec<CellRef>,
) {
    let word = size_of::<usize>();
    let mut at = (low + word - 1) & !(word - 1);
    while at + word <= high {
        // SAFETY: `at` is aligned and inside the readable range promised
        // by the caller.
        let value =
            unsafe { std::ptr::read_volatile(std::ptr::with_exposed_provenance::<usize>(at)) };
        if let Some(cell) = resolve(value as u64) {
            found.push(cell);
        }
        at += word;
    }
}

/// Copy the callee-saved registers into `out`, so references living only
/// in registers become visible to the stack scan.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn spill_registers(out: &mut [usize; SPILL_WORDS]) {
    // SAFETY: six 8-byte stores into a twelve-word buffer we own
    // exclusively; no other state is touched.
    unsafe {
        std::arch::asm!(
            "mov qword ptr [{0}], rbx",
            "mov qword ptr [{0} + 8], rbp",
            "mov qword ptr [{0} + 16], r12",
            "mov qword ptr [{0} + 24], r13",
            "mov qword ptr [{0} + 32], r14",
            "mov qword ptr [{0} + 40], r15",
            in(reg) out.as_mut_ptr(),
            options(nostack, preserves_flags),
        );
    }
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn spill_registers(out: &mut [usize; SPILL_WORDS]) {
    // SAFETY: six paired 16-byte stores covering exactly the twelve-word
    // buffer we own exclusively; no other state is touched.
    unsafe {
        std::arch::asm!(
            "stp x19, x20, [{0}]",
            "stp x21, x22, [{0}, #16]",
            "stp x23, x24, [{0}, #32]",
            "stp x25, x26, [{0}, #48]",
            "stp x27, x28, [{0}, #64]",
            "stp x29, x30, [{0}, #80]",
            in(reg) out.as_mut_ptr(),
            options(nostack, preserves_flags),
        );
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn spill_registers(_out: &mut [usize; SPILL_WORDS]) {}
