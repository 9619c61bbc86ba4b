//! Atomic cells addressed by raw guest pointers.
//!
//! Every memory touch in the emulation goes through one of these handles.
//! A handle is only constructible at the natural alignment of its width;
//! the kernels widen a misaligned access to its containing cell before
//! touching memory, so an unaligned atomic reference never exists.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use portable_atomic::AtomicU128;

macro_rules! cell {
    ($name:ident, $atomic:ty, $int:ty) => {
        #[derive(Clone, Copy)]
        pub struct $name(*const $atomic);

        impl $name {
            /// # Safety
            /// `addr` must be naturally aligned for the cell width and
            /// refer to memory mapped for the life of the handle.
            pub unsafe fn new(addr: u64) -> Self {
                debug_assert_eq!(addr as usize % core::mem::size_of::<$int>(), 0);
                Self(addr as usize as *const $atomic)
            }

            pub fn load_acquire(&self) -> $int {
                unsafe { (*self.0).load(Ordering::Acquire) }
            }

            /// Sequentially-consistent compare-exchange. `Err` carries the
            /// value observed at the moment of the failed exchange.
            pub fn compare_exchange(&self, current: $int, new: $int) -> Result<$int, $int> {
                unsafe {
                    (*self.0).compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
                }
            }
        }
    };
}

cell!(Cell8, AtomicU8, u8);
cell!(Cell32, AtomicU32, u32);
cell!(Cell64, AtomicU64, u64);
cell!(Cell128, AtomicU128, u128);

/// 128-bit acquire load that is safe on read-only mappings.
///
/// Without LSE2 a 128-bit atomic load lowers to a load-exclusive /
/// store-exclusive pair, and the store side faults on pages mapped
/// read-only. The inline `ldaxp` + `clrex` form never writes.
///
/// # Safety
/// `addr` must be 16-byte aligned and mapped readable.
#[cfg(target_arch = "aarch64")]
pub unsafe fn load_acquire_128(addr: u64) -> u128 {
    let lower: u64;
    let upper: u64;
    core::arch::asm!(
        "ldaxp {lower}, {upper}, [{addr}]",
        "clrex",
        lower = out(reg) lower,
        upper = out(reg) upper,
        addr = in(reg) addr,
        options(nostack),
    );
    ((upper as u128) << 64) | lower as u128
}

/// 128-bit acquire load that is safe on read-only mappings.
///
/// # Safety
/// `addr` must be 16-byte aligned and mapped readable.
#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn load_acquire_128(addr: u64) -> u128 {
    Cell128::new(addr).load_acquire()
}
