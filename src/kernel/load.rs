//! Misaligned acquire-load paths.
//!
//! Loads have no store side, so they never need the exchange loops: the
//! value is read from the narrowest containing cell, or from two adjacent
//! cells (upper half first) when the access crosses a 16-byte boundary.
//! The dual-cell read is not atomic; like the dual-CAS it can observe a
//! mix of two stores.

use crate::alignment::{self, Boundary};
use crate::cell::{load_acquire_128, Cell32, Cell64, Cell8};

/// # Safety
/// `addr..addr + 2` must be mapped readable.
pub unsafe fn load16(addr: u64) -> u16 {
    let (band, cell_off) = alignment::classify_and_record(addr, 2);
    match band {
        Boundary::Cell | Boundary::CacheLine => {
            let upper = Cell8::new(addr + 1).load_acquire();
            let lower = Cell8::new(addr).load_acquire();
            ((upper as u16) << 8) | lower as u16
        }
        Boundary::Dword => {
            let value = load_acquire_128(addr & !15);
            (value >> (cell_off * 8)) as u16
        }
        Boundary::None if addr & 3 == 3 => {
            let value = Cell64::new(addr & !7).load_acquire();
            (value >> ((addr & 7) * 8)) as u16
        }
        Boundary::None => {
            let value = Cell32::new(addr & !3).load_acquire();
            (value >> ((addr & 3) * 8)) as u16
        }
    }
}

/// # Safety
/// `addr..addr + 4` must be mapped readable.
pub unsafe fn load32(addr: u64) -> u32 {
    let (band, cell_off) = alignment::classify_and_record(addr, 4);
    match band {
        Boundary::Cell | Boundary::CacheLine => {
            let base = addr & !3;
            let upper = Cell32::new(base + 4).load_acquire();
            let lower = Cell32::new(base).load_acquire();
            let wide = ((upper as u64) << 32) | lower as u64;
            (wide >> ((addr & 3) * 8)) as u32
        }
        Boundary::Dword => {
            let value = load_acquire_128(addr & !15);
            (value >> (cell_off * 8)) as u32
        }
        Boundary::None => {
            let value = Cell64::new(addr & !7).load_acquire();
            (value >> ((addr & 7) * 8)) as u32
        }
    }
}

/// # Safety
/// `addr..addr + 8` must be mapped readable.
pub unsafe fn load64(addr: u64) -> u64 {
    let (band, cell_off) = alignment::classify_and_record(addr, 8);
    match band {
        Boundary::Cell | Boundary::CacheLine => {
            let base = addr & !7;
            let upper = Cell64::new(base + 8).load_acquire();
            let lower = Cell64::new(base).load_acquire();
            let wide = ((upper as u128) << 64) | lower as u128;
            (wide >> ((addr & 7) * 8)) as u64
        }
        Boundary::Dword | Boundary::None => {
            let value = load_acquire_128(addr & !15);
            (value >> (cell_off * 8)) as u64
        }
    }
}

/// 128-bit pair load. Any misalignment crosses the 16-byte cell, so the
/// two containing cells are staged into a 32-byte image and the pair is
/// cut out of it.
///
/// # Safety
/// Both 16-byte cells touched by `addr..addr + 16` must be mapped
/// readable.
pub unsafe fn load128(addr: u64) -> (u64, u64) {
    alignment::classify_and_record(addr, 16);
    let offset = (addr & 15) as usize;
    let base = addr & !15;

    let mut staging = [0u8; 32];
    let upper = load_acquire_128(base + 16);
    let lower = load_acquire_128(base);
    staging[..16].copy_from_slice(&lower.to_le_bytes());
    staging[16..].copy_from_slice(&upper.to_le_bytes());

    let low = u64::from_le_bytes(staging[offset..offset + 8].try_into().unwrap());
    let high = u64::from_le_bytes(staging[offset + 8..offset + 16].try_into().unwrap());
    (low, high)
}
