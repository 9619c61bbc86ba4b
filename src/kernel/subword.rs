//! Splice engines for fields contained in one naturally-aligned cell.
//!
//! The field is widened to the narrowest containing 32-, 64- or 128-bit
//! cell. One iteration: acquire-load the cell, extract the field, apply the
//! field functions, splice both results back into the cell image, then
//! compare-exchange the whole cell. The bits outside the field are carried
//! through untouched, so a successful exchange proves the field itself saw
//! the expected value.
//!
//! `RETRY` decides what a failed exchange means. A retrying caller (atomic
//! memory op, exclusive loop, store) expects whatever was loaded and must
//! eventually land, so it loops. A non-retrying caller (plain
//! compare-and-swap) reports the observed field at once: the failure is the
//! guest-visible result.

use super::{split, FieldFn};
use crate::alignment::{self, Boundary};
use crate::cell::{Cell128, Cell32, Cell64};

macro_rules! splice_loop {
    ($name:ident, $cell:ty, $wide:ty) => {
        unsafe fn $name<const RETRY: bool>(
            addr: u64,
            field_mask: u64,
            desired_src: u64,
            expected_src: u64,
            expected_fn: FieldFn,
            desired_fn: FieldFn,
        ) -> u64 {
            let cell_bytes = core::mem::size_of::<$wide>() as u64;
            let shift = ((addr & (cell_bytes - 1)) * 8) as u32;
            let cell = <$cell>::new(addr & !(cell_bytes - 1));
            let wide_mask = (field_mask as $wide) << shift;

            loop {
                let actual = cell.load_acquire();
                let old_field = ((actual >> shift) as u64) & field_mask;

                let expected_field = expected_fn(old_field, expected_src) & field_mask;
                let desired_field = desired_fn(old_field, desired_src) & field_mask;

                let expected_cell = (actual & !wide_mask) | ((expected_field as $wide) << shift);
                let desired_cell = (expected_cell & !wide_mask) | ((desired_field as $wide) << shift);

                match cell.compare_exchange(expected_cell, desired_cell) {
                    Ok(_) => return expected_field,
                    Err(observed) => {
                        if RETRY {
                            continue;
                        }
                        return ((observed >> shift) as u64) & field_mask;
                    }
                }
            }
        }
    };
}

splice_loop!(splice_cas_32, Cell32, u32);
splice_loop!(splice_cas_64, Cell64, u64);
splice_loop!(splice_cas_128, Cell128, u128);

/// 16-bit field engine.
///
/// # Safety
/// `addr` and the byte after it must be mapped read-write.
pub unsafe fn cas16<const RETRY: bool>(
    desired_src: u16,
    expected_src: u16,
    addr: u64,
    expected_fn: FieldFn,
    desired_fn: FieldFn,
) -> u16 {
    let (band, _) = alignment::classify_and_record(addr, 2);
    match band {
        Boundary::Cell | Boundary::CacheLine => {
            split::split_cas16::<RETRY>(desired_src, expected_src, addr, expected_fn, desired_fn)
        }
        Boundary::Dword => splice_cas_128::<RETRY>(
            addr,
            0xFFFF,
            desired_src as u64,
            expected_src as u64,
            expected_fn,
            desired_fn,
        ) as u16,
        // Crossing a 4-byte boundary needs the 8-byte cell; anything
        // narrower fits in the 4-byte one.
        Boundary::None if addr & 3 == 3 => splice_cas_64::<RETRY>(
            addr,
            0xFFFF,
            desired_src as u64,
            expected_src as u64,
            expected_fn,
            desired_fn,
        ) as u16,
        Boundary::None => splice_cas_32::<RETRY>(
            addr,
            0xFFFF,
            desired_src as u64,
            expected_src as u64,
            expected_fn,
            desired_fn,
        ) as u16,
    }
}

/// 32-bit field engine.
///
/// # Safety
/// `addr..addr + 4` must be mapped read-write.
pub unsafe fn cas32<const RETRY: bool>(
    desired_src: u32,
    expected_src: u32,
    addr: u64,
    expected_fn: FieldFn,
    desired_fn: FieldFn,
) -> u32 {
    let (band, _) = alignment::classify_and_record(addr, 4);
    match band {
        Boundary::Cell | Boundary::CacheLine => {
            split::split_cas32::<RETRY>(desired_src, expected_src, addr, expected_fn, desired_fn)
        }
        Boundary::Dword => splice_cas_128::<RETRY>(
            addr,
            0xFFFF_FFFF,
            desired_src as u64,
            expected_src as u64,
            expected_fn,
            desired_fn,
        ) as u32,
        Boundary::None => splice_cas_64::<RETRY>(
            addr,
            0xFFFF_FFFF,
            desired_src as u64,
            expected_src as u64,
            expected_fn,
            desired_fn,
        ) as u32,
    }
}

/// 64-bit field engine.
///
/// # Safety
/// `addr..addr + 8` must be mapped read-write.
pub unsafe fn cas64<const RETRY: bool>(
    desired_src: u64,
    expected_src: u64,
    addr: u64,
    expected_fn: FieldFn,
    desired_fn: FieldFn,
) -> u64 {
    let (band, _) = alignment::classify_and_record(addr, 8);
    match band {
        Boundary::Cell | Boundary::CacheLine => {
            split::split_cas64::<RETRY>(desired_src, expected_src, addr, expected_fn, desired_fn)
        }
        Boundary::Dword | Boundary::None => splice_cas_128::<RETRY>(
            addr,
            u64::MAX,
            desired_src,
            expected_src,
            expected_fn,
            desired_fn,
        ),
    }
}
