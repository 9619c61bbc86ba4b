//! Dual-cell engines for accesses crossing a 16-byte boundary.
//!
//! No ARM64 primitive covers both sides of the boundary at once, so the
//! field is staged across two adjacent cells and committed with two
//! sequential compare-exchanges, upper cell first. A concurrent writer can
//! slip between the two and land the upper half while the lower fails:
//! that is a tear. The torn value is reported to the guest as the observed
//! result and is never retried through; a second attempt after a tear
//! risks livelocking against the interfering thread.
//!
//! The acquire loads also run upper-half first. Neither order restores
//! atomicity; the ordering only keeps the staged image consistent with the
//! order the exchanges will inspect the cells.

use super::FieldFn;
use crate::cell::{Cell32, Cell64, Cell8};

macro_rules! split_loop {
    ($name:ident, $cell:ty, $half:ty, $wide:ty, $field:ty) => {
        /// # Safety
        /// The two cells containing `addr..addr + width` must be mapped
        /// read-write.
        pub unsafe fn $name<const RETRY: bool>(
            desired_src: $field,
            expected_src: $field,
            addr: u64,
            expected_fn: FieldFn,
            desired_fn: FieldFn,
        ) -> $field {
            let half_bytes = core::mem::size_of::<$half>() as u64;
            let half_bits = (half_bytes * 8) as u32;
            let lower_addr = addr & !(half_bytes - 1);
            let upper_addr = lower_addr + half_bytes;
            let shift = ((addr & (half_bytes - 1)) * 8) as u32;
            let field_mask: $wide = (<$field>::MAX as $wide) << shift;

            let lower = <$cell>::new(lower_addr);
            let upper = <$cell>::new(upper_addr);

            loop {
                let actual_upper = upper.load_acquire();
                let actual_lower = lower.load_acquire();
                let actual = ((actual_upper as $wide) << half_bits) | actual_lower as $wide;

                let old_field = ((actual >> shift) as u64) & (<$field>::MAX as u64);
                let expected_field =
                    expected_fn(old_field, expected_src as u64) & <$field>::MAX as u64;
                let desired_field =
                    desired_fn(old_field, desired_src as u64) & <$field>::MAX as u64;

                let expected_wide = (actual & !field_mask) | ((expected_field as $wide) << shift);
                let desired_wide =
                    (expected_wide & !field_mask) | ((desired_field as $wide) << shift);

                let mut torn = false;
                let observed: $wide;

                if expected_wide == actual {
                    let exp_lower = expected_wide as $half;
                    let exp_upper = (expected_wide >> half_bits) as $half;
                    let des_lower = desired_wide as $half;
                    let des_upper = (desired_wide >> half_bits) as $half;

                    match upper.compare_exchange(exp_upper, des_upper) {
                        Ok(_) => match lower.compare_exchange(exp_lower, des_lower) {
                            Ok(_) => return expected_field as $field,
                            Err(seen_lower) => {
                                // Upper half committed, lower did not: the
                                // guest can observe the mix.
                                torn = true;
                                observed =
                                    ((exp_upper as $wide) << half_bits) | seen_lower as $wide;
                            }
                        },
                        Err(seen_upper) => {
                            observed = ((seen_upper as $wide) << half_bits) | exp_lower as $wide;
                        }
                    }
                } else {
                    // Mismatch up front; no exchange was issued.
                    observed = actual;
                }

                if RETRY && !torn {
                    continue;
                }
                return (observed >> shift) as $field;
            }
        }
    };
}

split_loop!(split_cas16, Cell8, u8, u16, u16);
split_loop!(split_cas32, Cell32, u32, u64, u32);
split_loop!(split_cas64, Cell64, u64, u128, u64);
