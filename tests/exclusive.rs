mod common;

use common::*;
use philae::handlers::{handle_bus_fault, handle_exclusive_sequence};
use philae::Outcome;

#[test]
fn non_fetch_add_loop() {
    // ldaxr w2, [x3]; add w2, w2, w4; stlxr w2, w2, [x3]; cbnz w2, back
    let code = [
        ldaxr(SZ_WORD, 3, 2),
        add_w(2, 2, 4),
        stlxr(SZ_WORD, 2, 3, 2),
        cbnz(2, -3),
        0,
        0,
    ];

    let mut arena = Arena::new();
    arena.write_u32(5, 700);

    let mut c = ctx();
    c.regs[3] = arena.addr(5);
    c.regs[4] = 42;
    c.regs[2] = 0xFFFF_FFFF; // stale loop temp, must stay untouched

    let skip = unsafe {
        handle_exclusive_sequence(&mut c, &fault_at(code.as_ptr() as u64, code[0]))
    };
    assert_eq!(skip, 16);
    assert_eq!(arena.read_u32(5), 742);
    assert_eq!(c.regs[2], 0xFFFF_FFFF);
}

#[test]
fn fetch_add_loop_writes_the_pre_value() {
    // ldaxr w2, [x3]; add w3, w2, w4; stlxr w5, w3, [x3]; cbnz w5, back
    let code = [
        ldaxr(SZ_WORD, 3, 2),
        add_w(3, 2, 4),
        stlxr(SZ_WORD, 5, 3, 3),
        cbnz(5, -3),
        0,
        0,
    ];

    let mut arena = Arena::new();
    arena.write_u32(9, 1000);

    let mut c = ctx();
    c.regs[3] = arena.addr(9);
    c.regs[4] = 24;

    let skip = unsafe {
        handle_exclusive_sequence(&mut c, &fault_at(code.as_ptr() as u64, code[0]))
    };
    assert_eq!(skip, 16);
    assert_eq!(arena.read_u32(9), 1024);
    assert_eq!(c.regs[2], 1000);
}

#[test]
fn swap_loop() {
    // ldaxr w2, [x3]; stlxr w5, w4, [x3]; cbnz w5, back
    let code = [
        ldaxr(SZ_WORD, 3, 2),
        stlxr(SZ_WORD, 5, 3, 4),
        cbnz(5, -2),
        0,
        0,
        0,
    ];

    let mut arena = Arena::new();
    arena.write_u32(13, 0xAABB_CCDD);

    let mut c = ctx();
    c.regs[3] = arena.addr(13);
    c.regs[4] = 0x1122_3344;

    let skip = unsafe {
        handle_exclusive_sequence(&mut c, &fault_at(code.as_ptr() as u64, code[0]))
    };
    assert_eq!(skip, 12);
    assert_eq!(arena.read_u32(13), 0x1122_3344);
    // Swap is a fetch form; the loaded value lands in the ldaxr target.
    assert_eq!(c.regs[2], 0xAABB_CCDD);
}

#[test]
fn neg_loop() {
    // ldaxr w2, [x3]; sub w2, wzr, w2; stlxr w2, w2, [x3]; cbnz w2, back
    let code = [
        ldaxr(SZ_WORD, 3, 2),
        sub_w(2, 31, 2),
        stlxr(SZ_WORD, 2, 3, 2),
        cbnz(2, -3),
        0,
        0,
    ];

    let mut arena = Arena::new();
    arena.write_u32(6, 5);

    let mut c = ctx();
    c.regs[3] = arena.addr(6);

    let skip = unsafe {
        handle_exclusive_sequence(&mut c, &fault_at(code.as_ptr() as u64, code[0]))
    };
    assert_eq!(skip, 16);
    assert_eq!(arena.read_u32(6), 5u32.wrapping_neg());
}

#[test]
fn sub_loop_on_doubles() {
    // ldaxr x2, [x3]; sub x2, x2, x4; stlxr w2, x2, [x3]; cbnz w2, back
    let sub_x = 0x8000_0000 | sub_w(2, 2, 4);
    let code = [
        ldaxr(SZ_DOUBLE, 3, 2),
        sub_x,
        stlxr(SZ_DOUBLE, 2, 3, 2),
        cbnz(2, -3),
        0,
        0,
    ];

    let mut arena = Arena::new();
    arena.write_u64(11, 1_000_000);

    let mut c = ctx();
    c.regs[3] = arena.addr(11);
    c.regs[4] = 1;

    let skip = unsafe {
        handle_exclusive_sequence(&mut c, &fault_at(code.as_ptr() as u64, code[0]))
    };
    assert_eq!(skip, 16);
    assert_eq!(arena.read_u64(11), 999_999);
}

#[test]
fn router_advances_past_the_block() {
    let code = [
        ldaxr(SZ_WORD, 3, 2),
        add_w(2, 2, 4),
        stlxr(SZ_WORD, 2, 3, 2),
        cbnz(2, -3),
        0,
        0,
    ];

    let mut arena = Arena::new();
    arena.write_u32(5, 1);

    let mut c = ctx();
    c.regs[3] = arena.addr(5);
    c.regs[4] = 2;

    let outcome = unsafe { handle_bus_fault(&mut c, &fault_at(code.as_ptr() as u64, code[0])) };
    assert_eq!(outcome, Outcome::HandledAdvance(16));
    assert_eq!(arena.read_u32(5), 3);
}

#[test]
fn malformed_window_is_unhandled() {
    let code = [
        ldaxr(SZ_WORD, 3, 2),
        0xD503_201F, // nop in the middle of the loop
        stlxr(SZ_WORD, 2, 3, 2),
        cbnz(2, -3),
        0,
        0,
    ];

    let mut c = ctx();
    let skip = unsafe {
        handle_exclusive_sequence(&mut c, &fault_at(code.as_ptr() as u64, code[0]))
    };
    assert_eq!(skip, 0);

    let outcome = unsafe { handle_bus_fault(&mut c, &fault_at(code.as_ptr() as u64, code[0])) };
    assert_eq!(outcome, Outcome::Unhandled);
}
