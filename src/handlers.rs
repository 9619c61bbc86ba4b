//! One handler per faulting instruction family, plus the router the signal
//! runtime calls.
//!
//! Every handler follows the same shape: check the signal code, decode,
//! read the operand registers (zero-register aware), run the matching
//! engine, write the result back. A handler returns `false` for anything
//! that is not its instruction at a misaligned address, so the runtime can
//! fall through to its other fault sources.

use log::warn;

use crate::context::{FaultDescriptor, TrappedContext, BUS_ADRALN};
use crate::decoder::{self, Decoded, ExclusiveOp, MemAtomicOp, Size};
use crate::kernel::{self, load, subword};

/// What the signal runtime should do after the router runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not an emulatable alignment fault; try other handlers or raise.
    Unhandled,
    /// Emulated one instruction; the runtime steps the PC past it.
    Handled,
    /// Emulated a whole exclusive loop; advance the PC by this many bytes.
    HandledAdvance(u64),
}

/// Decodes the fault and routes it to the family handler.
///
/// # Safety
/// The context must describe a live fault whose operand registers hold
/// addresses mapped in this process, and `fault.pc` must point at the
/// faulting instruction stream; the exclusive-loop scanner reads up to five
/// words past it.
pub unsafe fn handle_bus_fault(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> Outcome {
    if fault.code != BUS_ADRALN {
        return Outcome::Unhandled;
    }
    let decoded = match decoder::decode(fault.instr) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!("alignment fault at {:#x} not recognized: {err}", fault.pc);
            return Outcome::Unhandled;
        }
    };
    let handled = match decoded {
        Decoded::Cas { .. } => handle_cas(ctx, fault),
        Decoded::CasPair { .. } => handle_cas_pair(ctx, fault),
        Decoded::MemOp { .. } => handle_mem_op(ctx, fault),
        Decoded::LoadAcquire { .. } => handle_load_acquire(ctx, fault),
        Decoded::LoadAcquirePair { .. } => handle_load_pair(ctx, fault),
        Decoded::StoreRelease { .. } => handle_store_release(ctx, fault),
        Decoded::Exclusive { .. } => {
            return match handle_exclusive_sequence(ctx, fault) {
                0 => Outcome::Unhandled,
                bytes => Outcome::HandledAdvance(bytes),
            };
        }
    };
    if handled {
        Outcome::Handled
    } else {
        Outcome::Unhandled
    }
}

/// CAS/CASAL. The expected register receives the observed memory value
/// whether the exchange passed or failed; on a pass that value is what the
/// register already held.
///
/// # Safety
/// See [`handle_bus_fault`].
pub unsafe fn handle_cas(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> bool {
    if fault.code != BUS_ADRALN {
        return false;
    }
    let Ok(Decoded::Cas { size, rs, rt, rn }) = decoder::decode(fault.instr) else {
        return false;
    };

    let addr = ctx.x(rn);
    let desired = ctx.x(rt);
    let expected = ctx.x(rs);

    let observed = match size {
        // A byte access cannot be misaligned.
        Size::Byte => return false,
        Size::Half => subword::cas16::<false>(
            desired as u16,
            expected as u16,
            addr,
            kernel::first,
            kernel::first,
        ) as u64,
        Size::Word => subword::cas32::<false>(
            desired as u32,
            expected as u32,
            addr,
            kernel::first,
            kernel::first,
        ) as u64,
        Size::Double => {
            subword::cas64::<false>(desired, expected, addr, kernel::first, kernel::first)
        }
    };

    ctx.set_x(rs, observed);
    true
}

/// CASP/CASPAL on 32-bit register pairs: the combined 64-bit value runs
/// through the 64-bit engine and the two expected registers receive the
/// observed halves. 64-bit pairs would need 256-bit staging that no host
/// primitive backs and are refused.
///
/// # Safety
/// See [`handle_bus_fault`].
pub unsafe fn handle_cas_pair(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> bool {
    if fault.code != BUS_ADRALN {
        return false;
    }
    let Ok(Decoded::CasPair { size, rs, rt, rn }) = decoder::decode(fault.instr) else {
        return false;
    };
    if size != Size::Word {
        return false;
    }

    let addr = ctx.x(rn);
    let desired = ((ctx.x(rt + 1) & 0xFFFF_FFFF) << 32) | (ctx.x(rt) & 0xFFFF_FFFF);
    let expected = ((ctx.x(rs + 1) & 0xFFFF_FFFF) << 32) | (ctx.x(rs) & 0xFFFF_FFFF);

    let observed = subword::cas64::<false>(desired, expected, addr, kernel::first, kernel::first);

    ctx.set_x(rs, observed & 0xFFFF_FFFF);
    ctx.set_x(rs + 1, observed >> 32);
    true
}

/// LDADD/LDCLR/LDEOR/LDSET/SWP. Retrying: the operation has no failure
/// channel and must land. The result register receives the pre-op memory
/// value.
///
/// # Safety
/// See [`handle_bus_fault`].
pub unsafe fn handle_mem_op(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> bool {
    if fault.code != BUS_ADRALN {
        return false;
    }
    let Ok(Decoded::MemOp {
        size,
        op,
        rs,
        rt,
        rn,
    }) = decoder::decode(fault.instr)
    else {
        return false;
    };

    let addr = ctx.x(rn);
    let source = ctx.x(rs);
    let desired_fn = match op {
        MemAtomicOp::Add => kernel::add,
        MemAtomicOp::Clr => kernel::clr,
        MemAtomicOp::Eor => kernel::eor,
        MemAtomicOp::Set => kernel::or,
        MemAtomicOp::Swap => kernel::first,
    };

    let observed = match size {
        Size::Byte => return false,
        Size::Half => {
            subword::cas16::<true>(source as u16, 0, addr, kernel::ident, desired_fn) as u64
        }
        Size::Word => {
            subword::cas32::<true>(source as u32, 0, addr, kernel::ident, desired_fn) as u64
        }
        Size::Double => subword::cas64::<true>(source, 0, addr, kernel::ident, desired_fn),
    };

    ctx.set_x(rt, observed);
    true
}

/// LDAR/LDAPR.
///
/// # Safety
/// See [`handle_bus_fault`].
pub unsafe fn handle_load_acquire(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> bool {
    if fault.code != BUS_ADRALN {
        return false;
    }
    let Ok(Decoded::LoadAcquire { size, rt, rn }) = decoder::decode(fault.instr) else {
        return false;
    };

    let addr = ctx.x(rn);
    let value = match size {
        Size::Byte => return false,
        Size::Half => load::load16(addr) as u64,
        Size::Word => load::load32(addr) as u64,
        Size::Double => load::load64(addr),
    };

    ctx.set_x(rt, value);
    true
}

/// LDXP/LDAXP of a 64-bit pair.
///
/// # Safety
/// See [`handle_bus_fault`].
pub unsafe fn handle_load_pair(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> bool {
    if fault.code != BUS_ADRALN {
        return false;
    }
    let Ok(Decoded::LoadAcquirePair { rt, rt2, rn }) = decoder::decode(fault.instr) else {
        return false;
    };

    let addr = ctx.x(rn);
    let (low, high) = load::load128(addr);
    ctx.set_x(rt, low);
    ctx.set_x(rt2, high);
    true
}

/// STLR, emulated as a swap with the result discarded. A store has no
/// failure channel, so it goes through the retrying engine and always
/// lands.
///
/// # Safety
/// See [`handle_bus_fault`].
pub unsafe fn handle_store_release(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> bool {
    if fault.code != BUS_ADRALN {
        return false;
    }
    let Ok(Decoded::StoreRelease { size, rt, rn }) = decoder::decode(fault.instr) else {
        return false;
    };

    let addr = ctx.x(rn);
    let data = ctx.x(rt);
    match size {
        Size::Byte => return false,
        Size::Half => {
            subword::cas16::<true>(data as u16, 0, addr, kernel::ident, kernel::first);
        }
        Size::Word => {
            subword::cas32::<true>(data as u32, 0, addr, kernel::ident, kernel::first);
        }
        Size::Double => {
            subword::cas64::<true>(data, 0, addr, kernel::ident, kernel::first);
        }
    }
    true
}

/// The LDAXR ... STLXR ... CBNZ loop, applied as one retrying operation.
/// Returns the number of bytes the runtime must advance the PC to step
/// over the emulated block, or 0 if the window does not match the emitted
/// shape. Fetch forms write the pre-op memory value to the LDAXR
/// destination.
///
/// # Safety
/// See [`handle_bus_fault`]; additionally `fault.pc` must point at six
/// readable instruction words.
pub unsafe fn handle_exclusive_sequence(ctx: &mut TrappedContext, fault: &FaultDescriptor) -> u64 {
    if fault.code != BUS_ADRALN {
        return 0;
    }
    let window = core::slice::from_raw_parts(fault.pc as usize as *const u32, 6);
    let seq = match decoder::decode_exclusive_sequence(window) {
        Ok(seq) => seq,
        Err(err) => {
            warn!("exclusive loop at {:#x} not recognized: {err}", fault.pc);
            return 0;
        }
    };

    let addr = ctx.x(seq.rn);
    let source = ctx.x(seq.data_src);
    let desired_fn = match seq.op {
        ExclusiveOp::Swap => kernel::first,
        ExclusiveOp::Add => kernel::add,
        ExclusiveOp::Sub => kernel::sub,
        ExclusiveOp::And => kernel::and,
        ExclusiveOp::Or => kernel::or,
        ExclusiveOp::Eor => kernel::eor,
        ExclusiveOp::Neg => kernel::neg,
    };

    let observed = match seq.size {
        Size::Byte => return 0,
        Size::Half => {
            subword::cas16::<true>(source as u16, 0, addr, kernel::ident, desired_fn) as u64
        }
        Size::Word => {
            subword::cas32::<true>(source as u32, 0, addr, kernel::ident, desired_fn) as u64
        }
        Size::Double => subword::cas64::<true>(source, 0, addr, kernel::ident, desired_fn),
    };

    if seq.fetch {
        ctx.set_x(seq.rd, observed);
    }
    (seq.skip_instrs * 4) as u64
}
