//! Recognizes the ARM64 atomic encodings the translator emits.
//!
//! Only the forms the code generator actually produces are accepted:
//! CAS/CASAL, CASP/CASPAL, the LDADD-family atomic memory ops, LDAR/LDAPR,
//! STLR, LDXP/LDAXP, and the LDAXR ... STLXR ... CBNZ exclusive loop. An
//! unrecognized word is an error; the fault router turns that into
//! "unhandled" so the runtime can surface the real cause.

use anyhow::{anyhow, bail, Result};

use crate::context::ZERO_REG;

mod display;

// Compare-and-swap: sz 0010001 L 1 Rs o0 11111 Rn Rt.
const CAS_MASK: u32 = 0x3FA0_7C00;
const CAS_BITS: u32 = 0x08A0_7C00;
// Paired compare-and-swap: 0 sz 0010000 L 1 Rs o0 11111 Rn Rt.
const CASP_MASK: u32 = 0xBFA0_7C00;
const CASP_BITS: u32 = 0x0820_7C00;
// Atomic memory ops: sz 111000 A R 1 Rs o3 opc 00 Rn Rt.
const MEMOP_MASK: u32 = 0x3F20_0C00;
const MEMOP_BITS: u32 = 0x3820_0000;
// Load-acquire: sz 0010001 1 0 11111 1 11111 Rn Rt.
const LDAR_MASK: u32 = 0x3FFF_FC00;
const LDAR_BITS: u32 = 0x08DF_FC00;
// RCpc load-acquire, encoded in the atomic-memory-op space.
const LDAPR_MASK: u32 = 0x3FFF_FC00;
const LDAPR_BITS: u32 = 0x38BF_C000;
// Store-release: sz 0010001 0 0 11111 1 11111 Rn Rt.
const STLR_MASK: u32 = 0x3FFF_FC00;
const STLR_BITS: u32 = 0x089F_FC00;
// 64-bit exclusive pair loads; bit 15 distinguishes LDAXP from LDXP.
const LDXP_MASK: u32 = 0xFFFF_0000;
const LDXP_BITS: u32 = 0xC87F_0000;
// Load-exclusive-acquire: sz 0010000 1 0 11111 1 11111 Rn Rt.
const LDAXR_MASK: u32 = 0x3FFF_FC00;
const LDAXR_BITS: u32 = 0x085F_FC00;
// Store-exclusive-release: sz 0010000 0 0 Rs 1 11111 Rn Rt.
const STLXR_MASK: u32 = 0x3FE0_FC00;
const STLXR_BITS: u32 = 0x0800_FC00;
// Compare-and-branch-nonzero, either register width.
const CBNZ_MASK: u32 = 0x7F00_0000;
const CBNZ_BITS: u32 = 0x3500_0000;
// Register-register ALU forms with no shift, as the code generator emits
// them inside exclusive loops.
const ALU_MASK: u32 = 0x7FE0_FC00;
const ADD_BITS: u32 = 0x0B00_0000;
const SUB_BITS: u32 = 0x4B00_0000;
const AND_BITS: u32 = 0x0A00_0000;
const ORR_BITS: u32 = 0x2A00_0000;
const EOR_BITS: u32 = 0x4A00_0000;

/// Access width encoded in bits [31:30] of a load/store word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Half,
    Word,
    Double,
}

impl Size {
    pub fn bytes(self) -> usize {
        match self {
            Size::Byte => 1,
            Size::Half => 2,
            Size::Word => 4,
            Size::Double => 8,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Size::Byte,
            1 => Size::Half,
            2 => Size::Word,
            _ => Size::Double,
        }
    }
}

/// Operation selector of an atomic memory op (bits [15:12]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAtomicOp {
    Add,
    Clr,
    Eor,
    Set,
    Swap,
}

/// ALU operation reconstructed from an exclusive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusiveOp {
    Swap,
    Add,
    Sub,
    And,
    Or,
    Eor,
    Neg,
}

/// One faulting instruction, reduced to the fields the handlers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// CAS/CASAL: compare against `rs`, store `rt` on a match.
    Cas { size: Size, rs: u32, rt: u32, rn: u32 },
    /// CASP/CASPAL: `rs`/`rs+1` compared and `rt`/`rt+1` stored together.
    CasPair { size: Size, rs: u32, rt: u32, rn: u32 },
    /// LDADD/LDCLR/LDEOR/LDSET/SWP, any acquire-release combination.
    MemOp {
        size: Size,
        op: MemAtomicOp,
        rs: u32,
        rt: u32,
        rn: u32,
    },
    /// LDAR/LDAPR.
    LoadAcquire { size: Size, rt: u32, rn: u32 },
    /// LDXP/LDAXP of a 64-bit register pair.
    LoadAcquirePair { rt: u32, rt2: u32, rn: u32 },
    /// STLR.
    StoreRelease { size: Size, rt: u32, rn: u32 },
    /// A bare LDAXR opening an exclusive loop; the sequence scanner
    /// reconstructs the whole operation.
    Exclusive { size: Size, rd: u32, rn: u32 },
}

/// An LDAXR ... STLXR ... CBNZ loop folded back into one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusiveSequence {
    pub size: Size,
    /// Destination of the LDAXR; receives the pre-op value on fetch forms.
    pub rd: u32,
    /// Base address register shared by the LDAXR and the STLXR.
    pub rn: u32,
    pub op: ExclusiveOp,
    /// Register feeding the ALU op (the STLXR data register for a swap).
    pub data_src: u32,
    /// A fetch form keeps the loaded value as its architectural result; the
    /// store status and data registers differ exactly in that case.
    pub fetch: bool,
    /// Instructions from the LDAXR through the CBNZ inclusive; the runtime
    /// steps the PC past all of them.
    pub skip_instrs: usize,
}

fn rd(instr: u32) -> u32 {
    instr & 0x1F
}

fn rn(instr: u32) -> u32 {
    (instr >> 5) & 0x1F
}

fn rm(instr: u32) -> u32 {
    (instr >> 16) & 0x1F
}

fn rt2(instr: u32) -> u32 {
    (instr >> 10) & 0x1F
}

fn size_bits(instr: u32) -> u32 {
    instr >> 30
}

/// Decodes one faulting word into the handler-facing form.
pub fn decode(instr: u32) -> Result<Decoded> {
    if instr & CASP_MASK == CASP_BITS {
        let size = if instr & (1 << 30) != 0 {
            Size::Double
        } else {
            Size::Word
        };
        return Ok(Decoded::CasPair {
            size,
            rs: rm(instr),
            rt: rd(instr),
            rn: rn(instr),
        });
    }
    if instr & CAS_MASK == CAS_BITS {
        return Ok(Decoded::Cas {
            size: Size::from_bits(size_bits(instr)),
            rs: rm(instr),
            rt: rd(instr),
            rn: rn(instr),
        });
    }
    if instr & LDAXR_MASK == LDAXR_BITS {
        return Ok(Decoded::Exclusive {
            size: Size::from_bits(size_bits(instr)),
            rd: rd(instr),
            rn: rn(instr),
        });
    }
    if instr & LDAR_MASK == LDAR_BITS || instr & LDAPR_MASK == LDAPR_BITS {
        return Ok(Decoded::LoadAcquire {
            size: Size::from_bits(size_bits(instr)),
            rt: rd(instr),
            rn: rn(instr),
        });
    }
    if instr & STLR_MASK == STLR_BITS {
        return Ok(Decoded::StoreRelease {
            size: Size::from_bits(size_bits(instr)),
            rt: rd(instr),
            rn: rn(instr),
        });
    }
    if instr & LDXP_MASK == LDXP_BITS {
        return Ok(Decoded::LoadAcquirePair {
            rt: rd(instr),
            rt2: rt2(instr),
            rn: rn(instr),
        });
    }
    if instr & MEMOP_MASK == MEMOP_BITS {
        let op = match (instr >> 12) & 0xF {
            0 => MemAtomicOp::Add,
            1 => MemAtomicOp::Clr,
            2 => MemAtomicOp::Eor,
            3 => MemAtomicOp::Set,
            8 => MemAtomicOp::Swap,
            sel => bail!("unknown atomic memory op selector {sel:#x} in {instr:#010x}"),
        };
        return Ok(Decoded::MemOp {
            size: Size::from_bits(size_bits(instr)),
            op,
            rs: rm(instr),
            rt: rd(instr),
            rn: rn(instr),
        });
    }
    bail!("unrecognized instruction {instr:#010x}")
}

/// Rebuilds the semantic operation from an LDAXR and the words after it.
///
/// The code generator emits exclusive loops in a fixed shape: the LDAXR, at
/// most one ALU op, an STLXR on the same base register, and a CBNZ on the
/// store status register. The scan accepts exactly that shape within five
/// words of the load and refuses anything else.
pub fn decode_exclusive_sequence(words: &[u32]) -> Result<ExclusiveSequence> {
    let first = *words
        .first()
        .ok_or_else(|| anyhow!("empty instruction window"))?;
    if first & LDAXR_MASK != LDAXR_BITS {
        bail!("window does not start with a load-exclusive: {first:#010x}");
    }

    let size = Size::from_bits(size_bits(first));
    let rd_load = rd(first);
    let rn_base = rn(first);

    let mut op = ExclusiveOp::Swap;
    let mut data_src = 0;
    let mut fetch = false;
    let mut saw_store = false;
    let mut skip_instrs = 0;

    for (i, &word) in words.iter().enumerate().skip(1).take(5) {
        if word & ALU_MASK == ADD_BITS {
            op = ExclusiveOp::Add;
            data_src = rm(word);
        } else if word & ALU_MASK == SUB_BITS {
            // A subtract from the zero register is a negate of the loaded
            // value.
            op = if rn(word) == ZERO_REG {
                ExclusiveOp::Neg
            } else {
                ExclusiveOp::Sub
            };
            data_src = rm(word);
        } else if word & ALU_MASK == AND_BITS {
            op = ExclusiveOp::And;
            data_src = rm(word);
        } else if word & ALU_MASK == ORR_BITS {
            op = ExclusiveOp::Or;
            data_src = rm(word);
        } else if word & ALU_MASK == EOR_BITS {
            op = ExclusiveOp::Eor;
            data_src = rm(word);
        } else if word & STLXR_MASK == STLXR_BITS {
            if rn(word) != rn_base {
                bail!(
                    "store-exclusive base x{} does not match load-exclusive base x{}",
                    rn(word),
                    rn_base
                );
            }
            let status = rm(word);
            let data = rd(word);
            fetch = status != data;
            saw_store = true;
            if op == ExclusiveOp::Swap {
                // No ALU op in between: the store data register is the
                // incoming value.
                data_src = data;
            }
        } else if word & CBNZ_MASK == CBNZ_BITS {
            if !saw_store {
                bail!("retry branch before any store-exclusive");
            }
            skip_instrs = i + 1;
            break;
        } else {
            bail!("unexpected instruction {word:#010x} in exclusive loop");
        }
    }
    if skip_instrs == 0 {
        bail!("no retry branch within the scan window");
    }

    Ok(ExclusiveSequence {
        size,
        rd: rd_load,
        rn: rn_base,
        op,
        data_src,
        fetch,
        skip_instrs,
    })
}
