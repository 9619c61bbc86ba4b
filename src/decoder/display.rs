use std::fmt;

use super::{Decoded, ExclusiveOp, ExclusiveSequence, MemAtomicOp, Size};

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self {
            Size::Byte => "b",
            Size::Half => "h",
            Size::Word => "w",
            Size::Double => "x",
        };
        write!(f, "{suffix}")
    }
}

impl fmt::Display for MemAtomicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemAtomicOp::Add => "ldadd",
            MemAtomicOp::Clr => "ldclr",
            MemAtomicOp::Eor => "ldeor",
            MemAtomicOp::Set => "ldset",
            MemAtomicOp::Swap => "swp",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for ExclusiveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExclusiveOp::Swap => "swap",
            ExclusiveOp::Add => "add",
            ExclusiveOp::Sub => "sub",
            ExclusiveOp::And => "and",
            ExclusiveOp::Or => "orr",
            ExclusiveOp::Eor => "eor",
            ExclusiveOp::Neg => "neg",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Cas { size, rs, rt, rn } => {
                write!(f, "cas{size} r{rs}, r{rt}, [x{rn}]")
            }
            Decoded::CasPair { size, rs, rt, rn } => {
                write!(f, "casp{size} r{rs}:r{}, r{rt}:r{}, [x{rn}]", rs + 1, rt + 1)
            }
            Decoded::MemOp {
                size,
                op,
                rs,
                rt,
                rn,
            } => write!(f, "{op}{size} r{rs}, r{rt}, [x{rn}]"),
            Decoded::LoadAcquire { size, rt, rn } => write!(f, "ldar{size} r{rt}, [x{rn}]"),
            Decoded::LoadAcquirePair { rt, rt2, rn } => {
                write!(f, "ldaxp x{rt}, x{rt2}, [x{rn}]")
            }
            Decoded::StoreRelease { size, rt, rn } => write!(f, "stlr{size} r{rt}, [x{rn}]"),
            Decoded::Exclusive { size, rd, rn } => write!(f, "ldaxr{size} r{rd}, [x{rn}]"),
        }
    }
}

impl fmt::Display for ExclusiveSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exclusive {}{} r{}, [x{}], src=r{}{} ({} instrs)",
            self.op,
            self.size,
            self.rd,
            self.rn,
            self.data_src,
            if self.fetch { ", fetch" } else { "" },
            self.skip_instrs,
        )
    }
}
