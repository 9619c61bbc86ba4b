//! Alignment-fault emulation core for an x86-on-ARM64 binary translator.
//!
//! The translator lowers guest x86 atomics to native ARM64 atomic
//! instructions. ARM64 raises `SIGBUS` with `BUS_ADRALN` when such an
//! instruction touches a misaligned address, where x86 would simply have
//! taken a bus lock. This crate is invoked from the translator's signal
//! handler to repair those faults: it decodes the trapped instruction,
//! rebuilds the intended atomic operation from the saved machine state,
//! performs it through compare-exchange loops on the containing aligned
//! cells, and writes the result back into the register file so the thread
//! can resume as if the access had succeeded.
//!
//! Accesses contained in one 16-byte cell are emulated exactly. Accesses
//! crossing a 16-byte boundary have no atomic host primitive and get a
//! best-effort dual-CAS that detects tearing and reports it through the
//! [`telemetry`] counters.
//!
//! Everything here runs on the faulting thread inside the signal frame: no
//! heap, no locks, no blocking, no shared mutable state beyond two relaxed
//! counters.

pub mod alignment;
pub mod cell;
pub mod context;
pub mod decoder;
pub mod handlers;
pub mod kernel;
pub mod telemetry;

pub use context::{FaultDescriptor, TrappedContext, BUS_ADRALN, ZERO_REG};
pub use handlers::{handle_bus_fault, Outcome};
