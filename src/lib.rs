//! Embeddable assembly-code generator for the ARM architecture, with an
//! emphasis on ARMv7-M (Cortex-M) cores.
//!
//! A function is described by its signature and a body emitted against an
//! unlimited pool of *virtual* registers. The generator then runs liveness
//! analysis over the label/branch graph, allocates physical registers under
//! bitboard conflict and contiguity constraints, synthesizes the stack
//! frame (callee-saved preservation, ARMv7-M high-register strategies,
//! `VPUSH`/`VPOP`), places arguments per the ARM EABI, validates 8-byte SP
//! alignment at call sites on ARMv7-M, lays out the constant pool, and
//! renders text in one of two dialects.
//!
//! ```
//! use armgen::{Abi, Argument, Function, MemoryOperand, Microarchitecture};
//!
//! let function = Function::declare("double_words", Microarchitecture::CortexM4, Abi::GnuEabiHf)
//!     .argument(Argument::pointer("input"))
//!     .argument(Argument::pointer("output"))
//!     .argument(Argument::size_t("count"))
//!     .build(|b| {
//!         let arguments = b.load_arguments()?;
//!         let (input, output, count) = (arguments[0], arguments[1], arguments[2]);
//!         let main = b.begin_loop("main")?;
//!         let value = b.general_purpose_register();
//!         b.ldr(value, MemoryOperand::post_indexed(input, 4))?;
//!         b.lsl(value, value, 1)?;
//!         b.str_(value, MemoryOperand::post_indexed(output, 4))?;
//!         b.subs(count, count, 4)?;
//!         b.bne(main.begin())?;
//!         b.end_loop(&main)?;
//!         b.ret()
//!     })
//!     .unwrap();
//!
//! assert!(function.assembly().contains(".arch armv7-m"));
//! ```
//!
//! Output dialects:
//!
//!  Dialect | Labels | Constants | Extras
//! ---------|--------|-----------|-------
//!  GAS     | `L<fn>.<label>` | `.section .rodata.<uarch>` | `.syntax unified`, `.arch`/`.cpu`, `.fpu`
//!  ARMCC   | `<fn>_<label>` (dots flattened) | `AREA \|\|.constdata\|\|` | `PROC`/`EXPORT`/`ENDP`, `IMPORT`, `PRESERVE8`
//!
//! The generator never produces binary machine code and performs no
//! optimization beyond dropping moves whose source and destination
//! coincide.

pub mod abi;
mod error;
pub mod formats;
mod function;
pub mod instructions;
pub mod isa;
mod literal;
pub mod registers;

#[cfg(test)]
mod test;

pub(crate) type Endian = byteorder::LittleEndian;

pub use crate::abi::{Abi, ArgumentLocation};
pub use crate::error::{Error, Result};
pub use crate::formats::{AssemblyFormat, HighRegisterStrategy};
pub use crate::function::{
    Argument, ExternalFunction, Function, FunctionBuilder, FunctionDeclaration, Loop, ValueType,
};
pub use crate::instructions::{Condition, MemoryOperand, Operand2};
pub use crate::isa::{Extension, Extensions, Microarchitecture};
pub use crate::literal::Constant;
pub use crate::registers::{Register, RegisterKind};
