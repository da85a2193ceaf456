use crate::isa::{Extension, Microarchitecture};

use std::error::Error as StdError;
use std::fmt;

/// Errors raised while building a function. All of them abort the build;
/// no partial assembly is ever produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// An instruction requires an ISA extension the target does not have.
    UnsupportedIsa {
        extension: Extension,
        target: Microarchitecture,
    },
    /// An argument has a size the ABI cannot pass (must be 1..=4 or 8 bytes).
    UnsupportedArgument { name: String, size: u32 },
    /// A second function build was started while another one was active
    /// on the same thread.
    NestedBuild { active: String },
    /// The instruction stream has no ENTRY label.
    NoEntry,
    /// A branch targets a label that was never emitted.
    UnknownLabel { label: String },
    /// A virtual register or register group ran out of allocation options.
    RegisterAllocation(String),
    /// The stack pointer is not 8-byte aligned before a call on ARMv7-M.
    StackAlignment { mnemonic: String, stack_offset: i32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnsupportedIsa { extension, target } => write!(
                f,
                "{} is not supported on the target microarchitecture {}",
                extension, target
            ),
            Error::UnsupportedArgument { name, size } => write!(
                f,
                "Unsupported argument size {} for argument \"{}\"",
                size, name
            ),
            Error::NestedBuild { active } => {
                write!(f, "Function {} was not detached", active)
            }
            Error::NoEntry => f.write_str("Instruction stream does not contain the ENTRY label"),
            Error::UnknownLabel { label } => write!(f, "Label {} was not found", label),
            Error::RegisterAllocation(message) => f.write_str(message),
            Error::StackAlignment {
                mnemonic,
                stack_offset,
            } => write!(
                f,
                "Stack is not 8-byte aligned before {} instruction.\n\
                 Current stack offset: {} bytes (misaligned by {} bytes).\n\
                 ARMv7-M requires 8-byte stack alignment at function calls (AAPCS requirement).\n\
                 Add a dummy register to PUSH instructions or adjust stack manually to maintain alignment.",
                mnemonic,
                stack_offset,
                stack_offset.rem_euclid(8)
            ),
        }
    }
}

impl StdError for Error {}

pub type Result<T> = std::result::Result<T, Error>;
