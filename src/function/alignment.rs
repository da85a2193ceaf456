use crate::error::{Error, Result};
use crate::instructions::{BinaryOp, Instruction, InstructionKind, Operand2};
use crate::isa::{Extension, Microarchitecture};
use crate::registers::{Register, RegisterKind, SP};

/// ARMv7-M requires an 8-byte aligned SP at every public interface, so
/// every BL/BLX must observe a displacement that is a multiple of 8.
/// The walk tracks SP relative to function entry; the prologue is always
/// call-free, so its bytes only shift the reported offset.
pub(crate) fn validate_stack_alignment(
    instructions: &[Instruction],
    target: Microarchitecture,
) -> Result<()> {
    if !target.extensions().contains(Extension::V7M) {
        return Ok(());
    }

    let mut stack_offset: i32 = 0;
    for instruction in instructions {
        match &instruction.kind {
            InstructionKind::Push { registers, .. } => {
                stack_offset += 4 * registers.len() as i32;
            }
            InstructionKind::Pop { registers, .. } => {
                stack_offset -= 4 * registers.len() as i32;
            }
            InstructionKind::StoreMultiple {
                base,
                writeback: true,
                registers,
                ..
            } if *base == SP => {
                stack_offset += 4 * registers.len() as i32;
            }
            InstructionKind::LoadMultiple {
                base,
                writeback: true,
                registers,
                ..
            } if *base == SP => {
                stack_offset -= 4 * registers.len() as i32;
            }
            InstructionKind::VfpPush { registers } => {
                stack_offset += vfp_bytes(registers);
            }
            InstructionKind::VfpPop { registers } => {
                stack_offset -= vfp_bytes(registers);
            }
            InstructionKind::Binary {
                op,
                rd,
                rn,
                op2: Operand2::Immediate(immediate),
                ..
            } if *rd == SP && *rn == SP => match op {
                BinaryOp::Sub => stack_offset += immediate,
                BinaryOp::Add => stack_offset -= immediate,
                _ => {}
            },
            InstructionKind::Call { .. } => {
                if stack_offset % 8 != 0 {
                    return Err(Error::StackAlignment {
                        mnemonic: instruction.kind.mnemonic(),
                        stack_offset,
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn vfp_bytes(registers: &[Register]) -> i32 {
    registers
        .iter()
        .map(|register| match register.kind() {
            RegisterKind::S => 4,
            _ => 8,
        })
        .sum()
}
