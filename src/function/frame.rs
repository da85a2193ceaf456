use crate::abi::Abi;
use crate::formats::HighRegisterStrategy;
use crate::instructions::{InstructionKind, MultipleMode};
use crate::registers::{Register, RegisterKind, R3, SP};

/// Callee-saved registers the function must preserve. The sets grow while
/// instructions are emitted (physical outputs) and are refreshed once
/// register allocation has made every output physical.
#[derive(Debug)]
pub(crate) struct StackFrame {
    abi: Abi,
    general_purpose_registers: Vec<Register>,
    d_registers: Vec<Register>,
}

impl StackFrame {
    pub(crate) fn new(abi: Abi) -> StackFrame {
        StackFrame {
            abi,
            general_purpose_registers: Vec::new(),
            d_registers: Vec::new(),
        }
    }

    pub(crate) fn preserve_register(&mut self, register: Register) {
        if register.is_virtual() {
            // Virtual S registers cannot be promoted to a D pair yet;
            // the post-allocation refresh sees them as physical.
            return;
        }
        match register.kind() {
            RegisterKind::GeneralPurpose => {
                if self.abi.is_callee_save(register)
                    && !self.general_purpose_registers.contains(&register)
                {
                    self.general_purpose_registers.push(register);
                }
            }
            RegisterKind::S => {
                let parent = Register::d(register.physical_number() / 2);
                self.preserve_d(parent);
            }
            RegisterKind::D => self.preserve_d(register),
            RegisterKind::Q => {
                self.preserve_d(register.low());
                self.preserve_d(register.high());
            }
            RegisterKind::Wmmx => {}
        }
    }

    fn preserve_d(&mut self, register: Register) {
        if self.abi.is_callee_save_d(register) && !self.d_registers.contains(&register) {
            self.d_registers.push(register);
        }
    }

    pub(crate) fn saved_general_purpose(&self) -> &[Register] {
        &self.general_purpose_registers
    }

    pub(crate) fn saved_d(&self) -> &[Register] {
        &self.d_registers
    }

    /// Offset from SP to the first stack-passed argument once the
    /// prologue has run: the padded low-register block plus the D saves.
    pub(crate) fn parameters_offset(&self, is_v7m: bool) -> u32 {
        let gp_count = if is_v7m {
            self.general_purpose_registers
                .iter()
                .filter(|register| register.physical_number() <= 7)
                .count()
        } else {
            self.general_purpose_registers.len()
        };
        let mut offset = gp_count as u32 * 4;
        if offset % 8 == 4 {
            offset += 4;
        }
        offset + self.d_registers.len() as u32 * 8
    }

    pub(crate) fn generate_prologue(
        &self,
        is_v7m: bool,
        strategy: HighRegisterStrategy,
    ) -> Vec<InstructionKind> {
        let mut instructions = Vec::new();
        if !self.general_purpose_registers.is_empty() {
            if is_v7m {
                let (low, high) = self.split_registers();
                if !low.is_empty() {
                    instructions.push(InstructionKind::Push {
                        wide: false,
                        registers: pad_to_even(low),
                    });
                }
                if !high.is_empty() {
                    instructions.push(match strategy {
                        HighRegisterStrategy::Stmdb => InstructionKind::StoreMultiple {
                            mode: MultipleMode::DecrementBefore,
                            base: SP,
                            writeback: true,
                            registers: sorted(high),
                        },
                        _ => InstructionKind::Push {
                            wide: true,
                            registers: sorted(high),
                        },
                    });
                }
            } else {
                instructions.push(InstructionKind::Push {
                    wide: false,
                    registers: pad_to_even(self.general_purpose_registers.clone()),
                });
            }
        }
        if !self.d_registers.is_empty() {
            instructions.push(InstructionKind::VfpPush {
                registers: sorted(self.d_registers.clone()),
            });
        }
        instructions
    }

    pub(crate) fn generate_epilogue(
        &self,
        is_v7m: bool,
        strategy: HighRegisterStrategy,
    ) -> Vec<InstructionKind> {
        let mut instructions = Vec::new();
        if !self.d_registers.is_empty() {
            instructions.push(InstructionKind::VfpPop {
                registers: sorted(self.d_registers.clone()),
            });
        }
        if !self.general_purpose_registers.is_empty() {
            if is_v7m {
                let (low, high) = self.split_registers();
                if !high.is_empty() {
                    instructions.push(match strategy {
                        HighRegisterStrategy::Stmdb => InstructionKind::LoadMultiple {
                            mode: MultipleMode::IncrementAfter,
                            base: SP,
                            writeback: true,
                            registers: sorted(high),
                        },
                        _ => InstructionKind::Pop {
                            wide: true,
                            registers: sorted(high),
                        },
                    });
                }
                if !low.is_empty() {
                    instructions.push(InstructionKind::Pop {
                        wide: false,
                        registers: pad_to_even(low),
                    });
                }
            } else {
                instructions.push(InstructionKind::Pop {
                    wide: false,
                    registers: pad_to_even(self.general_purpose_registers.clone()),
                });
            }
        }
        instructions
    }

    fn split_registers(&self) -> (Vec<Register>, Vec<Register>) {
        self.general_purpose_registers
            .iter()
            .copied()
            .partition(|register| register.physical_number() <= 7)
    }
}

fn sorted(mut registers: Vec<Register>) -> Vec<Register> {
    registers.sort_by_key(|register| register.physical_number());
    registers
}

/// Keeps 16-bit PUSH/POP lists at an even register count so each one
/// moves SP by a multiple of 8, appending r3 as a scratch filler.
fn pad_to_even(mut registers: Vec<Register>) -> Vec<Register> {
    if registers.len() % 2 == 1 {
        registers.push(R3);
    }
    sorted(registers)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::formats::HighRegisterStrategy;
    use crate::registers::{R4, R8};

    #[test]
    fn odd_low_register_sets_are_padded() {
        let mut frame = StackFrame::new(Abi::GnuEabi);
        frame.preserve_register(R4);
        let prologue = frame.generate_prologue(true, HighRegisterStrategy::PushW);
        assert_eq!(prologue.len(), 1);
        assert_eq!(prologue[0].to_string(), "PUSH {r3, r4}");
        let epilogue = frame.generate_epilogue(true, HighRegisterStrategy::PushW);
        assert_eq!(epilogue[0].to_string(), "POP {r3, r4}");
    }

    #[test]
    fn high_registers_follow_the_strategy() {
        let mut frame = StackFrame::new(Abi::GnuEabi);
        frame.preserve_register(R8);
        let push_w = frame.generate_prologue(true, HighRegisterStrategy::PushW);
        assert_eq!(push_w[0].to_string(), "PUSH.W {r8}");
        let stmdb = frame.generate_prologue(true, HighRegisterStrategy::Stmdb);
        assert_eq!(stmdb[0].to_string(), "STMDB sp!, {r8}");
        let ldmia = frame.generate_epilogue(true, HighRegisterStrategy::Stmdb);
        assert_eq!(ldmia[0].to_string(), "LDMIA sp!, {r8}");
    }

    #[test]
    fn s_register_preservation_promotes_to_the_d_pair() {
        let mut frame = StackFrame::new(Abi::GnuEabiHf);
        frame.preserve_register(Register::s(17));
        assert_eq!(frame.saved_d(), &[Register::d(8)]);
        frame.preserve_register(Register::d(8));
        assert_eq!(frame.saved_d().len(), 1);
    }

    #[test]
    fn volatile_registers_are_not_preserved() {
        let mut frame = StackFrame::new(Abi::GnuEabi);
        frame.preserve_register(crate::registers::R0);
        frame.preserve_register(crate::registers::R12);
        frame.preserve_register(Register::d(0));
        assert!(frame.saved_general_purpose().is_empty());
        assert!(frame.saved_d().is_empty());
        assert!(frame.generate_prologue(true, HighRegisterStrategy::PushW).is_empty());
    }
}
