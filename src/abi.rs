use crate::registers::{Register, R0, R1, R10, R11, R12, R2, R3, R4, R5, R6, R7, R8, R9};

/// Where the ABI placed one argument: a single register, an even-aligned
/// register pair for 8-byte values, or a stack slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgumentLocation {
    Register(Register),
    RegisterPair(Register, Register),
    Stack(u32),
}

/// Calling conventions for the ARM EABI. Both variants place the first
/// four 32-bit arguments in r0-r3 and preserve r4-r11 and d8-d15; they
/// differ only in how floating point results travel, which this generator
/// does not model.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Abi {
    GnuEabi,
    GnuEabiHf,
}

impl Abi {
    pub fn pointer_size(self) -> u32 {
        4
    }

    pub fn argument_registers(self) -> &'static [Register] {
        &[R0, R1, R2, R3]
    }

    pub fn volatile_registers(self) -> &'static [Register] {
        &[R12]
    }

    pub fn callee_save_registers(self) -> &'static [Register] {
        &[R4, R5, R6, R7, R8, R9, R10, R11]
    }

    pub fn callee_save_d_registers(self) -> Vec<Register> {
        (8..16).map(Register::d).collect()
    }

    pub(crate) fn is_callee_save(self, register: Register) -> bool {
        self.callee_save_registers().contains(&register)
    }

    pub(crate) fn is_callee_save_d(self, register: Register) -> bool {
        let number = register.physical_number();
        (8..16).contains(&number)
    }

    /// Preference order for general purpose allocation: scratch first,
    /// then argument registers from the back, then callee-saved.
    pub(crate) fn allocatable_registers(self) -> Vec<Register> {
        let mut registers = Vec::new();
        registers.extend_from_slice(self.volatile_registers());
        registers.extend(self.argument_registers().iter().rev());
        registers.extend_from_slice(self.callee_save_registers());
        registers
    }
}

impl std::fmt::Display for Abi {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Abi::GnuEabi => f.write_str("arm_gnueabi"),
            Abi::GnuEabiHf => f.write_str("arm_gnueabihf"),
        }
    }
}
