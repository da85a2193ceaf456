use crate::error::{Error, Result};
use crate::function::Function;
use crate::instructions::{
    AccessWidth, BinaryOp, CallTarget, CompareOp, Condition, Instruction, InstructionKind,
    LoadSource, MemoryOperand, MultipleMode, Operand2, UnaryOp, VfpOp,
};
use crate::literal::Constant;
use crate::registers::{Register, RegisterKind, FIRST_VIRTUAL_NUMBER};

/// Handle for an external symbol registered with
/// [`import_function`](struct.FunctionBuilder.html#method.import_function).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExternalFunction {
    name: String,
}

impl ExternalFunction {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Label pair for a loop body: branch back to `begin()` to iterate.
#[derive(Clone, Debug)]
pub struct Loop {
    name: String,
}

impl Loop {
    pub fn begin(&self) -> String {
        format!("{}.begin", self.name)
    }

    pub fn end(&self) -> String {
        format!("{}.end", self.name)
    }
}

/// The emission surface handed to the function body. Every emitter
/// validates the instruction's ISA requirements against the target and
/// records physical output registers for callee-save preservation before
/// appending to the stream.
pub struct FunctionBuilder {
    function: Function,
    virtual_counter: u32,
}

impl FunctionBuilder {
    pub(crate) fn new(function: Function) -> FunctionBuilder {
        FunctionBuilder {
            function,
            virtual_counter: FIRST_VIRTUAL_NUMBER,
        }
    }

    pub(crate) fn into_function(self) -> Function {
        self.function
    }

    fn emit(&mut self, kind: InstructionKind) -> Result<()> {
        for extension in kind.isa_extensions().iter() {
            if !self.function.target.extensions().contains(extension) {
                return Err(Error::UnsupportedIsa {
                    extension,
                    target: self.function.target,
                });
            }
        }
        if !matches!(kind, InstructionKind::AssumeInitialized { .. }) {
            for output in kind.output_registers() {
                if !output.is_virtual() {
                    self.function.stack_frame.preserve_register(output);
                }
            }
        }
        self.function.instructions.push(Instruction::new(kind));
        Ok(())
    }

    fn new_virtual(&mut self, kind: RegisterKind) -> Register {
        let number = self.virtual_counter;
        self.virtual_counter += 1;
        Register::virtual_register(kind, number)
    }

    pub fn general_purpose_register(&mut self) -> Register {
        self.new_virtual(RegisterKind::GeneralPurpose)
    }

    pub fn s_register(&mut self) -> Register {
        self.new_virtual(RegisterKind::S)
    }

    pub fn d_register(&mut self) -> Register {
        self.new_virtual(RegisterKind::D)
    }

    pub fn q_register(&mut self) -> Register {
        self.new_virtual(RegisterKind::Q)
    }

    pub fn wmmx_register(&mut self) -> Register {
        self.new_virtual(RegisterKind::Wmmx)
    }

    /// Emits one argument-load pseudo per declared argument and returns
    /// the virtual destination registers in declaration order. Arguments
    /// wider than 4 bytes are placed by the ABI but must be read
    /// manually from their register pair or stack slot.
    pub fn load_arguments(&mut self) -> Result<Vec<Register>> {
        let arguments: Vec<(usize, crate::abi::ArgumentLocation, String, u32)> = self
            .function
            .arguments
            .iter()
            .enumerate()
            .map(|(index, argument)| {
                (
                    index,
                    argument.location().expect("locations assigned at build entry"),
                    argument.name().to_owned(),
                    argument.size(),
                )
            })
            .collect();
        let mut destinations = Vec::with_capacity(arguments.len());
        for (index, location, name, size) in arguments {
            if size > 4 {
                return Err(Error::UnsupportedArgument { name, size });
            }
            let destination = self.general_purpose_register();
            self.emit(InstructionKind::LoadArgument {
                destination,
                argument: index,
                source: location,
            })?;
            destinations.push(destination);
        }
        Ok(destinations)
    }

    /// Registers an external symbol; the ARMCC dialect materializes an
    /// IMPORT directive for it.
    pub fn import_function(&mut self, name: &str) -> ExternalFunction {
        self.function.external_functions.insert(name.to_owned());
        ExternalFunction {
            name: name.to_owned(),
        }
    }

    pub fn label(&mut self, name: &str) -> Result<()> {
        self.emit(InstructionKind::Label {
            name: name.to_owned(),
        })
    }

    pub fn begin_loop(&mut self, name: &str) -> Result<Loop> {
        let looped = Loop {
            name: name.to_owned(),
        };
        self.label(&looped.begin())?;
        Ok(looped)
    }

    pub fn end_loop(&mut self, looped: &Loop) -> Result<()> {
        self.label(&looped.end())
    }

    fn unary(&mut self, op: UnaryOp, flags: bool, rd: Register, src: Operand2) -> Result<()> {
        self.emit(InstructionKind::Unary { op, flags, rd, src })
    }

    pub fn mov<S: Into<Operand2>>(&mut self, rd: Register, src: S) -> Result<()> {
        self.unary(UnaryOp::Mov, false, rd, src.into())
    }

    pub fn movs<S: Into<Operand2>>(&mut self, rd: Register, src: S) -> Result<()> {
        self.unary(UnaryOp::Mov, true, rd, src.into())
    }

    pub fn mvn<S: Into<Operand2>>(&mut self, rd: Register, src: S) -> Result<()> {
        self.unary(UnaryOp::Mvn, false, rd, src.into())
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        flags: bool,
        rd: Register,
        rn: Register,
        op2: Operand2,
    ) -> Result<()> {
        self.emit(InstructionKind::Binary {
            op,
            flags,
            rd,
            rn,
            op2,
        })
    }

    pub fn add<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Add, false, rd, rn, op2.into())
    }

    pub fn adds<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Add, true, rd, rn, op2.into())
    }

    pub fn sub<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Sub, false, rd, rn, op2.into())
    }

    pub fn subs<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Sub, true, rd, rn, op2.into())
    }

    pub fn rsb<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Rsb, false, rd, rn, op2.into())
    }

    pub fn and_<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::And, false, rd, rn, op2.into())
    }

    pub fn orr<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Orr, false, rd, rn, op2.into())
    }

    pub fn eor<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Eor, false, rd, rn, op2.into())
    }

    pub fn bic<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Bic, false, rd, rn, op2.into())
    }

    pub fn lsl<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Lsl, false, rd, rn, op2.into())
    }

    pub fn lsr<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Lsr, false, rd, rn, op2.into())
    }

    pub fn asr<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Asr, false, rd, rn, op2.into())
    }

    pub fn ror<S: Into<Operand2>>(&mut self, rd: Register, rn: Register, op2: S) -> Result<()> {
        self.binary(BinaryOp::Ror, false, rd, rn, op2.into())
    }

    pub fn mul(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.binary(BinaryOp::Mul, false, rd, rn, rm.into())
    }

    pub fn sdiv(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.binary(BinaryOp::Sdiv, false, rd, rn, rm.into())
    }

    pub fn udiv(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.binary(BinaryOp::Udiv, false, rd, rn, rm.into())
    }

    fn compare(&mut self, op: CompareOp, rn: Register, op2: Operand2) -> Result<()> {
        self.emit(InstructionKind::Compare { op, rn, op2 })
    }

    pub fn cmp<S: Into<Operand2>>(&mut self, rn: Register, op2: S) -> Result<()> {
        self.compare(CompareOp::Cmp, rn, op2.into())
    }

    pub fn cmn<S: Into<Operand2>>(&mut self, rn: Register, op2: S) -> Result<()> {
        self.compare(CompareOp::Cmn, rn, op2.into())
    }

    pub fn tst<S: Into<Operand2>>(&mut self, rn: Register, op2: S) -> Result<()> {
        self.compare(CompareOp::Tst, rn, op2.into())
    }

    pub fn teq<S: Into<Operand2>>(&mut self, rn: Register, op2: S) -> Result<()> {
        self.compare(CompareOp::Teq, rn, op2.into())
    }

    fn load(&mut self, width: AccessWidth, rt: Register, address: MemoryOperand) -> Result<()> {
        self.emit(InstructionKind::Load {
            width,
            rt,
            source: LoadSource::Memory(address),
        })
    }

    pub fn ldr(&mut self, rt: Register, address: MemoryOperand) -> Result<()> {
        self.load(AccessWidth::Word, rt, address)
    }

    pub fn ldrb(&mut self, rt: Register, address: MemoryOperand) -> Result<()> {
        self.load(AccessWidth::Byte, rt, address)
    }

    pub fn ldrh(&mut self, rt: Register, address: MemoryOperand) -> Result<()> {
        self.load(AccessWidth::Half, rt, address)
    }

    fn store(&mut self, width: AccessWidth, rt: Register, address: MemoryOperand) -> Result<()> {
        self.emit(InstructionKind::Store { width, rt, address })
    }

    pub fn str_(&mut self, rt: Register, address: MemoryOperand) -> Result<()> {
        self.store(AccessWidth::Word, rt, address)
    }

    pub fn strb(&mut self, rt: Register, address: MemoryOperand) -> Result<()> {
        self.store(AccessWidth::Byte, rt, address)
    }

    pub fn strh(&mut self, rt: Register, address: MemoryOperand) -> Result<()> {
        self.store(AccessWidth::Half, rt, address)
    }

    pub fn push(&mut self, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::Push {
            wide: false,
            registers: registers.to_vec(),
        })
    }

    pub fn pop(&mut self, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::Pop {
            wide: false,
            registers: registers.to_vec(),
        })
    }

    pub fn push_w(&mut self, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::Push {
            wide: true,
            registers: registers.to_vec(),
        })
    }

    pub fn pop_w(&mut self, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::Pop {
            wide: true,
            registers: registers.to_vec(),
        })
    }

    pub fn stmdb(&mut self, base: Register, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::StoreMultiple {
            mode: MultipleMode::DecrementBefore,
            base,
            writeback: true,
            registers: registers.to_vec(),
        })
    }

    pub fn ldmia(&mut self, base: Register, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::LoadMultiple {
            mode: MultipleMode::IncrementAfter,
            base,
            writeback: true,
            registers: registers.to_vec(),
        })
    }

    pub fn branch<T: Into<String>>(&mut self, condition: Option<Condition>, target: T) -> Result<()> {
        self.emit(InstructionKind::Branch {
            condition,
            target: target.into(),
        })
    }

    pub fn b<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(None, target)
    }

    pub fn beq<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(Some(Condition::Eq), target)
    }

    pub fn bne<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(Some(Condition::Ne), target)
    }

    pub fn bge<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(Some(Condition::Ge), target)
    }

    pub fn blt<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(Some(Condition::Lt), target)
    }

    pub fn bgt<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(Some(Condition::Gt), target)
    }

    pub fn ble<T: Into<String>>(&mut self, target: T) -> Result<()> {
        self.branch(Some(Condition::Le), target)
    }

    pub fn bl(&mut self, target: &ExternalFunction) -> Result<()> {
        self.emit(InstructionKind::Call {
            target: CallTarget::Symbol(target.name.clone()),
        })
    }

    pub fn blx(&mut self, register: Register) -> Result<()> {
        self.emit(InstructionKind::Call {
            target: CallTarget::Register(register),
        })
    }

    pub fn bx(&mut self, register: Register) -> Result<()> {
        self.emit(InstructionKind::BranchExchange { register })
    }

    /// The return pseudo; decomposes into `BX lr` with the epilogue glue
    /// inserted in front of it later.
    pub fn ret(&mut self) -> Result<()> {
        self.emit(InstructionKind::Return)
    }

    pub fn vmov(&mut self, rd: Register, src: Register) -> Result<()> {
        self.emit(InstructionKind::VfpMove { rd, src })
    }

    fn vfp_binary(&mut self, op: VfpOp, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.emit(InstructionKind::VfpBinary { op, rd, rn, rm })
    }

    pub fn vadd(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.vfp_binary(VfpOp::Add, rd, rn, rm)
    }

    pub fn vsub(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.vfp_binary(VfpOp::Sub, rd, rn, rm)
    }

    pub fn vmul(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.vfp_binary(VfpOp::Mul, rd, rn, rm)
    }

    pub fn vdiv(&mut self, rd: Register, rn: Register, rm: Register) -> Result<()> {
        self.vfp_binary(VfpOp::Div, rd, rn, rm)
    }

    pub fn vldr(&mut self, rd: Register, address: MemoryOperand) -> Result<()> {
        self.emit(InstructionKind::VfpLoad {
            rd,
            source: LoadSource::Memory(address),
        })
    }

    pub fn vstr(&mut self, rd: Register, address: MemoryOperand) -> Result<()> {
        self.emit(InstructionKind::VfpStore { rd, address })
    }

    pub fn vpush(&mut self, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::VfpPush {
            registers: registers.to_vec(),
        })
    }

    pub fn vpop(&mut self, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::VfpPop {
            registers: registers.to_vec(),
        })
    }

    pub fn vldm(&mut self, base: Register, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::VfpLoadMultiple {
            base,
            registers: registers.to_vec(),
        })
    }

    pub fn vstm(&mut self, base: Register, registers: &[Register]) -> Result<()> {
        self.emit(InstructionKind::VfpStoreMultiple {
            base,
            registers: registers.to_vec(),
        })
    }

    pub fn vld1_32(&mut self, registers: &[Register], address: MemoryOperand) -> Result<()> {
        self.emit(InstructionKind::NeonLoad {
            registers: registers.to_vec(),
            address,
        })
    }

    pub fn vst1_32(&mut self, registers: &[Register], address: MemoryOperand) -> Result<()> {
        self.emit(InstructionKind::NeonStore {
            registers: registers.to_vec(),
            address,
        })
    }

    /// Loads a pool constant; lowers into a literal LDR/VLDR once labels
    /// are assigned.
    pub fn load_constant(&mut self, destination: Register, constant: Constant) -> Result<()> {
        self.emit(InstructionKind::LoadConstant {
            destination,
            constant,
        })
    }

    /// Marks a register as initialized for the analysis passes without
    /// emitting code.
    pub fn assume_initialized(&mut self, register: Register) -> Result<()> {
        self.emit(InstructionKind::AssumeInitialized { register })
    }
}
