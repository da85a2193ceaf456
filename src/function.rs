mod alignment;
mod allocator;
mod assembly;
mod builder;
mod frame;
mod liveness;

pub use self::builder::{ExternalFunction, FunctionBuilder, Loop};

use crate::abi::{Abi, ArgumentLocation};
use crate::error::{Error, Result};
use crate::formats::{AssemblyFormat, HighRegisterStrategy};
use crate::instructions::{Instruction, InstructionKind, LoadSource, MemoryOperand, UnaryOp};
use crate::isa::{Extension, Microarchitecture};
use crate::literal::{Constant, ConstantBucket};
use self::frame::StackFrame;

use log::debug;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

thread_local! {
    static ACTIVE_FUNCTION: RefCell<Option<String>> = RefCell::new(None);
}

struct ActiveFunctionGuard;

impl ActiveFunctionGuard {
    fn attach(name: &str) -> Result<ActiveFunctionGuard> {
        ACTIVE_FUNCTION.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(active) = active.as_ref() {
                return Err(Error::NestedBuild {
                    active: active.clone(),
                });
            }
            *active = Some(name.to_owned());
            Ok(ActiveFunctionGuard)
        })
    }
}

impl Drop for ActiveFunctionGuard {
    fn drop(&mut self) {
        ACTIVE_FUNCTION.with(|active| active.borrow_mut().take());
    }
}

/// Declared value types for arguments and results. Pointer-like types take
/// the ABI pointer size.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Pointer,
    Size,
}

impl ValueType {
    fn size(self, abi: Abi) -> u32 {
        match self {
            ValueType::UInt8 | ValueType::Int8 => 1,
            ValueType::UInt16 | ValueType::Int16 => 2,
            ValueType::UInt32 | ValueType::Int32 | ValueType::Float32 => 4,
            ValueType::UInt64 | ValueType::Int64 | ValueType::Float64 => 8,
            ValueType::Pointer | ValueType::Size => abi.pointer_size(),
        }
    }
}

/// A declared function argument and, once the function is built, the
/// location the ABI assigned to it.
#[derive(Clone, Debug)]
pub struct Argument {
    name: String,
    value_type: Option<ValueType>,
    size: u32,
    location: Option<ArgumentLocation>,
}

impl Argument {
    pub fn new(name: &str, value_type: ValueType) -> Argument {
        Argument {
            name: name.to_owned(),
            value_type: Some(value_type),
            size: 0,
            location: None,
        }
    }

    /// An argument of raw byte size, for signatures without a matching
    /// [`ValueType`](enum.ValueType.html).
    pub fn with_size(name: &str, size: u32) -> Argument {
        Argument {
            name: name.to_owned(),
            value_type: None,
            size,
            location: None,
        }
    }

    pub fn uint32(name: &str) -> Argument {
        Argument::new(name, ValueType::UInt32)
    }

    pub fn uint64(name: &str) -> Argument {
        Argument::new(name, ValueType::UInt64)
    }

    pub fn pointer(name: &str) -> Argument {
        Argument::new(name, ValueType::Pointer)
    }

    pub fn size_t(name: &str) -> Argument {
        Argument::new(name, ValueType::Size)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Location assigned by the ABI, available once the function is built.
    pub fn location(&self) -> Option<ArgumentLocation> {
        self.location
    }
}

/// Configuration collected before the function body runs.
pub struct FunctionDeclaration {
    name: String,
    arguments: Vec<Argument>,
    return_type: Option<ValueType>,
    target: Microarchitecture,
    abi: Abi,
    assembly_format: AssemblyFormat,
    high_register_strategy: HighRegisterStrategy,
    is_thumb: bool,
    alignment: u32,
    validate_stack_alignment: bool,
    preserve8: bool,
}

impl FunctionDeclaration {
    pub fn argument(mut self, argument: Argument) -> FunctionDeclaration {
        self.arguments.push(argument);
        self
    }

    pub fn arguments<I: IntoIterator<Item = Argument>>(mut self, arguments: I) -> FunctionDeclaration {
        self.arguments.extend(arguments);
        self
    }

    pub fn return_type(mut self, value_type: ValueType) -> FunctionDeclaration {
        self.return_type = Some(value_type);
        self
    }

    pub fn assembly_format(mut self, format: AssemblyFormat) -> FunctionDeclaration {
        self.assembly_format = format;
        self
    }

    pub fn high_register_strategy(mut self, strategy: HighRegisterStrategy) -> FunctionDeclaration {
        self.high_register_strategy = strategy;
        self
    }

    pub fn thumb(mut self, is_thumb: bool) -> FunctionDeclaration {
        self.is_thumb = is_thumb;
        self
    }

    pub fn alignment(mut self, alignment: u32) -> FunctionDeclaration {
        self.alignment = alignment;
        self
    }

    pub fn validate_stack_alignment(mut self, validate: bool) -> FunctionDeclaration {
        self.validate_stack_alignment = validate;
        self
    }

    pub fn preserve8(mut self, preserve8: bool) -> FunctionDeclaration {
        self.preserve8 = preserve8;
        self
    }

    /// Runs `body` against a fresh builder, then the analysis and
    /// code-generation pipeline. Only one build may be active per thread.
    pub fn build<F>(self, body: F) -> Result<Function>
    where
        F: FnOnce(&mut FunctionBuilder) -> Result<()>,
    {
        let _guard = ActiveFunctionGuard::attach(&self.name)?;
        debug!(
            "generating function {} for microarchitecture {} and ABI {}",
            self.name, self.target, self.abi
        );

        let mut arguments = self.arguments;
        assign_argument_locations(&mut arguments, self.abi)?;

        let function = Function {
            name: self.name,
            arguments,
            return_type: self.return_type,
            target: self.target,
            abi: self.abi,
            assembly_format: self.assembly_format,
            high_register_strategy: self.high_register_strategy,
            is_thumb: self.is_thumb,
            alignment: self.alignment,
            validate_stack_alignment: self.validate_stack_alignment,
            preserve8: self.preserve8,
            instructions: Vec::new(),
            external_functions: BTreeSet::new(),
            constants: Vec::new(),
            stack_frame: StackFrame::new(self.abi),
        };

        let mut builder = FunctionBuilder::new(function);
        body(&mut builder)?;
        let mut function = builder.into_function();
        function.finish()?;
        Ok(function)
    }
}

/// Assigns each argument its EABI location: the first four 32-bit values
/// in r0-r3, 8-byte values in even-aligned register pairs, the rest on
/// the stack with 8-byte values aligned to 8 bytes.
fn assign_argument_locations(arguments: &mut [Argument], abi: Abi) -> Result<()> {
    let argument_registers = abi.argument_registers();
    let mut register_offset = 0usize;
    let mut stack_offset = 0u32;
    for argument in arguments.iter_mut() {
        argument.size = match argument.value_type {
            Some(value_type) => value_type.size(abi),
            None => argument.size,
        };
        match argument.size {
            1..=4 => {
                if register_offset < 4 {
                    argument.location =
                        Some(ArgumentLocation::Register(argument_registers[register_offset]));
                    register_offset += 1;
                } else {
                    argument.location = Some(ArgumentLocation::Stack(stack_offset));
                    stack_offset += 4;
                }
            }
            8 => {
                if register_offset % 2 == 1 {
                    register_offset += 1;
                }
                if register_offset < 4 {
                    argument.location = Some(ArgumentLocation::RegisterPair(
                        argument_registers[register_offset],
                        argument_registers[register_offset + 1],
                    ));
                    register_offset += 2;
                } else {
                    if stack_offset % 8 == 4 {
                        stack_offset += 4;
                    }
                    argument.location = Some(ArgumentLocation::Stack(stack_offset));
                    stack_offset += 8;
                }
            }
            size => {
                return Err(Error::UnsupportedArgument {
                    name: argument.name.clone(),
                    size,
                })
            }
        }
    }
    Ok(())
}

/// A built function, ready to render assembly.
pub struct Function {
    pub(crate) name: String,
    pub(crate) arguments: Vec<Argument>,
    #[allow(dead_code)]
    pub(crate) return_type: Option<ValueType>,
    pub(crate) target: Microarchitecture,
    pub(crate) abi: Abi,
    pub(crate) assembly_format: AssemblyFormat,
    pub(crate) high_register_strategy: HighRegisterStrategy,
    pub(crate) is_thumb: bool,
    pub(crate) alignment: u32,
    pub(crate) validate_stack_alignment: bool,
    pub(crate) preserve8: bool,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) external_functions: BTreeSet<String>,
    pub(crate) constants: Vec<ConstantBucket>,
    pub(crate) stack_frame: StackFrame,
}

impl Function {
    pub fn declare(name: &str, target: Microarchitecture, abi: Abi) -> FunctionDeclaration {
        FunctionDeclaration {
            name: name.to_owned(),
            arguments: Vec::new(),
            return_type: None,
            target,
            abi,
            assembly_format: AssemblyFormat::default(),
            high_register_strategy: HighRegisterStrategy::default(),
            is_thumb: false,
            alignment: 0,
            validate_stack_alignment: true,
            preserve8: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Microarchitecture {
        self.target
    }

    pub fn abi(&self) -> Abi {
        self.abi
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Looks an argument up by name.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|argument| argument.name == name)
    }

    /// Renders the whole program in the configured dialect.
    pub fn assembly(&self) -> String {
        match self.assembly_format {
            AssemblyFormat::Gas => assembly::generate_gas(self),
            AssemblyFormat::Armcc => assembly::generate_armcc(self),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.generate_entry_label();
        self.decompose_instructions();

        debug!("{}: running liveness analysis", self.name);
        let entry = self.find_entry_label()?;
        matches::debug_assert_matches!(
            self.instructions[entry].kind,
            InstructionKind::Label { .. }
        );
        liveness::determine_available_registers(&mut self.instructions, entry)?;
        liveness::determine_live_registers(&mut self.instructions, true)?;

        debug!("{}: running register allocation", self.name);
        let mut state =
            allocator::determine_register_relations(&self.instructions, self.abi, self.target)?;
        let allocation = allocator::allocate_registers(&self.instructions, &mut state)?;
        allocator::rebind_registers(&mut self.instructions, &allocation);

        debug!("{}: generating code", self.name);
        self.remove_assume_statements();
        self.update_stack_frame();
        self.generate_parameter_loads();
        liveness::determine_live_registers(&mut self.instructions, false)?;
        self.generate_prologue_and_epilogue();
        if self.validate_stack_alignment {
            alignment::validate_stack_alignment(&self.instructions, self.target)?;
        }
        self.assign_constant_labels();
        self.optimize_instructions();
        Ok(())
    }

    /// Prepends the ENTRY label unless the user already placed one.
    fn generate_entry_label(&mut self) {
        let has_entry = self
            .instructions
            .iter()
            .any(|instruction| instruction.kind.label_name() == Some("ENTRY"));
        if !has_entry {
            self.instructions.insert(
                0,
                Instruction::new(InstructionKind::Label {
                    name: "ENTRY".to_owned(),
                }),
            );
        }
    }

    fn find_entry_label(&self) -> Result<usize> {
        self.instructions
            .iter()
            .position(|instruction| instruction.kind.label_name() == Some("ENTRY"))
            .ok_or(Error::NoEntry)
    }

    /// Replaces compound pseudo-instructions with their constituents.
    fn decompose_instructions(&mut self) {
        let mut new_instructions = Vec::with_capacity(self.instructions.len());
        for instruction in self.instructions.drain(..) {
            match instruction.kind {
                InstructionKind::Return => {
                    new_instructions.push(Instruction::new(InstructionKind::BranchExchange {
                        register: crate::registers::LR,
                    }));
                }
                _ => new_instructions.push(instruction),
            }
        }
        self.instructions = new_instructions;
    }

    fn remove_assume_statements(&mut self) {
        self.instructions
            .retain(|instruction| !matches!(instruction.kind, InstructionKind::AssumeInitialized { .. }));
    }

    /// Re-derives the callee-saved sets now that every register is
    /// physical.
    fn update_stack_frame(&mut self) {
        for instruction in &self.instructions {
            for output in instruction.kind.output_registers() {
                self.stack_frame.preserve_register(output);
            }
        }
    }

    /// Lowers argument-load pseudos into moves and stack loads.
    fn generate_parameter_loads(&mut self) {
        let parameters_offset = self
            .stack_frame
            .parameters_offset(self.is_v7m());
        let mut new_instructions = Vec::with_capacity(self.instructions.len());
        for instruction in self.instructions.drain(..) {
            let (available, live) = (
                instruction.available_registers.clone(),
                instruction.live_registers.clone(),
            );
            match instruction.kind {
                InstructionKind::LoadArgument {
                    destination,
                    source,
                    ..
                } => {
                    let lowered = match source {
                        ArgumentLocation::Register(register) => {
                            if destination == register {
                                None
                            } else {
                                Some(InstructionKind::Unary {
                                    op: UnaryOp::Mov,
                                    flags: false,
                                    rd: destination,
                                    src: register.into(),
                                })
                            }
                        }
                        ArgumentLocation::Stack(stack_offset) => {
                            Some(InstructionKind::Load {
                                width: crate::instructions::AccessWidth::Word,
                                rt: destination,
                                source: LoadSource::Memory(MemoryOperand::displaced(
                                    crate::registers::SP,
                                    (parameters_offset + stack_offset) as i32,
                                )),
                            })
                        }
                        // Pair-located arguments cannot be emitted by
                        // load_arguments; nothing to lower.
                        ArgumentLocation::RegisterPair(..) => None,
                    };
                    if let Some(kind) = lowered {
                        let mut lowered = Instruction::new(kind);
                        lowered.available_registers = available;
                        lowered.live_registers = live;
                        new_instructions.push(lowered);
                    }
                }
                _ => new_instructions.push(instruction),
            }
        }
        self.instructions = new_instructions;
    }

    fn is_v7m(&self) -> bool {
        self.target.extensions().contains(Extension::V7M)
    }

    /// Inserts the prologue after ENTRY and the epilogue before every
    /// branch-exchange return.
    fn generate_prologue_and_epilogue(&mut self) {
        let strategy = self.high_register_strategy.resolve(self.assembly_format);
        let prologue = self
            .stack_frame
            .generate_prologue(self.is_v7m(), strategy);
        let epilogue = self
            .stack_frame
            .generate_epilogue(self.is_v7m(), strategy);

        let mut new_instructions = Vec::with_capacity(self.instructions.len() + prologue.len());
        for instruction in self.instructions.drain(..) {
            match &instruction.kind {
                InstructionKind::Label { name } if name == "ENTRY" => {
                    new_instructions.push(instruction);
                    new_instructions.extend(prologue.iter().cloned().map(Instruction::new));
                }
                InstructionKind::BranchExchange { .. } => {
                    new_instructions.extend(epilogue.iter().cloned().map(Instruction::new));
                    new_instructions.push(instruction);
                }
                _ => new_instructions.push(instruction),
            }
        }
        self.instructions = new_instructions;
    }

    /// Deduplicates constants, assigns pool labels and packs alignment
    /// buckets; constant-load pseudos lower into literal loads first.
    fn assign_constant_labels(&mut self) {
        let mut new_instructions = Vec::with_capacity(self.instructions.len());
        for instruction in self.instructions.drain(..) {
            match instruction.kind {
                InstructionKind::LoadConstant {
                    destination,
                    constant,
                } => {
                    let kind = match destination.bank() {
                        crate::registers::Bank::GeneralPurpose | crate::registers::Bank::Wmmx => {
                            InstructionKind::Load {
                                width: crate::instructions::AccessWidth::Word,
                                rt: destination,
                                source: LoadSource::Constant(constant),
                            }
                        }
                        crate::registers::Bank::Vfp => InstructionKind::VfpLoad {
                            rd: destination,
                            source: LoadSource::Constant(constant),
                        },
                    };
                    new_instructions.push(Instruction::new(kind));
                }
                _ => new_instructions.push(instruction),
            }
        }
        self.instructions = new_instructions;

        let mut max_alignment = 0u32;
        for instruction in &self.instructions {
            if let Some(constant) = instruction_constant(&instruction.kind) {
                max_alignment = max_alignment.max(constant.alignment());
            }
        }
        if max_alignment == 0 {
            return;
        }

        let mut constant_id = 0u32;
        let mut labels: HashMap<Constant, String> = HashMap::new();
        let mut open_buckets: HashMap<u32, usize> = HashMap::new();
        for instruction in &mut self.instructions {
            let constant = match instruction_constant_mut(&mut instruction.kind) {
                Some(constant) => constant,
                None => continue,
            };
            if let Some(label) = labels.get(constant) {
                constant.set_label(label.clone());
                continue;
            }
            let label = format!("c{}", constant_id);
            constant_id += 1;
            constant.set_label(label.clone());
            labels.insert(constant.clone(), label);

            let alignment = constant.alignment();
            match open_buckets.get(&alignment) {
                Some(&index) => {
                    self.constants[index].add(constant.clone());
                    if self.constants[index].is_full() {
                        open_buckets.remove(&alignment);
                    }
                }
                None => {
                    let mut bucket = ConstantBucket::new(max_alignment / 8);
                    bucket.add(constant.clone());
                    let full = bucket.is_full();
                    self.constants.push(bucket);
                    if !full {
                        open_buckets.insert(alignment, self.constants.len() - 1);
                    }
                }
            }
        }
    }

    /// Drops register moves whose source and destination coincide.
    fn optimize_instructions(&mut self) {
        self.instructions.retain(|instruction| match &instruction.kind {
            InstructionKind::Unary {
                op: UnaryOp::Mov,
                flags: false,
                rd,
                src,
            } => *src != crate::instructions::Operand2::Register(*rd),
            InstructionKind::VfpMove { rd, src } => rd != src,
            _ => true,
        });
    }
}

fn instruction_constant(kind: &InstructionKind) -> Option<&Constant> {
    match kind {
        InstructionKind::Load {
            source: LoadSource::Constant(constant),
            ..
        }
        | InstructionKind::VfpLoad {
            source: LoadSource::Constant(constant),
            ..
        } => Some(constant),
        _ => None,
    }
}

fn instruction_constant_mut(kind: &mut InstructionKind) -> Option<&mut Constant> {
    match kind {
        InstructionKind::Load {
            source: LoadSource::Constant(constant),
            ..
        }
        | InstructionKind::VfpLoad {
            source: LoadSource::Constant(constant),
            ..
        } => Some(constant),
        _ => None,
    }
}
