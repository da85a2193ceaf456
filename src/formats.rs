/// Assembly output dialects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AssemblyFormat {
    /// GNU assembler (default).
    Gas,
    /// ARM Compiler armasm.
    Armcc,
}

impl Default for AssemblyFormat {
    fn default() -> AssemblyFormat {
        AssemblyFormat::Gas
    }
}

/// How to save and restore high registers (r8-r15) on ARMv7-M, where the
/// 16-bit PUSH/POP encodings cannot reach them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HighRegisterStrategy {
    /// `PUSH.W` / `POP.W` (32-bit Thumb-2 encodings).
    PushW,
    /// `STMDB sp!` / `LDMIA sp!`.
    Stmdb,
    /// Pick by dialect: `PUSH.W` for GAS, `STMDB` for ARMCC.
    Auto,
}

impl Default for HighRegisterStrategy {
    fn default() -> HighRegisterStrategy {
        HighRegisterStrategy::Auto
    }
}

impl HighRegisterStrategy {
    /// The concrete strategy after resolving `Auto` against the dialect.
    pub fn resolve(self, format: AssemblyFormat) -> HighRegisterStrategy {
        match (self, format) {
            (HighRegisterStrategy::Auto, AssemblyFormat::Gas) => HighRegisterStrategy::PushW,
            (HighRegisterStrategy::Auto, AssemblyFormat::Armcc) => HighRegisterStrategy::Stmdb,
            (strategy, _) => strategy,
        }
    }
}

macro_rules! impl_enum_display {
    ($e:ty) => {
        impl std::fmt::Display for $e {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }
    };
}

impl_enum_display!(AssemblyFormat);
impl_enum_display!(HighRegisterStrategy);
