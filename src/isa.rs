use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;

use std::fmt;

/// ARM ISA extensions an instruction may require and a microarchitecture
/// may provide.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Extension {
    Thumb2,
    V5E,
    V6,
    V6K,
    V7,
    V7M,
    V7MP,
    Div,
    Dsp,
    Vfp,
    Vfp2,
    Vfp3,
    VfpHp,
    Vfp4,
    VfpD32,
    Neon,
    NeonHp,
    Neon2,
}

#[inline]
pub(crate) fn enum_to_u32<T: ToPrimitive + Copy>(val: T) -> u32 {
    val.to_u32().unwrap()
}

/// A set of [`Extension`](enum.Extension.html)s, backed by a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Extensions(u32);

impl Extensions {
    pub fn new() -> Extensions {
        Extensions(0)
    }

    pub fn contains(self, extension: Extension) -> bool {
        self.0 & (1 << enum_to_u32(extension)) != 0
    }

    pub fn insert(&mut self, extension: Extension) {
        self.0 |= 1 << enum_to_u32(extension);
    }

    pub fn union(self, other: Extensions) -> Extensions {
        Extensions(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Extension> {
        use num_traits::FromPrimitive;
        (0u32..32)
            .filter(move |bit| self.0 & (1 << bit) != 0)
            .filter_map(Extension::from_u32)
    }
}

impl std::iter::FromIterator<Extension> for Extensions {
    fn from_iter<I: IntoIterator<Item = Extension>>(iter: I) -> Extensions {
        let mut extensions = Extensions::new();
        for extension in iter {
            extensions.insert(extension);
        }
        extensions
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

macro_rules! extensions {
    [$( $ext:ident ),*] => {
        {
            let mut set = Extensions::new();
            $( set.insert(Extension::$ext); )*
            set
        }
    };
}

/// Target microarchitectures. Each carries the extension set that gates
/// instruction emission and drives the architecture and FPU directives of
/// the emitted assembly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Microarchitecture {
    Default,
    CortexM0,
    CortexM0Plus,
    CortexM1,
    CortexM3,
    CortexM4,
    CortexM7,
    CortexA8,
    CortexA9,
    CortexA15,
}

impl Microarchitecture {
    pub fn extensions(self) -> Extensions {
        match self {
            Microarchitecture::Default => Extensions::new(),
            Microarchitecture::CortexM0
            | Microarchitecture::CortexM0Plus
            | Microarchitecture::CortexM1 => extensions![V6],
            Microarchitecture::CortexM3 => extensions![Thumb2, V7, V7M],
            Microarchitecture::CortexM4 => {
                extensions![Thumb2, V7, V7M, Dsp, Vfp, Vfp2, Vfp3, Vfp4, VfpHp]
            }
            Microarchitecture::CortexM7 => {
                extensions![Thumb2, V7, V7M, Dsp, Vfp, Vfp2, Vfp3, Vfp4, VfpHp, VfpD32]
            }
            Microarchitecture::CortexA8 => {
                extensions![Thumb2, V5E, V6, V6K, V7, Vfp, Vfp2, Vfp3, Neon, VfpD32]
            }
            Microarchitecture::CortexA9 => {
                extensions![Thumb2, V5E, V6, V6K, V7, V7MP, Vfp, Vfp2, Vfp3, VfpHp, Neon, NeonHp, VfpD32]
            }
            Microarchitecture::CortexA15 => extensions![
                Thumb2, V5E, V6, V6K, V7, V7MP, Div, Dsp, Vfp, Vfp2, Vfp3, VfpHp, Vfp4, Neon,
                NeonHp, Neon2, VfpD32
            ],
        }
    }

    /// Whether the full bank of 32 D registers is available.
    pub fn has_vfp_d32(self) -> bool {
        self.extensions().contains(Extension::VfpD32)
    }

    /// Section-name suffix for the constants section.
    pub(crate) fn id(self) -> &'static str {
        match self {
            Microarchitecture::Default => "default",
            Microarchitecture::CortexM0 => "cortexm0",
            Microarchitecture::CortexM0Plus => "cortexm0plus",
            Microarchitecture::CortexM1 => "cortexm1",
            Microarchitecture::CortexM3 => "cortexm3",
            Microarchitecture::CortexM4 => "cortexm4",
            Microarchitecture::CortexM7 => "cortexm7",
            Microarchitecture::CortexA8 => "cortexa8",
            Microarchitecture::CortexA9 => "cortexa9",
            Microarchitecture::CortexA15 => "cortexa15",
        }
    }
}

macro_rules! impl_enum_display {
    ($e:ty) => {
        impl fmt::Display for $e {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

impl_enum_display!(Extension);
impl_enum_display!(Microarchitecture);
