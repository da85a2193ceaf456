use std::fmt;

/// Register banks. S, D and Q registers alias the same VFP bank, which is
/// why conflict detection only needs the bank and the bitboard.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Bank {
    GeneralPurpose,
    Wmmx,
    Vfp,
}

/// Register kinds selectable by the user.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RegisterKind {
    GeneralPurpose,
    Wmmx,
    S,
    D,
    Q,
}

impl RegisterKind {
    pub fn bank(self) -> Bank {
        match self {
            RegisterKind::GeneralPurpose => Bank::GeneralPurpose,
            RegisterKind::Wmmx => Bank::Wmmx,
            RegisterKind::S | RegisterKind::D | RegisterKind::Q => Bank::Vfp,
        }
    }

    /// Bitboard shape at slot 0: how many bank slots one register covers.
    pub(crate) fn shape(self) -> u64 {
        match self {
            RegisterKind::GeneralPurpose | RegisterKind::Wmmx | RegisterKind::S => 0x1,
            RegisterKind::D => 0x3,
            RegisterKind::Q => 0xF,
        }
    }

    /// Distance between the base slots of two adjacent registers.
    pub(crate) fn stride(self) -> u32 {
        match self {
            RegisterKind::GeneralPurpose | RegisterKind::Wmmx | RegisterKind::S => 1,
            RegisterKind::D => 2,
            RegisterKind::Q => 4,
        }
    }

    fn tag(self) -> u32 {
        match self {
            RegisterKind::GeneralPurpose => 1,
            RegisterKind::Wmmx => 2,
            RegisterKind::S => 4,
            RegisterKind::D => 5,
            RegisterKind::Q => 6,
        }
    }

    fn from_tag(tag: u32) -> RegisterKind {
        match tag {
            1 => RegisterKind::GeneralPurpose,
            2 => RegisterKind::Wmmx,
            4 => RegisterKind::S,
            5 => RegisterKind::D,
            6 => RegisterKind::Q,
            _ => unreachable!("invalid register id tag"),
        }
    }
}

/// Register numbers below this are physical; virtual ids are allocated
/// upwards from here by the owning function.
pub(crate) const FIRST_VIRTUAL_NUMBER: u32 = 0x40;

/// A typed register handle.
///
/// `id` encodes the register number and the kind of the *root* register
/// (`number << 4 | tag`), so a sub-register view of a virtual Q keeps the
/// parent's id while narrowing `mask`. `mask` is the bank-space bitboard
/// for physical registers, and the subfield shape relative to the root's
/// base slot for virtual ones. Two registers of the same bank conflict iff
/// their bitboards overlap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Register {
    kind: RegisterKind,
    id: u32,
    mask: u64,
}

impl Register {
    pub(crate) const fn physical(kind: RegisterKind, number: u32, mask: u64) -> Register {
        Register {
            kind,
            id: (number << 4) | tag_const(kind),
            mask,
        }
    }

    pub(crate) fn gp(number: u32) -> Register {
        debug_assert!(number < 16);
        Register::physical(RegisterKind::GeneralPurpose, number, 0x1 << number)
    }

    pub fn s(number: u32) -> Register {
        debug_assert!(number < 32);
        Register::physical(RegisterKind::S, number, 0x1 << number)
    }

    pub fn d(number: u32) -> Register {
        debug_assert!(number < 32);
        Register::physical(RegisterKind::D, number, 0x3 << (number * 2))
    }

    pub fn q(number: u32) -> Register {
        debug_assert!(number < 16);
        Register::physical(RegisterKind::Q, number, 0xF << (number * 4))
    }

    pub fn wmmx(number: u32) -> Register {
        debug_assert!(number < 16);
        Register::physical(RegisterKind::Wmmx, number, 0x1 << number)
    }

    pub(crate) fn virtual_register(kind: RegisterKind, number: u32) -> Register {
        debug_assert!(number >= FIRST_VIRTUAL_NUMBER);
        Register {
            kind,
            id: (number << 4) | kind.tag(),
            mask: kind.shape(),
        }
    }

    /// Reconstructs a register from its id and a (possibly partial) mask,
    /// as stored in liveness maps.
    pub(crate) fn from_parts(id: u32, mask: u64) -> Register {
        let root = RegisterKind::from_tag(id & 0xF);
        let kind = if (id >> 4) >= FIRST_VIRTUAL_NUMBER {
            kind_of_mask(root.bank(), mask)
        } else {
            root
        };
        Register { kind, id, mask }
    }

    /// The physical register of `kind` occupying exactly `bitboard`.
    pub(crate) fn from_bitboard(bitboard: u64, kind: RegisterKind) -> Register {
        let number = bitboard.trailing_zeros() / kind.stride();
        debug_assert_eq!(bitboard, kind.shape() << (number * kind.stride()));
        match kind {
            RegisterKind::GeneralPurpose => Register::gp(number),
            RegisterKind::Wmmx => Register::wmmx(number),
            RegisterKind::S => Register::s(number),
            RegisterKind::D => Register::d(number),
            RegisterKind::Q => Register::q(number),
        }
    }

    pub fn kind(self) -> RegisterKind {
        self.kind
    }

    pub fn bank(self) -> Bank {
        self.kind.bank()
    }

    pub(crate) fn id(self) -> u32 {
        self.id
    }

    pub fn is_virtual(self) -> bool {
        (self.id >> 4) >= FIRST_VIRTUAL_NUMBER
    }

    /// Kind of the root register this handle is a view of.
    pub(crate) fn root_kind(self) -> RegisterKind {
        RegisterKind::from_tag(self.id & 0xF)
    }

    pub(crate) fn mask(self) -> u64 {
        self.mask
    }

    /// Bank-space bitboard. Only meaningful for physical registers.
    pub(crate) fn bitboard(self) -> u64 {
        debug_assert!(!self.is_virtual());
        self.mask
    }

    pub fn physical_number(self) -> u32 {
        debug_assert!(!self.is_virtual());
        self.id >> 4
    }

    pub(crate) fn conflicts_with(self, other: Register) -> bool {
        self.bank() == other.bank() && self.bitboard() & other.bitboard() != 0
    }

    /// Given a candidate bank bitboard for this (possibly sub-) register,
    /// the bitboard the whole root register would occupy, or `None` when
    /// the root would fall off the low end of the bank.
    pub(crate) fn extend_to_root(self, bitboard: u64) -> Option<u64> {
        let base = bitboard
            .trailing_zeros()
            .checked_sub(self.mask.trailing_zeros())?;
        Some(self.root_kind().shape() << base)
    }

    /// The physical register this (possibly sub-) register becomes when
    /// its root is allocated to `root_bitboard`.
    pub(crate) fn bind_to_root(self, root_bitboard: u64) -> Register {
        let base = root_bitboard.trailing_zeros();
        let bitboard = self.mask << base;
        Register::from_bitboard(bitboard, kind_of_mask(self.bank(), self.mask))
    }

    /// Lower half of a D or Q register. For virtual registers the view
    /// shares the parent id with a narrowed mask; for physical registers
    /// it is the concrete sub-register.
    pub fn low(self) -> Register {
        self.half(false)
    }

    /// Upper half of a D or Q register.
    pub fn high(self) -> Register {
        self.half(true)
    }

    fn half(self, upper: bool) -> Register {
        let width = self.mask.count_ones();
        debug_assert!(width >= 2 && width % 2 == 0);
        let base = self.mask.trailing_zeros() + if upper { width / 2 } else { 0 };
        let half_shape = (1u64 << (width / 2)) - 1;
        let mask = half_shape << base;
        if self.is_virtual() {
            Register::from_parts(self.id, mask)
        } else {
            Register::from_bitboard(mask, kind_of_mask(self.bank(), mask))
        }
    }
}

const fn tag_const(kind: RegisterKind) -> u32 {
    match kind {
        RegisterKind::GeneralPurpose => 1,
        RegisterKind::Wmmx => 2,
        RegisterKind::S => 4,
        RegisterKind::D => 5,
        RegisterKind::Q => 6,
    }
}

fn kind_of_mask(bank: Bank, mask: u64) -> RegisterKind {
    match (bank, mask.count_ones()) {
        (Bank::GeneralPurpose, _) => RegisterKind::GeneralPurpose,
        (Bank::Wmmx, _) => RegisterKind::Wmmx,
        (Bank::Vfp, 1) => RegisterKind::S,
        (Bank::Vfp, 2) => RegisterKind::D,
        (Bank::Vfp, 4) => RegisterKind::Q,
        (Bank::Vfp, width) => unreachable!("invalid VFP mask width {}", width),
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_virtual() {
            let prefix = match self.kind {
                RegisterKind::GeneralPurpose => "gp",
                RegisterKind::Wmmx => "wmmx",
                RegisterKind::S => "s",
                RegisterKind::D => "d",
                RegisterKind::Q => "q",
            };
            return write!(f, "{}-vreg<{}>", prefix, self.id >> 4);
        }
        let number = self.physical_number();
        match self.kind {
            RegisterKind::GeneralPurpose => match number {
                13 => f.write_str("sp"),
                14 => f.write_str("lr"),
                15 => f.write_str("pc"),
                _ => write!(f, "r{}", number),
            },
            RegisterKind::Wmmx => write!(f, "wr{}", number),
            RegisterKind::S => write!(f, "s{}", number),
            RegisterKind::D => write!(f, "d{}", number),
            RegisterKind::Q => write!(f, "q{}", number),
        }
    }
}

pub const R0: Register = Register::physical(RegisterKind::GeneralPurpose, 0, 0x1);
pub const R1: Register = Register::physical(RegisterKind::GeneralPurpose, 1, 0x2);
pub const R2: Register = Register::physical(RegisterKind::GeneralPurpose, 2, 0x4);
pub const R3: Register = Register::physical(RegisterKind::GeneralPurpose, 3, 0x8);
pub const R4: Register = Register::physical(RegisterKind::GeneralPurpose, 4, 0x10);
pub const R5: Register = Register::physical(RegisterKind::GeneralPurpose, 5, 0x20);
pub const R6: Register = Register::physical(RegisterKind::GeneralPurpose, 6, 0x40);
pub const R7: Register = Register::physical(RegisterKind::GeneralPurpose, 7, 0x80);
pub const R8: Register = Register::physical(RegisterKind::GeneralPurpose, 8, 0x100);
pub const R9: Register = Register::physical(RegisterKind::GeneralPurpose, 9, 0x200);
pub const R10: Register = Register::physical(RegisterKind::GeneralPurpose, 10, 0x400);
pub const R11: Register = Register::physical(RegisterKind::GeneralPurpose, 11, 0x800);
pub const R12: Register = Register::physical(RegisterKind::GeneralPurpose, 12, 0x1000);
pub const SP: Register = Register::physical(RegisterKind::GeneralPurpose, 13, 0x2000);
pub const LR: Register = Register::physical(RegisterKind::GeneralPurpose, 14, 0x4000);
pub const PC: Register = Register::physical(RegisterKind::GeneralPurpose, 15, 0x8000);
