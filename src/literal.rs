use crate::Endian;
use byteorder::ByteOrder;

use std::hash::{Hash, Hasher};

/// A literal embedded in the constants section. Equality and hashing look
/// only at the value, so identical literals referenced from several
/// instructions deduplicate to one pool entry; the label is assigned when
/// the pool is laid out.
#[derive(Clone, Debug)]
pub struct Constant {
    /// Element width in bits.
    size: u32,
    /// How many times the element repeats (splat constants).
    repeats: u32,
    /// Required alignment in bits.
    alignment: u32,
    /// Little-endian element bytes.
    bytes: Vec<u8>,
    label: Option<String>,
}

impl PartialEq for Constant {
    fn eq(&self, other: &Constant) -> bool {
        self.size == other.size && self.repeats == other.repeats && self.bytes == other.bytes
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.repeats.hash(state);
        self.bytes.hash(state);
    }
}

impl Constant {
    fn from_bytes(size: u32, repeats: u32, alignment: u32, bytes: Vec<u8>) -> Constant {
        Constant {
            size,
            repeats,
            alignment,
            bytes,
            label: None,
        }
    }

    pub fn u8(value: u8) -> Constant {
        Constant::from_bytes(8, 1, 8, vec![value])
    }

    pub fn u16(value: u16) -> Constant {
        let mut bytes = vec![0; 2];
        Endian::write_u16(&mut bytes, value);
        Constant::from_bytes(16, 1, 16, bytes)
    }

    pub fn u32(value: u32) -> Constant {
        let mut bytes = vec![0; 4];
        Endian::write_u32(&mut bytes, value);
        Constant::from_bytes(32, 1, 32, bytes)
    }

    pub fn u64(value: u64) -> Constant {
        let mut bytes = vec![0; 8];
        Endian::write_u64(&mut bytes, value);
        Constant::from_bytes(64, 1, 64, bytes)
    }

    pub fn f32(value: f32) -> Constant {
        Constant::u32(value.to_bits())
    }

    pub fn f64(value: f64) -> Constant {
        Constant::u64(value.to_bits())
    }

    /// 32-bit element splatted across a 64-bit lane.
    pub fn u32x2(value: u32) -> Constant {
        let mut constant = Constant::u32(value);
        constant.repeats = 2;
        constant.alignment = 64;
        constant
    }

    /// 32-bit element splatted across a 128-bit lane.
    pub fn u32x4(value: u32) -> Constant {
        let mut constant = Constant::u32(value);
        constant.repeats = 4;
        constant.alignment = 128;
        constant
    }

    pub fn f32x2(value: f32) -> Constant {
        Constant::u32x2(value.to_bits())
    }

    pub fn f32x4(value: f32) -> Constant {
        Constant::u32x4(value.to_bits())
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub(crate) fn total_bytes(&self) -> u32 {
        self.size / 8 * self.repeats
    }

    pub(crate) fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }

    fn element_text(&self) -> String {
        match self.size {
            8 => format!("0x{:02X}", self.bytes[0]),
            16 => format!("0x{:04X}", Endian::read_u16(&self.bytes)),
            32 => format!("0x{:08X}", Endian::read_u32(&self.bytes)),
            64 => format!("0x{:016X}", Endian::read_u64(&self.bytes)),
            _ => unreachable!("unsupported constant element size"),
        }
    }

    /// The comma separated element list for a data directive.
    pub(crate) fn value_text(&self) -> String {
        let element = self.element_text();
        let mut elements = Vec::with_capacity(self.repeats as usize);
        elements.resize(self.repeats as usize, element);
        elements.join(", ")
    }
}

/// Constants of one alignment class, packed until `capacity` bytes are
/// used; the emitter realigns between buckets that did not fill up.
#[derive(Clone, Debug)]
pub(crate) struct ConstantBucket {
    capacity: u32,
    filled: u32,
    pub(crate) constants: Vec<Constant>,
}

impl ConstantBucket {
    pub(crate) fn new(capacity: u32) -> ConstantBucket {
        ConstantBucket {
            capacity,
            filled: 0,
            constants: Vec::new(),
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    pub(crate) fn add(&mut self, constant: Constant) {
        self.filled += constant.total_bytes();
        self.constants.push(constant);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.filled >= self.capacity
    }
}
