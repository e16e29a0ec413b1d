//! Element tag encoding: low byte is the base-type discriminant, high byte
//! carries classification flags.

use bitflags::bitflags;

bitflags! {
    /// High-byte classification flags, `OR`ed with a low-byte base-type
    /// discriminant to form a full [`Tag`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        const SCALAR   = 1 << 8;
        const FLOAT    = 1 << 9;
        const SIGNED   = 1 << 10;
        const SEQUENCE = 1 << 11;
    }
}

/// Low-byte base-type discriminants.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseTag {
    I8 = 1,
    I16 = 2,
    I32 = 3,
    I64 = 4,
    IBool = 5,
    F32 = 6,
    F64 = 7,
    F128 = 8,
    SChar = 9,
    SByte = 10,
    /// Ordered container of encoded elements. ASCII `'C'`.
    Container = 67,
    /// Associative container of encoded (key, value) pairs. ASCII `'M'`.
    Map = 77,
    /// User object with a `store`/`load` hook. ASCII `'O'`.
    Object = 79,
}

pub type Tag = u16;

pub const I8: Tag = BaseTag::I8 as u16 | Flags::SCALAR.bits() | Flags::SIGNED.bits();
pub const I16: Tag = BaseTag::I16 as u16 | Flags::SCALAR.bits() | Flags::SIGNED.bits();
pub const I32: Tag = BaseTag::I32 as u16 | Flags::SCALAR.bits() | Flags::SIGNED.bits();
pub const I64: Tag = BaseTag::I64 as u16 | Flags::SCALAR.bits() | Flags::SIGNED.bits();
pub const U8: Tag = BaseTag::I8 as u16 | Flags::SCALAR.bits();
pub const U16: Tag = BaseTag::I16 as u16 | Flags::SCALAR.bits();
pub const U32: Tag = BaseTag::I32 as u16 | Flags::SCALAR.bits();
pub const U64: Tag = BaseTag::I64 as u16 | Flags::SCALAR.bits();
pub const IBOOL: Tag = BaseTag::IBool as u16 | Flags::SCALAR.bits();
pub const F32: Tag = BaseTag::F32 as u16 | Flags::SCALAR.bits() | Flags::FLOAT.bits() | Flags::SIGNED.bits();
pub const F64: Tag = BaseTag::F64 as u16 | Flags::SCALAR.bits() | Flags::FLOAT.bits() | Flags::SIGNED.bits();
pub const F128: Tag = BaseTag::F128 as u16 | Flags::SCALAR.bits() | Flags::FLOAT.bits() | Flags::SIGNED.bits();
pub const SCHAR: Tag = BaseTag::SChar as u16 | Flags::SEQUENCE.bits() | Flags::SCALAR.bits();
pub const SBYTE: Tag = BaseTag::SByte as u16 | Flags::SEQUENCE.bits() | Flags::SCALAR.bits();
pub const CONTAINER: Tag = BaseTag::Container as u16;
pub const MAP: Tag = BaseTag::Map as u16;
pub const OBJECT: Tag = BaseTag::Object as u16;

/// Clamps an element count to the 16-bit wire field, per the spec's
/// "element counts exceeding 65535 are truncated to 65535" clamping rule.
/// The encoder never fails on overflow; it only surfaces a warning via
/// `tracing`.
pub fn to_count(n: usize) -> u16 {
    if n > u16::MAX as usize {
        tracing::warn!(actual = n, max = u16::MAX, "element count clamped to u16::MAX on the wire");
        u16::MAX
    } else {
        n as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_preserves_values_within_range() {
        assert_eq!(to_count(0), 0);
        assert_eq!(to_count(65535), 65535);
    }

    #[test]
    fn clamp_truncates_oversized_counts() {
        assert_eq!(to_count(65536), u16::MAX);
        assert_eq!(to_count(1_000_000), u16::MAX);
    }
}
