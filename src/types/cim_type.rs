//! # CIM Type Tags
//!
//! This module provides the canonical `CimType` enum: the single-byte type
//! discriminant carried by every value slot, user-defined chain node, and
//! property definition.
//!
//! ## Type Categories
//!
//! | Category | Types | Inline Size |
//! |----------|-------|-------------|
//! | **Boolean** | Boolean | 1 byte |
//! | **Unsigned** | Uint8, Uint16, Uint32, Uint64 | 1-8 bytes |
//! | **Signed** | Sint8, Sint16, Sint32, Sint64 | 1-8 bytes |
//! | **Real** | Real32, Real64 | 4, 8 bytes |
//! | **Character** | Char16 | 2 bytes |
//! | **DateTime** | DateTime | 16 bytes (packed) |
//! | **Out-of-line** | String | heap `{offset, length}` |
//! | **External** | Reference, Instance | side-table index |
//!
//! The `#[repr(u8)]` discriminant is the storage encoding; arrayness is not
//! part of the tag, it lives in the slot flags next to it.

use crate::error::ScmoError;

/// Canonical value type discriminant for SCMO slots and schemas.
///
/// Uses `#[repr(u8)]` so the tag is stored directly in slot and chain-node
/// bytes. Arrayness is carried separately in slot flags.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CimType {
    Boolean = 0,
    Uint8 = 1,
    Sint8 = 2,
    Uint16 = 3,
    Sint16 = 4,
    Uint32 = 5,
    Sint32 = 6,
    Uint64 = 7,
    Sint64 = 8,
    Real32 = 9,
    Real64 = 10,
    Char16 = 11,
    String = 12,
    DateTime = 13,
    Reference = 14,
    Instance = 15,
}

impl CimType {
    /// Returns the inline payload size for this type, or None for types whose
    /// payload lives in the heap (strings) or the external table (references,
    /// embedded instances).
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            CimType::Boolean => Some(1),
            CimType::Uint8 | CimType::Sint8 => Some(1),
            CimType::Uint16 | CimType::Sint16 | CimType::Char16 => Some(2),
            CimType::Uint32 | CimType::Sint32 | CimType::Real32 => Some(4),
            CimType::Uint64 | CimType::Sint64 | CimType::Real64 => Some(8),
            CimType::DateTime => Some(16),
            CimType::String | CimType::Reference | CimType::Instance => None,
        }
    }

    /// Returns true for the eight fixed-width integer types.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            CimType::Uint8
                | CimType::Sint8
                | CimType::Uint16
                | CimType::Sint16
                | CimType::Uint32
                | CimType::Sint32
                | CimType::Uint64
                | CimType::Sint64
        )
    }

    /// Returns true for the signed integer types.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            CimType::Sint8 | CimType::Sint16 | CimType::Sint32 | CimType::Sint64
        )
    }

    /// Returns true for Real32 and Real64.
    pub fn is_real(&self) -> bool {
        matches!(self, CimType::Real32 | CimType::Real64)
    }

    /// Returns true for any numeric type (integer or real).
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_real()
    }

    /// Inclusive value range for an integer type, as (min, max) over i128.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            CimType::Uint8 => Some((0, u8::MAX as i128)),
            CimType::Sint8 => Some((i8::MIN as i128, i8::MAX as i128)),
            CimType::Uint16 => Some((0, u16::MAX as i128)),
            CimType::Sint16 => Some((i16::MIN as i128, i16::MAX as i128)),
            CimType::Uint32 => Some((0, u32::MAX as i128)),
            CimType::Sint32 => Some((i32::MIN as i128, i32::MAX as i128)),
            CimType::Uint64 => Some((0, u64::MAX as i128)),
            CimType::Sint64 => Some((i64::MIN as i128, i64::MAX as i128)),
            _ => None,
        }
    }
}

impl TryFrom<u8> for CimType {
    type Error = ScmoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CimType::Boolean),
            1 => Ok(CimType::Uint8),
            2 => Ok(CimType::Sint8),
            3 => Ok(CimType::Uint16),
            4 => Ok(CimType::Sint16),
            5 => Ok(CimType::Uint32),
            6 => Ok(CimType::Sint32),
            7 => Ok(CimType::Uint64),
            8 => Ok(CimType::Sint64),
            9 => Ok(CimType::Real32),
            10 => Ok(CimType::Real64),
            11 => Ok(CimType::Char16),
            12 => Ok(CimType::String),
            13 => Ok(CimType::DateTime),
            14 => Ok(CimType::Reference),
            15 => Ok(CimType::Instance),
            _ => Err(ScmoError::InvalidParameter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminant_roundtrip() {
        for raw in 0u8..=15 {
            let vtype = CimType::try_from(raw).unwrap();
            assert_eq!(vtype as u8, raw);
        }
        assert_eq!(CimType::try_from(16), Err(ScmoError::InvalidParameter));
        assert_eq!(CimType::try_from(255), Err(ScmoError::InvalidParameter));
    }

    #[test]
    fn fixed_sizes() {
        assert_eq!(CimType::Boolean.fixed_size(), Some(1));
        assert_eq!(CimType::Uint64.fixed_size(), Some(8));
        assert_eq!(CimType::Char16.fixed_size(), Some(2));
        assert_eq!(CimType::DateTime.fixed_size(), Some(16));
        assert_eq!(CimType::String.fixed_size(), None);
        assert_eq!(CimType::Reference.fixed_size(), None);
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(CimType::Uint8.integer_range(), Some((0, 255)));
        assert_eq!(CimType::Sint8.integer_range(), Some((-128, 127)));
        assert_eq!(CimType::String.integer_range(), None);
        assert!(CimType::Uint64.is_integer());
        assert!(!CimType::Uint64.is_signed());
        assert!(CimType::Sint16.is_signed());
        assert!(CimType::Real32.is_numeric());
        assert!(!CimType::Real32.is_integer());
    }
}
