//! # Runtime Value Representation
//!
//! This module provides `CimValue<'a>`, the tagged union handed across the
//! property and key-binding API. Values use `Cow` for string payloads so
//! getters can borrow directly out of the owning buffer's heap; callers must
//! copy out ([`CimValue::into_owned`]) before the buffer is freed or mutated.
//!
//! ## Variants
//!
//! | Variant | Rust Type | Decoded From |
//! |---------|-----------|--------------|
//! | Boolean..Sint64 | `bool`, `u8`..`i64` | inline slot payload |
//! | Real32/Real64 | `f32`/`f64` | inline slot payload |
//! | Char16 | `u16` | inline slot payload |
//! | String | `Cow<str>` | heap `{offset, length}` |
//! | DateTime | `CimDateTime` | 16-byte packed payload |
//! | Reference | `ScmoInstance` | external-reference table (keys-only target) |
//! | Instance | `ScmoInstance` | external-reference table (embedded record) |
//! | Array | `CimArray` | heap region, element count in the slot |
//!
//! Null is not a variant: a null value is reported as the `NullValue` result
//! kind, keeping "present but null" distinct from "absent" at the API surface.
//!
//! ## Comparison Semantics
//!
//! Equality is type-strict for scalars and element-wise for arrays.
//! Reference and embedded-instance values compare by the content of the
//! referenced record, never by buffer identity; handle identity is the
//! separate `ScmoInstance::is_same`.

use std::borrow::Cow;

use crate::scmo::ScmoInstance;
use crate::types::{CimDateTime, CimType};

/// One typed scalar or array value.
#[derive(Debug, Clone)]
pub enum CimValue<'a> {
    Boolean(bool),
    Uint8(u8),
    Sint8(i8),
    Uint16(u16),
    Sint16(i16),
    Uint32(u32),
    Sint32(i32),
    Uint64(u64),
    Sint64(i64),
    Real32(f32),
    Real64(f64),
    Char16(u16),
    String(Cow<'a, str>),
    DateTime(CimDateTime),
    Reference(ScmoInstance),
    Instance(ScmoInstance),
    Array(CimArray<'a>),
}

/// A homogeneous array value, tagged per element type.
///
/// `Uint8` arrays borrow the raw heap bytes; string elements borrow
/// individually; every other element type is decoded into an owned buffer
/// because the heap bytes carry no alignment guarantee.
#[derive(Debug, Clone)]
pub enum CimArray<'a> {
    Boolean(Vec<bool>),
    Uint8(Cow<'a, [u8]>),
    Sint8(Vec<i8>),
    Uint16(Vec<u16>),
    Sint16(Vec<i16>),
    Uint32(Vec<u32>),
    Sint32(Vec<i32>),
    Uint64(Vec<u64>),
    Sint64(Vec<i64>),
    Real32(Vec<f32>),
    Real64(Vec<f64>),
    Char16(Vec<u16>),
    String(Vec<Cow<'a, str>>),
    DateTime(Vec<CimDateTime>),
    Reference(Vec<ScmoInstance>),
    Instance(Vec<ScmoInstance>),
}

impl<'a> CimValue<'a> {
    /// The type tag of this value; for arrays, the element type.
    pub fn cim_type(&self) -> CimType {
        match self {
            CimValue::Boolean(_) => CimType::Boolean,
            CimValue::Uint8(_) => CimType::Uint8,
            CimValue::Sint8(_) => CimType::Sint8,
            CimValue::Uint16(_) => CimType::Uint16,
            CimValue::Sint16(_) => CimType::Sint16,
            CimValue::Uint32(_) => CimType::Uint32,
            CimValue::Sint32(_) => CimType::Sint32,
            CimValue::Uint64(_) => CimType::Uint64,
            CimValue::Sint64(_) => CimType::Sint64,
            CimValue::Real32(_) => CimType::Real32,
            CimValue::Real64(_) => CimType::Real64,
            CimValue::Char16(_) => CimType::Char16,
            CimValue::String(_) => CimType::String,
            CimValue::DateTime(_) => CimType::DateTime,
            CimValue::Reference(_) => CimType::Reference,
            CimValue::Instance(_) => CimType::Instance,
            CimValue::Array(arr) => arr.element_type(),
        }
    }

    /// Returns true if this value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, CimValue::Array(_))
    }

    /// Element count for arrays, None for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            CimValue::Array(arr) => Some(arr.len()),
            _ => None,
        }
    }

    /// The integer magnitude of this value, if it is an integer scalar.
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            CimValue::Uint8(v) => Some(v as i128),
            CimValue::Sint8(v) => Some(v as i128),
            CimValue::Uint16(v) => Some(v as i128),
            CimValue::Sint16(v) => Some(v as i128),
            CimValue::Uint32(v) => Some(v as i128),
            CimValue::Sint32(v) => Some(v as i128),
            CimValue::Uint64(v) => Some(v as i128),
            CimValue::Sint64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Builds an integer scalar of the given type, if `magnitude` fits.
    pub fn from_integer(vtype: CimType, magnitude: i128) -> Option<CimValue<'static>> {
        let (min, max) = vtype.integer_range()?;
        if magnitude < min || magnitude > max {
            return None;
        }
        Some(match vtype {
            CimType::Uint8 => CimValue::Uint8(magnitude as u8),
            CimType::Sint8 => CimValue::Sint8(magnitude as i8),
            CimType::Uint16 => CimValue::Uint16(magnitude as u16),
            CimType::Sint16 => CimValue::Sint16(magnitude as i16),
            CimType::Uint32 => CimValue::Uint32(magnitude as u32),
            CimType::Sint32 => CimValue::Sint32(magnitude as i32),
            CimType::Uint64 => CimValue::Uint64(magnitude as u64),
            CimType::Sint64 => CimValue::Sint64(magnitude as i64),
            _ => return None,
        })
    }

    /// Detaches this value from any borrowed heap payload.
    pub fn into_owned(self) -> CimValue<'static> {
        match self {
            CimValue::Boolean(v) => CimValue::Boolean(v),
            CimValue::Uint8(v) => CimValue::Uint8(v),
            CimValue::Sint8(v) => CimValue::Sint8(v),
            CimValue::Uint16(v) => CimValue::Uint16(v),
            CimValue::Sint16(v) => CimValue::Sint16(v),
            CimValue::Uint32(v) => CimValue::Uint32(v),
            CimValue::Sint32(v) => CimValue::Sint32(v),
            CimValue::Uint64(v) => CimValue::Uint64(v),
            CimValue::Sint64(v) => CimValue::Sint64(v),
            CimValue::Real32(v) => CimValue::Real32(v),
            CimValue::Real64(v) => CimValue::Real64(v),
            CimValue::Char16(v) => CimValue::Char16(v),
            CimValue::String(s) => CimValue::String(Cow::Owned(s.into_owned())),
            CimValue::DateTime(dt) => CimValue::DateTime(dt),
            CimValue::Reference(h) => CimValue::Reference(h),
            CimValue::Instance(h) => CimValue::Instance(h),
            CimValue::Array(arr) => CimValue::Array(arr.into_owned()),
        }
    }
}

impl<'a> CimArray<'a> {
    /// The element type tag of this array.
    pub fn element_type(&self) -> CimType {
        match self {
            CimArray::Boolean(_) => CimType::Boolean,
            CimArray::Uint8(_) => CimType::Uint8,
            CimArray::Sint8(_) => CimType::Sint8,
            CimArray::Uint16(_) => CimType::Uint16,
            CimArray::Sint16(_) => CimType::Sint16,
            CimArray::Uint32(_) => CimType::Uint32,
            CimArray::Sint32(_) => CimType::Sint32,
            CimArray::Uint64(_) => CimType::Uint64,
            CimArray::Sint64(_) => CimType::Sint64,
            CimArray::Real32(_) => CimType::Real32,
            CimArray::Real64(_) => CimType::Real64,
            CimArray::Char16(_) => CimType::Char16,
            CimArray::String(_) => CimType::String,
            CimArray::DateTime(_) => CimType::DateTime,
            CimArray::Reference(_) => CimType::Reference,
            CimArray::Instance(_) => CimType::Instance,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CimArray::Boolean(v) => v.len(),
            CimArray::Uint8(v) => v.len(),
            CimArray::Sint8(v) => v.len(),
            CimArray::Uint16(v) => v.len(),
            CimArray::Sint16(v) => v.len(),
            CimArray::Uint32(v) => v.len(),
            CimArray::Sint32(v) => v.len(),
            CimArray::Uint64(v) => v.len(),
            CimArray::Sint64(v) => v.len(),
            CimArray::Real32(v) => v.len(),
            CimArray::Real64(v) => v.len(),
            CimArray::Char16(v) => v.len(),
            CimArray::String(v) => v.len(),
            CimArray::DateTime(v) => v.len(),
            CimArray::Reference(v) => v.len(),
            CimArray::Instance(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detaches this array from any borrowed heap payload.
    pub fn into_owned(self) -> CimArray<'static> {
        match self {
            CimArray::Boolean(v) => CimArray::Boolean(v),
            CimArray::Uint8(v) => CimArray::Uint8(Cow::Owned(v.into_owned())),
            CimArray::Sint8(v) => CimArray::Sint8(v),
            CimArray::Uint16(v) => CimArray::Uint16(v),
            CimArray::Sint16(v) => CimArray::Sint16(v),
            CimArray::Uint32(v) => CimArray::Uint32(v),
            CimArray::Sint32(v) => CimArray::Sint32(v),
            CimArray::Uint64(v) => CimArray::Uint64(v),
            CimArray::Sint64(v) => CimArray::Sint64(v),
            CimArray::Real32(v) => CimArray::Real32(v),
            CimArray::Real64(v) => CimArray::Real64(v),
            CimArray::Char16(v) => CimArray::Char16(v),
            CimArray::String(v) => {
                CimArray::String(v.into_iter().map(|s| Cow::Owned(s.into_owned())).collect())
            }
            CimArray::DateTime(v) => CimArray::DateTime(v),
            CimArray::Reference(v) => CimArray::Reference(v),
            CimArray::Instance(v) => CimArray::Instance(v),
        }
    }
}

fn handles_eq(a: &[ScmoInstance], b: &[ScmoInstance]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.content_equals(y))
}

impl PartialEq for CimValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CimValue::Boolean(a), CimValue::Boolean(b)) => a == b,
            (CimValue::Uint8(a), CimValue::Uint8(b)) => a == b,
            (CimValue::Sint8(a), CimValue::Sint8(b)) => a == b,
            (CimValue::Uint16(a), CimValue::Uint16(b)) => a == b,
            (CimValue::Sint16(a), CimValue::Sint16(b)) => a == b,
            (CimValue::Uint32(a), CimValue::Uint32(b)) => a == b,
            (CimValue::Sint32(a), CimValue::Sint32(b)) => a == b,
            (CimValue::Uint64(a), CimValue::Uint64(b)) => a == b,
            (CimValue::Sint64(a), CimValue::Sint64(b)) => a == b,
            (CimValue::Real32(a), CimValue::Real32(b)) => a == b,
            (CimValue::Real64(a), CimValue::Real64(b)) => a == b,
            (CimValue::Char16(a), CimValue::Char16(b)) => a == b,
            (CimValue::String(a), CimValue::String(b)) => a == b,
            (CimValue::DateTime(a), CimValue::DateTime(b)) => a == b,
            (CimValue::Reference(a), CimValue::Reference(b)) => a.content_equals(b),
            (CimValue::Instance(a), CimValue::Instance(b)) => a.content_equals(b),
            (CimValue::Array(a), CimValue::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for CimArray<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CimArray::Boolean(a), CimArray::Boolean(b)) => a == b,
            (CimArray::Uint8(a), CimArray::Uint8(b)) => a == b,
            (CimArray::Sint8(a), CimArray::Sint8(b)) => a == b,
            (CimArray::Uint16(a), CimArray::Uint16(b)) => a == b,
            (CimArray::Sint16(a), CimArray::Sint16(b)) => a == b,
            (CimArray::Uint32(a), CimArray::Uint32(b)) => a == b,
            (CimArray::Sint32(a), CimArray::Sint32(b)) => a == b,
            (CimArray::Uint64(a), CimArray::Uint64(b)) => a == b,
            (CimArray::Sint64(a), CimArray::Sint64(b)) => a == b,
            (CimArray::Real32(a), CimArray::Real32(b)) => a == b,
            (CimArray::Real64(a), CimArray::Real64(b)) => a == b,
            (CimArray::Char16(a), CimArray::Char16(b)) => a == b,
            (CimArray::String(a), CimArray::String(b)) => a == b,
            (CimArray::DateTime(a), CimArray::DateTime(b)) => a == b,
            (CimArray::Reference(a), CimArray::Reference(b)) => handles_eq(a, b),
            (CimArray::Instance(a), CimArray::Instance(b)) => handles_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_and_arrayness() {
        assert_eq!(CimValue::Uint32(7).cim_type(), CimType::Uint32);
        assert!(!CimValue::Uint32(7).is_array());

        let arr = CimValue::Array(CimArray::String(vec![Cow::Borrowed("a")]));
        assert_eq!(arr.cim_type(), CimType::String);
        assert!(arr.is_array());
        assert_eq!(arr.array_len(), Some(1));
    }

    #[test]
    fn into_owned_detaches_borrows() {
        let text = String::from("borrowed");
        let value = CimValue::String(Cow::Borrowed(text.as_str()));
        let owned: CimValue<'static> = value.into_owned();
        drop(text);
        assert_eq!(owned, CimValue::String(Cow::Owned("borrowed".into())));
    }

    #[test]
    fn integer_fit() {
        assert_eq!(
            CimValue::from_integer(CimType::Uint8, 255),
            Some(CimValue::Uint8(255))
        );
        assert_eq!(CimValue::from_integer(CimType::Uint8, 256), None);
        assert_eq!(CimValue::from_integer(CimType::Sint8, -128).unwrap().as_integer(), Some(-128));
        assert_eq!(CimValue::from_integer(CimType::String, 1), None);
        assert_eq!(CimValue::Boolean(true).as_integer(), None);
    }

    #[test]
    fn equality_is_type_strict() {
        assert_ne!(CimValue::Uint8(1), CimValue::Uint16(1));
        assert_eq!(
            CimValue::Array(CimArray::Sint32(vec![1, 2])),
            CimValue::Array(CimArray::Sint32(vec![1, 2]))
        );
        assert_ne!(
            CimValue::Array(CimArray::Sint32(vec![1, 2])),
            CimValue::Array(CimArray::Sint32(vec![2, 1]))
        );
    }
}
