//! # Result Kinds for Buffer Operations
//!
//! Every property and key-binding operation on an instance returns a result
//! kind rather than a dynamic error: callers at the provider boundary match on
//! the kind to decide what to do. Text parsing (object paths, datetimes) uses
//! `eyre` instead, since those failures carry positional context and are never
//! matched on.
//!
//! ## Kinds
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `NotFound` | named property or key binding is absent |
//! | `IndexOutOfBound` | positional lookup past the last slot |
//! | `NullValue` | value present but logically null (distinct from absent) |
//! | `WrongType` | supplied value type differs from the class-declared type |
//! | `TypeMismatch` | key-binding type not accepted by the widening table |
//! | `NotAnArray` | array value supplied for a scalar property |
//! | `IsAnArray` | scalar value supplied for an array property |
//! | `OriginMismatch` | class-origin filter did not match the declaring class |
//! | `InvalidParameter` | empty name, array key value, malformed input |
//! | `NoSuchProperty` | key rebuild found a declared key property absent/null |
//! | `BufferLimit` | block would outgrow the 32-bit offset space |

use thiserror::Error;

/// Result kind returned by every buffer-level SCMO operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ScmoError {
    #[error("named property or key binding not found")]
    NotFound,
    #[error("index out of bound")]
    IndexOutOfBound,
    #[error("value is null")]
    NullValue,
    #[error("value type does not match the declared property type")]
    WrongType,
    #[error("key binding type not accepted by the declared key type")]
    TypeMismatch,
    #[error("array value supplied for a scalar property")]
    NotAnArray,
    #[error("scalar value supplied for an array property")]
    IsAnArray,
    #[error("class origin filter did not match")]
    OriginMismatch,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("declared key property is absent or null")]
    NoSuchProperty,
    #[error("block would outgrow the 32-bit offset space")]
    BufferLimit,
}

pub type ScmoResult<T> = Result<T, ScmoError>;
