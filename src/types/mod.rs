//! # SCMO Value Type System
//!
//! This module provides the canonical value types shared by the buffer codec,
//! the class schema, and the conversion boundary.
//!
//! ## Module Structure
//!
//! - `cim_type`: single-byte `CimType` discriminant
//! - `value`: runtime `CimValue<'a>` / `CimArray<'a>` tagged unions
//! - `datetime`: fixed-width `CimDateTime` with the 25-character text codec
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | `CimType` | storage-level type discriminant for slots and schemas |
//! | `CimValue<'a>` | runtime value (zero-copy strings from the buffer heap) |
//! | `CimArray<'a>` | homogeneous array payload |
//! | `CimDateTime` | timestamp/interval value with DSP0004 text form |

mod cim_type;
mod datetime;
mod value;

pub use cim_type::CimType;
pub use datetime::CimDateTime;
pub use value::{CimArray, CimValue};
