//! # Class Schemas and the Class Cache
//!
//! - `class`: immutable `ScmoClass` descriptions with the builder
//! - `cache`: the explicitly passed, thread-safe `ClassCache`

mod cache;
mod class;

pub use cache::ClassCache;
pub use class::{PropertyDef, Qualifier, ScmoClass, ScmoClassBuilder};
