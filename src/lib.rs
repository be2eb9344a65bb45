//! # SCMO - Single-Chunk Memory Object Records
//!
//! This crate implements the compact record format a management-object broker
//! uses to pass typed, schema-described instances between dynamically loaded
//! providers and the broker core. One instance lives in one contiguous,
//! relocatable allocation and is shared across call sites by a cheap,
//! reference-counted handle with copy-on-write mutation.
//!
//! ## Design Goals
//!
//! - **One allocation per instance**: header, property table, key-binding
//!   table, and a string/array heap packed into a single byte block
//! - **Relocatable**: every internal "pointer" is a byte offset from the
//!   block's base, so cloning is a bulk copy with zero fixups
//! - **Cheap handles**: copying a handle bumps a refcount, never copies bytes;
//!   the first mutation of a shared buffer clones it (copy-on-write)
//! - **Schema-optional**: instances whose class cannot be resolved still work,
//!   storing every property in a schema-less overflow chain
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Conversion Boundary (convert)       │  richer CimInstance / ObjectPath
//! ├──────────────────────────────────────┤
//! │  Instance Handle (scmo::instance)    │  property/key API, COW gate
//! ├──────────────────────────────────────┤
//! │  Buffer + Slot Codec (scmo::buffer)  │  offset arithmetic, heap append
//! ├──────────────────────────────────────┤
//! │  Binary Layout (scmo::layout)        │  zerocopy header/slot/node structs
//! ├──────────────────┬───────────────────┤
//! │  Class Schema    │  Object Path      │  shared read-only / identity rules
//! │  (schema)        │  (path)           │
//! └──────────────────┴───────────────────┘
//! ```
//!
//! ## Buffer Layout
//!
//! ```text
//! +----------------+------------------+------------------+----------------+
//! | BufferHeader   | ValueSlot x N    | ValueSlot x K    | Heap           |
//! | (96 B)         | (class props)    | (class keys)     | strings/arrays |
//! +----------------+------------------+------------------+----------------+
//! ```
//!
//! The heap also holds the singly-linked overflow chains for user-defined
//! properties and user-defined key bindings. External references (embedded
//! instances, reference-typed values) cannot live in the relocatable bytes;
//! they sit in a side table of handles next to the block.
//!
//! ## Module Overview
//!
//! - [`types`]: `CimType` tags, `CimValue` tagged union, `CimDateTime`
//! - [`schema`]: immutable class schemas and the shared class cache
//! - [`scmo`]: the single-chunk buffer and the `ScmoInstance` handle
//! - [`path`]: object paths, key-binding equivalence and hashing
//! - [`convert`]: construct/project boundary to the richer instance model
//! - [`error`]: `ScmoError` result kinds

#[macro_use]
mod macros;

pub mod convert;
pub mod error;
pub mod path;
pub mod schema;
pub mod scmo;
pub mod types;

pub use convert::{CimInstance, CimProperty};
pub use error::{ScmoError, ScmoResult};
pub use path::{KeyBinding, KeyBindingKind, ObjectPath};
pub use schema::{ClassCache, PropertyDef, Qualifier, ScmoClass, ScmoClassBuilder};
pub use scmo::ScmoInstance;
pub use types::{CimArray, CimDateTime, CimType, CimValue};
