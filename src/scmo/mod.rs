//! # Single-Chunk Memory Object Records
//!
//! One instance is one relocatable byte block plus two out-of-band members
//! (the class reference and the external-reference table), shared between
//! handles with copy-on-write.
//!
//! - `layout`: the zerocopy structs and offsets inside the block
//! - `buffer`: block ownership, the heap, and the slot codec
//! - `instance`: the public `ScmoInstance` handle

pub mod layout;

mod buffer;
mod instance;

pub use instance::ScmoInstance;
