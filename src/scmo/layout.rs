//! # SCMO Binary Layout
//!
//! This module defines every byte that lives inside the single relocatable
//! block, as zerocopy structs over little-endian wrapper fields. All offset
//! fields are byte offsets from the block's base (offset 0 is the header
//! itself), never absolute addresses, so the block can be bulk-copied to a
//! new base with zero fixups. Offset 0 doubles as the null sentinel: no
//! payload can ever live at the header.
//!
//! ## Block Layout
//!
//! ```text
//! +----------------+------------------+------------------+----------------+
//! | BufferHeader   | ValueSlot x N    | ValueSlot x K    | Heap           |
//! | (96 B)         | (24 B each)      | (24 B each)      | append-only    |
//! +----------------+------------------+------------------+----------------+
//! ```
//!
//! | Component | Size | Description |
//! |-----------|------|-------------|
//! | **BufferHeader** | 96 B | magic, version, flags, counts, section offsets |
//! | **ValueSlot** | 24 B | flags + type tag + count + 16-byte payload |
//! | **UserNode** | 36 B | overflow-chain node: next offset, name ref, slot |
//! | **StringRef** | 8 B | `{offset, length}` into the heap, 0 = unset |
//!
//! ## Slot Payload Encodings
//!
//! | Value class | Payload bytes |
//! |-------------|---------------|
//! | inline scalar | little-endian value in `payload[0..size]` |
//! | datetime | 16-byte packed form |
//! | string | `StringRef` in `payload[0..8]` |
//! | array | heap `{offset: u32, length: u32}` in `payload[0..8]` |
//! | reference / instance | external-table index in `payload[0..4]` |
//!
//! Two constraints are load-bearing for the external serializer boundary:
//! every struct here is `Unaligned` (the block travels as raw bytes), and the
//! sizes are pinned by compile-time assertions.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::types::CimType;

pub const SCMO_MAGIC: &[u8; 8] = b"SCMOrec\x01";
pub const CURRENT_VERSION: u16 = 1;

pub const HEADER_SIZE: usize = 96;
pub const SLOT_SIZE: usize = 24;
pub const NODE_SIZE: usize = 36;

/// Extra heap capacity reserved at construction so small string payloads do
/// not reallocate the block immediately.
pub const INITIAL_HEAP_CAPACITY: usize = 256;

/// Buffer-level flags stored in the header.
pub mod buffer_flags {
    /// Namespace or class name overwritten after construction; the instance
    /// may no longer match any class definition.
    pub const COMPROMISED: u16 = 1 << 0;
    /// No class schema could be resolved at creation; all properties are
    /// user-defined and the class-defined table is zero-length.
    pub const NO_CLASS: u16 = 1 << 1;
    pub const CLASS_ONLY: u16 = 1 << 2;
    pub const INCLUDE_QUALIFIERS: u16 = 1 << 3;
    pub const INCLUDE_CLASS_ORIGIN: u16 = 1 << 4;
}

/// Per-slot flags.
pub mod slot_flags {
    /// The slot carries a value (or an explicit null). Unset class-defined
    /// slots read the schema default.
    pub const SET: u8 = 1 << 0;
    /// The value is logically null.
    pub const NULL: u8 = 1 << 1;
    /// The payload is an array; the slot's count holds the element count.
    pub const ARRAY: u8 = 1 << 2;
}

/// `{offset, length}` pair addressing heap bytes; `{0, 0}` means unset.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct StringRef {
    off: U32,
    len: U32,
}

const _: () = assert!(std::mem::size_of::<StringRef>() == 8);

impl StringRef {
    pub fn new(off: u32, len: u32) -> Self {
        Self {
            off: U32::new(off),
            len: U32::new(len),
        }
    }

    pub fn unset() -> Self {
        Self::new(0, 0)
    }

    pub fn is_set(&self) -> bool {
        self.off.get() != 0
    }

    zerocopy_accessors! {
        off: u32,
        len: u32,
    }
}

/// One 24-byte value slot: the fixed-size cell of the class-defined property
/// table, the key-binding table, and the embedded cell of every chain node.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ValueSlot {
    flags: u8,
    vtype: u8,
    reserved: [u8; 2],
    count: U32,
    payload: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<ValueSlot>() == SLOT_SIZE);

impl ValueSlot {
    pub fn unset() -> Self {
        Self {
            flags: 0,
            vtype: 0,
            reserved: [0; 2],
            count: U32::new(0),
            payload: [0; 16],
        }
    }

    pub fn null(vtype: CimType, is_array: bool) -> Self {
        let mut slot = Self::unset();
        slot.flags = slot_flags::SET | slot_flags::NULL;
        if is_array {
            slot.flags |= slot_flags::ARRAY;
        }
        slot.vtype = vtype as u8;
        slot
    }

    pub fn value(vtype: CimType, is_array: bool, count: u32, payload: [u8; 16]) -> Self {
        let mut flags = slot_flags::SET;
        if is_array {
            flags |= slot_flags::ARRAY;
        }
        Self {
            flags,
            vtype: vtype as u8,
            reserved: [0; 2],
            count: U32::new(count),
            payload,
        }
    }

    pub fn is_set(&self) -> bool {
        self.flags & slot_flags::SET != 0
    }

    pub fn is_null(&self) -> bool {
        self.flags & slot_flags::NULL != 0
    }

    pub fn is_array(&self) -> bool {
        self.flags & slot_flags::ARRAY != 0
    }

    pub fn raw_vtype(&self) -> u8 {
        self.vtype
    }

    pub fn payload(&self) -> &[u8; 16] {
        &self.payload
    }

    /// Heap `{offset, length}` carried in the payload of strings and arrays.
    pub fn payload_ref(&self) -> StringRef {
        StringRef::new(
            u32::from_le_bytes([
                self.payload[0],
                self.payload[1],
                self.payload[2],
                self.payload[3],
            ]),
            u32::from_le_bytes([
                self.payload[4],
                self.payload[5],
                self.payload[6],
                self.payload[7],
            ]),
        )
    }

    /// External-table index carried in the payload of references and
    /// embedded instances.
    pub fn payload_ext_index(&self) -> u32 {
        u32::from_le_bytes([
            self.payload[0],
            self.payload[1],
            self.payload[2],
            self.payload[3],
        ])
    }

    zerocopy_accessors! {
        count: u32,
    }
}

/// One node of a singly-linked overflow chain in the heap, used for both
/// user-defined properties and user-defined key bindings. `next == 0`
/// terminates the chain.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct UserNode {
    next: U32,
    name: StringRef,
    slot: ValueSlot,
}

const _: () = assert!(std::mem::size_of::<UserNode>() == NODE_SIZE);

impl UserNode {
    pub fn new(name: StringRef, slot: ValueSlot) -> Self {
        Self {
            next: U32::new(0),
            name,
            slot,
        }
    }

    pub fn name(&self) -> StringRef {
        self.name
    }

    pub fn slot(&self) -> &ValueSlot {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut ValueSlot {
        &mut self.slot
    }

    zerocopy_accessors! {
        next: u32,
    }
}

/// The 96-byte block header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BufferHeader {
    magic: [u8; 8],
    version: U16,
    flags: U16,
    prop_count: U32,
    key_count: U32,
    prop_table_off: U32,
    key_table_off: U32,
    heap_off: U32,
    heap_len: U32,
    host: StringRef,
    namespace: StringRef,
    class_name: StringRef,
    user_prop_head: U32,
    user_prop_count: U32,
    user_key_head: U32,
    user_key_count: U32,
    ext_table_len: U32,
    reserved: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<BufferHeader>() == HEADER_SIZE);

impl BufferHeader {
    /// Builds a fresh header for a block with `prop_count` class-defined
    /// property slots and `key_count` class-defined key slots.
    pub fn new(prop_count: u32, key_count: u32) -> Self {
        let prop_table_off = HEADER_SIZE as u32;
        let key_table_off = prop_table_off + prop_count * SLOT_SIZE as u32;
        let heap_off = key_table_off + key_count * SLOT_SIZE as u32;
        Self {
            magic: *SCMO_MAGIC,
            version: U16::new(CURRENT_VERSION),
            flags: U16::new(0),
            prop_count: U32::new(prop_count),
            key_count: U32::new(key_count),
            prop_table_off: U32::new(prop_table_off),
            key_table_off: U32::new(key_table_off),
            heap_off: U32::new(heap_off),
            heap_len: U32::new(0),
            host: StringRef::unset(),
            namespace: StringRef::unset(),
            class_name: StringRef::unset(),
            user_prop_head: U32::new(0),
            user_prop_count: U32::new(0),
            user_key_head: U32::new(0),
            user_key_count: U32::new(0),
            ext_table_len: U32::new(0),
            reserved: [0; 16],
        }
    }

    /// Parses and validates the header prefix of an untrusted byte block.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= HEADER_SIZE,
            "buffer too small for BufferHeader: {} < {}",
            bytes.len(),
            HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse BufferHeader: {:?}", e))?;

        ensure!(
            &header.magic == SCMO_MAGIC,
            "invalid magic bytes in SCMO buffer"
        );

        ensure!(
            header.version.get() == CURRENT_VERSION,
            "unsupported SCMO buffer version: {} (expected {})",
            header.version.get(),
            CURRENT_VERSION
        );

        Ok(header)
    }

    pub fn version(&self) -> u16 {
        self.version.get()
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags.get() & flag != 0
    }

    pub fn set_flag(&mut self, flag: u16, on: bool) {
        let current = self.flags.get();
        self.flags = U16::new(if on { current | flag } else { current & !flag });
    }

    pub fn host(&self) -> StringRef {
        self.host
    }

    pub fn set_host(&mut self, r: StringRef) {
        self.host = r;
    }

    pub fn namespace(&self) -> StringRef {
        self.namespace
    }

    pub fn set_namespace(&mut self, r: StringRef) {
        self.namespace = r;
    }

    pub fn class_name(&self) -> StringRef {
        self.class_name
    }

    pub fn set_class_name(&mut self, r: StringRef) {
        self.class_name = r;
    }

    zerocopy_accessors! {
        flags: u16,
        prop_count: u32,
        key_count: u32,
        prop_table_off: u32,
        key_table_off: u32,
        heap_off: u32,
        heap_len: u32,
        user_prop_head: u32,
        user_prop_count: u32,
        user_key_head: u32,
        user_key_count: u32,
        ext_table_len: u32,
    }
}
