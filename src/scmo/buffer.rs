//! # Single-Chunk Buffer
//!
//! `BufferInner` owns the one relocatable byte block plus the two members
//! that cannot live in relocatable bytes: the class reference and the
//! external-reference table. All offset arithmetic and the slot codec
//! (`CimValue` to/from `ValueSlot`) live here; raw offsets never escape this
//! module.
//!
//! ## Heap Discipline
//!
//! The heap is the tail of the block and is append-only within one buffer
//! generation: growing it extends the `Vec` (amortized whole-block realloc),
//! which keeps every stored offset valid because offsets are relative to the
//! base. Replacing a string or array abandons the old payload in place.
//!
//! ## Clone Semantics
//!
//! `Clone` is the copy-on-write clone: a bulk byte copy with zero fixups,
//! the class `Arc` re-shared, and every external-reference entry re-attached
//! by handle clone (same targets, refcount bumped). Deep cloning of external
//! targets is a separate, explicit operation on the handle.

use std::borrow::Cow;
use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{ScmoError, ScmoResult};
use crate::schema::ScmoClass;
use crate::scmo::instance::ScmoInstance;
use crate::scmo::layout::{
    buffer_flags, BufferHeader, StringRef, UserNode, ValueSlot, HEADER_SIZE,
    INITIAL_HEAP_CAPACITY, NODE_SIZE, SLOT_SIZE,
};
use crate::types::{CimArray, CimDateTime, CimType, CimValue};

/// Which of the two overflow chains an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chain {
    UserProps,
    UserKeys,
}

#[derive(Debug, Clone)]
pub(crate) struct BufferInner {
    bytes: Vec<u8>,
    pub(crate) class: Option<Arc<ScmoClass>>,
    pub(crate) ext_refs: Vec<Option<ScmoInstance>>,
}

impl BufferInner {
    pub(crate) fn new(class: Option<Arc<ScmoClass>>) -> Self {
        let (n, k) = match &class {
            Some(c) => (c.property_count() as u32, c.key_count() as u32),
            None => (0, 0),
        };
        let header = BufferHeader::new(n, k);
        let table_len = HEADER_SIZE + (n + k) as usize * SLOT_SIZE;
        let mut bytes = Vec::with_capacity(table_len + INITIAL_HEAP_CAPACITY);
        bytes.extend_from_slice(header.as_bytes());
        // zeroed slot bytes decode as unset slots
        bytes.resize(table_len, 0);
        let mut inner = Self {
            bytes,
            class,
            ext_refs: Vec::new(),
        };
        if inner.class.is_none() {
            inner.header_mut().set_flag(buffer_flags::NO_CLASS, true);
        }
        inner
    }

    // ---- header and section access -------------------------------------

    pub(crate) fn header(&self) -> &BufferHeader {
        BufferHeader::ref_from_bytes(&self.bytes[..HEADER_SIZE])
            .expect("block always starts with a full header")
    }

    pub(crate) fn header_mut(&mut self) -> &mut BufferHeader {
        BufferHeader::mut_from_bytes(&mut self.bytes[..HEADER_SIZE])
            .expect("block always starts with a full header")
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn slot_at(&self, off: usize) -> &ValueSlot {
        ValueSlot::ref_from_bytes(&self.bytes[off..off + SLOT_SIZE])
            .expect("slot offsets are table-aligned")
    }

    fn slot_at_mut(&mut self, off: usize) -> &mut ValueSlot {
        ValueSlot::mut_from_bytes(&mut self.bytes[off..off + SLOT_SIZE])
            .expect("slot offsets are table-aligned")
    }

    pub(crate) fn prop_slot(&self, idx: usize) -> &ValueSlot {
        self.slot_at(self.header().prop_table_off() as usize + idx * SLOT_SIZE)
    }

    pub(crate) fn prop_slot_mut(&mut self, idx: usize) -> &mut ValueSlot {
        let off = self.header().prop_table_off() as usize + idx * SLOT_SIZE;
        self.slot_at_mut(off)
    }

    pub(crate) fn key_slot(&self, idx: usize) -> &ValueSlot {
        self.slot_at(self.header().key_table_off() as usize + idx * SLOT_SIZE)
    }

    pub(crate) fn key_slot_mut(&mut self, idx: usize) -> &mut ValueSlot {
        let off = self.header().key_table_off() as usize + idx * SLOT_SIZE;
        self.slot_at_mut(off)
    }

    pub(crate) fn node_at(&self, off: u32) -> &UserNode {
        let off = off as usize;
        UserNode::ref_from_bytes(&self.bytes[off..off + NODE_SIZE])
            .expect("chain offsets address whole nodes")
    }

    pub(crate) fn node_at_mut(&mut self, off: u32) -> &mut UserNode {
        let off = off as usize;
        UserNode::mut_from_bytes(&mut self.bytes[off..off + NODE_SIZE])
            .expect("chain offsets address whole nodes")
    }

    // ---- heap ----------------------------------------------------------

    fn heap_append(&mut self, data: &[u8]) -> ScmoResult<u32> {
        let off = heap_offset(self.bytes.len())?;
        heap_offset(self.bytes.len() + data.len())?;
        self.bytes.extend_from_slice(data);
        let new_len = self.header().heap_len() + data.len() as u32;
        self.header_mut().set_heap_len(new_len);
        Ok(off)
    }

    /// Appends a string payload; the returned ref is always "set" (nonzero
    /// offset) even for the empty string.
    pub(crate) fn alloc_string(&mut self, s: &str) -> ScmoResult<StringRef> {
        let off = self.heap_append(s.as_bytes())?;
        Ok(StringRef::new(off, s.len() as u32))
    }

    pub(crate) fn heap_bytes(&self, r: StringRef) -> &[u8] {
        let start = r.off() as usize;
        &self.bytes[start..start + r.len() as usize]
    }

    pub(crate) fn heap_str(&self, r: StringRef) -> &str {
        std::str::from_utf8(self.heap_bytes(r)).expect("heap strings are validated utf-8")
    }

    fn header_str(&self, r: StringRef) -> &str {
        if r.is_set() {
            self.heap_str(r)
        } else {
            ""
        }
    }

    pub(crate) fn host(&self) -> &str {
        self.header_str(self.header().host())
    }

    pub(crate) fn namespace(&self) -> &str {
        self.header_str(self.header().namespace())
    }

    pub(crate) fn class_name(&self) -> &str {
        self.header_str(self.header().class_name())
    }

    pub(crate) fn set_host(&mut self, host: &str) -> ScmoResult<()> {
        let r = self.alloc_string(host)?;
        self.header_mut().set_host(r);
        Ok(())
    }

    pub(crate) fn set_namespace(&mut self, namespace: &str) -> ScmoResult<()> {
        let r = self.alloc_string(namespace)?;
        self.header_mut().set_namespace(r);
        Ok(())
    }

    pub(crate) fn set_class_name(&mut self, class_name: &str) -> ScmoResult<()> {
        let r = self.alloc_string(class_name)?;
        self.header_mut().set_class_name(r);
        Ok(())
    }

    // ---- external-reference table --------------------------------------

    pub(crate) fn attach_ext(&mut self, handle: ScmoInstance) -> u32 {
        let idx = match self.ext_refs.iter().position(|e| e.is_none()) {
            Some(free) => {
                self.ext_refs[free] = Some(handle);
                free
            }
            None => {
                self.ext_refs.push(Some(handle));
                self.ext_refs.len() - 1
            }
        };
        let len = self.ext_refs.len() as u32;
        self.header_mut().set_ext_table_len(len);
        idx as u32
    }

    pub(crate) fn set_ext_ref(&mut self, idx: usize, handle: Option<ScmoInstance>) {
        if idx >= self.ext_refs.len() {
            self.ext_refs.resize(idx + 1, None);
        }
        self.ext_refs[idx] = handle;
        let len = self.ext_refs.len() as u32;
        self.header_mut().set_ext_table_len(len);
    }

    fn ext_handle(&self, idx: u32) -> ScmoResult<ScmoInstance> {
        self.ext_refs
            .get(idx as usize)
            .and_then(|e| e.clone())
            .ok_or(ScmoError::InvalidParameter)
    }

    /// Frees the external-table entries an outgoing slot referenced, so the
    /// entries can be reused by the next value.
    pub(crate) fn release_slot(&mut self, slot: &ValueSlot) {
        if !slot.is_set() || slot.is_null() {
            return;
        }
        let Ok(vtype) = CimType::try_from(slot.raw_vtype()) else {
            return;
        };
        if !matches!(vtype, CimType::Reference | CimType::Instance) {
            return;
        }
        if slot.is_array() {
            let region = slot.payload_ref();
            let indexes: SmallVec<[u32; 8]> = self
                .heap_bytes(region)
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            for idx in indexes {
                if let Some(entry) = self.ext_refs.get_mut(idx as usize) {
                    *entry = None;
                }
            }
        } else if let Some(entry) = self.ext_refs.get_mut(slot.payload_ext_index() as usize) {
            *entry = None;
        }
    }

    // ---- value codec ---------------------------------------------------

    pub(crate) fn encode_value(&mut self, value: &CimValue<'_>) -> ScmoResult<ValueSlot> {
        let vtype = value.cim_type();
        Ok(match value {
            CimValue::Boolean(v) => inline(vtype, &[*v as u8]),
            CimValue::Uint8(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Sint8(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Uint16(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Sint16(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Uint32(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Sint32(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Uint64(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Sint64(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Real32(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Real64(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::Char16(v) => inline(vtype, &v.to_le_bytes()),
            CimValue::DateTime(dt) => ValueSlot::value(vtype, false, 0, dt.to_bytes()),
            CimValue::String(s) => {
                let r = self.alloc_string(s)?;
                ValueSlot::value(vtype, false, 0, ref_payload(r))
            }
            CimValue::Reference(h) | CimValue::Instance(h) => {
                let idx = self.attach_ext(h.clone());
                ValueSlot::value(vtype, false, 0, ext_payload(idx))
            }
            CimValue::Array(arr) => self.encode_array(arr)?,
        })
    }

    fn encode_array(&mut self, arr: &CimArray<'_>) -> ScmoResult<ValueSlot> {
        let count = arr.len() as u32;
        let mut region: Vec<u8> = Vec::new();
        match arr {
            CimArray::Boolean(v) => region.extend(v.iter().map(|b| *b as u8)),
            CimArray::Uint8(v) => region.extend_from_slice(v),
            CimArray::Sint8(v) => region.extend(v.iter().map(|x| *x as u8)),
            CimArray::Uint16(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Sint16(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Uint32(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Sint32(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Uint64(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Sint64(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Real32(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Real64(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::Char16(v) => extend_le(&mut region, v.iter().map(|x| x.to_le_bytes())),
            CimArray::DateTime(v) => {
                for dt in v {
                    region.extend_from_slice(&dt.to_bytes());
                }
            }
            CimArray::String(v) => {
                for s in v.iter() {
                    region.extend_from_slice(&(s.len() as u32).to_le_bytes());
                    region.extend_from_slice(s.as_bytes());
                }
            }
            CimArray::Reference(v) | CimArray::Instance(v) => {
                for h in v {
                    let idx = self.attach_ext(h.clone());
                    region.extend_from_slice(&idx.to_le_bytes());
                }
            }
        }
        let off = self.heap_append(&region)?;
        let r = StringRef::new(off, region.len() as u32);
        Ok(ValueSlot::value(arr.element_type(), true, count, ref_payload(r)))
    }

    /// Decodes a slot that carries a value; unset and null slots report
    /// `NullValue` (the caller resolves schema defaults before calling).
    pub(crate) fn decode_value(&self, slot: &ValueSlot) -> ScmoResult<CimValue<'_>> {
        if !slot.is_set() || slot.is_null() {
            return Err(ScmoError::NullValue);
        }
        let vtype = CimType::try_from(slot.raw_vtype())?;
        if slot.is_array() {
            return self.decode_array(slot, vtype);
        }
        let p = slot.payload();
        Ok(match vtype {
            CimType::Boolean => CimValue::Boolean(p[0] != 0),
            CimType::Uint8 => CimValue::Uint8(p[0]),
            CimType::Sint8 => CimValue::Sint8(p[0] as i8),
            CimType::Uint16 => CimValue::Uint16(u16::from_le_bytes([p[0], p[1]])),
            CimType::Sint16 => CimValue::Sint16(i16::from_le_bytes([p[0], p[1]])),
            CimType::Uint32 => CimValue::Uint32(u32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            CimType::Sint32 => CimValue::Sint32(i32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            CimType::Uint64 => CimValue::Uint64(u64::from_le_bytes(
                p[..8].try_into().expect("payload holds 8 bytes"),
            )),
            CimType::Sint64 => CimValue::Sint64(i64::from_le_bytes(
                p[..8].try_into().expect("payload holds 8 bytes"),
            )),
            CimType::Real32 => CimValue::Real32(f32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            CimType::Real64 => CimValue::Real64(f64::from_le_bytes(
                p[..8].try_into().expect("payload holds 8 bytes"),
            )),
            CimType::Char16 => CimValue::Char16(u16::from_le_bytes([p[0], p[1]])),
            CimType::DateTime => CimValue::DateTime(
                CimDateTime::from_bytes(p).map_err(|_| ScmoError::InvalidParameter)?,
            ),
            CimType::String => CimValue::String(Cow::Borrowed(self.heap_str(slot.payload_ref()))),
            CimType::Reference => CimValue::Reference(self.ext_handle(slot.payload_ext_index())?),
            CimType::Instance => CimValue::Instance(self.ext_handle(slot.payload_ext_index())?),
        })
    }

    fn decode_array(&self, slot: &ValueSlot, vtype: CimType) -> ScmoResult<CimValue<'_>> {
        let region = self.heap_bytes(slot.payload_ref());
        let count = slot.count() as usize;
        let arr = match vtype {
            CimType::Boolean => CimArray::Boolean(region.iter().map(|b| *b != 0).collect()),
            CimType::Uint8 => CimArray::Uint8(Cow::Borrowed(region)),
            CimType::Sint8 => CimArray::Sint8(region.iter().map(|b| *b as i8).collect()),
            CimType::Uint16 => CimArray::Uint16(collect_le(region, u16::from_le_bytes)),
            CimType::Sint16 => CimArray::Sint16(collect_le(region, i16::from_le_bytes)),
            CimType::Uint32 => CimArray::Uint32(collect_le(region, u32::from_le_bytes)),
            CimType::Sint32 => CimArray::Sint32(collect_le(region, i32::from_le_bytes)),
            CimType::Uint64 => CimArray::Uint64(collect_le(region, u64::from_le_bytes)),
            CimType::Sint64 => CimArray::Sint64(collect_le(region, i64::from_le_bytes)),
            CimType::Real32 => CimArray::Real32(collect_le(region, f32::from_le_bytes)),
            CimType::Real64 => CimArray::Real64(collect_le(region, f64::from_le_bytes)),
            CimType::Char16 => CimArray::Char16(collect_le(region, u16::from_le_bytes)),
            CimType::DateTime => {
                let mut out = Vec::with_capacity(count);
                for chunk in region.chunks_exact(16) {
                    let mut packed = [0u8; 16];
                    packed.copy_from_slice(chunk);
                    out.push(
                        CimDateTime::from_bytes(&packed)
                            .map_err(|_| ScmoError::InvalidParameter)?,
                    );
                }
                CimArray::DateTime(out)
            }
            CimType::String => {
                let mut out = Vec::with_capacity(count);
                let mut pos = 0usize;
                for _ in 0..count {
                    let len = u32::from_le_bytes([
                        region[pos],
                        region[pos + 1],
                        region[pos + 2],
                        region[pos + 3],
                    ]) as usize;
                    pos += 4;
                    let s = std::str::from_utf8(&region[pos..pos + len])
                        .map_err(|_| ScmoError::InvalidParameter)?;
                    out.push(Cow::Borrowed(s));
                    pos += len;
                }
                CimArray::String(out)
            }
            CimType::Reference | CimType::Instance => {
                let mut out = Vec::with_capacity(count);
                for chunk in region.chunks_exact(4) {
                    let idx = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    out.push(self.ext_handle(idx)?);
                }
                if vtype == CimType::Reference {
                    CimArray::Reference(out)
                } else {
                    CimArray::Instance(out)
                }
            }
        };
        Ok(CimValue::Array(arr))
    }

    // ---- overflow chains -----------------------------------------------

    pub(crate) fn chain_head(&self, chain: Chain) -> u32 {
        match chain {
            Chain::UserProps => self.header().user_prop_head(),
            Chain::UserKeys => self.header().user_key_head(),
        }
    }

    pub(crate) fn chain_count(&self, chain: Chain) -> u32 {
        match chain {
            Chain::UserProps => self.header().user_prop_count(),
            Chain::UserKeys => self.header().user_key_count(),
        }
    }

    /// Walks to the chain node at `index`, if the chain is that long.
    pub(crate) fn chain_node_at(&self, chain: Chain, index: usize) -> Option<u32> {
        let mut off = self.chain_head(chain);
        let mut i = 0usize;
        while off != 0 {
            if i == index {
                return Some(off);
            }
            off = self.node_at(off).next();
            i += 1;
        }
        None
    }

    /// Finds the chain node whose name matches case-insensitively.
    pub(crate) fn chain_find(&self, chain: Chain, name: &str) -> Option<u32> {
        let mut off = self.chain_head(chain);
        while off != 0 {
            let node = self.node_at(off);
            let node_name = node.name();
            let next = node.next();
            if self.heap_str(node_name).eq_ignore_ascii_case(name) {
                return Some(off);
            }
            off = next;
        }
        None
    }

    /// Appends a new node to the tail of a chain and returns its offset.
    pub(crate) fn chain_append(&mut self, chain: Chain, name: &str, slot: ValueSlot) -> ScmoResult<u32> {
        let name_ref = self.alloc_string(name)?;
        let node = UserNode::new(name_ref, slot);
        let off = self.heap_append(node.as_bytes())?;

        let head = self.chain_head(chain);
        if head == 0 {
            match chain {
                Chain::UserProps => self.header_mut().set_user_prop_head(off),
                Chain::UserKeys => self.header_mut().set_user_key_head(off),
            }
        } else {
            let mut tail = head;
            loop {
                let next = self.node_at(tail).next();
                if next == 0 {
                    break;
                }
                tail = next;
            }
            self.node_at_mut(tail).set_next(off);
        }

        let count = self.chain_count(chain) + 1;
        match chain {
            Chain::UserProps => self.header_mut().set_user_prop_count(count),
            Chain::UserKeys => self.header_mut().set_user_key_count(count),
        }
        Ok(off)
    }

    /// Replaces the value slot of an existing chain node, releasing any
    /// external entries the old value held.
    pub(crate) fn set_node_slot(&mut self, off: u32, slot: ValueSlot) {
        let old = *self.node_at(off).slot();
        self.release_slot(&old);
        *self.node_at_mut(off).slot_mut() = slot;
    }

    /// Unlinks a whole chain; node bytes are abandoned in the heap.
    pub(crate) fn clear_chain(&mut self, chain: Chain) {
        let mut slots: SmallVec<[ValueSlot; 4]> = SmallVec::new();
        let mut off = self.chain_head(chain);
        while off != 0 {
            let node = self.node_at(off);
            slots.push(*node.slot());
            off = node.next();
        }
        for slot in slots {
            self.release_slot(&slot);
        }
        match chain {
            Chain::UserProps => {
                self.header_mut().set_user_prop_head(0);
                self.header_mut().set_user_prop_count(0);
            }
            Chain::UserKeys => {
                self.header_mut().set_user_key_head(0);
                self.header_mut().set_user_key_count(0);
            }
        }
    }

    // ---- untrusted re-attachment ---------------------------------------

    /// Rebuilds a buffer from raw bytes plus its out-of-band members,
    /// validating every offset, bound, chain, and string before trusting
    /// them. This is the relocation seam the serializer boundary uses.
    pub(crate) fn from_raw_parts(
        bytes: Vec<u8>,
        class: Option<Arc<ScmoClass>>,
        ext_refs: Vec<Option<ScmoInstance>>,
    ) -> Result<Self> {
        let header = *BufferHeader::from_bytes(&bytes)?;
        let n = header.prop_count() as usize;
        let k = header.key_count() as usize;

        ensure!(
            header.prop_table_off() as usize == HEADER_SIZE,
            "property table does not follow the header"
        );
        ensure!(
            header.key_table_off() as usize == HEADER_SIZE + n * SLOT_SIZE,
            "key table does not follow the property table"
        );
        let heap_off = HEADER_SIZE + (n + k) * SLOT_SIZE;
        ensure!(
            header.heap_off() as usize == heap_off,
            "heap does not follow the slot tables"
        );
        ensure!(
            heap_off as u64 + header.heap_len() as u64 == bytes.len() as u64,
            "recorded heap length disagrees with buffer size: {} + {} != {}",
            heap_off,
            header.heap_len(),
            bytes.len()
        );
        ensure!(
            header.ext_table_len() as usize == ext_refs.len(),
            "external table length disagrees: header {} vs supplied {}",
            header.ext_table_len(),
            ext_refs.len()
        );
        match &class {
            Some(c) => {
                ensure!(
                    !header.has_flag(buffer_flags::NO_CLASS),
                    "buffer is marked classless but a class was supplied"
                );
                ensure!(
                    c.property_count() == n && c.key_count() == k,
                    "class shape disagrees with slot tables: {}x{} vs {}x{}",
                    c.property_count(),
                    c.key_count(),
                    n,
                    k
                );
            }
            None => {
                ensure!(
                    header.has_flag(buffer_flags::NO_CLASS) && n == 0 && k == 0,
                    "buffer declares class-defined slots but no class was supplied"
                );
            }
        }

        let inner = Self {
            bytes,
            class,
            ext_refs,
        };
        inner.validate_string(header.host(), "host")?;
        inner.validate_string(header.namespace(), "namespace")?;
        inner.validate_string(header.class_name(), "class name")?;
        for i in 0..n {
            let slot = *inner.prop_slot(i);
            inner.validate_slot(&slot)?;
        }
        for i in 0..k {
            let slot = *inner.key_slot(i);
            inner.validate_slot(&slot)?;
        }
        inner.validate_chain(header.user_prop_head(), header.user_prop_count())?;
        inner.validate_chain(header.user_key_head(), header.user_key_count())?;
        Ok(inner)
    }

    fn validate_string(&self, r: StringRef, what: &str) -> Result<()> {
        if !r.is_set() {
            ensure!(r.len() == 0, "{} ref is unset but has a length", what);
            return Ok(());
        }
        let heap_off = self.header().heap_off() as u64;
        let end = r.off() as u64 + r.len() as u64;
        ensure!(
            r.off() as u64 >= heap_off && end <= self.bytes.len() as u64,
            "{} ref out of heap bounds: {}..{}",
            what,
            r.off(),
            end
        );
        ensure!(
            std::str::from_utf8(self.heap_bytes(r)).is_ok(),
            "{} is not valid utf-8",
            what
        );
        Ok(())
    }

    fn validate_region(&self, r: StringRef, what: &str) -> Result<()> {
        let heap_off = self.header().heap_off() as u64;
        let end = r.off() as u64 + r.len() as u64;
        ensure!(
            (r.off() as u64 >= heap_off || r.len() == 0) && end <= self.bytes.len() as u64,
            "{} region out of heap bounds: {}..{}",
            what,
            r.off(),
            end
        );
        Ok(())
    }

    fn validate_ext_index(&self, idx: u32) -> Result<()> {
        ensure!(
            matches!(self.ext_refs.get(idx as usize), Some(Some(_))),
            "slot references missing external entry {}",
            idx
        );
        Ok(())
    }

    fn validate_slot(&self, slot: &ValueSlot) -> Result<()> {
        if !slot.is_set() {
            return Ok(());
        }
        let vtype = CimType::try_from(slot.raw_vtype())
            .map_err(|_| eyre::eyre!("invalid slot type tag: {}", slot.raw_vtype()))?;
        if slot.is_null() {
            return Ok(());
        }
        if slot.is_array() {
            let r = slot.payload_ref();
            self.validate_region(r, "array")?;
            let count = slot.count() as u64;
            match vtype {
                CimType::String => {
                    let region = self.heap_bytes(r);
                    let mut pos = 0usize;
                    for i in 0..slot.count() {
                        ensure!(
                            pos + 4 <= region.len(),
                            "string array element {} header out of bounds",
                            i
                        );
                        let len = u32::from_le_bytes([
                            region[pos],
                            region[pos + 1],
                            region[pos + 2],
                            region[pos + 3],
                        ]) as usize;
                        pos += 4;
                        ensure!(
                            pos + len <= region.len(),
                            "string array element {} payload out of bounds",
                            i
                        );
                        ensure!(
                            std::str::from_utf8(&region[pos..pos + len]).is_ok(),
                            "string array element {} is not valid utf-8",
                            i
                        );
                        pos += len;
                    }
                    ensure!(pos == region.len(), "string array region has trailing bytes");
                }
                CimType::Reference | CimType::Instance => {
                    ensure!(
                        r.len() as u64 == count * 4,
                        "reference array region size disagrees with count"
                    );
                    for chunk in self.heap_bytes(r).chunks_exact(4) {
                        let idx = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        self.validate_ext_index(idx)?;
                    }
                }
                other => {
                    let elem = other
                        .fixed_size()
                        .expect("all remaining element types are fixed-width")
                        as u64;
                    ensure!(
                        r.len() as u64 == count * elem,
                        "array region size disagrees with count: {} != {} * {}",
                        r.len(),
                        count,
                        elem
                    );
                }
            }
            return Ok(());
        }
        match vtype {
            CimType::String => self.validate_string(slot.payload_ref(), "string value"),
            CimType::Reference | CimType::Instance => {
                self.validate_ext_index(slot.payload_ext_index())
            }
            CimType::DateTime => {
                CimDateTime::from_bytes(slot.payload())?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn validate_chain(&self, head: u32, count: u32) -> Result<()> {
        let heap_off = self.header().heap_off() as u64;
        let mut off = head;
        let mut seen = 0u32;
        while off != 0 {
            ensure!(seen < count, "overflow chain longer than recorded count");
            ensure!(
                off as u64 >= heap_off && off as u64 + NODE_SIZE as u64 <= self.bytes.len() as u64,
                "chain node out of bounds at offset {}",
                off
            );
            let node = *self.node_at(off);
            ensure!(node.name().is_set(), "chain node missing a name");
            self.validate_string(node.name(), "chain node name")?;
            self.validate_slot(node.slot())?;
            off = node.next();
            seen += 1;
        }
        ensure!(
            seen == count,
            "overflow chain shorter than recorded count: {} != {}",
            seen,
            count
        );
        Ok(())
    }
}

/// Stored offsets are 32-bit; a block may never grow past what they can
/// address.
fn heap_offset(len: usize) -> ScmoResult<u32> {
    u32::try_from(len).map_err(|_| ScmoError::BufferLimit)
}

fn inline(vtype: CimType, bytes: &[u8]) -> ValueSlot {
    let mut payload = [0u8; 16];
    payload[..bytes.len()].copy_from_slice(bytes);
    ValueSlot::value(vtype, false, 0, payload)
}

fn ref_payload(r: StringRef) -> [u8; 16] {
    let mut payload = [0u8; 16];
    payload[..4].copy_from_slice(&r.off().to_le_bytes());
    payload[4..8].copy_from_slice(&r.len().to_le_bytes());
    payload
}

fn ext_payload(idx: u32) -> [u8; 16] {
    let mut payload = [0u8; 16];
    payload[..4].copy_from_slice(&idx.to_le_bytes());
    payload
}

fn extend_le<const W: usize>(region: &mut Vec<u8>, items: impl Iterator<Item = [u8; W]>) {
    for bytes in items {
        region.extend_from_slice(&bytes);
    }
}

fn collect_le<T, const W: usize>(region: &[u8], from_le: fn([u8; W]) -> T) -> Vec<T> {
    region
        .chunks_exact(W)
        .map(|chunk| {
            let mut bytes = [0u8; W];
            bytes.copy_from_slice(chunk);
            from_le(bytes)
        })
        .collect()
}
