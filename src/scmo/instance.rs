//! # Instance Handles
//!
//! `ScmoInstance` is the cheap, clonable handle to one shared buffer. Handle
//! clones bump a refcount; the buffer is copied lazily, on the first write
//! through any handle whose buffer is shared (`Arc::make_mut` is the single
//! copy-on-write gate, so two racing writers can never both see "unshared").
//!
//! ## Property Surfaces
//!
//! A class-backed instance resolves names against its schema and stores
//! values in the fixed property table; an unset table slot reads through to
//! the schema default. Names the schema does not know are rejected, except
//! on schema-less instances where every property lives in the user-defined
//! overflow chain. Key bindings mirror the same split: declared keys occupy
//! the key table (with integer widening on store), unknown key names always
//! go to the user-key chain.

use std::fmt;
use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

use crate::error::{ScmoError, ScmoResult};
use crate::schema::ScmoClass;
use crate::scmo::buffer::{BufferInner, Chain};
use crate::scmo::layout::{buffer_flags, ValueSlot};
use crate::types::{CimType, CimValue};

/// Handle to one single-chunk memory object record.
#[derive(Clone)]
pub struct ScmoInstance {
    inner: Arc<BufferInner>,
}

impl ScmoInstance {
    /// Creates an empty instance of a resolved class. The property and key
    /// tables are sized from the schema; namespace and class name are copied
    /// from it.
    pub fn new(class: Arc<ScmoClass>) -> Self {
        let mut inner = BufferInner::new(Some(Arc::clone(&class)));
        inner
            .set_namespace(class.namespace())
            .expect("fresh block is far below the offset limit");
        inner
            .set_class_name(class.name())
            .expect("fresh block is far below the offset limit");
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a schema-less instance: the class-defined tables are empty and
    /// every property and key binding lives in the overflow chains.
    pub fn new_classless(namespace: &str, class_name: &str) -> Self {
        let mut inner = BufferInner::new(None);
        inner
            .set_namespace(namespace)
            .expect("fresh block is far below the offset limit");
        inner
            .set_class_name(class_name)
            .expect("fresh block is far below the offset limit");
        Self {
            inner: Arc::new(inner),
        }
    }

    fn make_unique(&mut self) -> &mut BufferInner {
        Arc::make_mut(&mut self.inner)
    }

    // ---- identity and sharing ------------------------------------------

    /// True if both handles address the same buffer.
    pub fn is_same(&self, other: &ScmoInstance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of handles sharing this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Eagerly copies the buffer. External references re-attach to the same
    /// targets (their refcounts are bumped, the targets are not copied).
    pub fn clone_buffer(&self) -> ScmoInstance {
        ScmoInstance {
            inner: Arc::new((*self.inner).clone()),
        }
    }

    /// Copies the buffer and, recursively, every externally referenced
    /// record, yielding a fully independent object graph.
    pub fn clone_buffer_deep(&self) -> ScmoInstance {
        let mut inner = (*self.inner).clone();
        for entry in inner.ext_refs.iter_mut() {
            if let Some(handle) = entry {
                *entry = Some(handle.clone_buffer_deep());
            }
        }
        ScmoInstance {
            inner: Arc::new(inner),
        }
    }

    // ---- flags ---------------------------------------------------------

    /// True once the namespace or class name has been overwritten after
    /// construction; the buffer may no longer match its class definition.
    pub fn is_compromised(&self) -> bool {
        self.inner.header().has_flag(buffer_flags::COMPROMISED)
    }

    pub fn is_classless(&self) -> bool {
        self.inner.header().has_flag(buffer_flags::NO_CLASS)
    }

    pub fn class_only(&self) -> bool {
        self.inner.header().has_flag(buffer_flags::CLASS_ONLY)
    }

    pub fn set_class_only(&mut self, on: bool) {
        self.make_unique()
            .header_mut()
            .set_flag(buffer_flags::CLASS_ONLY, on);
    }

    pub fn include_qualifiers(&self) -> bool {
        self.inner.header().has_flag(buffer_flags::INCLUDE_QUALIFIERS)
    }

    pub fn set_include_qualifiers(&mut self, on: bool) {
        self.make_unique()
            .header_mut()
            .set_flag(buffer_flags::INCLUDE_QUALIFIERS, on);
    }

    pub fn include_class_origin(&self) -> bool {
        self.inner
            .header()
            .has_flag(buffer_flags::INCLUDE_CLASS_ORIGIN)
    }

    pub fn set_include_class_origin(&mut self, on: bool) {
        self.make_unique()
            .header_mut()
            .set_flag(buffer_flags::INCLUDE_CLASS_ORIGIN, on);
    }

    // ---- naming --------------------------------------------------------

    pub fn host(&self) -> &str {
        self.inner.host()
    }

    pub fn set_host(&mut self, host: &str) -> ScmoResult<()> {
        self.make_unique().set_host(host)
    }

    pub fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    /// Overwrites the namespace and marks the instance compromised.
    pub fn set_namespace(&mut self, namespace: &str) -> ScmoResult<()> {
        let inner = self.make_unique();
        inner.set_namespace(namespace)?;
        inner
            .header_mut()
            .set_flag(buffer_flags::COMPROMISED, true);
        Ok(())
    }

    pub fn class_name(&self) -> &str {
        self.inner.class_name()
    }

    /// Overwrites the class name and marks the instance compromised.
    pub fn set_class_name(&mut self, class_name: &str) -> ScmoResult<()> {
        let inner = self.make_unique();
        inner.set_class_name(class_name)?;
        inner
            .header_mut()
            .set_flag(buffer_flags::COMPROMISED, true);
        Ok(())
    }

    pub fn class(&self) -> Option<&Arc<ScmoClass>> {
        self.inner.class.as_ref()
    }

    // ---- properties ----------------------------------------------------

    /// Class-defined plus user-defined property count.
    pub fn property_count(&self) -> usize {
        self.inner.header().prop_count() as usize
            + self.inner.chain_count(Chain::UserProps) as usize
    }

    /// Reads a property by name: class-defined first, then the user-defined
    /// chain. An unset class-defined slot reads the schema default.
    pub fn property_by_name(&self, name: &str) -> ScmoResult<CimValue<'_>> {
        if let Some(class) = &self.inner.class {
            if let Some(idx) = class.property_index(name) {
                return self.class_property_value(idx);
            }
        }
        let off = self
            .inner
            .chain_find(Chain::UserProps, name)
            .ok_or(ScmoError::NotFound)?;
        self.inner.decode_value(self.inner.node_at(off).slot())
    }

    /// Reads a property by stable node index: class-defined slots occupy
    /// `0..N`, user-defined entries follow in insertion order.
    pub fn property_at(&self, idx: usize) -> ScmoResult<CimValue<'_>> {
        let n = self.inner.header().prop_count() as usize;
        if idx < n {
            return self.class_property_value(idx);
        }
        let off = self
            .inner
            .chain_node_at(Chain::UserProps, idx - n)
            .ok_or(ScmoError::IndexOutOfBound)?;
        self.inner.decode_value(self.inner.node_at(off).slot())
    }

    pub fn property_name_at(&self, idx: usize) -> ScmoResult<&str> {
        let n = self.inner.header().prop_count() as usize;
        if idx < n {
            let class = self.inner.class.as_ref().ok_or(ScmoError::IndexOutOfBound)?;
            return class
                .property(idx)
                .map(|def| def.name())
                .ok_or(ScmoError::IndexOutOfBound);
        }
        let off = self
            .inner
            .chain_node_at(Chain::UserProps, idx - n)
            .ok_or(ScmoError::IndexOutOfBound)?;
        Ok(self.inner.heap_str(self.inner.node_at(off).name()))
    }

    /// Declared (or stored, for user-defined entries) type and arrayness of
    /// the property at `idx`.
    pub fn property_type_at(&self, idx: usize) -> ScmoResult<(CimType, bool)> {
        let n = self.inner.header().prop_count() as usize;
        if idx < n {
            let class = self.inner.class.as_ref().ok_or(ScmoError::IndexOutOfBound)?;
            let def = class.property(idx).ok_or(ScmoError::IndexOutOfBound)?;
            return Ok((def.vtype(), def.is_array()));
        }
        let off = self
            .inner
            .chain_node_at(Chain::UserProps, idx - n)
            .ok_or(ScmoError::IndexOutOfBound)?;
        let slot = self.inner.node_at(off).slot();
        Ok((CimType::try_from(slot.raw_vtype())?, slot.is_array()))
    }

    /// Declaring class of the property at `idx`; user-defined entries have
    /// none.
    pub fn property_origin_at(&self, idx: usize) -> Option<&str> {
        let n = self.inner.header().prop_count() as usize;
        if idx < n {
            let class = self.inner.class.as_ref()?;
            return class.property(idx).map(|def| def.class_origin());
        }
        None
    }

    /// Reads a class-defined property, filtered by declaring class. The
    /// filter only ever matches class-defined properties, and it keeps
    /// applying on compromised instances.
    pub fn property_with_origin(&self, name: &str, origin: &str) -> ScmoResult<CimValue<'_>> {
        let class = self.inner.class.as_ref().ok_or(ScmoError::NotFound)?;
        let idx = class.property_index(name).ok_or(ScmoError::NotFound)?;
        let def = class.property(idx).ok_or(ScmoError::NotFound)?;
        if !def.class_origin().eq_ignore_ascii_case(origin) {
            return Err(ScmoError::OriginMismatch);
        }
        self.class_property_value(idx)
    }

    fn class_property_value(&self, idx: usize) -> ScmoResult<CimValue<'_>> {
        let slot = self.inner.prop_slot(idx);
        if !slot.is_set() {
            let class = self.inner.class.as_ref().ok_or(ScmoError::IndexOutOfBound)?;
            let def = class.property(idx).ok_or(ScmoError::IndexOutOfBound)?;
            return match def.default() {
                Some(value) => Ok(value.clone()),
                None => Err(ScmoError::NullValue),
            };
        }
        self.inner.decode_value(slot)
    }

    /// Stores a property value. Class-defined names are checked against the
    /// declaration; names the schema does not know are rejected unless the
    /// instance is schema-less, in which case they become user-defined
    /// entries.
    pub fn set_property(&mut self, name: &str, value: &CimValue<'_>) -> ScmoResult<()> {
        if let Some(class) = self.inner.class.clone() {
            let Some(idx) = class.property_index(name) else {
                return Err(ScmoError::NotFound);
            };
            let def = class.property(idx).ok_or(ScmoError::NotFound)?;
            check_declaration(def.vtype(), def.is_array(), value)?;
            let inner = self.make_unique();
            let old = *inner.prop_slot(idx);
            inner.release_slot(&old);
            let slot = inner.encode_value(value)?;
            *inner.prop_slot_mut(idx) = slot;
            return Ok(());
        }
        self.set_user_entry(Chain::UserProps, name, value)
    }

    /// Stores a class-defined property, refusing when the declaring class
    /// does not match `origin`.
    pub fn set_property_with_origin(
        &mut self,
        name: &str,
        origin: &str,
        value: &CimValue<'_>,
    ) -> ScmoResult<()> {
        let class = self.inner.class.clone().ok_or(ScmoError::NotFound)?;
        let idx = class.property_index(name).ok_or(ScmoError::NotFound)?;
        let def = class.property(idx).ok_or(ScmoError::NotFound)?;
        if !def.class_origin().eq_ignore_ascii_case(origin) {
            return Err(ScmoError::OriginMismatch);
        }
        check_declaration(def.vtype(), def.is_array(), value)?;
        let inner = self.make_unique();
        let old = *inner.prop_slot(idx);
        inner.release_slot(&old);
        let slot = inner.encode_value(value)?;
        *inner.prop_slot_mut(idx) = slot;
        Ok(())
    }

    /// Stores an explicit null. Distinct from an unset slot: a null never
    /// reads through to the schema default.
    pub fn set_property_null(
        &mut self,
        name: &str,
        vtype: CimType,
        is_array: bool,
    ) -> ScmoResult<()> {
        if let Some(class) = self.inner.class.clone() {
            let Some(idx) = class.property_index(name) else {
                return Err(ScmoError::NotFound);
            };
            let def = class.property(idx).ok_or(ScmoError::NotFound)?;
            if def.vtype() != vtype || def.is_array() != is_array {
                return Err(ScmoError::WrongType);
            }
            let inner = self.make_unique();
            let old = *inner.prop_slot(idx);
            inner.release_slot(&old);
            *inner.prop_slot_mut(idx) = ValueSlot::null(vtype, is_array);
            return Ok(());
        }
        let inner = self.make_unique();
        let slot = ValueSlot::null(vtype, is_array);
        match inner.chain_find(Chain::UserProps, name) {
            Some(off) => inner.set_node_slot(off, slot),
            None => {
                inner.chain_append(Chain::UserProps, name, slot)?;
            }
        }
        Ok(())
    }

    fn set_user_entry(&mut self, chain: Chain, name: &str, value: &CimValue<'_>) -> ScmoResult<()> {
        let inner = self.make_unique();
        let existing = inner.chain_find(chain, name);
        let slot = inner.encode_value(value)?;
        match existing {
            Some(off) => inner.set_node_slot(off, slot),
            None => {
                inner.chain_append(chain, name, slot)?;
            }
        }
        Ok(())
    }

    // ---- key bindings --------------------------------------------------

    /// Class-defined plus user-defined key binding count.
    pub fn key_binding_count(&self) -> usize {
        self.inner.header().key_count() as usize
            + self.inner.chain_count(Chain::UserKeys) as usize
    }

    pub fn key_binding(&self, name: &str) -> ScmoResult<CimValue<'_>> {
        if let Some(class) = &self.inner.class {
            if let Some((pos, _)) = class_key_pos(class, name) {
                return self.inner.decode_value(self.inner.key_slot(pos));
            }
        }
        let off = self
            .inner
            .chain_find(Chain::UserKeys, name)
            .ok_or(ScmoError::NotFound)?;
        self.inner.decode_value(self.inner.node_at(off).slot())
    }

    pub fn key_binding_at(&self, idx: usize) -> ScmoResult<(&str, CimValue<'_>)> {
        let class_keys = self.inner.header().key_count() as usize;
        if idx < class_keys {
            let class = self.inner.class.as_ref().ok_or(ScmoError::IndexOutOfBound)?;
            let prop_idx = class.key_indexes()[idx];
            let name = class
                .property(prop_idx)
                .map(|def| def.name())
                .ok_or(ScmoError::IndexOutOfBound)?;
            let value = self.inner.decode_value(self.inner.key_slot(idx))?;
            return Ok((name, value));
        }
        let off = self
            .inner
            .chain_node_at(Chain::UserKeys, idx - class_keys)
            .ok_or(ScmoError::IndexOutOfBound)?;
        let node = self.inner.node_at(off);
        let name = self.inner.heap_str(node.name());
        let value = self.inner.decode_value(node.slot())?;
        Ok((name, value))
    }

    /// Stores a key binding. Values for declared keys are widened to the
    /// declared type when the magnitude fits; names that are not declared
    /// keys always become user-defined key bindings. Arrays are never valid
    /// key values.
    pub fn set_key_binding(&mut self, name: &str, value: &CimValue<'_>) -> ScmoResult<()> {
        if value.is_array() {
            return Err(ScmoError::InvalidParameter);
        }
        if let Some(class) = self.inner.class.clone() {
            if let Some((pos, vtype)) = class_key_pos(&class, name) {
                let widened = widen_for_key(vtype, value)?;
                let inner = self.make_unique();
                let old = *inner.key_slot(pos);
                inner.release_slot(&old);
                let slot = inner.encode_value(&widened)?;
                *inner.key_slot_mut(pos) = slot;
                return Ok(());
            }
        }
        self.set_user_entry(Chain::UserKeys, name, value)
    }

    pub fn set_key_binding_at(&mut self, idx: usize, value: &CimValue<'_>) -> ScmoResult<()> {
        if value.is_array() {
            return Err(ScmoError::InvalidParameter);
        }
        let class_keys = self.inner.header().key_count() as usize;
        if idx < class_keys {
            let class = self.inner.class.clone().ok_or(ScmoError::IndexOutOfBound)?;
            let prop_idx = class.key_indexes()[idx];
            let vtype = class
                .property(prop_idx)
                .ok_or(ScmoError::IndexOutOfBound)?
                .vtype();
            let widened = widen_for_key(vtype, value)?;
            let inner = self.make_unique();
            let old = *inner.key_slot(idx);
            inner.release_slot(&old);
            let slot = inner.encode_value(&widened)?;
            *inner.key_slot_mut(idx) = slot;
            return Ok(());
        }
        let off = self
            .inner
            .chain_node_at(Chain::UserKeys, idx - class_keys)
            .ok_or(ScmoError::IndexOutOfBound)?;
        let inner = self.make_unique();
        let slot = inner.encode_value(value)?;
        inner.set_node_slot(off, slot);
        Ok(())
    }

    /// Unsets every class-defined key slot and drops the user-key chain.
    pub fn clear_key_bindings(&mut self) {
        let inner = self.make_unique();
        let class_keys = inner.header().key_count() as usize;
        for pos in 0..class_keys {
            let old = *inner.key_slot(pos);
            inner.release_slot(&old);
            *inner.key_slot_mut(pos) = ValueSlot::unset();
        }
        inner.clear_chain(Chain::UserKeys);
    }

    /// Fills the key table from the current values of the declared key
    /// properties (schema default where unset). A key property that is null
    /// or has no value to take reports `NoSuchProperty`.
    pub fn build_key_bindings_from_properties(&mut self) -> ScmoResult<()> {
        let Some(class) = self.inner.class.clone() else {
            return Ok(());
        };
        let mut values: SmallVec<[CimValue<'static>; 4]> = SmallVec::new();
        for &prop_idx in class.key_indexes() {
            let def = class.property(prop_idx).ok_or(ScmoError::NoSuchProperty)?;
            let slot = *self.inner.prop_slot(prop_idx);
            let value = if !slot.is_set() {
                def.default().cloned().ok_or(ScmoError::NoSuchProperty)?
            } else {
                self.inner
                    .decode_value(&slot)
                    .map_err(|e| {
                        if e == ScmoError::NullValue {
                            ScmoError::NoSuchProperty
                        } else {
                            e
                        }
                    })?
                    .into_owned()
            };
            values.push(value);
        }
        let inner = self.make_unique();
        for (pos, value) in values.iter().enumerate() {
            let old = *inner.key_slot(pos);
            inner.release_slot(&old);
            let slot = inner.encode_value(value)?;
            *inner.key_slot_mut(pos) = slot;
        }
        Ok(())
    }

    // ---- external references and raw parts -----------------------------

    pub fn external_refs(&self) -> &[Option<ScmoInstance>] {
        &self.inner.ext_refs
    }

    pub fn external_ref(&self, idx: usize) -> Option<ScmoInstance> {
        self.inner.ext_refs.get(idx).and_then(|e| e.clone())
    }

    /// Replaces an external-table entry, growing the table as needed. This
    /// is the re-attachment hook for deserializers that restore targets
    /// after the raw block.
    pub fn set_external_ref(&mut self, idx: usize, handle: Option<ScmoInstance>) {
        self.make_unique().set_ext_ref(idx, handle);
    }

    /// The raw relocatable block. Together with [`Self::external_refs`] this
    /// is everything a serializer needs.
    pub fn buffer_bytes(&self) -> &[u8] {
        self.inner.bytes()
    }

    /// Re-attaches a raw block with its out-of-band members, validating the
    /// whole layout before trusting any offset in it.
    pub fn from_raw_parts(
        bytes: Vec<u8>,
        class: Option<Arc<ScmoClass>>,
        ext_refs: Vec<Option<ScmoInstance>>,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(BufferInner::from_raw_parts(bytes, class, ext_refs)?),
        })
    }

    // ---- equivalence ---------------------------------------------------

    /// Structural equality: naming, every property (by name, including the
    /// distinction between null, unset, and valued), and every key binding.
    /// Referenced records compare by content recursively. Buffer identity is
    /// the separate [`Self::is_same`].
    pub fn content_equals(&self, other: &ScmoInstance) -> bool {
        if self.is_same(other) {
            return true;
        }
        if !self.host().eq_ignore_ascii_case(other.host())
            || !self.namespace().eq_ignore_ascii_case(other.namespace())
            || !self.class_name().eq_ignore_ascii_case(other.class_name())
        {
            return false;
        }
        let props = self.property_count();
        if props != other.property_count() {
            return false;
        }
        for idx in 0..props {
            let (Ok(a), Ok(b)) = (self.property_name_at(idx), other.property_name_at(idx)) else {
                return false;
            };
            if !a.eq_ignore_ascii_case(b) {
                return false;
            }
            if !results_eq(self.property_at(idx), other.property_at(idx)) {
                return false;
            }
        }
        let keys = self.key_binding_count();
        if keys != other.key_binding_count() {
            return false;
        }
        for idx in 0..keys {
            match (self.key_binding_at(idx), other.key_binding_at(idx)) {
                (Ok((an, av)), Ok((bn, bv))) => {
                    if !an.eq_ignore_ascii_case(bn) || av != bv {
                        return false;
                    }
                }
                (Err(a), Err(b)) => {
                    if a != b {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Debug for ScmoInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScmoInstance")
            .field("namespace", &self.namespace())
            .field("class_name", &self.class_name())
            .field("properties", &self.property_count())
            .field("key_bindings", &self.key_binding_count())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

fn results_eq(a: ScmoResult<CimValue<'_>>, b: ScmoResult<CimValue<'_>>) -> bool {
    match (a, b) {
        (Ok(x), Ok(y)) => x == y,
        (Err(x), Err(y)) => x == y,
        _ => false,
    }
}

fn check_declaration(vtype: CimType, is_array: bool, value: &CimValue<'_>) -> ScmoResult<()> {
    if !is_array && value.is_array() {
        return Err(ScmoError::NotAnArray);
    }
    if is_array && !value.is_array() {
        return Err(ScmoError::IsAnArray);
    }
    if value.cim_type() != vtype {
        return Err(ScmoError::WrongType);
    }
    Ok(())
}

/// Key-table slot position and declared type for a declared key name.
fn class_key_pos(class: &ScmoClass, name: &str) -> Option<(usize, CimType)> {
    let idx = class.property_index(name)?;
    let pos = class.key_indexes().iter().position(|&i| i == idx)?;
    Some((pos, class.property(idx)?.vtype()))
}

/// Converts a scalar key value to the declared key type: integers widen (or
/// narrow) when the magnitude fits, reals convert between widths, everything
/// else must match exactly.
fn widen_for_key(declared: CimType, value: &CimValue<'_>) -> ScmoResult<CimValue<'static>> {
    if value.is_array() {
        return Err(ScmoError::InvalidParameter);
    }
    let actual = value.cim_type();
    if actual == declared {
        return Ok(value.clone().into_owned());
    }
    if declared.is_integer() && actual.is_integer() {
        let magnitude = value.as_integer().ok_or(ScmoError::TypeMismatch)?;
        return CimValue::from_integer(declared, magnitude).ok_or(ScmoError::TypeMismatch);
    }
    match (declared, value) {
        (CimType::Real32, CimValue::Real64(v)) => Ok(CimValue::Real32(*v as f32)),
        (CimType::Real64, CimValue::Real32(v)) => Ok(CimValue::Real64(*v as f64)),
        _ => Err(ScmoError::TypeMismatch),
    }
}
