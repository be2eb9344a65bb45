//! # Class Schema
//!
//! An `ScmoClass` is the immutable description of a record type: an ordered
//! list of property definitions, the subset that forms the identity (key) set,
//! and class-level qualifiers. Property order is fixed at construction and
//! defines the stable node index used by class-defined property access; the
//! buffer's property table is laid out 1:1 against it.
//!
//! Classes are created once, cached, and shared read-only through
//! `Arc<ScmoClass>`; instances hold a non-owning reference. Name lookup is
//! ASCII case-insensitive, resolved through a pre-computed folded index.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::types::{CimType, CimValue};

/// One qualifier attached to a class or a property.
#[derive(Debug, Clone, PartialEq)]
pub struct Qualifier {
    pub name: String,
    pub value: CimValue<'static>,
}

/// One property declaration: name, type, arrayness, key membership, the class
/// that declared it, an optional default, and qualifiers.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: String,
    vtype: CimType,
    is_array: bool,
    is_key: bool,
    class_origin: String,
    default: Option<CimValue<'static>>,
    qualifiers: Vec<Qualifier>,
}

impl PropertyDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vtype(&self) -> CimType {
        self.vtype
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn class_origin(&self) -> &str {
        &self.class_origin
    }

    pub fn default(&self) -> Option<&CimValue<'static>> {
        self.default.as_ref()
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        self.qualifiers.as_slice()
    }
}

/// An immutable class schema.
#[derive(Debug)]
pub struct ScmoClass {
    class_name: String,
    namespace: String,
    properties: Vec<PropertyDef>,
    qualifiers: Vec<Qualifier>,
    name_index: HashMap<String, usize>,
    key_indexes: SmallVec<[usize; 4]>,
}

impl ScmoClass {
    pub fn builder(namespace: impl Into<String>, class_name: impl Into<String>) -> ScmoClassBuilder {
        ScmoClassBuilder {
            class_name: class_name.into(),
            namespace: namespace.into(),
            properties: Vec::new(),
            qualifiers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.class_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn property(&self, idx: usize) -> Option<&PropertyDef> {
        self.properties.get(idx)
    }

    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Resolves a property name to its stable node index, case-insensitively.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(&name.to_ascii_lowercase()).copied()
    }

    /// Node indexes of the key properties, in declaration order.
    pub fn key_indexes(&self) -> &[usize] {
        &self.key_indexes
    }

    pub fn key_count(&self) -> usize {
        self.key_indexes.len()
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }
}

/// Builder for `ScmoClass`. Declaration order is preserved and becomes the
/// stable property-table order.
pub struct ScmoClassBuilder {
    class_name: String,
    namespace: String,
    properties: Vec<PropertyDef>,
    qualifiers: Vec<Qualifier>,
}

impl ScmoClassBuilder {
    pub fn property(self, name: impl Into<String>, vtype: CimType) -> Self {
        self.add_property(name, vtype, false, false, None)
    }

    pub fn array_property(self, name: impl Into<String>, vtype: CimType) -> Self {
        self.add_property(name, vtype, true, false, None)
    }

    pub fn key_property(self, name: impl Into<String>, vtype: CimType) -> Self {
        self.add_property(name, vtype, false, true, None)
    }

    pub fn property_with_default(
        self,
        name: impl Into<String>,
        vtype: CimType,
        default: CimValue<'static>,
    ) -> Self {
        self.add_property(name, vtype, false, false, Some(default))
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        vtype: CimType,
        is_array: bool,
        is_key: bool,
        default: Option<CimValue<'static>>,
    ) -> Self {
        let class_origin = self.class_name.clone();
        self.properties.push(PropertyDef {
            name: name.into(),
            vtype,
            is_array,
            is_key,
            class_origin,
            default,
            qualifiers: Vec::new(),
        });
        self
    }

    /// Overrides the declaring class recorded for the most recent property,
    /// for properties inherited from a superclass.
    pub fn origin(mut self, class_origin: impl Into<String>) -> Self {
        if let Some(last) = self.properties.last_mut() {
            last.class_origin = class_origin.into();
        }
        self
    }

    /// Attaches a qualifier to the most recent property.
    pub fn property_qualifier(
        mut self,
        name: impl Into<String>,
        value: CimValue<'static>,
    ) -> Self {
        if let Some(last) = self.properties.last_mut() {
            last.qualifiers.push(Qualifier {
                name: name.into(),
                value,
            });
        }
        self
    }

    /// Attaches a class-level qualifier.
    pub fn qualifier(mut self, name: impl Into<String>, value: CimValue<'static>) -> Self {
        self.qualifiers.push(Qualifier {
            name: name.into(),
            value,
        });
        self
    }

    pub fn build(self) -> ScmoClass {
        let mut name_index = HashMap::with_capacity(self.properties.len());
        let mut key_indexes = SmallVec::new();
        for (idx, prop) in self.properties.iter().enumerate() {
            name_index.insert(prop.name.to_ascii_lowercase(), idx);
            if prop.is_key {
                key_indexes.push(idx);
            }
        }
        ScmoClass {
            class_name: self.class_name,
            namespace: self.namespace,
            properties: self.properties,
            qualifiers: self.qualifiers,
            name_index,
            key_indexes,
        }
    }
}
