//! # Object Paths
//!
//! An `ObjectPath` names one managed object: host, namespace, class name, and
//! the key bindings that pin the instance. The text form is
//!
//! ```text
//! //host/namespace:Class.key1=value1,key2="quoted value"
//! ```
//!
//! with the host and namespace segments optional. Two paths are the same
//! object when host, namespace, class name, and binding names match
//! case-insensitively and every binding value is equivalent under its kind
//! ([`KeyBinding::matches`]); binding order never matters for equality or
//! hashing, while `Display` always renders bindings in insertion order.

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use eyre::Result;
use smallvec::SmallVec;

mod binding;
mod parse;

pub use binding::{KeyBinding, KeyBindingKind};

pub(crate) use binding::fold_integer_literal;

use binding::hash_folded;

/// The address of one managed object.
#[derive(Debug, Clone, Default)]
pub struct ObjectPath {
    host: String,
    namespace: String,
    class_name: String,
    key_bindings: SmallVec<[KeyBinding; 4]>,
}

impl ObjectPath {
    pub fn new(
        host: impl Into<String>,
        namespace: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            namespace: namespace.into(),
            class_name: class_name.into(),
            key_bindings: SmallVec::new(),
        }
    }

    /// Parses the text form. See [`crate::path`] for the grammar.
    pub fn parse(input: &str) -> Result<Self> {
        parse::parse(input)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn set_class_name(&mut self, class_name: impl Into<String>) {
        self.class_name = class_name.into();
    }

    pub fn key_bindings(&self) -> &[KeyBinding] {
        &self.key_bindings
    }

    /// Looks up a binding by name, case-insensitively.
    pub fn binding(&self, name: &str) -> Option<&KeyBinding> {
        self.key_bindings
            .iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }

    /// Replaces the binding with the same folded name, or appends. The
    /// insertion position of a replaced binding is kept.
    pub fn set_binding(&mut self, binding: KeyBinding) {
        match self
            .key_bindings
            .iter_mut()
            .find(|b| b.name().eq_ignore_ascii_case(binding.name()))
        {
            Some(existing) => *existing = binding,
            None => self.key_bindings.push(binding),
        }
    }

    pub fn set_key(
        &mut self,
        name: impl Into<String>,
        kind: KeyBindingKind,
        value: impl Into<String>,
    ) {
        self.set_binding(KeyBinding::new(name, kind, value));
    }

    /// Same-object test; an alias for `==` that reads better at call sites.
    pub fn identical(&self, other: &ObjectPath) -> bool {
        self == other
    }
}

impl PartialEq for ObjectPath {
    fn eq(&self, other: &Self) -> bool {
        if !self.host.eq_ignore_ascii_case(&other.host)
            || !self.namespace.eq_ignore_ascii_case(&other.namespace)
            || !self.class_name.eq_ignore_ascii_case(&other.class_name)
            || self.key_bindings.len() != other.key_bindings.len()
        {
            return false;
        }
        // unordered: every binding must have an equivalent partner
        self.key_bindings.iter().all(|mine| {
            other
                .binding(mine.name())
                .is_some_and(|theirs| mine.matches(theirs))
        })
    }
}

impl Eq for ObjectPath {}

impl Hash for ObjectPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_folded(&self.host, state);
        hash_folded(&self.namespace, state);
        hash_folded(&self.class_name, state);

        let mut order: SmallVec<[usize; 4]> = (0..self.key_bindings.len()).collect();
        order.sort_unstable_by(|&a, &b| {
            cmp_folded(self.key_bindings[a].name(), self.key_bindings[b].name())
        });
        for idx in order {
            self.key_bindings[idx].canonical_hash(state);
        }
    }
}

fn cmp_folded(a: &str, b: &str) -> std::cmp::Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.host.is_empty() {
            write!(f, "//{}/", self.host)?;
        }
        if !self.namespace.is_empty() {
            write!(f, "{}:", self.namespace)?;
        }
        f.write_str(&self.class_name)?;
        for (idx, binding) in self.key_bindings.iter().enumerate() {
            f.write_char(if idx == 0 { '.' } else { ',' })?;
            f.write_str(binding.name())?;
            f.write_char('=')?;
            match binding.kind() {
                KeyBindingKind::Boolean => f.write_str(
                    if binding.value().eq_ignore_ascii_case("true") {
                        "TRUE"
                    } else {
                        "FALSE"
                    },
                )?,
                KeyBindingKind::Numeric => f.write_str(binding.value())?,
                KeyBindingKind::String | KeyBindingKind::Reference => {
                    write_quoted(f, binding.value())?
                }
            }
        }
        Ok(())
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

impl FromStr for ObjectPath {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        parse::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(path: &ObjectPath) -> u64 {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_ignores_case_and_order() {
        let mut a = ObjectPath::new("srv1", "root/cimv2", "TST_Disk");
        a.set_key("SystemName", KeyBindingKind::String, "node7");
        a.set_key("DeviceId", KeyBindingKind::String, "sda");

        let mut b = ObjectPath::new("SRV1", "ROOT/CIMV2", "tst_disk");
        b.set_key("deviceid", KeyBindingKind::String, "sda");
        b.set_key("systemname", KeyBindingKind::String, "node7");

        assert_eq!(a, b);
        assert!(a.identical(&b));
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn numeric_spellings_hash_alike() {
        let mut a = ObjectPath::new("", "root", "TST_Unit");
        a.set_key("Index", KeyBindingKind::Numeric, "014");
        let mut b = ObjectPath::new("", "root", "TST_Unit");
        b.set_key("Index", KeyBindingKind::Numeric, "0xE");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let mut c = ObjectPath::new("", "root", "TST_Unit");
        c.set_key("Index", KeyBindingKind::Numeric, "15");
        assert_ne!(a, c);
    }

    #[test]
    fn display_renders_insertion_order_and_escapes() {
        let mut path = ObjectPath::new("", "root/cimv2", "TST_Tag");
        path.set_key("Label", KeyBindingKind::String, "a \"b\" \\ c");
        path.set_key("Enabled", KeyBindingKind::Boolean, "true");
        path.set_key("Index", KeyBindingKind::Numeric, "42");

        assert_eq!(
            path.to_string(),
            "root/cimv2:TST_Tag.Label=\"a \\\"b\\\" \\\\ c\",Enabled=TRUE,Index=42"
        );
    }

    #[test]
    fn set_binding_replaces_in_place() {
        let mut path = ObjectPath::new("", "root", "TST_A");
        path.set_key("x", KeyBindingKind::Numeric, "1");
        path.set_key("y", KeyBindingKind::Numeric, "2");
        path.set_key("X", KeyBindingKind::Numeric, "9");

        assert_eq!(path.key_bindings().len(), 2);
        assert_eq!(path.key_bindings()[0].value(), "9");
        assert_eq!(path.binding("Y").unwrap().value(), "2");
    }
}
