//! # Key Bindings
//!
//! One binding is a name, a kind, and the literal text of the value. The kind
//! drives equivalence: numeric literals compare by parsed integer magnitude
//! (`"014"`, `"0xE"` and `"+14"` are all the same binding value), boolean
//! literals case-insensitively, reference literals by recursive path
//! equality. A literal that fails to parse for its kind falls back to exact
//! comparison, never to an error.

use std::hash::{Hash, Hasher};

use crate::path::ObjectPath;

/// How a binding value literal is interpreted for equivalence. Datetime keys
/// travel as `String` with the DSP0004 literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBindingKind {
    Boolean,
    Numeric,
    String,
    Reference,
}

/// One key binding of an object path.
#[derive(Debug, Clone)]
pub struct KeyBinding {
    name: String,
    kind: KeyBindingKind,
    value: String,
}

impl KeyBinding {
    pub fn new(
        name: impl Into<String>,
        kind: KeyBindingKind,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> KeyBindingKind {
        self.kind
    }

    /// The raw value literal, unquoted and unescaped.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Binding equivalence: names case-insensitive, values per kind.
    pub fn matches(&self, other: &KeyBinding) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.kind == other.kind
            && values_equivalent(self.kind, &self.value, &other.value)
    }

    /// Hashes the canonical form of this binding, so that every literal
    /// spelling of an equivalent value hashes alike.
    pub(crate) fn canonical_hash<H: Hasher>(&self, state: &mut H) {
        hash_folded(&self.name, state);
        self.kind.hash(state);
        match self.kind {
            KeyBindingKind::Boolean => hash_folded(&self.value, state),
            KeyBindingKind::Numeric => match fold_integer_literal(&self.value) {
                Some(magnitude) => magnitude.hash(state),
                None => self.value.hash(state),
            },
            KeyBindingKind::String => self.value.hash(state),
            KeyBindingKind::Reference => match ObjectPath::parse(&self.value) {
                Ok(path) => path.hash(state),
                Err(_) => self.value.hash(state),
            },
        }
    }
}

fn values_equivalent(kind: KeyBindingKind, a: &str, b: &str) -> bool {
    match kind {
        KeyBindingKind::Boolean => a.eq_ignore_ascii_case(b),
        KeyBindingKind::String => a == b,
        KeyBindingKind::Numeric => {
            match (fold_integer_literal(a), fold_integer_literal(b)) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            }
        }
        KeyBindingKind::Reference => {
            match (ObjectPath::parse(a), ObjectPath::parse(b)) {
                (Ok(x), Ok(y)) => x == y,
                _ => a == b,
            }
        }
    }
}

pub(crate) fn hash_folded<H: Hasher>(s: &str, state: &mut H) {
    for b in s.bytes() {
        b.to_ascii_lowercase().hash(state);
    }
    state.write_u8(0xff);
}

/// Parses a numeric key literal: optional sign, then decimal digits (leading
/// zeros allowed) or `0x`/`0X` hex. No whitespace trimming; overflow and
/// anything else is a parse failure.
pub(crate) fn fold_integer_literal(s: &str) -> Option<i128> {
    let (negative, rest) = match s.as_bytes().first()? {
        b'+' => (false, &s[1..]),
        b'-' => (true, &s[1..]),
        _ => (false, s),
    };
    if rest.is_empty() {
        return None;
    }
    let (radix, digits) = if rest.len() > 2 && (rest.starts_with("0x") || rest.starts_with("0X")) {
        (16u32, &rest[2..])
    } else {
        (10u32, rest)
    };
    let mut value: i128 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(radix)? as i128;
        value = value.checked_mul(radix as i128)?.checked_add(digit)?;
    }
    Some(if negative { -value } else { value })
}
