//! # Conversion Boundary
//!
//! Plain-data mirror types for provider and protocol code, and the bridges
//! between them, object paths, and the SCMO representation. Everything that
//! crosses this boundary is a deep copy: `CimInstance` never aliases an SCMO
//! heap.
//!
//! Class resolution goes through an explicitly passed [`ClassCache`]. A cache
//! miss is not an error: the instance is built schema-less (`NO_CLASS`), with
//! every property and key binding in the overflow chains. When the class does
//! resolve, declaration mismatches are hard errors: a provider handing over
//! a property its own class does not declare has broken the contract.

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{ScmoError, ScmoResult};
use crate::path::{fold_integer_literal, KeyBinding, KeyBindingKind, ObjectPath};
use crate::schema::{ClassCache, ScmoClass};
use crate::scmo::ScmoInstance;
use crate::types::{CimDateTime, CimType, CimValue};

/// One property of a plain-data instance. `value: None` is an explicit null.
#[derive(Debug, Clone, PartialEq)]
pub struct CimProperty {
    pub name: String,
    pub vtype: CimType,
    pub is_array: bool,
    pub class_origin: Option<String>,
    pub value: Option<CimValue<'static>>,
}

/// A plain-data instance, the shape provider and protocol code trade in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CimInstance {
    pub class_name: String,
    pub namespace: String,
    pub path: Option<ObjectPath>,
    pub properties: Vec<CimProperty>,
}

impl ScmoInstance {
    /// Builds an SCMO record from a plain-data instance. With a resolved
    /// class every property lands in the class-defined table and declaration
    /// mismatches fail hard; without one the instance is schema-less and
    /// takes everything as user-defined.
    pub fn from_cim_instance(cache: &ClassCache, src: &CimInstance) -> ScmoResult<ScmoInstance> {
        let class = cache.lookup(&src.namespace, &src.class_name);
        let mut inst = match class {
            Some(class) => ScmoInstance::new(class),
            None => ScmoInstance::new_classless(&src.namespace, &src.class_name),
        };
        for prop in &src.properties {
            match (&prop.value, &prop.class_origin) {
                (Some(value), Some(origin)) if !inst.is_classless() => {
                    inst.set_property_with_origin(&prop.name, origin, value)?;
                }
                (Some(value), _) => inst.set_property(&prop.name, value)?,
                (None, _) => inst.set_property_null(&prop.name, prop.vtype, prop.is_array)?,
            }
        }
        if let Some(path) = &src.path {
            if !path.host().is_empty() {
                inst.set_host(path.host())?;
            }
            apply_path_keys(cache, &mut inst, path)?;
        }
        Ok(inst)
    }

    /// Builds a keys-only SCMO record from an object path, the target shape
    /// for reference values. Literals convert to the declared key types when
    /// the class resolves, to inferred types otherwise.
    pub fn from_object_path(cache: &ClassCache, path: &ObjectPath) -> ScmoResult<ScmoInstance> {
        let class = cache.lookup(path.namespace(), path.class_name());
        let mut inst = match class {
            Some(class) => ScmoInstance::new(class),
            None => ScmoInstance::new_classless(path.namespace(), path.class_name()),
        };
        if !path.host().is_empty() {
            inst.set_host(path.host())?;
        }
        apply_path_keys(cache, &mut inst, path)?;
        Ok(inst)
    }

    /// Projects the identity of this record as an object path. Key bindings
    /// render in table order; unset key slots are skipped.
    pub fn to_object_path(&self) -> ObjectPath {
        let mut path = ObjectPath::new(self.host(), self.namespace(), self.class_name());
        for idx in 0..self.key_binding_count() {
            let Ok((name, value)) = self.key_binding_at(idx) else {
                continue;
            };
            if let Some((kind, literal)) = render_key_value(&value) {
                let name = name.to_string();
                path.set_binding(KeyBinding::new(name, kind, literal));
            }
        }
        path
    }

    /// Deep-copies this record into the plain-data shape.
    pub fn to_cim_instance(&self) -> CimInstance {
        let mut properties = Vec::with_capacity(self.property_count());
        for idx in 0..self.property_count() {
            let Ok(name) = self.property_name_at(idx) else {
                continue;
            };
            let Ok((vtype, is_array)) = self.property_type_at(idx) else {
                continue;
            };
            let name = name.to_string();
            let class_origin = self.property_origin_at(idx).map(str::to_string);
            let value = self.property_at(idx).ok().map(CimValue::into_owned);
            properties.push(CimProperty {
                name,
                vtype,
                is_array,
                class_origin,
                value,
            });
        }
        CimInstance {
            class_name: self.class_name().to_string(),
            namespace: self.namespace().to_string(),
            path: Some(self.to_object_path()),
            properties,
        }
    }
}

fn apply_path_keys(
    cache: &ClassCache,
    inst: &mut ScmoInstance,
    path: &ObjectPath,
) -> ScmoResult<()> {
    for binding in path.key_bindings() {
        let declared = inst
            .class()
            .and_then(|class| declared_key_type(class, binding.name()));
        let value = binding_to_value(cache, declared, binding)?;
        inst.set_key_binding(binding.name(), &value)?;
    }
    Ok(())
}

fn declared_key_type(class: &Arc<ScmoClass>, name: &str) -> Option<CimType> {
    let idx = class.property_index(name)?;
    let def = class.property(idx)?;
    def.is_key().then(|| def.vtype())
}

/// Converts one binding literal to a typed value: the declared key type when
/// known (with a magnitude fit check for integers), an inferred type
/// otherwise (Sint64, or Uint64 when the magnitude needs it).
fn binding_to_value(
    cache: &ClassCache,
    declared: Option<CimType>,
    binding: &KeyBinding,
) -> ScmoResult<CimValue<'static>> {
    match binding.kind() {
        KeyBindingKind::Boolean => {
            if matches!(declared, Some(t) if t != CimType::Boolean) {
                return Err(ScmoError::TypeMismatch);
            }
            Ok(CimValue::Boolean(binding.value().eq_ignore_ascii_case("true")))
        }
        KeyBindingKind::Numeric => {
            let Some(magnitude) = fold_integer_literal(binding.value()) else {
                // unparseable numeric literals stay literal, like equivalence
                return match declared {
                    Some(_) => Err(ScmoError::TypeMismatch),
                    None => Ok(CimValue::String(Cow::Owned(binding.value().to_string()))),
                };
            };
            match declared {
                Some(t) if t.is_integer() => {
                    CimValue::from_integer(t, magnitude).ok_or(ScmoError::TypeMismatch)
                }
                Some(_) => Err(ScmoError::TypeMismatch),
                None if magnitude > i64::MAX as i128 && magnitude <= u64::MAX as i128 => {
                    Ok(CimValue::Uint64(magnitude as u64))
                }
                None => i64::try_from(magnitude)
                    .map(CimValue::Sint64)
                    .map_err(|_| ScmoError::TypeMismatch),
            }
        }
        KeyBindingKind::String => match declared {
            Some(CimType::DateTime) => CimDateTime::parse(binding.value())
                .map(CimValue::DateTime)
                .map_err(|_| ScmoError::InvalidParameter),
            Some(CimType::Char16) => {
                let mut chars = binding.value().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if (c as u32) <= u16::MAX as u32 => {
                        Ok(CimValue::Char16(c as u16))
                    }
                    _ => Err(ScmoError::TypeMismatch),
                }
            }
            Some(CimType::String) | None => {
                Ok(CimValue::String(Cow::Owned(binding.value().to_string())))
            }
            Some(_) => Err(ScmoError::TypeMismatch),
        },
        KeyBindingKind::Reference => {
            if matches!(declared, Some(t) if t != CimType::Reference) {
                return Err(ScmoError::TypeMismatch);
            }
            let target = ObjectPath::parse(binding.value())
                .map_err(|_| ScmoError::InvalidParameter)?;
            let target = ScmoInstance::from_object_path(cache, &target)?;
            Ok(CimValue::Reference(target))
        }
    }
}

fn render_key_value(value: &CimValue<'_>) -> Option<(KeyBindingKind, String)> {
    Some(match value {
        CimValue::Boolean(v) => (
            KeyBindingKind::Boolean,
            if *v { "TRUE" } else { "FALSE" }.to_string(),
        ),
        CimValue::Uint8(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Sint8(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Uint16(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Sint16(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Uint32(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Sint32(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Uint64(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Sint64(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Real32(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Real64(v) => (KeyBindingKind::Numeric, v.to_string()),
        CimValue::Char16(v) => (
            KeyBindingKind::String,
            char::from_u32(*v as u32).unwrap_or('\u{fffd}').to_string(),
        ),
        CimValue::String(s) => (KeyBindingKind::String, s.to_string()),
        CimValue::DateTime(dt) => (KeyBindingKind::String, dt.to_string()),
        CimValue::Reference(target) => (
            KeyBindingKind::Reference,
            target.to_object_path().to_string(),
        ),
        CimValue::Instance(_) | CimValue::Array(_) => return None,
    })
}
