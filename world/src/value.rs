//! Dynamic property values.
//!
//! The [`Value`] enum holds one property of one object. Its shape always
//! matches the [`FieldKind`] declared for that property by the object's class;
//! [`Value::matches`] checks that agreement before any write lands.

use crate::asset::AssetRef;
use crate::class::{ClassId, FieldKind};
use crate::object::ObjectId;

/// An opaque, process-local handle (a pointer-sized token owned by the host).
///
/// Native handles only survive an in-process duplicate; they are never
/// meaningful after a save/load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// A property value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    List(Vec<Value>),
    /// Nested struct fields in declaration order.
    Struct(Vec<(String, Value)>),
    /// Reference to another object (shared or inline-owned, per the field kind).
    Object(Option<ObjectId>),
    Asset(Option<AssetRef>),
    Class(Option<ClassId>),
    Native(Option<NativeHandle>),
}

impl Value {
    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
            Self::Object(_) => "object",
            Self::Asset(_) => "asset",
            Self::Class(_) => "class",
            Self::Native(_) => "native",
        }
    }

    /// Returns `true` if this value has the shape `kind` describes.
    pub fn matches(&self, kind: &FieldKind) -> bool {
        match (self, kind) {
            (Self::Bool(_), FieldKind::Bool)
            | (Self::I64(_), FieldKind::Int)
            | (Self::U64(_), FieldKind::UInt)
            | (Self::F32(_), FieldKind::Float)
            | (Self::F64(_), FieldKind::Double)
            | (Self::String(_), FieldKind::String)
            | (Self::Object(_), FieldKind::Object | FieldKind::Inline(_))
            | (Self::Asset(_), FieldKind::Asset)
            | (Self::Class(_), FieldKind::Class)
            | (Self::Native(_), FieldKind::Native) => true,
            (Self::List(items), FieldKind::List(inner)) => items.iter().all(|v| v.matches(inner)),
            (Self::Struct(values), FieldKind::Struct(fields)) => {
                values.len() == fields.len()
                    && values
                        .iter()
                        .zip(fields)
                        .all(|((name, v), f)| *name == f.name && v.matches(&f.kind))
            }
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Looks up a nested struct field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The referenced object, if this is a non-null object reference.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(v) => *v,
            _ => None,
        }
    }

    pub fn as_asset(&self) -> Option<&AssetRef> {
        match self {
            Self::Asset(v) => v.as_ref(),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Self::Class(v) => *v,
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Self::Object(Some(v))
    }
}
