//! One-byte tagged encoding of reference-shaped values.
//!
//! | Tag      | Payload                        |
//! |----------|--------------------------------|
//! | `None`   | nothing                        |
//! | `Asset`  | `i32` asset index              |
//! | `Class`  | `i32` class index              |
//! | `Object` | 16-byte [`StableId`]           |
//! | `Native` | `u64` process-local handle     |
//!
//! `Native` is only accepted when both sides allow it, which is the case for
//! an in-process duplicate and never for a stored asset.

use tessera_world::{AssetRef, ClassId, NativeHandle, ObjectId, Value};

use super::blob::{BlobReader, BlobWriter};
use crate::error::CodecError;
use crate::id::StableId;
use crate::interner::NONE_INDEX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefTag {
    None = 0,
    Asset = 1,
    Class = 2,
    Object = 3,
    Native = 4,
}

impl RefTag {
    pub fn from_u8(v: u8) -> Result<Self, CodecError> {
        Ok(match v {
            0 => Self::None,
            1 => Self::Asset,
            2 => Self::Class,
            3 => Self::Object,
            4 => Self::Native,
            other => return Err(CodecError::InvalidTag(other)),
        })
    }
}

/// Resolves live references to payload addresses while writing.
pub trait ReferenceWriter {
    /// The stable id `object` is written as, or `None` if it does not belong
    /// to the graph being written. The object need not have been written yet.
    fn object_id(&mut self, object: ObjectId) -> Option<StableId>;
    fn asset_index(&mut self, asset: &AssetRef) -> i32;
    fn class_index(&mut self, class: ClassId) -> i32;
    fn name_index(&mut self, name: &str) -> i32;
    fn allows_native(&self) -> bool {
        false
    }
}

/// Resolves payload addresses back to live references while reading.
pub trait ReferenceReader {
    fn object(&self, id: StableId) -> Option<ObjectId>;
    fn asset(&self, index: i32) -> Option<AssetRef>;
    fn class(&self, index: i32) -> Option<ClassId>;
    fn name(&self, index: i32) -> Option<&str>;
    fn allows_native(&self) -> bool {
        false
    }
}

/// Writes a reference-shaped value with its tag.
pub fn write_reference(
    value: &Value,
    refs: &mut dyn ReferenceWriter,
    out: &mut BlobWriter,
) -> Result<(), CodecError> {
    match value {
        Value::Object(Some(object)) => match refs.object_id(*object) {
            Some(id) => {
                out.put_u8(RefTag::Object as u8);
                out.put_id(id);
            }
            None => {
                log::trace!("{object} is outside the graph, written as none");
                out.put_u8(RefTag::None as u8);
            }
        },
        Value::Asset(Some(asset)) => {
            let index = refs.asset_index(asset);
            out.put_u8(RefTag::Asset as u8);
            out.put_i32(index);
        }
        Value::Class(Some(class)) => {
            let index = refs.class_index(*class);
            out.put_u8(RefTag::Class as u8);
            out.put_i32(index);
        }
        Value::Native(Some(handle)) if refs.allows_native() => {
            out.put_u8(RefTag::Native as u8);
            out.put_u64(handle.0);
        }
        Value::Native(Some(_)) => {
            log::debug!("native handle dropped from persistent payload");
            out.put_u8(RefTag::None as u8);
        }
        Value::Object(None) | Value::Asset(None) | Value::Class(None) | Value::Native(None) => {
            out.put_u8(RefTag::None as u8);
        }
        other => {
            return Err(CodecError::TypeMismatch {
                field: String::new(),
                found: other.type_name(),
            });
        }
    }
    Ok(())
}

/// Reads a tagged reference and shapes it after `template`, the field's
/// zero value.
///
/// Tags that do not fit the expected shape, and targets that cannot be
/// resolved, read as the empty reference.
pub fn read_reference(
    template: &Value,
    refs: &dyn ReferenceReader,
    input: &mut BlobReader<'_>,
) -> Result<Value, CodecError> {
    let tag = RefTag::from_u8(input.get_u8()?)?;
    let resolved = match tag {
        RefTag::None => None,
        RefTag::Object => {
            let id = input.get_id()?;
            let object = refs.object(id);
            if object.is_none() {
                log::debug!("reference to {id} did not resolve");
            }
            object.map(|o| Value::Object(Some(o)))
        }
        RefTag::Asset => {
            let index = input.get_i32()?;
            refs.asset(index).map(|a| Value::Asset(Some(a)))
        }
        RefTag::Class => {
            let index = input.get_i32()?;
            if index != NONE_INDEX && refs.class(index).is_none() {
                log::warn!("class index {index} does not resolve");
            }
            refs.class(index).map(|c| Value::Class(Some(c)))
        }
        RefTag::Native => {
            let handle = NativeHandle(input.get_u64()?);
            refs.allows_native().then_some(Value::Native(Some(handle)))
        }
    };
    Ok(match resolved {
        Some(value) if std::mem::discriminant(&value) == std::mem::discriminant(template) => value,
        _ => template.clone(),
    })
}
