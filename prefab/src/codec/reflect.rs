use std::sync::Arc;

use tessera_world::{FieldFlags, FieldInfo, FieldKind, ObjectId, Value, World, WorldError};

use super::blob::{BlobReader, BlobWriter};
use super::tag::{read_reference, write_reference, ReferenceReader, ReferenceWriter};
use super::{Fidelity, PropertyCodec, PropertyScope};
use crate::error::CodecError;

/// Schema-driven codec built on the class registry.
///
/// # Layout
///
/// Full fidelity writes a field count followed by one entry per field:
///
/// ```text
/// i32 name index | u8 kind code | u32 length | payload
/// ```
///
/// so readers can skip fields that were renamed, removed or re-typed since
/// the blob was written. Compact fidelity writes bare payloads in schema
/// order and omits editor-only fields.
///
/// Transient fields are never written.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectCodec;

impl PropertyCodec for ReflectCodec {
    fn write(
        &self,
        world: &World,
        object: ObjectId,
        scope: &PropertyScope,
        refs: &mut dyn ReferenceWriter,
        out: &mut BlobWriter,
    ) -> Result<(), CodecError> {
        let info = world
            .class_info(object)
            .ok_or(WorldError::DeadObject(object))?;
        let values = world.properties(object);
        let fields = info
            .fields
            .iter()
            .zip(values)
            .filter(|(field, _)| scope.filter.includes(&field.name));
        match scope.fidelity {
            Fidelity::Full => write_named(fields, refs, out),
            Fidelity::Compact => write_positional(fields, refs, out),
        }
    }

    fn read(
        &self,
        world: &mut World,
        object: ObjectId,
        scope: &PropertyScope,
        refs: &dyn ReferenceReader,
        data: &[u8],
    ) -> Result<(), CodecError> {
        let classes = Arc::clone(world.classes());
        let class = world
            .class_of(object)
            .ok_or(WorldError::DeadObject(object))?;
        let info = classes.get(class).ok_or(WorldError::UnknownClass(class))?;
        let mut input = BlobReader::new(data);

        match scope.fidelity {
            Fidelity::Full => {
                let count = input.get_u32()?;
                for _ in 0..count {
                    let entry = read_entry(&mut input)?;
                    let Some(name) = refs.name(entry.name) else {
                        log::warn!("{object}: field name index {} does not resolve", entry.name);
                        continue;
                    };
                    if !scope.filter.includes(name) {
                        continue;
                    }
                    let Some(field) = info.find_field(name) else {
                        log::debug!("{object}: skipping unknown field `{name}`");
                        continue;
                    };
                    if field.flags.contains(FieldFlags::TRANSIENT) {
                        continue;
                    }
                    if entry.kind != kind_code(&field.kind) {
                        log::warn!("{object}: field `{name}` changed kind, keeping current value");
                        continue;
                    }
                    let current = world
                        .property(object, name)
                        .cloned()
                        .unwrap_or_else(|| field.default_value());
                    let mut payload = BlobReader::new(entry.payload);
                    match read_value(&field.kind, &current, Fidelity::Full, refs, &mut payload) {
                        Ok(value) => world.write_property(object, name, value)?,
                        Err(err) => log::warn!("{object}: field `{name}` unreadable: {err}"),
                    }
                }
            }
            Fidelity::Compact => {
                for field in persistent_fields(&info.fields, Fidelity::Compact) {
                    if !scope.filter.includes(&field.name) {
                        continue;
                    }
                    let value = read_value(
                        &field.kind,
                        &field.default_value(),
                        Fidelity::Compact,
                        refs,
                        &mut input,
                    )?;
                    world.write_property(object, &field.name, value)?;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Field sets
// ---------------------------------------------------------------------------

struct Entry<'a> {
    name: i32,
    kind: u8,
    payload: &'a [u8],
}

fn read_entry<'a>(input: &mut BlobReader<'a>) -> Result<Entry<'a>, CodecError> {
    let name = input.get_i32()?;
    let kind = input.get_u8()?;
    let len = input.get_u32()? as usize;
    let payload = input.take(len)?;
    Ok(Entry {
        name,
        kind,
        payload,
    })
}

fn persistent_fields(fields: &[FieldInfo], fidelity: Fidelity) -> impl Iterator<Item = &FieldInfo> {
    fields.iter().filter(move |f| {
        !f.flags.contains(FieldFlags::TRANSIENT)
            && !(fidelity == Fidelity::Compact && f.flags.contains(FieldFlags::EDITOR_ONLY))
    })
}

fn write_named<'a>(
    fields: impl Iterator<Item = (&'a FieldInfo, &'a Value)>,
    refs: &mut dyn ReferenceWriter,
    out: &mut BlobWriter,
) -> Result<(), CodecError> {
    let fields: Vec<_> = fields
        .filter(|(f, _)| !f.flags.contains(FieldFlags::TRANSIENT))
        .collect();
    out.put_u32(fields.len() as u32);
    for (field, value) in fields {
        let mut payload = BlobWriter::new();
        write_value(&field.kind, &field.name, value, Fidelity::Full, refs, &mut payload)?;
        let len =
            u32::try_from(payload.len()).map_err(|_| CodecError::TooLarge(field.name.clone()))?;
        out.put_i32(refs.name_index(&field.name));
        out.put_u8(kind_code(&field.kind));
        out.put_u32(len);
        out.put_bytes(&payload.into_vec());
    }
    Ok(())
}

fn write_positional<'a>(
    fields: impl Iterator<Item = (&'a FieldInfo, &'a Value)>,
    refs: &mut dyn ReferenceWriter,
    out: &mut BlobWriter,
) -> Result<(), CodecError> {
    for (field, value) in fields {
        if field.flags.intersects(FieldFlags::TRANSIENT | FieldFlags::EDITOR_ONLY) {
            continue;
        }
        write_value(&field.kind, &field.name, value, Fidelity::Compact, refs, out)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

fn kind_code(kind: &FieldKind) -> u8 {
    match kind {
        FieldKind::Bool => 1,
        FieldKind::Int => 2,
        FieldKind::UInt => 3,
        FieldKind::Float => 4,
        FieldKind::Double => 5,
        FieldKind::String => 6,
        FieldKind::List(_) => 7,
        FieldKind::Struct(_) => 8,
        FieldKind::Object => 9,
        FieldKind::Inline(_) => 10,
        FieldKind::Asset => 11,
        FieldKind::Class => 12,
        FieldKind::Native => 13,
    }
}

fn write_value(
    kind: &FieldKind,
    name: &str,
    value: &Value,
    fidelity: Fidelity,
    refs: &mut dyn ReferenceWriter,
    out: &mut BlobWriter,
) -> Result<(), CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        field: name.to_string(),
        found: value.type_name(),
    };
    match (kind, value) {
        (FieldKind::Bool, Value::Bool(v)) => out.put_u8(u8::from(*v)),
        (FieldKind::Int, Value::I64(v)) => out.put_i64(*v),
        (FieldKind::UInt, Value::U64(v)) => out.put_u64(*v),
        (FieldKind::Float, Value::F32(v)) => out.put_f32(*v),
        (FieldKind::Double, Value::F64(v)) => out.put_f64(*v),
        (FieldKind::String, Value::String(v)) => out.put_str(v)?,
        (FieldKind::List(inner), Value::List(items)) => {
            out.put_u32(items.len() as u32);
            for item in items {
                write_value(inner, name, item, fidelity, refs, out)?;
            }
        }
        (FieldKind::Struct(fields), Value::Struct(values)) => {
            if values.len() != fields.len() {
                return Err(mismatch());
            }
            let pairs = fields.iter().zip(values.iter().map(|(_, v)| v));
            match fidelity {
                Fidelity::Full => write_named(pairs, refs, out)?,
                Fidelity::Compact => write_positional(pairs, refs, out)?,
            }
        }
        (
            FieldKind::Object | FieldKind::Inline(_),
            Value::Object(_),
        )
        | (FieldKind::Asset, Value::Asset(_))
        | (FieldKind::Class, Value::Class(_))
        | (FieldKind::Native, Value::Native(_)) => write_reference(value, refs, out)?,
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Reads one value of `kind`. `template` supplies the starting point for
/// structs read with full fidelity, so fields absent from the blob keep it.
fn read_value(
    kind: &FieldKind,
    template: &Value,
    fidelity: Fidelity,
    refs: &dyn ReferenceReader,
    input: &mut BlobReader<'_>,
) -> Result<Value, CodecError> {
    Ok(match kind {
        FieldKind::Bool => Value::Bool(input.get_u8()? != 0),
        FieldKind::Int => Value::I64(input.get_i64()?),
        FieldKind::UInt => Value::U64(input.get_u64()?),
        FieldKind::Float => Value::F32(input.get_f32()?),
        FieldKind::Double => Value::F64(input.get_f64()?),
        FieldKind::String => Value::String(input.get_str()?),
        FieldKind::List(inner) => {
            let count = input.get_u32()? as usize;
            let element = inner.default_value();
            let mut items = Vec::with_capacity(count.min(input.remaining()));
            for _ in 0..count {
                items.push(read_value(inner, &element, fidelity, refs, input)?);
            }
            Value::List(items)
        }
        FieldKind::Struct(fields) => read_struct(fields, template, fidelity, refs, input)?,
        FieldKind::Object | FieldKind::Inline(_) | FieldKind::Asset | FieldKind::Class | FieldKind::Native => {
            read_reference(&kind.default_value(), refs, input)?
        }
    })
}

fn read_struct(
    fields: &[FieldInfo],
    template: &Value,
    fidelity: Fidelity,
    refs: &dyn ReferenceReader,
    input: &mut BlobReader<'_>,
) -> Result<Value, CodecError> {
    let mut values: Vec<(String, Value)> = fields
        .iter()
        .map(|f| {
            let start = template.field(&f.name).cloned().unwrap_or_else(|| f.default_value());
            (f.name.clone(), start)
        })
        .collect();

    match fidelity {
        Fidelity::Full => {
            let count = input.get_u32()?;
            for _ in 0..count {
                let entry = read_entry(input)?;
                let Some(name) = refs.name(entry.name) else {
                    continue;
                };
                let Some(index) = fields.iter().position(|f| f.name == name) else {
                    log::debug!("skipping unknown struct field `{name}`");
                    continue;
                };
                let field = &fields[index];
                if field.flags.contains(FieldFlags::TRANSIENT) || entry.kind != kind_code(&field.kind) {
                    continue;
                }
                let mut payload = BlobReader::new(entry.payload);
                match read_value(&field.kind, &values[index].1, fidelity, refs, &mut payload) {
                    Ok(value) => values[index].1 = value,
                    Err(err) => log::warn!("struct field `{name}` unreadable: {err}"),
                }
            }
        }
        Fidelity::Compact => {
            for (index, field) in fields.iter().enumerate() {
                if field.flags.intersects(FieldFlags::TRANSIENT | FieldFlags::EDITOR_ONLY) {
                    continue;
                }
                let start = field.default_value();
                values[index].1 = read_value(&field.kind, &start, fidelity, refs, input)?;
            }
        }
    }
    Ok(Value::Struct(values))
}
