//! Property copies between a sub-prefab instance and its source template.
//!
//! The two sides live in different id spaces (and, for templates, different
//! worlds). Object references are carried across through the stable ids both
//! sides share, so a reference to the third label of the source becomes a
//! reference to the third label of the instance.

use tessera_world::{ClassId, FieldCategory, FieldInfo, FieldKind, ObjectId, Value, World};

use crate::error::OverrideError;
use crate::id::StableId;
use crate::identity::IdentityMap;

/// One side of a copy: a world plus the ids its objects are known by.
pub(super) struct Side<'a, W> {
    pub world: W,
    pub ids: &'a mut IdentityMap,
}

pub(super) type Source<'a> = Side<'a, &'a World>;
pub(super) type Target<'a> = Side<'a, &'a mut World>;

/// Copies property `name` from `from` (in `src`) to `to` (in `dst`).
///
/// Writes the raw value; change notifications are the caller's job.
pub(super) fn copy_property(
    src: &mut Source<'_>,
    from: ObjectId,
    dst: &mut Target<'_>,
    to: ObjectId,
    name: &str,
) -> Result<(), OverrideError> {
    let Some(field) = dst.world.class_info(to).and_then(|c| c.find_field(name)).cloned() else {
        return Err(OverrideError::UnknownProperty {
            object: to,
            property: name.to_string(),
        });
    };
    let Some(value) = src.world.property(from, name).cloned() else {
        return Err(OverrideError::UnknownProperty {
            object: from,
            property: name.to_string(),
        });
    };
    let current = dst
        .world
        .property(to, name)
        .cloned()
        .unwrap_or_else(|| field.default_value());

    let copied = copy_value(src, dst, to, &field.kind, &value, &current)?;
    dst.world.write_property(to, name, copied)?;
    Ok(())
}

fn copy_value(
    src: &mut Source<'_>,
    dst: &mut Target<'_>,
    owner: ObjectId,
    kind: &FieldKind,
    value: &Value,
    current: &Value,
) -> Result<Value, OverrideError> {
    if !value.matches(kind) {
        log::warn!("source value is a {}, keeping the current one", value.type_name());
        return Ok(current.clone());
    }
    match (kind.category(), kind, value) {
        (FieldCategory::Scalar, ..) => Ok(value.clone()),
        (FieldCategory::Container, FieldKind::List(inner), Value::List(items)) => {
            let existing = current.as_list().unwrap_or_default();
            let mut copied = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let current = existing
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| inner.default_value());
                copied.push(copy_value(src, dst, owner, inner, item, &current)?);
            }
            Ok(Value::List(copied))
        }
        (FieldCategory::Struct, FieldKind::Struct(fields), Value::Struct(values)) => {
            copy_struct(src, dst, owner, fields, values, current)
        }
        (_, FieldKind::Object, Value::Object(target)) => Ok(Value::Object(target.and_then(|t| translate(src, dst, t)))),
        (_, FieldKind::Inline(class), Value::Object(target)) => match target {
            Some(inline) => copy_inline(src, dst, owner, *class, *inline, current).map(|o| Value::Object(Some(o))),
            None => Ok(Value::Object(None)),
        },
        // Assets, classes and native handles are shared, not owned.
        _ => Ok(value.clone()),
    }
}

fn copy_struct(
    src: &mut Source<'_>,
    dst: &mut Target<'_>,
    owner: ObjectId,
    fields: &[FieldInfo],
    values: &[(String, Value)],
    current: &Value,
) -> Result<Value, OverrideError> {
    let mut copied = Vec::with_capacity(fields.len());
    for (field, (_, value)) in fields.iter().zip(values) {
        let current = current
            .field(&field.name)
            .cloned()
            .unwrap_or_else(|| field.default_value());
        copied.push((field.name.clone(), copy_value(src, dst, owner, &field.kind, value, &current)?));
    }
    Ok(Value::Struct(copied))
}

/// The target-side counterpart of a source-side shared reference.
fn translate(src: &Source<'_>, dst: &Target<'_>, object: ObjectId) -> Option<ObjectId> {
    let id = src.ids.id_of(object);
    let translated = id.and_then(|id| dst.ids.object(id)).filter(|o| dst.world.is_alive(*o));
    if translated.is_none() {
        log::debug!("reference to {object} has no counterpart, clearing it");
    }
    translated
}

/// Copies an inline-owned object, creating the target-side object when the
/// target has none yet.
fn copy_inline(
    src: &mut Source<'_>,
    dst: &mut Target<'_>,
    owner: ObjectId,
    declared: ClassId,
    inline: ObjectId,
    current: &Value,
) -> Result<ObjectId, OverrideError> {
    let id = match src.ids.id_of(inline) {
        Some(id) => id,
        None => {
            let id = StableId::new();
            src.ids.insert(id, inline);
            id
        }
    };

    let reusable = current
        .as_object()
        .filter(|o| dst.world.is_alive(*o) && dst.world.owner(*o) == Some(owner));
    let target = match reusable {
        Some(target) => target,
        None => {
            let class = src.world.class_of(inline).unwrap_or(declared);
            let name = src.world.name(inline).unwrap_or_default().to_string();
            let created = dst.world.spawn(class, Some(owner), &name)?;
            log::debug!("constructed inline {created} from {inline}");
            created
        }
    };
    dst.ids.insert(id, target);

    let fields = src
        .world
        .class_info(inline)
        .map(|c| c.fields.clone())
        .unwrap_or_default();
    for field in &fields {
        if dst.world.class_info(target).and_then(|c| c.find_field(&field.name)).is_some() {
            copy_property(src, inline, dst, target, &field.name)?;
        }
    }
    Ok(target)
}
