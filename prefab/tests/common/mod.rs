//! Shared fixtures: a small UI class set and a structural graph dump.

#![allow(dead_code)]

use std::sync::Arc;

use tessera_world::hierarchy::{attach, attach_parent, child_containers, parent_container};
use tessera_world::{
    ClassId, ClassInfo, ClassKind, ClassRegistry, FieldFlags, FieldInfo, FieldKind, ObjectId, Value,
    World,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mark_constructed(world: &mut World, object: ObjectId) {
    let _ = world.write_property(object, "constructed", Value::Bool(true));
}

fn mark_awake(world: &mut World, object: ObjectId) {
    let _ = world.write_property(object, "awake", Value::Bool(true));
}

pub struct Ui {
    pub classes: Arc<ClassRegistry>,
    pub panel: ClassId,
    pub frame: ClassId,
    pub label: ClassId,
    pub style: ClassId,
    pub node: ClassId,
}

pub fn ui() -> Ui {
    let mut classes = ClassRegistry::new();
    let style = classes
        .register(
            ClassInfo::object("Style")
                .field(FieldInfo::new("size", FieldKind::Float))
                .field(FieldInfo::new("tags", FieldKind::List(Box::new(FieldKind::String)))),
        )
        .unwrap();
    let node = classes
        .register(
            ClassInfo::object("Node")
                .field(FieldInfo::new("value", FieldKind::Int))
                .field(FieldInfo::new("peer", FieldKind::Object)),
        )
        .unwrap();
    let frame = classes
        .register(
            ClassInfo::spatial_component("Frame")
                .field(FieldInfo::new("title", FieldKind::String))
                .field(FieldInfo::new("target", FieldKind::Object))
                .field(FieldInfo::new("constructed", FieldKind::Bool).transient())
                .field(FieldInfo::new("awake", FieldKind::Bool).transient())
                .on_construct(mark_constructed)
                .on_awake(mark_awake),
        )
        .unwrap();
    let label = classes
        .register(
            ClassInfo::component("Label")
                .field(FieldInfo::new("text", FieldKind::String))
                .field(FieldInfo::new("next", FieldKind::Object))
                .field(FieldInfo::new("font", FieldKind::Asset))
                .field(FieldInfo::new("style", FieldKind::Inline(style)))
                .field(FieldInfo::new(
                    "margin",
                    FieldKind::Struct(vec![
                        FieldInfo::new("left", FieldKind::Int),
                        FieldInfo::new("right", FieldKind::Int),
                    ]),
                ))
                .field(FieldInfo::new("handle", FieldKind::Native))
                .field(FieldInfo::new("secret", FieldKind::String).editor_only()),
        )
        .unwrap();
    let panel = classes
        .register(ClassInfo::container("Panel").default_subobject("Frame", frame))
        .unwrap();
    Ui {
        classes: Arc::new(classes),
        panel,
        frame,
        label,
        style,
        node,
    }
}

impl Ui {
    pub fn world(&self) -> World {
        World::new(Arc::clone(&self.classes))
    }

    /// A top-level panel.
    pub fn panel(&self, world: &mut World, name: &str) -> ObjectId {
        world.spawn(self.panel, None, name).unwrap()
    }

    /// A panel attached under `parent`.
    pub fn child_panel(&self, world: &mut World, parent: ObjectId, name: &str) -> ObjectId {
        let panel = self.panel(world, name);
        let (child, parent) = (frame(world, panel), frame(world, parent));
        attach(world, child, parent).unwrap();
        panel
    }

    pub fn label(&self, world: &mut World, panel: ObjectId, name: &str, text: &str) -> ObjectId {
        let label = world.spawn(self.label, Some(panel), name).unwrap();
        world.write_property(label, "text", Value::from(text)).unwrap();
        label
    }

    /// An inline style owned by `label`.
    pub fn style(&self, world: &mut World, label: ObjectId, size: f32) -> ObjectId {
        let style = world.spawn(self.style, Some(label), "Style").unwrap();
        world.write_property(style, "size", Value::F32(size)).unwrap();
        world.write_property(label, "style", Value::Object(Some(style))).unwrap();
        style
    }
}

pub fn frame(world: &World, panel: ObjectId) -> ObjectId {
    world.root_component(panel).unwrap()
}

/// The component or object named `name` owned (directly) by `owner`.
pub fn find(world: &World, owner: ObjectId, name: &str) -> ObjectId {
    world
        .owned(owner)
        .iter()
        .copied()
        .find(|&o| world.name(o) == Some(name))
        .unwrap_or_else(|| panic!("{owner} owns nothing named `{name}`"))
}

pub fn text(world: &World, object: ObjectId, property: &str) -> String {
    world
        .property(object, property)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Path of an object built from display names: `Root/Child.Label.Style`.
pub fn path(world: &World, object: ObjectId) -> String {
    let name = world.name(object).unwrap_or_default();
    let parent = match world.kind_of(object) {
        Some(ClassKind::Container) => parent_container(world, object).map(|p| (p, '/')),
        _ => world.owner(object).map(|o| (o, '.')),
    };
    match parent {
        Some((parent, sep)) => format!("{}{sep}{name}", path(world, parent)),
        None => name.to_string(),
    }
}

/// One sorted line per object of the container tree under `root`, with
/// references rendered as paths.
pub fn describe(world: &World, root: ObjectId) -> Vec<String> {
    let mut lines = Vec::new();
    let mut containers = vec![root];
    while let Some(container) = containers.pop() {
        describe_object(world, container, &mut lines);
        containers.extend(child_containers(world, container));
    }
    lines.sort();
    lines
}

fn describe_object(world: &World, object: ObjectId, lines: &mut Vec<String>) {
    let info = world.class_info(object).unwrap();
    let mut line = format!("{} {}", path(world, object), info.name);
    if let Some(parent) = attach_parent(world, object) {
        line.push_str(&format!(" parent={}", path(world, parent)));
    }
    for (field, value) in info.fields.iter().zip(world.properties(object)) {
        if field.flags.contains(FieldFlags::TRANSIENT) {
            continue;
        }
        line.push_str(&format!(" {}={}", field.name, render(world, value)));
    }
    lines.push(line);
    for &owned in world.owned(object) {
        describe_object(world, owned, lines);
    }
}

fn render(world: &World, value: &Value) -> String {
    match value {
        Value::Object(Some(object)) => format!("@{}", path(world, *object)),
        Value::Asset(Some(asset)) => format!("asset:{}", asset.path()),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|v| render(world, v)).collect();
            format!("[{}]", items.join(","))
        }
        Value::Struct(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(name, v)| format!("{name}:{}", render(world, v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        other => format!("{other:?}"),
    }
}
