//! Class schema: the closed reflection model objects are built from.
//!
//! Every object is an instance of a [`ClassInfo`] registered in a
//! [`ClassRegistry`]. A class declares its [`ClassKind`], an ordered list of
//! reflected fields, the default sub-objects the runtime creates along with
//! each instance, and a handful of lifecycle hooks.
//!
//! Field shapes form a closed set ([`FieldKind`]) grouped into four
//! [`FieldCategory`] values. Serializers and property copiers dispatch on the
//! category instead of introspecting arbitrary types.
//!
//! # Example
//!
//! ```
//! use tessera_world::{ClassInfo, ClassRegistry, FieldInfo, FieldKind};
//!
//! let mut classes = ClassRegistry::new();
//! let node = classes
//!     .register(ClassInfo::spatial_component("Node").field(FieldInfo::new("x", FieldKind::Float)))
//!     .unwrap();
//! let panel = classes
//!     .register(ClassInfo::container("Panel").default_subobject("Root", node))
//!     .unwrap();
//! assert_eq!(classes.find("Panel"), Some(panel));
//! ```

use std::collections::HashMap;

use bitflags::bitflags;

use crate::error::WorldError;
use crate::object::ObjectId;
use crate::value::Value;
use crate::world::World;

/// Index of a class inside its [`ClassRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Built-in base for plain owned objects.
    pub const BASE_OBJECT: Self = Self(0);
    /// Built-in base for containers.
    pub const BASE_CONTAINER: Self = Self(1);
    /// Built-in base for non-spatial components.
    pub const BASE_COMPONENT: Self = Self(2);
    /// Built-in base for spatial components.
    pub const BASE_SPATIAL: Self = Self(3);
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// What role instances of a class play in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// A plain sub-object owned by another object.
    Object,
    /// A node of the attachment hierarchy. Owns components; has no owner.
    Container,
    /// A behavior node owned by a container.
    Component,
    /// A component that takes part in the spatial attachment hierarchy.
    SpatialComponent,
}

impl ClassKind {
    pub fn is_component(self) -> bool {
        matches!(self, Self::Component | Self::SpatialComponent)
    }

    /// The built-in class used when a class of this kind cannot be resolved.
    pub fn fallback(self) -> ClassId {
        match self {
            Self::Object => ClassId::BASE_OBJECT,
            Self::Container => ClassId::BASE_CONTAINER,
            Self::Component => ClassId::BASE_COMPONENT,
            Self::SpatialComponent => ClassId::BASE_SPATIAL,
        }
    }
}

/// The four shape categories every [`FieldKind`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Scalar,
    Reference,
    Container,
    Struct,
}

/// The shape of one reflected field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    String,
    /// Homogeneous list of the inner kind.
    List(Box<FieldKind>),
    /// Nested struct with its own ordered fields.
    Struct(Vec<FieldInfo>),
    /// Identity-shared reference to another object.
    Object,
    /// Reference to an object owned by the referencing object. Can be
    /// constructed fresh as an instance of the given class when missing.
    Inline(ClassId),
    /// Reference to an external asset.
    Asset,
    /// Reference to a class.
    Class,
    /// Opaque process-local handle.
    Native,
}

impl FieldKind {
    pub fn category(&self) -> FieldCategory {
        match self {
            Self::Bool | Self::Int | Self::UInt | Self::Float | Self::Double | Self::String => {
                FieldCategory::Scalar
            }
            Self::Object | Self::Inline(_) | Self::Asset | Self::Class | Self::Native => {
                FieldCategory::Reference
            }
            Self::List(_) => FieldCategory::Container,
            Self::Struct(_) => FieldCategory::Struct,
        }
    }

    /// The zero value of this kind.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::I64(0),
            Self::UInt => Value::U64(0),
            Self::Float => Value::F32(0.0),
            Self::Double => Value::F64(0.0),
            Self::String => Value::String(String::new()),
            Self::List(_) => Value::List(Vec::new()),
            Self::Struct(fields) => Value::Struct(
                fields
                    .iter()
                    .map(|f| (f.name.clone(), f.default_value()))
                    .collect(),
            ),
            Self::Object | Self::Inline(_) => Value::Object(None),
            Self::Asset => Value::Asset(None),
            Self::Class => Value::Class(None),
            Self::Native => Value::Native(None),
        }
    }
}

bitflags! {
    /// Per-field serialization flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u32 {
        /// Runtime-only state, never serialized.
        const TRANSIENT = 1 << 0;
        /// Tooling data stripped from compact payloads.
        const EDITOR_ONLY = 1 << 1;
    }
}

/// One reflected field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub kind: FieldKind,
    pub flags: FieldFlags,
    pub default: Option<Value>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: FieldFlags::empty(),
            default: None,
        }
    }

    /// Overrides the zero value new instances start with.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.flags |= FieldFlags::TRANSIENT;
        self
    }

    pub fn editor_only(mut self) -> Self {
        self.flags |= FieldFlags::EDITOR_ONLY;
        self
    }

    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.default_value())
    }
}

/// An object the runtime creates automatically with every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultSubobject {
    pub name: String,
    pub class: ClassId,
}

/// A hook run against a single object.
pub type ObjectHook = fn(&mut World, ObjectId);
/// A hook run after a named property changed.
pub type PropertyHook = fn(&mut World, ObjectId, &str);
/// A hook run when active-in-hierarchy state is (re)evaluated.
pub type ActiveHook = fn(&mut World, ObjectId, bool);

/// Lifecycle hooks of a class. All optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassHooks {
    /// Construction logic, run once the object is fully constructed.
    pub on_construct: Option<ObjectHook>,
    /// Post-construction side effects after a load links the graph.
    pub on_post_load: Option<ObjectHook>,
    /// The object is allowed to start running.
    pub on_awake: Option<ObjectHook>,
    pub on_pre_property_change: Option<PropertyHook>,
    pub on_property_changed: Option<PropertyHook>,
    pub on_active_changed: Option<ActiveHook>,
}

/// Schema of one class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ClassKind,
    pub fields: Vec<FieldInfo>,
    pub default_subobjects: Vec<DefaultSubobject>,
    pub hooks: ClassHooks,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            default_subobjects: Vec::new(),
            hooks: ClassHooks::default(),
        }
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Object)
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Container)
    }

    pub fn component(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Component)
    }

    pub fn spatial_component(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::SpatialComponent)
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn default_subobject(mut self, name: impl Into<String>, class: ClassId) -> Self {
        self.default_subobjects.push(DefaultSubobject {
            name: name.into(),
            class,
        });
        self
    }

    pub fn on_construct(mut self, hook: ObjectHook) -> Self {
        self.hooks.on_construct = Some(hook);
        self
    }

    pub fn on_post_load(mut self, hook: ObjectHook) -> Self {
        self.hooks.on_post_load = Some(hook);
        self
    }

    pub fn on_awake(mut self, hook: ObjectHook) -> Self {
        self.hooks.on_awake = Some(hook);
        self
    }

    pub fn on_pre_property_change(mut self, hook: PropertyHook) -> Self {
        self.hooks.on_pre_property_change = Some(hook);
        self
    }

    pub fn on_property_changed(mut self, hook: PropertyHook) -> Self {
        self.hooks.on_property_changed = Some(hook);
        self
    }

    pub fn on_active_changed(mut self, hook: ActiveHook) -> Self {
        self.hooks.on_active_changed = Some(hook);
        self
    }

    /// Position of the named field in [`fields`](Self::fields).
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Append-only registry of classes, shared by every world built from it.
///
/// The four built-in base classes occupy the first slots (see
/// [`ClassId::BASE_OBJECT`] and friends).
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    lookup: HashMap<String, ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            classes: Vec::new(),
            lookup: HashMap::new(),
        };
        for info in [
            ClassInfo::object("Object"),
            ClassInfo::container("Container"),
            ClassInfo::component("Component"),
            ClassInfo::spatial_component("SpatialComponent"),
        ] {
            let id = ClassId(registry.classes.len() as u32);
            registry.lookup.insert(info.name.clone(), id);
            registry.classes.push(info);
        }
        registry
    }

    /// Registers a class and returns its id.
    ///
    /// Fails if the name is taken or a default sub-object names an unknown
    /// class or a container class.
    pub fn register(&mut self, info: ClassInfo) -> Result<ClassId, WorldError> {
        if self.lookup.contains_key(&info.name) {
            return Err(WorldError::DuplicateClass(info.name));
        }
        for sub in &info.default_subobjects {
            match self.get(sub.class) {
                None => return Err(WorldError::UnknownClass(sub.class)),
                Some(class) if class.kind == ClassKind::Container => {
                    return Err(WorldError::InvalidSubobject {
                        class: info.name.clone(),
                        subobject: sub.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        let id = ClassId(self.classes.len() as u32);
        self.lookup.insert(info.name.clone(), id);
        self.classes.push(info);
        Ok(id)
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.lookup.get(name).copied()
    }

    pub fn name_of(&self, id: ClassId) -> Option<&str> {
        self.get(id).map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether only the built-in base classes are registered.
    pub fn is_empty(&self) -> bool {
        self.classes.len() <= 4
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_bases_are_registered() {
        let classes = ClassRegistry::new();
        assert_eq!(classes.find("Container"), Some(ClassId::BASE_CONTAINER));
        assert_eq!(classes.get(ClassId::BASE_SPATIAL).unwrap().kind, ClassKind::SpatialComponent);
        assert!(classes.is_empty());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut classes = ClassRegistry::new();
        classes.register(ClassInfo::object("Style")).unwrap();
        assert!(matches!(
            classes.register(ClassInfo::object("Style")),
            Err(WorldError::DuplicateClass(_))
        ));
    }

    #[test]
    fn container_subobject_rejected() {
        let mut classes = ClassRegistry::new();
        let result = classes.register(
            ClassInfo::container("Panel").default_subobject("Inner", ClassId::BASE_CONTAINER),
        );
        assert!(matches!(result, Err(WorldError::InvalidSubobject { .. })));
    }

    #[test]
    fn unknown_subobject_class_rejected() {
        let mut classes = ClassRegistry::new();
        let result = classes.register(ClassInfo::container("Panel").default_subobject("Root", ClassId(99)));
        assert!(matches!(result, Err(WorldError::UnknownClass(ClassId(99)))));
    }

    #[test]
    fn field_defaults() {
        let field = FieldInfo::new("size", FieldKind::Float).with_default(2.5f32);
        assert_eq!(field.default_value(), Value::F32(2.5));
        let nested = FieldKind::Struct(vec![FieldInfo::new("on", FieldKind::Bool)]);
        assert_eq!(
            nested.default_value(),
            Value::Struct(vec![("on".to_string(), Value::Bool(false))])
        );
    }

    #[test]
    fn categories() {
        assert_eq!(FieldKind::String.category(), FieldCategory::Scalar);
        assert_eq!(FieldKind::Inline(ClassId::BASE_OBJECT).category(), FieldCategory::Reference);
        assert_eq!(FieldKind::List(Box::new(FieldKind::Int)).category(), FieldCategory::Container);
        assert_eq!(FieldKind::Struct(Vec::new()).category(), FieldCategory::Struct);
    }
}
