use std::sync::Arc;

use crate::class::{ClassId, ClassInfo, ClassKind, ClassRegistry};
use crate::construction::ConstructionRegistry;
use crate::error::WorldError;
use crate::object::{ObjectAllocator, ObjectFlags, ObjectId};
use crate::value::Value;

/// A property edit made through [`World::set_property`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub object: ObjectId,
    pub property: String,
}

/// Storage for one live object.
pub(crate) struct ObjectData {
    pub(crate) class: ClassId,
    pub(crate) name: String,
    pub(crate) flags: ObjectFlags,
    /// Non-owning back-reference to the owner.
    pub(crate) owner: Option<ObjectId>,
    /// Objects this object owns, destroyed along with it.
    pub(crate) owned: Vec<ObjectId>,
    /// One value per class field, in declaration order.
    pub(crate) properties: Vec<Value>,
    pub(crate) default_subobjects: Vec<(String, ObjectId)>,
    pub(crate) constructed: bool,
    pub(crate) root_component: Option<ObjectId>,
    pub(crate) attach_parent: Option<ObjectId>,
    pub(crate) attach_children: Vec<ObjectId>,
    pub(crate) active_self: bool,
    pub(crate) active_in_hierarchy: bool,
}

/// An arena of live objects built from one shared [`ClassRegistry`].
///
/// Objects form two hierarchies:
///
/// - **Ownership**: every non-container object may have an owner. Despawning
///   an object despawns everything it owns.
/// - **Attachment**: spatial components attach to other spatial components,
///   see [`hierarchy`](crate::hierarchy).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tessera_world::{ClassInfo, ClassRegistry, FieldInfo, FieldKind, Value, World};
///
/// let mut classes = ClassRegistry::new();
/// let label = classes
///     .register(ClassInfo::component("Label").field(FieldInfo::new("text", FieldKind::String)))
///     .unwrap();
/// let panel = classes.register(ClassInfo::container("Panel")).unwrap();
///
/// let mut world = World::new(Arc::new(classes));
/// let root = world.spawn(panel, None, "Main").unwrap();
/// let text = world.spawn(label, Some(root), "Title").unwrap();
/// world.set_property(text, "text", Value::from("hello")).unwrap();
/// assert_eq!(world.property(text, "text"), Some(&Value::from("hello")));
/// ```
pub struct World {
    classes: Arc<ClassRegistry>,
    allocator: ObjectAllocator,
    objects: Vec<Option<ObjectData>>,
    changes: Vec<PropertyChange>,
    construction: ConstructionRegistry,
}

impl World {
    pub fn new(classes: Arc<ClassRegistry>) -> Self {
        Self {
            classes,
            allocator: ObjectAllocator::new(),
            objects: Vec::new(),
            changes: Vec::new(),
            construction: ConstructionRegistry::new(),
        }
    }

    pub fn classes(&self) -> &Arc<ClassRegistry> {
        &self.classes
    }

    // ---- Object lifetime ----

    /// Spawns and fully constructs an object of `class`.
    ///
    /// Default sub-objects declared by the class are spawned with it.
    pub fn spawn(
        &mut self,
        class: ClassId,
        owner: Option<ObjectId>,
        name: &str,
    ) -> Result<ObjectId, WorldError> {
        let object = self.spawn_deferred(class, owner, name)?;
        self.finish_construction(object);
        Ok(object)
    }

    /// Spawns an object without running its construction logic.
    ///
    /// Properties hold their defaults and may be written freely; call
    /// [`finish_construction`](Self::finish_construction) afterwards.
    pub fn spawn_deferred(
        &mut self,
        class: ClassId,
        owner: Option<ObjectId>,
        name: &str,
    ) -> Result<ObjectId, WorldError> {
        let classes = Arc::clone(&self.classes);
        let info = classes.get(class).ok_or(WorldError::UnknownClass(class))?;
        self.check_owner(info, owner, name)?;

        let object = self.allocator.allocate();
        let slot = object.index() as usize;
        if self.objects.len() <= slot {
            self.objects.resize_with(slot + 1, || None);
        }
        self.objects[slot] = Some(ObjectData {
            class,
            name: name.to_string(),
            flags: ObjectFlags::empty(),
            owner,
            owned: Vec::new(),
            properties: info.fields.iter().map(|f| f.default_value()).collect(),
            default_subobjects: Vec::new(),
            constructed: false,
            root_component: None,
            attach_parent: None,
            attach_children: Vec::new(),
            active_self: true,
            active_in_hierarchy: true,
        });
        if let Some(owner) = owner
            && let Some(data) = self.data_mut(owner)
        {
            data.owned.push(object);
        }

        for sub in &info.default_subobjects {
            let sub_object = match self.spawn_deferred(sub.class, Some(object), &sub.name) {
                Ok(sub_object) => sub_object,
                Err(err) => {
                    self.despawn(object);
                    return Err(err);
                }
            };
            let spatial = classes
                .get(sub.class)
                .is_some_and(|c| c.kind == ClassKind::SpatialComponent);
            if let Some(data) = self.data_mut(sub_object) {
                data.flags |= ObjectFlags::DEFAULT_SUBOBJECT;
            }
            if let Some(data) = self.data_mut(object) {
                data.default_subobjects.push((sub.name.clone(), sub_object));
                if spatial && info.kind == ClassKind::Container && data.root_component.is_none() {
                    data.root_component = Some(sub_object);
                }
            }
        }
        Ok(object)
    }

    fn check_owner(
        &self,
        info: &ClassInfo,
        owner: Option<ObjectId>,
        name: &str,
    ) -> Result<(), WorldError> {
        if let Some(owner) = owner
            && !self.is_alive(owner)
        {
            return Err(WorldError::DeadObject(owner));
        }
        let owner_kind = owner.and_then(|o| self.kind_of(o));
        let reason = match (info.kind, owner_kind) {
            (ClassKind::Container, Some(_)) => "containers cannot be owned",
            (kind, Some(ClassKind::Container)) if kind.is_component() => return Ok(()),
            (kind, _) if kind.is_component() => "components need a container owner",
            _ => return Ok(()),
        };
        Err(WorldError::InvalidOwner {
            object: name.to_string(),
            reason,
        })
    }

    /// Runs construction logic for a deferred object and its default
    /// sub-objects. Sub-objects construct first.
    ///
    /// Returns `false` if the object is dead or already constructed.
    pub fn finish_construction(&mut self, object: ObjectId) -> bool {
        let Some(data) = self.data_mut(object) else {
            return false;
        };
        if data.constructed {
            return false;
        }
        data.constructed = true;
        let subobjects: Vec<ObjectId> = data.default_subobjects.iter().map(|(_, o)| *o).collect();
        for sub in subobjects {
            self.finish_construction(sub);
        }
        if let Some(hook) = self.class_info(object).and_then(|c| c.hooks.on_construct) {
            hook(self, object);
        }
        true
    }

    pub fn is_constructed(&self, object: ObjectId) -> bool {
        self.data(object).is_some_and(|d| d.constructed)
    }

    /// Despawns an object together with everything it owns.
    ///
    /// Attachment links to and from the destroyed objects are cut. Returns
    /// `false` if the object was already dead.
    pub fn despawn(&mut self, object: ObjectId) -> bool {
        let Some(data) = self.data(object) else {
            return false;
        };
        let owner = data.owner;
        let owned = data.owned.clone();
        for child in owned {
            self.despawn(child);
        }

        crate::hierarchy::detach(self, object);
        let children = self
            .data(object)
            .map(|d| d.attach_children.clone())
            .unwrap_or_default();
        for child in children {
            crate::hierarchy::detach(self, child);
        }

        if let Some(owner) = owner
            && let Some(owner_data) = self.data_mut(owner)
        {
            owner_data.owned.retain(|&o| o != object);
            owner_data.default_subobjects.retain(|(_, o)| *o != object);
            if owner_data.root_component == Some(object) {
                owner_data.root_component = None;
            }
        }
        self.construction.remove(object);
        self.objects[object.index() as usize] = None;
        self.allocator.deallocate(object)
    }

    pub fn is_alive(&self, object: ObjectId) -> bool {
        self.allocator.is_alive(object)
    }

    pub fn object_count(&self) -> u32 {
        self.allocator.count()
    }

    /// Iterates over all live objects in slot order.
    pub fn iter_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.allocator.iter_alive()
    }

    // ---- Identity and ownership ----

    pub fn class_of(&self, object: ObjectId) -> Option<ClassId> {
        self.data(object).map(|d| d.class)
    }

    pub fn class_info(&self, object: ObjectId) -> Option<&ClassInfo> {
        self.data(object).and_then(|d| self.classes.get(d.class))
    }

    pub fn kind_of(&self, object: ObjectId) -> Option<ClassKind> {
        self.class_info(object).map(|c| c.kind)
    }

    pub fn name(&self, object: ObjectId) -> Option<&str> {
        self.data(object).map(|d| d.name.as_str())
    }

    pub fn set_name(&mut self, object: ObjectId, name: &str) {
        if let Some(data) = self.data_mut(object) {
            data.name = name.to_string();
        }
    }

    pub fn flags(&self, object: ObjectId) -> ObjectFlags {
        self.data(object).map(|d| d.flags).unwrap_or_default()
    }

    pub fn set_flags(&mut self, object: ObjectId, flags: ObjectFlags, value: bool) {
        if let Some(data) = self.data_mut(object) {
            data.flags.set(flags, value);
        }
    }

    pub fn owner(&self, object: ObjectId) -> Option<ObjectId> {
        self.data(object).and_then(|d| d.owner)
    }

    /// Objects owned by `object`, in creation order.
    pub fn owned(&self, object: ObjectId) -> &[ObjectId] {
        self.data(object).map(|d| d.owned.as_slice()).unwrap_or(&[])
    }

    /// Walks the owner chain up to the nearest container (inclusive).
    pub fn container_of(&self, object: ObjectId) -> Option<ObjectId> {
        let mut current = Some(object);
        while let Some(candidate) = current {
            if self.kind_of(candidate) == Some(ClassKind::Container) {
                return Some(candidate);
            }
            current = self.owner(candidate);
        }
        None
    }

    /// Components owned by `container`, in creation order.
    pub fn components(&self, container: ObjectId) -> Vec<ObjectId> {
        self.owned(container)
            .iter()
            .copied()
            .filter(|&o| self.kind_of(o).is_some_and(ClassKind::is_component))
            .collect()
    }

    pub fn root_component(&self, container: ObjectId) -> Option<ObjectId> {
        self.data(container).and_then(|d| d.root_component)
    }

    /// Makes `component` the primary spatial node of `container`.
    pub fn set_root_component(
        &mut self,
        container: ObjectId,
        component: ObjectId,
    ) -> Result<(), WorldError> {
        if self.kind_of(container) != Some(ClassKind::Container) {
            return Err(WorldError::NotContainer(container));
        }
        if self.kind_of(component) != Some(ClassKind::SpatialComponent) {
            return Err(WorldError::NotSpatial(component));
        }
        if self.owner(component) != Some(container) {
            return Err(WorldError::InvalidOwner {
                object: self.name(component).unwrap_or_default().to_string(),
                reason: "root component must be owned by its container",
            });
        }
        if let Some(data) = self.data_mut(container) {
            data.root_component = Some(component);
        }
        Ok(())
    }

    /// Default sub-objects of `object` as `(name, object)` pairs, in class order.
    pub fn default_subobjects(&self, object: ObjectId) -> &[(String, ObjectId)] {
        self.data(object)
            .map(|d| d.default_subobjects.as_slice())
            .unwrap_or(&[])
    }

    pub fn find_default_subobject(&self, object: ObjectId, name: &str) -> Option<ObjectId> {
        self.default_subobjects(object)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| *o)
    }

    // ---- Properties ----

    pub fn property(&self, object: ObjectId, name: &str) -> Option<&Value> {
        let data = self.data(object)?;
        let index = self.classes.get(data.class)?.field_index(name)?;
        data.properties.get(index)
    }

    /// All property values of `object`, aligned with its class fields.
    pub fn properties(&self, object: ObjectId) -> &[Value] {
        self.data(object)
            .map(|d| d.properties.as_slice())
            .unwrap_or(&[])
    }

    /// Edits a property the way a user would: fires before/after change
    /// notifications and appends to the change log.
    pub fn set_property(
        &mut self,
        object: ObjectId,
        name: &str,
        value: Value,
    ) -> Result<(), WorldError> {
        let index = self.checked_field(object, name, &value)?;
        self.notify_pre_change(object, name);
        if let Some(data) = self.data_mut(object) {
            data.properties[index] = value;
        }
        self.notify_post_change(object, name);
        self.changes.push(PropertyChange {
            object,
            property: name.to_string(),
        });
        Ok(())
    }

    /// Writes a property without notifications or change tracking.
    pub fn write_property(
        &mut self,
        object: ObjectId,
        name: &str,
        value: Value,
    ) -> Result<(), WorldError> {
        let index = self.checked_field(object, name, &value)?;
        if let Some(data) = self.data_mut(object) {
            data.properties[index] = value;
        }
        Ok(())
    }

    fn checked_field(&self, object: ObjectId, name: &str, value: &Value) -> Result<usize, WorldError> {
        let info = self
            .class_info(object)
            .ok_or(WorldError::DeadObject(object))?;
        let index = info
            .field_index(name)
            .ok_or_else(|| WorldError::UnknownProperty {
                class: info.name.clone(),
                property: name.to_string(),
            })?;
        let kind = &info.fields[index].kind;
        if !value.matches(kind) {
            return Err(WorldError::TypeMismatch {
                property: name.to_string(),
                expected: kind.clone(),
                found: value.type_name(),
            });
        }
        Ok(index)
    }

    /// Runs the class's pre-change hook for `name`.
    pub fn notify_pre_change(&mut self, object: ObjectId, name: &str) {
        if let Some(hook) = self
            .class_info(object)
            .and_then(|c| c.hooks.on_pre_property_change)
        {
            hook(self, object, name);
        }
    }

    /// Runs the class's post-change hook for `name`.
    pub fn notify_post_change(&mut self, object: ObjectId, name: &str) {
        if let Some(hook) = self
            .class_info(object)
            .and_then(|c| c.hooks.on_property_changed)
        {
            hook(self, object, name);
        }
    }

    /// Takes every change recorded by [`set_property`](Self::set_property)
    /// since the last drain.
    pub fn drain_changes(&mut self) -> Vec<PropertyChange> {
        std::mem::take(&mut self.changes)
    }

    // ---- Lifecycle ----

    /// Runs post-load side effects for `object`.
    pub fn run_post_load(&mut self, object: ObjectId) {
        if let Some(hook) = self.class_info(object).and_then(|c| c.hooks.on_post_load) {
            hook(self, object);
        }
    }

    /// Signals that `object` may start running.
    pub fn awake(&mut self, object: ObjectId) {
        if let Some(hook) = self.class_info(object).and_then(|c| c.hooks.on_awake) {
            hook(self, object);
        }
    }

    pub fn construction(&self) -> &ConstructionRegistry {
        &self.construction
    }

    pub fn construction_mut(&mut self) -> &mut ConstructionRegistry {
        &mut self.construction
    }

    // ---- Internal access ----

    pub(crate) fn data(&self, object: ObjectId) -> Option<&ObjectData> {
        if !self.allocator.is_alive(object) {
            return None;
        }
        self.objects.get(object.index() as usize)?.as_ref()
    }

    pub(crate) fn data_mut(&mut self, object: ObjectId) -> Option<&mut ObjectData> {
        if !self.allocator.is_alive(object) {
            return None;
        }
        self.objects.get_mut(object.index() as usize)?.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{FieldInfo, FieldKind};

    struct Fixture {
        world: World,
        panel: ClassId,
        node: ClassId,
        label: ClassId,
        style: ClassId,
    }

    fn mark_constructed(world: &mut World, object: ObjectId) {
        let text = world
            .property(object, "text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        world
            .write_property(object, "seen", Value::String(text))
            .unwrap();
    }

    fn fixture() -> Fixture {
        let mut classes = ClassRegistry::new();
        let node = classes
            .register(ClassInfo::spatial_component("Node").field(FieldInfo::new("x", FieldKind::Float)))
            .unwrap();
        let label = classes
            .register(
                ClassInfo::component("Label")
                    .field(FieldInfo::new("text", FieldKind::String))
                    .field(FieldInfo::new("seen", FieldKind::String).transient())
                    .on_construct(mark_constructed),
            )
            .unwrap();
        let style = classes
            .register(ClassInfo::object("Style").field(FieldInfo::new("size", FieldKind::Int).with_default(12i64)))
            .unwrap();
        let panel = classes
            .register(ClassInfo::container("Panel").default_subobject("Root", node))
            .unwrap();
        Fixture {
            world: World::new(Arc::new(classes)),
            panel,
            node,
            label,
            style,
        }
    }

    #[test]
    fn spawn_creates_default_subobjects() {
        let mut f = fixture();
        let panel = f.world.spawn(f.panel, None, "Main").unwrap();
        let root = f.world.find_default_subobject(panel, "Root").unwrap();
        assert_eq!(f.world.root_component(panel), Some(root));
        assert_eq!(f.world.owner(root), Some(panel));
        assert!(f.world.flags(root).contains(ObjectFlags::DEFAULT_SUBOBJECT));
        assert_eq!(f.world.class_of(root), Some(f.node));
    }

    #[test]
    fn components_need_container_owner() {
        let mut f = fixture();
        assert!(matches!(
            f.world.spawn(f.label, None, "Loose"),
            Err(WorldError::InvalidOwner { .. })
        ));
        let panel = f.world.spawn(f.panel, None, "Main").unwrap();
        let style = f.world.spawn(f.style, Some(panel), "Style").unwrap();
        assert!(f.world.spawn(f.label, Some(style), "Nested").is_err());
    }

    #[test]
    fn deferred_construction_sees_written_properties() {
        let mut f = fixture();
        let panel = f.world.spawn(f.panel, None, "Main").unwrap();
        let label = f.world.spawn_deferred(f.label, Some(panel), "Title").unwrap();
        f.world
            .write_property(label, "text", Value::from("restored"))
            .unwrap();
        assert!(!f.world.is_constructed(label));
        assert!(f.world.finish_construction(label));
        assert!(!f.world.finish_construction(label));
        assert_eq!(f.world.property(label, "seen"), Some(&Value::from("restored")));
    }

    #[test]
    fn property_defaults_and_type_checks() {
        let mut f = fixture();
        let style = f.world.spawn(f.style, None, "Style").unwrap();
        assert_eq!(f.world.property(style, "size"), Some(&Value::I64(12)));
        assert!(matches!(
            f.world.set_property(style, "size", Value::Bool(true)),
            Err(WorldError::TypeMismatch { .. })
        ));
        assert!(matches!(
            f.world.set_property(style, "missing", Value::I64(1)),
            Err(WorldError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn set_property_records_change_write_property_does_not() {
        let mut f = fixture();
        let style = f.world.spawn(f.style, None, "Style").unwrap();
        f.world.write_property(style, "size", Value::I64(3)).unwrap();
        assert!(f.world.drain_changes().is_empty());
        f.world.set_property(style, "size", Value::I64(4)).unwrap();
        assert_eq!(
            f.world.drain_changes(),
            vec![PropertyChange {
                object: style,
                property: "size".into()
            }]
        );
        assert!(f.world.drain_changes().is_empty());
    }

    #[test]
    fn despawn_destroys_owned_hierarchy() {
        let mut f = fixture();
        let panel = f.world.spawn(f.panel, None, "Main").unwrap();
        let label = f.world.spawn(f.label, Some(panel), "Title").unwrap();
        let style = f.world.spawn(f.style, Some(label), "Style").unwrap();
        let root = f.world.root_component(panel).unwrap();

        assert!(f.world.despawn(panel));
        for object in [panel, label, style, root] {
            assert!(!f.world.is_alive(object));
        }
        assert_eq!(f.world.object_count(), 0);
        assert!(!f.world.despawn(panel));
    }

    #[test]
    fn despawn_child_updates_owner() {
        let mut f = fixture();
        let panel = f.world.spawn(f.panel, None, "Main").unwrap();
        let label = f.world.spawn(f.label, Some(panel), "Title").unwrap();
        assert_eq!(f.world.components(panel).len(), 2);
        f.world.despawn(label);
        assert_eq!(f.world.components(panel).len(), 1);
    }

    #[test]
    fn container_of_walks_owner_chain() {
        let mut f = fixture();
        let panel = f.world.spawn(f.panel, None, "Main").unwrap();
        let label = f.world.spawn(f.label, Some(panel), "Title").unwrap();
        let style = f.world.spawn(f.style, Some(label), "Style").unwrap();
        assert_eq!(f.world.container_of(style), Some(panel));
        let loose = f.world.spawn(f.style, None, "Loose").unwrap();
        assert_eq!(f.world.container_of(loose), None);
    }
}
