//! Live graph to [`GraphPlan`].
//!
//! Saving runs in two passes over the container tree rooted at the saved
//! container:
//!
//! 1. **Register**: every container gets a stable id and its owned objects
//!    are collected. Embedded sub-prefab containers are not descended into;
//!    instead every object of the instance is registered as a host under a
//!    parent-space id, so references into the instance can be written and
//!    objects created under it locally (say, a fresh inline value set by an
//!    override) are written as ordinary records owned by it.
//! 2. **Write**: container records are emitted depth-first, then every
//!    collected object is written in collection order. Writing a blob may
//!    collect more objects, which are appended and written in turn.
//!
//! Children are visited sorted by display name so that reloading the graph
//! recreates it in the same order.

use std::collections::HashMap;

use tessera_world::hierarchy::{attach_parent, child_containers};
use tessera_world::{AssetRef, ClassId, ClassKind, ClassRegistry, ObjectFlags, ObjectId, World};

use crate::codec::{BlobWriter, Fidelity, PropertyCodec, PropertyScope, ReferenceWriter};
use crate::collect::Collector;
use crate::error::SerializeError;
use crate::format::{
    GraphPlan, PlanContainer, PlanLeaf, PlanObject, PlanOverride, PlanSubGraph, PlanSubobject,
};
use crate::id::StableId;
use crate::identity::{IdentityMap, RemapTable};
use crate::interner::{ReferenceTable, NONE_INDEX};
use crate::state::{PrefabState, SubPrefabInstance};

/// A serialized graph before encoding.
pub(crate) struct WrittenGraph {
    pub plan: GraphPlan,
    pub assets: Vec<AssetRef>,
    /// Session ids of every addressable object.
    pub ids: IdentityMap,
}

pub(crate) struct GraphWriter<'a> {
    world: &'a World,
    codec: &'a dyn PropertyCodec,
    state: &'a PrefabState,
    fidelity: Fidelity,
    allow_native: bool,
    collector: Collector<'a>,
    table: ReferenceTable,
    remaps: HashMap<ObjectId, RemapTable>,
    spatial_parents: Vec<(StableId, StableId)>,
}

impl<'a> GraphWriter<'a> {
    pub fn new(
        world: &'a World,
        codec: &'a dyn PropertyCodec,
        state: &'a PrefabState,
        fidelity: Fidelity,
    ) -> Self {
        Self {
            world,
            codec,
            state,
            fidelity,
            allow_native: false,
            collector: Collector::new(world, &state.ids, fidelity),
            table: ReferenceTable::new(),
            remaps: HashMap::new(),
            spatial_parents: Vec::new(),
        }
    }

    /// Permits native handles in blobs. Only for in-process copies.
    pub fn allow_native(mut self, allow: bool) -> Self {
        self.allow_native = allow;
        self
    }

    pub fn write(mut self, root: ObjectId) -> Result<WrittenGraph, SerializeError> {
        if self.world.kind_of(root) != Some(ClassKind::Container) {
            return Err(SerializeError::InvalidRoot(root));
        }

        self.register_container(root, true);
        let root_record = self
            .write_container(root)?
            .ok_or(SerializeError::InvalidRoot(root))?;

        let mut components = Vec::new();
        let mut objects = Vec::new();
        let mut index = 0;
        while index < self.collector.order().len() {
            let object = self.collector.order()[index];
            index += 1;
            let record = self.write_object(object)?;
            if self.world.kind_of(object).is_some_and(ClassKind::is_component) {
                components.push(record);
            } else {
                objects.push(record);
            }
        }
        log::debug!(
            "serialized {} components and {} objects ({:?})",
            components.len(),
            objects.len(),
            self.fidelity
        );

        let plan = GraphPlan {
            fidelity: self.fidelity,
            classes: self.table.classes.into_vec(),
            names: self.table.names.into_vec(),
            root: root_record,
            components,
            objects,
            spatial_parents: self.spatial_parents,
        };
        Ok(WrittenGraph {
            plan,
            assets: self.table.assets.into_vec(),
            ids: self.collector.into_ids(),
        })
    }

    // ---- Pass 1: register ----

    fn register_container(&mut self, container: ObjectId, is_root: bool) {
        let state = self.state;
        if let Some(instance) = state.sub_prefabs.get(&container) {
            let root_sub_id = instance.ids.id_of(container);
            let preferred = state
                .ids
                .id_of(container)
                .or_else(|| root_sub_id.and_then(|sub| instance.remap.parent_of(sub)));
            let record_id = self.collector.add_host(container, preferred);

            let mut remap = RemapTable::new();
            for (sub_id, object) in instance.ids.iter() {
                if !self.world.is_alive(object) {
                    continue;
                }
                let parent_id = if object == container {
                    record_id
                } else {
                    let preferred = state
                        .ids
                        .id_of(object)
                        .or_else(|| instance.remap.parent_of(sub_id))
                        .unwrap_or_else(|| StableId::derive(record_id, sub_id));
                    self.collector.add_host(object, Some(preferred))
                };
                remap.insert(parent_id, sub_id);
            }
            self.remaps.insert(container, remap);
            return;
        }

        let flags = self.world.flags(container);
        let skipped = flags.contains(ObjectFlags::TRANSIENT)
            || (self.fidelity == Fidelity::Compact && flags.contains(ObjectFlags::EDITOR_ONLY));
        if skipped && !is_root {
            log::trace!("skipping container {container}");
            return;
        }

        self.collector.add_container(container);
        for &owned in self.world.owned(container) {
            self.collector.collect(owned);
        }
        for child in sorted_children(self.world, container) {
            self.register_container(child, false);
        }
    }

    // ---- Pass 2: write ----

    fn write_container(&mut self, container: ObjectId) -> Result<Option<PlanContainer>, SerializeError> {
        let state = self.state;
        if let Some(instance) = state.sub_prefabs.get(&container) {
            return self.write_sub_graph(container, instance).map(Some);
        }
        if !self.collector.belongs(container) {
            return Ok(None);
        }
        let Some(id) = self.collector.id_of(container) else {
            return Ok(None);
        };

        let data = self.write_blob(container, PropertyScope::object(self.fidelity, false))?;
        let mut children = Vec::new();
        for child in sorted_children(self.world, container) {
            if let Some(record) = self.write_container(child)? {
                children.push(record);
            }
        }

        Ok(Some(PlanContainer::Leaf(PlanLeaf {
            class: self.class_index(container),
            id,
            name: self.world.name(container).map(str::to_string),
            flags: self.world.flags(container).persistent(),
            root_component: self
                .world
                .root_component(container)
                .and_then(|c| self.collector.id_of(c)),
            subobjects: self.subobjects(container),
            data,
            children,
        })))
    }

    fn write_sub_graph(
        &mut self,
        container: ObjectId,
        instance: &'a SubPrefabInstance,
    ) -> Result<PlanContainer, SerializeError> {
        let id = self
            .collector
            .id_of(container)
            .ok_or(SerializeError::InvalidRoot(container))?;

        let mut overrides = Vec::new();
        for (object, names) in instance.overrides.iter() {
            let Some(target) = instance.ids.id_of(object) else {
                continue;
            };
            if !self.world.is_alive(object) || names.is_empty() {
                continue;
            }
            let names: Vec<String> = names.iter().cloned().collect();
            let data = self.write_blob(object, PropertyScope::only(names.iter().cloned()))?;
            overrides.push(PlanOverride {
                target,
                names,
                data,
            });
        }

        if let Some(root_component) = self.world.root_component(container)
            && let Some(parent) = attach_parent(self.world, root_component)
            && let (Some(child_id), Some(parent_id)) =
                (self.collector.id_of(root_component), self.collector.id_of(parent))
        {
            self.spatial_parents.push((child_id, parent_id));
        }

        Ok(PlanContainer::SubGraph(PlanSubGraph {
            asset: self.table.assets.find_or_add(&instance.asset),
            id,
            remap: self.remaps.remove(&container).unwrap_or_default(),
            overrides,
        }))
    }

    fn write_object(&mut self, object: ObjectId) -> Result<PlanObject, SerializeError> {
        let spatial = self.world.kind_of(object) == Some(ClassKind::SpatialComponent);
        let data = self.write_blob(object, PropertyScope::object(self.fidelity, spatial))?;

        // Owned objects belong to the graph even if no property names them.
        for &owned in self.world.owned(object) {
            self.collector.collect(owned);
        }

        let id = self
            .collector
            .id_of(object)
            .ok_or(SerializeError::InvalidRoot(object))?;
        let owner = self
            .world
            .owner(object)
            .and_then(|o| self.collector.id_of(o))
            .unwrap_or(StableId::NIL);

        if spatial
            && let Some(parent) = attach_parent(self.world, object)
            && let Some(parent_id) = self.collector.id_of(parent)
        {
            self.spatial_parents.push((id, parent_id));
        }

        Ok(PlanObject {
            class: self.class_index(object),
            id,
            name: self.world.name(object).map(str::to_string),
            flags: self.world.flags(object).persistent(),
            owner,
            subobjects: self.subobjects(object),
            data,
        })
    }

    fn write_blob(&mut self, object: ObjectId, scope: PropertyScope) -> Result<Vec<u8>, SerializeError> {
        let mut out = BlobWriter::new();
        let mut refs = WriteRefs {
            collector: &mut self.collector,
            table: &mut self.table,
            classes: self.world.classes(),
            allow_native: self.allow_native,
        };
        self.codec
            .write(self.world, object, &scope, &mut refs, &mut out)
            .map_err(|source| SerializeError::Codec { object, source })?;
        Ok(out.into_vec())
    }

    /// Default sub-objects in creation order. One that is not written keeps
    /// its slot under the nil id so positional matching stays aligned.
    fn subobjects(&self, object: ObjectId) -> Vec<PlanSubobject> {
        self.world
            .default_subobjects(object)
            .iter()
            .map(|(name, sub)| PlanSubobject {
                id: self.collector.id_of(*sub).unwrap_or(StableId::NIL),
                name: Some(name.clone()),
            })
            .collect()
    }

    fn class_index(&mut self, object: ObjectId) -> i32 {
        let classes = self.world.classes();
        match self.world.class_of(object).and_then(|c| classes.name_of(c)) {
            Some(name) => self.table.classes.find_or_add(&name.to_string()),
            None => NONE_INDEX,
        }
    }
}

/// Child containers of `container`, by display name.
pub(crate) fn sorted_children(world: &World, container: ObjectId) -> Vec<ObjectId> {
    let mut children = child_containers(world, container);
    children.sort_by(|a, b| world.name(*a).cmp(&world.name(*b)));
    children
}

struct WriteRefs<'s, 'a> {
    collector: &'s mut Collector<'a>,
    table: &'s mut ReferenceTable,
    classes: &'s ClassRegistry,
    allow_native: bool,
}

impl ReferenceWriter for WriteRefs<'_, '_> {
    fn object_id(&mut self, object: ObjectId) -> Option<StableId> {
        self.collector.collect(object)
    }

    fn asset_index(&mut self, asset: &AssetRef) -> i32 {
        self.table.assets.find_or_add(asset)
    }

    fn class_index(&mut self, class: ClassId) -> i32 {
        match self.classes.name_of(class) {
            Some(name) => self.table.classes.find_or_add(&name.to_string()),
            None => NONE_INDEX,
        }
    }

    fn name_index(&mut self, name: &str) -> i32 {
        self.table.names.find_or_add(&name.to_string())
    }

    fn allows_native(&self) -> bool {
        self.allow_native
    }
}
