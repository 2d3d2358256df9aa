//! Phase 1: create every object and register its id.

use tessera_world::{AssetRef, ClassId, ClassKind, ObjectId, World};

use super::{GraphLoad, GraphReader};
use crate::asset::PrefabAsset;
use crate::error::DeserializeError;
use crate::format::{decode_payload, PlanContainer, PlanLeaf, PlanObject, PlanSubGraph, PlanSubobject};
use crate::id::StableId;
use crate::identity::{IdentityMap, RemapTable};
use crate::state::SubPrefabInstance;

impl GraphReader<'_> {
    /// Creates the container tree and every record, returning the root.
    pub(super) fn generate(&mut self, world: &mut World, load: &mut GraphLoad<'_>) -> Result<ObjectId, DeserializeError> {
        let plan = load.plan;
        let root = self.generate_container(world, load, &plan.root)?;

        for record in &plan.components {
            self.generate_object(world, load, record, true);
        }
        for record in &plan.objects {
            self.generate_object(world, load, record, false);
        }
        load.link_root_components(world);
        Ok(root)
    }

    fn generate_container<'p>(
        &mut self,
        world: &mut World,
        load: &mut GraphLoad<'p>,
        record: &'p PlanContainer,
    ) -> Result<ObjectId, DeserializeError> {
        match record {
            PlanContainer::Leaf(leaf) => self.generate_leaf(world, load, leaf),
            PlanContainer::SubGraph(sub) => self.generate_sub_graph(world, load, sub),
        }
    }

    fn generate_leaf<'p>(
        &mut self,
        world: &mut World,
        load: &mut GraphLoad<'p>,
        leaf: &'p PlanLeaf,
    ) -> Result<ObjectId, DeserializeError> {
        let object = match load.reuse(world, leaf.id) {
            Some(object) => object,
            None => {
                let class = load.resolve_class(world, leaf.class, |kind| kind == ClassKind::Container, ClassKind::Container);
                let name = leaf.name.as_deref().unwrap_or_default();
                let object = world
                    .spawn_deferred(class, None, name)
                    .map_err(DeserializeError::Container)?;
                self.track(world, load, object);
                object
            }
        };
        world.set_flags(object, leaf.flags, true);
        load.ids.insert(leaf.id, object);
        load.match_subobjects(world, object, &leaf.subobjects);
        load.containers.push(object);
        if let Some(root_component) = leaf.root_component {
            load.root_links.push((object, root_component));
        }
        if !leaf.data.is_empty() {
            load.restores.push((object, leaf.data.as_slice()));
        }

        for child in &leaf.children {
            if let Err(err) = self.generate_container(world, load, child) {
                log::warn!("skipping child container {} of {object}: {err}", child.id());
            }
        }
        Ok(object)
    }

    fn generate_object<'p>(&mut self, world: &mut World, load: &mut GraphLoad<'p>, record: &'p PlanObject, component: bool) {
        // Default sub-objects were matched when their owner was generated.
        let object = match load.ids.object(record.id) {
            Some(object) => object,
            None => {
                let Some(owner) = load.ids.object(record.owner) else {
                    log::warn!("owner {} of {} is unknown, skipping", record.owner, record.id);
                    return;
                };
                match load.reuse(world, record.id) {
                    Some(object) => object,
                    None => {
                        let class = if component {
                            let fallback = if load.spatial.contains(&record.id) {
                                ClassKind::SpatialComponent
                            } else {
                                ClassKind::Component
                            };
                            load.resolve_class(world, record.class, ClassKind::is_component, fallback)
                        } else {
                            load.resolve_class(world, record.class, |kind| kind == ClassKind::Object, ClassKind::Object)
                        };
                        let name = record.name.as_deref().unwrap_or_default();
                        match world.spawn_deferred(class, Some(owner), name) {
                            Ok(object) => {
                                self.track(world, load, object);
                                object
                            }
                            Err(err) => {
                                log::warn!("failed to create {}: {err}", record.id);
                                return;
                            }
                        }
                    }
                }
            }
        };
        world.set_flags(object, record.flags, true);
        load.ids.insert(record.id, object);
        load.match_subobjects(world, object, &record.subobjects);
        if !record.data.is_empty() {
            load.restores.push((object, record.data.as_slice()));
        }
    }

    /// Loads an embedded sub-graph and merges its ids into `load`.
    fn generate_sub_graph<'p>(
        &mut self,
        world: &mut World,
        load: &mut GraphLoad<'p>,
        record: &'p PlanSubGraph,
    ) -> Result<ObjectId, DeserializeError> {
        let asset = load
            .asset(record.asset)
            .ok_or(DeserializeError::MissingAsset(record.asset))?;
        if self.asset_stack.contains(&asset) {
            log::error!("sub-prefab `{}` embeds itself, skipping", asset.path());
            return Err(DeserializeError::RecursiveSubPrefab(asset.path().to_string()));
        }

        let stored = {
            let prefab = asset
                .read::<PrefabAsset>()
                .ok_or_else(|| DeserializeError::NotAPrefab(asset.path().to_string()))?;
            prefab
                .best_variant(self.fidelity)
                .cloned()
                .ok_or_else(|| DeserializeError::MissingVariant(asset.path().to_string()))?
        };
        if stored.payload.is_empty() {
            return Err(DeserializeError::EmptyPayload);
        }
        let (version, plan) = decode_payload(&stored.payload)?;

        // Live objects the caller already has for this instance, in the
        // sub-graph's own id space.
        let mut existing = IdentityMap::new();
        for (parent_id, sub_id) in record.remap.iter() {
            if let Some(object) = load.existing.object(parent_id) {
                existing.insert(sub_id, object);
            }
        }

        self.asset_stack.push(asset.clone());
        let nested = self.read(world, &plan, &stored.assets, &existing, version);
        self.asset_stack.pop();
        let nested = nested?;

        let mut remap = RemapTable::new();
        for (sub_id, object) in nested.ids.iter() {
            let parent_id = if object == nested.root {
                record.id
            } else {
                record
                    .remap
                    .parent_of(sub_id)
                    .unwrap_or_else(|| StableId::derive(record.id, sub_id))
            };
            load.ids.insert(parent_id, object);
            remap.insert(parent_id, sub_id);
        }
        load.containers.extend(nested.containers);

        let root = nested.root;
        let mut instance = SubPrefabInstance::new(asset, root, nested.ids);
        instance.remap = remap;
        load.sub_prefabs.insert(root, instance);
        if !record.overrides.is_empty() {
            load.overrides.push((root, record.overrides.as_slice()));
        }
        log::trace!("embedded sub-prefab {} as {root}", record.id);
        Ok(root)
    }

    /// Registers a freshly spawned object and its default sub-objects with
    /// the session.
    fn track(&mut self, world: &mut World, load: &mut GraphLoad<'_>, object: ObjectId) {
        load.spawned.push(object);
        self.register(world, object);
    }

    fn register(&mut self, world: &mut World, object: ObjectId) {
        world.construction_mut().add(object, self.session);
        if world.kind_of(object).is_some_and(ClassKind::is_component) {
            self.post_load.push(object);
        }
        let subobjects: Vec<ObjectId> = world.default_subobjects(object).iter().map(|(_, o)| *o).collect();
        for sub in subobjects {
            self.register(world, sub);
        }
    }
}

impl GraphLoad<'_> {
    fn reuse(&self, world: &World, id: StableId) -> Option<ObjectId> {
        self.existing.object(id).filter(|o| world.is_alive(*o))
    }

    fn asset(&self, index: i32) -> Option<AssetRef> {
        super::slot(self.assets, index).cloned()
    }

    /// The class a record asks for, or the built-in base of `fallback` if it
    /// is unknown or no longer of an accepted kind.
    fn resolve_class(&self, world: &World, index: i32, accepts: fn(ClassKind) -> bool, fallback: ClassKind) -> ClassId {
        let name = super::slot(&self.plan.classes, index).map(String::as_str).unwrap_or("<none>");
        match super::slot(&self.classes, index).copied().flatten() {
            Some(class) if world.classes().get(class).is_some_and(|info| accepts(info.kind)) => class,
            Some(_) => {
                log::warn!("class `{name}` changed kind, using base {fallback:?}");
                fallback.fallback()
            }
            None => {
                log::warn!("unknown class `{name}`, using base {fallback:?}");
                fallback.fallback()
            }
        }
    }

    /// Matches stored default sub-objects to the ones the runtime created.
    fn match_subobjects(&mut self, world: &World, object: ObjectId, stored: &[PlanSubobject]) {
        let actual = world.default_subobjects(object);
        for (position, sub) in stored.iter().enumerate() {
            if sub.id.is_nil() {
                continue;
            }
            let found = match &sub.name {
                Some(name) => actual.iter().find(|(n, _)| n == name),
                None => actual.get(position),
            };
            match found {
                Some((_, sub_object)) => self.ids.insert(sub.id, *sub_object),
                None => log::warn!(
                    "{object} has no default sub-object {}, skipping {}",
                    sub.name.as_deref().unwrap_or("at that position"),
                    sub.id
                ),
            }
        }
    }

    fn link_root_components(&mut self, world: &mut World) {
        for (container, id) in std::mem::take(&mut self.root_links) {
            let Some(component) = self.ids.object(id) else {
                log::warn!("root component {id} of {container} was not created");
                continue;
            };
            if world.root_component(container) == Some(component) {
                continue;
            }
            if let Err(err) = world.set_root_component(container, component) {
                log::warn!("cannot make {component} the root of {container}: {err}");
            }
        }
    }
}
