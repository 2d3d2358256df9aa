//! Per-graph bookkeeping kept between saves and loads.

use indexmap::IndexMap;
use tessera_world::{AssetRef, ObjectId, World};

use crate::id::StableId;
use crate::identity::{IdentityMap, RemapTable};
use crate::overrides::OverrideTable;

/// An embedded copy of another prefab living inside a graph.
#[derive(Debug, Clone)]
pub struct SubPrefabInstance {
    /// The source prefab.
    pub asset: AssetRef,
    /// The embedded root container.
    pub root: ObjectId,
    /// Objects of the instance keyed by the source prefab's own ids.
    pub ids: IdentityMap,
    /// Parent-space ids assigned to the instance's objects.
    pub remap: RemapTable,
    pub overrides: OverrideTable,
}

impl SubPrefabInstance {
    pub fn new(asset: AssetRef, root: ObjectId, ids: IdentityMap) -> Self {
        Self {
            asset,
            root,
            ids,
            remap: RemapTable::new(),
            overrides: OverrideTable::new(),
        }
    }

    /// Whether `object` belongs to this instance.
    pub fn contains(&self, object: ObjectId) -> bool {
        self.ids.contains_object(object)
    }
}

/// What a graph remembers about itself between operations: the stable ids
/// of its objects and the sub-prefab instances embedded in it.
///
/// Returned by a load and consumed by the next save, so re-saving keeps
/// every id stable.
#[derive(Debug, Clone, Default)]
pub struct PrefabState {
    pub ids: IdentityMap,
    /// Instances keyed by their embedded root container.
    pub sub_prefabs: IndexMap<ObjectId, SubPrefabInstance>,
}

impl PrefabState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root of the sub-prefab instance `object` lives in, if any.
    pub fn instance_of(&self, object: ObjectId) -> Option<ObjectId> {
        self.sub_prefabs
            .iter()
            .find(|(_, instance)| instance.contains(object))
            .map(|(root, _)| *root)
    }

    pub fn instance(&self, root: ObjectId) -> Option<&SubPrefabInstance> {
        self.sub_prefabs.get(&root)
    }

    pub fn instance_mut(&mut self, root: ObjectId) -> Option<&mut SubPrefabInstance> {
        self.sub_prefabs.get_mut(&root)
    }

    /// Turns the instance rooted at `root` into plain objects of this graph
    /// and returns it. Its overrides are dropped; the local values stay.
    ///
    /// Each object keeps the id this graph addresses it by, so references
    /// saved before the unlink still resolve and the next save writes the
    /// objects as ordinary records under those ids.
    pub fn unlink_sub_prefab(&mut self, root: ObjectId) -> Option<SubPrefabInstance> {
        let instance = self.sub_prefabs.shift_remove(&root)?;
        let root_id = match self.ids.id_of(root) {
            Some(id) => id,
            None => {
                let id = instance
                    .ids
                    .id_of(root)
                    .and_then(|sub| instance.remap.parent_of(sub))
                    .unwrap_or_else(StableId::new);
                self.ids.insert(id, root);
                id
            }
        };
        for (sub_id, object) in instance.ids.iter() {
            if self.ids.contains_object(object) {
                continue;
            }
            let id = instance
                .remap
                .parent_of(sub_id)
                .unwrap_or_else(|| StableId::derive(root_id, sub_id));
            self.ids.insert(id, object);
        }
        log::debug!("unlinked sub-prefab `{}` at {root}", instance.asset.path());
        Some(instance)
    }

    /// Forgets dead objects, instances whose root died, and overrides on
    /// objects that no longer exist.
    pub fn prune(&mut self, world: &World) {
        self.ids.retain_alive(world);
        self.sub_prefabs.retain(|root, _| world.is_alive(*root));
        for instance in self.sub_prefabs.values_mut() {
            instance.ids.retain_alive(world);
            instance.overrides.prune(world);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera_world::{ClassInfo, ClassRegistry, FieldInfo, FieldKind, Value};

    use super::*;
    use crate::asset::PrefabAsset;
    use crate::codec::{Fidelity, ReflectCodec};
    use crate::engine::PrefabEngine;
    use crate::format::PlanContainer;
    use crate::serializer::GraphWriter;

    /// A `Host` panel embedding one instance of a saved `Card` panel.
    fn embedded() -> (World, ObjectId, PrefabState, ObjectId) {
        let mut classes = ClassRegistry::new();
        let frame = classes
            .register(ClassInfo::spatial_component("Frame").field(FieldInfo::new("title", FieldKind::String)))
            .unwrap();
        let panel = classes
            .register(ClassInfo::container("Panel").default_subobject("Frame", frame))
            .unwrap();
        let classes = Arc::new(classes);
        let engine = PrefabEngine::new();

        let mut source = World::new(Arc::clone(&classes));
        let card = source.spawn(panel, None, "Card").unwrap();
        let card_frame = source.root_component(card).unwrap();
        source.write_property(card_frame, "title", Value::from("card")).unwrap();
        let asset = PrefabAsset::new_ref("ui/card.prefab");
        engine.save(&source, card, &asset, &mut PrefabState::new()).unwrap();

        let mut world = World::new(classes);
        let host = world.spawn(panel, None, "Host").unwrap();
        let mut state = PrefabState::new();
        let instance = engine
            .instantiate_sub_prefab(&mut world, &mut state, &asset, host)
            .unwrap();
        (world, host, state, instance)
    }

    fn child_records(world: &World, host: ObjectId, state: &PrefabState) -> Vec<PlanContainer> {
        let written = GraphWriter::new(world, &ReflectCodec, state, Fidelity::Full)
            .write(host)
            .unwrap();
        match written.plan.root {
            PlanContainer::Leaf(leaf) => leaf.children,
            PlanContainer::SubGraph(_) => panic!("host written as a sub-graph"),
        }
    }

    #[test]
    fn unlinked_instances_are_written_as_leaves() {
        let (world, host, mut state, instance) = embedded();
        let engine = PrefabEngine::new();
        engine
            .save(&world, host, &PrefabAsset::new_ref("ui/host.prefab"), &mut state)
            .unwrap();
        let frame = world.root_component(instance).unwrap();
        let (root_id, frame_id) = (state.ids.id_of(instance).unwrap(), state.ids.id_of(frame).unwrap());
        assert!(matches!(
            child_records(&world, host, &state).as_slice(),
            [PlanContainer::SubGraph(_)]
        ));

        let unlinked = state.unlink_sub_prefab(instance).unwrap();
        assert_eq!(unlinked.asset.path(), "ui/card.prefab");
        assert!(state.sub_prefabs.is_empty());
        assert!(state.unlink_sub_prefab(instance).is_none());

        let records = child_records(&world, host, &state);
        let [PlanContainer::Leaf(leaf)] = records.as_slice() else {
            panic!("expected one leaf record");
        };
        assert_eq!(leaf.id, root_id);
        assert_eq!(leaf.root_component, Some(frame_id));
    }

    #[test]
    fn unlinking_before_any_save_derives_ids_from_the_root() {
        let (world, _, mut state, instance) = embedded();
        let frame = world.root_component(instance).unwrap();

        let unlinked = state.unlink_sub_prefab(instance).unwrap();
        let root_id = state.ids.id_of(instance).unwrap();
        let sub_id = unlinked.ids.id_of(frame).unwrap();
        assert_eq!(state.ids.id_of(frame), Some(StableId::derive(root_id, sub_id)));
        assert_eq!(state.ids.len(), unlinked.ids.len());
    }
}
