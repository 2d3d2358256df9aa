//! Revert and apply against live source templates.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_world::{AssetRef, ClassRegistry, ObjectId, World};

use super::copy::{copy_property, Side};
use crate::asset::PrefabAsset;
use crate::codec::Fidelity;
use crate::engine::{LoadOptions, PrefabEngine};
use crate::error::{DeserializeError, OverrideError};
use crate::state::{PrefabState, SubPrefabInstance};

// ---------------------------------------------------------------------------
// TemplateCache
// ---------------------------------------------------------------------------

/// A source prefab loaded into its own scratch world.
struct Template {
    world: World,
    root: ObjectId,
    state: PrefabState,
    /// Asset revision the template was loaded from.
    revision: u64,
}

/// Live copies of source prefabs, one per asset.
///
/// A template is reloaded whenever its asset's revision moves past the one
/// it was loaded from.
#[derive(Default)]
pub struct TemplateCache {
    templates: HashMap<AssetRef, Template>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the template of `asset` if it is missing or stale and returns
    /// its root.
    pub fn load(
        &mut self,
        engine: &PrefabEngine<'_>,
        classes: &Arc<ClassRegistry>,
        asset: &AssetRef,
    ) -> Result<ObjectId, OverrideError> {
        self.get_or_load(engine, classes, asset).map(|t| t.root)
    }

    /// The scratch world of a loaded template.
    pub fn world(&self, asset: &AssetRef) -> Option<&World> {
        self.templates.get(asset).map(|t| &t.world)
    }

    /// Drops the template of `asset`. Returns `true` if one was loaded.
    pub fn invalidate(&mut self, asset: &AssetRef) -> bool {
        self.templates.remove(asset).is_some()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn get_or_load(
        &mut self,
        engine: &PrefabEngine<'_>,
        classes: &Arc<ClassRegistry>,
        asset: &AssetRef,
    ) -> Result<&mut Template, OverrideError> {
        let revision = asset
            .read::<PrefabAsset>()
            .map(|prefab| prefab.revision)
            .ok_or_else(|| DeserializeError::NotAPrefab(asset.path().to_string()))?;

        let fresh = self.templates.get(asset).is_some_and(|t| t.revision == revision);
        if !fresh {
            let mut world = World::new(Arc::clone(classes));
            let loaded = engine.load(&mut world, asset, LoadOptions::new().with_fidelity(Fidelity::Full))?;
            log::debug!("loaded template `{}` at revision {revision}", asset.path());
            self.templates.insert(
                asset.clone(),
                Template {
                    world,
                    root: loaded.root,
                    state: loaded.state,
                    revision,
                },
            );
        }
        self.templates
            .get_mut(asset)
            .ok_or_else(|| DeserializeError::MissingVariant(asset.path().to_string()).into())
    }
}

// ---------------------------------------------------------------------------
// OverrideEditor
// ---------------------------------------------------------------------------

/// Edits the overrides of sub-prefab instances.
///
/// Every operation first prunes state for objects that no longer exist.
pub struct OverrideEditor<'e> {
    engine: &'e PrefabEngine<'e>,
    cache: &'e mut TemplateCache,
}

impl<'e> OverrideEditor<'e> {
    pub(crate) fn new(engine: &'e PrefabEngine<'e>, cache: &'e mut TemplateCache) -> Self {
        Self { engine, cache }
    }

    // ---- Table edits ----

    /// Marks `property` of `object` as overridden.
    ///
    /// Returns `Ok(false)` if it already was.
    pub fn add_override(
        &mut self,
        world: &World,
        state: &mut PrefabState,
        object: ObjectId,
        property: &str,
    ) -> Result<bool, OverrideError> {
        if world.class_info(object).and_then(|c| c.find_field(property)).is_none() {
            return Err(OverrideError::UnknownProperty {
                object,
                property: property.to_string(),
            });
        }
        let instance = instance_for(world, state, object)?;
        Ok(instance.overrides.add(object, property))
    }

    /// Stops tracking `property` of `object` without touching its value.
    pub fn remove_override(
        &mut self,
        world: &World,
        state: &mut PrefabState,
        object: ObjectId,
        property: &str,
    ) -> Result<bool, OverrideError> {
        let instance = instance_for(world, state, object)?;
        Ok(instance.overrides.remove(object, property))
    }

    /// Turns every recorded property edit on a sub-prefab object into an
    /// override. Edits outside sub-prefabs are dropped.
    ///
    /// Returns the number of newly tracked overrides.
    pub fn track_changes(&self, world: &mut World, state: &mut PrefabState) -> usize {
        let mut added = 0;
        for change in world.drain_changes() {
            if !world.is_alive(change.object) {
                continue;
            }
            let Some(root) = state.instance_of(change.object) else {
                continue;
            };
            if let Some(instance) = state.sub_prefabs.get_mut(&root)
                && instance.overrides.add(change.object, &change.property)
            {
                log::trace!("{} `{}` is now overridden", change.object, change.property);
                added += 1;
            }
        }
        added
    }

    // ---- Revert ----

    /// Copies `names` of `object` back from the source template and stops
    /// tracking them.
    pub fn revert(
        &mut self,
        world: &mut World,
        state: &mut PrefabState,
        object: ObjectId,
        names: &[&str],
    ) -> Result<(), OverrideError> {
        let instance = instance_for(world, state, object)?;
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.revert_names(world, instance, object, &names)
    }

    /// Reverts every override of the instance rooted at `root`.
    ///
    /// Returns the number of reverted properties.
    pub fn revert_all(
        &mut self,
        world: &mut World,
        state: &mut PrefabState,
        root: ObjectId,
    ) -> Result<usize, OverrideError> {
        state.prune(world);
        let instance = state
            .sub_prefabs
            .get_mut(&root)
            .ok_or(OverrideError::UnknownInstance(root))?;
        let mut reverted = 0;
        for (object, names) in tracked(instance) {
            self.revert_names(world, instance, object, &names)?;
            reverted += names.len();
        }
        log::debug!("reverted {reverted} overrides of {root}");
        Ok(reverted)
    }

    fn revert_names(
        &mut self,
        world: &mut World,
        instance: &mut SubPrefabInstance,
        object: ObjectId,
        names: &[String],
    ) -> Result<(), OverrideError> {
        let classes = Arc::clone(world.classes());
        let template = self.cache.get_or_load(self.engine, &classes, &instance.asset)?;
        let id = instance.ids.id_of(object).ok_or(OverrideError::NotInSubPrefab(object))?;
        let source = template
            .state
            .ids
            .object(id)
            .ok_or(OverrideError::MissingTemplateObject(id))?;

        for name in names {
            world.notify_pre_change(object, name);
            let mut src = Side {
                world: &template.world,
                ids: &mut template.state.ids,
            };
            let mut dst = Side {
                world: &mut *world,
                ids: &mut instance.ids,
            };
            let copied = copy_property(&mut src, source, &mut dst, object, name);
            world.notify_post_change(object, name);
            copied?;
            instance.overrides.remove(object, name);
        }
        Ok(())
    }

    // ---- Apply ----

    /// Copies `names` of `object` into the source template, saves the
    /// source prefab and stops tracking them.
    pub fn apply(
        &mut self,
        world: &mut World,
        state: &mut PrefabState,
        object: ObjectId,
        names: &[&str],
    ) -> Result<(), OverrideError> {
        let instance = instance_for(world, state, object)?;
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.apply_names(world, instance, object, &names)?;
        self.save_template(&instance.asset)
    }

    /// Applies every override of the instance rooted at `root`, saving the
    /// source prefab once at the end.
    ///
    /// Returns the number of applied properties.
    pub fn apply_all(
        &mut self,
        world: &mut World,
        state: &mut PrefabState,
        root: ObjectId,
    ) -> Result<usize, OverrideError> {
        state.prune(world);
        let instance = state
            .sub_prefabs
            .get_mut(&root)
            .ok_or(OverrideError::UnknownInstance(root))?;
        let mut applied = 0;
        for (object, names) in tracked(instance) {
            self.apply_names(world, instance, object, &names)?;
            applied += names.len();
        }
        if applied > 0 {
            self.save_template(&instance.asset)?;
        }
        log::debug!("applied {applied} overrides of {root}");
        Ok(applied)
    }

    fn apply_names(
        &mut self,
        world: &World,
        instance: &mut SubPrefabInstance,
        object: ObjectId,
        names: &[String],
    ) -> Result<(), OverrideError> {
        let template = self.cache.get_or_load(self.engine, world.classes(), &instance.asset)?;
        let id = instance.ids.id_of(object).ok_or(OverrideError::NotInSubPrefab(object))?;
        let target = template
            .state
            .ids
            .object(id)
            .ok_or(OverrideError::MissingTemplateObject(id))?;

        for name in names {
            template.world.notify_pre_change(target, name);
            let mut src = Side {
                world,
                ids: &mut instance.ids,
            };
            let mut dst = Side {
                world: &mut template.world,
                ids: &mut template.state.ids,
            };
            let copied = copy_property(&mut src, object, &mut dst, target, name);
            template.world.notify_post_change(target, name);
            copied?;
            instance.overrides.remove(object, name);
        }
        Ok(())
    }

    fn save_template(&mut self, asset: &AssetRef) -> Result<(), OverrideError> {
        let Some(template) = self.cache.templates.get_mut(asset) else {
            return Ok(());
        };
        self.engine
            .save(&template.world, template.root, asset, &mut template.state)?;
        if let Some(prefab) = asset.read::<PrefabAsset>() {
            template.revision = prefab.revision;
        }
        Ok(())
    }
}

/// The instance `object` belongs to, after pruning dead state.
fn instance_for<'s>(
    world: &World,
    state: &'s mut PrefabState,
    object: ObjectId,
) -> Result<&'s mut SubPrefabInstance, OverrideError> {
    state.prune(world);
    let root = state
        .instance_of(object)
        .ok_or(OverrideError::NotInSubPrefab(object))?;
    state
        .sub_prefabs
        .get_mut(&root)
        .ok_or(OverrideError::UnknownInstance(root))
}

/// Snapshot of an instance's tracked pairs, grouped by object.
fn tracked(instance: &SubPrefabInstance) -> Vec<(ObjectId, Vec<String>)> {
    instance
        .overrides
        .iter()
        .map(|(object, names)| (object, names.iter().cloned().collect()))
        .collect()
}
