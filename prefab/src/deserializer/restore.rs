//! Phase 2: decode property blobs and reapply sub-graph overrides.

use tessera_world::{ClassKind, World};

use super::{GraphLoad, GraphReader, ReadRefs};
use crate::codec::PropertyScope;

impl GraphReader<'_> {
    pub(super) fn restore(&self, world: &mut World, load: &mut GraphLoad<'_>) {
        let refs = ReadRefs {
            ids: &load.ids,
            assets: load.assets,
            classes: &load.classes,
            names: &load.plan.names,
            allow_native: self.allow_native,
        };
        let fidelity = load.plan.fidelity;

        for &(object, data) in &load.restores {
            let spatial = world.kind_of(object) == Some(ClassKind::SpatialComponent);
            let scope = PropertyScope::object(fidelity, spatial);
            if let Err(err) = self.codec.read(world, object, &scope, &refs, data) {
                log::warn!("failed to restore properties of {object}: {err}");
            }
        }

        for &(root, entries) in &load.overrides {
            let Some(instance) = load.sub_prefabs.get_mut(&root) else {
                continue;
            };
            for entry in entries {
                let Some(object) = instance.ids.object(entry.target) else {
                    log::warn!("override target {} is not part of sub-prefab {root}", entry.target);
                    continue;
                };
                for name in &entry.names {
                    world.notify_pre_change(object, name);
                }
                let scope = PropertyScope::only(entry.names.iter().cloned());
                if let Err(err) = self.codec.read(world, object, &scope, &refs, &entry.data) {
                    log::warn!("failed to reapply overrides of {object}: {err}");
                }
                for name in &entry.names {
                    world.notify_post_change(object, name);
                    instance.overrides.add(object, name);
                }
            }
        }
    }
}
