//! Phase 3: spatial links, the root attachment and session end.

use tessera_world::hierarchy::{attach, propagate_active};
use tessera_world::{ActiveSignal, ClassKind, ObjectId, World};

use super::{GraphLoad, GraphReader, LoadedGraph, ReadyCallback};
use crate::error::DeserializeError;

/// The spatial node a loaded root attaches under.
///
/// A container parent stands for its root component. `None` leaves the root
/// unattached.
pub(super) fn resolve_parent(world: &World, parent: Option<ObjectId>) -> Result<Option<ObjectId>, DeserializeError> {
    let Some(parent) = parent else {
        return Ok(None);
    };
    match world.kind_of(parent) {
        Some(ClassKind::SpatialComponent) => Ok(Some(parent)),
        Some(ClassKind::Container) => world
            .root_component(parent)
            .map(Some)
            .ok_or(DeserializeError::InvalidParent(parent)),
        _ => Err(DeserializeError::InvalidParent(parent)),
    }
}

impl GraphReader<'_> {
    /// Attaches every stored spatial child to its parent.
    ///
    /// A parent that was not recreated is replaced by the root component of
    /// the graph's root container.
    pub(super) fn link(&self, world: &mut World, load: &GraphLoad<'_>, root: ObjectId) {
        let fallback = world.root_component(root);
        for &(child_id, parent_id) in &load.plan.spatial_parents {
            let Some(child) = load.ids.object(child_id) else {
                log::debug!("spatial child {child_id} was not created");
                continue;
            };
            let parent = match load.ids.object(parent_id) {
                Some(parent) => parent,
                None => match fallback {
                    Some(fallback) if fallback != child => {
                        log::warn!("spatial parent {parent_id} of {child} is missing, using the root component");
                        fallback
                    }
                    _ => {
                        log::warn!("spatial parent {parent_id} of {child} is missing");
                        continue;
                    }
                },
            };
            if let Err(err) = attach(world, child, parent) {
                log::warn!("failed to attach {child} to {parent}: {err}");
            }
        }
    }

    /// Completes the outermost load.
    pub(super) fn finish(
        mut self,
        world: &mut World,
        graph: &LoadedGraph,
        parent: Option<ObjectId>,
        before_ready: Vec<ReadyCallback>,
    ) {
        if let Some(node) = world.root_component(graph.root) {
            let signal = match parent {
                Some(parent) => match attach(world, node, parent) {
                    Ok(()) => ActiveSignal::Attached,
                    Err(err) => {
                        log::warn!("failed to attach loaded root to {parent}: {err}");
                        ActiveSignal::Check
                    }
                },
                None => ActiveSignal::Check,
            };
            propagate_active(world, node, signal);
        }

        for object in std::mem::take(&mut self.post_load) {
            if world.is_alive(object) {
                world.run_post_load(object);
            }
        }
        for callback in before_ready {
            callback(world, graph.root);
        }

        let finished = world.construction_mut().end_session(self.session);
        log::debug!("{} ended with {} objects", self.session, finished.len());
        for object in finished {
            if world.is_alive(object) {
                world.awake(object);
            }
        }
    }
}
