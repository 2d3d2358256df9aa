//! Spatial attachment hierarchy.
//!
//! Spatial components attach to other spatial components, possibly owned by
//! a different container. Containers themselves are arranged implicitly: a
//! container is a child of another when its root component is attached to
//! one of the other container's components.
//!
//! # Usage
//!
//! ```ignore
//! attach(&mut world, child_root, parent_node)?;
//! let children = child_containers(&world, parent_container);
//! propagate_active(&mut world, child_root, ActiveSignal::Attached);
//! detach(&mut world, child_root);
//! ```

use crate::class::ClassKind;
use crate::error::WorldError;
use crate::object::ObjectId;
use crate::world::World;

/// Why active state is being re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSignal {
    /// The subtree just entered a hierarchy; every node is notified.
    Attached,
    /// Re-check in place; only nodes whose state changed are notified.
    Check,
}

/// Attaches spatial component `child` under `parent`.
///
/// Detaches `child` from any previous parent first. Fails if either side is
/// not a live spatial component or if the link would form a cycle.
pub fn attach(world: &mut World, child: ObjectId, parent: ObjectId) -> Result<(), WorldError> {
    for object in [child, parent] {
        match world.kind_of(object) {
            Some(ClassKind::SpatialComponent) => {}
            Some(_) => return Err(WorldError::NotSpatial(object)),
            None => return Err(WorldError::DeadObject(object)),
        }
    }
    if attach_parent(world, child) == Some(parent) {
        return Ok(());
    }

    let mut ancestor = Some(parent);
    while let Some(current) = ancestor {
        if current == child {
            return Err(WorldError::AttachmentCycle { child, parent });
        }
        ancestor = attach_parent(world, current);
    }

    detach(world, child);
    if let Some(data) = world.data_mut(child) {
        data.attach_parent = Some(parent);
    }
    if let Some(data) = world.data_mut(parent) {
        data.attach_children.push(child);
    }
    Ok(())
}

/// Cuts `child` loose from its attach parent. Does nothing if unattached.
pub fn detach(world: &mut World, child: ObjectId) {
    let Some(parent) = world.data_mut(child).and_then(|d| d.attach_parent.take()) else {
        return;
    };
    if let Some(data) = world.data_mut(parent) {
        data.attach_children.retain(|&c| c != child);
    }
}

pub fn attach_parent(world: &World, child: ObjectId) -> Option<ObjectId> {
    world.data(child).and_then(|d| d.attach_parent)
}

/// Components attached directly under `parent`, in attachment order.
pub fn attach_children(world: &World, parent: ObjectId) -> &[ObjectId] {
    world
        .data(parent)
        .map(|d| d.attach_children.as_slice())
        .unwrap_or(&[])
}

/// Containers whose root component is attached to any component of
/// `container`, in attachment order.
pub fn child_containers(world: &World, container: ObjectId) -> Vec<ObjectId> {
    let mut children = Vec::new();
    for component in world.components(container) {
        for &attached in attach_children(world, component) {
            let Some(owner) = world.owner(attached) else {
                continue;
            };
            if owner != container
                && world.root_component(owner) == Some(attached)
                && !children.contains(&owner)
            {
                children.push(owner);
            }
        }
    }
    children
}

/// The container `container`'s root component is attached under, if any.
pub fn parent_container(world: &World, container: ObjectId) -> Option<ObjectId> {
    let root = world.root_component(container)?;
    let parent = attach_parent(world, root)?;
    world.container_of(parent)
}

pub fn is_active_self(world: &World, component: ObjectId) -> bool {
    world.data(component).is_some_and(|d| d.active_self)
}

pub fn is_active_in_hierarchy(world: &World, component: ObjectId) -> bool {
    world.data(component).is_some_and(|d| d.active_in_hierarchy)
}

/// Sets the local active flag of `component` and re-checks its subtree.
pub fn set_active(world: &mut World, component: ObjectId, active: bool) {
    if let Some(data) = world.data_mut(component) {
        data.active_self = active;
    }
    propagate_active(world, component, ActiveSignal::Check);
}

/// Recomputes active-in-hierarchy state for `component` and everything
/// attached below it.
///
/// A node is active when it is locally active and its attach parent (if
/// any) is active in the hierarchy.
pub fn propagate_active(world: &mut World, component: ObjectId, signal: ActiveSignal) {
    let parent_active = attach_parent(world, component)
        .map(|p| is_active_in_hierarchy(world, p))
        .unwrap_or(true);
    let mut stack = vec![(component, parent_active)];
    while let Some((node, parent_active)) = stack.pop() {
        let Some(data) = world.data_mut(node) else {
            continue;
        };
        let active = parent_active && data.active_self;
        let changed = data.active_in_hierarchy != active;
        data.active_in_hierarchy = active;
        let children = data.attach_children.clone();

        if (changed || signal == ActiveSignal::Attached)
            && let Some(hook) = world.class_info(node).and_then(|c| c.hooks.on_active_changed)
        {
            hook(world, node, active);
        }
        for child in children.into_iter().rev() {
            stack.push((child, active));
        }
    }
}
