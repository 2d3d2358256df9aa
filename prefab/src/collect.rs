//! Membership and ordering of the objects a save writes.
//!
//! Containers are walked explicitly by the serializer and registered as
//! belonging to the graph. Every other object is pulled in lazily through
//! [`Collector::collect`], either because the serializer visits it or because
//! a property of an already-collected object refers to it.
//!
//! An object is collected only if its owner chain reaches a belonging
//! container or a host through objects that are themselves collectable.
//! Hosts are the objects of embedded sub-graphs; anything created under one
//! that the sub-graph does not know about is written by this graph. Each newly
//! collected chain is appended top-down, so the collection order always
//! lists owners before the objects they own, however deep the chain.

use std::collections::HashSet;

use tessera_world::{ClassKind, ObjectFlags, ObjectId, World};

use crate::codec::Fidelity;
use crate::id::StableId;
use crate::identity::IdentityMap;

pub struct Collector<'a> {
    world: &'a World,
    /// Ids from the previous save or load of this graph.
    reuse: &'a IdentityMap,
    fidelity: Fidelity,
    /// Session ids of everything addressable: containers, sub-graph objects
    /// and collected objects.
    ids: IdentityMap,
    containers: HashSet<ObjectId>,
    /// Addressable objects written elsewhere that may own collected ones.
    hosts: HashSet<ObjectId>,
    included: HashSet<ObjectId>,
    excluded: HashSet<ObjectId>,
    order: Vec<ObjectId>,
}

impl<'a> Collector<'a> {
    pub fn new(world: &'a World, reuse: &'a IdentityMap, fidelity: Fidelity) -> Self {
        Self {
            world,
            reuse,
            fidelity,
            ids: IdentityMap::new(),
            containers: HashSet::new(),
            hosts: HashSet::new(),
            included: HashSet::new(),
            excluded: HashSet::new(),
            order: Vec::new(),
        }
    }

    /// Marks `container` as part of this graph and gives it an id.
    pub fn add_container(&mut self, container: ObjectId) -> StableId {
        self.containers.insert(container);
        self.register(container, None)
    }

    /// Gives `object` an id without making it part of this graph.
    ///
    /// Uses `preferred` if given, then the reused id, then a fresh one.
    pub fn register(&mut self, object: ObjectId, preferred: Option<StableId>) -> StableId {
        if let Some(id) = self.ids.id_of(object) {
            return id;
        }
        let id = preferred
            .or_else(|| self.reuse.id_of(object))
            .filter(|id| self.ids.object(*id).is_none())
            .unwrap_or_else(StableId::new);
        self.ids.insert(id, object);
        id
    }

    /// Gives `object` an id like [`register`](Self::register) and lets
    /// objects it owns that have no id yet be collected.
    pub fn add_host(&mut self, object: ObjectId, preferred: Option<StableId>) -> StableId {
        self.hosts.insert(object);
        self.register(object, preferred)
    }

    pub fn belongs(&self, container: ObjectId) -> bool {
        self.containers.contains(&container)
    }

    /// Includes `object` (and any not-yet-included owners) and returns its
    /// id, or `None` if it does not belong to this graph.
    ///
    /// Idempotent: an object that already has an id gets the same id back.
    pub fn collect(&mut self, object: ObjectId) -> Option<StableId> {
        if let Some(id) = self.ids.id_of(object) {
            return Some(id);
        }
        if self.excluded.contains(&object) {
            return None;
        }

        let mut chain = vec![object];
        let mut current = object;
        loop {
            if !self.collectable(current) {
                return self.exclude(chain);
            }
            let Some(owner) = self.world.owner(current) else {
                return self.exclude(chain);
            };
            if self.containers.contains(&owner)
                || self.included.contains(&owner)
                || self.hosts.contains(&owner)
            {
                break;
            }
            if self.excluded.contains(&owner) || self.ids.contains_object(owner) {
                return self.exclude(chain);
            }
            chain.push(owner);
            current = owner;
        }

        for &member in chain.iter().rev() {
            let id = self.register(member, None);
            self.included.insert(member);
            self.order.push(member);
            log::trace!("collected {member} as {id}");
        }
        self.ids.id_of(object)
    }

    fn collectable(&self, object: ObjectId) -> bool {
        let Some(kind) = self.world.kind_of(object) else {
            return false;
        };
        let flags = self.world.flags(object);
        kind != ClassKind::Container
            && !flags.contains(ObjectFlags::TRANSIENT)
            && !(self.fidelity == Fidelity::Compact && flags.contains(ObjectFlags::EDITOR_ONLY))
    }

    fn exclude(&mut self, chain: Vec<ObjectId>) -> Option<StableId> {
        self.excluded.extend(chain);
        None
    }

    pub fn id_of(&self, object: ObjectId) -> Option<StableId> {
        self.ids.id_of(object)
    }

    pub fn is_included(&self, object: ObjectId) -> bool {
        self.included.contains(&object)
    }

    /// Collected objects, owners first.
    pub fn order(&self) -> &[ObjectId] {
        &self.order
    }

    /// The session id map.
    pub fn ids(&self) -> &IdentityMap {
        &self.ids
    }

    pub fn into_ids(self) -> IdentityMap {
        self.ids
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use tessera_world::{ClassInfo, ClassRegistry};

    use super::*;

    struct Fixture {
        world: World,
        container: ObjectId,
        component: ObjectId,
        /// Owned chain below `component`, outermost first.
        chain: Vec<ObjectId>,
        foreign_object: ObjectId,
    }

    fn fixture() -> Fixture {
        let mut classes = ClassRegistry::new();
        let style = classes.register(ClassInfo::object("Style")).unwrap();
        let label = classes.register(ClassInfo::component("Label")).unwrap();
        let panel = classes.register(ClassInfo::container("Panel")).unwrap();
        let mut world = World::new(Arc::new(classes));

        let container = world.spawn(panel, None, "Main").unwrap();
        let component = world.spawn(label, Some(container), "Title").unwrap();
        let mut chain = Vec::new();
        let mut owner = component;
        for depth in 0..4 {
            let object = world.spawn(style, Some(owner), &format!("style{depth}")).unwrap();
            chain.push(object);
            owner = object;
        }
        let foreign = world.spawn(panel, None, "Other").unwrap();
        let foreign_label = world.spawn(label, Some(foreign), "Text").unwrap();
        let foreign_object = world.spawn(style, Some(foreign_label), "Style").unwrap();
        Fixture {
            world,
            container,
            component,
            chain,
            foreign_object,
        }
    }

    fn assert_owner_first(world: &World, collector: &Collector<'_>) {
        for (position, &object) in collector.order().iter().enumerate() {
            let owner = world.owner(object).unwrap();
            if collector.belongs(owner) {
                continue;
            }
            let owner_position = collector.order().iter().position(|&o| o == owner).unwrap();
            assert!(owner_position < position, "{owner} listed after {object}");
        }
    }

    #[rstest]
    #[case::deepest_first(&[3, 2, 1, 0])]
    #[case::shallowest_first(&[0, 1, 2, 3])]
    #[case::interleaved(&[2, 0, 3, 1])]
    fn owners_precede_owned(#[case] visit: &[usize]) {
        let f = fixture();
        let reuse = IdentityMap::new();
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        collector.add_container(f.container);
        for &depth in visit {
            assert!(collector.collect(f.chain[depth]).is_some());
        }
        assert_eq!(collector.order().len(), 5);
        assert_eq!(collector.order()[0], f.component);
        assert_owner_first(&f.world, &collector);
    }

    #[test]
    fn collect_is_idempotent() {
        let f = fixture();
        let reuse = IdentityMap::new();
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        collector.add_container(f.container);
        let first = collector.collect(f.chain[3]);
        assert_eq!(collector.collect(f.chain[3]), first);
        assert_eq!(collector.order().len(), 5);
    }

    #[test]
    fn containers_and_foreign_objects_are_not_collected() {
        let f = fixture();
        let reuse = IdentityMap::new();
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        let container_id = collector.add_container(f.container);
        assert_eq!(collector.collect(f.container), Some(container_id));
        assert!(!collector.is_included(f.container));
        assert_eq!(collector.collect(f.foreign_object), None);
        assert_eq!(collector.collect(f.foreign_object), None);
        assert!(collector.order().is_empty());
    }

    #[test]
    fn transient_ancestor_excludes_subtree() {
        let mut f = fixture();
        f.world.set_flags(f.chain[1], ObjectFlags::TRANSIENT, true);
        let reuse = IdentityMap::new();
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        collector.add_container(f.container);
        assert_eq!(collector.collect(f.chain[3]), None);
        assert!(collector.collect(f.chain[0]).is_some());
        assert_eq!(collector.order(), &[f.component, f.chain[0]]);
    }

    #[test]
    fn compact_skips_editor_only() {
        let mut f = fixture();
        f.world.set_flags(f.chain[0], ObjectFlags::EDITOR_ONLY, true);
        let reuse = IdentityMap::new();
        let mut full = Collector::new(&f.world, &reuse, Fidelity::Full);
        full.add_container(f.container);
        assert!(full.collect(f.chain[0]).is_some());
        let mut compact = Collector::new(&f.world, &reuse, Fidelity::Compact);
        compact.add_container(f.container);
        assert_eq!(compact.collect(f.chain[0]), None);
    }

    #[test]
    fn objects_created_under_hosts_are_collected() {
        let f = fixture();
        let reuse = IdentityMap::new();
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        // The foreign label stands in for an object of an embedded sub-graph.
        let foreign_label = f.world.owner(f.foreign_object).unwrap();
        let host_id = collector.add_host(foreign_label, Some(StableId::from_u128(5)));
        assert_eq!(host_id, StableId::from_u128(5));

        assert!(collector.collect(f.foreign_object).is_some());
        assert_eq!(collector.order(), &[f.foreign_object]);
        assert!(!collector.is_included(foreign_label));
        assert_eq!(collector.collect(foreign_label), Some(host_id));
    }

    #[test]
    fn registered_objects_do_not_adopt_what_they_own() {
        let f = fixture();
        let reuse = IdentityMap::new();
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        let foreign_label = f.world.owner(f.foreign_object).unwrap();
        collector.register(foreign_label, None);
        assert_eq!(collector.collect(f.foreign_object), None);
    }

    #[test]
    fn previous_ids_are_reused() {
        let f = fixture();
        let mut reuse = IdentityMap::new();
        let known = StableId::from_u128(77);
        reuse.insert(known, f.chain[2]);
        let mut collector = Collector::new(&f.world, &reuse, Fidelity::Full);
        collector.add_container(f.container);
        assert_eq!(collector.collect(f.chain[2]), Some(known));
    }
}
