//! Ownership, attachment and construction sessions seen through the public
//! API.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rstest::rstest;
use tessera_world::hierarchy::{
    attach, attach_children, attach_parent, child_containers, detach, is_active_in_hierarchy,
    parent_container, propagate_active, set_active,
};
use tessera_world::{
    ActiveSignal, ClassId, ClassInfo, ClassRegistry, FieldInfo, FieldKind, LifecycleListener,
    ObjectFlags, ObjectId, SessionId, Value, World, WorldError,
};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

fn record_active(world: &mut World, object: ObjectId, active: bool) {
    let count = world
        .property(object, "notified")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let _ = world.write_property(object, "notified", Value::I64(count + 1));
    let _ = world.write_property(object, "active", Value::Bool(active));
}

fn mark_constructed(world: &mut World, object: ObjectId) {
    let _ = world.write_property(object, "constructed", Value::Bool(true));
}

struct Scene {
    world: World,
    node: ClassId,
    body: ClassId,
    entity: ClassId,
}

fn scene() -> Scene {
    let mut classes = ClassRegistry::new();
    let node = classes
        .register(
            ClassInfo::spatial_component("Node")
                .field(FieldInfo::new("active", FieldKind::Bool).transient())
                .field(FieldInfo::new("notified", FieldKind::Int).transient())
                .on_active_changed(record_active),
        )
        .unwrap();
    let body = classes
        .register(
            ClassInfo::component("Body")
                .field(FieldInfo::new("mass", FieldKind::Float).with_default(1.0f32))
                .field(FieldInfo::new("constructed", FieldKind::Bool).transient())
                .on_construct(mark_constructed),
        )
        .unwrap();
    let entity = classes
        .register(ClassInfo::container("Entity").default_subobject("Root", node))
        .unwrap();
    Scene {
        world: World::new(Arc::new(classes)),
        node,
        body,
        entity,
    }
}

impl Scene {
    fn entity(&mut self, name: &str) -> (ObjectId, ObjectId) {
        let entity = self.world.spawn(self.entity, None, name).unwrap();
        let root = self.world.root_component(entity).unwrap();
        (entity, root)
    }
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[test]
fn containers_spawn_with_their_root_component() {
    let mut s = scene();
    let (entity, root) = s.entity("Player");

    assert_eq!(s.world.owner(root), Some(entity));
    assert_eq!(s.world.name(root), Some("Root"));
    assert!(s.world.flags(root).contains(ObjectFlags::DEFAULT_SUBOBJECT));
    assert_eq!(s.world.find_default_subobject(entity, "Root"), Some(root));
    assert_eq!(s.world.components(entity), vec![root]);
    assert_eq!(s.world.container_of(root), Some(entity));
}

#[test]
fn despawn_takes_the_owned_subtree_and_cuts_links() {
    let mut s = scene();
    let (a, a_root) = s.entity("A");
    let (b, b_root) = s.entity("B");
    let extra = s.world.spawn(s.node, Some(a), "Extra").unwrap();
    attach(&mut s.world, extra, a_root).unwrap();
    attach(&mut s.world, b_root, extra).unwrap();
    let before = s.world.object_count();

    assert!(s.world.despawn(a));
    assert!(!s.world.is_alive(a_root));
    assert!(!s.world.is_alive(extra));
    assert_eq!(s.world.object_count(), before - 3);
    assert!(s.world.is_alive(b));
    assert_eq!(attach_parent(&s.world, b_root), None);
    assert!(!s.world.despawn(a));
}

#[rstest]
#[case::component_without_container(None)]
#[case::container_owned_by_a_component(Some("component"))]
fn invalid_owners_are_rejected(#[case] owner: Option<&str>) {
    let mut s = scene();
    let (entity, _) = s.entity("Host");
    let body = s.world.spawn(s.body, Some(entity), "Body").unwrap();
    let result = match owner {
        None => s.world.spawn(s.body, None, "Loose"),
        Some(_) => s.world.spawn(s.entity, Some(body), "Nested"),
    };
    assert!(matches!(result, Err(WorldError::InvalidOwner { .. })));
}

#[test]
fn deferred_spawns_construct_once() {
    let mut s = scene();
    let (entity, _) = s.entity("Host");
    let body = s.world.spawn_deferred(s.body, Some(entity), "Body").unwrap();
    s.world.write_property(body, "mass", Value::F32(4.0)).unwrap();
    assert!(!s.world.is_constructed(body));
    assert_eq!(s.world.property(body, "constructed"), Some(&Value::Bool(false)));

    assert!(s.world.finish_construction(body));
    assert!(!s.world.finish_construction(body));
    assert_eq!(s.world.property(body, "constructed"), Some(&Value::Bool(true)));
    assert_eq!(s.world.property(body, "mass"), Some(&Value::F32(4.0)));
}

#[test]
fn property_writes_are_type_checked() {
    let mut s = scene();
    let (entity, _) = s.entity("Host");
    let body = s.world.spawn(s.body, Some(entity), "Body").unwrap();

    assert_eq!(s.world.property(body, "mass"), Some(&Value::F32(1.0)));
    assert!(matches!(
        s.world.set_property(body, "mass", Value::from("heavy")),
        Err(WorldError::TypeMismatch { .. })
    ));
    assert!(matches!(
        s.world.set_property(body, "volume", Value::F32(2.0)),
        Err(WorldError::UnknownProperty { .. })
    ));
    s.world.set_property(body, "mass", Value::F32(2.0)).unwrap();
    let changes = s.world.drain_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].object, body);
    assert!(s.world.drain_changes().is_empty());
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

#[test]
fn container_tree_follows_root_attachment() {
    let mut s = scene();
    let (parent, parent_root) = s.entity("Parent");
    let (left, left_root) = s.entity("Left");
    let (right, right_root) = s.entity("Right");
    attach(&mut s.world, left_root, parent_root).unwrap();
    attach(&mut s.world, right_root, parent_root).unwrap();

    assert_eq!(child_containers(&s.world, parent), vec![left, right]);
    assert_eq!(parent_container(&s.world, right), Some(parent));

    // Re-parenting moves the link.
    attach(&mut s.world, right_root, left_root).unwrap();
    assert_eq!(attach_children(&s.world, parent_root), &[left_root]);
    assert_eq!(child_containers(&s.world, left), vec![right]);

    detach(&mut s.world, left_root);
    assert_eq!(parent_container(&s.world, left), None);
    assert!(child_containers(&s.world, parent).is_empty());
}

#[test]
fn attachment_rejects_cycles_and_non_spatial_objects() {
    let mut s = scene();
    let (a, a_root) = s.entity("A");
    let (_, b_root) = s.entity("B");
    attach(&mut s.world, b_root, a_root).unwrap();

    assert!(matches!(
        attach(&mut s.world, a_root, b_root),
        Err(WorldError::AttachmentCycle { .. })
    ));
    let body = s.world.spawn(s.body, Some(a), "Body").unwrap();
    assert!(matches!(
        attach(&mut s.world, body, a_root),
        Err(WorldError::NotSpatial(o)) if o == body
    ));
}

#[test]
fn active_state_propagates_down_the_attachment_tree() {
    let mut s = scene();
    let (_, top) = s.entity("Top");
    let (_, middle) = s.entity("Middle");
    let (_, leaf) = s.entity("Leaf");
    attach(&mut s.world, middle, top).unwrap();
    attach(&mut s.world, leaf, middle).unwrap();

    propagate_active(&mut s.world, top, ActiveSignal::Attached);
    for node in [top, middle, leaf] {
        assert_eq!(s.world.property(node, "notified"), Some(&Value::I64(1)));
    }

    set_active(&mut s.world, middle, false);
    assert!(is_active_in_hierarchy(&s.world, top));
    assert!(!is_active_in_hierarchy(&s.world, middle));
    assert!(!is_active_in_hierarchy(&s.world, leaf));
    assert_eq!(s.world.property(leaf, "active"), Some(&Value::Bool(false)));
    // Unchanged nodes are not notified on a check.
    assert_eq!(s.world.property(top, "notified"), Some(&Value::I64(1)));

    set_active(&mut s.world, middle, true);
    assert!(is_active_in_hierarchy(&s.world, leaf));
    assert_eq!(s.world.property(leaf, "notified"), Some(&Value::I64(3)));
}

// ---------------------------------------------------------------------------
// Construction sessions
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Journal(Rc<RefCell<Vec<String>>>);

impl LifecycleListener for Journal {
    fn session_began(&mut self, session: SessionId) {
        self.0.borrow_mut().push(format!("begin {}", session.0));
    }

    fn object_added(&mut self, object: ObjectId, _session: SessionId) {
        self.0.borrow_mut().push(format!("add {object}"));
    }

    fn object_removed(&mut self, object: ObjectId, _session: SessionId) {
        self.0.borrow_mut().push(format!("remove {object}"));
    }

    fn session_ended(&mut self, session: SessionId, objects: &[ObjectId]) {
        self.0
            .borrow_mut()
            .push(format!("end {} with {}", session.0, objects.len()));
    }
}

#[test]
fn listeners_see_the_whole_session() {
    let mut s = scene();
    let journal = Journal::default();
    s.world.construction_mut().add_listener(Box::new(journal.clone()));

    let session = s.world.construction_mut().begin_session();
    let (a, _) = s.entity("A");
    let (b, _) = s.entity("B");
    assert!(s.world.construction_mut().add(a, session));
    assert!(s.world.construction_mut().add(b, session));
    assert_eq!(s.world.construction().session_of(a), Some(session));

    // Despawning an object under construction drops it from the session.
    s.world.despawn(b);
    let finished = s.world.construction_mut().end_session(session);
    assert_eq!(finished, vec![a]);
    assert!(s.world.construction().is_empty());
    assert!(!s.world.construction().is_open(session));

    let log = journal.0.borrow();
    assert_eq!(
        *log,
        vec![
            format!("begin {}", session.0),
            format!("add {a}"),
            format!("add {b}"),
            format!("remove {b}"),
            format!("end {} with 1", session.0),
        ]
    );
}

#[test]
fn closed_sessions_accept_nothing() {
    let mut s = scene();
    let (a, _) = s.entity("A");
    let session = s.world.construction_mut().begin_session();
    s.world.construction_mut().end_session(session);

    assert!(!s.world.construction_mut().add(a, session));
    assert!(!s.world.construction().is_under_construction(a));
}

#[test]
fn worlds_do_not_share_sessions() {
    let mut first = scene();
    let mut second = scene();
    let (a, _) = first.entity("A");
    let session = first.world.construction_mut().begin_session();
    first.world.construction_mut().add(a, session);

    assert!(first.world.construction().is_under_construction(a));
    assert!(second.world.construction().is_empty());
    assert!(!second.world.construction().is_open(session));
    let (_, _) = second.entity("B");
    assert!(second.world.construction().is_empty());
}
