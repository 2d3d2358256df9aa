//! Every readable generation must load into the same graph, embedded
//! sub-graphs and default sub-object slots included.

use std::sync::Arc;

use rstest::rstest;
use tessera_world::hierarchy::{attach, attach_parent};
use tessera_world::{
    ClassInfo, ClassRegistry, FieldInfo, FieldKind, ObjectFlags, ObjectId, Value, World,
};

use super::{decode_payload, encode_payload, encode_payload_as, Encoding, FormatVersion, PlanContainer};
use crate::asset::{PrefabAsset, StoredGraph};
use crate::codec::{Fidelity, ReflectCodec};
use crate::engine::{LoadOptions, PrefabEngine};
use crate::identity::IdentityMap;
use crate::overrides::TemplateCache;
use crate::serializer::GraphWriter;
use crate::state::PrefabState;

fn registry() -> Arc<ClassRegistry> {
    let mut classes = ClassRegistry::new();
    let style = classes
        .register(ClassInfo::object("Style").field(FieldInfo::new("size", FieldKind::Float)))
        .unwrap();
    let frame = classes
        .register(
            ClassInfo::spatial_component("Frame")
                .field(FieldInfo::new("title", FieldKind::String))
                .field(FieldInfo::new("note", FieldKind::String).editor_only())
                .field(FieldInfo::new("target", FieldKind::Object))
                .field(FieldInfo::new("style", FieldKind::Inline(style))),
        )
        .unwrap();
    classes
        .register(ClassInfo::container("Panel").default_subobject("Frame", frame))
        .unwrap();
    classes
        .register(
            ClassInfo::container("Rack")
                .default_subobject("Scratch", style)
                .default_subobject("Frame", frame),
        )
        .unwrap();
    Arc::new(classes)
}

/// Two panels whose frames point at each other, one owning a style.
fn scene() -> (World, ObjectId) {
    let classes = registry();
    let panel = classes.find("Panel").unwrap();
    let style = classes.find("Style").unwrap();
    let mut world = World::new(classes);

    let root = world.spawn(panel, None, "Root").unwrap();
    let child = world.spawn(panel, None, "Child").unwrap();
    let root_frame = world.root_component(root).unwrap();
    let child_frame = world.root_component(child).unwrap();
    attach(&mut world, child_frame, root_frame).unwrap();

    let look = world.spawn(style, Some(root_frame), "Look").unwrap();
    world.write_property(look, "size", Value::F32(12.0)).unwrap();
    world.write_property(root_frame, "title", Value::from("main")).unwrap();
    world.write_property(root_frame, "note", Value::from("draft")).unwrap();
    world.write_property(root_frame, "target", Value::Object(Some(child_frame))).unwrap();
    world.write_property(root_frame, "style", Value::Object(Some(look))).unwrap();
    world.write_property(child_frame, "target", Value::Object(Some(root_frame))).unwrap();
    (world, root)
}

/// One line per object, with objects named by stable id.
fn describe(world: &World, ids: &IdentityMap, with_names: bool) -> Vec<String> {
    let id = |object: Option<ObjectId>| {
        object
            .and_then(|o| ids.id_of(o))
            .map_or_else(|| "-".to_string(), |id| id.to_string())
    };
    let mut lines: Vec<String> = world
        .iter_objects()
        .map(|object| {
            let info = world.class_info(object).unwrap();
            let mut line = format!(
                "{} {} owner={} parent={}",
                id(Some(object)),
                info.name,
                id(world.owner(object)),
                id(attach_parent(world, object))
            );
            if with_names {
                line.push_str(&format!(" name={}", world.name(object).unwrap_or_default()));
            }
            for (field, value) in info.fields.iter().zip(world.properties(object)) {
                let rendered = match value {
                    Value::Object(target) => id(*target),
                    other => format!("{other:?}"),
                };
                line.push_str(&format!(" {}={rendered}", field.name));
            }
            line
        })
        .collect();
    lines.sort();
    lines
}

fn stored(fidelity: Fidelity, version: FormatVersion) -> StoredGraph {
    let (world, root) = scene();
    let state = PrefabState::new();
    let written = GraphWriter::new(&world, &ReflectCodec, &state, fidelity)
        .write(root)
        .unwrap();
    let payload = encode_payload_as(&written.plan, version, Encoding::Bincode).unwrap();
    StoredGraph::new(version, payload, written.assets)
}

fn load(stored: &StoredGraph, with_names: bool) -> Vec<String> {
    let mut world = World::new(registry());
    let loaded = PrefabEngine::new()
        .load_stored(&mut world, stored, LoadOptions::new())
        .unwrap();
    describe(&world, &loaded.state.ids, with_names)
}

#[rstest]
fn older_generations_load_the_same_graph(
    #[values(FormatVersion::Ordered, FormatVersion::Named)] version: FormatVersion,
    #[values(Fidelity::Full, Fidelity::Compact)] fidelity: Fidelity,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    // Both payloads come from the same plan, so ids line up.
    let (world, root) = scene();
    let state = PrefabState::new();
    let written = GraphWriter::new(&world, &ReflectCodec, &state, fidelity)
        .write(root)
        .unwrap();
    let current = StoredGraph::new(
        FormatVersion::CURRENT,
        encode_payload(&written.plan, Encoding::Bincode).unwrap(),
        written.assets.clone(),
    );
    let older = StoredGraph::new(
        version,
        encode_payload_as(&written.plan, version, Encoding::Bincode).unwrap(),
        written.assets,
    );

    let names = version.stores_names();
    let expected = load(&current, names);
    assert_eq!(load(&older, names), expected);
    assert_eq!(expected.len(), 5);
}

#[rstest]
#[case(Fidelity::Full, "\"draft\"")]
#[case(Fidelity::Compact, "\"\"")]
fn editor_only_fields_follow_fidelity(#[case] fidelity: Fidelity, #[case] note: &str) {
    let lines = load(&stored(fidelity, FormatVersion::Ordered), false);
    assert!(lines.iter().any(|l| l.contains(&format!("note=String({note})"))));
    assert!(lines.iter().any(|l| l.contains("title=String(\"main\")")));
}

#[test]
fn ordered_payloads_lose_display_names() {
    let mut world = World::new(registry());
    let loaded = PrefabEngine::new()
        .load_stored(&mut world, &stored(Fidelity::Full, FormatVersion::Ordered), LoadOptions::new())
        .unwrap();
    assert_eq!(world.name(loaded.root), Some(""));
    // Default sub-objects keep the name their class gives them.
    let frame = world.root_component(loaded.root).unwrap();
    assert_eq!(world.name(frame), Some("Frame"));
}

#[test]
fn upgrade_rewrites_older_variants() {
    let _ = env_logger::builder().is_test(true).try_init();
    let legacy = stored(Fidelity::Full, FormatVersion::Named);
    let before = load(&legacy, true);
    let asset = PrefabAsset::new_ref("ui/legacy.prefab");
    {
        let mut prefab = asset.write::<PrefabAsset>().unwrap();
        prefab.full = Some(legacy);
        prefab.compact = Some(stored(Fidelity::Compact, FormatVersion::CURRENT));
    }

    let engine = PrefabEngine::new();
    assert!(engine.upgrade(&asset).unwrap());
    {
        let prefab = asset.read::<PrefabAsset>().unwrap();
        let full = prefab.full.as_ref().unwrap();
        assert!(full.is_current());
        assert_eq!(full.stamp.format, FormatVersion::CURRENT);
        assert_eq!(decode_payload(&full.payload).unwrap().0, FormatVersion::CURRENT);
        assert_eq!(prefab.revision, 1);
    }
    // Nothing left to upgrade.
    assert!(!engine.upgrade(&asset).unwrap());

    let mut world = World::new(registry());
    let loaded = engine
        .load(&mut world, &asset, LoadOptions::new().with_fidelity(Fidelity::Full))
        .unwrap();
    assert_eq!(describe(&world, &loaded.state.ids, true), before);
}

// ---------------------------------------------------------------------------
// Sub-graphs
// ---------------------------------------------------------------------------

/// A `Host` panel embedding the scene as a sub-prefab, with the instance
/// root's title and its style's size overridden.
fn embedded() -> (World, ObjectId, PrefabState) {
    let engine = PrefabEngine::new();
    let (source, source_root) = scene();
    let asset = PrefabAsset::new_ref("ui/scene.prefab");
    engine
        .save(&source, source_root, &asset, &mut PrefabState::new())
        .unwrap();

    let classes = registry();
    let panel = classes.find("Panel").unwrap();
    let mut world = World::new(classes);
    let host = world.spawn(panel, None, "Host").unwrap();
    let mut state = PrefabState::new();
    let instance = engine
        .instantiate_sub_prefab(&mut world, &mut state, &asset, host)
        .unwrap();
    let frame = world.root_component(instance).unwrap();
    let look = world.property(frame, "style").and_then(Value::as_object).unwrap();
    world.set_property(frame, "title", Value::from("local")).unwrap();
    world.set_property(look, "size", Value::F32(20.0)).unwrap();
    let tracked = engine
        .overrides(&mut TemplateCache::new())
        .track_changes(&mut world, &mut state);
    assert_eq!(tracked, 2);
    (world, host, state)
}

/// The loaded graph plus the override table of its one instance, as
/// `id.property` lines.
fn load_embedded(stored: &StoredGraph, with_names: bool) -> (Vec<String>, Vec<String>) {
    let mut world = World::new(registry());
    let loaded = PrefabEngine::new()
        .load_stored(&mut world, stored, LoadOptions::new())
        .unwrap();
    assert_eq!(loaded.state.sub_prefabs.len(), 1);
    let instance = &loaded.state.sub_prefabs[0];
    let mut overrides: Vec<String> = instance
        .overrides
        .iter()
        .flat_map(|(object, names)| {
            let id = loaded.state.ids.id_of(object).unwrap();
            names.iter().map(move |name| format!("{id}.{name}"))
        })
        .collect();
    overrides.sort();
    (describe(&world, &loaded.state.ids, with_names), overrides)
}

#[rstest]
fn older_generations_keep_sub_graph_overrides(
    #[values(FormatVersion::Ordered, FormatVersion::Named)] version: FormatVersion,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (world, host, state) = embedded();
    let written = GraphWriter::new(&world, &ReflectCodec, &state, Fidelity::Full)
        .write(host)
        .unwrap();
    assert!(matches!(
        &written.plan.root,
        PlanContainer::Leaf(leaf) if matches!(leaf.children.as_slice(), [PlanContainer::SubGraph(_)])
    ));
    let current = StoredGraph::new(
        FormatVersion::CURRENT,
        encode_payload(&written.plan, Encoding::Bincode).unwrap(),
        written.assets.clone(),
    );
    let older = StoredGraph::new(
        version,
        encode_payload_as(&written.plan, version, Encoding::Bincode).unwrap(),
        written.assets,
    );

    let names = version.stores_names();
    let expected = load_embedded(&current, names);
    let (lines, overrides) = load_embedded(&older, names);
    assert_eq!((&lines, &overrides), (&expected.0, &expected.1));
    assert_eq!(overrides.len(), 2);
    assert!(overrides.iter().any(|o| o.ends_with(".title")));
    assert!(overrides.iter().any(|o| o.ends_with(".size")));
    assert!(lines.iter().any(|l| l.contains("title=String(\"local\")")));
    assert!(lines.iter().any(|l| l.contains("size=F32(20.0)")));
}

// ---------------------------------------------------------------------------
// Default sub-objects
// ---------------------------------------------------------------------------

#[rstest]
fn unwritten_subobjects_keep_their_position(
    #[values(FormatVersion::Ordered, FormatVersion::Named, FormatVersion::Keyed)] version: FormatVersion,
) {
    let classes = registry();
    let rack = classes.find("Rack").unwrap();
    let mut world = World::new(classes);
    let root = world.spawn(rack, None, "Rack").unwrap();
    let scratch = world.find_default_subobject(root, "Scratch").unwrap();
    world.set_flags(scratch, ObjectFlags::TRANSIENT, true);
    let frame = world.root_component(root).unwrap();
    world.write_property(frame, "title", Value::from("rack")).unwrap();

    let state = PrefabState::new();
    let written = GraphWriter::new(&world, &ReflectCodec, &state, Fidelity::Full)
        .write(root)
        .unwrap();
    let PlanContainer::Leaf(leaf) = &written.plan.root else {
        panic!("root record is not a leaf");
    };
    assert_eq!(leaf.subobjects.len(), 2);
    assert!(leaf.subobjects[0].id.is_nil());
    assert!(!leaf.subobjects[1].id.is_nil());
    let stored = StoredGraph::new(
        version,
        encode_payload_as(&written.plan, version, Encoding::Bincode).unwrap(),
        written.assets,
    );

    let mut target = World::new(registry());
    let loaded = PrefabEngine::new()
        .load_stored(&mut target, &stored, LoadOptions::new())
        .unwrap();
    let frame = target.root_component(loaded.root).unwrap();
    assert_eq!(target.name(frame), Some("Frame"));
    assert_eq!(target.property(frame, "title"), Some(&Value::from("rack")));
    let scratch = target.find_default_subobject(loaded.root, "Scratch").unwrap();
    assert_eq!(target.property(scratch, "size"), Some(&Value::F32(0.0)));
}
