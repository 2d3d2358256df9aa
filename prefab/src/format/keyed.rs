//! Generation 3: id-keyed maps.
//!
//! Records are keyed by stable id in insertion-ordered maps, so records can
//! be reordered or dropped without invalidating anything positional.
//! Property blobs live in their own map, which lets the loader construct
//! each object only after its blob has been applied.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    encoding, fidelity_of, flags_of, name_index, resolve_name, resolve_names, Encoding,
    FormatVersion, GraphDecoder, GraphPlan, PlanContainer, PlanLeaf, PlanObject, PlanOverride,
    PlanSubGraph, PlanSubobject,
};
use crate::codec::Fidelity;
use crate::error::DeserializeError;
use crate::id::StableId;
use crate::identity::RemapTable;
use crate::interner::Interner;

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct KeyedGraph {
    compact: bool,
    classes: Vec<String>,
    names: Vec<String>,
    root: KeyedContainer,
    components: IndexMap<StableId, KeyedObject>,
    objects: IndexMap<StableId, KeyedObject>,
    property_data: IndexMap<StableId, Vec<u8>>,
    /// Child component id to parent component id.
    spatial_parents: IndexMap<StableId, StableId>,
}

#[derive(Debug, Serialize, Deserialize)]
enum KeyedContainer {
    Leaf {
        class: i32,
        id: StableId,
        name: i32,
        flags: u32,
        root_component: Option<StableId>,
        subobjects: Vec<(i32, StableId)>,
        children: Vec<KeyedContainer>,
    },
    SubGraph {
        asset: i32,
        id: StableId,
        remap: RemapTable,
        overrides: IndexMap<StableId, KeyedOverride>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyedObject {
    class: i32,
    name: i32,
    flags: u32,
    owner: StableId,
    subobjects: Vec<(i32, StableId)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyedOverride {
    names: Vec<i32>,
    data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub(super) fn encode(plan: &GraphPlan) -> KeyedGraph {
    let mut names = Interner::from_vec(plan.names.clone());
    let mut property_data = IndexMap::new();
    let root = encode_container(&plan.root, &mut names, &mut property_data);

    let mut encode_objects = |records: &[PlanObject]| {
        records
            .iter()
            .map(|record| {
                property_data.insert(record.id, record.data.clone());
                let object = KeyedObject {
                    class: record.class,
                    name: name_index(&mut names, &record.name),
                    flags: record.flags.bits(),
                    owner: record.owner,
                    subobjects: encode_subobjects(&record.subobjects, &mut names),
                };
                (record.id, object)
            })
            .collect::<IndexMap<_, _>>()
    };
    let components = encode_objects(&plan.components);
    let objects = encode_objects(&plan.objects);

    KeyedGraph {
        compact: plan.fidelity == Fidelity::Compact,
        classes: plan.classes.clone(),
        names: names.into_vec(),
        root,
        components,
        objects,
        property_data,
        spatial_parents: plan.spatial_parents.iter().copied().collect(),
    }
}

fn encode_subobjects(subobjects: &[PlanSubobject], names: &mut Interner<String>) -> Vec<(i32, StableId)> {
    subobjects
        .iter()
        .map(|sub| (name_index(names, &sub.name), sub.id))
        .collect()
}

fn encode_container(
    container: &PlanContainer,
    names: &mut Interner<String>,
    property_data: &mut IndexMap<StableId, Vec<u8>>,
) -> KeyedContainer {
    match container {
        PlanContainer::Leaf(leaf) => {
            property_data.insert(leaf.id, leaf.data.clone());
            KeyedContainer::Leaf {
                class: leaf.class,
                id: leaf.id,
                name: name_index(names, &leaf.name),
                flags: leaf.flags.bits(),
                root_component: leaf.root_component,
                subobjects: encode_subobjects(&leaf.subobjects, names),
                children: leaf
                    .children
                    .iter()
                    .map(|child| encode_container(child, names, property_data))
                    .collect(),
            }
        }
        PlanContainer::SubGraph(sub) => KeyedContainer::SubGraph {
            asset: sub.asset,
            id: sub.id,
            remap: sub.remap.clone(),
            overrides: sub
                .overrides
                .iter()
                .map(|o| {
                    let entry = KeyedOverride {
                        names: o.names.iter().map(|n| names.find_or_add(n)).collect(),
                        data: o.data.clone(),
                    };
                    (o.target, entry)
                })
                .collect(),
        },
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub(super) struct KeyedDecoder;

impl GraphDecoder for KeyedDecoder {
    fn version(&self) -> FormatVersion {
        FormatVersion::Keyed
    }

    fn decode(&self, body: &[u8], encoding: Encoding) -> Result<GraphPlan, DeserializeError> {
        let mut graph: KeyedGraph = encoding::decode(body, encoding)?;
        let names = std::mem::take(&mut graph.names);
        let mut data = std::mem::take(&mut graph.property_data);
        let root = decode_container(graph.root, &names, &mut data);

        let mut decode_objects = |records: IndexMap<StableId, KeyedObject>| {
            records
                .into_iter()
                .map(|(id, record)| PlanObject {
                    class: record.class,
                    id,
                    name: resolve_name(&names, record.name),
                    flags: flags_of(record.flags),
                    owner: record.owner,
                    subobjects: decode_subobjects(record.subobjects, &names),
                    data: data.shift_remove(&id).unwrap_or_default(),
                })
                .collect::<Vec<_>>()
        };
        let components = decode_objects(graph.components);
        let objects = decode_objects(graph.objects);

        Ok(GraphPlan {
            fidelity: fidelity_of(graph.compact),
            classes: graph.classes,
            names,
            root,
            components,
            objects,
            spatial_parents: graph.spatial_parents.into_iter().collect(),
        })
    }
}

fn decode_subobjects(subobjects: Vec<(i32, StableId)>, names: &[String]) -> Vec<PlanSubobject> {
    subobjects
        .into_iter()
        .map(|(name, id)| PlanSubobject {
            id,
            name: resolve_name(names, name),
        })
        .collect()
}

fn decode_container(
    container: KeyedContainer,
    names: &[String],
    data: &mut IndexMap<StableId, Vec<u8>>,
) -> PlanContainer {
    match container {
        KeyedContainer::Leaf {
            class,
            id,
            name,
            flags,
            root_component,
            subobjects,
            children,
        } => PlanContainer::Leaf(PlanLeaf {
            class,
            id,
            name: resolve_name(names, name),
            flags: flags_of(flags),
            root_component,
            subobjects: decode_subobjects(subobjects, names),
            data: data.shift_remove(&id).unwrap_or_default(),
            children: children
                .into_iter()
                .map(|child| decode_container(child, names, data))
                .collect(),
        }),
        KeyedContainer::SubGraph {
            asset,
            id,
            remap,
            overrides,
        } => PlanContainer::SubGraph(PlanSubGraph {
            asset,
            id,
            remap,
            overrides: overrides
                .into_iter()
                .map(|(target, entry)| PlanOverride {
                    target,
                    names: resolve_names(names, &entry.names),
                    data: entry.data,
                })
                .collect(),
        }),
    }
}
