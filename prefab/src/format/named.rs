//! Generation 2: record lists with display names.
//!
//! Every record carries its property blob inline. Components carry their
//! spatial parent; attachments of embedded sub-graph roots are listed
//! separately because those components have no record of their own.

use serde::{Deserialize, Serialize};

use super::{
    encoding, fidelity_of, flags_of, resolve_name, resolve_names, Encoding, FormatVersion,
    GraphDecoder, GraphPlan, PlanContainer, PlanLeaf, PlanObject, PlanOverride, PlanSubGraph,
    PlanSubobject,
};
use crate::error::DeserializeError;
use crate::id::StableId;
use crate::identity::RemapTable;

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct NamedGraph {
    compact: bool,
    classes: Vec<String>,
    names: Vec<String>,
    root: NamedContainer,
    components: Vec<NamedComponent>,
    objects: Vec<NamedObject>,
    /// `(sub-graph root component, parent component)` pairs.
    subgraph_attachments: Vec<(StableId, StableId)>,
}

#[derive(Debug, Serialize, Deserialize)]
enum NamedContainer {
    Leaf {
        class: i32,
        id: StableId,
        name: i32,
        flags: u32,
        data: Vec<u8>,
        root_component: Option<StableId>,
        subobjects: Vec<(StableId, i32)>,
        children: Vec<NamedContainer>,
    },
    SubGraph {
        asset: i32,
        id: StableId,
        remap: RemapTable,
        overrides: Vec<NamedOverride>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedObject {
    class: i32,
    id: StableId,
    name: i32,
    flags: u32,
    owner: StableId,
    data: Vec<u8>,
    subobjects: Vec<(StableId, i32)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedComponent {
    object: NamedObject,
    spatial_parent: Option<StableId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedOverride {
    target: StableId,
    names: Vec<i32>,
    data: Vec<u8>,
}

pub(super) struct NamedDecoder;

impl GraphDecoder for NamedDecoder {
    fn version(&self) -> FormatVersion {
        FormatVersion::Named
    }

    fn decode(&self, body: &[u8], encoding: Encoding) -> Result<GraphPlan, DeserializeError> {
        let graph: NamedGraph = encoding::decode(body, encoding)?;
        let names = graph.names;
        let root = decode_container(graph.root, &names);

        let mut spatial_parents = Vec::new();
        let components = graph
            .components
            .into_iter()
            .map(|component| {
                if let Some(parent) = component.spatial_parent {
                    spatial_parents.push((component.object.id, parent));
                }
                decode_object(component.object, &names)
            })
            .collect();
        spatial_parents.extend(graph.subgraph_attachments);
        let objects = graph
            .objects
            .into_iter()
            .map(|object| decode_object(object, &names))
            .collect();

        Ok(GraphPlan {
            fidelity: fidelity_of(graph.compact),
            classes: graph.classes,
            names,
            root,
            components,
            objects,
            spatial_parents,
        })
    }
}

fn decode_subobjects(subobjects: Vec<(StableId, i32)>, names: &[String]) -> Vec<PlanSubobject> {
    subobjects
        .into_iter()
        .map(|(id, name)| PlanSubobject {
            id,
            name: resolve_name(names, name),
        })
        .collect()
}

fn decode_object(object: NamedObject, names: &[String]) -> PlanObject {
    PlanObject {
        class: object.class,
        id: object.id,
        name: resolve_name(names, object.name),
        flags: flags_of(object.flags),
        owner: object.owner,
        subobjects: decode_subobjects(object.subobjects, names),
        data: object.data,
    }
}

fn decode_container(container: NamedContainer, names: &[String]) -> PlanContainer {
    match container {
        NamedContainer::Leaf {
            class,
            id,
            name,
            flags,
            data,
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
            data,
            children: children
                .into_iter()
                .map(|child| decode_container(child, names))
                .collect(),
        }),
        NamedContainer::SubGraph {
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
                .map(|o| PlanOverride {
                    target: o.target,
                    names: resolve_names(names, &o.names),
                    data: o.data,
                })
                .collect(),
        }),
    }
}

/// Writes `plan` as a generation-2 body.
#[cfg(test)]
pub(super) fn encode(plan: &GraphPlan) -> NamedGraph {
    use std::collections::HashMap;

    use super::name_index;
    use crate::codec::Fidelity;
    use crate::interner::Interner;

    fn container(c: &PlanContainer, names: &mut Interner<String>) -> NamedContainer {
        match c {
            PlanContainer::Leaf(leaf) => NamedContainer::Leaf {
                class: leaf.class,
                id: leaf.id,
                name: name_index(names, &leaf.name),
                flags: leaf.flags.bits(),
                data: leaf.data.clone(),
                root_component: leaf.root_component,
                subobjects: subobjects(&leaf.subobjects, names),
                children: leaf.children.iter().map(|c| container(c, names)).collect(),
            },
            PlanContainer::SubGraph(sub) => NamedContainer::SubGraph {
                asset: sub.asset,
                id: sub.id,
                remap: sub.remap.clone(),
                overrides: sub
                    .overrides
                    .iter()
                    .map(|o| NamedOverride {
                        target: o.target,
                        names: o.names.iter().map(|n| names.find_or_add(n)).collect(),
                        data: o.data.clone(),
                    })
                    .collect(),
            },
        }
    }

    fn subobjects(subs: &[PlanSubobject], names: &mut Interner<String>) -> Vec<(StableId, i32)> {
        subs.iter().map(|s| (s.id, name_index(names, &s.name))).collect()
    }

    fn object(o: &PlanObject, names: &mut Interner<String>) -> NamedObject {
        NamedObject {
            class: o.class,
            id: o.id,
            name: name_index(names, &o.name),
            flags: o.flags.bits(),
            owner: o.owner,
            data: o.data.clone(),
            subobjects: subobjects(&o.subobjects, names),
        }
    }

    let mut names = Interner::from_vec(plan.names.clone());
    let root = container(&plan.root, &mut names);
    let mut parents: HashMap<StableId, StableId> = plan.spatial_parents.iter().copied().collect();
    let components = plan
        .components
        .iter()
        .map(|c| NamedComponent {
            object: object(c, &mut names),
            spatial_parent: parents.remove(&c.id),
        })
        .collect();
    let objects = plan.objects.iter().map(|o| object(o, &mut names)).collect();
    let subgraph_attachments = plan
        .spatial_parents
        .iter()
        .filter(|(child, _)| parents.contains_key(child))
        .copied()
        .collect();

    NamedGraph {
        compact: plan.fidelity == Fidelity::Compact,
        classes: plan.classes.clone(),
        names: names.into_vec(),
        root,
        components,
        objects,
        subgraph_attachments,
    }
}
