//! Generation 1: parallel positional arrays.
//!
//! Records are split into one array per column and must stay aligned.
//! No display names are stored; default sub-objects are listed in the
//! order the runtime creates them and matched by position.

use serde::{Deserialize, Serialize};

use super::{
    encoding, fidelity_of, flags_of, resolve_names, Encoding, FormatVersion, GraphDecoder,
    GraphPlan, PlanContainer, PlanLeaf, PlanObject, PlanOverride, PlanSubGraph, PlanSubobject,
};
use crate::error::DeserializeError;
use crate::id::StableId;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Columns {
    ids: Vec<StableId>,
    classes: Vec<i32>,
    flags: Vec<u32>,
    owners: Vec<StableId>,
    data: Vec<Vec<u8>>,
    subobjects: Vec<Vec<StableId>>,
}

impl Columns {
    fn len(&self) -> Result<usize, DeserializeError> {
        let len = self.ids.len();
        let aligned = [
            self.classes.len(),
            self.flags.len(),
            self.owners.len(),
            self.data.len(),
            self.subobjects.len(),
        ]
        .iter()
        .all(|&l| l == len);
        if !aligned {
            return Err(DeserializeError::Decode(
                "record columns have different lengths".to_string(),
            ));
        }
        Ok(len)
    }

    fn into_records(self) -> Result<Vec<PlanObject>, DeserializeError> {
        self.len()?;
        let records = self
            .ids
            .into_iter()
            .zip(self.classes)
            .zip(self.flags)
            .zip(self.owners)
            .zip(self.data)
            .zip(self.subobjects)
            .map(|(((((id, class), flags), owner), data), subobjects)| PlanObject {
                class,
                id,
                name: None,
                flags: flags_of(flags),
                owner,
                subobjects: unnamed(subobjects),
                data,
            })
            .collect();
        Ok(records)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct OrderedGraph {
    compact: bool,
    classes: Vec<String>,
    names: Vec<String>,
    root: OrderedContainer,
    components: Columns,
    /// Aligned with `components`.
    component_parents: Vec<Option<StableId>>,
    objects: Columns,
    subgraph_attachments: Vec<(StableId, StableId)>,
}

#[derive(Debug, Serialize, Deserialize)]
enum OrderedContainer {
    Leaf {
        class: i32,
        id: StableId,
        flags: u32,
        data: Vec<u8>,
        root_component: Option<StableId>,
        subobjects: Vec<StableId>,
        children: Vec<OrderedContainer>,
    },
    SubGraph {
        asset: i32,
        id: StableId,
        remap: Vec<(StableId, StableId)>,
        overrides: Vec<(StableId, Vec<i32>, Vec<u8>)>,
    },
}

fn unnamed(ids: Vec<StableId>) -> Vec<PlanSubobject> {
    ids.into_iter()
        .map(|id| PlanSubobject { id, name: None })
        .collect()
}

pub(super) struct OrderedDecoder;

impl GraphDecoder for OrderedDecoder {
    fn version(&self) -> FormatVersion {
        FormatVersion::Ordered
    }

    fn decode(&self, body: &[u8], encoding: Encoding) -> Result<GraphPlan, DeserializeError> {
        let graph: OrderedGraph = encoding::decode(body, encoding)?;
        if graph.component_parents.len() != graph.components.ids.len() {
            return Err(DeserializeError::Decode(
                "component parents are not aligned with components".to_string(),
            ));
        }
        let root = decode_container(graph.root, &graph.names);

        let mut spatial_parents: Vec<(StableId, StableId)> = graph
            .components
            .ids
            .iter()
            .zip(&graph.component_parents)
            .filter_map(|(child, parent)| parent.map(|p| (*child, p)))
            .collect();
        spatial_parents.extend(graph.subgraph_attachments);

        Ok(GraphPlan {
            fidelity: fidelity_of(graph.compact),
            classes: graph.classes,
            names: graph.names,
            root,
            components: graph.components.into_records()?,
            objects: graph.objects.into_records()?,
            spatial_parents,
        })
    }
}

fn decode_container(container: OrderedContainer, names: &[String]) -> PlanContainer {
    match container {
        OrderedContainer::Leaf {
            class,
            id,
            flags,
            data,
            root_component,
            subobjects,
            children,
        } => PlanContainer::Leaf(PlanLeaf {
            class,
            id,
            name: None,
            flags: flags_of(flags),
            root_component,
            subobjects: unnamed(subobjects),
            data,
            children: children
                .into_iter()
                .map(|child| decode_container(child, names))
                .collect(),
        }),
        OrderedContainer::SubGraph {
            asset,
            id,
            remap,
            overrides,
        } => PlanContainer::SubGraph(PlanSubGraph {
            asset,
            id,
            remap: remap.into(),
            overrides: overrides
                .into_iter()
                .map(|(target, indices, data)| PlanOverride {
                    target,
                    names: resolve_names(names, &indices),
                    data,
                })
                .collect(),
        }),
    }
}

/// Writes `plan` as a generation-1 body. Display names are lost.
#[cfg(test)]
pub(super) fn encode(plan: &GraphPlan) -> OrderedGraph {
    use std::collections::HashMap;

    use crate::codec::Fidelity;
    use crate::interner::Interner;

    fn container(c: &PlanContainer, names: &mut Interner<String>) -> OrderedContainer {
        match c {
            PlanContainer::Leaf(leaf) => OrderedContainer::Leaf {
                class: leaf.class,
                id: leaf.id,
                flags: leaf.flags.bits(),
                data: leaf.data.clone(),
                root_component: leaf.root_component,
                subobjects: leaf.subobjects.iter().map(|s| s.id).collect(),
                children: leaf.children.iter().map(|c| container(c, names)).collect(),
            },
            PlanContainer::SubGraph(sub) => OrderedContainer::SubGraph {
                asset: sub.asset,
                id: sub.id,
                remap: sub.remap.clone().into(),
                overrides: sub
                    .overrides
                    .iter()
                    .map(|o| {
                        let indices = o.names.iter().map(|n| names.find_or_add(n)).collect();
                        (o.target, indices, o.data.clone())
                    })
                    .collect(),
            },
        }
    }

    fn columns(records: &[PlanObject]) -> Columns {
        let mut columns = Columns::default();
        for r in records {
            columns.ids.push(r.id);
            columns.classes.push(r.class);
            columns.flags.push(r.flags.bits());
            columns.owners.push(r.owner);
            columns.data.push(r.data.clone());
            columns.subobjects.push(r.subobjects.iter().map(|s| s.id).collect());
        }
        columns
    }

    let mut names = Interner::from_vec(plan.names.clone());
    let root = container(&plan.root, &mut names);
    let mut parents: HashMap<StableId, StableId> = plan.spatial_parents.iter().copied().collect();
    let component_parents = plan.components.iter().map(|c| parents.remove(&c.id)).collect();
    let subgraph_attachments = plan
        .spatial_parents
        .iter()
        .filter(|(child, _)| parents.contains_key(child))
        .copied()
        .collect();

    OrderedGraph {
        compact: plan.fidelity == Fidelity::Compact,
        classes: plan.classes.clone(),
        names: names.into_vec(),
        root,
        components: columns(&plan.components),
        component_parents,
        objects: columns(&plan.objects),
        subgraph_attachments,
    }
}
