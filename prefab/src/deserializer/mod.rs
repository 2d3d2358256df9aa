//! Payload to live graph.
//!
//! Every stored graph loads in three phases:
//!
//! 1. **Generate** ([`generate`]): create or reuse every container and
//!    object, registering each stable id before any property is read.
//!    Embedded sub-graphs are loaded recursively here and merged into this
//!    graph's id space through their remap tables.
//! 2. **Restore** ([`restore`]): decode every blob against the now complete
//!    identity map, then reapply sub-graph overrides.
//! 3. **Link** ([`link`]): spatial attachments, then, for the outermost load
//!    only, the root attachment, post-load hooks, ready callbacks and the end
//!    of the construction session.
//!
//! Every object created during a load, including inside nested sub-graphs,
//! stays registered with the world's construction registry until the
//! outermost load finishes.

mod generate;
mod link;
mod restore;

use std::collections::HashSet;

use indexmap::IndexMap;
use tessera_world::{AssetRef, ClassId, ObjectId, SessionId, World};

use crate::asset::StoredGraph;
use crate::codec::{Fidelity, PropertyCodec, ReferenceReader};
use crate::error::DeserializeError;
use crate::format::{decode_payload, FormatVersion, GraphPlan, PlanContainer, PlanOverride};
use crate::id::StableId;
use crate::identity::IdentityMap;
use crate::state::SubPrefabInstance;

/// Called with the loaded root right before the session ends.
pub(crate) type ReadyCallback = Box<dyn FnOnce(&mut World, ObjectId)>;

pub(crate) struct ReadRequest {
    pub parent: Option<ObjectId>,
    /// Live objects to reuse, keyed by this graph's ids.
    pub existing: IdentityMap,
    /// Variant to prefer for embedded sub-graphs.
    pub fidelity: Fidelity,
    pub allow_native: bool,
    pub before_ready: Vec<ReadyCallback>,
    /// The asset being read, so that it cannot embed itself.
    pub source: Option<AssetRef>,
}

/// A graph reconstructed by one (possibly nested) read.
pub(crate) struct LoadedGraph {
    pub root: ObjectId,
    pub ids: IdentityMap,
    pub containers: Vec<ObjectId>,
    pub sub_prefabs: IndexMap<ObjectId, SubPrefabInstance>,
}

/// Loads `stored` into `world`.
pub(crate) fn read_graph(
    world: &mut World,
    codec: &dyn PropertyCodec,
    stored: &StoredGraph,
    request: ReadRequest,
) -> Result<LoadedGraph, DeserializeError> {
    let result = read_outer(world, codec, stored, request);
    if let Err(err) = &result {
        log::error!("prefab load failed: {err}");
    }
    result
}

fn read_outer(
    world: &mut World,
    codec: &dyn PropertyCodec,
    stored: &StoredGraph,
    request: ReadRequest,
) -> Result<LoadedGraph, DeserializeError> {
    if stored.payload.is_empty() {
        return Err(DeserializeError::EmptyPayload);
    }
    let parent = link::resolve_parent(world, request.parent)?;
    let (version, plan) = decode_payload(&stored.payload)?;

    let session = world.construction_mut().begin_session();
    let mut reader = GraphReader {
        codec,
        fidelity: request.fidelity,
        allow_native: request.allow_native,
        session,
        asset_stack: request.source.into_iter().collect(),
        post_load: Vec::new(),
    };
    let graph = match reader.read(world, &plan, &stored.assets, &request.existing, version) {
        Ok(graph) => graph,
        Err(err) => {
            world.construction_mut().end_session(session);
            return Err(err);
        }
    };
    reader.finish(world, &graph, parent, request.before_ready);
    Ok(graph)
}

// ---------------------------------------------------------------------------
// GraphReader
// ---------------------------------------------------------------------------

/// Session-wide state shared by the outermost read and every nested one.
pub(crate) struct GraphReader<'a> {
    codec: &'a dyn PropertyCodec,
    fidelity: Fidelity,
    allow_native: bool,
    session: SessionId,
    /// Sub-prefab assets being read, outermost first.
    asset_stack: Vec<AssetRef>,
    /// Components created during the session, for post-load hooks.
    post_load: Vec<ObjectId>,
}

impl GraphReader<'_> {
    /// Runs all three phases for one graph.
    fn read(
        &mut self,
        world: &mut World,
        plan: &GraphPlan,
        assets: &[AssetRef],
        existing: &IdentityMap,
        version: FormatVersion,
    ) -> Result<LoadedGraph, DeserializeError> {
        let mut load = GraphLoad::new(world, plan, assets, existing);
        let root = self.generate(world, &mut load)?;

        if version.restores_before_construction() {
            self.restore(world, &mut load);
            load.construct(world);
        } else {
            load.construct(world);
            self.restore(world, &mut load);
        }

        self.link(world, &load, root);
        log::debug!(
            "loaded {} graph: {} ids, {} containers, {} sub-prefabs",
            version,
            load.ids.len(),
            load.containers.len(),
            load.sub_prefabs.len()
        );
        Ok(load.into_graph(root))
    }
}

// ---------------------------------------------------------------------------
// GraphLoad
// ---------------------------------------------------------------------------

/// Working state of one graph's load.
struct GraphLoad<'p> {
    plan: &'p GraphPlan,
    assets: &'p [AssetRef],
    existing: &'p IdentityMap,
    /// `plan.classes` resolved against the world's registry.
    classes: Vec<Option<ClassId>>,
    /// Ids of records that take part in spatial attachment.
    spatial: HashSet<StableId>,
    ids: IdentityMap,
    containers: Vec<ObjectId>,
    /// Objects spawned for this graph's own records, in creation order.
    spawned: Vec<ObjectId>,
    /// `(container, root component id)` links to set once components exist.
    root_links: Vec<(ObjectId, StableId)>,
    /// Blobs to restore: containers, then components, then objects.
    restores: Vec<(ObjectId, &'p [u8])>,
    sub_prefabs: IndexMap<ObjectId, SubPrefabInstance>,
    overrides: Vec<(ObjectId, &'p [PlanOverride])>,
}

impl<'p> GraphLoad<'p> {
    fn new(world: &World, plan: &'p GraphPlan, assets: &'p [AssetRef], existing: &'p IdentityMap) -> Self {
        let registry = world.classes();
        let classes = plan.classes.iter().map(|name| registry.find(name)).collect();

        let mut spatial = HashSet::new();
        for (child, parent) in &plan.spatial_parents {
            spatial.insert(*child);
            spatial.insert(*parent);
        }
        let mut stack = vec![&plan.root];
        while let Some(container) = stack.pop() {
            if let PlanContainer::Leaf(leaf) = container {
                spatial.extend(leaf.root_component);
                stack.extend(&leaf.children);
            }
        }

        Self {
            plan,
            assets,
            existing,
            classes,
            spatial,
            ids: IdentityMap::new(),
            containers: Vec::new(),
            spawned: Vec::new(),
            root_links: Vec::new(),
            restores: Vec::new(),
            sub_prefabs: IndexMap::new(),
            overrides: Vec::new(),
        }
    }

    /// Runs construction logic for everything spawned by this graph.
    fn construct(&self, world: &mut World) {
        for &object in &self.spawned {
            world.finish_construction(object);
        }
    }

    fn into_graph(self, root: ObjectId) -> LoadedGraph {
        LoadedGraph {
            root,
            ids: self.ids,
            containers: self.containers,
            sub_prefabs: self.sub_prefabs,
        }
    }
}

// ---------------------------------------------------------------------------
// ReadRefs
// ---------------------------------------------------------------------------

struct ReadRefs<'r> {
    ids: &'r IdentityMap,
    assets: &'r [AssetRef],
    classes: &'r [Option<ClassId>],
    names: &'r [String],
    allow_native: bool,
}

fn slot<T>(items: &[T], index: i32) -> Option<&T> {
    usize::try_from(index).ok().and_then(|i| items.get(i))
}

impl ReferenceReader for ReadRefs<'_> {
    fn object(&self, id: StableId) -> Option<ObjectId> {
        self.ids.object(id)
    }

    fn asset(&self, index: i32) -> Option<AssetRef> {
        slot(self.assets, index).cloned()
    }

    fn class(&self, index: i32) -> Option<ClassId> {
        slot(self.classes, index).copied().flatten()
    }

    fn name(&self, index: i32) -> Option<&str> {
        slot(self.names, index).map(String::as_str)
    }

    fn allows_native(&self) -> bool {
        self.allow_native
    }
}
