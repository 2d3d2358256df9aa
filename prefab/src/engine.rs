//! The prefab engine: saving, loading, copying and upgrading graphs.
//!
//! # Example
//!
//! ```ignore
//! let engine = PrefabEngine::new();
//! let asset = PrefabAsset::new_ref("ui/menu.prefab");
//! let mut state = PrefabState::new();
//! engine.save(&world, menu, &asset, &mut state)?;
//!
//! let loaded = engine.load(&mut world, &asset, LoadOptions::new().with_parent(canvas))?;
//! ```

use tessera_world::{AssetRef, ObjectId, World};

use crate::asset::{PlatformStamp, PrefabAsset, StoredGraph};
use crate::codec::{Fidelity, PropertyCodec, ReflectCodec};
use crate::deserializer::{read_graph, ReadRequest, ReadyCallback};
use crate::error::{DeserializeError, PrefabError, SerializeError};
use crate::format::{decode_payload, encode_payload, Encoding, FormatVersion};
use crate::identity::IdentityMap;
use crate::overrides::{OverrideEditor, TemplateCache};
use crate::serializer::GraphWriter;
use crate::state::{PrefabState, SubPrefabInstance};

// ---------------------------------------------------------------------------
// LoadOptions
// ---------------------------------------------------------------------------

/// Per-load settings.
#[derive(Default)]
pub struct LoadOptions {
    parent: Option<ObjectId>,
    existing: IdentityMap,
    fidelity: Fidelity,
    allow_native: bool,
    before_ready: Vec<ReadyCallback>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the loaded root under `parent`, a spatial component or a
    /// container with a root component.
    pub fn with_parent(mut self, parent: ObjectId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Reuses these live objects instead of creating new ones.
    ///
    /// Typically the `ids` of a previous [`LoadedPrefab::state`], to reload
    /// a graph in place.
    pub fn with_existing(mut self, existing: IdentityMap) -> Self {
        self.existing = existing;
        self
    }

    /// The variant to read. Falls back to the other one if missing.
    pub fn with_fidelity(mut self, fidelity: Fidelity) -> Self {
        self.fidelity = fidelity;
        self
    }

    /// Runs `callback` with the root after linking, before the load's
    /// construction session ends.
    pub fn before_ready(mut self, callback: impl FnOnce(&mut World, ObjectId) + 'static) -> Self {
        self.before_ready.push(Box::new(callback));
        self
    }

    fn allow_native(mut self) -> Self {
        self.allow_native = true;
        self
    }
}

/// The result of a load.
#[derive(Debug)]
pub struct LoadedPrefab {
    pub root: ObjectId,
    /// Ids and sub-prefab instances, ready for the next save.
    pub state: PrefabState,
    /// Every container created or reused, nested sub-prefabs included.
    pub containers: Vec<ObjectId>,
}

// ---------------------------------------------------------------------------
// PrefabEngine
// ---------------------------------------------------------------------------

/// Saves live graphs to [`PrefabAsset`]s and loads them back.
///
/// The engine itself is stateless. Everything a graph needs between
/// operations lives in its [`PrefabState`].
#[derive(Clone, Copy)]
pub struct PrefabEngine<'c> {
    codec: &'c dyn PropertyCodec,
    encoding: Encoding,
}

impl Default for PrefabEngine<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefabEngine<'static> {
    /// An engine using the schema-driven [`ReflectCodec`].
    pub fn new() -> Self {
        Self::with_codec(&ReflectCodec)
    }
}

impl<'c> PrefabEngine<'c> {
    pub fn with_codec(codec: &'c dyn PropertyCodec) -> Self {
        Self {
            codec,
            encoding: Encoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn codec(&self) -> &'c dyn PropertyCodec {
        self.codec
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    // ---- Saving ----

    /// Serializes the graph rooted at `root` with the current format.
    ///
    /// Ids recorded in `state` are reused. Returns the stored graph and the
    /// ids this save assigned.
    pub fn serialize(
        &self,
        world: &World,
        root: ObjectId,
        state: &PrefabState,
        fidelity: Fidelity,
    ) -> Result<(StoredGraph, IdentityMap), SerializeError> {
        let written = GraphWriter::new(world, self.codec, state, fidelity).write(root)?;
        let payload = encode_payload(&written.plan, self.encoding)?;
        let stored = StoredGraph::new(FormatVersion::CURRENT, payload, written.assets);
        Ok((stored, written.ids))
    }

    /// Writes both variants of the graph into `asset` and records the
    /// assigned ids in `state`.
    pub fn save(
        &self,
        world: &World,
        root: ObjectId,
        asset: &AssetRef,
        state: &mut PrefabState,
    ) -> Result<(), SerializeError> {
        state.prune(world);
        let (full, ids) = self.serialize(world, root, state, Fidelity::Full)?;
        state.ids = ids;
        let (compact, _) = self.serialize(world, root, state, Fidelity::Compact)?;

        let mut prefab = asset
            .write::<PrefabAsset>()
            .ok_or_else(|| SerializeError::NotAPrefab(asset.path().to_string()))?;
        prefab.full = Some(full);
        prefab.compact = Some(compact);
        prefab.revision += 1;
        log::debug!("saved `{}` at revision {}", asset.path(), prefab.revision);
        Ok(())
    }

    // ---- Loading ----

    /// Loads `asset` into `world`.
    pub fn load(
        &self,
        world: &mut World,
        asset: &AssetRef,
        options: LoadOptions,
    ) -> Result<LoadedPrefab, DeserializeError> {
        let stored = stored_variant(asset, options.fidelity).inspect_err(|err| {
            log::error!("cannot load `{}`: {err}", asset.path());
        })?;
        self.read(world, &stored, options, Some(asset.clone()))
    }

    /// Loads a stored graph that is not wrapped in an asset.
    pub fn load_stored(
        &self,
        world: &mut World,
        stored: &StoredGraph,
        options: LoadOptions,
    ) -> Result<LoadedPrefab, DeserializeError> {
        self.read(world, stored, options, None)
    }

    fn read(
        &self,
        world: &mut World,
        stored: &StoredGraph,
        options: LoadOptions,
        source: Option<AssetRef>,
    ) -> Result<LoadedPrefab, DeserializeError> {
        let request = ReadRequest {
            parent: options.parent,
            existing: options.existing,
            fidelity: options.fidelity,
            allow_native: options.allow_native,
            before_ready: options.before_ready,
            source,
        };
        let graph = read_graph(world, self.codec, stored, request)?;
        Ok(LoadedPrefab {
            root: graph.root,
            state: PrefabState {
                ids: graph.ids,
                sub_prefabs: graph.sub_prefabs,
            },
            containers: graph.containers,
        })
    }

    /// Embeds a fresh instance of `asset` under `parent` as a sub-prefab of
    /// the graph `state` describes. Returns the instance root.
    pub fn instantiate_sub_prefab(
        &self,
        world: &mut World,
        state: &mut PrefabState,
        asset: &AssetRef,
        parent: ObjectId,
    ) -> Result<ObjectId, DeserializeError> {
        let loaded = self.load(world, asset, LoadOptions::new().with_parent(parent))?;
        let instance = SubPrefabInstance::new(asset.clone(), loaded.root, loaded.state.ids);
        state.sub_prefabs.insert(loaded.root, instance);
        log::debug!("instantiated `{}` as {}", asset.path(), loaded.root);
        Ok(loaded.root)
    }

    /// Copies the graph rooted at `root` within the same process.
    ///
    /// Unlike a save/load cycle, native handles survive the copy.
    pub fn duplicate(
        &self,
        world: &mut World,
        root: ObjectId,
        state: &PrefabState,
        parent: Option<ObjectId>,
    ) -> Result<LoadedPrefab, PrefabError> {
        let written = GraphWriter::new(world, self.codec, state, Fidelity::Full)
            .allow_native(true)
            .write(root)?;
        let payload = encode_payload(&written.plan, self.encoding)?;
        let stored = StoredGraph::new(FormatVersion::CURRENT, payload, written.assets);

        let mut options = LoadOptions::new().allow_native();
        if let Some(parent) = parent {
            options = options.with_parent(parent);
        }
        Ok(self.load_stored(world, &stored, options)?)
    }

    /// Re-encodes every variant of `asset` stored with an older format.
    ///
    /// Returns `true` if anything was rewritten.
    pub fn upgrade(&self, asset: &AssetRef) -> Result<bool, PrefabError> {
        let mut prefab = asset
            .write::<PrefabAsset>()
            .ok_or_else(|| DeserializeError::NotAPrefab(asset.path().to_string()))?;

        let mut upgraded = false;
        for fidelity in [Fidelity::Full, Fidelity::Compact] {
            let Some(stored) = prefab.variant_mut(fidelity).as_mut() else {
                continue;
            };
            if stored.is_current() {
                continue;
            }
            let (from, plan) = decode_payload(&stored.payload)?;
            stored.payload = encode_payload(&plan, self.encoding)?;
            stored.version = FormatVersion::CURRENT;
            stored.stamp = PlatformStamp::current(FormatVersion::CURRENT);
            log::debug!("upgraded {fidelity:?} variant of `{}` from {from}", asset.path());
            upgraded = true;
        }
        if upgraded {
            prefab.revision += 1;
        }
        Ok(upgraded)
    }

    // ---- Overrides ----

    /// An override editor that reads and writes source templates through
    /// `cache`.
    pub fn overrides<'e>(&'e self, cache: &'e mut TemplateCache) -> OverrideEditor<'e> {
        OverrideEditor::new(self, cache)
    }
}

/// The stored graph of `asset` for `fidelity`, or the other variant.
pub(crate) fn stored_variant(asset: &AssetRef, fidelity: Fidelity) -> Result<StoredGraph, DeserializeError> {
    let prefab = asset
        .read::<PrefabAsset>()
        .ok_or_else(|| DeserializeError::NotAPrefab(asset.path().to_string()))?;
    prefab
        .best_variant(fidelity)
        .cloned()
        .ok_or_else(|| DeserializeError::MissingVariant(asset.path().to_string()))
}
