//! # Tessera Prefab
//!
//! Saves graphs of live [`tessera_world`] objects into self-contained
//! payloads and loads them back, with embedded sub-prefabs and per-instance
//! property overrides.
//!
//! ## Core Types
//!
//! - [`PrefabEngine`]: save, load, duplicate and upgrade entry points
//! - [`PrefabAsset`] / [`StoredGraph`]: persisted full and compact variants
//! - [`PrefabState`]: stable ids and sub-prefab instances of one live graph
//! - [`StableId`] / [`IdentityMap`]: process-independent object identity
//! - [`PropertyCodec`]: per-object blob encoding, [`ReflectCodec`] by default
//!
//! ## Sub-prefabs
//!
//! - [`SubPrefabInstance`]: an embedded copy of another prefab, turned back
//!   into plain objects by [`PrefabState::unlink_sub_prefab`]
//! - [`OverrideTable`]: properties an instance keeps locally
//! - [`OverrideEditor`]: revert to and apply into the source prefab
//!
//! ## Formats
//!
//! Three payload generations can be read ([`FormatVersion`]); only
//! [`FormatVersion::CURRENT`] is written. [`PrefabEngine::upgrade`] rewrites
//! older payloads in place.
//!
//! # Example
//!
//! ```ignore
//! let engine = PrefabEngine::new();
//! let asset = PrefabAsset::new_ref("ui/menu.prefab");
//! let mut state = PrefabState::new();
//! engine.save(&world, menu, &asset, &mut state)?;
//!
//! let mut other = World::new(classes);
//! let loaded = engine.load(&mut other, &asset, LoadOptions::new())?;
//! ```

mod asset;
pub mod codec;
mod collect;
mod deserializer;
mod engine;
mod error;
pub mod format;
mod id;
pub mod identity;
pub mod interner;
pub mod overrides;
mod serializer;
mod state;

pub use asset::{PlatformStamp, PrefabAsset, StoredGraph};
pub use codec::{
    BlobReader, BlobWriter, Fidelity, PropertyCodec, PropertyFilter, PropertyScope, RefTag,
    ReferenceReader, ReferenceWriter, ReflectCodec, SPATIAL_PARENT_PROPERTY,
};
pub use collect::Collector;
pub use engine::{LoadOptions, LoadedPrefab, PrefabEngine};
pub use error::{CodecError, DeserializeError, OverrideError, PrefabError, SerializeError};
pub use format::{Encoding, FormatVersion, MAGIC};
pub use id::StableId;
pub use identity::{IdentityMap, RemapTable};
pub use interner::{Interner, NONE_INDEX, ReferenceTable};
pub use overrides::{OverrideEditor, OverrideTable, TemplateCache};
pub use state::{PrefabState, SubPrefabInstance};
