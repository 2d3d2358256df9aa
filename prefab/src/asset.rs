//! Persisted prefab assets.

use bytes::Bytes;
use tessera_world::AssetRef;

use crate::codec::Fidelity;
use crate::format::FormatVersion;

/// Where and with what a stored graph was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformStamp {
    pub engine_version: String,
    pub os: String,
    pub arch: String,
    pub format: FormatVersion,
}

impl PlatformStamp {
    /// The stamp of this build, for payloads written with `format`.
    pub fn current(format: FormatVersion) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            format,
        }
    }
}

/// One encoded graph plus the live asset handles its payload indexes.
#[derive(Debug, Clone)]
pub struct StoredGraph {
    pub version: FormatVersion,
    /// Header, interned class and name lists, container tree and records.
    pub payload: Bytes,
    /// Asset reference list, addressed by index from the payload.
    pub assets: Vec<AssetRef>,
    pub stamp: PlatformStamp,
}

impl StoredGraph {
    pub fn new(version: FormatVersion, payload: Bytes, assets: Vec<AssetRef>) -> Self {
        Self {
            version,
            payload,
            assets,
            stamp: PlatformStamp::current(version),
        }
    }

    pub fn is_current(&self) -> bool {
        self.version == FormatVersion::CURRENT
    }
}

/// The stored form of a prefab: a full-fidelity and a compact variant.
///
/// Prefab assets are shared as [`AssetRef`]s whose payload is a
/// `PrefabAsset`; sub-graph records point at them by asset index.
#[derive(Debug, Clone, Default)]
pub struct PrefabAsset {
    pub full: Option<StoredGraph>,
    pub compact: Option<StoredGraph>,
    /// Bumped on every save.
    pub revision: u64,
}

impl PrefabAsset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an empty prefab in a shareable asset handle.
    pub fn new_ref(path: impl Into<String>) -> AssetRef {
        AssetRef::new(path, Self::new())
    }

    pub fn variant(&self, fidelity: Fidelity) -> Option<&StoredGraph> {
        match fidelity {
            Fidelity::Full => self.full.as_ref(),
            Fidelity::Compact => self.compact.as_ref(),
        }
    }

    /// The requested variant, or the other one if it is missing.
    pub fn best_variant(&self, fidelity: Fidelity) -> Option<&StoredGraph> {
        self.variant(fidelity).or_else(|| {
            let other = match fidelity {
                Fidelity::Full => Fidelity::Compact,
                Fidelity::Compact => Fidelity::Full,
            };
            let fallback = self.variant(other);
            if fallback.is_some() {
                log::debug!("{fidelity:?} variant missing, using {other:?}");
            }
            fallback
        })
    }

    pub fn variant_mut(&mut self, fidelity: Fidelity) -> &mut Option<StoredGraph> {
        match fidelity {
            Fidelity::Full => &mut self.full,
            Fidelity::Compact => &mut self.compact,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_none() && self.compact.is_none()
    }
}
