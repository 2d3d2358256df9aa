//! Payload formats.
//!
//! Every stored graph starts with a small header (see [`encoding`]) naming
//! the [`FormatVersion`] that wrote it. Each generation has its own wire
//! structs in its own module and decodes through [`GraphDecoder`] into a
//! [`GraphPlan`], the version-neutral description the loader works from.
//! Only [`FormatVersion::CURRENT`] is ever written.
//!
//! | Version   | Layout                                      | Sub-objects | Restore            |
//! |-----------|---------------------------------------------|-------------|--------------------|
//! | `Ordered` | parallel positional arrays, no names        | by order    | after construction |
//! | `Named`   | record lists with display names             | by name     | after construction |
//! | `Keyed`   | id-keyed maps, separate property data map   | by name     | before construction|

pub mod encoding;
mod keyed;
mod named;
mod ordered;

#[cfg(test)]
mod compat;

use bytes::Bytes;
use tessera_world::ObjectFlags;

pub use encoding::{Encoding, MAGIC};

use crate::codec::Fidelity;
use crate::error::{DeserializeError, SerializeError};
use crate::id::StableId;
use crate::identity::RemapTable;
use crate::interner::{Interner, NONE_INDEX};

/// The generation of the payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FormatVersion {
    Ordered = 1,
    Named = 2,
    Keyed = 3,
}

impl FormatVersion {
    /// The generation every save writes.
    pub const CURRENT: Self = Self::Keyed;

    pub const ALL: [Self; 3] = [Self::Ordered, Self::Named, Self::Keyed];

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Ordered),
            2 => Some(Self::Named),
            3 => Some(Self::Keyed),
            _ => None,
        }
    }

    /// Whether display names are stored.
    pub fn stores_names(self) -> bool {
        self >= Self::Named
    }

    /// Whether properties are restored before construction logic runs.
    pub fn restores_before_construction(self) -> bool {
        self >= Self::Keyed
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ordered => "ordered",
            Self::Named => "named",
            Self::Keyed => "keyed",
        };
        write!(f, "{name} (v{})", *self as u8)
    }
}

// ---------------------------------------------------------------------------
// GraphPlan
// ---------------------------------------------------------------------------

/// A decoded graph, independent of the generation it was stored with.
///
/// Class and asset references are indices into `classes` and the stored
/// graph's asset list. `names` is the name table blobs address.
#[derive(Debug, Clone)]
pub(crate) struct GraphPlan {
    pub fidelity: Fidelity,
    pub classes: Vec<String>,
    pub names: Vec<String>,
    pub root: PlanContainer,
    /// Component records, owners before owned.
    pub components: Vec<PlanObject>,
    /// Plain object records, owners before owned.
    pub objects: Vec<PlanObject>,
    /// `(child, parent)` spatial attachments, including sub-graph roots.
    pub spatial_parents: Vec<(StableId, StableId)>,
}

#[derive(Debug, Clone)]
pub(crate) enum PlanContainer {
    Leaf(PlanLeaf),
    SubGraph(PlanSubGraph),
}

impl PlanContainer {
    pub fn id(&self) -> StableId {
        match self {
            Self::Leaf(leaf) => leaf.id,
            Self::SubGraph(sub) => sub.id,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PlanLeaf {
    pub class: i32,
    pub id: StableId,
    pub name: Option<String>,
    pub flags: ObjectFlags,
    pub root_component: Option<StableId>,
    pub subobjects: Vec<PlanSubobject>,
    pub data: Vec<u8>,
    pub children: Vec<PlanContainer>,
}

/// A stored default sub-object. Without a name it is matched by position.
/// The nil id holds the position of one that was not written.
#[derive(Debug, Clone)]
pub(crate) struct PlanSubobject {
    pub id: StableId,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlanObject {
    pub class: i32,
    pub id: StableId,
    pub name: Option<String>,
    pub flags: ObjectFlags,
    pub owner: StableId,
    pub subobjects: Vec<PlanSubobject>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlanSubGraph {
    pub asset: i32,
    /// Parent-space id of the embedded root container.
    pub id: StableId,
    pub remap: RemapTable,
    pub overrides: Vec<PlanOverride>,
}

/// Overridden properties of one sub-graph object.
#[derive(Debug, Clone)]
pub(crate) struct PlanOverride {
    /// Id inside the sub-graph's own id space.
    pub target: StableId,
    pub names: Vec<String>,
    /// Full-fidelity blob holding exactly `names`.
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Decodes one generation's body into a [`GraphPlan`].
pub(crate) trait GraphDecoder: Sync {
    fn version(&self) -> FormatVersion;
    fn decode(&self, body: &[u8], encoding: Encoding) -> Result<GraphPlan, DeserializeError>;
}

pub(crate) fn decoder(version: FormatVersion) -> &'static dyn GraphDecoder {
    match version {
        FormatVersion::Ordered => &ordered::OrderedDecoder,
        FormatVersion::Named => &named::NamedDecoder,
        FormatVersion::Keyed => &keyed::KeyedDecoder,
    }
}

/// Reads the header of `payload` and decodes the body with its generation.
pub(crate) fn decode_payload(payload: &[u8]) -> Result<(FormatVersion, GraphPlan), DeserializeError> {
    let (header, body) = encoding::read_header(payload)?;
    let decoder = decoder(header.version);
    log::trace!("decoding {} payload, {} bytes", decoder.version(), body.len());
    let plan = decoder.decode(body, header.encoding)?;
    Ok((header.version, plan))
}

/// Encodes `plan` with the current generation.
pub(crate) fn encode_payload(plan: &GraphPlan, encoding: Encoding) -> Result<Bytes, SerializeError> {
    let body = keyed::encode(plan);
    encoding::write_payload(FormatVersion::CURRENT, encoding, &body)
}

/// Encodes `plan` with an older generation, for loading tests.
#[cfg(test)]
pub(crate) fn encode_payload_as(
    plan: &GraphPlan,
    version: FormatVersion,
    encoding: Encoding,
) -> Result<Bytes, SerializeError> {
    match version {
        FormatVersion::Ordered => encoding::write_payload(version, encoding, &ordered::encode(plan)),
        FormatVersion::Named => encoding::write_payload(version, encoding, &named::encode(plan)),
        FormatVersion::Keyed => encode_payload(plan, encoding),
    }
}

// ---- Shared wire helpers ----

pub(super) fn name_index(names: &mut Interner<String>, name: &Option<String>) -> i32 {
    match name {
        Some(name) => names.find_or_add(name),
        None => NONE_INDEX,
    }
}

pub(super) fn resolve_name(names: &[String], index: i32) -> Option<String> {
    usize::try_from(index).ok().and_then(|i| names.get(i).cloned())
}

pub(super) fn resolve_names(names: &[String], indices: &[i32]) -> Vec<String> {
    indices
        .iter()
        .filter_map(|&index| {
            let name = resolve_name(names, index);
            if name.is_none() {
                log::warn!("override name index {index} does not resolve");
            }
            name
        })
        .collect()
}

pub(super) fn fidelity_of(compact: bool) -> Fidelity {
    if compact {
        Fidelity::Compact
    } else {
        Fidelity::Full
    }
}

pub(super) fn flags_of(bits: u32) -> ObjectFlags {
    ObjectFlags::from_bits_truncate(bits).persistent()
}
