//! The property-codec protocol.
//!
//! A [`PropertyCodec`] turns the reflected fields of one object into an
//! opaque blob and back. The graph layers never look inside a blob; they only
//! require that the codec:
//!
//! - routes every reference-shaped field through the [`tag`] encoding,
//!   resolving objects via [`ReferenceWriter`] / [`ReferenceReader`];
//! - honors the [`PropertyScope`] it is given, in particular the
//!   [`SPATIAL_PARENT_PROPERTY`] exclusion, since spatial parents are stored
//!   by the graph itself.
//!
//! [`ReflectCodec`] is the schema-driven implementation used by default.

pub mod blob;
mod reflect;
pub mod tag;

use tessera_world::{ObjectId, World};

pub use blob::{BlobReader, BlobWriter};
pub use reflect::ReflectCodec;
pub use tag::{RefTag, ReferenceReader, ReferenceWriter};

use crate::error::CodecError;

/// Property name a codec must never store for spatial components.
pub const SPATIAL_PARENT_PROPERTY: &str = "attach_parent";

/// How much a blob retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fidelity {
    /// Fields are stored with their names and kinds, and unknown or re-typed
    /// fields are skipped on read.
    #[default]
    Full,
    /// Fields are stored positionally and editor-only data is dropped.
    Compact,
}

/// Which fields of an object a codec call covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertyFilter {
    #[default]
    All,
    /// Every field except these.
    Skip(Vec<String>),
    /// Only these fields.
    Only(Vec<String>),
}

impl PropertyFilter {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Skip(names) => !names.iter().any(|n| n == name),
            Self::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Fidelity plus field filter for one codec call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyScope {
    pub fidelity: Fidelity,
    pub filter: PropertyFilter,
}

impl PropertyScope {
    pub fn new(fidelity: Fidelity) -> Self {
        Self {
            fidelity,
            filter: PropertyFilter::All,
        }
    }

    /// The scope for a whole object, excluding the spatial parent link.
    pub fn object(fidelity: Fidelity, spatial: bool) -> Self {
        let filter = if spatial {
            PropertyFilter::Skip(vec![SPATIAL_PARENT_PROPERTY.to_string()])
        } else {
            PropertyFilter::All
        };
        Self { fidelity, filter }
    }

    /// The scope of an override entry: full fidelity, named fields only.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fidelity: Fidelity::Full,
            filter: PropertyFilter::Only(names.into_iter().map(Into::into).collect()),
        }
    }
}

/// Encodes and decodes the reflected properties of single objects.
pub trait PropertyCodec {
    /// Appends the blob for `object` to `out`.
    fn write(
        &self,
        world: &World,
        object: ObjectId,
        scope: &PropertyScope,
        refs: &mut dyn ReferenceWriter,
        out: &mut BlobWriter,
    ) -> Result<(), CodecError>;

    /// Restores `object` from `data` without firing change notifications.
    fn read(
        &self,
        world: &mut World,
        object: ObjectId,
        scope: &PropertyScope,
        refs: &dyn ReferenceReader,
        data: &[u8],
    ) -> Result<(), CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters() {
        assert!(PropertyFilter::All.includes("x"));
        let skip = PropertyFilter::Skip(vec!["x".into()]);
        assert!(!skip.includes("x"));
        assert!(skip.includes("y"));
        let only = PropertyScope::only(["x"]).filter;
        assert!(only.includes("x"));
        assert!(!only.includes("y"));
    }

    #[test]
    fn spatial_scope_skips_parent_link() {
        let scope = PropertyScope::object(Fidelity::Compact, true);
        assert!(!scope.filter.includes(SPATIAL_PARENT_PROPERTY));
        assert_eq!(PropertyScope::object(Fidelity::Full, false).filter, PropertyFilter::All);
    }
}
