//! Error types for prefab saving, loading and override editing.

use tessera_world::{ObjectId, WorldError};

use crate::id::StableId;

/// Errors raised while encoding or decoding one property blob.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("blob ended early: needed {needed} bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("invalid reference tag {0}")]
    InvalidTag(u8),
    #[error("invalid field kind code {0}")]
    InvalidKind(u8),
    #[error("string data is not valid UTF-8")]
    InvalidUtf8,
    #[error("field `{field}` holds a {found} value")]
    TypeMismatch { field: String, found: &'static str },
    #[error("field `{0}` is longer than a blob can address")]
    TooLarge(String),
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Errors that abort a save.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("{0} is not a live container")]
    InvalidRoot(ObjectId),
    #[error("failed to encode properties of {object}: {source}")]
    Codec {
        object: ObjectId,
        #[source]
        source: CodecError,
    },
    #[error("format error: {0}")]
    Format(String),
    #[error("asset `{0}` does not hold a prefab")]
    NotAPrefab(String),
}

/// Errors that abort a load.
///
/// Per-object problems (unknown classes, missing owners, unmatched default
/// sub-objects) are logged and skipped instead.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("payload is empty")]
    EmptyPayload,
    #[error("asset `{0}` has no stored graph")]
    MissingVariant(String),
    #[error("asset `{0}` does not hold a prefab")]
    NotAPrefab(String),
    #[error("asset index {0} does not resolve")]
    MissingAsset(i32),
    #[error("sub-prefab `{0}` embeds itself")]
    RecursiveSubPrefab(String),
    #[error("cannot attach to {0}: not a live spatial component")]
    InvalidParent(ObjectId),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported payload encoding {0}")]
    UnsupportedEncoding(u8),
    #[error("payload does not start with the prefab magic")]
    BadMagic,
    #[error("decode error: {0}")]
    Decode(String),
    #[error("failed to create container: {0}")]
    Container(WorldError),
}

/// Errors raised by the override editor.
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("{0} is not part of a sub-prefab instance")]
    NotInSubPrefab(ObjectId),
    #[error("{0} is not the root of a sub-prefab instance")]
    UnknownInstance(ObjectId),
    #[error("template has no object with id {0}")]
    MissingTemplateObject(StableId),
    #[error("class of {object} has no property `{property}`")]
    UnknownProperty { object: ObjectId, property: String },
    #[error("failed to load template: {0}")]
    Template(#[from] DeserializeError),
    #[error("failed to save template: {0}")]
    Save(#[from] SerializeError),
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Errors of operations that both save and load.
#[derive(Debug, thiserror::Error)]
pub enum PrefabError {
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
}
