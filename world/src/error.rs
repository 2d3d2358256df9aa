use crate::class::ClassId;
use crate::object::ObjectId;

/// Errors reported by [`World`](crate::World) and [`ClassRegistry`](crate::ClassRegistry).
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("class `{0}` is already registered")]
    DuplicateClass(String),
    #[error("unknown class {0}")]
    UnknownClass(ClassId),
    #[error("class `{class}` declares container `{subobject}` as a default sub-object")]
    InvalidSubobject { class: String, subobject: String },
    #[error("{0} is not alive")]
    DeadObject(ObjectId),
    #[error("class `{class}` has no property `{property}`")]
    UnknownProperty { class: String, property: String },
    #[error("property `{property}` expects {expected:?}, got a {found} value")]
    TypeMismatch {
        property: String,
        expected: crate::class::FieldKind,
        found: &'static str,
    },
    #[error("invalid owner for `{object}`: {reason}")]
    InvalidOwner { object: String, reason: &'static str },
    #[error("{0} is not a spatial component")]
    NotSpatial(ObjectId),
    #[error("{0} is not a container")]
    NotContainer(ObjectId),
    #[error("attaching {child} to {parent} would create a cycle")]
    AttachmentCycle { child: ObjectId, parent: ObjectId },
}
