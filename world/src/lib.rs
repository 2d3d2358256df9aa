//! # Tessera World
//!
//! The live object model Tessera prefabs are saved from and loaded into.
//!
//! ## Core Types
//!
//! - [`ObjectId`]: generational object handle
//! - [`World`]: arena owning every object, its properties and its links
//! - [`ClassRegistry`] / [`ClassInfo`]: closed reflection schema per class
//! - [`FieldKind`] / [`FieldCategory`]: field shapes (scalar, reference, container, struct)
//! - [`Value`]: dynamic property value
//! - [`AssetRef`]: identity-compared handle to shared external data
//!
//! ## Hierarchies
//!
//! - Ownership: owner back-references plus owned lists; [`World::despawn`]
//!   destroys the whole owned subtree
//! - Attachment: [`hierarchy`] links spatial components and derives the
//!   container tree from them
//!
//! ## Construction sessions
//!
//! - [`ConstructionRegistry`]: per-world record of objects still being built
//! - [`LifecycleListener`]: collaborator notified of session begin/end and
//!   membership changes

mod asset;
pub mod class;
mod construction;
mod error;
pub mod hierarchy;
mod object;
mod value;
mod world;

pub use asset::AssetRef;
pub use class::{
    ClassHooks, ClassId, ClassInfo, ClassKind, ClassRegistry, DefaultSubobject, FieldCategory,
    FieldFlags, FieldInfo, FieldKind,
};
pub use construction::{ConstructionRegistry, LifecycleListener, SessionId};
pub use error::WorldError;
pub use hierarchy::ActiveSignal;
pub use object::{ObjectFlags, ObjectId};
pub use value::{NativeHandle, Value};
pub use world::{PropertyChange, World};
