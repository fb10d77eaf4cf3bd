//! Object mapping over a [`FieldHashStore`](crate::store::FieldHashStore).
//!
//! An [`EntityType`] is assembled once from [`FieldDescriptor`]s and validated eagerly. An
//! [`EntityMapper`] binds that type to a store and hands out [`Entity`] handles; each handle
//! turns field reads and writes into hash commands on its identity key and keeps the type's
//! [`SecondaryIndex`]es in step.
//!
//! Layout in the store:
//!
//! ```text
//! <prefix><local id>          hash   one field per attribute
//! <index prefix><index key>   string identity key of the owning entity
//! ```
//!
//! Existence is implied: an entity with no fields written is indistinguishable from one that
//! does not exist.

use thiserror::Error;

use crate::store::StoreError;

pub mod entity;
pub mod entity_mapper;
pub mod entity_type;
pub mod field;
pub mod index;

pub use entity::{AsIdentity, Entity, IdentityKey};
pub use entity_mapper::{EntityMapper, Enumeration};
pub use entity_type::{EntityType, EntityTypeBuilder};
pub use field::{Decoder, FieldDescriptor, FromValue, Value};
pub use index::{IndexCursor, IndexKeys, SecondaryIndex};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MapperError {
    #[error("identity `{current}` cannot be changed to `{attempted}`")]
    IdentityImmutable { current: String, attempted: String },
    #[error(
        "field `{field}` of {entity_type} is primary and holds `{current}`; refusing to set `{attempted}`"
    )]
    PrimaryFieldImmutable { entity_type: String, field: String, current: String, attempted: String },
    #[error("{entity_type} declares more than one primary field (`{first}`, `{second}`)")]
    MultiplePrimaryFields { entity_type: String, first: String, second: String },
    #[error("no index has been declared for field `{field}` of {entity_type}")]
    NoSuchIndex { entity_type: String, field: String },
    #[error("{entity_type} must declare a key prefix or a primary field")]
    TypeMissingPrefix { entity_type: String },
    #[error("{entity_type} declares field `{field}` more than once")]
    DuplicateField { entity_type: String, field: String },
    #[error("index prefix `{index_prefix}` of {entity_type}.{field} overlaps key prefix `{prefix}`")]
    OverlappingPrefix {
        entity_type: String,
        field: String,
        prefix: String,
        index_prefix: String,
    },
    #[error("field `{field}` holds `{raw}`, which the {decoder} decoder rejects")]
    Decode { field: String, raw: String, decoder: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
}
