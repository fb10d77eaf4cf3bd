pub mod connection;
pub mod directory;
pub mod mapper;
pub mod models;
pub mod store;

pub use connection::{connect, connect_with_config};
pub use directory::{DirectoryError, DirectoryOptions, DirectorySource, SlackDirectory};
pub use mapper::{Entity, EntityMapper, EntityType, FieldDescriptor, MapperError, Value};
pub use models::{Collection, Model, Project, User};
pub use store::{
    FieldHashStore, InMemoryFieldHashStore, RedisFieldHashStore, StoreError, StoreHandle,
};
