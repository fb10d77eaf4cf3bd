//! Typed entities of the notification service.
//!
//! Each model declares its schema once through [`Model::schema`] and wraps an [`Entity`]
//! handle with one accessor pair per field. A [`Collection`] validates the schema when it is
//! created and hands out model instances.

use std::marker::PhantomData;

use crate::mapper::{
    Entity, EntityMapper, EntityTypeBuilder, Enumeration, MapperError, SecondaryIndex,
};
use crate::store::StoreHandle;

pub mod counters;
pub mod project;
pub mod user;

pub use counters::CommitStats;
pub use project::Project;
pub use user::User;

pub trait Model: Sized {
    /// Extra construction arguments, passed verbatim to every instance a collection builds.
    type Args: Clone;

    fn schema() -> EntityTypeBuilder;

    fn from_entity(entity: Entity, args: Self::Args) -> Self;

    fn entity(&self) -> &Entity;
}

pub struct Collection<M: Model> {
    mapper: EntityMapper,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self { mapper: self.mapper.clone(), _model: PhantomData }
    }
}

impl<M: Model> Collection<M> {
    pub fn new(store: StoreHandle) -> Result<Self, MapperError> {
        let entity_type = M::schema().build()?;
        Ok(Self { mapper: EntityMapper::new(entity_type, store), _model: PhantomData })
    }

    pub fn mapper(&self) -> &EntityMapper {
        &self.mapper
    }

    pub fn attach(&self, id: &str, args: M::Args) -> M {
        M::from_entity(self.mapper.attach(id), args)
    }

    pub async fn load(&self, id: &str, args: M::Args) -> Result<M, MapperError> {
        Ok(M::from_entity(self.mapper.load(id).await?, args))
    }

    pub async fn exists(&self, id: &str) -> Result<bool, MapperError> {
        self.mapper.exists(id).await
    }

    pub async fn find_by(
        &self,
        field: &str,
        value: &str,
        args: M::Args,
    ) -> Result<Option<M>, MapperError> {
        let found = self.mapper.find_by_index(field, value).await?;
        Ok(found.map(|entity| M::from_entity(entity, args)))
    }

    pub async fn enumerate(&self, args: M::Args) -> Result<Records<M>, MapperError> {
        Ok(Records { enumeration: self.mapper.enumerate().await?, args })
    }

    pub async fn delete_all(&self) -> Result<usize, MapperError> {
        self.mapper.delete_all_of_type().await
    }

    pub fn index(&self, field: &str) -> Result<SecondaryIndex, MapperError> {
        self.mapper.index(field)
    }
}

/// Model instances over an [`Enumeration`] snapshot; [`Records::iter`] can be called again to
/// restart.
pub struct Records<M: Model> {
    enumeration: Enumeration,
    args: M::Args,
}

impl<M: Model> Records<M> {
    pub fn iter(&self) -> impl Iterator<Item = M> + '_ {
        self.enumeration.iter().map(|entity| M::from_entity(entity, self.args.clone()))
    }

    pub fn len(&self) -> usize {
        self.enumeration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enumeration.is_empty()
    }
}
