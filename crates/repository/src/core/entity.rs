//! The entity contract.

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

use crate::error::{BoxError, ValidationError};

use super::value::Value;

/// Identifier of a persisted entity.
///
/// Implemented for every type that can be bound as a statement parameter and
/// printed in error messages (`String`, `i64`, `Uuid`, ...).
pub trait EntityId: Clone + Debug + Display + Send + Sync + Into<Value> + 'static {}

impl<T> EntityId for T where T: Clone + Debug + Display + Send + Sync + Into<Value> + 'static {}

/// A persisted domain object with identity, lifecycle hooks and validation.
///
/// Hooks default to no-ops. Repositories opt into calling them through
/// [`CallbacksBuilder::with_entity_hooks`](crate::repository::CallbacksBuilder::with_entity_hooks).
///
/// # Example
///
/// ```
/// use helios_repository::core::Entity;
/// use helios_repository::error::ValidationError;
///
/// #[derive(Debug, Clone, Default)]
/// struct Tag {
///     id: i64,
///     label: String,
/// }
///
/// impl Entity for Tag {
///     type Id = i64;
///
///     fn id(&self) -> &i64 {
///         &self.id
///     }
///
///     fn set_id(&mut self, id: i64) {
///         self.id = id;
///     }
///
///     fn is_exists(&self) -> bool {
///         self.id != 0
///     }
///
///     fn validate_create(&self) -> Result<(), ValidationError> {
///         if self.label.is_empty() {
///             return Err(ValidationError::missing("label"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(Tag::default().validate_create().is_err());
/// ```
pub trait Entity: Send + Sync + 'static {
    /// Identifier type.
    type Id: EntityId;

    /// Returns the identifier.
    fn id(&self) -> &Self::Id;

    /// Replaces the identifier.
    fn set_id(&mut self, id: Self::Id);

    /// Returns true once the entity has an identity in the store.
    fn is_exists(&self) -> bool;

    /// Runs before the entity is inserted (id generation, timestamps).
    fn before_create(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs before the entity is updated.
    fn before_change(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Checks the entity can be inserted.
    fn validate_create(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Checks the entity can be updated.
    fn validate_change(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Static metadata about the table an entity lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Table name, available to SQL templates.
    pub table: String,
    /// Entity label used in error messages.
    pub entity: String,
}

impl EntityInfo {
    pub fn new(table: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entity: entity.into(),
        }
    }
}
