use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Reference to a translatable application object.
///
/// `entity_type` is a stable type discriminator (typically a fully-qualified
/// type or table name) and `entity_id` the stringified primary key. The id is
/// used verbatim as a storage key segment, so it is validated on
/// construction; the type is normalized by the storage layer instead.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEntityRef")]
pub struct EntityRef {
    entity_type: String,
    entity_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntityRef {
    entity_type: String,
    entity_id: String,
}

impl TryFrom<RawEntityRef> for EntityRef {
    type Error = TypeError;

    fn try_from(raw: RawEntityRef) -> Result<Self, Self::Error> {
        Self::new(raw.entity_type, raw.entity_id)
    }
}

impl EntityRef {
    /// Create a validated entity reference.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();

        let invalid = |reason: &str| TypeError::InvalidEntity {
            entity_type: entity_type.clone(),
            entity_id: entity_id.clone(),
            reason: reason.to_string(),
        };

        if entity_type.trim().is_empty() {
            return Err(invalid("entity type must not be empty"));
        }
        if entity_id.is_empty() {
            return Err(invalid("entity id must not be empty"));
        }
        if entity_id == "." || entity_id == ".." {
            return Err(invalid("entity id must not be a relative path component"));
        }
        if entity_id.contains(['/', '\\']) {
            return Err(invalid("entity id must not contain path separators"));
        }
        if entity_id.chars().any(char::is_control) {
            return Err(invalid("entity id must not contain control characters"));
        }

        Ok(Self {
            entity_type,
            entity_id,
        })
    }

    /// The type discriminator, exactly as supplied.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The instance key.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({}#{})", self.entity_type, self.entity_id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.entity_id)
    }
}
