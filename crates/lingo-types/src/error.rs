use thiserror::Error;

/// Errors produced when constructing lingo value types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid entity reference {entity_type}:{entity_id}: {reason}")]
    InvalidEntity {
        entity_type: String,
        entity_id: String,
        reason: String,
    },

    #[error("invalid language {language:?}: {reason}")]
    InvalidLanguage { language: String, reason: String },
}
