use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("conflicting rules registered for '{parent_type}.{field}'")]
    ConflictingFieldRule { parent_type: String, field: String },

    #[error("conflicting fallback rules registered for type '{parent_type}'")]
    ConflictingTypeFallback { parent_type: String },

    #[error("conflicting global fallback rules")]
    ConflictingFallback,

    #[error("conflicting default policies")]
    ConflictingDefaultPolicy,

    #[error("empty {what} name in rule target '{target}'")]
    EmptyName { what: &'static str, target: String },

    #[error("undefined rule '{name}' referenced by '{target}'")]
    UndefinedRule { name: String, target: String },

    #[error("duplicate rule name '{name}' in registry")]
    DuplicateRule { name: String },
}
