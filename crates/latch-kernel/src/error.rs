//! Error types for Latch kernel operations.

use crate::spec::Visibility;

/// Why a final attribute refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalViolation {
    /// A second write was attempted on a locked entry.
    Reassigned,

    /// A read happened before any value was assigned and no default exists.
    Unassigned,
}

impl std::fmt::Display for FinalViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reassigned => write!(f, "cannot be reassigned"),
            Self::Unassigned => write!(f, "must be assigned before it is read"),
        }
    }
}

/// Errors arising from attribute declaration, access, or propagation.
#[derive(Debug, thiserror::Error)]
pub enum AttrError {
    /// Malformed construction options or attribute name.
    #[error("invalid attribute declaration: {0}")]
    Validation(String),

    /// The name is already declared locally on the same owner and scope.
    #[error("attribute `{name}` is already defined on {owner}")]
    AlreadyDefined { name: String, owner: String },

    /// Reference to a name with no registry entry.
    #[error("attribute `{name}` is not defined on {owner}")]
    NotDefined { name: String, owner: String },

    /// Write to a locked entry, or read of an unset final value.
    #[error("final attribute `{name}` {violation}")]
    Final {
        name: String,
        violation: FinalViolation,
    },

    /// Write attempt where exposure forbids writing.
    #[error("attribute `{name}` is read-only")]
    Readonly { name: String },

    /// Accessor generation would overwrite a method it did not install.
    #[error("method `{name}` is already defined on {target}")]
    MethodAlreadyDefined { name: String, target: String },

    /// Copying a stored value into a subtype or instance failed.
    #[error("failed to duplicate `{name}` ({class}): {message}")]
    Duplication {
        name: String,
        class: String,
        message: String,
    },

    /// No method of that name anywhere in the receiver's lineage.
    #[error("undefined method `{name}` for {target}")]
    NoMethod { name: String, target: String },

    /// The method exists but the call site may not invoke it.
    #[error("{visibility} method `{name}` called for {target}")]
    NotVisible {
        name: String,
        target: String,
        visibility: Visibility,
    },

    /// Readers and predicates take no arguments.
    #[error("wrong number of arguments for `{name}` (given {given}, expected {expected})")]
    Arity {
        name: String,
        given: usize,
        expected: usize,
    },

    /// A transformer rejected the incoming arguments.
    #[error("cannot coerce value for `{name}`: {message}")]
    Coercion { name: String, message: String },
}

impl AttrError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn coercion(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Coercion {
            name: name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn reassigned(name: &str) -> Self {
        Self::Final {
            name: name.to_string(),
            violation: FinalViolation::Reassigned,
        }
    }

    pub(crate) fn unassigned(name: &str) -> Self {
        Self::Final {
            name: name.to_string(),
            violation: FinalViolation::Unassigned,
        }
    }

    /// Whether this error was raised by a final-attribute guard.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_messages_name_the_violation() {
        insta::assert_snapshot!(
            AttrError::reassigned("id").to_string(),
            @"final attribute `id` cannot be reassigned"
        );
        insta::assert_snapshot!(
            AttrError::unassigned("token").to_string(),
            @"final attribute `token` must be assigned before it is read"
        );
    }

    #[test]
    fn visibility_is_rendered_lowercase() {
        let err = AttrError::NotVisible {
            name: "secret".to_string(),
            target: "#<Vault>".to_string(),
            visibility: Visibility::Private,
        };
        assert_eq!(err.to_string(), "private method `secret` called for #<Vault>");
    }
}
