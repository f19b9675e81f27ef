//! Catalog entity identity.
//!
//! Entities are addressed by a `namespace/kind/name` triplet. The textual ref
//! format is `[kind:][namespace/]name`, e.g. `component:default/payments`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace used when a ref does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Errors that can occur when building or parsing entity names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityNameError {
    #[error("Entity {0} must not be empty")]
    Empty(&'static str),

    #[error("Malformed entity ref: {0}")]
    Malformed(String),

    #[error("Entity ref '{0}' has no kind and no default kind is configured")]
    MissingKind(String),
}

/// Fallbacks applied when parsing a partial entity ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRefDefaults {
    pub namespace: String,
    pub kind: Option<String>,
}

impl Default for EntityRefDefaults {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kind: None,
        }
    }
}

/// Identity of a documented catalog entity.
///
/// Used as the dependency key for sync runs: a tracker re-runs whenever the
/// name it is given differs from the one it is tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EntityNameParts")]
pub struct EntityName {
    namespace: String,
    kind: String,
    name: String,
}

impl EntityName {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, EntityNameError> {
        let namespace = namespace.into();
        let kind = kind.into();
        let name = name.into();

        if namespace.is_empty() {
            return Err(EntityNameError::Empty("namespace"));
        }
        if kind.is_empty() {
            return Err(EntityNameError::Empty("kind"));
        }
        if name.is_empty() {
            return Err(EntityNameError::Empty("name"));
        }

        Ok(Self {
            namespace,
            kind,
            name,
        })
    }

    /// Parse a `[kind:][namespace/]name` ref, filling gaps from `defaults`.
    pub fn parse_ref(s: &str, defaults: &EntityRefDefaults) -> Result<Self, EntityNameError> {
        let s = s.trim();

        let (kind, rest) = match s.split_once(':') {
            Some((kind, rest)) => {
                if kind.is_empty() || rest.contains(':') {
                    return Err(EntityNameError::Malformed(s.to_string()));
                }
                (Some(kind.to_string()), rest)
            }
            None => (None, s),
        };

        let (namespace, name) = match rest.split_once('/') {
            Some((namespace, name)) => {
                if namespace.is_empty() || name.contains('/') {
                    return Err(EntityNameError::Malformed(s.to_string()));
                }
                (namespace.to_string(), name)
            }
            None => (defaults.namespace.clone(), rest),
        };

        if name.is_empty() {
            return Err(EntityNameError::Malformed(s.to_string()));
        }

        let kind = kind
            .or_else(|| defaults.kind.clone())
            .ok_or_else(|| EntityNameError::MissingKind(s.to_string()))?;

        Self::new(namespace, kind, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage key for this entity's docs: `namespace/kind/name`.
    ///
    /// Namespace and kind are compared case-insensitively by the catalog, so
    /// both are lowercased here. Every segment is URL-encoded.
    pub fn storage_path(&self) -> String {
        format!(
            "{}/{}/{}",
            urlencoding::encode(&self.namespace.to_lowercase()),
            urlencoding::encode(&self.kind.to_lowercase()),
            urlencoding::encode(&self.name)
        )
    }
}

#[derive(Deserialize)]
struct EntityNameParts {
    namespace: String,
    kind: String,
    name: String,
}

impl TryFrom<EntityNameParts> for EntityName {
    type Error = EntityNameError;

    fn try_from(parts: EntityNameParts) -> Result<Self, Self::Error> {
        Self::new(parts.namespace, parts.kind, parts.name)
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
    }
}

impl FromStr for EntityName {
    type Err = EntityNameError;

    /// Parses a fully-qualified ref. Missing kind is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ref(s, &EntityRefDefaults::default())
    }
}
