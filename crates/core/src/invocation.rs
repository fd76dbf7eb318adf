//! Per-invocation configuration and correlation.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The metadata key that carries the run identifier.
pub const RUN_ID_KEY: &str = "run_id";

/// An opaque token correlating one turn with out-of-band annotations,
/// such as user feedback.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wraps an existing identifier.
    #[inline]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    #[inline]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration passed by the caller along with each turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// The run identifier assigned by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Arbitrary invocation metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl InvocationConfig {
    /// Sets the run identifier.
    #[inline]
    pub fn with_run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Inserts a metadata entry.
    #[inline]
    pub fn with_metadata<K: Into<String>, V: Into<Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Resolves the run identifier of this invocation.
    ///
    /// A non-empty `run_id` string in the metadata wins over the
    /// config's own field. When neither is present a fresh identifier is
    /// generated.
    pub fn resolve_run_id(&self) -> RunId {
        let from_metadata = self
            .metadata
            .get(RUN_ID_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());
        let from_config =
            self.run_id.as_deref().filter(|id| !id.is_empty());
        match from_metadata.or(from_config) {
            Some(id) => RunId::new(id),
            None => RunId::generate(),
        }
    }
}
