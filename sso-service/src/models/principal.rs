use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Resolved identity produced by a successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    /// Stable subject identifier (typically the username)
    pub id: String,

    /// Released attributes, multi-valued
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(key.into(), values);
        self
    }

    /// True when the principal carries at least one of `accepted` under `key`.
    pub fn has_any_value(&self, key: &str, accepted: &[String]) -> bool {
        self.attributes
            .get(key)
            .map(|values| values.iter().any(|v| accepted.contains(v)))
            .unwrap_or(false)
    }
}
