//! Evaluation snapshot returned by the `initialize` endpoint.
//!
//! The snapshot holds already-evaluated results for a single user. The client only needs to look
//! values up by (hashed) name; evaluation itself happens on the server.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{hashing::KeyHasher, SdkMetadata};

/// Full set of evaluation data for a user, fetched in one round trip.
///
/// A `Snapshot` is never mutated after construction: it is replaced wholesale on each successful
/// (re)initialization.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Gate evaluations keyed by hashed gate name.
    #[serde(default)]
    pub feature_gates: HashMap<String, TryParse<GateEvaluation>>,
    /// Dynamic config evaluations keyed by hashed config name.
    #[serde(default)]
    pub dynamic_configs: HashMap<String, TryParse<ConfigEvaluation>>,
    /// `false` if nothing changed since the `sinceTime` sent with the request.
    #[serde(default)]
    pub has_updates: bool,
    /// Server time of the evaluation, in milliseconds since Unix epoch.
    #[serde(default)]
    pub time: i64,
    /// Metadata of the request this snapshot was fetched with. Filled in by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SdkMetadata>,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed value.
    Parsed(T),
    /// Raw value that did not match the expected shape.
    ParseFailed(serde_json::Value),
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub name: String,
    pub value: bool,
    #[serde(default)]
    pub rule_id: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEvaluation {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub group: String,
}

impl Snapshot {
    /// Look up an evaluated gate by its human-readable name.
    pub fn gate(&self, hasher: &dyn KeyHasher, name: &str) -> Option<&GateEvaluation> {
        self.feature_gates.get(&hasher.hash(name))?.into()
    }

    /// Look up an evaluated dynamic config by its human-readable name.
    pub fn config(&self, hasher: &dyn KeyHasher, name: &str) -> Option<&ConfigEvaluation> {
        self.dynamic_configs.get(&hasher.hash(name))?.into()
    }
}

/// A dynamic config value returned to the caller.
///
/// ```
/// # fn test(client: &gatekit::Client) {
/// let button_color = client
///     .get_config("checkout_button")
///     .and_then(|config| config.get_str("color").map(str::to_owned))
///     .unwrap_or_else(|| "blue".to_owned());
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicConfig {
    /// Name of the config, as requested.
    pub name: String,
    /// Config payload.
    pub value: serde_json::Map<String, serde_json::Value>,
    /// Id of the rule that produced the value.
    pub rule_id: String,
    /// Group (e.g., experiment arm) the user was assigned to.
    pub group: String,
}

impl DynamicConfig {
    pub(crate) fn new(name: &str, evaluation: &ConfigEvaluation) -> DynamicConfig {
        DynamicConfig {
            name: name.to_owned(),
            value: evaluation.value.clone(),
            rule_id: evaluation.rule_id.clone(),
            group: evaluation.group.clone(),
        }
    }

    #[allow(missing_docs)]
    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.value.get(key)
    }

    #[allow(missing_docs)]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.value.get(key)?.as_str()
    }

    #[allow(missing_docs)]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.value.get(key)?.as_f64()
    }

    #[allow(missing_docs)]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.value.get(key)?.as_bool()
    }
}
