use serde::{Deserialize, Serialize};

/// Metadata attached to every request sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkMetadata {
    /// Device identifier, persisted across sessions.
    #[serde(rename = "stableID")]
    pub stable_id: String,
    /// Identifier of the current session.
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_identifier: Option<String>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[allow(missing_docs)]
    pub sdk_type: String,
    #[allow(missing_docs)]
    pub sdk_version: String,
}

impl SdkMetadata {
    pub(crate) const SDK_TYPE: &'static str = "rust-client";

    /// Create metadata for this SDK build.
    pub fn new(
        stable_id: String,
        session_id: String,
        app_identifier: Option<String>,
        app_version: Option<String>,
    ) -> SdkMetadata {
        SdkMetadata {
            stable_id,
            session_id,
            app_identifier,
            app_version,
            sdk_type: SdkMetadata::SDK_TYPE.to_owned(),
            sdk_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}
