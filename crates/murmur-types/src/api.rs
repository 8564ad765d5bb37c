use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::StatusId;

// -- Removal options --

/// Options accepted by every removal path.
///
/// Jobs carry options as a free-form mapping so that producers can attach
/// keys other paths care about; unknown keys are ignored here but a known
/// key with the wrong type is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveOptions {
    /// Destroy the records but emit no streaming or federation side effects.
    pub skip_side_effects: bool,
}

impl RemoveOptions {
    pub fn skipping_side_effects() -> Self {
        Self { skip_side_effects: true }
    }

    /// Validate a job options mapping. `null` means defaults.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(_) => {
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())
            }
            other => Err(format!("options must be a mapping, got {}", other)),
        }
    }
}

// -- Internal removal endpoint --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemovalRequest {
    pub status_id: StatusId,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct RemovalAccepted {
    pub job_id: Uuid,
}
