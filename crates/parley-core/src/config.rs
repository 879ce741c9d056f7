use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    pub storage_path: String,
    pub namespace: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_path: ".parley".to_string(),
            namespace: "chat".to_string(),
        }
    }
}
