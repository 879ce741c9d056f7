use parley_api::types::ValidationLimits;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub max_room_name_len: usize,
    pub max_content_bytes: usize,
    pub max_mentions: usize,
    pub max_page_size: usize,
    pub event_bus_capacity: usize,
}

impl Policy {
    pub fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_room_name_len: self.max_room_name_len,
            max_content_bytes: self.max_content_bytes,
            max_mentions: self.max_mentions,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_room_name_len: 64,
            max_content_bytes: 4096,
            max_mentions: 32,
            max_page_size: 200,
            event_bus_capacity: 1024,
        }
    }
}
