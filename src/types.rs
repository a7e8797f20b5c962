use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra HTTP headers sent with every request of the session.
pub type Headers = BTreeMap<String, String>;

/// One data record fed to the steps of an iteration.
pub type DataRecord = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub name: String,
    pub data: Vec<u8>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Screenshot {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}
