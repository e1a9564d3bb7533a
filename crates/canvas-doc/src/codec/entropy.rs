//! Volatile data regenerated on every save.
//!
//! The entropy region lives under `Entropy/` in both persisted forms. It is
//! written alongside the document but never read back into it, and
//! comparisons skip it unless asked to be strict.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Document;

pub const ENTROPY_DIR: &str = "Entropy";
pub const ENTROPY_ENTRY: &str = "Entropy/Entropy.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entropy {
    /// Save time, milliseconds since the Unix epoch.
    pub saved_at: u64,
    pub session_id: String,
    /// One generated identifier per screen and control address.
    #[serde(default)]
    pub control_ids: BTreeMap<String, String>,
}

impl Entropy {
    /// Fresh identifiers for every node of `doc`.
    pub fn generate(doc: &Document) -> Self {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let control_ids = doc
            .enumerate()
            .filter(|(address, _)| !address.is_root())
            .map(|(address, _)| (address.to_string(), Uuid::new_v4().to_string()))
            .collect();
        Self {
            saved_at,
            session_id: Uuid::new_v4().to_string(),
            control_ids,
        }
    }
}

/// True for names inside the entropy region, with either separator.
pub fn is_entropy_entry(name: &str) -> bool {
    let name = name.replace('\\', "/");
    let name = name.trim_start_matches('/');
    name.split('/').next() == Some(ENTROPY_DIR)
}
