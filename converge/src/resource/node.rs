//! The managed node a resource converges on.

use serde::{Deserialize, Serialize};

/// Identity and platform of a managed node.
///
/// Platform strings follow `std::env::consts::OS` (`linux`, `macos`, `windows`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default = "local_platform")]
    pub platform: String,
}

impl Node {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
        }
    }
}

fn local_platform() -> String {
    std::env::consts::OS.to_string()
}
