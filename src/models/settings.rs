use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 8;
pub const DEFAULT_PROFILE_CACHE_CAPACITY: usize = 256;

/// Tunables for the slot engine and its storage-backed collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on availability reads in flight for one recommendation.
    pub max_concurrent_lookups: usize,
    pub profile_cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            profile_cache_capacity: DEFAULT_PROFILE_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettingsUpdate {
    #[serde(default)]
    pub max_concurrent_lookups: Option<usize>,
    #[serde(default)]
    pub profile_cache_capacity: Option<usize>,
}
