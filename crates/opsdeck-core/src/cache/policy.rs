//! Eviction policies.

use serde::{Deserialize, Serialize};

/// How the cache picks a victim when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the entry least recently inserted or read.
    #[default]
    Lru,
    /// Evict the oldest insertion.
    Fifo,
    /// Evict the entry with the oldest insertion time, which is the one
    /// closest to expiring.
    TtlOldest,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::Fifo => write!(f, "fifo"),
            EvictionPolicy::TtlOldest => write!(f, "ttl_oldest"),
        }
    }
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "ttl" | "ttl_oldest" => Ok(EvictionPolicy::TtlOldest),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}
