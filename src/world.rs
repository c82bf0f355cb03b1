//! The Minecraft world a provider places schematics into.
//!
//! The world only knows how to place a schematic and how to remove one. It
//! never edits a placement, which is why content changes become replacements.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ProviderError;

/// Block coordinates of a placement's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// East-west coordinate.
    pub x: i64,
    /// Height.
    pub y: i64,
    /// North-south coordinate.
    pub z: i64,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A schematic placed in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Identifier assigned by the world.
    pub id: String,
    /// The file the schematic was loaded from.
    pub schema_path: PathBuf,
    /// Digest of the file at placement time.
    pub schema_hash: String,
    /// Where the schematic was placed.
    pub origin: Origin,
}

/// Operations the world supports.
#[async_trait::async_trait]
pub trait WorldClient: Send + Sync + 'static {
    /// Place a schematic and return the new placement.
    async fn place_schema(
        &self,
        schema_path: &Path,
        schema_hash: &str,
        origin: Origin,
    ) -> Result<Placement, ProviderError>;

    /// Look up a placement by id.
    async fn get_placement(&self, id: &str) -> Result<Option<Placement>, ProviderError>;

    /// Remove a placement. Returns `false` if it did not exist.
    async fn remove_placement(&self, id: &str) -> Result<bool, ProviderError>;
}

/// A world held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    placements: RwLock<HashMap<String, Placement>>,
    next_id: AtomicU64,
}

impl MemoryWorld {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placements currently in the world.
    pub async fn len(&self) -> usize {
        self.placements.read().await.len()
    }

    /// Whether the world has no placements.
    pub async fn is_empty(&self) -> bool {
        self.placements.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl WorldClient for MemoryWorld {
    async fn place_schema(
        &self,
        schema_path: &Path,
        schema_hash: &str,
        origin: Origin,
    ) -> Result<Placement, ProviderError> {
        let id = format!("schema-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let placement = Placement {
            id: id.clone(),
            schema_path: schema_path.to_path_buf(),
            schema_hash: schema_hash.to_string(),
            origin,
        };
        debug!(id = %id, origin = %origin, "Placed schematic");
        self.placements.write().await.insert(id, placement.clone());
        Ok(placement)
    }

    async fn get_placement(&self, id: &str) -> Result<Option<Placement>, ProviderError> {
        Ok(self.placements.read().await.get(id).cloned())
    }

    async fn remove_placement(&self, id: &str) -> Result<bool, ProviderError> {
        let removed = self.placements.write().await.remove(id).is_some();
        debug!(id = %id, removed, "Removed schematic");
        Ok(removed)
    }
}
