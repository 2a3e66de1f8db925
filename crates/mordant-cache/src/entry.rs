use std::path::PathBuf;

use mordant_config::AssetId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
  /// Nothing at the canonical path.
  Absent,
  /// A fetch ticket is outstanding.
  Fetching,
  /// File present with the size recorded at commit.
  Present,
  /// File present but empty or not the committed size.
  Corrupt,
}

/// Observed state of one asset in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub id: AssetId,
  /// Canonical path of the asset (whether or not it exists yet).
  pub local_path: PathBuf,
  /// Size on disk; 0 when absent.
  pub size: u64,
  pub state: CacheState,
}

impl CacheEntry {
  pub fn is_present(&self) -> bool {
    self.state == CacheState::Present
  }
}

/// What the metadata index stores per committed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IndexRecord {
  pub category: String,
  pub name: String,
  pub size: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

impl IndexRecord {
  pub fn id(&self) -> AssetId {
    AssetId::new(self.category.clone(), self.name.clone())
  }
}
