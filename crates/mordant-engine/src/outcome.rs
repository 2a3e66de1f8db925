//! Result assembly: per-requirement outcomes into the caller-facing result.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use mordant_config::{AssetId, AssetRequirement, FailureKind};
use serde::{Serialize, Serializer};

use crate::error::{AssetFailure, FailureReport};

/// How one requirement ended.
pub type RequirementOutcome = Result<PathBuf, FailureKind>;

/// Local paths of every provisioned asset.
///
/// Serializes as `{ "<category>": { "<name>": "<path>" } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSet {
  paths: BTreeMap<AssetId, PathBuf>,
}

impl ResolvedSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, id: AssetId, path: PathBuf) {
    self.paths.insert(id, path);
  }

  pub fn get(&self, id: &AssetId) -> Option<&Path> {
    self.paths.get(id).map(PathBuf::as_path)
  }

  pub fn contains(&self, id: &AssetId) -> bool {
    self.paths.contains_key(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &Path)> {
    self.paths.iter().map(|(id, path)| (id, path.as_path()))
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl Serialize for ResolvedSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut nested: BTreeMap<&str, BTreeMap<&str, &Path>> = BTreeMap::new();
    for (id, path) in &self.paths {
      nested
        .entry(id.category.as_str())
        .or_default()
        .insert(id.name.as_str(), path.as_path());
    }
    nested.serialize(serializer)
  }
}

/// Merge outcomes into a [`ResolvedSet`], or a [`FailureReport`] ordered by
/// `requirements`.
///
/// Requirements with no entry in `outcomes` are skipped.
pub fn assemble(
  requirements: &[AssetRequirement],
  mut outcomes: HashMap<AssetId, RequirementOutcome>,
) -> Result<ResolvedSet, FailureReport> {
  let mut resolved = ResolvedSet::new();
  let mut report = FailureReport::default();

  for req in requirements {
    match outcomes.remove(&req.id) {
      Some(Ok(path)) => resolved.insert(req.id.clone(), path),
      Some(Err(failure)) => report.failures.push(AssetFailure {
        id: req.id.clone(),
        failure,
      }),
      None => {}
    }
  }

  if report.is_empty() {
    Ok(resolved)
  } else {
    Err(report)
  }
}
