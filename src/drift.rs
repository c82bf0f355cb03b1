//! Plan-time detection of schematic file changes.
//!
//! A placed schematic cannot be edited in place, so a change to the file's
//! contents has to become a replacement even when `schema_path` is
//! unchanged. The detector compares the digest recorded at creation with
//! the digest of the file as it is now.

use std::path::Path;

use tracing::{debug, info};

use crate::error::ProviderError;
use crate::hasher::hash_file;
use crate::schema::Diagnostic;

/// The digest recorded in state, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline<'a> {
    /// No digest has been recorded yet.
    None,
    /// The digest recorded by the last successful create.
    Present(&'a str),
}

impl<'a> Baseline<'a> {
    /// Build a baseline from a stored attribute. Empty strings count as absent.
    pub fn from_state(hash: Option<&'a str>) -> Self {
        match hash {
            Some(hash) if !hash.is_empty() => Self::Present(hash),
            _ => Self::None,
        }
    }
}

/// Outcome of comparing the baseline against the current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// Nothing to compare against; the plan proceeds unmodified.
    NoBaseline,
    /// The file still hashes to the recorded digest.
    Unchanged,
    /// The file contents changed since the last create.
    Changed {
        /// The recorded digest.
        previous: String,
        /// The digest of the file as it is now.
        current: String,
    },
}

impl Drift {
    /// Whether the resource must be destroyed and recreated.
    pub fn requires_replace(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// The digest to propose as the next `schema_hash`, when it changes.
    pub fn proposed_hash(&self) -> Option<&str> {
        match self {
            Self::Changed { current, .. } => Some(current.as_str()),
            _ => None,
        }
    }

    /// The warning to attach to the plan, when the file changed.
    pub fn warning(&self, path: &Path) -> Option<Diagnostic> {
        let Self::Changed { previous, current } = self else {
            return None;
        };
        Some(
            Diagnostic::warning("Schema file changed")
                .with_detail(format!(
                    "The contents of {} changed (hash {} -> {}); the schematic will be replaced",
                    path.display(),
                    previous,
                    current
                ))
                .with_attribute("schema_hash"),
        )
    }
}

/// Compare the recorded digest with the digest of the file at `path`.
///
/// Without a baseline the file is not read at all. A file that cannot be
/// read is an error; no default digest is substituted.
pub fn detect(baseline: Baseline<'_>, path: &Path) -> Result<Drift, ProviderError> {
    let previous = match baseline {
        Baseline::None => {
            debug!(path = %path.display(), "No recorded hash, skipping drift check");
            return Ok(Drift::NoBaseline);
        }
        Baseline::Present(hash) => hash,
    };

    let current = hash_file(path)?;
    if current == previous {
        debug!(path = %path.display(), "Schema file unchanged");
        return Ok(Drift::Unchanged);
    }

    info!(
        path = %path.display(),
        previous = %previous,
        current = %current,
        "Schema file changed, replacement required"
    );
    Ok(Drift::Changed {
        previous: previous.to_string(),
        current,
    })
}
