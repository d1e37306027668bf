use std::sync::Arc;

use thiserror::Error;

use crate::ids::ModuleId;

/// Terminal failure of a deferred module load episode.
///
/// Cloneable because a single episode fans its outcome out to every caller
/// waiting on the shared pending future.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The loader failed on every attempt of the episode.
    #[error("module {module} failed to load after {attempts} attempts: {reason}")]
    Failed {
        module: ModuleId,
        attempts: u32,
        reason: Arc<str>,
    },

    /// The episode was discarded before settling (cache invalidated or the
    /// driver was torn down). "No answer", not "bad answer".
    #[error("module load cancelled")]
    Cancelled,
}

impl LoadError {
    #[must_use]
    pub fn failed(module: ModuleId, attempts: u32, reason: impl AsRef<str>) -> Self {
        Self::Failed {
            module,
            attempts,
            reason: Arc::from(reason.as_ref()),
        }
    }
}
