use crate::devices::{StorageError, Technology};

use super::series::SeriesError;

/// Errors raised by the dispatch engine.
///
/// Step errors leave the engine exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// An intent asks one device to charge and discharge in the same step.
    #[error("{0}: charge and discharge commanded in the same step")]
    ConflictingStorageCommand(Technology),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An action index outside the action set.
    #[error("unknown action index {0}")]
    UnknownAction(usize),

    /// The episode has terminated; call `reset` first.
    #[error("episode complete, reset required")]
    EpisodeComplete,

    /// The grid architecture and the series disagree.
    #[error("grid installed: {installed}, grid series present: {in_series}")]
    GridMismatch { installed: bool, in_series: bool },

    #[error(transparent)]
    Series(#[from] SeriesError),
}
