use crate::types::{StructureType, XrResult};
use xrov_ipc::{IpcError, TransportError};

/// Failure inside the layer, converted to an [`XrResult`] at the entry point
/// or serve boundary.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("validation failure: {0}")]
    ValidationFailure(&'static str),

    #[error("{kind} {handle:#x} is not a live handle")]
    HandleInvalid { kind: &'static str, handle: u64 },

    #[error("allocation failed while copying a structure chain")]
    OutOfMemory,

    #[error("RPC transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("IPC buffer error: {0}")]
    Ipc(#[from] IpcError),

    #[error("runtime returned {0}")]
    Runtime(XrResult),

    #[error("function not supported")]
    FunctionUnsupported,

    #[error("expected structure {expected:?}, found {found:?}")]
    StructureMismatch {
        expected: StructureType,
        found: StructureType,
    },
}

impl LayerError {
    pub fn handle_invalid(kind: &'static str, handle: u64) -> Self {
        Self::HandleInvalid { kind, handle }
    }

    /// Result code reported to the application for this failure.
    pub fn to_result(&self) -> XrResult {
        match self {
            LayerError::ValidationFailure(_) => XrResult::ERROR_VALIDATION_FAILURE,
            LayerError::HandleInvalid { .. } => XrResult::ERROR_HANDLE_INVALID,
            LayerError::OutOfMemory => XrResult::ERROR_OUT_OF_MEMORY,
            LayerError::Transport(_) => XrResult::ERROR_INITIALIZATION_FAILED,
            LayerError::Ipc(IpcError::OutOfSpace { .. } | IpcError::TooManyPointers(_)) => {
                XrResult::ERROR_OUT_OF_MEMORY
            }
            LayerError::Ipc(_) => XrResult::ERROR_RUNTIME_FAILURE,
            LayerError::Runtime(result) => *result,
            LayerError::FunctionUnsupported => XrResult::ERROR_FUNCTION_UNSUPPORTED,
            LayerError::StructureMismatch { .. } => XrResult::ERROR_VALIDATION_FAILURE,
        }
    }
}

impl From<std::collections::TryReserveError> for LayerError {
    fn from(_: std::collections::TryReserveError) -> Self {
        LayerError::OutOfMemory
    }
}

pub type Result<T, E = LayerError> = std::result::Result<T, E>;

/// Turn a failed runtime result into an error, passing successes through.
pub fn check(result: XrResult) -> Result<XrResult> {
    if result.succeeded() {
        Ok(result)
    } else {
        Err(LayerError::Runtime(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LayerError::handle_invalid("XrSpace", 7).to_result(),
            XrResult::ERROR_HANDLE_INVALID
        );
        assert_eq!(
            LayerError::Transport(TransportError::PeerTerminated).to_result(),
            XrResult::ERROR_INITIALIZATION_FAILED
        );
        assert_eq!(
            LayerError::Ipc(IpcError::TooManyPointers(128)).to_result(),
            XrResult::ERROR_OUT_OF_MEMORY
        );
        assert_eq!(
            LayerError::Runtime(XrResult::ERROR_SESSION_NOT_RUNNING).to_result(),
            XrResult::ERROR_SESSION_NOT_RUNNING
        );
    }

    #[test]
    fn test_check_passes_qualified_successes() {
        assert_eq!(
            check(XrResult::EVENT_UNAVAILABLE).unwrap(),
            XrResult::EVENT_UNAVAILABLE
        );
        assert!(check(XrResult::ERROR_LIMIT_REACHED).is_err());
    }
}
