//! Per-command entry points.
//!
//! Every `xr_*` method follows the same shape:
//! 1. resolve the first handle parameter (a miss is a validation failure)
//! 2. proxied handles go to the main process over RPC
//! 3. otherwise swap local handles for actual ones and call the downchain
//! 4. on success register or retire handles and update caches
//!
//! Failures inside the body are [`LayerError`]s; [`entry_point`] turns them
//! into the command's result code so nothing escapes as a panic or error
//! type.

mod action;
mod instance;
mod session;
mod space;
mod swapchain;

use crate::error::{LayerError, Result};
use crate::handles::{HandleExtra, HandleInfo, HandleKind, HandleTable};
use crate::types::XrResult;
use std::sync::Arc;
use xrov_config::{log_handle_error, log_layer_debug};

/// Run an entry point body and report its outcome as a result code.
pub(crate) fn entry_point(command: &'static str, body: impl FnOnce() -> Result<XrResult>) -> XrResult {
    match body() {
        Ok(result) => result,
        Err(err) => {
            let result = err.to_result();
            let error = err.to_string();
            log_layer_debug!(
                "Entry point failed",
                command = command,
                error = error.as_str(),
                result = result.name()
            );
            result
        }
    }
}

/// Look up the handle an entry point was called on.
pub(crate) fn resolve<K: HandleKind, X: HandleExtra>(
    table: &HandleTable<K, X>,
    command: &'static str,
    handle: K,
) -> Result<Arc<HandleInfo<K, X>>> {
    table.get(handle).map_err(|_| {
        log_handle_error!(
            "Entry point called with an unknown handle",
            command = command,
            kind = K::NAME,
            handle = handle.into_raw()
        );
        LayerError::ValidationFailure("unknown handle")
    })
}

/// Failure for commands an overlay cannot run against a proxied session.
pub(crate) fn unsupported_on_proxied(command: &'static str) -> LayerError {
    log_layer_debug!("Command is not available on an overlay session", command = command);
    LayerError::FunctionUnsupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use crate::state::{Layer, LayerOptions};
    use crate::types::{SessionHandle, SwapchainHandle};

    #[test]
    fn test_errors_become_result_codes() {
        let result = entry_point("xrTest", || Err(LayerError::handle_invalid("XrSpace", 3)));
        assert_eq!(result, XrResult::ERROR_HANDLE_INVALID);
        assert_eq!(entry_point("xrTest", || Ok(XrResult::FRAME_DISCARDED)), XrResult::FRAME_DISCARDED);
    }

    #[test]
    fn test_unknown_first_handle_fails_validation() {
        let layer = Layer::with_namespace(Arc::new(FakeRuntime::new()), LayerOptions::default(), 3);
        assert_eq!(
            layer.xr_begin_frame(SessionHandle(0x42), &Default::default()),
            XrResult::ERROR_VALIDATION_FAILURE
        );
        let mut count = 0;
        assert_eq!(
            layer.xr_enumerate_swapchain_images(SwapchainHandle(0x42), &mut count),
            XrResult::ERROR_VALIDATION_FAILURE
        );
    }
}
