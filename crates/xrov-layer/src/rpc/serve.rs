//! Main-process side of a connection.

use super::{
    AcquireSwapchainImageArgs, ApplyHapticFeedbackArgs, BeginFrameArgs, BeginSessionArgs,
    CreateActionSpaceFromBindingArgs, CreateReferenceSpaceArgs, CreateSessionArgs,
    CreateSwapchainArgs, DestroySessionArgs, DestroySpaceArgs, DestroySwapchainArgs, EndFrameArgs,
    EndSessionArgs, EnumerateReferenceSpacesArgs, EnumerateSwapchainFormatsArgs,
    GetReferenceSpaceBoundsRectArgs, LocateSpaceArgs, LocateViewsArgs, PollEventArgs,
    ReleaseSwapchainImageArgs, RequestExitSessionArgs, RequestType, RpcArgs,
    StopHapticFeedbackArgs, SyncActionsAndGetStateArgs, WaitFrameArgs, WaitSwapchainImageArgs,
};
use crate::error::{LayerError, Result};
use crate::main_as_overlay::OverlayConnection;
use crate::state::Layer;
use crate::types::XrResult;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use xrov_config::{log_rpc_debug, log_rpc_error, log_rpc_info, log_rpc_warn};
use xrov_ipc::{open_connection, Endpoint, IpcBuffer, IpcError, PointerForm, ARGS_OFFSET};

/// Answers one overlay's requests until the overlay goes away.
pub struct MainRpcServer {
    layer: Arc<Layer>,
    endpoint: Endpoint,
    connection: Arc<OverlayConnection>,
}

impl MainRpcServer {
    pub fn new(layer: Arc<Layer>, endpoint: Endpoint) -> Self {
        let connection = layer.open_overlay_connection();
        Self {
            layer,
            endpoint,
            connection,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection.id
    }

    /// Serve until the overlay destroys its session or the channel closes,
    /// then release everything the overlay owned.
    pub fn run(self) {
        let id = self.connection.id;
        log_rpc_info!("Serving overlay connection", connection = id);

        loop {
            if let Err(err) = self.endpoint.channel().wait_for_request() {
                let reason = err.to_string();
                log_rpc_info!("Overlay connection ended", connection = id, reason = reason.as_str());
                break;
            }
            self.process_request();
            if self.connection.is_finished() {
                break;
            }
        }

        self.layer.close_overlay_connection(&self.connection);
        self.endpoint.channel().close();
    }

    fn process_request(&self) {
        let mut region = self.endpoint.lock_region();
        let mut buf = region.buffer();

        let result = match self.serve(&mut buf) {
            Ok(result) => result,
            Err(err) => {
                let error = err.to_string();
                log_rpc_warn!(
                    "Request failed",
                    connection = self.connection.id,
                    error = error.as_str(),
                    result = err.to_result().name()
                );
                err.to_result()
            }
        };

        if let Err(err) = respond(&mut buf, result) {
            let error = err.to_string();
            log_rpc_error!("Could not write response", connection = self.connection.id, error = error.as_str());
        }
        drop(region);
        self.endpoint.channel().finish_response();
    }

    fn serve(&self, buf: &mut IpcBuffer<'_>) -> Result<XrResult> {
        buf.make_pointers_absolute()?;
        buf.resume_request()?;

        let raw = buf.request_type()?;
        let Some(request) = RequestType::from_raw(raw) else {
            log_rpc_error!("Unknown request type", connection = self.connection.id, request = raw);
            return Ok(XrResult::ERROR_RUNTIME_FAILURE);
        };
        log_rpc_debug!("Serving request", connection = self.connection.id, request = request.name());

        let layer = self.layer.as_ref();
        let conn = self.connection.as_ref();
        match request {
            RequestType::CreateSession => {
                handle::<CreateSessionArgs>(buf, |args| layer.serve_create_session(conn, args))
            }
            RequestType::DestroySession => {
                handle::<DestroySessionArgs>(buf, |args| layer.serve_destroy_session(conn, args))
            }
            RequestType::EnumerateSwapchainFormats => handle::<EnumerateSwapchainFormatsArgs>(buf, |args| {
                layer.serve_enumerate_swapchain_formats(conn, args)
            }),
            RequestType::CreateSwapchain => {
                handle::<CreateSwapchainArgs>(buf, |args| layer.serve_create_swapchain(conn, args))
            }
            RequestType::DestroySwapchain => {
                handle::<DestroySwapchainArgs>(buf, |args| layer.serve_destroy_swapchain(conn, args))
            }
            RequestType::AcquireSwapchainImage => handle::<AcquireSwapchainImageArgs>(buf, |args| {
                layer.serve_acquire_swapchain_image(conn, args)
            }),
            RequestType::WaitSwapchainImage => {
                handle::<WaitSwapchainImageArgs>(buf, |args| layer.serve_wait_swapchain_image(conn, args))
            }
            RequestType::ReleaseSwapchainImage => handle::<ReleaseSwapchainImageArgs>(buf, |args| {
                layer.serve_release_swapchain_image(conn, args)
            }),
            RequestType::EnumerateReferenceSpaces => handle::<EnumerateReferenceSpacesArgs>(buf, |args| {
                layer.serve_enumerate_reference_spaces(conn, args)
            }),
            RequestType::CreateReferenceSpace => handle::<CreateReferenceSpaceArgs>(buf, |args| {
                layer.serve_create_reference_space(conn, args)
            }),
            RequestType::GetReferenceSpaceBoundsRect => handle::<GetReferenceSpaceBoundsRectArgs>(buf, |args| {
                layer.serve_get_reference_space_bounds_rect(conn, args)
            }),
            RequestType::LocateSpace => {
                handle::<LocateSpaceArgs>(buf, |args| layer.serve_locate_space(conn, args))
            }
            RequestType::DestroySpace => {
                handle::<DestroySpaceArgs>(buf, |args| layer.serve_destroy_space(conn, args))
            }
            RequestType::BeginSession => {
                handle::<BeginSessionArgs>(buf, |args| layer.serve_begin_session(conn, args))
            }
            RequestType::EndSession => {
                handle::<EndSessionArgs>(buf, |args| layer.serve_end_session(conn, args))
            }
            RequestType::RequestExitSession => handle::<RequestExitSessionArgs>(buf, |args| {
                layer.serve_request_exit_session(conn, args)
            }),
            RequestType::WaitFrame => handle::<WaitFrameArgs>(buf, |args| layer.serve_wait_frame(conn, args)),
            RequestType::BeginFrame => {
                handle::<BeginFrameArgs>(buf, |args| layer.serve_begin_frame(conn, args))
            }
            RequestType::EndFrame => handle::<EndFrameArgs>(buf, |args| layer.serve_end_frame(conn, args)),
            RequestType::LocateViews => {
                handle::<LocateViewsArgs>(buf, |args| layer.serve_locate_views(conn, args))
            }
            RequestType::PollEvent => handle::<PollEventArgs>(buf, |args| layer.serve_poll_event(conn, args)),
            RequestType::SyncActionsAndGetState => handle::<SyncActionsAndGetStateArgs>(buf, |args| {
                layer.serve_sync_actions_and_get_state(conn, args)
            }),
            RequestType::ApplyHapticFeedback => handle::<ApplyHapticFeedbackArgs>(buf, |args| {
                layer.serve_apply_haptic_feedback(conn, args)
            }),
            RequestType::StopHapticFeedback => handle::<StopHapticFeedbackArgs>(buf, |args| {
                layer.serve_stop_haptic_feedback(conn, args)
            }),
            RequestType::CreateActionSpaceFromBinding => handle::<CreateActionSpaceFromBindingArgs>(buf, |args| {
                layer.serve_create_action_space_from_binding(conn, args)
            }),
        }
    }
}

/// Decode the arguments, run the handler, and store its outputs when it
/// succeeded.
fn handle<A: RpcArgs>(
    buf: &mut IpcBuffer<'_>,
    handler: impl FnOnce(&mut A) -> Result<XrResult>,
) -> Result<XrResult> {
    let mut args = A::deserialize(buf, ARGS_OFFSET)?;
    let result = handler(&mut args)?;
    if result.succeeded() {
        args.write_back(buf, ARGS_OFFSET)?;
    }
    Ok(result)
}

/// Store the result and hand the region back in relative form.
fn respond(buf: &mut IpcBuffer<'_>, result: XrResult) -> Result<()> {
    buf.set_result(result.0)?;
    if buf.pointer_form()? == PointerForm::Absolute {
        buf.make_pointers_relative()?;
    }
    Ok(())
}

/// Connect `overlay` to `main` through a region backed by `path` and serve
/// the connection on its own thread.
pub fn spawn_connection(overlay: &Layer, main: &Arc<Layer>, path: &Path) -> Result<JoinHandle<()>> {
    let options = main.options();
    let (requester, server) = open_connection(path, options.shmem_size, options.response_timeout)?;
    let server = MainRpcServer::new(main.clone(), server);
    let handle = std::thread::Builder::new()
        .name(format!("xrov-overlay-{}", server.connection_id()))
        .spawn(move || server.run())
        .map_err(|err| LayerError::Ipc(IpcError::Io(err)))?;
    overlay.connect_to_main(requester);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::call;
    use crate::state::LayerOptions;
    use crate::testing::{FakeRuntime, TestEnvironment};
    use crate::types::SwapchainHandle;
    use std::time::Duration;

    fn main_layer() -> Arc<Layer> {
        Arc::new(Layer::with_namespace(
            Arc::new(FakeRuntime::new()),
            LayerOptions::default(),
            1,
        ))
    }

    #[test]
    fn test_unknown_request_is_answered_with_failure() {
        let env = TestEnvironment::new().unwrap();
        let main = main_layer();
        let (requester, server) = open_connection(&env.connection_path("unknown"), 64 * 1024, None).unwrap();
        let server = MainRpcServer::new(main.clone(), server);
        let thread = std::thread::spawn(move || server.run());

        {
            let mut region = requester.lock_region();
            let mut buf = region.buffer();
            buf.begin_request(999).unwrap();
            buf.seal_request().unwrap();
            buf.make_pointers_relative().unwrap();
        }
        requester.channel().submit_request().unwrap();
        requester.channel().wait_for_response().unwrap();
        {
            let mut region = requester.lock_region();
            let mut buf = region.buffer();
            buf.make_pointers_absolute().unwrap();
            assert_eq!(XrResult(buf.result().unwrap()), XrResult::ERROR_RUNTIME_FAILURE);
        }

        // The loop is still serving after the bad request.
        let mut args = DestroySwapchainArgs {
            swapchain: SwapchainHandle(0x1234),
        };
        let result = call(&requester, &mut args).unwrap();
        assert_eq!(result, XrResult::ERROR_VALIDATION_FAILURE);

        requester.channel().close();
        thread.join().unwrap();
        assert_eq!(main.main_host().connection_count(), 0);
    }

    #[test]
    fn test_late_answer_never_reaches_a_later_call() {
        let env = TestEnvironment::new().unwrap();
        let (requester, server) = open_connection(
            &env.connection_path("late"),
            64 * 1024,
            Some(Duration::from_millis(150)),
        )
        .unwrap();
        let slow_server = std::thread::spawn(move || {
            server.channel().wait_for_request().unwrap();
            std::thread::sleep(Duration::from_millis(200));
            {
                let mut region = server.lock_region();
                let mut buf = region.buffer();
                buf.make_pointers_absolute().unwrap();
                buf.resume_request().unwrap();
                let mut args = AcquireSwapchainImageArgs::deserialize(&buf, ARGS_OFFSET).unwrap();
                args.index = 2;
                args.write_back(&mut buf, ARGS_OFFSET).unwrap();
                respond(&mut buf, XrResult::SUCCESS).unwrap();
            }
            server.channel().finish_response();
        });

        let mut first = AcquireSwapchainImageArgs {
            swapchain: SwapchainHandle(0x10),
            ..Default::default()
        };
        let err = call(&requester, &mut first).unwrap_err();
        assert_eq!(err.to_result(), XrResult::ERROR_INITIALIZATION_FAILED);

        let mut second = AcquireSwapchainImageArgs {
            swapchain: SwapchainHandle(0x20),
            index: 9,
            ..Default::default()
        };
        let err = call(&requester, &mut second).unwrap_err();
        assert_eq!(err.to_result(), XrResult::ERROR_INITIALIZATION_FAILED);
        assert_eq!(second.index, 9);

        slow_server.join().unwrap();
        let err = call(&requester, &mut second).unwrap_err();
        assert_eq!(err.to_result(), XrResult::ERROR_INITIALIZATION_FAILED);
        assert_eq!(second.index, 9);
    }

    #[test]
    fn test_closed_channel_fails_the_call() {
        let env = TestEnvironment::new().unwrap();
        let (requester, _server) = open_connection(&env.connection_path("closed"), 64 * 1024, None).unwrap();
        requester.channel().close();

        let mut args = EnumerateSwapchainFormatsArgs {
            formats: vec![7; 3],
            ..Default::default()
        };
        let err = call(&requester, &mut args).unwrap_err();
        assert_eq!(err.to_result(), XrResult::ERROR_INITIALIZATION_FAILED);
        assert_eq!(args.formats, vec![7; 3]);
    }
}
