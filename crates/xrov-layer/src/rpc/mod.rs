//! Overlay-to-main RPC over a shared region.
//!
//! A request is a header tagged with a [`RequestType`] followed by one
//! flat argument record at [`ARGS_OFFSET`]. The overlay side builds it in
//! [`call`]; the main side answers it in [`MainRpcServer`].

mod args;
mod serve;

pub use args::*;
pub use serve::{spawn_connection, MainRpcServer};

use crate::error::{LayerError, Result};
use crate::types::XrResult;
use xrov_config::{log_rpc_debug, log_rpc_error};
use xrov_ipc::{Endpoint, IpcBuffer, ARGS_OFFSET};

macro_rules! request_types {
    ($($name:ident = $value:literal,)*) => {
        /// Wire tag naming the command a request carries.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u64)]
        pub enum RequestType {
            $($name = $value,)*
        }

        impl RequestType {
            pub fn from_raw(raw: u64) -> Option<Self> {
                match raw {
                    $($value => Some(RequestType::$name),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(RequestType::$name => stringify!($name),)*
                }
            }
        }
    };
}

request_types! {
    CreateSession = 1,
    DestroySession = 2,
    EnumerateSwapchainFormats = 3,
    CreateSwapchain = 4,
    DestroySwapchain = 5,
    AcquireSwapchainImage = 6,
    WaitSwapchainImage = 7,
    ReleaseSwapchainImage = 8,
    EnumerateReferenceSpaces = 9,
    CreateReferenceSpace = 10,
    GetReferenceSpaceBoundsRect = 11,
    LocateSpace = 12,
    DestroySpace = 13,
    BeginSession = 14,
    EndSession = 15,
    RequestExitSession = 16,
    WaitFrame = 17,
    BeginFrame = 18,
    EndFrame = 19,
    LocateViews = 20,
    PollEvent = 21,
    SyncActionsAndGetState = 22,
    ApplyHapticFeedback = 23,
    StopHapticFeedback = 24,
    CreateActionSpaceFromBinding = 25,
}

/// Flat argument record of one remotely invokable command.
pub trait RpcArgs: Sized {
    const REQUEST: RequestType;
    const WIRE_SIZE: usize;

    /// Copy every field into the region.
    fn serialize(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()>;

    fn deserialize(buf: &IpcBuffer<'_>, at: usize) -> Result<Self>;

    /// Serving side: store the outputs into the reserved space.
    fn write_back(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()>;

    /// Requesting side: fetch the outputs the server produced.
    fn copy_out(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()>;
}

/// Send `args` to the main process and wait for the answer.
///
/// Outputs in `args` are updated only when the main process reports
/// success. A round trip that does not complete fails with
/// [`LayerError::Transport`] and leaves `args` untouched. A timeout also
/// closes the connection, so every later call on it fails the same way.
pub fn call<A: RpcArgs>(endpoint: &Endpoint, args: &mut A) -> Result<XrResult> {
    // Held for the whole round trip: one request per connection at a time.
    let mut region = endpoint.lock_region();
    {
        let mut buf = region.buffer();
        buf.begin_request(A::REQUEST as u64)?;
        let at = buf.allocate(A::WIRE_SIZE)?;
        debug_assert_eq!(at, ARGS_OFFSET);
        args.serialize(&mut buf, at)?;
        buf.seal_request()?;
        buf.make_pointers_relative()?;
        log_rpc_debug!(
            "Sending request",
            request = A::REQUEST.name(),
            bytes = buf.used() as u64
        );
    }

    let channel = endpoint.channel();
    if let Err(err) = channel.submit_request().and_then(|()| channel.wait_for_response()) {
        let error = err.to_string();
        log_rpc_error!(
            "Main process did not complete request",
            request = A::REQUEST.name(),
            error = error.as_str()
        );
        return Err(LayerError::Transport(err));
    }

    let mut buf = region.buffer();
    buf.make_pointers_absolute()?;
    let result = XrResult(buf.result()?);
    if result.succeeded() {
        args.copy_out(&buf, ARGS_OFFSET)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_round_trips_through_raw() {
        for raw in 1..=25 {
            let request = RequestType::from_raw(raw).unwrap();
            assert_eq!(request as u64, raw);
        }
        assert_eq!(RequestType::from_raw(0), None);
        assert_eq!(RequestType::from_raw(26), None);
        assert_eq!(RequestType::LocateViews.name(), "LocateViews");
    }
}
