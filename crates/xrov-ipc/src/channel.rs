//! Request/response doorbell shared by the two ends of a connection.
//!
//! One request may be outstanding per connection. The requester rings
//! [`RpcChannel::submit_request`] and blocks in
//! [`RpcChannel::wait_for_response`]; the server blocks in
//! [`RpcChannel::wait_for_request`] and rings [`RpcChannel::finish_response`].
//! Either side calling [`RpcChannel::close`] wakes every waiter with
//! [`TransportError::PeerTerminated`].
//!
//! A requester that gives up on a response closes the channel: the
//! abandoned request may still be answered, and that late answer must
//! never be read as the reply to a later request.

use crate::region::SharedRegion;
use crate::{IpcError, TransportError};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use xrov_config::{log_ipc_debug, log_ipc_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Request,
    Response,
}

#[derive(Debug)]
struct Doorbell {
    phase: Phase,
    closed: bool,
}

pub struct RpcChannel {
    state: Mutex<Doorbell>,
    signal: Condvar,
    timeout: Option<Duration>,
}

impl RpcChannel {
    /// `timeout` bounds how long the requester waits for a response; `None`
    /// waits until the response arrives or the channel closes.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(Doorbell {
                phase: Phase::Idle,
                closed: false,
            }),
            signal: Condvar::new(),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Doorbell> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit_request(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::PeerTerminated);
        }
        state.phase = Phase::Request;
        self.signal.notify_all();
        Ok(())
    }

    pub fn wait_for_response(&self) -> Result<(), TransportError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if state.phase == Phase::Response {
                state.phase = Phase::Idle;
                return Ok(());
            }
            if state.closed {
                return Err(TransportError::PeerTerminated);
            }
            state = match deadline {
                None => self
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        log_ipc_warn!("Gave up waiting for response, closing channel");
                        state.closed = true;
                        self.signal.notify_all();
                        return Err(TransportError::TimedOut);
                    }
                    self.signal
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    pub fn wait_for_request(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(TransportError::PeerTerminated);
            }
            if state.phase == Phase::Request {
                return Ok(());
            }
            state = self
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn finish_response(&self) {
        let mut state = self.lock();
        state.phase = Phase::Response;
        self.signal.notify_all();
    }

    /// Mark the peer as gone. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            log_ipc_debug!("Channel closed");
        }
        state.closed = true;
        self.signal.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// One side of a connection: its own mapping plus the shared doorbell.
///
/// The region mutex is the connection-level lock that serializes concurrent
/// requesters onto the single shared buffer.
pub struct Endpoint {
    region: Mutex<SharedRegion>,
    channel: Arc<RpcChannel>,
}

impl Endpoint {
    pub fn new(region: SharedRegion, channel: Arc<RpcChannel>) -> Self {
        Self {
            region: Mutex::new(region),
            channel,
        }
    }

    pub fn lock_region(&self) -> MutexGuard<'_, SharedRegion> {
        self.region.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }
}

/// Map the region at `path` twice and wire both mappings to one doorbell.
/// Returns `(requester, server)`.
pub fn open_connection(
    path: &Path,
    size: usize,
    timeout: Option<Duration>,
) -> Result<(Endpoint, Endpoint), IpcError> {
    let channel = Arc::new(RpcChannel::new(timeout));
    let requester = SharedRegion::create_or_open(path, size)?;
    let server = SharedRegion::create_or_open(path, size)?;
    Ok((
        Endpoint::new(requester, channel.clone()),
        Endpoint::new(server, channel),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_request_response_cycle() {
        let channel = Arc::new(RpcChannel::new(None));
        let server = channel.clone();
        let handle = thread::spawn(move || {
            server.wait_for_request().unwrap();
            server.finish_response();
        });

        channel.submit_request().unwrap();
        channel.wait_for_response().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_close_wakes_requester() {
        let channel = Arc::new(RpcChannel::new(None));
        let server = channel.clone();
        let handle = thread::spawn(move || {
            server.wait_for_request().unwrap();
            server.close();
        });

        channel.submit_request().unwrap();
        assert_eq!(
            channel.wait_for_response(),
            Err(TransportError::PeerTerminated)
        );
        handle.join().unwrap();
        assert!(channel.submit_request().is_err());
    }

    #[test]
    fn test_timeout() {
        let channel = RpcChannel::new(Some(Duration::from_millis(20)));
        channel.submit_request().unwrap();
        assert_eq!(channel.wait_for_response(), Err(TransportError::TimedOut));
        assert!(channel.is_closed());
    }

    #[test]
    fn test_late_response_is_not_taken_for_the_next_one() {
        let channel = Arc::new(RpcChannel::new(Some(Duration::from_millis(150))));
        let server = channel.clone();
        let handle = thread::spawn(move || {
            server.wait_for_request().unwrap();
            thread::sleep(Duration::from_millis(200));
            server.finish_response();
            server.wait_for_request()
        });

        channel.submit_request().unwrap();
        assert_eq!(channel.wait_for_response(), Err(TransportError::TimedOut));

        let second = channel
            .submit_request()
            .and_then(|()| channel.wait_for_response());
        assert_eq!(second, Err(TransportError::PeerTerminated));
        assert_eq!(handle.join().unwrap(), Err(TransportError::PeerTerminated));
    }
}
