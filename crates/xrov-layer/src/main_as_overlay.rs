//! Main-process side of overlay sessions.
//!
//! An overlay never gets a runtime session of its own. Its session is the
//! main session seen through a [`MainAsOverlaySessionContext`], which
//! tracks what the overlay created, queues events for it and synthesizes
//! its session-state changes from the main session's progress.

use crate::chain::{
    copy_chain, find_in_chain, Chain, CopyPolicy, EventDataEventsLost,
    EventDataReferenceSpaceChangePending, EventDataSessionStateChanged, Field, FrameState,
    Record, SessionCreateInfoOverlayEXTX,
};
use crate::error::{LayerError, Result};
use crate::handles::SpaceOrigin;
use crate::rpc::{
    AcquireSwapchainImageArgs, BeginFrameArgs, BeginSessionArgs, CreateReferenceSpaceArgs,
    CreateSessionArgs, CreateSwapchainArgs, DestroySessionArgs, DestroySpaceArgs,
    DestroySwapchainArgs, EndFrameArgs, EndSessionArgs, EnumerateReferenceSpacesArgs,
    EnumerateSwapchainFormatsArgs, GetReferenceSpaceBoundsRectArgs, LocateSpaceArgs,
    LocateViewsArgs, PollEventArgs, ReleaseSwapchainImageArgs, RequestExitSessionArgs,
    WaitFrameArgs, WaitSwapchainImageArgs,
};
use crate::state::Layer;
use crate::sync::lock;
use crate::types::{
    SessionHandle, SessionState, SpaceHandle, SwapchainHandle, Time, XrResult,
    OVERLAY_EXTENSION_NAME,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use xrov_config::{log_host_debug, log_host_info, log_host_warn};

mod input;

/// What the main process knows about its own session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MainSessionStatus {
    pub session: Option<SessionHandle>,
    pub state: SessionState,
    pub is_running: bool,
    pub has_waited_frame: bool,
    pub frame_state: Option<FrameState>,
}

impl MainSessionStatus {
    fn is_lost(&self) -> bool {
        self.session.is_none() || self.state == SessionState::LOSS_PENDING
    }

    fn current_time(&self) -> Time {
        self.frame_state
            .as_ref()
            .map_or(0, |state| state.predicted_display_time)
    }
}

/// Session state an overlay observes, derived from the main session and
/// from the overlay's own Begin/End/RequestExit calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateTracker {
    state: SessionState,
    is_running: bool,
    exit_requested: bool,
}

impl Default for SessionStateTracker {
    fn default() -> Self {
        Self {
            state: SessionState::UNKNOWN,
            is_running: false,
            exit_requested: false,
        }
    }
}

impl SessionStateTracker {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Take at most one step toward where the main session is. Returns
    /// the new state when it changed.
    pub fn advance(&mut self, main: &MainSessionStatus) -> Option<SessionState> {
        let next = self.next_state(main)?;
        self.state = next;
        Some(next)
    }

    fn next_state(&self, main: &MainSessionStatus) -> Option<SessionState> {
        if self.state != SessionState::LOSS_PENDING && main.is_lost() {
            return Some(SessionState::LOSS_PENDING);
        }
        let leaving = self.exit_requested || !main.is_running || main.state == SessionState::STOPPING;

        match self.state {
            SessionState::UNKNOWN if main.state != SessionState::UNKNOWN => Some(SessionState::IDLE),
            SessionState::IDLE => {
                if self.exit_requested || main.state == SessionState::EXITING {
                    Some(SessionState::EXITING)
                } else if main.is_running && main.has_waited_frame {
                    Some(SessionState::READY)
                } else {
                    None
                }
            }
            SessionState::READY if self.is_running => Some(SessionState::SYNCHRONIZED),
            SessionState::SYNCHRONIZED => {
                if leaving {
                    Some(SessionState::STOPPING)
                } else if matches!(main.state, SessionState::VISIBLE | SessionState::FOCUSED) {
                    Some(SessionState::VISIBLE)
                } else {
                    None
                }
            }
            SessionState::VISIBLE => {
                if leaving || main.state == SessionState::SYNCHRONIZED {
                    Some(SessionState::SYNCHRONIZED)
                } else if main.state == SessionState::FOCUSED {
                    Some(SessionState::FOCUSED)
                } else {
                    None
                }
            }
            SessionState::FOCUSED => {
                if leaving || matches!(main.state, SessionState::VISIBLE | SessionState::SYNCHRONIZED) {
                    Some(SessionState::VISIBLE)
                } else {
                    None
                }
            }
            SessionState::STOPPING if !self.is_running => Some(SessionState::IDLE),
            _ => None,
        }
    }

    pub fn begin(&mut self) -> XrResult {
        if self.is_running {
            return XrResult::ERROR_SESSION_RUNNING;
        }
        self.is_running = true;
        XrResult::SUCCESS
    }

    pub fn end(&mut self) -> XrResult {
        if self.state != SessionState::STOPPING {
            return XrResult::ERROR_SESSION_NOT_STOPPING;
        }
        self.is_running = false;
        XrResult::SUCCESS
    }

    pub fn request_exit(&mut self) -> XrResult {
        if !self.is_running {
            return XrResult::ERROR_SESSION_NOT_RUNNING;
        }
        self.exit_requested = true;
        XrResult::SUCCESS
    }
}

/// Bounded event queue. The last free slot is kept for an "events lost"
/// record that absorbs everything after it.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<Box<Record>>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(2),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn push(&mut self, event: Box<Record>) {
        let len = self.events.len();
        if len + 1 >= self.capacity {
            let mut back = self.events.pop_back();
            if let Some(Record::EventDataEventsLost(lost)) = back.as_deref_mut() {
                lost.lost_event_count += 1;
            } else if len + 1 == self.capacity {
                // One slot left: it becomes the lost-events record.
                self.events.extend(back);
                log_host_warn!("Overlay event queue full, dropping events", capacity = self.capacity as u64);
                self.events
                    .push_back(Box::new(EventDataEventsLost { next: None, lost_event_count: 1 }.into()));
                return;
            } else {
                log_host_warn!("Overlay event queue full, dropping event", capacity = self.capacity as u64);
            }
            self.events.extend(back);
            return;
        }
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Box<Record>> {
        self.events.pop_front()
    }
}

/// Everything the main process holds for one overlay session.
pub struct MainAsOverlaySessionContext {
    /// The main session, which is what the overlay's session handle names.
    pub main_session: SessionHandle,
    /// Where the overlay's layers go relative to the main application's.
    pub placement: u32,
    owned_swapchains: Mutex<HashSet<SwapchainHandle>>,
    owned_spaces: Mutex<HashSet<SpaceHandle>>,
    events: Mutex<EventQueue>,
    tracker: Mutex<SessionStateTracker>,
    layers: Mutex<Vec<Chain>>,
}

impl MainAsOverlaySessionContext {
    pub fn new(main_session: SessionHandle, placement: u32, max_queued_events: usize) -> Self {
        Self {
            main_session,
            placement,
            owned_swapchains: Mutex::default(),
            owned_spaces: Mutex::default(),
            events: Mutex::new(EventQueue::new(max_queued_events)),
            tracker: Mutex::default(),
            layers: Mutex::default(),
        }
    }

    pub fn enqueue_event(&self, event: Box<Record>) {
        lock(&self.events).push(event);
    }

    pub fn queued_events(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn session_state(&self) -> SessionState {
        lock(&self.tracker).state()
    }

    pub fn owns_swapchain(&self, swapchain: SwapchainHandle) -> bool {
        lock(&self.owned_swapchains).contains(&swapchain)
    }

    pub fn owns_space(&self, space: SpaceHandle) -> bool {
        lock(&self.owned_spaces).contains(&space)
    }

    /// Layers from the overlay's latest `EndFrame`.
    pub fn submitted_layers(&self) -> Vec<Chain> {
        lock(&self.layers).clone()
    }

    fn check_session(&self, session: SessionHandle) -> Result<()> {
        if session != self.main_session {
            return Err(LayerError::handle_invalid(SessionHandle::API_NAME, session.0));
        }
        Ok(())
    }

    fn check_swapchain(&self, swapchain: SwapchainHandle) -> Result<()> {
        if !self.owns_swapchain(swapchain) {
            return Err(LayerError::handle_invalid(SwapchainHandle::API_NAME, swapchain.0));
        }
        Ok(())
    }

    fn check_space(&self, space: SpaceHandle) -> Result<()> {
        if !self.owns_space(space) {
            return Err(LayerError::handle_invalid(SpaceHandle::API_NAME, space.0));
        }
        Ok(())
    }
}

/// One overlay connection as seen by the main process.
pub struct OverlayConnection {
    pub id: u64,
    context: Mutex<Option<Arc<MainAsOverlaySessionContext>>>,
    finished: AtomicBool,
}

impl OverlayConnection {
    fn new(id: u64) -> Self {
        Self {
            id,
            context: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> Option<Arc<MainAsOverlaySessionContext>> {
        lock(&self.context).clone()
    }

    /// Set once the overlay destroyed its session; the server stops after
    /// answering that request.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn require_context(&self) -> Result<Arc<MainAsOverlaySessionContext>> {
        self.context()
            .ok_or(LayerError::ValidationFailure("overlay has no session"))
    }
}

/// Main-process bookkeeping for its own session and every overlay.
pub struct MainHost {
    status: Mutex<MainSessionStatus>,
    connections: Mutex<HashMap<u64, Arc<OverlayConnection>>>,
    next_connection: AtomicU64,
}

impl MainHost {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::default(),
            connections: Mutex::default(),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn status(&self) -> MainSessionStatus {
        lock(&self.status).clone()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn connections(&self) -> Vec<Arc<OverlayConnection>> {
        lock(&self.connections).values().cloned().collect()
    }

    pub(crate) fn open_connection(&self) -> Arc<OverlayConnection> {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(OverlayConnection::new(id));
        lock(&self.connections).insert(id, connection.clone());
        log_host_info!("Overlay connected", connection = id);
        connection
    }

    fn remove_connection(&self, id: u64) {
        lock(&self.connections).remove(&id);
    }

    fn contexts(&self) -> Vec<Arc<MainAsOverlaySessionContext>> {
        lock(&self.connections)
            .values()
            .filter_map(|connection| connection.context())
            .collect()
    }

    pub(crate) fn session_created(&self, session: SessionHandle) {
        let mut status = lock(&self.status);
        if status.session.is_none() {
            *status = MainSessionStatus {
                session: Some(session),
                state: SessionState::IDLE,
                ..Default::default()
            };
        }
    }

    pub(crate) fn session_retired(&self, session: SessionHandle) {
        let mut status = lock(&self.status);
        if status.session == Some(session) {
            *status = MainSessionStatus::default();
        }
    }

    pub(crate) fn session_running(&self, session: SessionHandle, running: bool) {
        let mut status = lock(&self.status);
        if status.session == Some(session) {
            status.is_running = running;
            if !running {
                status.has_waited_frame = false;
            }
        }
    }

    pub(crate) fn session_state_changed(&self, session: SessionHandle, state: SessionState) {
        let mut status = lock(&self.status);
        if status.session == Some(session) {
            status.state = state;
        }
    }

    pub(crate) fn frame_waited(&self, session: SessionHandle, frame_state: &FrameState) {
        let mut status = lock(&self.status);
        if status.session == Some(session) {
            status.has_waited_frame = true;
            status.frame_state = Some(FrameState {
                next: None,
                ..frame_state.clone()
            });
        }
    }

    /// The cached frame for an overlay's wait, advancing the cache by one
    /// period.
    fn next_overlay_frame(&self) -> Option<FrameState> {
        let mut status = lock(&self.status);
        let cached = status.frame_state.as_mut()?;
        let frame = cached.clone();
        cached.predicted_display_time += cached.predicted_display_period;
        Some(frame)
    }

    /// Queue a copy of `event` for every overlay session.
    pub(crate) fn broadcast(&self, event: &Chain) -> Result<()> {
        for context in self.contexts() {
            if let Some(copy) = copy_chain(event, CopyPolicy::Everything)? {
                context.enqueue_event(copy);
            }
        }
        Ok(())
    }
}

// Request handlers. Each one answers a request from `connection` using
// this layer's own entry points on the main session.
impl Layer {
    pub fn main_host(&self) -> &MainHost {
        &self.host
    }

    pub(crate) fn open_overlay_connection(&self) -> Arc<OverlayConnection> {
        self.host.open_connection()
    }

    /// Tear down whatever the overlay left behind and forget the connection.
    pub(crate) fn close_overlay_connection(&self, connection: &OverlayConnection) {
        if let Some(context) = lock(&connection.context).take() {
            self.release_overlay_resources(&context);
        }
        self.host.remove_connection(connection.id);
        log_host_info!("Overlay disconnected", connection = connection.id);
    }

    fn release_overlay_resources(&self, context: &MainAsOverlaySessionContext) {
        let swapchains = std::mem::take(&mut *lock(&context.owned_swapchains));
        for swapchain in swapchains {
            let result = self.xr_destroy_swapchain(swapchain);
            if result.failed() {
                log_host_warn!("Could not destroy overlay swapchain", swapchain = swapchain.0, result = result.name());
            }
        }
        let spaces = std::mem::take(&mut *lock(&context.owned_spaces));
        for space in spaces {
            let result = self.xr_destroy_space(space);
            if result.failed() {
                log_host_warn!("Could not destroy overlay space", space = space.0, result = result.name());
            }
        }
        lock(&context.layers).clear();
    }

    pub(crate) fn serve_create_session(&self, connection: &OverlayConnection, args: &mut CreateSessionArgs) -> Result<XrResult> {
        if connection.context().is_some() {
            log_host_warn!("Overlay already has a session", connection = connection.id);
            return Ok(XrResult::ERROR_LIMIT_REACHED);
        }
        let Some(main_session) = self.host.status().session else {
            log_host_warn!("Overlay session requested with no main session", connection = connection.id);
            return Ok(XrResult::ERROR_INITIALIZATION_FAILED);
        };
        let session = self.tables.sessions.get(main_session)?;

        let main_form_factor = self
            .atoms
            .system_info(session.extra.create_info.system_id)
            .map(|info| info.form_factor);
        if main_form_factor != Some(args.system_get_info.form_factor) {
            log_host_warn!(
                "Overlay form factor does not match the main system",
                connection = connection.id,
                requested = args.system_get_info.form_factor.0
            );
            return Ok(XrResult::ERROR_INITIALIZATION_FAILED);
        }

        let instance = self.tables.instances.get(session.instance)?;
        let missing = args
            .instance_create_info
            .enabled_extension_names
            .iter()
            .find(|name| name.as_str() != OVERLAY_EXTENSION_NAME && !instance.extra.has_extension(name));
        if let Some(missing) = missing {
            log_host_warn!(
                "Overlay enabled an extension the main instance did not",
                connection = connection.id,
                extension = missing.as_str()
            );
            return Ok(XrResult::ERROR_INITIALIZATION_FAILED);
        }

        let placement = find_in_chain::<SessionCreateInfoOverlayEXTX>(&args.create_info.next)
            .map_or(0, |overlay| overlay.session_layers_placement);
        let context = MainAsOverlaySessionContext::new(
            main_session,
            placement,
            self.options.max_queued_events_per_overlay,
        );
        *lock(&connection.context) = Some(Arc::new(context));

        args.session = main_session;
        log_host_info!(
            "Overlay session created",
            connection = connection.id,
            placement = u64::from(placement)
        );
        Ok(XrResult::SUCCESS)
    }

    pub(crate) fn serve_destroy_session(&self, connection: &OverlayConnection, args: &mut DestroySessionArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        lock(&connection.context).take();
        self.release_overlay_resources(&context);
        connection.finished.store(true, Ordering::Release);
        log_host_info!("Overlay session destroyed", connection = connection.id);
        Ok(XrResult::SUCCESS)
    }

    pub(crate) fn serve_enumerate_swapchain_formats(
        &self,
        connection: &OverlayConnection,
        args: &mut EnumerateSwapchainFormatsArgs,
    ) -> Result<XrResult> {
        connection.require_context()?.check_session(args.session)?;
        Ok(self.xr_enumerate_swapchain_formats(args.session, &mut args.formats, &mut args.count_output))
    }

    pub(crate) fn serve_create_swapchain(&self, connection: &OverlayConnection, args: &mut CreateSwapchainArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;

        let result = self.xr_create_swapchain(args.session, &args.create_info, &mut args.swapchain);
        if result.failed() {
            return Ok(result);
        }
        lock(&context.owned_swapchains).insert(args.swapchain);

        let images = self.xr_enumerate_swapchain_images(args.swapchain, &mut args.image_count);
        if images.failed() {
            log_host_warn!("Could not count swapchain images", swapchain = args.swapchain.0, result = images.name());
        }
        Ok(result)
    }

    pub(crate) fn serve_destroy_swapchain(&self, connection: &OverlayConnection, args: &mut DestroySwapchainArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_swapchain(args.swapchain)?;
        let result = self.xr_destroy_swapchain(args.swapchain);
        if result.succeeded() {
            lock(&context.owned_swapchains).remove(&args.swapchain);
        }
        Ok(result)
    }

    pub(crate) fn serve_acquire_swapchain_image(
        &self,
        connection: &OverlayConnection,
        args: &mut AcquireSwapchainImageArgs,
    ) -> Result<XrResult> {
        connection.require_context()?.check_swapchain(args.swapchain)?;
        Ok(self.xr_acquire_swapchain_image(args.swapchain, &args.acquire_info, &mut args.index))
    }

    pub(crate) fn serve_wait_swapchain_image(&self, connection: &OverlayConnection, args: &mut WaitSwapchainImageArgs) -> Result<XrResult> {
        connection.require_context()?.check_swapchain(args.swapchain)?;
        Ok(self.xr_wait_swapchain_image(args.swapchain, &args.wait_info))
    }

    pub(crate) fn serve_release_swapchain_image(
        &self,
        connection: &OverlayConnection,
        args: &mut ReleaseSwapchainImageArgs,
    ) -> Result<XrResult> {
        connection.require_context()?.check_swapchain(args.swapchain)?;
        Ok(self.xr_release_swapchain_image(args.swapchain, &args.release_info))
    }

    pub(crate) fn serve_enumerate_reference_spaces(
        &self,
        connection: &OverlayConnection,
        args: &mut EnumerateReferenceSpacesArgs,
    ) -> Result<XrResult> {
        connection.require_context()?.check_session(args.session)?;
        Ok(self.xr_enumerate_reference_spaces(args.session, &mut args.spaces, &mut args.count_output))
    }

    pub(crate) fn serve_create_reference_space(
        &self,
        connection: &OverlayConnection,
        args: &mut CreateReferenceSpaceArgs,
    ) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        let result = self.xr_create_reference_space(args.session, &args.create_info, &mut args.space);
        if result.succeeded() {
            lock(&context.owned_spaces).insert(args.space);
        }
        Ok(result)
    }

    pub(crate) fn serve_get_reference_space_bounds_rect(
        &self,
        connection: &OverlayConnection,
        args: &mut GetReferenceSpaceBoundsRectArgs,
    ) -> Result<XrResult> {
        connection.require_context()?.check_session(args.session)?;
        Ok(self.xr_get_reference_space_bounds_rect(args.session, args.reference_space_type, &mut args.bounds))
    }

    pub(crate) fn serve_locate_space(&self, connection: &OverlayConnection, args: &mut LocateSpaceArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_space(args.space)?;
        context.check_space(args.base_space)?;
        let tracks_action = [args.space, args.base_space].into_iter().any(|space| {
            self.tables
                .spaces
                .get(space)
                .is_ok_and(|entry| matches!(entry.extra.origin, SpaceOrigin::Action { .. }))
        });
        if tracks_action {
            self.refresh_placeholder_poses(context.main_session)?;
        }
        Ok(self.xr_locate_space(args.space, args.base_space, args.time, &mut args.location))
    }

    pub(crate) fn serve_destroy_space(&self, connection: &OverlayConnection, args: &mut DestroySpaceArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_space(args.space)?;
        let result = self.xr_destroy_space(args.space);
        if result.succeeded() {
            lock(&context.owned_spaces).remove(&args.space);
        }
        Ok(result)
    }

    pub(crate) fn serve_begin_session(&self, connection: &OverlayConnection, args: &mut BeginSessionArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        let result = lock(&context.tracker).begin();
        Ok(result)
    }

    pub(crate) fn serve_end_session(&self, connection: &OverlayConnection, args: &mut EndSessionArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        let result = lock(&context.tracker).end();
        if result.succeeded() {
            lock(&context.layers).clear();
        }
        Ok(result)
    }

    pub(crate) fn serve_request_exit_session(
        &self,
        connection: &OverlayConnection,
        args: &mut RequestExitSessionArgs,
    ) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        let result = lock(&context.tracker).request_exit();
        Ok(result)
    }

    pub(crate) fn serve_wait_frame(&self, connection: &OverlayConnection, args: &mut WaitFrameArgs) -> Result<XrResult> {
        connection.require_context()?.check_session(args.session)?;
        let Some(frame) = self.host.next_overlay_frame() else {
            log_host_debug!("Overlay waited before the main session's first frame", connection = connection.id);
            return Ok(XrResult::ERROR_CALL_ORDER_INVALID);
        };
        args.frame_state.predicted_display_time = frame.predicted_display_time;
        args.frame_state.predicted_display_period = frame.predicted_display_period;
        args.frame_state.should_render = frame.should_render;
        Ok(XrResult::SUCCESS)
    }

    pub(crate) fn serve_begin_frame(&self, connection: &OverlayConnection, args: &mut BeginFrameArgs) -> Result<XrResult> {
        connection.require_context()?.check_session(args.session)?;
        Ok(XrResult::SUCCESS)
    }

    pub(crate) fn serve_end_frame(&self, connection: &OverlayConnection, args: &mut EndFrameArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        if args.end_info.layers.len() > self.options.max_overlay_layers {
            return Ok(XrResult::ERROR_LAYER_LIMIT_EXCEEDED);
        }
        let layers = args.end_info.layers.deep_copy()?;
        *lock(&context.layers) = layers;
        Ok(XrResult::SUCCESS)
    }

    pub(crate) fn serve_locate_views(&self, connection: &OverlayConnection, args: &mut LocateViewsArgs) -> Result<XrResult> {
        connection.require_context()?.check_session(args.session)?;
        Ok(self.xr_locate_views(
            args.session,
            &args.locate_info,
            &mut args.view_state,
            &mut args.views,
            &mut args.count_output,
        ))
    }

    /// A pending synthesized state change goes first, then queued events.
    pub(crate) fn serve_poll_event(&self, connection: &OverlayConnection, args: &mut PollEventArgs) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;

        let status = self.host.status();
        let advanced = lock(&context.tracker).advance(&status);
        if let Some(state) = advanced {
            log_host_debug!("Overlay session state changed", connection = connection.id, state = state.0);
            let event = EventDataSessionStateChanged {
                next: None,
                session: context.main_session,
                state,
                time: status.current_time(),
            };
            args.event = Some(Box::new(event.into()));
            return Ok(XrResult::SUCCESS);
        }

        let queued = lock(&context.events).pop();
        match queued {
            Some(event) => {
                args.event = Some(event);
                Ok(XrResult::SUCCESS)
            }
            None => Ok(XrResult::EVENT_UNAVAILABLE),
        }
    }

    /// Main-side bookkeeping for an event the runtime delivered.
    pub(crate) fn observe_main_event(&self, event: &Chain) -> Result<()> {
        if let Some(changed) = find_in_chain::<EventDataSessionStateChanged>(event) {
            self.host.session_state_changed(changed.session, changed.state);
        }
        if find_in_chain::<EventDataReferenceSpaceChangePending>(event).is_some() {
            self.host.broadcast(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::capture_warnings;

    fn main_status(state: SessionState, is_running: bool) -> MainSessionStatus {
        MainSessionStatus {
            session: Some(SessionHandle(1)),
            state,
            is_running,
            has_waited_frame: is_running,
            frame_state: None,
        }
    }

    fn drain(tracker: &mut SessionStateTracker, main: &MainSessionStatus) -> Vec<SessionState> {
        std::iter::from_fn(|| tracker.advance(main)).take(16).collect()
    }

    #[test]
    fn test_overlay_follows_main_to_focused() {
        let mut tracker = SessionStateTracker::default();

        let idle = main_status(SessionState::IDLE, false);
        assert_eq!(drain(&mut tracker, &idle), vec![SessionState::IDLE]);

        let running = main_status(SessionState::FOCUSED, true);
        assert_eq!(drain(&mut tracker, &running), vec![SessionState::READY]);

        assert_eq!(tracker.begin(), XrResult::SUCCESS);
        assert_eq!(tracker.begin(), XrResult::ERROR_SESSION_RUNNING);
        assert_eq!(
            drain(&mut tracker, &running),
            vec![SessionState::SYNCHRONIZED, SessionState::VISIBLE, SessionState::FOCUSED]
        );
    }

    #[test]
    fn test_exit_request_walks_down_to_exiting() {
        let mut tracker = SessionStateTracker::default();
        let running = main_status(SessionState::FOCUSED, true);
        drain(&mut tracker, &running);
        assert_eq!(tracker.end(), XrResult::ERROR_SESSION_NOT_STOPPING);
        assert_eq!(tracker.request_exit(), XrResult::ERROR_SESSION_NOT_RUNNING);

        tracker.begin();
        drain(&mut tracker, &running);
        assert_eq!(tracker.state(), SessionState::FOCUSED);

        assert_eq!(tracker.request_exit(), XrResult::SUCCESS);
        assert_eq!(
            drain(&mut tracker, &running),
            vec![SessionState::VISIBLE, SessionState::SYNCHRONIZED, SessionState::STOPPING]
        );
        assert_eq!(tracker.end(), XrResult::SUCCESS);
        assert_eq!(
            drain(&mut tracker, &running),
            vec![SessionState::IDLE, SessionState::EXITING]
        );
    }

    #[test]
    fn test_main_loss_is_reported_once() {
        let mut tracker = SessionStateTracker::default();
        drain(&mut tracker, &main_status(SessionState::IDLE, false));

        let lost = MainSessionStatus::default();
        assert_eq!(drain(&mut tracker, &lost), vec![SessionState::LOSS_PENDING]);
        assert_eq!(tracker.advance(&lost), None);
    }

    #[test]
    fn test_main_stopping_stops_overlay() {
        let mut tracker = SessionStateTracker::default();
        drain(&mut tracker, &main_status(SessionState::VISIBLE, true));
        tracker.begin();
        drain(&mut tracker, &main_status(SessionState::VISIBLE, true));
        assert_eq!(tracker.state(), SessionState::VISIBLE);

        let stopping = main_status(SessionState::STOPPING, true);
        assert_eq!(
            drain(&mut tracker, &stopping),
            vec![SessionState::SYNCHRONIZED, SessionState::STOPPING]
        );
    }

    fn state_event(time: Time) -> Box<Record> {
        Box::new(
            EventDataSessionStateChanged {
                time,
                ..Default::default()
            }
            .into(),
        )
    }

    #[test]
    fn test_queue_coalesces_overflow_into_events_lost() {
        let mut queue = EventQueue::new(4);
        let (_, warnings) = capture_warnings(|| {
            for time in 0..10 {
                queue.push(state_event(time));
            }
        });
        assert_eq!(warnings, 1);
        assert_eq!(queue.len(), 4);

        let delivered: Vec<Box<Record>> = std::iter::from_fn(|| queue.pop()).collect();
        for (time, event) in delivered.iter().take(3).enumerate() {
            let Record::EventDataSessionStateChanged(changed) = event.as_ref() else {
                panic!("expected a state change, got {event:?}");
            };
            assert_eq!(changed.time, time as Time);
        }
        let Record::EventDataEventsLost(lost) = delivered[3].as_ref() else {
            panic!("expected events lost");
        };
        assert_eq!(lost.lost_event_count, 7);
    }

    #[test]
    fn test_queue_recovers_after_draining() {
        let mut queue = EventQueue::new(2);
        queue.push(state_event(1));
        queue.push(state_event(2));
        assert_eq!(queue.len(), 2);
        queue.pop();
        queue.pop();
        queue.push(state_event(3));
        let Record::EventDataSessionStateChanged(changed) = queue.pop().unwrap().as_ref().clone() else {
            panic!("expected a state change");
        };
        assert_eq!(changed.time, 3);
    }

    #[test]
    fn test_overlay_frames_advance_by_period() {
        let host = MainHost::new();
        host.session_created(SessionHandle(1));
        assert_eq!(host.next_overlay_frame(), None);

        host.frame_waited(
            SessionHandle(1),
            &FrameState {
                predicted_display_time: 1000,
                predicted_display_period: 10,
                should_render: true,
                ..Default::default()
            },
        );
        assert_eq!(host.next_overlay_frame().unwrap().predicted_display_time, 1000);
        assert_eq!(host.next_overlay_frame().unwrap().predicted_display_time, 1010);
        assert!(host.status().has_waited_frame);
    }
}
