//! Test doubles for exercising the layer without a runtime.
//!
//! Provides:
//! - `FakeRuntime`: a [`Downchain`] that records every call and issues
//!   actual handles from its own value range
//! - `capture_warnings`: counts warn-level events emitted by a closure
//! - `TestEnvironment`: an isolated directory for shared-memory files
//!
//! # Usage
//!
//! ```ignore
//! use xrov_layer::testing::{capture_warnings, FakeRuntime};
//!
//! let runtime = Arc::new(FakeRuntime::new());
//! let (_, warnings) = capture_warnings(|| { /* ... */ });
//! assert_eq!(runtime.count("destroy_swapchain"), 1);
//! ```

use crate::actions::{top_level_of, ActionState, TOP_LEVEL_PATHS};
use crate::chain::{
    ActionCreateInfo, ActionSetCreateInfo, ActionSpaceCreateInfo, ActionStateBoolean,
    ActionStateFloat, ActionStateGetInfo, ActionStatePose, ActionStateVector2f, ActionsSyncInfo,
    Chain, DebugUtilsLabelEXT,
    DebugUtilsMessengerCreateInfoEXT, DebugUtilsObjectNameInfoEXT, Extent2Df, FrameBeginInfo,
    FrameEndInfo, FrameState, FrameWaitInfo, HapticActionInfo, HapticVibration,
    InstanceCreateInfo, InteractionProfileState, InteractionProfileSuggestedBinding, Posef, Quaternionf, ReferenceSpaceCreateInfo,
    SessionActionSetsAttachInfo, SessionBeginInfo, SessionCreateInfo, SpaceLocation,
    SwapchainCreateInfo, SwapchainImageAcquireInfo, SwapchainImageReleaseInfo,
    SwapchainImageWaitInfo, SystemGetInfo, Vector2f, View, ViewLocateInfo, ViewState,
};
use crate::downchain::Downchain;
use crate::sync::lock;
use crate::types::{
    ActionHandle, ActionSetHandle, ActionType, DebugUtilsMessengerHandle, FormFactor, InstanceHandle, Path,
    ReferenceSpaceType, SessionHandle, SpaceHandle, SwapchainHandle, SystemId, Time, XrResult,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Actual handles issued by the fake carry this tag in their top byte so
/// they never collide with local values.
pub const ACTUAL_HANDLE_TAG: u64 = 0xA5 << 56;

pub const FAKE_SYSTEM_ID: SystemId = SystemId(ACTUAL_HANDLE_TAG | 0x5);
pub const FAKE_SWAPCHAIN_FORMATS: [i64; 3] = [0x8C43, 0x8058, 0x881A];
pub const FAKE_IMAGE_COUNT: u32 = 3;
pub const FAKE_DISPLAY_PERIOD: i64 = 11_111_111;

/// Physical input the fake reports for one binding path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeInput {
    Click(bool),
    Value(f32),
    Axes(f32, f32),
    Pose,
}

impl FakeInput {
    fn state(self, time: Time) -> ActionState {
        match self {
            FakeInput::Click(current_state) => ActionState::Boolean(ActionStateBoolean {
                current_state,
                last_change_time: time,
                is_active: true,
                ..Default::default()
            }),
            FakeInput::Value(current_state) => ActionState::Float(ActionStateFloat {
                current_state,
                last_change_time: time,
                is_active: true,
                ..Default::default()
            }),
            FakeInput::Axes(x, y) => ActionState::Vector2f(ActionStateVector2f {
                current_state: Vector2f { x, y },
                last_change_time: time,
                is_active: true,
                ..Default::default()
            }),
            FakeInput::Pose => ActionState::Pose(ActionStatePose {
                next: None,
                is_active: true,
            }),
        }
    }
}

/// A haptic output that reached a bound device.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeVibration {
    pub binding: String,
    pub vibration: HapticVibration,
}

struct FakeAction {
    action_set: ActionSetHandle,
    action_type: ActionType,
    subaction_paths: Vec<Path>,
}

#[derive(Default)]
struct FakeState {
    instances: HashSet<InstanceHandle>,
    sessions: HashSet<SessionHandle>,
    running: HashSet<SessionHandle>,
    swapchains: HashMap<SwapchainHandle, u32>,
    spaces: HashSet<SpaceHandle>,
    action_sets: HashSet<ActionSetHandle>,
    actions: HashMap<ActionHandle, FakeAction>,
    attached: HashMap<SessionHandle, Vec<ActionSetHandle>>,
    unfocused: bool,
    current_profiles: HashMap<String, String>,
    inputs: HashMap<String, FakeInput>,
    vibrations: Vec<FakeVibration>,
    messengers: HashSet<DebugUtilsMessengerHandle>,
    paths: HashMap<String, Path>,
    events: VecDeque<Chain>,
    bindings: Vec<InteractionProfileSuggestedBinding>,
    frame_time: Time,
}

/// In-memory stand-in for the runtime below the layer.
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<&'static str>>,
    next_handle: AtomicU64,
    form_factor: FormFactor,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::with_form_factor(FormFactor::HEAD_MOUNTED_DISPLAY)
    }

    /// A runtime whose only system has `form_factor`.
    pub fn with_form_factor(form_factor: FormFactor) -> Self {
        Self {
            state: Mutex::default(),
            calls: Mutex::default(),
            next_handle: AtomicU64::new(0x100),
            form_factor,
        }
    }

    fn record(&self, call: &'static str) {
        lock(&self.calls).push(call);
    }

    fn issue(&self) -> u64 {
        ACTUAL_HANDLE_TAG | self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// How many times `call` reached the runtime.
    pub fn count(&self, call: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == call).count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    /// Queue an event for the next `poll_event`.
    pub fn push_event(&self, event: Chain) {
        lock(&self.state).events.push_back(event);
    }

    pub fn live_swapchains(&self) -> usize {
        lock(&self.state).swapchains.len()
    }

    pub fn live_spaces(&self) -> usize {
        lock(&self.state).spaces.len()
    }

    pub fn live_sessions(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    pub fn suggested_bindings(&self) -> Vec<InteractionProfileSuggestedBinding> {
        lock(&self.state).bindings.clone()
    }

    /// Make `profile` the interaction profile active for `top_level`.
    pub fn set_current_profile(&self, top_level: &str, profile: &str) {
        lock(&self.state)
            .current_profiles
            .insert(top_level.to_string(), profile.to_string());
    }

    /// Report `input` on the full binding path `binding`.
    pub fn set_input(&self, binding: &str, input: FakeInput) {
        lock(&self.state).inputs.insert(binding.to_string(), input);
    }

    /// Unfocused sessions sync to inactive input.
    pub fn set_focused(&self, focused: bool) {
        lock(&self.state).unfocused = !focused;
    }

    pub fn vibrations(&self) -> Vec<FakeVibration> {
        lock(&self.state).vibrations.clone()
    }

    pub fn live_actions(&self) -> usize {
        lock(&self.state).actions.len()
    }
}

impl FakeState {
    fn intern(&mut self, path_string: &str) -> Path {
        let next = Path(self.paths.len() as u64 + 1);
        *self.paths.entry(path_string.to_string()).or_insert(next)
    }

    fn name_of(&self, path: Path) -> Option<&str> {
        self.paths
            .iter()
            .find(|(_, p)| **p == path)
            .map(|(s, _)| s.as_str())
    }

    fn is_attached(&self, session: SessionHandle, action_set: ActionSetHandle) -> bool {
        self.attached
            .get(&session)
            .is_some_and(|sets| sets.contains(&action_set))
    }

    /// Binding paths `action` reaches through the current profiles,
    /// narrowed to `subaction_path` unless it is null.
    fn bound_paths(&self, action: ActionHandle, subaction_path: Path) -> Vec<String> {
        let wanted = match subaction_path {
            Path::NULL => None,
            path => self.name_of(path),
        };
        let mut bound = Vec::new();
        for (top_level, profile) in &self.current_profiles {
            if wanted.is_some_and(|wanted| wanted != top_level) {
                continue;
            }
            let Some(profile) = self.paths.get(profile) else {
                continue;
            };
            let latest = self
                .bindings
                .iter()
                .rev()
                .find(|suggested| suggested.interaction_profile == *profile);
            let Some(latest) = latest else {
                continue;
            };
            for suggested in &latest.suggested_bindings {
                if suggested.action != action {
                    continue;
                }
                let Some(binding) = self.name_of(suggested.binding) else {
                    continue;
                };
                if top_level_of(binding) == Some(top_level.as_str()) {
                    bound.push(binding.to_string());
                }
            }
        }
        bound
    }

    fn action_state(&self, session: SessionHandle, info: &ActionStateGetInfo, ty: ActionType) -> Result<ActionState, XrResult> {
        let action = self.actions.get(&info.action).ok_or(XrResult::ERROR_HANDLE_INVALID)?;
        if action.action_type != ty {
            return Err(XrResult::ERROR_ACTION_TYPE_MISMATCH);
        }
        if !self.is_attached(session, action.action_set) {
            return Err(XrResult::ERROR_ACTIONSET_NOT_ATTACHED);
        }
        if info.subaction_path != Path::NULL && !action.subaction_paths.contains(&info.subaction_path) {
            return Err(XrResult::ERROR_PATH_UNSUPPORTED);
        }
        let mut state = ActionState::cleared(ty).ok_or(XrResult::ERROR_ACTION_TYPE_MISMATCH)?;
        if self.unfocused {
            return Ok(state);
        }
        for binding in self.bound_paths(info.action, info.subaction_path) {
            let Some(input) = self.inputs.get(&binding) else {
                continue;
            };
            if let Some(reading) = input.state(self.frame_time).coerce(ty) {
                state.merge(&reading);
            }
        }
        Ok(state)
    }
}

fn fill_enumeration<T: Clone>(available: &[T], out: &mut Vec<T>, count_output: &mut u32) -> XrResult {
    *count_output = available.len() as u32;
    if out.is_empty() {
        return XrResult::SUCCESS;
    }
    if out.len() < available.len() {
        out.clear();
        return XrResult::ERROR_SIZE_INSUFFICIENT;
    }
    out.clear();
    out.extend_from_slice(available);
    XrResult::SUCCESS
}

fn remove_or_invalid<T: std::hash::Hash + Eq>(set: &mut HashSet<T>, value: &T) -> XrResult {
    if set.remove(value) {
        XrResult::SUCCESS
    } else {
        XrResult::ERROR_HANDLE_INVALID
    }
}

impl Downchain for FakeRuntime {
    fn create_instance(&self, _info: &InstanceCreateInfo, instance: &mut InstanceHandle) -> XrResult {
        self.record("create_instance");
        *instance = InstanceHandle(self.issue());
        lock(&self.state).instances.insert(*instance);
        XrResult::SUCCESS
    }

    fn destroy_instance(&self, instance: InstanceHandle) -> XrResult {
        self.record("destroy_instance");
        remove_or_invalid(&mut lock(&self.state).instances, &instance)
    }

    fn get_system(&self, _instance: InstanceHandle, info: &SystemGetInfo, system: &mut SystemId) -> XrResult {
        self.record("get_system");
        if info.form_factor != self.form_factor {
            return XrResult::ERROR_FORM_FACTOR_UNAVAILABLE;
        }
        *system = FAKE_SYSTEM_ID;
        XrResult::SUCCESS
    }

    fn string_to_path(&self, _instance: InstanceHandle, path_string: &str, path: &mut Path) -> XrResult {
        self.record("string_to_path");
        if !path_string.starts_with('/') {
            return XrResult::ERROR_PATH_INVALID;
        }
        *path = lock(&self.state).intern(path_string);
        XrResult::SUCCESS
    }

    fn path_to_string(&self, _instance: InstanceHandle, path: Path, out: &mut String) -> XrResult {
        self.record("path_to_string");
        match lock(&self.state).name_of(path) {
            Some(name) => {
                *out = name.to_string();
                XrResult::SUCCESS
            }
            None => XrResult::ERROR_PATH_INVALID,
        }
    }

    fn poll_event(&self, _instance: InstanceHandle, event: &mut Chain) -> XrResult {
        self.record("poll_event");
        match lock(&self.state).events.pop_front() {
            Some(next) => {
                *event = next;
                XrResult::SUCCESS
            }
            None => XrResult::EVENT_UNAVAILABLE,
        }
    }

    fn create_session(&self, _instance: InstanceHandle, info: &SessionCreateInfo, session: &mut SessionHandle) -> XrResult {
        self.record("create_session");
        if info.system_id != FAKE_SYSTEM_ID {
            return XrResult::ERROR_SYSTEM_INVALID;
        }
        *session = SessionHandle(self.issue());
        lock(&self.state).sessions.insert(*session);
        XrResult::SUCCESS
    }

    fn destroy_session(&self, session: SessionHandle) -> XrResult {
        self.record("destroy_session");
        let mut state = lock(&self.state);
        state.running.remove(&session);
        state.attached.remove(&session);
        remove_or_invalid(&mut state.sessions, &session)
    }

    fn begin_session(&self, session: SessionHandle, _info: &SessionBeginInfo) -> XrResult {
        self.record("begin_session");
        let mut state = lock(&self.state);
        if !state.sessions.contains(&session) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        if !state.running.insert(session) {
            return XrResult::ERROR_SESSION_RUNNING;
        }
        XrResult::SUCCESS
    }

    fn end_session(&self, session: SessionHandle) -> XrResult {
        self.record("end_session");
        if lock(&self.state).running.remove(&session) {
            XrResult::SUCCESS
        } else {
            XrResult::ERROR_SESSION_NOT_RUNNING
        }
    }

    fn request_exit_session(&self, session: SessionHandle) -> XrResult {
        self.record("request_exit_session");
        if lock(&self.state).running.contains(&session) {
            XrResult::SUCCESS
        } else {
            XrResult::ERROR_SESSION_NOT_RUNNING
        }
    }

    fn wait_frame(&self, _session: SessionHandle, _info: &FrameWaitInfo, frame_state: &mut FrameState) -> XrResult {
        self.record("wait_frame");
        let mut state = lock(&self.state);
        state.frame_time += FAKE_DISPLAY_PERIOD;
        frame_state.predicted_display_time = state.frame_time;
        frame_state.predicted_display_period = FAKE_DISPLAY_PERIOD;
        frame_state.should_render = true;
        XrResult::SUCCESS
    }

    fn begin_frame(&self, _session: SessionHandle, _info: &FrameBeginInfo) -> XrResult {
        self.record("begin_frame");
        XrResult::SUCCESS
    }

    fn end_frame(&self, _session: SessionHandle, _info: &FrameEndInfo) -> XrResult {
        self.record("end_frame");
        XrResult::SUCCESS
    }

    fn locate_views(
        &self,
        _session: SessionHandle,
        _info: &ViewLocateInfo,
        state: &mut ViewState,
        views: &mut Vec<View>,
        count_output: &mut u32,
    ) -> XrResult {
        self.record("locate_views");
        let eye = |x: f32| View {
            pose: Posef {
                orientation: Quaternionf::IDENTITY,
                position: crate::chain::Vector3f { x, y: 1.6, z: 0.0 },
            },
            ..Default::default()
        };
        state.view_state_flags = 0xF;
        fill_enumeration(&[eye(-0.032), eye(0.032)], views, count_output)
    }

    fn enumerate_swapchain_formats(&self, _session: SessionHandle, formats: &mut Vec<i64>, count_output: &mut u32) -> XrResult {
        self.record("enumerate_swapchain_formats");
        fill_enumeration(&FAKE_SWAPCHAIN_FORMATS, formats, count_output)
    }

    fn create_swapchain(&self, session: SessionHandle, _info: &SwapchainCreateInfo, swapchain: &mut SwapchainHandle) -> XrResult {
        self.record("create_swapchain");
        let mut state = lock(&self.state);
        if !state.sessions.contains(&session) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        *swapchain = SwapchainHandle(self.issue());
        state.swapchains.insert(*swapchain, FAKE_IMAGE_COUNT);
        XrResult::SUCCESS
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> XrResult {
        self.record("destroy_swapchain");
        match lock(&self.state).swapchains.remove(&swapchain) {
            Some(_) => XrResult::SUCCESS,
            None => XrResult::ERROR_HANDLE_INVALID,
        }
    }

    fn enumerate_swapchain_images(&self, swapchain: SwapchainHandle, count_output: &mut u32) -> XrResult {
        self.record("enumerate_swapchain_images");
        match lock(&self.state).swapchains.get(&swapchain) {
            Some(count) => {
                *count_output = *count;
                XrResult::SUCCESS
            }
            None => XrResult::ERROR_HANDLE_INVALID,
        }
    }

    fn acquire_swapchain_image(&self, swapchain: SwapchainHandle, _info: &SwapchainImageAcquireInfo, index: &mut u32) -> XrResult {
        self.record("acquire_swapchain_image");
        if !lock(&self.state).swapchains.contains_key(&swapchain) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        *index = self.count("acquire_swapchain_image") as u32 % FAKE_IMAGE_COUNT;
        XrResult::SUCCESS
    }

    fn wait_swapchain_image(&self, swapchain: SwapchainHandle, _info: &SwapchainImageWaitInfo) -> XrResult {
        self.record("wait_swapchain_image");
        if lock(&self.state).swapchains.contains_key(&swapchain) {
            XrResult::SUCCESS
        } else {
            XrResult::ERROR_HANDLE_INVALID
        }
    }

    fn release_swapchain_image(&self, swapchain: SwapchainHandle, _info: &SwapchainImageReleaseInfo) -> XrResult {
        self.record("release_swapchain_image");
        if lock(&self.state).swapchains.contains_key(&swapchain) {
            XrResult::SUCCESS
        } else {
            XrResult::ERROR_HANDLE_INVALID
        }
    }

    fn enumerate_reference_spaces(&self, _session: SessionHandle, spaces: &mut Vec<ReferenceSpaceType>, count_output: &mut u32) -> XrResult {
        self.record("enumerate_reference_spaces");
        let available = [
            ReferenceSpaceType::VIEW,
            ReferenceSpaceType::LOCAL,
            ReferenceSpaceType::STAGE,
        ];
        fill_enumeration(&available, spaces, count_output)
    }

    fn create_reference_space(&self, session: SessionHandle, _info: &ReferenceSpaceCreateInfo, space: &mut SpaceHandle) -> XrResult {
        self.record("create_reference_space");
        let mut state = lock(&self.state);
        if !state.sessions.contains(&session) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        *space = SpaceHandle(self.issue());
        state.spaces.insert(*space);
        XrResult::SUCCESS
    }

    fn get_reference_space_bounds_rect(&self, _session: SessionHandle, ty: ReferenceSpaceType, bounds: &mut Extent2Df) -> XrResult {
        self.record("get_reference_space_bounds_rect");
        if ty != ReferenceSpaceType::STAGE {
            *bounds = Extent2Df::default();
            return XrResult::SPACE_BOUNDS_UNAVAILABLE;
        }
        *bounds = Extent2Df {
            width: 3.0,
            height: 2.5,
        };
        XrResult::SUCCESS
    }

    fn create_action_space(&self, session: SessionHandle, info: &ActionSpaceCreateInfo, space: &mut SpaceHandle) -> XrResult {
        self.record("create_action_space");
        let mut state = lock(&self.state);
        if !state.sessions.contains(&session) || !state.actions.contains_key(&info.action) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        *space = SpaceHandle(self.issue());
        state.spaces.insert(*space);
        XrResult::SUCCESS
    }

    fn locate_space(&self, space: SpaceHandle, base_space: SpaceHandle, time: Time, location: &mut SpaceLocation) -> XrResult {
        self.record("locate_space");
        let state = lock(&self.state);
        if !state.spaces.contains(&space) || !state.spaces.contains(&base_space) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        location.location_flags = 0xF;
        location.pose.orientation = Quaternionf::IDENTITY;
        location.pose.position.z = (time % 1000) as f32;
        XrResult::SUCCESS
    }

    fn destroy_space(&self, space: SpaceHandle) -> XrResult {
        self.record("destroy_space");
        remove_or_invalid(&mut lock(&self.state).spaces, &space)
    }

    fn create_action_set(&self, _instance: InstanceHandle, _info: &ActionSetCreateInfo, action_set: &mut ActionSetHandle) -> XrResult {
        self.record("create_action_set");
        *action_set = ActionSetHandle(self.issue());
        lock(&self.state).action_sets.insert(*action_set);
        XrResult::SUCCESS
    }

    fn destroy_action_set(&self, action_set: ActionSetHandle) -> XrResult {
        self.record("destroy_action_set");
        let mut state = lock(&self.state);
        state.actions.retain(|_, action| action.action_set != action_set);
        remove_or_invalid(&mut state.action_sets, &action_set)
    }

    fn create_action(&self, action_set: ActionSetHandle, info: &ActionCreateInfo, action: &mut ActionHandle) -> XrResult {
        self.record("create_action");
        let mut state = lock(&self.state);
        if !state.action_sets.contains(&action_set) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        *action = ActionHandle(self.issue());
        state.actions.insert(
            *action,
            FakeAction {
                action_set,
                action_type: info.action_type,
                subaction_paths: info.subaction_paths.clone(),
            },
        );
        XrResult::SUCCESS
    }

    fn destroy_action(&self, action: ActionHandle) -> XrResult {
        self.record("destroy_action");
        match lock(&self.state).actions.remove(&action) {
            Some(_) => XrResult::SUCCESS,
            None => XrResult::ERROR_HANDLE_INVALID,
        }
    }

    fn suggest_interaction_profile_bindings(&self, _instance: InstanceHandle, bindings: &InteractionProfileSuggestedBinding) -> XrResult {
        self.record("suggest_interaction_profile_bindings");
        lock(&self.state).bindings.push(bindings.clone());
        XrResult::SUCCESS
    }

    fn attach_session_action_sets(&self, session: SessionHandle, info: &SessionActionSetsAttachInfo) -> XrResult {
        self.record("attach_session_action_sets");
        let mut state = lock(&self.state);
        if state.attached.contains_key(&session) {
            return XrResult::ERROR_ACTIONSETS_ALREADY_ATTACHED;
        }
        if info.action_sets.iter().any(|set| !state.action_sets.contains(set)) {
            return XrResult::ERROR_HANDLE_INVALID;
        }
        state.attached.insert(session, info.action_sets.clone());
        XrResult::SUCCESS
    }

    fn sync_actions(&self, session: SessionHandle, info: &ActionsSyncInfo) -> XrResult {
        self.record("sync_actions");
        let state = lock(&self.state);
        let unattached = info
            .active_action_sets
            .iter()
            .any(|active| !state.is_attached(session, active.action_set));
        if unattached {
            return XrResult::ERROR_ACTIONSET_NOT_ATTACHED;
        }
        if state.unfocused {
            return XrResult::SESSION_NOT_FOCUSED;
        }
        XrResult::SUCCESS
    }

    fn get_action_state_boolean(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStateBoolean) -> XrResult {
        self.record("get_action_state_boolean");
        match lock(&self.state).action_state(session, info, ActionType::BOOLEAN_INPUT) {
            Ok(ActionState::Boolean(found)) => {
                *state = found;
                XrResult::SUCCESS
            }
            Ok(_) => XrResult::ERROR_ACTION_TYPE_MISMATCH,
            Err(result) => result,
        }
    }

    fn get_action_state_float(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStateFloat) -> XrResult {
        self.record("get_action_state_float");
        match lock(&self.state).action_state(session, info, ActionType::FLOAT_INPUT) {
            Ok(ActionState::Float(found)) => {
                *state = found;
                XrResult::SUCCESS
            }
            Ok(_) => XrResult::ERROR_ACTION_TYPE_MISMATCH,
            Err(result) => result,
        }
    }

    fn get_action_state_vector2f(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStateVector2f) -> XrResult {
        self.record("get_action_state_vector2f");
        match lock(&self.state).action_state(session, info, ActionType::VECTOR2F_INPUT) {
            Ok(ActionState::Vector2f(found)) => {
                *state = found;
                XrResult::SUCCESS
            }
            Ok(_) => XrResult::ERROR_ACTION_TYPE_MISMATCH,
            Err(result) => result,
        }
    }

    fn get_action_state_pose(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStatePose) -> XrResult {
        self.record("get_action_state_pose");
        match lock(&self.state).action_state(session, info, ActionType::POSE_INPUT) {
            Ok(ActionState::Pose(found)) => {
                *state = found;
                XrResult::SUCCESS
            }
            Ok(_) => XrResult::ERROR_ACTION_TYPE_MISMATCH,
            Err(result) => result,
        }
    }

    fn get_current_interaction_profile(&self, session: SessionHandle, top_level_user_path: Path, state: &mut InteractionProfileState) -> XrResult {
        self.record("get_current_interaction_profile");
        let mut fake = lock(&self.state);
        let Some(top_level) = fake.name_of(top_level_user_path).map(str::to_string) else {
            return XrResult::ERROR_PATH_INVALID;
        };
        if !TOP_LEVEL_PATHS.contains(&top_level.as_str()) {
            return XrResult::ERROR_PATH_UNSUPPORTED;
        }
        if !fake.attached.contains_key(&session) {
            return XrResult::ERROR_ACTIONSET_NOT_ATTACHED;
        }
        let current = fake.current_profiles.get(&top_level).cloned();
        state.interaction_profile = match current {
            Some(profile) => fake.intern(&profile),
            None => Path::NULL,
        };
        XrResult::SUCCESS
    }

    fn apply_haptic_feedback(&self, session: SessionHandle, info: &HapticActionInfo, feedback: &Chain) -> XrResult {
        self.record("apply_haptic_feedback");
        let mut state = lock(&self.state);
        let Some(action) = state.actions.get(&info.action) else {
            return XrResult::ERROR_HANDLE_INVALID;
        };
        if action.action_type != ActionType::VIBRATION_OUTPUT {
            return XrResult::ERROR_ACTION_TYPE_MISMATCH;
        }
        if !state.is_attached(session, action.action_set) {
            return XrResult::ERROR_ACTIONSET_NOT_ATTACHED;
        }
        let Some(crate::chain::Record::HapticVibration(vibration)) = feedback.as_deref() else {
            return XrResult::ERROR_VALIDATION_FAILURE;
        };
        let vibration = HapticVibration {
            next: None,
            ..vibration.clone()
        };
        for binding in state.bound_paths(info.action, info.subaction_path) {
            state.vibrations.push(FakeVibration {
                binding,
                vibration: vibration.clone(),
            });
        }
        XrResult::SUCCESS
    }

    fn stop_haptic_feedback(&self, _session: SessionHandle, info: &HapticActionInfo) -> XrResult {
        self.record("stop_haptic_feedback");
        if lock(&self.state).actions.contains_key(&info.action) {
            XrResult::SUCCESS
        } else {
            XrResult::ERROR_HANDLE_INVALID
        }
    }

    fn create_debug_utils_messenger(
        &self,
        _instance: InstanceHandle,
        _info: &DebugUtilsMessengerCreateInfoEXT,
        messenger: &mut DebugUtilsMessengerHandle,
    ) -> XrResult {
        self.record("create_debug_utils_messenger");
        *messenger = DebugUtilsMessengerHandle(self.issue());
        lock(&self.state).messengers.insert(*messenger);
        XrResult::SUCCESS
    }

    fn destroy_debug_utils_messenger(&self, messenger: DebugUtilsMessengerHandle) -> XrResult {
        self.record("destroy_debug_utils_messenger");
        remove_or_invalid(&mut lock(&self.state).messengers, &messenger)
    }

    fn set_debug_utils_object_name(&self, _instance: InstanceHandle, _info: &DebugUtilsObjectNameInfoEXT) -> XrResult {
        self.record("set_debug_utils_object_name");
        XrResult::SUCCESS
    }

    fn session_insert_debug_utils_label(&self, _session: SessionHandle, _info: &DebugUtilsLabelEXT) -> XrResult {
        self.record("session_insert_debug_utils_label");
        XrResult::SUCCESS
    }
}

struct WarningCounter {
    count: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` with a thread-local subscriber and report how many warnings it
/// logged.
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarningCounter {
        count: count.clone(),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, count.load(Ordering::SeqCst))
}

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated directory for shared-memory backing files.
pub struct TestEnvironment {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub test_id: u32,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();
        Ok(Self {
            _temp_dir: temp_dir,
            root,
            test_id,
        })
    }

    /// Unique backing-file path for one overlay connection.
    pub fn connection_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("xrov-test-{}-{}.shm", self.test_id, name))
    }
}
