//! The next layer down: ultimately the real runtime.
//!
//! Every method takes actual handles and reports through `&mut` outputs,
//! mirroring the entry points it stands for. Implementations must be
//! callable from any thread.
//!
//! Two-call enumerations take a `Vec` whose length is the capacity (zero
//! for a size query); the callee truncates it to what it wrote and stores
//! the full count in `count_output`.

use crate::chain::{
    ActionCreateInfo, ActionSetCreateInfo, ActionSpaceCreateInfo, ActionStateBoolean,
    ActionStateFloat, ActionStateGetInfo, ActionStatePose, ActionStateVector2f, ActionsSyncInfo,
    Chain, DebugUtilsLabelEXT,
    DebugUtilsMessengerCreateInfoEXT, DebugUtilsObjectNameInfoEXT, Extent2Df, FrameBeginInfo,
    FrameEndInfo, FrameState, FrameWaitInfo, HapticActionInfo, InstanceCreateInfo,
    InteractionProfileState, InteractionProfileSuggestedBinding, ReferenceSpaceCreateInfo, SessionActionSetsAttachInfo,
    SessionBeginInfo, SessionCreateInfo, SpaceLocation, SwapchainCreateInfo,
    SwapchainImageAcquireInfo, SwapchainImageReleaseInfo, SwapchainImageWaitInfo, SystemGetInfo,
    View, ViewLocateInfo, ViewState,
};
use crate::sync::serialize_downchain;
use crate::types::{
    ActionHandle, ActionSetHandle, DebugUtilsMessengerHandle, InstanceHandle, Path,
    ReferenceSpaceType, SessionHandle, SpaceHandle, SwapchainHandle, SystemId, Time, XrResult,
};
use std::sync::Arc;

pub trait Downchain: Send + Sync {
    // Instance

    fn create_instance(&self, info: &InstanceCreateInfo, instance: &mut InstanceHandle) -> XrResult;
    fn destroy_instance(&self, instance: InstanceHandle) -> XrResult;
    fn get_system(&self, instance: InstanceHandle, info: &SystemGetInfo, system: &mut SystemId) -> XrResult;
    fn string_to_path(&self, instance: InstanceHandle, path_string: &str, path: &mut Path) -> XrResult;
    fn path_to_string(&self, instance: InstanceHandle, path: Path, out: &mut String) -> XrResult;
    fn poll_event(&self, instance: InstanceHandle, event: &mut Chain) -> XrResult;

    // Session

    fn create_session(&self, instance: InstanceHandle, info: &SessionCreateInfo, session: &mut SessionHandle) -> XrResult;
    fn destroy_session(&self, session: SessionHandle) -> XrResult;
    fn begin_session(&self, session: SessionHandle, info: &SessionBeginInfo) -> XrResult;
    fn end_session(&self, session: SessionHandle) -> XrResult;
    fn request_exit_session(&self, session: SessionHandle) -> XrResult;
    fn wait_frame(&self, session: SessionHandle, info: &FrameWaitInfo, state: &mut FrameState) -> XrResult;
    fn begin_frame(&self, session: SessionHandle, info: &FrameBeginInfo) -> XrResult;
    fn end_frame(&self, session: SessionHandle, info: &FrameEndInfo) -> XrResult;
    fn locate_views(
        &self,
        session: SessionHandle,
        info: &ViewLocateInfo,
        state: &mut ViewState,
        views: &mut Vec<View>,
        count_output: &mut u32,
    ) -> XrResult;

    // Swapchain

    fn enumerate_swapchain_formats(&self, session: SessionHandle, formats: &mut Vec<i64>, count_output: &mut u32) -> XrResult;
    fn create_swapchain(&self, session: SessionHandle, info: &SwapchainCreateInfo, swapchain: &mut SwapchainHandle) -> XrResult;
    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> XrResult;
    fn enumerate_swapchain_images(&self, swapchain: SwapchainHandle, count_output: &mut u32) -> XrResult;
    fn acquire_swapchain_image(&self, swapchain: SwapchainHandle, info: &SwapchainImageAcquireInfo, index: &mut u32) -> XrResult;
    fn wait_swapchain_image(&self, swapchain: SwapchainHandle, info: &SwapchainImageWaitInfo) -> XrResult;
    fn release_swapchain_image(&self, swapchain: SwapchainHandle, info: &SwapchainImageReleaseInfo) -> XrResult;

    // Space

    fn enumerate_reference_spaces(&self, session: SessionHandle, spaces: &mut Vec<ReferenceSpaceType>, count_output: &mut u32) -> XrResult;
    fn create_reference_space(&self, session: SessionHandle, info: &ReferenceSpaceCreateInfo, space: &mut SpaceHandle) -> XrResult;
    fn get_reference_space_bounds_rect(&self, session: SessionHandle, ty: ReferenceSpaceType, bounds: &mut Extent2Df) -> XrResult;
    fn create_action_space(&self, session: SessionHandle, info: &ActionSpaceCreateInfo, space: &mut SpaceHandle) -> XrResult;
    fn locate_space(&self, space: SpaceHandle, base_space: SpaceHandle, time: Time, location: &mut SpaceLocation) -> XrResult;
    fn destroy_space(&self, space: SpaceHandle) -> XrResult;

    // Actions

    fn create_action_set(&self, instance: InstanceHandle, info: &ActionSetCreateInfo, action_set: &mut ActionSetHandle) -> XrResult;
    fn destroy_action_set(&self, action_set: ActionSetHandle) -> XrResult;
    fn create_action(&self, action_set: ActionSetHandle, info: &ActionCreateInfo, action: &mut ActionHandle) -> XrResult;
    fn destroy_action(&self, action: ActionHandle) -> XrResult;
    fn suggest_interaction_profile_bindings(&self, instance: InstanceHandle, bindings: &InteractionProfileSuggestedBinding) -> XrResult;
    fn attach_session_action_sets(&self, session: SessionHandle, info: &SessionActionSetsAttachInfo) -> XrResult;
    fn sync_actions(&self, session: SessionHandle, info: &ActionsSyncInfo) -> XrResult;
    fn get_action_state_boolean(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStateBoolean) -> XrResult;
    fn get_action_state_float(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStateFloat) -> XrResult;
    fn get_action_state_vector2f(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStateVector2f) -> XrResult;
    fn get_action_state_pose(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut ActionStatePose) -> XrResult;
    fn get_current_interaction_profile(
        &self,
        session: SessionHandle,
        top_level_user_path: Path,
        state: &mut InteractionProfileState,
    ) -> XrResult;
    /// `feedback` is the haptic record chain, head included.
    fn apply_haptic_feedback(&self, session: SessionHandle, info: &HapticActionInfo, feedback: &Chain) -> XrResult;
    fn stop_haptic_feedback(&self, session: SessionHandle, info: &HapticActionInfo) -> XrResult;

    // Debug utils

    fn create_debug_utils_messenger(
        &self,
        instance: InstanceHandle,
        info: &DebugUtilsMessengerCreateInfoEXT,
        messenger: &mut DebugUtilsMessengerHandle,
    ) -> XrResult;
    fn destroy_debug_utils_messenger(&self, messenger: DebugUtilsMessengerHandle) -> XrResult;
    fn set_debug_utils_object_name(&self, instance: InstanceHandle, info: &DebugUtilsObjectNameInfoEXT) -> XrResult;
    fn session_insert_debug_utils_label(&self, session: SessionHandle, info: &DebugUtilsLabelEXT) -> XrResult;
}

/// Run one downchain call, holding the global serialization lock when
/// `synchronize_every_call` is on.
pub(crate) fn dispatch<R>(downchain: &Arc<dyn Downchain>, call: impl FnOnce(&dyn Downchain) -> R) -> R {
    let _serialized = serialize_downchain();
    call(downchain.as_ref())
}
