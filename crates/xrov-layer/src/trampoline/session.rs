//! Session commands. A proxied session is the main process's session seen
//! from an overlay; calls on it travel over RPC with the main-local handle.

use super::{entry_point, resolve, unsupported_on_proxied};
use crate::chain::{
    find_in_chain, DebugUtilsLabelEXT, Extent2Df, Field, FrameBeginInfo, FrameEndInfo,
    FrameState, FrameWaitInfo, ReferenceSpaceCreateInfo, SessionBeginInfo, SessionCreateInfo, SessionCreateInfoOverlayEXTX, SwapchainCreateInfo,
    View, ViewLocateInfo, ViewState,
};
use crate::downchain::dispatch;
use crate::error::{LayerError, Result};
use crate::handles::{
    HandleInfo, InstanceInfo, SessionExtra, SessionInfo, SpaceExtra, SpaceInfo, SpaceOrigin,
    SwapchainExtra, SwapchainInfo,
};
use crate::rpc::{
    self, BeginFrameArgs, BeginSessionArgs, CreateReferenceSpaceArgs, CreateSessionArgs,
    CreateSwapchainArgs, DestroySessionArgs, EndFrameArgs, EndSessionArgs,
    EnumerateReferenceSpacesArgs, EnumerateSwapchainFormatsArgs, GetReferenceSpaceBoundsRectArgs,
    LocateViewsArgs, RequestExitSessionArgs, WaitFrameArgs,
};
use crate::state::Layer;
use crate::substitute::restore_actual_handles;
use crate::sync::lock;
use crate::types::{
    InstanceHandle, ReferenceSpaceType, SessionHandle, SpaceHandle, SwapchainHandle, XrResult,
};
use std::sync::Arc;
use xrov_config::{log_host_warn, log_layer_debug, log_layer_warn};

impl Layer {
    /// A chain carrying [`SessionCreateInfoOverlayEXTX`] asks the main
    /// process for its session instead of creating one in the runtime.
    pub fn xr_create_session(&self, instance: InstanceHandle, info: &SessionCreateInfo, session: &mut SessionHandle) -> XrResult {
        entry_point("xrCreateSession", || {
            let entry = resolve(&self.tables.instances, "xrCreateSession", instance)?;
            if find_in_chain::<SessionCreateInfoOverlayEXTX>(&info.next).is_some() {
                self.create_overlay_session(&entry, info, session)
            } else {
                self.create_runtime_session(&entry, info, session)
            }
        })
    }

    fn create_runtime_session(&self, instance: &InstanceInfo, info: &SessionCreateInfo, session: &mut SessionHandle) -> Result<XrResult> {
        let snapshot = info.deep_copy()?;
        let downchain = instance.downchain()?;
        let mut actual = SessionHandle::NULL;
        let result = dispatch(&downchain, |d| d.create_session(instance.actual, info, &mut actual));
        if result.failed() {
            return Ok(result);
        }

        let local = self.allocate::<SessionHandle>();
        let registered: SessionInfo =
            HandleInfo::new(local, instance.local, downchain, SessionExtra::new(snapshot)).with_actual(actual);
        let entry = self.register_session(instance, registered)?;
        match self.create_placeholders(instance) {
            Ok(placeholders) => lock(&entry.extra.actions).placeholders = Some(Arc::new(placeholders)),
            Err(err) => {
                let error = err.to_string();
                log_host_warn!("Overlays will not see input", error = error.as_str());
            }
        }
        self.host.session_created(local);
        *session = local;
        Ok(result)
    }

    fn create_overlay_session(&self, instance: &InstanceInfo, info: &SessionCreateInfo, session: &mut SessionHandle) -> Result<XrResult> {
        let endpoint = self.main_endpoint()?;
        let system_get_info = self
            .atoms
            .system_info(info.system_id)
            .ok_or(LayerError::ValidationFailure("system id was not returned by xrGetSystem"))?;

        let mut args = CreateSessionArgs {
            instance_create_info: instance.extra.create_info.deep_copy()?,
            system_get_info,
            create_info: info.deep_copy()?,
            session: SessionHandle::NULL,
        };
        let result = rpc::call(&endpoint, &mut args)?;
        if result.failed() {
            return Ok(result);
        }

        let local = self.allocate::<SessionHandle>();
        let registered: SessionInfo = HandleInfo::new(local, instance.local, instance.downchain()?, SessionExtra::new(args.create_info))
            .with_actual(args.session)
            .proxied();
        self.register_session(instance, registered)?;
        log_layer_debug!("Overlay session created", local = local.0, main = args.session.0);
        *session = local;
        Ok(result)
    }

    /// Children go first. Destroying a proxied session also ends the
    /// connection to the main process.
    pub fn xr_destroy_session(&self, session: SessionHandle) -> XrResult {
        entry_point("xrDestroySession", || {
            let entry = resolve(&self.tables.sessions, "xrDestroySession", session)?;
            if !entry.is_proxied {
                drop(entry);
                return self.retire_session(session);
            }

            let mut args = DestroySessionArgs { session: entry.actual };
            drop(entry);
            let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
            if result.failed() {
                return Ok(result);
            }
            self.retire_session(session)?;
            self.disconnect_from_main();
            Ok(result)
        })
    }

    pub fn xr_begin_session(&self, session: SessionHandle, info: &SessionBeginInfo) -> XrResult {
        entry_point("xrBeginSession", || {
            let entry = resolve(&self.tables.sessions, "xrBeginSession", session)?;
            if entry.is_proxied {
                let mut args = BeginSessionArgs {
                    session: entry.actual,
                    begin_info: info.deep_copy()?,
                };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            let result = dispatch(&entry.downchain()?, |d| d.begin_session(entry.actual, info));
            if result.succeeded() {
                self.host.session_running(entry.local, true);
            }
            Ok(result)
        })
    }

    pub fn xr_end_session(&self, session: SessionHandle) -> XrResult {
        entry_point("xrEndSession", || {
            let entry = resolve(&self.tables.sessions, "xrEndSession", session)?;
            if entry.is_proxied {
                let mut args = EndSessionArgs { session: entry.actual };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            let result = dispatch(&entry.downchain()?, |d| d.end_session(entry.actual));
            if result.succeeded() {
                self.host.session_running(entry.local, false);
            }
            Ok(result)
        })
    }

    pub fn xr_request_exit_session(&self, session: SessionHandle) -> XrResult {
        entry_point("xrRequestExitSession", || {
            let entry = resolve(&self.tables.sessions, "xrRequestExitSession", session)?;
            if entry.is_proxied {
                let mut args = RequestExitSessionArgs { session: entry.actual };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.request_exit_session(entry.actual)))
        })
    }

    /// On the main session the returned frame timing is cached for
    /// overlays.
    pub fn xr_wait_frame(&self, session: SessionHandle, info: &FrameWaitInfo, frame_state: &mut FrameState) -> XrResult {
        entry_point("xrWaitFrame", || {
            let entry = resolve(&self.tables.sessions, "xrWaitFrame", session)?;
            if entry.is_proxied {
                let mut args = WaitFrameArgs {
                    session: entry.actual,
                    wait_info: info.deep_copy()?,
                    frame_state: frame_state.clone(),
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *frame_state = args.frame_state;
                }
                return Ok(result);
            }
            let result = dispatch(&entry.downchain()?, |d| d.wait_frame(entry.actual, info, frame_state));
            if result.succeeded() {
                self.host.frame_waited(entry.local, frame_state);
            }
            Ok(result)
        })
    }

    pub fn xr_begin_frame(&self, session: SessionHandle, info: &FrameBeginInfo) -> XrResult {
        entry_point("xrBeginFrame", || {
            let entry = resolve(&self.tables.sessions, "xrBeginFrame", session)?;
            if entry.is_proxied {
                let mut args = BeginFrameArgs {
                    session: entry.actual,
                    begin_info: info.deep_copy()?,
                };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.begin_frame(entry.actual, info)))
        })
    }

    /// Layer handles are swapped for actual ones on a copy; for a proxied
    /// session those are the main process's local handles.
    pub fn xr_end_frame(&self, session: SessionHandle, info: &FrameEndInfo) -> XrResult {
        entry_point("xrEndFrame", || {
            let entry = resolve(&self.tables.sessions, "xrEndFrame", session)?;
            let mut end_info = info.deep_copy()?;
            restore_actual_handles(&self.tables, &mut end_info)?;
            if entry.is_proxied {
                let mut args = EndFrameArgs {
                    session: entry.actual,
                    end_info,
                };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.end_frame(entry.actual, &end_info)))
        })
    }

    pub fn xr_locate_views(
        &self,
        session: SessionHandle,
        info: &ViewLocateInfo,
        view_state: &mut ViewState,
        views: &mut Vec<View>,
        count_output: &mut u32,
    ) -> XrResult {
        entry_point("xrLocateViews", || {
            let entry = resolve(&self.tables.sessions, "xrLocateViews", session)?;
            let mut locate_info = info.deep_copy()?;
            restore_actual_handles(&self.tables, &mut locate_info)?;
            if entry.is_proxied {
                let mut args = LocateViewsArgs {
                    session: entry.actual,
                    locate_info,
                    view_state: view_state.clone(),
                    views: views.clone(),
                    count_output: 0,
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *view_state = args.view_state;
                    *views = args.views;
                    *count_output = args.count_output;
                }
                return Ok(result);
            }
            Ok(dispatch(&entry.downchain()?, |d| {
                d.locate_views(entry.actual, &locate_info, view_state, views, count_output)
            }))
        })
    }

    pub fn xr_enumerate_swapchain_formats(&self, session: SessionHandle, formats: &mut Vec<i64>, count_output: &mut u32) -> XrResult {
        entry_point("xrEnumerateSwapchainFormats", || {
            let entry = resolve(&self.tables.sessions, "xrEnumerateSwapchainFormats", session)?;
            if entry.is_proxied {
                let mut args = EnumerateSwapchainFormatsArgs {
                    session: entry.actual,
                    formats: formats.clone(),
                    count_output: 0,
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *formats = args.formats;
                    *count_output = args.count_output;
                }
                return Ok(result);
            }
            Ok(dispatch(&entry.downchain()?, |d| {
                d.enumerate_swapchain_formats(entry.actual, formats, count_output)
            }))
        })
    }

    pub fn xr_create_swapchain(&self, session: SessionHandle, info: &SwapchainCreateInfo, swapchain: &mut SwapchainHandle) -> XrResult {
        entry_point("xrCreateSwapchain", || {
            let entry = resolve(&self.tables.sessions, "xrCreateSwapchain", session)?;
            let snapshot = info.deep_copy()?;

            let (actual, image_count, result) = if entry.is_proxied {
                let mut args = CreateSwapchainArgs {
                    session: entry.actual,
                    create_info: info.deep_copy()?,
                    swapchain: SwapchainHandle::NULL,
                    image_count: 0,
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                (args.swapchain, Some(args.image_count), result)
            } else {
                let mut actual = SwapchainHandle::NULL;
                let result = dispatch(&entry.downchain()?, |d| d.create_swapchain(entry.actual, info, &mut actual));
                (actual, None, result)
            };
            if result.failed() {
                return Ok(result);
            }

            let local = self.allocate::<SwapchainHandle>();
            let mut registered: SwapchainInfo = HandleInfo::new(
                local,
                entry.instance,
                entry.downchain()?,
                SwapchainExtra {
                    create_info: snapshot,
                    image_count,
                },
            )
            .with_actual(actual);
            if entry.is_proxied {
                registered = registered.proxied();
            }
            self.register_swapchain(&entry, registered)?;
            *swapchain = local;
            Ok(result)
        })
    }

    pub fn xr_enumerate_reference_spaces(
        &self,
        session: SessionHandle,
        spaces: &mut Vec<ReferenceSpaceType>,
        count_output: &mut u32,
    ) -> XrResult {
        entry_point("xrEnumerateReferenceSpaces", || {
            let entry = resolve(&self.tables.sessions, "xrEnumerateReferenceSpaces", session)?;
            if entry.is_proxied {
                let mut args = EnumerateReferenceSpacesArgs {
                    session: entry.actual,
                    spaces: spaces.clone(),
                    count_output: 0,
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *spaces = args.spaces;
                    *count_output = args.count_output;
                }
                return Ok(result);
            }
            Ok(dispatch(&entry.downchain()?, |d| {
                d.enumerate_reference_spaces(entry.actual, spaces, count_output)
            }))
        })
    }

    pub fn xr_create_reference_space(&self, session: SessionHandle, info: &ReferenceSpaceCreateInfo, space: &mut SpaceHandle) -> XrResult {
        entry_point("xrCreateReferenceSpace", || {
            let entry = resolve(&self.tables.sessions, "xrCreateReferenceSpace", session)?;
            let (actual, result) = if entry.is_proxied {
                let mut args = CreateReferenceSpaceArgs {
                    session: entry.actual,
                    create_info: info.deep_copy()?,
                    space: SpaceHandle::NULL,
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                (args.space, result)
            } else {
                let mut actual = SpaceHandle::NULL;
                let result = dispatch(&entry.downchain()?, |d| d.create_reference_space(entry.actual, info, &mut actual));
                (actual, result)
            };
            if result.failed() {
                return Ok(result);
            }

            let origin = SpaceOrigin::Reference(info.reference_space_type);
            *space = self.register_new_space(&entry, actual, origin)?;
            Ok(result)
        })
    }

    pub(crate) fn register_new_space(&self, session: &Arc<SessionInfo>, actual: SpaceHandle, origin: SpaceOrigin) -> Result<SpaceHandle> {
        let local = self.allocate::<SpaceHandle>();
        let mut registered: SpaceInfo =
            HandleInfo::new(local, session.instance, session.downchain()?, SpaceExtra::new(origin)).with_actual(actual);
        if session.is_proxied {
            registered = registered.proxied();
        }
        self.register_space(session, registered)?;
        Ok(local)
    }

    pub fn xr_get_reference_space_bounds_rect(
        &self,
        session: SessionHandle,
        reference_space_type: ReferenceSpaceType,
        bounds: &mut Extent2Df,
    ) -> XrResult {
        entry_point("xrGetReferenceSpaceBoundsRect", || {
            let entry = resolve(&self.tables.sessions, "xrGetReferenceSpaceBoundsRect", session)?;
            if entry.is_proxied {
                let mut args = GetReferenceSpaceBoundsRectArgs {
                    session: entry.actual,
                    reference_space_type,
                    bounds: Extent2Df::default(),
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *bounds = args.bounds;
                }
                return Ok(result);
            }
            Ok(dispatch(&entry.downchain()?, |d| {
                d.get_reference_space_bounds_rect(entry.actual, reference_space_type, bounds)
            }))
        })
    }

    // Debug labels never leave this process.

    pub fn xr_session_insert_debug_utils_label(&self, session: SessionHandle, info: &DebugUtilsLabelEXT) -> XrResult {
        entry_point("xrSessionInsertDebugUtilsLabelEXT", || {
            let entry = resolve(&self.tables.sessions, "xrSessionInsertDebugUtilsLabelEXT", session)?;
            if entry.is_proxied {
                log_layer_warn!("Dropping debug label on an overlay session", label = info.label_name.as_str());
                return Err(unsupported_on_proxied("xrSessionInsertDebugUtilsLabelEXT"));
            }
            Ok(dispatch(&entry.downchain()?, |d| d.session_insert_debug_utils_label(entry.actual, info)))
        })
    }
}
