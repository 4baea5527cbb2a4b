//! Instance-level commands: instance lifetime, atoms, events, actions and
//! debug utils.

use super::{entry_point, resolve};
use crate::chain::{
    ActionCreateInfo, ActionSetCreateInfo, Chain, DebugUtilsMessengerCreateInfoEXT,
    DebugUtilsObjectNameInfoEXT, EventDataInteractionProfileChanged, Field, InstanceCreateInfo,
    InteractionProfileSuggestedBinding, SystemGetInfo,
};
use crate::downchain::dispatch;
use crate::error::Result;
use crate::handles::{
    ActionExtra, ActionInfo, ActionSetExtra, ActionSetInfo, DebugMessengerExtra,
    DebugMessengerInfo, HandleInfo, InstanceExtra, InstanceInfo, SessionInfo,
};
use crate::rpc::{self, PollEventArgs};
use crate::state::Layer;
use crate::substitute::substitute_local_handles;
use crate::sync::lock;
use crate::types::{
    ActionHandle, ActionSetHandle, DebugUtilsMessengerHandle, InstanceHandle, ObjectType, Path,
    SessionHandle, SpaceHandle, SwapchainHandle, SystemId, XrResult,
};
use std::sync::Arc;
use xrov_config::log_layer_debug;

impl Layer {
    pub fn xr_create_instance(&self, info: &InstanceCreateInfo, instance: &mut InstanceHandle) -> XrResult {
        entry_point("xrCreateInstance", || self.create_instance(info, instance))
    }

    fn create_instance(&self, info: &InstanceCreateInfo, instance: &mut InstanceHandle) -> Result<XrResult> {
        let snapshot = info.deep_copy()?;
        let mut created = InstanceHandle::NULL;
        let result = dispatch(self.downchain(), |d| d.create_instance(info, &mut created));
        if result.failed() {
            return Ok(result);
        }
        self.tables.instances.add(HandleInfo::new(
            created,
            created,
            self.downchain().clone(),
            InstanceExtra::new(snapshot),
        ))?;
        *instance = created;
        Ok(result)
    }

    pub fn xr_destroy_instance(&self, instance: InstanceHandle) -> XrResult {
        entry_point("xrDestroyInstance", || {
            resolve(&self.tables.instances, "xrDestroyInstance", instance)?;
            let result = self.retire_instance(instance)?;
            self.disconnect_from_main();
            Ok(result)
        })
    }

    /// Records the request that produced the system id so an overlay can
    /// later describe its system to the main process.
    pub fn xr_get_system(&self, instance: InstanceHandle, info: &SystemGetInfo, system: &mut SystemId) -> XrResult {
        entry_point("xrGetSystem", || {
            let entry = resolve(&self.tables.instances, "xrGetSystem", instance)?;
            let result = dispatch(&entry.downchain()?, |d| d.get_system(entry.actual, info, system));
            if result.succeeded() {
                self.atoms.record_system(*system, info.deep_copy()?);
            }
            Ok(result)
        })
    }

    pub fn xr_string_to_path(&self, instance: InstanceHandle, path_string: &str, path: &mut Path) -> XrResult {
        entry_point("xrStringToPath", || {
            let entry = resolve(&self.tables.instances, "xrStringToPath", instance)?;
            let result = dispatch(&entry.downchain()?, |d| d.string_to_path(entry.actual, path_string, path));
            if result.succeeded() {
                self.atoms.record_path(*path, path_string.to_string());
            }
            Ok(result)
        })
    }

    /// Answered from the path table when this process interned the path.
    pub fn xr_path_to_string(&self, instance: InstanceHandle, path: Path, out: &mut String) -> XrResult {
        entry_point("xrPathToString", || {
            let entry = resolve(&self.tables.instances, "xrPathToString", instance)?;
            if let Some(known) = self.atoms.path_string(path) {
                *out = known;
                return Ok(XrResult::SUCCESS);
            }
            let result = dispatch(&entry.downchain()?, |d| d.path_to_string(entry.actual, path, out));
            if result.succeeded() {
                self.atoms.record_path(path, out.clone());
            }
            Ok(result)
        })
    }

    /// Runtime events first. An overlay with nothing local reports its own
    /// profile change, then asks the main process for its session's next
    /// event. Handles in the event are rewritten to this process's local
    /// values.
    pub fn xr_poll_event(&self, instance: InstanceHandle, event: &mut Chain) -> XrResult {
        entry_point("xrPollEvent", || self.poll_event(instance, event))
    }

    fn poll_event(&self, instance: InstanceHandle, event: &mut Chain) -> Result<XrResult> {
        let entry = resolve(&self.tables.instances, "xrPollEvent", instance)?;
        let mut polled = Chain::default();
        let mut result = dispatch(&entry.downchain()?, |d| d.poll_event(entry.actual, &mut polled));

        if result == XrResult::EVENT_UNAVAILABLE {
            if let Some(session) = self.proxied_session(&entry) {
                if std::mem::take(&mut lock(&session.extra.actions).profile_changed) {
                    let changed = EventDataInteractionProfileChanged {
                        next: None,
                        session: session.local,
                    };
                    *event = Some(Box::new(changed.into()));
                    return Ok(XrResult::SUCCESS);
                }
                let mut args = PollEventArgs {
                    session: session.actual,
                    event: None,
                };
                result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                polled = args.event;
            }
        }
        if result != XrResult::SUCCESS {
            return Ok(result);
        }

        substitute_local_handles(&self.tables, &mut polled)?;
        self.observe_main_event(&polled)?;
        *event = polled;
        Ok(result)
    }

    fn proxied_session(&self, instance: &InstanceInfo) -> Option<Arc<SessionInfo>> {
        let sessions: Vec<SessionHandle> = lock(&instance.extra.children).sessions.iter().copied().collect();
        sessions
            .into_iter()
            .filter_map(|session| self.tables.sessions.get(session).ok())
            .find(|session| session.is_proxied)
    }

    pub fn xr_create_action_set(
        &self,
        instance: InstanceHandle,
        info: &ActionSetCreateInfo,
        action_set: &mut ActionSetHandle,
    ) -> XrResult {
        entry_point("xrCreateActionSet", || {
            let entry = resolve(&self.tables.instances, "xrCreateActionSet", instance)?;
            let snapshot = info.deep_copy()?;
            let downchain = entry.downchain()?;
            let mut created = ActionSetHandle::NULL;
            let result = dispatch(&downchain, |d| d.create_action_set(entry.actual, info, &mut created));
            if result.failed() {
                return Ok(result);
            }
            let registered: ActionSetInfo =
                HandleInfo::new(created, entry.local, downchain, ActionSetExtra::new(snapshot));
            self.register_action_set(&entry, registered)?;
            *action_set = created;
            Ok(result)
        })
    }

    pub fn xr_destroy_action_set(&self, action_set: ActionSetHandle) -> XrResult {
        entry_point("xrDestroyActionSet", || {
            resolve(&self.tables.action_sets, "xrDestroyActionSet", action_set)?;
            self.retire_action_set(action_set)
        })
    }

    pub fn xr_create_action(&self, action_set: ActionSetHandle, info: &ActionCreateInfo, action: &mut ActionHandle) -> XrResult {
        entry_point("xrCreateAction", || {
            let entry = resolve(&self.tables.action_sets, "xrCreateAction", action_set)?;
            let snapshot = info.deep_copy()?;
            let downchain = entry.downchain()?;
            let mut created = ActionHandle::NULL;
            let result = dispatch(&downchain, |d| d.create_action(entry.actual, info, &mut created));
            if result.failed() {
                return Ok(result);
            }
            let registered: ActionInfo = HandleInfo::new(
                created,
                entry.instance,
                downchain,
                ActionExtra { create_info: snapshot },
            );
            self.register_action(&entry, registered)?;
            *action = created;
            Ok(result)
        })
    }

    pub fn xr_destroy_action(&self, action: ActionHandle) -> XrResult {
        entry_point("xrDestroyAction", || {
            resolve(&self.tables.actions, "xrDestroyAction", action)?;
            self.retire_action(action)
        })
    }

    /// A later suggestion for the same profile replaces the stored one.
    pub fn xr_suggest_interaction_profile_bindings(
        &self,
        instance: InstanceHandle,
        bindings: &InteractionProfileSuggestedBinding,
    ) -> XrResult {
        entry_point("xrSuggestInteractionProfileBindings", || {
            let entry = resolve(&self.tables.instances, "xrSuggestInteractionProfileBindings", instance)?;
            for binding in &bindings.suggested_bindings {
                self.tables.actions.get(binding.action)?;
            }
            let snapshot = bindings.deep_copy()?;
            let result = dispatch(&entry.downchain()?, |d| d.suggest_interaction_profile_bindings(entry.actual, bindings));
            if result.succeeded() {
                lock(&entry.extra.bindings).insert(snapshot.interaction_profile, snapshot);
            }
            Ok(result)
        })
    }

    /// Latest bindings suggested for `profile`.
    pub fn suggested_bindings(&self, instance: InstanceHandle, profile: Path) -> Option<InteractionProfileSuggestedBinding> {
        let entry = self.tables.instances.get(instance).ok()?;
        let bindings = lock(&entry.extra.bindings);
        bindings.get(&profile).cloned()
    }

    pub fn xr_create_debug_utils_messenger(
        &self,
        instance: InstanceHandle,
        info: &DebugUtilsMessengerCreateInfoEXT,
        messenger: &mut DebugUtilsMessengerHandle,
    ) -> XrResult {
        entry_point("xrCreateDebugUtilsMessengerEXT", || {
            let entry = resolve(&self.tables.instances, "xrCreateDebugUtilsMessengerEXT", instance)?;
            let snapshot = info.deep_copy()?;
            let downchain = entry.downchain()?;
            let mut created = DebugUtilsMessengerHandle::NULL;
            let result = dispatch(&downchain, |d| d.create_debug_utils_messenger(entry.actual, info, &mut created));
            if result.failed() {
                return Ok(result);
            }
            let registered: DebugMessengerInfo = HandleInfo::new(
                created,
                entry.local,
                downchain,
                DebugMessengerExtra { create_info: snapshot },
            );
            self.register_messenger(&entry, registered)?;
            *messenger = created;
            Ok(result)
        })
    }

    pub fn xr_destroy_debug_utils_messenger(&self, messenger: DebugUtilsMessengerHandle) -> XrResult {
        entry_point("xrDestroyDebugUtilsMessengerEXT", || {
            resolve(&self.tables.messengers, "xrDestroyDebugUtilsMessengerEXT", messenger)?;
            self.retire_messenger(messenger)
        })
    }

    /// Names given to objects that live in the main process stay local.
    pub fn xr_set_debug_utils_object_name(&self, instance: InstanceHandle, info: &DebugUtilsObjectNameInfoEXT) -> XrResult {
        entry_point("xrSetDebugUtilsObjectNameEXT", || {
            let entry = resolve(&self.tables.instances, "xrSetDebugUtilsObjectNameEXT", instance)?;
            let mut named = info.deep_copy()?;
            let raw = info.object_handle;
            let (actual, proxied) = match info.object_type {
                ObjectType::SESSION => {
                    let target = self.tables.sessions.get(SessionHandle(raw))?;
                    (target.actual.0, target.is_proxied)
                }
                ObjectType::SWAPCHAIN => {
                    let target = self.tables.swapchains.get(SwapchainHandle(raw))?;
                    (target.actual.0, target.is_proxied)
                }
                ObjectType::SPACE => {
                    let target = self.tables.spaces.get(SpaceHandle(raw))?;
                    (target.actual.0, target.is_proxied)
                }
                _ => (raw, false),
            };
            if proxied {
                log_layer_debug!("Not forwarding name of a proxied object", handle = raw);
                return Ok(XrResult::SUCCESS);
            }
            named.object_handle = actual;
            Ok(dispatch(&entry.downchain()?, |d| d.set_debug_utils_object_name(entry.actual, &named)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ActionSuggestedBinding, EventDataSessionStateChanged, Record};
    use crate::state::LayerOptions;
    use crate::testing::FakeRuntime;
    use crate::types::{ActionType, FixedStr, FormFactor, SessionState};

    fn layer() -> (Arc<FakeRuntime>, Layer, InstanceHandle) {
        let runtime = Arc::new(FakeRuntime::new());
        let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), 11);
        let mut instance = InstanceHandle::NULL;
        assert_eq!(layer.xr_create_instance(&Default::default(), &mut instance), XrResult::SUCCESS);
        (runtime, layer, instance)
    }

    #[test]
    fn test_path_round_trip_uses_the_atom_table() {
        let (runtime, layer, instance) = layer();
        let mut path = Path::NULL;
        assert_eq!(layer.xr_string_to_path(instance, "/user/hand/left", &mut path), XrResult::SUCCESS);

        let mut back = String::new();
        assert_eq!(layer.xr_path_to_string(instance, path, &mut back), XrResult::SUCCESS);
        assert_eq!(back, "/user/hand/left");
        assert_eq!(runtime.count("path_to_string"), 0);
        assert_eq!(layer.atoms().path_string(path).as_deref(), Some("/user/hand/left"));
    }

    #[test]
    fn test_get_system_records_its_request() {
        let (_runtime, layer, instance) = layer();
        let info = SystemGetInfo {
            next: None,
            form_factor: FormFactor::HEAD_MOUNTED_DISPLAY,
        };
        let mut system = SystemId::NULL;
        assert_eq!(layer.xr_get_system(instance, &info, &mut system), XrResult::SUCCESS);
        assert_eq!(layer.atoms().system_info(system), Some(info));

        let handheld = SystemGetInfo {
            next: None,
            form_factor: FormFactor::HANDHELD_DISPLAY,
        };
        let mut other = SystemId::NULL;
        assert_eq!(
            layer.xr_get_system(instance, &handheld, &mut other),
            XrResult::ERROR_FORM_FACTOR_UNAVAILABLE
        );
    }

    #[test]
    fn test_bindings_are_kept_per_profile() {
        let (runtime, layer, instance) = layer();
        let mut action_set = ActionSetHandle::NULL;
        assert_eq!(
            layer.xr_create_action_set(instance, &Default::default(), &mut action_set),
            XrResult::SUCCESS
        );
        let mut action = ActionHandle::NULL;
        let info = ActionCreateInfo {
            action_name: FixedStr::new("select"),
            action_type: ActionType::BOOLEAN_INPUT,
            ..Default::default()
        };
        assert_eq!(layer.xr_create_action(action_set, &info, &mut action), XrResult::SUCCESS);

        let suggest = |profile: u64, binding: u64| InteractionProfileSuggestedBinding {
            next: None,
            interaction_profile: Path(profile),
            suggested_bindings: vec![ActionSuggestedBinding {
                action,
                binding: Path(binding),
            }],
        };
        layer.xr_suggest_interaction_profile_bindings(instance, &suggest(1, 10));
        layer.xr_suggest_interaction_profile_bindings(instance, &suggest(2, 20));
        layer.xr_suggest_interaction_profile_bindings(instance, &suggest(1, 11));

        assert_eq!(runtime.suggested_bindings().len(), 3);
        let first = layer.suggested_bindings(instance, Path(1)).unwrap();
        assert_eq!(first.suggested_bindings[0].binding, Path(11));
        assert_eq!(
            layer.suggested_bindings(instance, Path(2)).unwrap().suggested_bindings[0].binding,
            Path(20)
        );
    }

    #[test]
    fn test_destroying_the_instance_takes_children_down() {
        let (runtime, layer, instance) = layer();
        let mut action_set = ActionSetHandle::NULL;
        layer.xr_create_action_set(instance, &Default::default(), &mut action_set);
        let mut action = ActionHandle::NULL;
        layer.xr_create_action(action_set, &Default::default(), &mut action);
        let mut messenger = DebugUtilsMessengerHandle::NULL;
        layer.xr_create_debug_utils_messenger(instance, &Default::default(), &mut messenger);

        assert_eq!(layer.xr_destroy_instance(instance), XrResult::SUCCESS);
        assert_eq!(runtime.count("destroy_action"), 1);
        assert_eq!(runtime.count("destroy_action_set"), 1);
        assert_eq!(runtime.count("destroy_debug_utils_messenger"), 1);
        assert!(layer.tables().actions.is_empty());
        assert!(layer.tables().instances.is_empty());
        assert_eq!(layer.xr_destroy_instance(instance), XrResult::ERROR_VALIDATION_FAILURE);
    }

    #[test]
    fn test_polled_events_carry_local_handles() {
        let (runtime, layer, instance) = layer();
        let mut system = SystemId::NULL;
        layer.xr_get_system(
            instance,
            &SystemGetInfo {
                next: None,
                form_factor: FormFactor::HEAD_MOUNTED_DISPLAY,
            },
            &mut system,
        );
        let mut session = SessionHandle::NULL;
        let create = crate::chain::SessionCreateInfo {
            system_id: system,
            ..Default::default()
        };
        assert_eq!(layer.xr_create_session(instance, &create, &mut session), XrResult::SUCCESS);
        let actual = layer.tables().sessions.get(session).unwrap().actual;
        assert_ne!(actual, session);

        runtime.push_event(Some(Box::new(Record::from(EventDataSessionStateChanged {
            next: None,
            session: actual,
            state: SessionState::READY,
            time: 5,
        }))));
        let mut event = Chain::default();
        assert_eq!(layer.xr_poll_event(instance, &mut event), XrResult::SUCCESS);
        let changed = crate::chain::find_in_chain::<EventDataSessionStateChanged>(&event).unwrap();
        assert_eq!(changed.session, session);
        assert_eq!(layer.main_host().status().state, SessionState::READY);

        assert_eq!(layer.xr_poll_event(instance, &mut event), XrResult::EVENT_UNAVAILABLE);
    }
}
