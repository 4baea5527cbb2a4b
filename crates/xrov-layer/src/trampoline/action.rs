//! Action commands. A main session hands them to the runtime with the
//! placeholder set alongside. A proxied session has no actions in the
//! main process: its state is read there binding by binding and merged
//! here per action.

use super::{entry_point, resolve};
use crate::actions::{binding_action_type, top_level_of, ActionState, TOP_LEVEL_PATHS};
use crate::chain::{
    ActionSpaceCreateInfo, ActionStateBoolean, ActionStateFloat, ActionStateGetInfo,
    ActionStatePose, ActionStateVector2f, ActionsSyncInfo, Chain, Field, HapticActionInfo,
    InteractionProfileState, SessionActionSetsAttachInfo,
};
use crate::downchain::dispatch;
use crate::error::{LayerError, Result};
use crate::handles::{ActionInfo, BoundActionSpace, InstanceInfo, SessionInfo, SpaceInfo, SpaceOrigin};
use crate::rpc::{
    self, ApplyHapticFeedbackArgs, CreateActionSpaceFromBindingArgs, DestroySpaceArgs,
    StopHapticFeedbackArgs, SyncActionsAndGetStateArgs,
};
use crate::state::Layer;
use crate::sync::lock;
use crate::types::{ActionHandle, ActionType, Path, SessionHandle, SpaceHandle, XrResult};
use std::collections::HashMap;
use xrov_config::{log_layer_debug, log_layer_warn};

/// One suggested binding, by name.
#[derive(Debug, Clone)]
struct NamedBinding {
    action: ActionHandle,
    profile: String,
    binding: String,
    top_level: &'static str,
}

/// What a sync needs to know about one action.
struct SyncTarget {
    action_type: ActionType,
    /// Declared subaction paths with their names.
    subaction_paths: Vec<(Path, Option<String>)>,
    /// Top-level path the active set was narrowed to, if any.
    filter: Option<String>,
}

macro_rules! action_state_getters {
    ($(
        $(#[$meta:meta])*
        $method:ident($command:literal, $record:ident, $variant:ident, $ty:ident, $downchain:ident);
    )*) => {
        impl Layer {
            $(
                $(#[$meta])*
                pub fn $method(&self, session: SessionHandle, info: &ActionStateGetInfo, state: &mut $record) -> XrResult {
                    entry_point($command, || {
                        let entry = resolve(&self.tables.sessions, $command, session)?;
                        let action = self.tables.actions.get(info.action)?;
                        if !entry.is_proxied {
                            return Ok(dispatch(&entry.downchain()?, |d| d.$downchain(entry.actual, info, state)));
                        }
                        match self.cached_state(&entry, &action, info.subaction_path, ActionType::$ty) {
                            Ok(ActionState::$variant(cached)) => {
                                *state = $record { next: state.next.take(), ..cached };
                                Ok(XrResult::SUCCESS)
                            }
                            Ok(_) => Ok(XrResult::ERROR_ACTION_TYPE_MISMATCH),
                            Err(result) => Ok(result),
                        }
                    })
                }
            )*
        }
    };
}

action_state_getters! {
    /// Proxied sessions answer from the latest sync.
    xr_get_action_state_boolean("xrGetActionStateBoolean", ActionStateBoolean, Boolean, BOOLEAN_INPUT, get_action_state_boolean);
    xr_get_action_state_float("xrGetActionStateFloat", ActionStateFloat, Float, FLOAT_INPUT, get_action_state_float);
    xr_get_action_state_vector2f("xrGetActionStateVector2f", ActionStateVector2f, Vector2f, VECTOR2F_INPUT, get_action_state_vector2f);
    xr_get_action_state_pose("xrGetActionStatePose", ActionStatePose, Pose, POSE_INPUT, get_action_state_pose);
}

impl Layer {
    pub fn xr_attach_session_action_sets(&self, session: SessionHandle, info: &SessionActionSetsAttachInfo) -> XrResult {
        entry_point("xrAttachSessionActionSets", || {
            let entry = resolve(&self.tables.sessions, "xrAttachSessionActionSets", session)?;
            if info.action_sets.is_empty() {
                return Err(LayerError::ValidationFailure("no action sets to attach"));
            }
            for action_set in &info.action_sets {
                self.tables.action_sets.get(*action_set)?;
            }
            if lock(&entry.extra.actions).attached_sets.is_some() {
                return Ok(XrResult::ERROR_ACTIONSETS_ALREADY_ATTACHED);
            }
            if !entry.is_proxied {
                return self.attach_with_placeholders(&entry, info);
            }
            lock(&entry.extra.actions).attached_sets = Some(info.action_sets.clone());
            log_layer_debug!(
                "Action sets attached to overlay session",
                session = entry.local.0,
                count = info.action_sets.len() as u64
            );
            Ok(XrResult::SUCCESS)
        })
    }

    pub fn xr_sync_actions(&self, session: SessionHandle, info: &ActionsSyncInfo) -> XrResult {
        entry_point("xrSyncActions", || {
            let entry = resolve(&self.tables.sessions, "xrSyncActions", session)?;
            if entry.is_proxied {
                self.sync_proxied_actions(&entry, info)
            } else {
                self.sync_with_placeholders(&entry, info)
            }
        })
    }

    /// Every binding of every active action goes to the main process in one
    /// request. Only bindings of the current profile count.
    fn sync_proxied_actions(&self, session: &SessionInfo, info: &ActionsSyncInfo) -> Result<XrResult> {
        let attached = lock(&session.extra.actions).attached_sets.clone();
        let Some(attached) = attached else {
            return Ok(XrResult::ERROR_ACTIONSET_NOT_ATTACHED);
        };
        let instance = self.tables.instances.get(session.instance)?;

        let mut targets: HashMap<ActionHandle, SyncTarget> = HashMap::new();
        for active in &info.active_action_sets {
            if !attached.contains(&active.action_set) {
                return Ok(XrResult::ERROR_ACTIONSET_NOT_ATTACHED);
            }
            let set = self.tables.action_sets.get(active.action_set)?;
            let members: Vec<ActionHandle> = lock(&set.extra.actions).iter().copied().collect();
            let filter = self.path_name(&instance, active.subaction_path);
            let mut declared = false;
            for action in members {
                let action = self.tables.actions.get(action)?;
                let create_info = &action.extra.create_info;
                declared |= create_info.subaction_paths.contains(&active.subaction_path);
                let subaction_paths = create_info
                    .subaction_paths
                    .iter()
                    .map(|path| (*path, self.path_name(&instance, *path)))
                    .collect();
                targets.insert(
                    action.local,
                    SyncTarget {
                        action_type: create_info.action_type,
                        subaction_paths,
                        filter: filter.clone(),
                    },
                );
            }
            if active.subaction_path != Path::NULL && !declared {
                return Ok(XrResult::ERROR_PATH_UNSUPPORTED);
            }
        }

        let requests: Vec<NamedBinding> = self
            .named_bindings(&instance)
            .into_iter()
            .filter(|named| {
                targets.get(&named.action).is_some_and(|target| {
                    target.filter.as_deref().map_or(true, |filter| filter == named.top_level)
                })
            })
            .filter(|named| ActionState::cleared(binding_action_type(&named.binding)).is_some())
            .collect();
        let mut args = SyncActionsAndGetStateArgs {
            session: session.actual,
            profiles: requests.iter().map(|named| named.profile.clone()).collect(),
            bindings: requests.iter().map(|named| named.binding.clone()).collect(),
            states: requests
                .iter()
                .map(|named| ActionState::cleared(binding_action_type(&named.binding)).and_then(ActionState::into_chain))
                .collect(),
            top_level_paths: TOP_LEVEL_PATHS.iter().map(|name| name.to_string()).collect(),
            current_profiles: vec![String::new(); TOP_LEVEL_PATHS.len()],
        };
        let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
        if result.failed() {
            return Ok(result);
        }

        let current_profiles: HashMap<String, String> = args
            .top_level_paths
            .iter()
            .zip(&args.current_profiles)
            .filter(|(_, profile)| !profile.is_empty())
            .map(|(top_level, profile)| (top_level.clone(), profile.clone()))
            .collect();

        let mut states: HashMap<ActionHandle, HashMap<Path, ActionState>> = HashMap::new();
        for (action, target) in &targets {
            let Some(cleared) = ActionState::cleared(target.action_type) else {
                continue;
            };
            let slots = states.entry(*action).or_default();
            slots.insert(Path::NULL, cleared.clone());
            for (path, _) in &target.subaction_paths {
                slots.insert(*path, cleared.clone());
            }
        }
        for (named, state) in requests.iter().zip(&args.states) {
            if current_profiles.get(named.top_level) != Some(&named.profile) {
                continue;
            }
            let Some(target) = targets.get(&named.action) else {
                continue;
            };
            let Some(state) = ActionState::from_chain(state).and_then(|state| state.coerce(target.action_type)) else {
                continue;
            };
            let subaction = target
                .subaction_paths
                .iter()
                .find(|(_, name)| name.as_deref() == Some(named.top_level))
                .map(|(path, _)| *path);
            let Some(slots) = states.get_mut(&named.action) else {
                continue;
            };
            for key in std::iter::once(Path::NULL).chain(subaction) {
                if let Some(slot) = slots.get_mut(&key) {
                    slot.merge(&state);
                }
            }
        }

        let mut actions = lock(&session.extra.actions);
        for (action, slots) in states.iter_mut() {
            let previous = actions.states.get(action);
            for (path, state) in slots.iter_mut() {
                state.update_last_change(previous.and_then(|previous| previous.get(path)));
            }
        }
        actions.states = states;
        if actions.current_profiles != current_profiles {
            log_layer_debug!("Interaction profile changed", session = session.local.0);
            actions.current_profiles = current_profiles;
            actions.profile_changed = true;
        }
        Ok(result)
    }

    /// Checks shared by the proxied getters, then the cached state or an
    /// inactive one.
    fn cached_state(
        &self,
        session: &SessionInfo,
        action: &ActionInfo,
        subaction_path: Path,
        ty: ActionType,
    ) -> std::result::Result<ActionState, XrResult> {
        let create_info = &action.extra.create_info;
        if create_info.action_type != ty {
            return Err(XrResult::ERROR_ACTION_TYPE_MISMATCH);
        }
        if subaction_path != Path::NULL && !create_info.subaction_paths.contains(&subaction_path) {
            return Err(XrResult::ERROR_PATH_UNSUPPORTED);
        }
        let actions = lock(&session.extra.actions);
        if !action.parent().is_some_and(|set| actions.is_attached(set)) {
            return Err(XrResult::ERROR_ACTIONSET_NOT_ATTACHED);
        }
        actions
            .states
            .get(&action.local)
            .and_then(|slots| slots.get(&subaction_path))
            .cloned()
            .or_else(|| ActionState::cleared(ty))
            .ok_or(XrResult::ERROR_ACTION_TYPE_MISMATCH)
    }

    pub fn xr_get_current_interaction_profile(
        &self,
        session: SessionHandle,
        top_level_user_path: Path,
        profile: &mut InteractionProfileState,
    ) -> XrResult {
        entry_point("xrGetCurrentInteractionProfile", || {
            let entry = resolve(&self.tables.sessions, "xrGetCurrentInteractionProfile", session)?;
            if !entry.is_proxied {
                return Ok(dispatch(&entry.downchain()?, |d| {
                    d.get_current_interaction_profile(entry.actual, top_level_user_path, profile)
                }));
            }
            let instance = self.tables.instances.get(entry.instance)?;
            let Some(name) = self.path_name(&instance, top_level_user_path) else {
                return Ok(XrResult::ERROR_PATH_INVALID);
            };
            if !TOP_LEVEL_PATHS.contains(&name.as_str()) {
                return Ok(XrResult::ERROR_PATH_UNSUPPORTED);
            }
            let current = {
                let actions = lock(&entry.extra.actions);
                if actions.attached_sets.is_none() {
                    return Ok(XrResult::ERROR_ACTIONSET_NOT_ATTACHED);
                }
                actions.current_profiles.get(&name).cloned()
            };
            profile.interaction_profile = match current {
                Some(current) => self.runtime_path(&instance, &instance.downchain()?, &current)?,
                None => Path::NULL,
            };
            Ok(XrResult::SUCCESS)
        })
    }

    pub fn xr_apply_haptic_feedback(&self, session: SessionHandle, info: &HapticActionInfo, feedback: &Chain) -> XrResult {
        entry_point("xrApplyHapticFeedback", || {
            let entry = resolve(&self.tables.sessions, "xrApplyHapticFeedback", session)?;
            let action = self.tables.actions.get(info.action)?;
            if !entry.is_proxied {
                return Ok(dispatch(&entry.downchain()?, |d| d.apply_haptic_feedback(entry.actual, info, feedback)));
            }
            let targets = match self.haptic_targets(&entry, &action, info.subaction_path)? {
                Ok(targets) => targets,
                Err(result) => return Ok(result),
            };
            if targets.is_empty() {
                return Ok(XrResult::SUCCESS);
            }
            let (profiles, bindings): (Vec<String>, Vec<String>) = targets.into_iter().map(|named| (named.profile, named.binding)).unzip();
            let mut args = ApplyHapticFeedbackArgs {
                session: entry.actual,
                profiles,
                bindings,
                feedback: feedback.deep_copy()?,
            };
            rpc::call(&*self.main_endpoint()?, &mut args)
        })
    }

    pub fn xr_stop_haptic_feedback(&self, session: SessionHandle, info: &HapticActionInfo) -> XrResult {
        entry_point("xrStopHapticFeedback", || {
            let entry = resolve(&self.tables.sessions, "xrStopHapticFeedback", session)?;
            let action = self.tables.actions.get(info.action)?;
            if !entry.is_proxied {
                return Ok(dispatch(&entry.downchain()?, |d| d.stop_haptic_feedback(entry.actual, info)));
            }
            let targets = match self.haptic_targets(&entry, &action, info.subaction_path)? {
                Ok(targets) => targets,
                Err(result) => return Ok(result),
            };
            if targets.is_empty() {
                return Ok(XrResult::SUCCESS);
            }
            let (profiles, bindings): (Vec<String>, Vec<String>) = targets.into_iter().map(|named| (named.profile, named.binding)).unzip();
            let mut args = StopHapticFeedbackArgs {
                session: entry.actual,
                profiles,
                bindings,
            };
            rpc::call(&*self.main_endpoint()?, &mut args)
        })
    }

    /// Bindings of a vibration action under the current profiles. A null
    /// subaction path means all of the action's paths.
    fn haptic_targets(
        &self,
        session: &SessionInfo,
        action: &ActionInfo,
        subaction_path: Path,
    ) -> Result<std::result::Result<Vec<NamedBinding>, XrResult>> {
        let create_info = &action.extra.create_info;
        if create_info.action_type != ActionType::VIBRATION_OUTPUT {
            return Ok(Err(XrResult::ERROR_ACTION_TYPE_MISMATCH));
        }
        if subaction_path != Path::NULL && !create_info.subaction_paths.contains(&subaction_path) {
            return Ok(Err(XrResult::ERROR_PATH_UNSUPPORTED));
        }
        let current = {
            let actions = lock(&session.extra.actions);
            if !action.parent().is_some_and(|set| actions.is_attached(set)) {
                return Ok(Err(XrResult::ERROR_ACTIONSET_NOT_ATTACHED));
            }
            actions.current_profiles.clone()
        };

        let instance = self.tables.instances.get(session.instance)?;
        let allowed: Option<Vec<String>> = if subaction_path != Path::NULL {
            Some(self.path_name(&instance, subaction_path).into_iter().collect())
        } else if !create_info.subaction_paths.is_empty() {
            Some(
                create_info
                    .subaction_paths
                    .iter()
                    .filter_map(|path| self.path_name(&instance, *path))
                    .collect(),
            )
        } else {
            None
        };
        let targets = self
            .named_bindings(&instance)
            .into_iter()
            .filter(|named| named.action == action.local)
            .filter(|named| current.get(named.top_level) == Some(&named.profile))
            .filter(|named| {
                allowed
                    .as_ref()
                    .map_or(true, |allowed| allowed.iter().any(|name| name == named.top_level))
            })
            .collect();
        Ok(Ok(targets))
    }

    /// Proxied action spaces are located through a main-process space made
    /// from the pose binding of the current profile. The action type is
    /// checked here since the main process never sees the action.
    pub fn xr_create_action_space(&self, session: SessionHandle, info: &ActionSpaceCreateInfo, space: &mut SpaceHandle) -> XrResult {
        entry_point("xrCreateActionSpace", || {
            let entry = resolve(&self.tables.sessions, "xrCreateActionSpace", session)?;
            let action = self.tables.actions.get(info.action)?;
            let origin = SpaceOrigin::Action {
                action: info.action,
                subaction_path: info.subaction_path,
                pose_in_action_space: info.pose_in_action_space.clone(),
            };
            if entry.is_proxied {
                let create_info = &action.extra.create_info;
                if create_info.action_type != ActionType::POSE_INPUT {
                    return Ok(XrResult::ERROR_ACTION_TYPE_MISMATCH);
                }
                if info.subaction_path != Path::NULL && !create_info.subaction_paths.contains(&info.subaction_path) {
                    return Ok(XrResult::ERROR_PATH_UNSUPPORTED);
                }
                *space = self.register_new_space(&entry, SpaceHandle::NULL, origin)?;
                return Ok(XrResult::SUCCESS);
            }

            let mut actual = SpaceHandle::NULL;
            let result = dispatch(&entry.downchain()?, |d| d.create_action_space(entry.actual, info, &mut actual));
            if result.failed() {
                return Ok(result);
            }
            *space = self.register_new_space(&entry, actual, origin)?;
            Ok(result)
        })
    }

    /// The main-process space a proxied space stands for right now. An
    /// action space is rebound when its pose binding moves to another
    /// profile, and has none while no pose binding is current.
    pub(super) fn main_space_for(&self, space: &SpaceInfo) -> Result<Option<SpaceHandle>> {
        let SpaceOrigin::Action { action, subaction_path, pose_in_action_space } = &space.extra.origin else {
            return Ok(Some(space.actual));
        };
        let session_handle = space
            .parent()
            .ok_or(LayerError::ValidationFailure("space without a session"))?;
        let session = self.tables.sessions.get(session_handle)?;
        let wanted = self.pose_binding(&session, *action, *subaction_path)?;

        let mut bound = lock(&space.extra.bound);
        if let (Some(current), Some(wanted)) = (bound.as_ref(), wanted.as_ref()) {
            if current.profile == wanted.profile && current.binding == wanted.binding {
                return Ok(Some(current.main_space));
            }
        }
        if let Some(stale) = bound.take() {
            let mut args = DestroySpaceArgs { space: stale.main_space };
            let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
            if result.failed() {
                log_layer_warn!("Could not release action space binding", result = result.name());
            }
        }
        let Some(wanted) = wanted else {
            return Ok(None);
        };

        let mut args = CreateActionSpaceFromBindingArgs {
            session: session.actual,
            profile: wanted.profile.clone(),
            binding: wanted.binding.clone(),
            pose_in_action_space: pose_in_action_space.clone(),
            space: SpaceHandle::NULL,
        };
        let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
        if result.failed() {
            log_layer_debug!("Pose binding has no main-process space", result = result.name());
            return Ok(None);
        }
        log_layer_debug!(
            "Action space bound",
            space = space.local.0,
            binding = wanted.binding.as_str()
        );
        *bound = Some(BoundActionSpace {
            main_space: args.space,
            profile: wanted.profile,
            binding: wanted.binding,
        });
        Ok(Some(args.space))
    }

    /// First pose binding of `action`, in binding order, whose profile is
    /// current for its top-level path.
    fn pose_binding(&self, session: &SessionInfo, action: ActionHandle, subaction_path: Path) -> Result<Option<NamedBinding>> {
        let current = lock(&session.extra.actions).current_profiles.clone();
        let instance = self.tables.instances.get(session.instance)?;
        let narrowed = if subaction_path == Path::NULL {
            None
        } else {
            self.path_name(&instance, subaction_path)
        };
        let mut candidates: Vec<NamedBinding> = self
            .named_bindings(&instance)
            .into_iter()
            .filter(|named| named.action == action)
            .filter(|named| binding_action_type(&named.binding) == ActionType::POSE_INPUT)
            .filter(|named| current.get(named.top_level) == Some(&named.profile))
            .filter(|named| narrowed.as_deref().map_or(true, |narrowed| narrowed == named.top_level))
            .collect();
        candidates.sort_by(|a, b| a.binding.cmp(&b.binding));
        Ok(candidates.into_iter().next())
    }

    /// Every suggested binding of the instance under its current suggestion.
    fn named_bindings(&self, instance: &InstanceInfo) -> Vec<NamedBinding> {
        let suggested = lock(&instance.extra.bindings).clone();
        let mut named = Vec::new();
        for (profile, suggestion) in suggested {
            let Some(profile) = self.path_name(instance, profile) else {
                continue;
            };
            for binding in &suggestion.suggested_bindings {
                let Some(name) = self.path_name(instance, binding.binding) else {
                    continue;
                };
                let Some(top_level) = top_level_of(&name) else {
                    continue;
                };
                named.push(NamedBinding {
                    action: binding.action,
                    profile: profile.clone(),
                    binding: name,
                    top_level,
                });
            }
        }
        named
    }

    fn path_name(&self, instance: &InstanceInfo, path: Path) -> Option<String> {
        let downchain = instance.downchain().ok()?;
        self.runtime_path_name(instance, &downchain, path)
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::{
        ActionCreateInfo, ActionSetCreateInfo, ActionStateBoolean, ActionStateGetInfo,
        ActionSuggestedBinding, ActionsSyncInfo, ActiveActionSet, InteractionProfileSuggestedBinding,
        SessionActionSetsAttachInfo, SessionCreateInfo, SystemGetInfo,
    };
    use crate::state::{Layer, LayerOptions};
    use crate::testing::{FakeInput, FakeRuntime};
    use crate::types::{
        ActionHandle, ActionSetHandle, ActionType, FormFactor, InstanceHandle, Path, SessionHandle,
        SystemId, XrResult,
    };
    use std::sync::Arc;

    const SIMPLE: &str = "/interaction_profiles/khr/simple_controller";
    const SELECT: &str = "/user/hand/left/input/select/click";

    struct Fixture {
        runtime: Arc<FakeRuntime>,
        layer: Layer,
        instance: InstanceHandle,
        session: SessionHandle,
    }

    fn fixture(namespace: u32) -> Fixture {
        let runtime = Arc::new(FakeRuntime::new());
        let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), u64::from(namespace));
        let mut instance = InstanceHandle::NULL;
        layer.xr_create_instance(&Default::default(), &mut instance);
        let mut system = SystemId::NULL;
        let get = SystemGetInfo {
            next: None,
            form_factor: FormFactor::HEAD_MOUNTED_DISPLAY,
        };
        layer.xr_get_system(instance, &get, &mut system);
        let mut session = SessionHandle::NULL;
        let info = SessionCreateInfo {
            system_id: system,
            ..Default::default()
        };
        assert_eq!(layer.xr_create_session(instance, &info, &mut session), XrResult::SUCCESS);
        Fixture {
            runtime,
            layer,
            instance,
            session,
        }
    }

    fn path(fixture: &Fixture, name: &str) -> Path {
        let mut path = Path::NULL;
        fixture.layer.xr_string_to_path(fixture.instance, name, &mut path);
        path
    }

    fn select_action(fixture: &Fixture) -> (ActionSetHandle, ActionHandle) {
        let mut set = ActionSetHandle::NULL;
        let set_info = ActionSetCreateInfo {
            action_set_name: "game".into(),
            ..Default::default()
        };
        fixture.layer.xr_create_action_set(fixture.instance, &set_info, &mut set);
        let mut action = ActionHandle::NULL;
        let action_info = ActionCreateInfo {
            action_name: "select".into(),
            action_type: ActionType::BOOLEAN_INPUT,
            ..Default::default()
        };
        fixture.layer.xr_create_action(set, &action_info, &mut action);
        let suggestion = InteractionProfileSuggestedBinding {
            next: None,
            interaction_profile: path(fixture, SIMPLE),
            suggested_bindings: vec![ActionSuggestedBinding {
                action,
                binding: path(fixture, SELECT),
            }],
        };
        fixture.layer.xr_suggest_interaction_profile_bindings(fixture.instance, &suggestion);
        (set, action)
    }

    #[test]
    fn test_main_session_carries_placeholders() {
        let fixture = fixture(41);
        let (set, action) = select_action(&fixture);
        let attach = SessionActionSetsAttachInfo {
            next: None,
            action_sets: vec![set],
        };
        assert_eq!(fixture.layer.xr_attach_session_action_sets(fixture.session, &attach), XrResult::SUCCESS);
        assert_eq!(
            fixture.layer.xr_attach_session_action_sets(fixture.session, &attach),
            XrResult::ERROR_ACTIONSETS_ALREADY_ATTACHED
        );
        assert!(fixture.runtime.live_actions() > 1);

        fixture.runtime.set_current_profile("/user/hand/left", SIMPLE);
        fixture.runtime.set_input(SELECT, FakeInput::Click(true));
        let sync = ActionsSyncInfo {
            next: None,
            active_action_sets: vec![ActiveActionSet {
                action_set: set,
                subaction_path: Path::NULL,
            }],
        };
        assert_eq!(fixture.layer.xr_sync_actions(fixture.session, &sync), XrResult::SUCCESS);

        let get = ActionStateGetInfo {
            next: None,
            action,
            subaction_path: Path::NULL,
        };
        let mut state = ActionStateBoolean::default();
        assert_eq!(
            fixture.layer.xr_get_action_state_boolean(fixture.session, &get, &mut state),
            XrResult::SUCCESS
        );
        assert!(state.current_state);
        assert!(state.is_active);
    }

    #[test]
    fn test_getters_check_the_action_type() {
        let fixture = fixture(42);
        let (set, action) = select_action(&fixture);
        let attach = SessionActionSetsAttachInfo {
            next: None,
            action_sets: vec![set],
        };
        fixture.layer.xr_attach_session_action_sets(fixture.session, &attach);
        let get = ActionStateGetInfo {
            next: None,
            action,
            subaction_path: Path::NULL,
        };
        let mut state = Default::default();
        assert_eq!(
            fixture.layer.xr_get_action_state_float(fixture.session, &get, &mut state),
            XrResult::ERROR_ACTION_TYPE_MISMATCH
        );
    }

    #[test]
    fn test_placeholders_go_away_with_the_session() {
        let fixture = fixture(43);
        assert!(fixture.runtime.live_actions() > 0);
        assert_eq!(fixture.layer.xr_destroy_session(fixture.session), XrResult::SUCCESS);
        assert_eq!(fixture.runtime.live_actions(), 0);
    }
}
