//! Overlay input, read through placeholder actions on the main session.
//!
//! The main process creates one action per well-known binding when its
//! session is created and attaches them next to the application's own sets.
//! Overlays name bindings by string; the answers come from the
//! placeholders bound to them.

use super::OverlayConnection;
use crate::actions::{ActionState, Placeholder, Placeholders, PLACEHOLDER_BINDINGS, TOP_LEVEL_PATHS};
use crate::chain::{
    ActionCreateInfo, ActionSetCreateInfo, ActionSpaceCreateInfo, ActionStateGetInfo,
    ActionSuggestedBinding, ActionsSyncInfo, ActiveActionSet, HapticActionInfo,
    InteractionProfileState, InteractionProfileSuggestedBinding, SessionActionSetsAttachInfo,
};
use crate::downchain::{dispatch, Downchain};
use crate::error::{LayerError, Result};
use crate::handles::{InstanceInfo, SessionInfo, SpaceOrigin};
use crate::rpc::{
    ApplyHapticFeedbackArgs, CreateActionSpaceFromBindingArgs, StopHapticFeedbackArgs,
    SyncActionsAndGetStateArgs,
};
use crate::state::Layer;
use crate::sync::lock;
use crate::types::{ActionHandle, ActionSetHandle, ActionType, Path, SessionHandle, SpaceHandle, XrResult};
use std::sync::Arc;
use xrov_config::{log_host_debug, log_host_info, log_host_warn};

const PLACEHOLDER_SET_NAME: &str = "xrov_placeholders";

impl Layer {
    /// Create one placeholder action per well-known binding under the main
    /// session's instance. Nothing is left behind on failure.
    pub(crate) fn create_placeholders(&self, instance: &InstanceInfo) -> Result<Placeholders> {
        let downchain = instance.downchain()?;
        let set_info = ActionSetCreateInfo {
            next: None,
            action_set_name: PLACEHOLDER_SET_NAME.into(),
            localized_action_set_name: "Overlay input".into(),
            priority: 0,
        };
        let mut action_set = ActionSetHandle::NULL;
        let result = dispatch(&downchain, |d| d.create_action_set(instance.actual, &set_info, &mut action_set));
        if result.failed() {
            return Err(LayerError::Runtime(result));
        }

        let mut placeholders = Placeholders::new(action_set);
        if let Err(err) = self.fill_placeholders(instance, &downchain, &mut placeholders) {
            dispatch(&downchain, |d| d.destroy_action_set(action_set));
            return Err(err);
        }
        log_host_info!("Placeholder actions created", count = placeholders.len() as u64);
        Ok(placeholders)
    }

    fn fill_placeholders(&self, instance: &InstanceInfo, downchain: &Arc<dyn Downchain>, placeholders: &mut Placeholders) -> Result<()> {
        for name in TOP_LEVEL_PATHS {
            let path = self.runtime_path(instance, downchain, name)?;
            placeholders.record_top_level(name, path);
        }

        for (index, entry) in PLACEHOLDER_BINDINGS.iter().enumerate() {
            let top_level = placeholders
                .top_level(entry.top_level)
                .ok_or(LayerError::ValidationFailure("placeholder under an unknown top-level path"))?;
            let info = ActionCreateInfo {
                next: None,
                action_name: format!("xrov_placeholder_{index}").as_str().into(),
                action_type: entry.action_type,
                subaction_paths: vec![top_level],
                localized_action_name: entry.binding.as_str().into(),
            };
            let action_set = placeholders.action_set;
            let mut action = ActionHandle::NULL;
            let result = dispatch(downchain, |d| d.create_action(action_set, &info, &mut action));
            if result.failed() {
                return Err(LayerError::Runtime(result));
            }
            let placeholder = Placeholder {
                action,
                action_type: entry.action_type,
                profile: self.runtime_path(instance, downchain, entry.profile)?,
                top_level,
                binding: self.runtime_path(instance, downchain, &entry.binding)?,
            };
            placeholders.insert(entry.profile, &entry.binding, placeholder);
        }
        Ok(())
    }

    pub(crate) fn destroy_placeholders(&self, session: &SessionInfo) {
        let Some(placeholders) = lock(&session.extra.actions).placeholders.take() else {
            return;
        };
        let Ok(downchain) = session.downchain() else {
            return;
        };
        let result = dispatch(&downchain, |d| d.destroy_action_set(placeholders.action_set));
        if result.failed() {
            log_host_warn!("Could not destroy placeholder actions", result = result.name());
        }
    }

    pub(crate) fn runtime_path(&self, instance: &InstanceInfo, downchain: &Arc<dyn Downchain>, name: &str) -> Result<Path> {
        let mut path = Path::NULL;
        let result = dispatch(downchain, |d| d.string_to_path(instance.actual, name, &mut path));
        if result.failed() {
            return Err(LayerError::Runtime(result));
        }
        self.atoms.record_path(path, name.to_string());
        Ok(path)
    }

    pub(crate) fn runtime_path_name(&self, instance: &InstanceInfo, downchain: &Arc<dyn Downchain>, path: Path) -> Option<String> {
        if path == Path::NULL {
            return None;
        }
        if let Some(known) = self.atoms.path_string(path) {
            return Some(known);
        }
        let mut name = String::new();
        let result = dispatch(downchain, |d| d.path_to_string(instance.actual, path, &mut name));
        if result.failed() {
            return None;
        }
        self.atoms.record_path(path, name.clone());
        Some(name)
    }

    /// Attach for a main session: the placeholder bindings are folded into
    /// each profile's suggestion, then the placeholder set is attached next
    /// to the application's.
    pub(crate) fn attach_with_placeholders(&self, session: &SessionInfo, info: &SessionActionSetsAttachInfo) -> Result<XrResult> {
        let downchain = session.downchain()?;
        let placeholders = lock(&session.extra.actions).placeholders.clone();
        let mut attach = info.clone();
        if let Some(placeholders) = &placeholders {
            let instance = self.tables.instances.get(session.instance)?;
            self.suggest_placeholders(&instance, &downchain, placeholders);
            attach.action_sets.push(placeholders.action_set);
        }

        let result = dispatch(&downchain, |d| d.attach_session_action_sets(session.actual, &attach));
        if result.succeeded() {
            lock(&session.extra.actions).attached_sets = Some(info.action_sets.clone());
        }
        Ok(result)
    }

    /// A runtime that rejects some binding paths gets the placeholders one
    /// at a time; whichever it accepts are kept.
    fn suggest_placeholders(&self, instance: &InstanceInfo, downchain: &Arc<dyn Downchain>, placeholders: &Placeholders) {
        let suggested = lock(&instance.extra.bindings).clone();
        for profile in placeholders.profiles() {
            let app: Vec<ActionSuggestedBinding> = suggested
                .get(&profile)
                .map_or_else(Vec::new, |s| s.suggested_bindings.clone());
            let extra = placeholders.bindings_for(profile);
            let suggest = |bindings: &[ActionSuggestedBinding]| {
                let info = InteractionProfileSuggestedBinding {
                    next: None,
                    interaction_profile: profile,
                    suggested_bindings: bindings.to_vec(),
                };
                dispatch(downchain, |d| d.suggest_interaction_profile_bindings(instance.actual, &info))
            };

            let all: Vec<ActionSuggestedBinding> = app.iter().chain(&extra).cloned().collect();
            let result = suggest(&all);
            if result.succeeded() {
                continue;
            }
            if result != XrResult::ERROR_PATH_UNSUPPORTED {
                log_host_warn!("Placeholder bindings rejected", profile = profile.0, result = result.name());
                continue;
            }

            let mut kept = app.clone();
            for binding in extra {
                kept.push(binding);
                if suggest(&kept).failed() {
                    kept.pop();
                }
            }
            log_host_debug!(
                "Placeholder bindings narrowed",
                profile = profile.0,
                kept = (kept.len() - app.len()) as u64
            );
        }
    }

    /// The placeholders, once the main application has attached.
    fn attached_placeholders(&self, session: &SessionInfo) -> Option<Arc<Placeholders>> {
        let actions = lock(&session.extra.actions);
        actions.attached_sets.as_ref()?;
        actions.placeholders.clone()
    }

    /// Sync for a main session. The placeholder set rides along so overlay
    /// input stays active between the application's syncs.
    pub(crate) fn sync_with_placeholders(&self, session: &SessionInfo, info: &ActionsSyncInfo) -> Result<XrResult> {
        let mut sync = info.clone();
        if let Some(placeholders) = self.attached_placeholders(session) {
            sync.active_action_sets.push(ActiveActionSet {
                action_set: placeholders.action_set,
                subaction_path: Path::NULL,
            });
        }
        let result = dispatch(&session.downchain()?, |d| d.sync_actions(session.actual, &sync));
        if result.succeeded() {
            lock(&session.extra.actions).app_active_sets = info.active_action_sets.clone();
        }
        Ok(result)
    }

    fn sync_placeholders(&self, session: &SessionInfo, placeholders: &Placeholders) -> Result<XrResult> {
        let mut active_action_sets = lock(&session.extra.actions).app_active_sets.clone();
        active_action_sets.push(ActiveActionSet {
            action_set: placeholders.action_set,
            subaction_path: Path::NULL,
        });
        let info = ActionsSyncInfo {
            next: None,
            active_action_sets,
        };
        Ok(dispatch(&session.downchain()?, |d| d.sync_actions(session.actual, &info)))
    }

    /// Action spaces only follow their pose after a sync.
    pub(super) fn refresh_placeholder_poses(&self, session: SessionHandle) -> Result<()> {
        let session = self.tables.sessions.get(session)?;
        if let Some(placeholders) = self.attached_placeholders(&session) {
            let result = self.sync_placeholders(&session, &placeholders)?;
            if result.failed() {
                log_host_debug!("Placeholder sync failed", result = result.name());
            }
        }
        Ok(())
    }

    fn current_profile_name(
        &self,
        instance: &InstanceInfo,
        downchain: &Arc<dyn Downchain>,
        session: &SessionInfo,
        placeholders: &Placeholders,
        top_level: &str,
    ) -> Option<String> {
        let path = placeholders.top_level(top_level)?;
        let mut state = InteractionProfileState::default();
        let result = dispatch(downchain, |d| d.get_current_interaction_profile(session.actual, path, &mut state));
        if result.failed() {
            return None;
        }
        self.runtime_path_name(instance, downchain, state.interaction_profile)
    }

    /// Pairs with no placeholder come back as sent. So does everything
    /// before the main application attaches its actions.
    pub(crate) fn serve_sync_actions_and_get_state(
        &self,
        connection: &OverlayConnection,
        args: &mut SyncActionsAndGetStateArgs,
    ) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        if args.profiles.len() != args.bindings.len()
            || args.states.len() != args.bindings.len()
            || args.current_profiles.len() != args.top_level_paths.len()
        {
            return Err(LayerError::ValidationFailure("binding arrays differ in length"));
        }

        let session = self.tables.sessions.get(args.session)?;
        let Some(placeholders) = self.attached_placeholders(&session) else {
            log_host_debug!("Main session has not attached its actions", connection = connection.id);
            return Ok(XrResult::SUCCESS);
        };
        let result = self.sync_placeholders(&session, &placeholders)?;
        if result != XrResult::SUCCESS {
            return Ok(result);
        }

        let downchain = session.downchain()?;
        let requested = args.profiles.iter().zip(&args.bindings);
        for ((profile, binding), slot) in requested.zip(args.states.iter_mut()) {
            let state = placeholders
                .get(profile, binding)
                .and_then(|placeholder| read_placeholder(&downchain, session.actual, placeholder));
            if let Some(state) = state {
                *slot = state.into_chain();
            }
        }

        let instance = self.tables.instances.get(session.instance)?;
        for (top_level, slot) in args.top_level_paths.iter().zip(args.current_profiles.iter_mut()) {
            *slot = self
                .current_profile_name(&instance, &downchain, &session, &placeholders, top_level)
                .unwrap_or_default();
        }
        Ok(result)
    }

    /// Stops at the first binding the runtime refuses.
    pub(crate) fn serve_apply_haptic_feedback(
        &self,
        connection: &OverlayConnection,
        args: &mut ApplyHapticFeedbackArgs,
    ) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        if args.profiles.len() != args.bindings.len() {
            return Err(LayerError::ValidationFailure("binding arrays differ in length"));
        }
        let session = self.tables.sessions.get(args.session)?;
        let Some(placeholders) = self.attached_placeholders(&session) else {
            return Ok(XrResult::SUCCESS);
        };

        let downchain = session.downchain()?;
        for placeholder in vibration_targets(&placeholders, &args.profiles, &args.bindings) {
            let info = HapticActionInfo {
                next: None,
                action: placeholder.action,
                subaction_path: placeholder.top_level,
            };
            let result = dispatch(&downchain, |d| d.apply_haptic_feedback(session.actual, &info, &args.feedback));
            if result.failed() {
                return Ok(result);
            }
        }
        Ok(XrResult::SUCCESS)
    }

    pub(crate) fn serve_stop_haptic_feedback(
        &self,
        connection: &OverlayConnection,
        args: &mut StopHapticFeedbackArgs,
    ) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        if args.profiles.len() != args.bindings.len() {
            return Err(LayerError::ValidationFailure("binding arrays differ in length"));
        }
        let session = self.tables.sessions.get(args.session)?;
        let Some(placeholders) = self.attached_placeholders(&session) else {
            return Ok(XrResult::SUCCESS);
        };

        let downchain = session.downchain()?;
        for placeholder in vibration_targets(&placeholders, &args.profiles, &args.bindings) {
            let info = HapticActionInfo {
                next: None,
                action: placeholder.action,
                subaction_path: placeholder.top_level,
            };
            let result = dispatch(&downchain, |d| d.stop_haptic_feedback(session.actual, &info));
            if result.failed() {
                log_host_debug!("Could not stop haptic output", result = result.name());
            }
        }
        Ok(XrResult::SUCCESS)
    }

    /// The new space belongs to the overlay and goes away with it.
    pub(crate) fn serve_create_action_space_from_binding(
        &self,
        connection: &OverlayConnection,
        args: &mut CreateActionSpaceFromBindingArgs,
    ) -> Result<XrResult> {
        let context = connection.require_context()?;
        context.check_session(args.session)?;
        let session = self.tables.sessions.get(args.session)?;
        let placeholder = lock(&session.extra.actions)
            .placeholders
            .as_ref()
            .and_then(|placeholders| placeholders.get(&args.profile, &args.binding).cloned())
            .filter(|placeholder| placeholder.action_type == ActionType::POSE_INPUT);
        let Some(placeholder) = placeholder else {
            log_host_debug!(
                "No pose placeholder for binding",
                connection = connection.id,
                binding = args.binding.as_str()
            );
            return Ok(XrResult::ERROR_PATH_UNSUPPORTED);
        };

        let info = ActionSpaceCreateInfo {
            next: None,
            action: placeholder.action,
            subaction_path: placeholder.top_level,
            pose_in_action_space: args.pose_in_action_space.clone(),
        };
        let mut actual = SpaceHandle::NULL;
        let result = dispatch(&session.downchain()?, |d| d.create_action_space(session.actual, &info, &mut actual));
        if result.failed() {
            return Ok(result);
        }
        let origin = SpaceOrigin::Action {
            action: placeholder.action,
            subaction_path: placeholder.top_level,
            pose_in_action_space: info.pose_in_action_space,
        };
        args.space = self.register_new_space(&session, actual, origin)?;
        lock(&context.owned_spaces).insert(args.space);
        Ok(result)
    }
}

fn read_placeholder(downchain: &Arc<dyn Downchain>, session: SessionHandle, placeholder: &Placeholder) -> Option<ActionState> {
    let info = ActionStateGetInfo {
        next: None,
        action: placeholder.action,
        subaction_path: placeholder.top_level,
    };
    let mut state = ActionState::cleared(placeholder.action_type)?;
    let result = match &mut state {
        ActionState::Boolean(out) => dispatch(downchain, |d| d.get_action_state_boolean(session, &info, out)),
        ActionState::Float(out) => dispatch(downchain, |d| d.get_action_state_float(session, &info, out)),
        ActionState::Vector2f(out) => dispatch(downchain, |d| d.get_action_state_vector2f(session, &info, out)),
        ActionState::Pose(out) => dispatch(downchain, |d| d.get_action_state_pose(session, &info, out)),
    };
    result.succeeded().then_some(state)
}

fn vibration_targets<'a>(
    placeholders: &'a Placeholders,
    profiles: &'a [String],
    bindings: &'a [String],
) -> impl Iterator<Item = &'a Placeholder> + 'a {
    profiles
        .iter()
        .zip(bindings)
        .filter_map(|(profile, binding)| placeholders.get(profile, binding))
        .filter(|placeholder| placeholder.action_type == ActionType::VIBRATION_OUTPUT)
}
