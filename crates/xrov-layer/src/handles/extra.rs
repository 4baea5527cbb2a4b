//! Kind-specific payload carried by each handle entry.

use crate::actions::{ActionState, Placeholders};
use crate::chain::{
    ActionCreateInfo, ActionSetCreateInfo, ActiveActionSet, DebugUtilsMessengerCreateInfoEXT, InstanceCreateInfo,
    InteractionProfileSuggestedBinding, Posef, SessionCreateInfo, SwapchainCreateInfo,
};
use crate::sync::lock;
use crate::types::{
    ActionHandle, ActionSetHandle, DebugUtilsMessengerHandle, Path, ReferenceSpaceType,
    SessionHandle, SpaceHandle, SwapchainHandle,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub trait HandleExtra: Send + Sync + 'static {
    /// Drop references to child handles. Called once, on teardown.
    fn release_children(&self) {}
}

#[derive(Debug, Default)]
pub struct InstanceChildren {
    pub sessions: HashSet<SessionHandle>,
    pub action_sets: HashSet<ActionSetHandle>,
    pub messengers: HashSet<DebugUtilsMessengerHandle>,
}

pub struct InstanceExtra {
    pub create_info: InstanceCreateInfo,
    pub children: Mutex<InstanceChildren>,
    /// Latest suggestion per interaction profile.
    pub bindings: Mutex<HashMap<Path, InteractionProfileSuggestedBinding>>,
}

impl InstanceExtra {
    pub fn new(create_info: InstanceCreateInfo) -> Self {
        Self {
            create_info,
            children: Mutex::default(),
            bindings: Mutex::default(),
        }
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.create_info
            .enabled_extension_names
            .iter()
            .any(|enabled| enabled == name)
    }
}

impl HandleExtra for InstanceExtra {
    fn release_children(&self) {
        *lock(&self.children) = InstanceChildren::default();
        lock(&self.bindings).clear();
    }
}

#[derive(Debug, Default)]
pub struct SessionChildren {
    pub swapchains: HashSet<SwapchainHandle>,
    pub spaces: HashSet<SpaceHandle>,
}

/// Action bookkeeping for one session.
#[derive(Debug, Default)]
pub struct SessionActions {
    /// Sets the application attached; `None` until it attaches.
    pub attached_sets: Option<Vec<ActionSetHandle>>,
    /// Proxied sessions: state from the latest sync, per action and
    /// subaction path. The null path holds the whole action.
    pub states: HashMap<ActionHandle, HashMap<Path, ActionState>>,
    /// Proxied sessions: current profile name per top-level path name.
    pub current_profiles: HashMap<String, String>,
    /// Proxied sessions: a profile changed and the event is not yet
    /// delivered.
    pub profile_changed: bool,
    /// Main sessions: the actions overlays read input through.
    pub placeholders: Option<Arc<Placeholders>>,
    /// Main sessions: what the application synced last. Placeholder syncs
    /// keep these active.
    pub app_active_sets: Vec<ActiveActionSet>,
}

impl SessionActions {
    pub fn is_attached(&self, action_set: ActionSetHandle) -> bool {
        self.attached_sets
            .as_ref()
            .is_some_and(|sets| sets.contains(&action_set))
    }
}

pub struct SessionExtra {
    pub create_info: SessionCreateInfo,
    pub children: Mutex<SessionChildren>,
    pub actions: Mutex<SessionActions>,
}

impl SessionExtra {
    pub fn new(create_info: SessionCreateInfo) -> Self {
        Self {
            create_info,
            children: Mutex::default(),
            actions: Mutex::default(),
        }
    }
}

impl HandleExtra for SessionExtra {
    fn release_children(&self) {
        *lock(&self.children) = SessionChildren::default();
        let mut actions = lock(&self.actions);
        actions.states.clear();
        actions.attached_sets = None;
        actions.app_active_sets.clear();
    }
}

pub struct SwapchainExtra {
    pub create_info: SwapchainCreateInfo,
    /// Known up front for swapchains that live in another process.
    pub image_count: Option<u32>,
}

impl HandleExtra for SwapchainExtra {}

#[derive(Debug, Clone, PartialEq)]
pub enum SpaceOrigin {
    Reference(ReferenceSpaceType),
    Action {
        action: ActionHandle,
        subaction_path: Path,
        pose_in_action_space: Posef,
    },
}

/// The main-process space an overlay's action space currently tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundActionSpace {
    pub main_space: SpaceHandle,
    pub profile: String,
    pub binding: String,
}

pub struct SpaceExtra {
    pub origin: SpaceOrigin,
    /// Proxied action spaces only. Rebound when the profile changes.
    pub bound: Mutex<Option<BoundActionSpace>>,
}

impl SpaceExtra {
    pub fn new(origin: SpaceOrigin) -> Self {
        Self {
            origin,
            bound: Mutex::default(),
        }
    }
}

impl HandleExtra for SpaceExtra {}

pub struct ActionSetExtra {
    pub create_info: ActionSetCreateInfo,
    pub actions: Mutex<HashSet<ActionHandle>>,
}

impl ActionSetExtra {
    pub fn new(create_info: ActionSetCreateInfo) -> Self {
        Self {
            create_info,
            actions: Mutex::default(),
        }
    }
}

impl HandleExtra for ActionSetExtra {
    fn release_children(&self) {
        lock(&self.actions).clear();
    }
}

pub struct ActionExtra {
    pub create_info: ActionCreateInfo,
}

impl HandleExtra for ActionExtra {}

pub struct DebugMessengerExtra {
    pub create_info: DebugUtilsMessengerCreateInfoEXT,
}

impl HandleExtra for DebugMessengerExtra {}
