//! Action input shared across the process boundary.
//!
//! Paths are per-process atoms, so everything here is keyed by path
//! strings. The main process binds one placeholder action to every
//! well-known (interaction profile, binding) pair; an overlay reads input
//! by naming the pairs its own suggested bindings cover.

use crate::chain::{
    ActionStateBoolean, ActionStateFloat, ActionStatePose, ActionStateVector2f,
    ActionSuggestedBinding, Chain, Record, Vector2f,
};
use crate::types::{ActionHandle, ActionSetHandle, ActionType, Path, Time};
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

/// Top-level user paths an action may name as subaction paths.
pub const TOP_LEVEL_PATHS: [&str; 5] = [
    "/user/hand/left",
    "/user/hand/right",
    "/user/head",
    "/user/gamepad",
    "/user/treadmill",
];

/// A float input at or above this reads as pressed for a boolean action.
pub const BOOLEAN_THRESHOLD: f32 = 0.5;

/// The top-level user path a full binding path lives under.
pub fn top_level_of(binding: &str) -> Option<&'static str> {
    TOP_LEVEL_PATHS.iter().copied().find(|top| {
        binding
            .strip_prefix(top)
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Action type a placeholder needs to read `binding`.
pub fn binding_action_type(binding: &str) -> ActionType {
    if binding.contains("/output/") {
        return ActionType::VIBRATION_OUTPUT;
    }
    match binding.rsplit('/').next().unwrap_or_default() {
        "click" | "touch" => ActionType::BOOLEAN_INPUT,
        "value" | "force" | "x" | "y" => ActionType::FLOAT_INPUT,
        "pose" => ActionType::POSE_INPUT,
        _ => ActionType::VECTOR2F_INPUT,
    }
}

struct ProfileLayout {
    profile: &'static str,
    users: &'static [&'static str],
    components: &'static [&'static str],
}

const HANDS: &[&str] = &["/user/hand/left", "/user/hand/right"];

const PROFILE_LAYOUTS: &[ProfileLayout] = &[
    ProfileLayout {
        profile: "/interaction_profiles/khr/simple_controller",
        users: HANDS,
        components: &[
            "/input/select/click",
            "/input/menu/click",
            "/input/grip/pose",
            "/input/aim/pose",
            "/output/haptic",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/htc/vive_controller",
        users: HANDS,
        components: &[
            "/input/system/click",
            "/input/squeeze/click",
            "/input/menu/click",
            "/input/trigger/click",
            "/input/trigger/value",
            "/input/trackpad",
            "/input/trackpad/click",
            "/input/trackpad/touch",
            "/input/grip/pose",
            "/input/aim/pose",
            "/output/haptic",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/htc/vive_pro",
        users: &["/user/head"],
        components: &[
            "/input/system/click",
            "/input/volume_up/click",
            "/input/volume_down/click",
            "/input/mute_mic/click",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/oculus/touch_controller",
        users: &["/user/hand/left"],
        components: &[
            "/input/x/click",
            "/input/x/touch",
            "/input/y/click",
            "/input/y/touch",
            "/input/menu/click",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/oculus/touch_controller",
        users: &["/user/hand/right"],
        components: &[
            "/input/a/click",
            "/input/a/touch",
            "/input/b/click",
            "/input/b/touch",
            "/input/system/click",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/oculus/touch_controller",
        users: HANDS,
        components: &[
            "/input/squeeze/value",
            "/input/trigger/value",
            "/input/trigger/touch",
            "/input/thumbstick",
            "/input/thumbstick/click",
            "/input/thumbstick/touch",
            "/input/thumbrest/touch",
            "/input/grip/pose",
            "/input/aim/pose",
            "/output/haptic",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/microsoft/motion_controller",
        users: HANDS,
        components: &[
            "/input/menu/click",
            "/input/squeeze/click",
            "/input/trigger/value",
            "/input/thumbstick",
            "/input/thumbstick/click",
            "/input/trackpad",
            "/input/trackpad/click",
            "/input/trackpad/touch",
            "/input/grip/pose",
            "/input/aim/pose",
            "/output/haptic",
        ],
    },
    ProfileLayout {
        profile: "/interaction_profiles/microsoft/xbox_controller",
        users: &["/user/gamepad"],
        components: &[
            "/input/menu/click",
            "/input/view/click",
            "/input/a/click",
            "/input/b/click",
            "/input/x/click",
            "/input/y/click",
            "/input/dpad_down/click",
            "/input/dpad_right/click",
            "/input/dpad_up/click",
            "/input/dpad_left/click",
            "/input/shoulder_left/click",
            "/input/shoulder_right/click",
            "/input/thumbstick_left/click",
            "/input/thumbstick_right/click",
            "/input/trigger_left/value",
            "/input/trigger_right/value",
            "/input/thumbstick_left",
            "/input/thumbstick_right",
            "/output/haptic_left",
            "/output/haptic_right",
            "/output/haptic_left_trigger",
            "/output/haptic_right_trigger",
        ],
    },
];

/// One placeholder the main process creates and binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderBinding {
    pub profile: &'static str,
    pub top_level: &'static str,
    pub binding: String,
    pub action_type: ActionType,
}

/// Every (profile, binding) pair an overlay can read through the main
/// process.
pub static PLACEHOLDER_BINDINGS: Lazy<Vec<PlaceholderBinding>> = Lazy::new(|| {
    PROFILE_LAYOUTS
        .iter()
        .flat_map(|layout| {
            layout.users.iter().flat_map(move |user| {
                layout.components.iter().map(move |component| {
                    let binding = format!("{user}{component}");
                    PlaceholderBinding {
                        profile: layout.profile,
                        top_level: user,
                        action_type: binding_action_type(&binding),
                        binding,
                    }
                })
            })
        })
        .collect()
});

/// Runtime objects behind one placeholder binding, in the main process's
/// own atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub action: ActionHandle,
    pub action_type: ActionType,
    pub profile: Path,
    pub top_level: Path,
    pub binding: Path,
}

/// The action set the main process binds on overlays' behalf.
#[derive(Debug, Default)]
pub struct Placeholders {
    pub action_set: ActionSetHandle,
    by_binding: HashMap<(String, String), Placeholder>,
    top_levels: HashMap<String, Path>,
}

impl Placeholders {
    pub fn new(action_set: ActionSetHandle) -> Self {
        Self {
            action_set,
            ..Default::default()
        }
    }

    pub fn insert(&mut self, profile: &str, binding: &str, placeholder: Placeholder) {
        self.by_binding
            .insert((profile.to_string(), binding.to_string()), placeholder);
    }

    pub fn get(&self, profile: &str, binding: &str) -> Option<&Placeholder> {
        self.by_binding.get(&(profile.to_string(), binding.to_string()))
    }

    pub fn record_top_level(&mut self, name: &str, path: Path) {
        self.top_levels.insert(name.to_string(), path);
    }

    pub fn top_level(&self, name: &str) -> Option<Path> {
        self.top_levels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_binding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_binding.is_empty()
    }

    /// Every profile some placeholder is bound under.
    pub fn profiles(&self) -> BTreeSet<Path> {
        self.by_binding.values().map(|p| p.profile).collect()
    }

    pub fn bindings_for(&self, profile: Path) -> Vec<ActionSuggestedBinding> {
        let mut bindings: Vec<ActionSuggestedBinding> = self
            .by_binding
            .values()
            .filter(|p| p.profile == profile)
            .map(|p| ActionSuggestedBinding {
                action: p.action,
                binding: p.binding,
            })
            .collect();
        bindings.sort_by_key(|b| b.binding);
        bindings
    }
}

/// A synced input value of any action type.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionState {
    Boolean(ActionStateBoolean),
    Float(ActionStateFloat),
    Vector2f(ActionStateVector2f),
    Pose(ActionStatePose),
}

impl ActionState {
    /// An inactive state for an action of type `ty`; `None` for outputs.
    pub fn cleared(ty: ActionType) -> Option<Self> {
        match ty {
            ActionType::BOOLEAN_INPUT => Some(Self::Boolean(ActionStateBoolean::default())),
            ActionType::FLOAT_INPUT => Some(Self::Float(ActionStateFloat::default())),
            ActionType::VECTOR2F_INPUT => Some(Self::Vector2f(ActionStateVector2f::default())),
            ActionType::POSE_INPUT => Some(Self::Pose(ActionStatePose::default())),
            _ => None,
        }
    }

    pub fn from_chain(chain: &Chain) -> Option<Self> {
        match chain.as_deref()? {
            Record::ActionStateBoolean(state) => Some(Self::Boolean(ActionStateBoolean { next: None, ..state.clone() })),
            Record::ActionStateFloat(state) => Some(Self::Float(ActionStateFloat { next: None, ..state.clone() })),
            Record::ActionStateVector2f(state) => Some(Self::Vector2f(ActionStateVector2f { next: None, ..state.clone() })),
            Record::ActionStatePose(state) => Some(Self::Pose(ActionStatePose { next: None, ..state.clone() })),
            _ => None,
        }
    }

    pub fn into_chain(self) -> Chain {
        let record: Record = match self {
            Self::Boolean(state) => state.into(),
            Self::Float(state) => state.into(),
            Self::Vector2f(state) => state.into(),
            Self::Pose(state) => state.into(),
        };
        Some(Box::new(record))
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Boolean(_) => ActionType::BOOLEAN_INPUT,
            Self::Float(_) => ActionType::FLOAT_INPUT,
            Self::Vector2f(_) => ActionType::VECTOR2F_INPUT,
            Self::Pose(_) => ActionType::POSE_INPUT,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Boolean(state) => state.is_active,
            Self::Float(state) => state.is_active,
            Self::Vector2f(state) => state.is_active,
            Self::Pose(state) => state.is_active,
        }
    }

    fn last_change(&self) -> Option<(bool, Time)> {
        match self {
            Self::Boolean(state) => Some((state.changed_since_last_sync, state.last_change_time)),
            Self::Float(state) => Some((state.changed_since_last_sync, state.last_change_time)),
            Self::Vector2f(state) => Some((state.changed_since_last_sync, state.last_change_time)),
            Self::Pose(_) => None,
        }
    }

    fn set_last_change(&mut self, changed: bool, time: Time) {
        match self {
            Self::Boolean(state) => {
                state.changed_since_last_sync = changed;
                state.last_change_time = time;
            }
            Self::Float(state) => {
                state.changed_since_last_sync = changed;
                state.last_change_time = time;
            }
            Self::Vector2f(state) => {
                state.changed_since_last_sync = changed;
                state.last_change_time = time;
            }
            Self::Pose(_) => {}
        }
    }

    /// The same reading as seen by an action of type `ty`. A float reads
    /// as pressed from [`BOOLEAN_THRESHOLD`]; a boolean reads as 0 or 1.
    /// Readings with no sensible conversion come back inactive.
    pub fn coerce(self, ty: ActionType) -> Option<Self> {
        if self.action_type() == ty {
            return Some(self);
        }
        let converted = match (self, ty) {
            (Self::Float(state), ActionType::BOOLEAN_INPUT) => Self::Boolean(ActionStateBoolean {
                next: None,
                current_state: state.current_state >= BOOLEAN_THRESHOLD,
                changed_since_last_sync: state.changed_since_last_sync,
                last_change_time: state.last_change_time,
                is_active: state.is_active,
            }),
            (Self::Boolean(state), ActionType::FLOAT_INPUT) => Self::Float(ActionStateFloat {
                next: None,
                current_state: if state.current_state { 1.0 } else { 0.0 },
                changed_since_last_sync: state.changed_since_last_sync,
                last_change_time: state.last_change_time,
                is_active: state.is_active,
            }),
            (_, ty) => return Self::cleared(ty),
        };
        Some(converted)
    }

    /// Fold `incoming` into this state when several bindings feed one
    /// action. Both must already have the same type.
    ///
    /// Booleans OR together, floats keep the largest value, vectors keep
    /// the longer one and poses are active when any source is.
    pub fn merge(&mut self, incoming: &ActionState) {
        if !incoming.is_active() {
            return;
        }
        if !self.is_active() {
            *self = incoming.clone();
            return;
        }
        match (self, incoming) {
            (Self::Boolean(acc), Self::Boolean(new)) => {
                acc.current_state |= new.current_state;
                acc.changed_since_last_sync |= new.changed_since_last_sync;
                acc.last_change_time = acc.last_change_time.max(new.last_change_time);
            }
            (Self::Float(acc), Self::Float(new)) => {
                if new.current_state > acc.current_state {
                    acc.current_state = new.current_state;
                }
                acc.changed_since_last_sync |= new.changed_since_last_sync;
                acc.last_change_time = acc.last_change_time.max(new.last_change_time);
            }
            (Self::Vector2f(acc), Self::Vector2f(new)) => {
                if length_squared(&new.current_state) > length_squared(&acc.current_state) {
                    acc.current_state = new.current_state.clone();
                }
                acc.changed_since_last_sync |= new.changed_since_last_sync;
                acc.last_change_time = acc.last_change_time.max(new.last_change_time);
            }
            (Self::Pose(acc), Self::Pose(new)) => acc.is_active |= new.is_active,
            _ => {}
        }
    }

    /// Recompute the change flag against the state of the previous sync.
    /// A value is changed only when it was active both times and differs;
    /// an unchanged value keeps its earlier change time.
    pub fn update_last_change(&mut self, previous: Option<&ActionState>) {
        let Some((_, time)) = self.last_change() else {
            return;
        };
        let previous = previous.filter(|prev| prev.is_active() && prev.action_type() == self.action_type());
        let Some(previous) = previous.filter(|_| self.is_active()) else {
            self.set_last_change(false, time);
            return;
        };
        if self.same_value(previous) {
            let earlier = previous.last_change().map_or(time, |(_, t)| t);
            self.set_last_change(false, earlier);
        } else {
            self.set_last_change(true, time);
        }
    }

    fn same_value(&self, other: &ActionState) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.current_state == b.current_state,
            (Self::Float(a), Self::Float(b)) => a.current_state == b.current_state,
            (Self::Vector2f(a), Self::Vector2f(b)) => a.current_state == b.current_state,
            (Self::Pose(a), Self::Pose(b)) => a.is_active == b.is_active,
            _ => false,
        }
    }
}

fn length_squared(v: &Vector2f) -> f32 {
    v.x * v.x + v.y * v.y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boolean(current_state: bool, is_active: bool, last_change_time: Time) -> ActionState {
        ActionState::Boolean(ActionStateBoolean {
            current_state,
            is_active,
            last_change_time,
            ..Default::default()
        })
    }

    fn float(current_state: f32) -> ActionState {
        ActionState::Float(ActionStateFloat {
            current_state,
            is_active: true,
            ..Default::default()
        })
    }

    fn vector(x: f32, y: f32) -> ActionState {
        ActionState::Vector2f(ActionStateVector2f {
            current_state: Vector2f { x, y },
            is_active: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_top_level_of_binding() {
        assert_eq!(top_level_of("/user/hand/left/input/select/click"), Some("/user/hand/left"));
        assert_eq!(top_level_of("/user/gamepad/input/a/click"), Some("/user/gamepad"));
        assert_eq!(top_level_of("/user/hand/leftish/input"), None);
        assert_eq!(top_level_of("/user/hand/left"), None);
    }

    #[test]
    fn test_placeholder_table_is_consistent() {
        let bindings = &*PLACEHOLDER_BINDINGS;
        assert!(bindings.len() > 50);
        for placeholder in bindings {
            assert_eq!(top_level_of(&placeholder.binding), Some(placeholder.top_level));
        }
        let select = bindings
            .iter()
            .find(|p| p.binding == "/user/hand/right/input/select/click")
            .unwrap();
        assert_eq!(select.profile, "/interaction_profiles/khr/simple_controller");
        assert_eq!(select.action_type, ActionType::BOOLEAN_INPUT);

        let mut pairs: Vec<(&str, &str)> = bindings.iter().map(|p| (p.profile, p.binding.as_str())).collect();
        pairs.sort_unstable();
        pairs.dedup();
        assert_eq!(pairs.len(), bindings.len());
    }

    #[test]
    fn test_binding_types_follow_the_component() {
        assert_eq!(binding_action_type("/user/hand/left/input/trigger/value"), ActionType::FLOAT_INPUT);
        assert_eq!(binding_action_type("/user/hand/left/input/thumbstick"), ActionType::VECTOR2F_INPUT);
        assert_eq!(binding_action_type("/user/hand/left/input/aim/pose"), ActionType::POSE_INPUT);
        assert_eq!(binding_action_type("/user/gamepad/output/haptic_left"), ActionType::VIBRATION_OUTPUT);
    }

    #[test]
    fn test_merge_rules() {
        let mut acc = boolean(false, true, 5);
        acc.merge(&boolean(true, true, 9));
        assert_eq!(acc, boolean(true, true, 9));

        let mut acc = float(0.25);
        acc.merge(&float(0.75));
        acc.merge(&float(0.5));
        assert_eq!(acc, float(0.75));

        let mut acc = vector(0.5, 0.0);
        acc.merge(&vector(0.3, -0.6));
        acc.merge(&vector(0.0, 0.1));
        assert_eq!(acc, vector(0.3, -0.6));

        let mut acc = ActionState::cleared(ActionType::POSE_INPUT).unwrap();
        acc.merge(&ActionState::Pose(ActionStatePose { next: None, is_active: true }));
        assert!(acc.is_active());
    }

    #[test]
    fn test_inactive_states_do_not_contribute() {
        let mut acc = ActionState::cleared(ActionType::FLOAT_INPUT).unwrap();
        acc.merge(&float(0.4));
        assert_eq!(acc, float(0.4));

        let mut idle = ActionState::Float(ActionStateFloat {
            current_state: 0.9,
            ..Default::default()
        });
        idle.merge(&ActionState::cleared(ActionType::FLOAT_INPUT).unwrap());
        assert!(!idle.is_active());
        acc.merge(&idle);
        assert_eq!(acc, float(0.4));
    }

    #[test]
    fn test_last_change_tracks_the_previous_sync() {
        let previous = boolean(true, true, 100);

        let mut same = boolean(true, true, 200);
        same.update_last_change(Some(&previous));
        assert_eq!(same, boolean(true, true, 100));

        let mut flipped = boolean(false, true, 200);
        flipped.update_last_change(Some(&previous));
        let ActionState::Boolean(flipped) = flipped else { unreachable!() };
        assert!(flipped.changed_since_last_sync);
        assert_eq!(flipped.last_change_time, 200);

        let mut first = boolean(true, true, 300);
        first.update_last_change(None);
        let ActionState::Boolean(first) = first else { unreachable!() };
        assert!(!first.changed_since_last_sync);
        assert_eq!(first.last_change_time, 300);
    }

    #[test]
    fn test_coerce_between_button_and_trigger() {
        let pressed = float(0.8).coerce(ActionType::BOOLEAN_INPUT).unwrap();
        assert_eq!(pressed, boolean(true, true, 0));
        let released = float(0.2).coerce(ActionType::BOOLEAN_INPUT).unwrap();
        assert_eq!(released, boolean(false, true, 0));

        let as_float = boolean(true, true, 0).coerce(ActionType::FLOAT_INPUT).unwrap();
        assert_eq!(as_float, float(1.0));

        let lost = vector(1.0, 0.0).coerce(ActionType::BOOLEAN_INPUT).unwrap();
        assert!(!lost.is_active());
        assert_eq!(float(1.0).coerce(ActionType::VIBRATION_OUTPUT), None);
    }

    #[test]
    fn test_chain_round_trip_drops_successors() {
        let state = ActionStateFloat {
            next: Some(Box::new(ActionStatePose::default().into())),
            current_state: 0.5,
            is_active: true,
            ..Default::default()
        };
        let chain: Chain = Some(Box::new(state.into()));
        assert_eq!(ActionState::from_chain(&chain), Some(float(0.5)));
        assert_eq!(ActionState::from_chain(&None), None);
    }
}
