//! Core API value types: result codes, structure tags, handles, atoms,
//! enumerations and fixed-size strings.

use std::fmt;

/// API result code. Non-negative values are successes.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XrResult(pub i32);

impl XrResult {
    pub const SUCCESS: Self = Self(0);
    pub const TIMEOUT_EXPIRED: Self = Self(1);
    pub const SESSION_LOSS_PENDING: Self = Self(3);
    pub const EVENT_UNAVAILABLE: Self = Self(4);
    pub const SPACE_BOUNDS_UNAVAILABLE: Self = Self(7);
    pub const SESSION_NOT_FOCUSED: Self = Self(8);
    pub const FRAME_DISCARDED: Self = Self(9);
    pub const ERROR_VALIDATION_FAILURE: Self = Self(-1);
    pub const ERROR_RUNTIME_FAILURE: Self = Self(-2);
    pub const ERROR_OUT_OF_MEMORY: Self = Self(-3);
    pub const ERROR_INITIALIZATION_FAILED: Self = Self(-6);
    pub const ERROR_FUNCTION_UNSUPPORTED: Self = Self(-7);
    pub const ERROR_LIMIT_REACHED: Self = Self(-10);
    pub const ERROR_SIZE_INSUFFICIENT: Self = Self(-11);
    pub const ERROR_HANDLE_INVALID: Self = Self(-12);
    pub const ERROR_SESSION_RUNNING: Self = Self(-14);
    pub const ERROR_SESSION_NOT_RUNNING: Self = Self(-16);
    pub const ERROR_SYSTEM_INVALID: Self = Self(-18);
    pub const ERROR_PATH_INVALID: Self = Self(-19);
    pub const ERROR_PATH_UNSUPPORTED: Self = Self(-20);
    pub const ERROR_LAYER_LIMIT_EXCEEDED: Self = Self(-24);
    pub const ERROR_ACTION_TYPE_MISMATCH: Self = Self(-27);
    pub const ERROR_SESSION_NOT_READY: Self = Self(-28);
    pub const ERROR_SESSION_NOT_STOPPING: Self = Self(-29);
    pub const ERROR_FORM_FACTOR_UNAVAILABLE: Self = Self(-35);
    pub const ERROR_CALL_ORDER_INVALID: Self = Self(-37);
    pub const ERROR_ACTIONSET_NOT_ATTACHED: Self = Self(-46);
    pub const ERROR_ACTIONSETS_ALREADY_ATTACHED: Self = Self(-47);

    pub fn succeeded(self) -> bool {
        self.0 >= 0
    }

    pub fn failed(self) -> bool {
        self.0 < 0
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SUCCESS => "XR_SUCCESS",
            Self::TIMEOUT_EXPIRED => "XR_TIMEOUT_EXPIRED",
            Self::SESSION_LOSS_PENDING => "XR_SESSION_LOSS_PENDING",
            Self::EVENT_UNAVAILABLE => "XR_EVENT_UNAVAILABLE",
            Self::SPACE_BOUNDS_UNAVAILABLE => "XR_SPACE_BOUNDS_UNAVAILABLE",
            Self::SESSION_NOT_FOCUSED => "XR_SESSION_NOT_FOCUSED",
            Self::FRAME_DISCARDED => "XR_FRAME_DISCARDED",
            Self::ERROR_VALIDATION_FAILURE => "XR_ERROR_VALIDATION_FAILURE",
            Self::ERROR_RUNTIME_FAILURE => "XR_ERROR_RUNTIME_FAILURE",
            Self::ERROR_OUT_OF_MEMORY => "XR_ERROR_OUT_OF_MEMORY",
            Self::ERROR_INITIALIZATION_FAILED => "XR_ERROR_INITIALIZATION_FAILED",
            Self::ERROR_FUNCTION_UNSUPPORTED => "XR_ERROR_FUNCTION_UNSUPPORTED",
            Self::ERROR_LIMIT_REACHED => "XR_ERROR_LIMIT_REACHED",
            Self::ERROR_SIZE_INSUFFICIENT => "XR_ERROR_SIZE_INSUFFICIENT",
            Self::ERROR_HANDLE_INVALID => "XR_ERROR_HANDLE_INVALID",
            Self::ERROR_SESSION_RUNNING => "XR_ERROR_SESSION_RUNNING",
            Self::ERROR_SESSION_NOT_RUNNING => "XR_ERROR_SESSION_NOT_RUNNING",
            Self::ERROR_SYSTEM_INVALID => "XR_ERROR_SYSTEM_INVALID",
            Self::ERROR_PATH_INVALID => "XR_ERROR_PATH_INVALID",
            Self::ERROR_PATH_UNSUPPORTED => "XR_ERROR_PATH_UNSUPPORTED",
            Self::ERROR_LAYER_LIMIT_EXCEEDED => "XR_ERROR_LAYER_LIMIT_EXCEEDED",
            Self::ERROR_ACTION_TYPE_MISMATCH => "XR_ERROR_ACTION_TYPE_MISMATCH",
            Self::ERROR_SESSION_NOT_READY => "XR_ERROR_SESSION_NOT_READY",
            Self::ERROR_SESSION_NOT_STOPPING => "XR_ERROR_SESSION_NOT_STOPPING",
            Self::ERROR_FORM_FACTOR_UNAVAILABLE => "XR_ERROR_FORM_FACTOR_UNAVAILABLE",
            Self::ERROR_CALL_ORDER_INVALID => "XR_ERROR_CALL_ORDER_INVALID",
            Self::ERROR_ACTIONSET_NOT_ATTACHED => "XR_ERROR_ACTIONSET_NOT_ATTACHED",
            Self::ERROR_ACTIONSETS_ALREADY_ATTACHED => "XR_ERROR_ACTIONSETS_ALREADY_ATTACHED",
            _ => "XR_UNKNOWN_RESULT",
        }
    }
}

impl fmt::Debug for XrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl fmt::Display for XrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instance extension an overlay application enables.
pub const OVERLAY_EXTENSION_NAME: &str = "XR_EXTX_overlay";

/// Nanoseconds on the runtime's clock.
pub type Time = i64;
/// Nanoseconds.
pub type XrDuration = i64;

macro_rules! xr_enum {
    ($(#[$meta:meta])* pub struct $name:ident { $($variant:ident = $value:expr),* $(,)? }) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub i32);

        impl $name {
            $(pub const $variant: Self = Self($value);)*
        }
    };
}

xr_enum! {
    /// Discriminant of a chain record.
    pub struct StructureType {
        UNKNOWN = 0,
        INSTANCE_CREATE_INFO = 3,
        SYSTEM_GET_INFO = 4,
        VIEW_LOCATE_INFO = 6,
        VIEW = 7,
        SESSION_CREATE_INFO = 8,
        SWAPCHAIN_CREATE_INFO = 9,
        SESSION_BEGIN_INFO = 10,
        VIEW_STATE = 11,
        FRAME_END_INFO = 12,
        EVENT_DATA_BUFFER = 16,
        EVENT_DATA_INSTANCE_LOSS_PENDING = 17,
        EVENT_DATA_SESSION_STATE_CHANGED = 18,
        ACTION_STATE_BOOLEAN = 23,
        ACTION_STATE_FLOAT = 24,
        ACTION_STATE_VECTOR2F = 25,
        ACTION_STATE_POSE = 27,
        ACTION_SET_CREATE_INFO = 28,
        ACTION_CREATE_INFO = 29,
        FRAME_WAIT_INFO = 33,
        COMPOSITION_LAYER_PROJECTION = 35,
        COMPOSITION_LAYER_QUAD = 36,
        REFERENCE_SPACE_CREATE_INFO = 37,
        ACTION_SPACE_CREATE_INFO = 38,
        EVENT_DATA_REFERENCE_SPACE_CHANGE_PENDING = 40,
        SPACE_LOCATION = 42,
        SPACE_VELOCITY = 43,
        FRAME_STATE = 44,
        FRAME_BEGIN_INFO = 46,
        COMPOSITION_LAYER_PROJECTION_VIEW = 48,
        EVENT_DATA_EVENTS_LOST = 49,
        INTERACTION_PROFILE_SUGGESTED_BINDING = 51,
        EVENT_DATA_INTERACTION_PROFILE_CHANGED = 52,
        INTERACTION_PROFILE_STATE = 53,
        SWAPCHAIN_IMAGE_ACQUIRE_INFO = 55,
        SWAPCHAIN_IMAGE_WAIT_INFO = 56,
        SWAPCHAIN_IMAGE_RELEASE_INFO = 57,
        ACTION_STATE_GET_INFO = 58,
        HAPTIC_ACTION_INFO = 59,
        SESSION_ACTION_SETS_ATTACH_INFO = 60,
        ACTIONS_SYNC_INFO = 61,
        HAPTIC_VIBRATION = 62,
        DEBUG_UTILS_OBJECT_NAME_INFO_EXT = 1000019000,
        DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT = 1000019002,
        DEBUG_UTILS_LABEL_EXT = 1000019003,
        SESSION_CREATE_INFO_OVERLAY_EXTX = 1000033000,
    }
}

xr_enum! {
    pub struct FormFactor {
        HEAD_MOUNTED_DISPLAY = 1,
        HANDHELD_DISPLAY = 2,
    }
}

xr_enum! {
    pub struct ViewConfigurationType {
        PRIMARY_MONO = 1,
        PRIMARY_STEREO = 2,
    }
}

xr_enum! {
    pub struct ReferenceSpaceType {
        VIEW = 1,
        LOCAL = 2,
        STAGE = 3,
    }
}

xr_enum! {
    pub struct SessionState {
        UNKNOWN = 0,
        IDLE = 1,
        READY = 2,
        SYNCHRONIZED = 3,
        VISIBLE = 4,
        FOCUSED = 5,
        STOPPING = 6,
        LOSS_PENDING = 7,
        EXITING = 8,
    }
}

xr_enum! {
    pub struct EnvironmentBlendMode {
        OPAQUE = 1,
        ADDITIVE = 2,
        ALPHA_BLEND = 3,
    }
}

xr_enum! {
    pub struct ActionType {
        BOOLEAN_INPUT = 1,
        FLOAT_INPUT = 2,
        VECTOR2F_INPUT = 3,
        POSE_INPUT = 4,
        VIBRATION_OUTPUT = 100,
    }
}

xr_enum! {
    /// Kind of handle named by a debug-utils object name.
    pub struct ObjectType {
        UNKNOWN = 0,
        INSTANCE = 1,
        SESSION = 2,
        SWAPCHAIN = 3,
        SPACE = 4,
        ACTION_SET = 5,
        ACTION = 6,
    }
}

macro_rules! xr_handle {
    ($(#[$meta:meta])* $name:ident, $api_name:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);
            pub const API_NAME: &'static str = $api_name;

            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn into_raw(self) -> u64 {
                self.0
            }

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", $api_name, self.0)
            }
        }
    };
}

xr_handle!(InstanceHandle, "XrInstance");
xr_handle!(SessionHandle, "XrSession");
xr_handle!(SwapchainHandle, "XrSwapchain");
xr_handle!(SpaceHandle, "XrSpace");
xr_handle!(ActionSetHandle, "XrActionSet");
xr_handle!(ActionHandle, "XrAction");
xr_handle!(DebugUtilsMessengerHandle, "XrDebugUtilsMessengerEXT");

macro_rules! xr_atom {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);
        }
    };
}

xr_atom!(
    /// Interned semantic path string.
    Path
);
xr_atom!(SystemId);

/// NUL-padded inline character array.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedStr<N> {
    /// Truncates to at most `N - 1` bytes so the value stays
    /// NUL-terminated, never splitting a character.
    pub fn new(s: &str) -> Self {
        let mut bytes = [0u8; N];
        let mut len = s.len().min(N.saturating_sub(1));
        while !s.is_char_boundary(len) {
            len -= 1;
        }
        bytes[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(N);
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> From<&str> for FixedStr<N> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_classification() {
        assert!(XrResult::SUCCESS.succeeded());
        assert!(XrResult::EVENT_UNAVAILABLE.succeeded());
        assert!(XrResult::ERROR_HANDLE_INVALID.failed());
        assert_eq!(XrResult(-12).to_string(), "XR_ERROR_HANDLE_INVALID");
    }

    #[test]
    fn test_fixed_str_truncates() {
        let s: FixedStr<4> = FixedStr::new("overlay");
        assert_eq!(s.as_str(), "ove");
        assert_eq!(FixedStr::<8>::default().as_str(), "");
    }

    #[test]
    fn test_fixed_str_keeps_whole_characters() {
        // "é" is two bytes; the cut would land between them.
        let s: FixedStr<5> = FixedStr::new("abcé");
        assert_eq!(s.as_str(), "abc");
        let s: FixedStr<6> = FixedStr::new("abcé");
        assert_eq!(s.as_str(), "abcé");
        let s: FixedStr<4> = FixedStr::new("手柄");
        assert_eq!(s.as_str(), "手");
    }
}
