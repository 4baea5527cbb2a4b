//! Name-to-command resolution for the loader.

use crate::types::XrResult;
use xrov_config::log_layer_debug;

macro_rules! supported_commands {
    ($($variant:ident = $name:literal,)*) => {
        /// Every command this layer intercepts.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SupportedCommand {
            $($variant,)*
        }

        impl SupportedCommand {
            pub const ALL: &'static [SupportedCommand] = &[$(SupportedCommand::$variant,)*];

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(SupportedCommand::$variant),)*
                    _ => None,
                }
            }

            /// The API's own name for the command.
            pub fn name(self) -> &'static str {
                match self {
                    $(SupportedCommand::$variant => $name,)*
                }
            }
        }
    };
}

supported_commands! {
    GetInstanceProcAddr = "xrGetInstanceProcAddr",
    CreateInstance = "xrCreateInstance",
    DestroyInstance = "xrDestroyInstance",
    GetSystem = "xrGetSystem",
    StringToPath = "xrStringToPath",
    PathToString = "xrPathToString",
    PollEvent = "xrPollEvent",
    CreateActionSet = "xrCreateActionSet",
    DestroyActionSet = "xrDestroyActionSet",
    CreateAction = "xrCreateAction",
    DestroyAction = "xrDestroyAction",
    SuggestInteractionProfileBindings = "xrSuggestInteractionProfileBindings",
    CreateDebugUtilsMessengerEXT = "xrCreateDebugUtilsMessengerEXT",
    DestroyDebugUtilsMessengerEXT = "xrDestroyDebugUtilsMessengerEXT",
    SetDebugUtilsObjectNameEXT = "xrSetDebugUtilsObjectNameEXT",
    CreateSession = "xrCreateSession",
    DestroySession = "xrDestroySession",
    BeginSession = "xrBeginSession",
    EndSession = "xrEndSession",
    RequestExitSession = "xrRequestExitSession",
    WaitFrame = "xrWaitFrame",
    BeginFrame = "xrBeginFrame",
    EndFrame = "xrEndFrame",
    LocateViews = "xrLocateViews",
    EnumerateSwapchainFormats = "xrEnumerateSwapchainFormats",
    CreateSwapchain = "xrCreateSwapchain",
    EnumerateReferenceSpaces = "xrEnumerateReferenceSpaces",
    CreateReferenceSpace = "xrCreateReferenceSpace",
    GetReferenceSpaceBoundsRect = "xrGetReferenceSpaceBoundsRect",
    CreateActionSpace = "xrCreateActionSpace",
    AttachSessionActionSets = "xrAttachSessionActionSets",
    SyncActions = "xrSyncActions",
    GetActionStateBoolean = "xrGetActionStateBoolean",
    GetActionStateFloat = "xrGetActionStateFloat",
    GetActionStateVector2f = "xrGetActionStateVector2f",
    GetActionStatePose = "xrGetActionStatePose",
    GetCurrentInteractionProfile = "xrGetCurrentInteractionProfile",
    ApplyHapticFeedback = "xrApplyHapticFeedback",
    StopHapticFeedback = "xrStopHapticFeedback",
    SessionInsertDebugUtilsLabelEXT = "xrSessionInsertDebugUtilsLabelEXT",
    DestroySwapchain = "xrDestroySwapchain",
    EnumerateSwapchainImages = "xrEnumerateSwapchainImages",
    AcquireSwapchainImage = "xrAcquireSwapchainImage",
    WaitSwapchainImage = "xrWaitSwapchainImage",
    ReleaseSwapchainImage = "xrReleaseSwapchainImage",
    LocateSpace = "xrLocateSpace",
    DestroySpace = "xrDestroySpace",
}

/// Resolve `name` to the command this layer provides for it.
///
/// Anything not listed in [`SupportedCommand`] is unsupported and leaves
/// `function` cleared.
pub fn xr_get_instance_proc_addr(name: &str, function: &mut Option<SupportedCommand>) -> XrResult {
    *function = SupportedCommand::from_name(name);
    match function {
        Some(_) => XrResult::SUCCESS,
        None => {
            log_layer_debug!("Command not provided by the layer", name = name);
            XrResult::ERROR_FUNCTION_UNSUPPORTED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_resolves_by_its_name() {
        for command in SupportedCommand::ALL {
            let mut function = None;
            assert_eq!(xr_get_instance_proc_addr(command.name(), &mut function), XrResult::SUCCESS);
            assert_eq!(function, Some(*command));
        }
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let mut function = Some(SupportedCommand::PollEvent);
        assert_eq!(
            xr_get_instance_proc_addr("xrGetVulkanDeviceExtensionsKHR", &mut function),
            XrResult::ERROR_FUNCTION_UNSUPPORTED
        );
        assert_eq!(function, None);
    }
}
