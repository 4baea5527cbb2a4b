//! Argument records for every request type.
//!
//! Fields are laid out back to back from the start of the record, each
//! taking its [`Field::WIRE_SIZE`]. Every field is copied into the region
//! in full, so a server that leaves an output alone hands back the value
//! the caller sent. Only `output` fields are written back by the server
//! and copied out again by the caller.

use super::{RequestType, RpcArgs};
use crate::chain::{
    Chain, CopyPolicy, Extent2Df, Field, FrameBeginInfo, FrameEndInfo, FrameState, FrameWaitInfo,
    InstanceCreateInfo, Posef, ReferenceSpaceCreateInfo, SessionBeginInfo, SessionCreateInfo,
    SpaceLocation, SwapchainCreateInfo, SwapchainImageAcquireInfo, SwapchainImageReleaseInfo,
    SwapchainImageWaitInfo, SystemGetInfo, View, ViewLocateInfo, ViewState,
};
use crate::error::Result;
use crate::types::{ReferenceSpaceType, SessionHandle, SpaceHandle, SwapchainHandle, Time};
use xrov_ipc::IpcBuffer;

macro_rules! rpc_args {
    (@write_back input, $value:expr, $buf:ident, $at:expr) => {};
    (@write_back output, $value:expr, $buf:ident, $at:expr) => { $value.write_back($buf, $at)?; };

    (@copy_out input, $value:expr, $buf:ident, $at:expr) => {};
    (@copy_out output, $value:expr, $buf:ident, $at:expr) => { $value.copy_out($buf, $at)?; };

    ($(
        $(#[$meta:meta])*
        pub struct $name:ident => $request:ident {
            $($dir:ident $field:ident: $ty:ty,)*
        }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq)]
            pub struct $name {
                $(pub $field: $ty,)*
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            impl RpcArgs for $name {
                const REQUEST: RequestType = RequestType::$request;
                const WIRE_SIZE: usize = 0 $(+ <$ty as Field>::WIRE_SIZE)*;

                fn serialize(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
                    let mut at = at;
                    $(
                        self.$field.encode(buf, at, CopyPolicy::Everything)?;
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }

                fn deserialize(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    let mut at = at;
                    Ok(Self {
                        $($field: {
                            let value = <$ty as Field>::decode(buf, at)?;
                            at += <$ty as Field>::WIRE_SIZE;
                            value
                        },)*
                    })
                }

                fn write_back(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
                    let mut at = at;
                    $(
                        rpc_args!(@write_back $dir, self.$field, buf, at);
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }

                fn copy_out(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
                    let mut at = at;
                    $(
                        rpc_args!(@copy_out $dir, self.$field, buf, at);
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }
            }
        )*
    };
}

rpc_args! {
    /// The overlay's instance and system travel along so the main process
    /// can check them against its own.
    pub struct CreateSessionArgs => CreateSession {
        input instance_create_info: InstanceCreateInfo,
        input system_get_info: SystemGetInfo,
        input create_info: SessionCreateInfo,
        output session: SessionHandle,
    }

    pub struct DestroySessionArgs => DestroySession {
        input session: SessionHandle,
    }

    pub struct EnumerateSwapchainFormatsArgs => EnumerateSwapchainFormats {
        input session: SessionHandle,
        output formats: Vec<i64>,
        output count_output: u32,
    }

    /// `image_count` saves the overlay a round trip for
    /// `EnumerateSwapchainImages`.
    pub struct CreateSwapchainArgs => CreateSwapchain {
        input session: SessionHandle,
        input create_info: SwapchainCreateInfo,
        output swapchain: SwapchainHandle,
        output image_count: u32,
    }

    pub struct DestroySwapchainArgs => DestroySwapchain {
        input swapchain: SwapchainHandle,
    }

    pub struct AcquireSwapchainImageArgs => AcquireSwapchainImage {
        input swapchain: SwapchainHandle,
        input acquire_info: SwapchainImageAcquireInfo,
        output index: u32,
    }

    pub struct WaitSwapchainImageArgs => WaitSwapchainImage {
        input swapchain: SwapchainHandle,
        input wait_info: SwapchainImageWaitInfo,
    }

    pub struct ReleaseSwapchainImageArgs => ReleaseSwapchainImage {
        input swapchain: SwapchainHandle,
        input release_info: SwapchainImageReleaseInfo,
    }

    pub struct EnumerateReferenceSpacesArgs => EnumerateReferenceSpaces {
        input session: SessionHandle,
        output spaces: Vec<ReferenceSpaceType>,
        output count_output: u32,
    }

    pub struct CreateReferenceSpaceArgs => CreateReferenceSpace {
        input session: SessionHandle,
        input create_info: ReferenceSpaceCreateInfo,
        output space: SpaceHandle,
    }

    pub struct GetReferenceSpaceBoundsRectArgs => GetReferenceSpaceBoundsRect {
        input session: SessionHandle,
        input reference_space_type: ReferenceSpaceType,
        output bounds: Extent2Df,
    }

    pub struct LocateSpaceArgs => LocateSpace {
        input space: SpaceHandle,
        input base_space: SpaceHandle,
        input time: Time,
        output location: SpaceLocation,
    }

    pub struct DestroySpaceArgs => DestroySpace {
        input space: SpaceHandle,
    }

    pub struct BeginSessionArgs => BeginSession {
        input session: SessionHandle,
        input begin_info: SessionBeginInfo,
    }

    pub struct EndSessionArgs => EndSession {
        input session: SessionHandle,
    }

    pub struct RequestExitSessionArgs => RequestExitSession {
        input session: SessionHandle,
    }

    pub struct WaitFrameArgs => WaitFrame {
        input session: SessionHandle,
        input wait_info: FrameWaitInfo,
        output frame_state: FrameState,
    }

    pub struct BeginFrameArgs => BeginFrame {
        input session: SessionHandle,
        input begin_info: FrameBeginInfo,
    }

    pub struct EndFrameArgs => EndFrame {
        input session: SessionHandle,
        input end_info: FrameEndInfo,
    }

    pub struct LocateViewsArgs => LocateViews {
        input session: SessionHandle,
        input locate_info: ViewLocateInfo,
        output view_state: ViewState,
        output views: Vec<View>,
        output count_output: u32,
    }

    pub struct PollEventArgs => PollEvent {
        input session: SessionHandle,
        output event: Chain,
    }

    /// Paths are process-local atoms, so bindings travel as strings.
    /// `states` holds one action state per (`profiles`, `bindings`) pair
    /// and `current_profiles` one profile name per `top_level_paths` entry,
    /// empty when none is active.
    pub struct SyncActionsAndGetStateArgs => SyncActionsAndGetState {
        input session: SessionHandle,
        input profiles: Vec<String>,
        input bindings: Vec<String>,
        output states: Vec<Chain>,
        input top_level_paths: Vec<String>,
        output current_profiles: Vec<String>,
    }

    pub struct ApplyHapticFeedbackArgs => ApplyHapticFeedback {
        input session: SessionHandle,
        input profiles: Vec<String>,
        input bindings: Vec<String>,
        input feedback: Chain,
    }

    pub struct StopHapticFeedbackArgs => StopHapticFeedback {
        input session: SessionHandle,
        input profiles: Vec<String>,
        input bindings: Vec<String>,
    }

    pub struct CreateActionSpaceFromBindingArgs => CreateActionSpaceFromBinding {
        input session: SessionHandle,
        input profile: String,
        input binding: String,
        input pose_in_action_space: Posef,
        output space: SpaceHandle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{
        ActionStateBoolean, ActionStateVector2f, CompositionLayerQuad,
        EventDataSessionStateChanged, HapticVibration, SpaceVelocity, Vector2f, Vector3f,
    };
    use crate::types::SessionState;
    use xrov_ipc::ARGS_OFFSET;

    const REGION: usize = 64 * 1024;

    /// Requester and server see the same bytes at different addresses.
    struct Transfer {
        requester: Vec<u8>,
        server: Vec<u8>,
    }

    impl Transfer {
        fn new() -> Self {
            Self {
                requester: vec![0; REGION],
                server: vec![0; REGION],
            }
        }

        fn send<A: RpcArgs>(&mut self, args: &A) {
            let mut buf = IpcBuffer::new(&mut self.requester);
            buf.begin_request(A::REQUEST as u64).unwrap();
            let at = buf.allocate(A::WIRE_SIZE).unwrap();
            assert_eq!(at, ARGS_OFFSET);
            args.serialize(&mut buf, at).unwrap();
            buf.seal_request().unwrap();
            buf.make_pointers_relative().unwrap();
            self.server.copy_from_slice(&self.requester);
        }

        fn serve<A: RpcArgs>(&mut self, handler: impl FnOnce(&mut A)) -> A {
            let mut buf = IpcBuffer::new(&mut self.server);
            buf.make_pointers_absolute().unwrap();
            buf.resume_request().unwrap();
            assert_eq!(buf.request_type().unwrap(), A::REQUEST as u64);
            let mut args = A::deserialize(&buf, ARGS_OFFSET).unwrap();
            handler(&mut args);
            args.write_back(&mut buf, ARGS_OFFSET).unwrap();
            buf.make_pointers_relative().unwrap();
            self.requester.copy_from_slice(&self.server);
            args
        }

        fn receive<A: RpcArgs>(&mut self, args: &mut A) {
            let mut buf = IpcBuffer::new(&mut self.requester);
            buf.make_pointers_absolute().unwrap();
            args.copy_out(&buf, ARGS_OFFSET).unwrap();
        }
    }

    fn echo<A: RpcArgs + Clone>(args: &A) -> A {
        let mut transfer = Transfer::new();
        transfer.send(args);
        transfer.serve::<A>(|_| {});
        let mut out = args.clone();
        transfer.receive(&mut out);
        out
    }

    #[test]
    fn test_echo_reproduces_outputs() {
        let session = CreateSessionArgs {
            session: SessionHandle(0x51),
            ..Default::default()
        };
        assert_eq!(echo(&session), session);

        let formats = EnumerateSwapchainFormatsArgs {
            session: SessionHandle(0x11),
            formats: vec![0x8C43, 0x8058, 0x881A, 7],
            count_output: 4,
        };
        assert_eq!(echo(&formats), formats);

        let swapchain = CreateSwapchainArgs {
            session: SessionHandle(0x11),
            swapchain: SwapchainHandle(0x77),
            image_count: 3,
            ..Default::default()
        };
        assert_eq!(echo(&swapchain), swapchain);

        let acquire = AcquireSwapchainImageArgs {
            swapchain: SwapchainHandle(0x77),
            index: 2,
            ..Default::default()
        };
        assert_eq!(echo(&acquire), acquire);

        let reference_spaces = EnumerateReferenceSpacesArgs {
            session: SessionHandle(0x11),
            spaces: vec![ReferenceSpaceType::VIEW, ReferenceSpaceType::STAGE],
            count_output: 2,
        };
        assert_eq!(echo(&reference_spaces), reference_spaces);

        let space = CreateReferenceSpaceArgs {
            session: SessionHandle(0x11),
            space: SpaceHandle(0x99),
            ..Default::default()
        };
        assert_eq!(echo(&space), space);

        let bounds = GetReferenceSpaceBoundsRectArgs {
            session: SessionHandle(0x11),
            reference_space_type: ReferenceSpaceType::STAGE,
            bounds: Extent2Df { width: 2.5, height: 3.0 },
        };
        assert_eq!(echo(&bounds), bounds);

        let locate = LocateSpaceArgs {
            space: SpaceHandle(1),
            base_space: SpaceHandle(2),
            time: 77,
            location: SpaceLocation {
                next: Some(Box::new(
                    SpaceVelocity {
                        velocity_flags: 0x3,
                        linear_velocity: Vector3f { x: 0.5, y: 0.0, z: -1.0 },
                        ..Default::default()
                    }
                    .into(),
                )),
                location_flags: 0xF,
                pose: Posef {
                    position: Vector3f { x: 1.0, y: 2.0, z: 3.0 },
                    ..Default::default()
                },
            },
        };
        assert_eq!(echo(&locate), locate);

        let wait = WaitFrameArgs {
            session: SessionHandle(3),
            frame_state: FrameState {
                predicted_display_time: 1_000_000,
                predicted_display_period: 11_111_111,
                should_render: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(echo(&wait), wait);

        let eye = View {
            pose: Posef {
                position: Vector3f { x: -0.032, y: 0.0, z: 0.0 },
                ..Default::default()
            },
            ..Default::default()
        };
        let views = LocateViewsArgs {
            session: SessionHandle(3),
            view_state: ViewState {
                view_state_flags: 0xF,
                ..Default::default()
            },
            views: vec![eye.clone(), eye],
            count_output: 2,
            ..Default::default()
        };
        assert_eq!(echo(&views), views);

        let poll = PollEventArgs {
            session: SessionHandle(3),
            event: Some(Box::new(
                EventDataSessionStateChanged {
                    session: SessionHandle(3),
                    state: SessionState::FOCUSED,
                    time: 42,
                    ..Default::default()
                }
                .into(),
            )),
        };
        assert_eq!(echo(&poll), poll);

        let sync = SyncActionsAndGetStateArgs {
            session: SessionHandle(3),
            profiles: vec!["/interaction_profiles/khr/simple_controller".to_string()],
            bindings: vec!["/user/hand/left/input/select/click".to_string()],
            states: vec![Some(Box::new(
                ActionStateBoolean {
                    current_state: true,
                    is_active: true,
                    last_change_time: 7,
                    ..Default::default()
                }
                .into(),
            ))],
            top_level_paths: vec!["/user/hand/left".to_string(), "/user/head".to_string()],
            current_profiles: vec!["/interaction_profiles/khr/simple_controller".to_string(), String::new()],
        };
        assert_eq!(echo(&sync), sync);

        let action_space = CreateActionSpaceFromBindingArgs {
            session: SessionHandle(3),
            profile: "/interaction_profiles/khr/simple_controller".to_string(),
            binding: "/user/hand/right/input/grip/pose".to_string(),
            space: SpaceHandle(0x66),
            ..Default::default()
        };
        assert_eq!(echo(&action_space), action_space);
    }

    #[test]
    fn test_inputs_arrive_intact() {
        let end_frame = EndFrameArgs {
            session: SessionHandle(0x42),
            end_info: FrameEndInfo {
                display_time: 1234,
                layers: vec![Some(Box::new(
                    CompositionLayerQuad {
                        space: SpaceHandle(9),
                        pose: Posef {
                            position: Vector3f { x: 1.0, y: 2.0, z: 3.0 },
                            ..Default::default()
                        },
                        ..Default::default()
                    }
                    .into(),
                ))],
                ..Default::default()
            },
        };

        let mut transfer = Transfer::new();
        transfer.send(&end_frame);
        let seen = transfer.serve::<EndFrameArgs>(|_| {});
        assert_eq!(seen, end_frame);
    }

    #[test]
    fn test_outputs_reach_the_caller() {
        let mut args = LocateSpaceArgs {
            space: SpaceHandle(1),
            base_space: SpaceHandle(2),
            time: 500,
            location: SpaceLocation {
                next: Some(Box::new(SpaceVelocity::default().into())),
                ..Default::default()
            },
        };

        let mut transfer = Transfer::new();
        transfer.send(&args);
        transfer.serve::<LocateSpaceArgs>(|served| {
            assert_eq!(served.time, 500);
            served.location.location_flags = 0xF;
            served.location.pose.position.z = 5.0;
            if let Some(velocity) = crate::chain::find_in_chain_mut::<SpaceVelocity>(&mut served.location.next) {
                velocity.velocity_flags = 0x3;
            }
            // Inputs changed on the server are not sent back.
            served.time = 0;
        });
        transfer.receive(&mut args);

        assert_eq!(args.time, 500);
        assert_eq!(args.location.location_flags, 0xF);
        assert_eq!(args.location.pose.position.z, 5.0);
        let velocity = crate::chain::find_in_chain::<SpaceVelocity>(&args.location.next).unwrap();
        assert_eq!(velocity.velocity_flags, 0x3);
    }

    #[test]
    fn test_enumeration_is_bounded_by_capacity() {
        let mut args = EnumerateSwapchainFormatsArgs {
            session: SessionHandle(1),
            formats: vec![0; 2],
            count_output: 0,
        };

        let mut transfer = Transfer::new();
        transfer.send(&args);
        transfer.serve::<EnumerateSwapchainFormatsArgs>(|served| {
            assert_eq!(served.formats.len(), 2);
            served.formats = vec![10, 20, 30];
            served.count_output = 3;
        });
        transfer.receive(&mut args);

        assert_eq!(args.formats, vec![10, 20]);
        assert_eq!(args.count_output, 3);
    }

    #[test]
    fn test_action_states_and_profiles_come_back() {
        let mut args = SyncActionsAndGetStateArgs {
            session: SessionHandle(1),
            profiles: vec!["/interaction_profiles/oculus/touch_controller".to_string(); 2],
            bindings: vec![
                "/user/hand/left/input/x/click".to_string(),
                "/user/hand/left/input/thumbstick".to_string(),
            ],
            states: vec![
                Some(Box::new(ActionStateBoolean::default().into())),
                Some(Box::new(ActionStateVector2f::default().into())),
            ],
            top_level_paths: vec!["/user/hand/left".to_string()],
            current_profiles: vec![String::new()],
        };

        let mut transfer = Transfer::new();
        transfer.send(&args);
        transfer.serve::<SyncActionsAndGetStateArgs>(|served| {
            assert_eq!(served.bindings.len(), 2);
            served.states[0] = Some(Box::new(
                ActionStateBoolean {
                    current_state: true,
                    is_active: true,
                    ..Default::default()
                }
                .into(),
            ));
            served.states[1] = Some(Box::new(
                ActionStateVector2f {
                    current_state: Vector2f { x: 0.25, y: -1.0 },
                    is_active: true,
                    ..Default::default()
                }
                .into(),
            ));
            served.current_profiles[0] = "/interaction_profiles/oculus/touch_controller".to_string();
        });
        transfer.receive(&mut args);

        let crate::chain::Record::ActionStateBoolean(click) = args.states[0].as_deref().unwrap() else {
            panic!("state changed kind");
        };
        assert!(click.current_state && click.is_active);
        let crate::chain::Record::ActionStateVector2f(stick) = args.states[1].as_deref().unwrap() else {
            panic!("state changed kind");
        };
        assert_eq!(stick.current_state, Vector2f { x: 0.25, y: -1.0 });
        assert_eq!(args.current_profiles, vec!["/interaction_profiles/oculus/touch_controller".to_string()]);
    }

    #[test]
    fn test_haptic_feedback_arrives_intact() {
        let apply = ApplyHapticFeedbackArgs {
            session: SessionHandle(2),
            profiles: vec!["/interaction_profiles/khr/simple_controller".to_string()],
            bindings: vec!["/user/hand/right/output/haptic".to_string()],
            feedback: Some(Box::new(
                HapticVibration {
                    duration: 50_000_000,
                    frequency: 160.0,
                    amplitude: 0.5,
                    ..Default::default()
                }
                .into(),
            )),
        };
        let mut transfer = Transfer::new();
        transfer.send(&apply);
        let seen = transfer.serve::<ApplyHapticFeedbackArgs>(|_| {});
        assert_eq!(seen, apply);
    }

    #[test]
    fn test_event_is_returned_into_empty_slot() {
        let mut args = PollEventArgs {
            session: SessionHandle(5),
            event: None,
        };

        let mut transfer = Transfer::new();
        transfer.send(&args);
        transfer.serve::<PollEventArgs>(|served| {
            served.event = Some(Box::new(
                EventDataSessionStateChanged {
                    session: SessionHandle(5),
                    state: SessionState::READY,
                    time: 99,
                    ..Default::default()
                }
                .into(),
            ));
        });
        transfer.receive(&mut args);

        let event = crate::chain::find_in_chain::<EventDataSessionStateChanged>(&args.event).unwrap();
        assert_eq!(event.state, SessionState::READY);
        assert_eq!(event.time, 99);
    }
}
