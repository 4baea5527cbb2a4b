//! Record and plain-struct definitions.
//!
//! [`xr_pod!`] declares flat structs that only ever appear inline.
//! [`xr_records!`] declares chainable records, their inline [`Field`]
//! impls, and the [`Record`] union over all of them.

use super::field::{Field, HandleVisitor};
use super::{copy_chain, Chain, ChainRecord, CopyPolicy, RECORD_HEADER_SIZE, NEXT_OFFSET};
use crate::error::{LayerError, Result};
use crate::types::{
    ActionHandle, ActionSetHandle, ActionType, EnvironmentBlendMode, FixedStr, FormFactor,
    ObjectType, Path, ReferenceSpaceType, SessionHandle, SessionState, SpaceHandle,
    StructureType, SwapchainHandle, SystemId, Time, ViewConfigurationType, XrDuration,
};
use xrov_ipc::IpcBuffer;

macro_rules! xr_pod {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident { $($field:ident: $ty:ty),* $(,)? }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq)]
            pub struct $name {
                $(pub $field: $ty,)*
            }

            impl Field for $name {
                const WIRE_SIZE: usize = 0 $(+ <$ty as Field>::WIRE_SIZE)*;

                #[allow(unused_assignments, unused_mut)]
                fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                    let mut at = at;
                    $(
                        self.$field.encode(buf, at, policy)?;
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }

                #[allow(unused_assignments, unused_mut)]
                fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    let mut at = at;
                    Ok(Self {
                        $($field: {
                            let value = <$ty as Field>::decode(buf, at)?;
                            at += <$ty as Field>::WIRE_SIZE;
                            value
                        },)*
                    })
                }

                fn visit_handles(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
                    $(self.$field.visit_handles(visitor)?;)*
                    Ok(())
                }
            }
        )*
    };
}

macro_rules! xr_records {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident = $ty_const:ident { $($field:ident: $ty:ty),* $(,)? }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq)]
            pub struct $name {
                pub next: Chain,
                $(pub $field: $ty,)*
            }

            impl ChainRecord for $name {
                const TYPE: StructureType = StructureType::$ty_const;

                fn from_record(record: &Record) -> Option<&Self> {
                    match record {
                        Record::$name(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_record_mut(record: &mut Record) -> Option<&mut Self> {
                    match record {
                        Record::$name(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn into_record(self) -> Record {
                    Record::$name(self)
                }
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            impl $name {
                const FIELDS_SIZE: usize = 0 $(+ <$ty as Field>::WIRE_SIZE)*;

                fn encode_fields(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                    let mut at = at + RECORD_HEADER_SIZE;
                    $(
                        self.$field.encode(buf, at, policy)?;
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }

                fn decode_fields(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    let mut at = at + RECORD_HEADER_SIZE;
                    Ok(Self {
                        next: None,
                        $($field: {
                            let value = <$ty as Field>::decode(buf, at)?;
                            at += <$ty as Field>::WIRE_SIZE;
                            value
                        },)*
                    })
                }

                fn copy_fields(&self) -> Result<Self> {
                    Ok(Self {
                        next: None,
                        $($field: self.$field.deep_copy()?,)*
                    })
                }

                fn visit_fields(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
                    $(self.$field.visit_handles(visitor)?;)*
                    Ok(())
                }

                fn write_back_fields(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
                    let mut at = at + RECORD_HEADER_SIZE;
                    $(
                        self.$field.write_back(buf, at)?;
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }

                fn copy_out_fields(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
                    let mut at = at + RECORD_HEADER_SIZE;
                    $(
                        self.$field.copy_out(buf, at)?;
                        at += <$ty as Field>::WIRE_SIZE;
                    )*
                    Ok(())
                }

                fn expect_type(buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
                    let found = StructureType(buf.read_i32(at)?);
                    if found == Self::TYPE {
                        Ok(())
                    } else {
                        Err(LayerError::StructureMismatch { expected: Self::TYPE, found })
                    }
                }
            }

            /// Inline form, used for arrays of records.
            impl Field for $name {
                const WIRE_SIZE: usize = RECORD_HEADER_SIZE + Self::FIELDS_SIZE;

                fn encode(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                    buf.write_i32(at, Self::TYPE.0)?;
                    self.encode_fields(buf, at, policy)?;
                    self.next.encode(buf, at + NEXT_OFFSET, policy)
                }

                fn decode(buf: &IpcBuffer<'_>, at: usize) -> Result<Self> {
                    Self::expect_type(buf, at)?;
                    let mut record = Self::decode_fields(buf, at)?;
                    record.next = Chain::decode(buf, at + NEXT_OFFSET)?;
                    Ok(record)
                }

                fn deep_copy(&self) -> Result<Self> {
                    let mut record = self.copy_fields()?;
                    record.next = copy_chain(&self.next, CopyPolicy::Everything)?;
                    Ok(record)
                }

                fn visit_handles(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
                    self.visit_fields(visitor)?;
                    self.next.visit_handles(visitor)
                }

                fn write_back(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
                    Self::expect_type(buf, at)?;
                    self.write_back_fields(buf, at)?;
                    self.next.write_back(buf, at + NEXT_OFFSET)
                }

                fn copy_out(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
                    Self::expect_type(buf, at)?;
                    self.copy_out_fields(buf, at)?;
                    self.next.copy_out(buf, at + NEXT_OFFSET)
                }
            }

            impl From<$name> for Record {
                fn from(record: $name) -> Self {
                    Record::$name(record)
                }
            }
        )*

        /// One node of a chain.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Record {
            $($name($name),)*
            Unknown(UnknownRecord),
        }

        impl Record {
            pub fn structure_type(&self) -> StructureType {
                match self {
                    $(Record::$name(_) => StructureType::$ty_const,)*
                    Record::Unknown(unknown) => unknown.ty,
                }
            }

            pub fn next(&self) -> &Chain {
                match self {
                    $(Record::$name(inner) => &inner.next,)*
                    Record::Unknown(unknown) => &unknown.next,
                }
            }

            pub fn next_mut(&mut self) -> &mut Chain {
                match self {
                    $(Record::$name(inner) => &mut inner.next,)*
                    Record::Unknown(unknown) => &mut unknown.next,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Record::Unknown(_))
            }

            pub(crate) fn wire_size(&self) -> usize {
                match self {
                    $(Record::$name(_) => <$name as Field>::WIRE_SIZE,)*
                    Record::Unknown(_) => RECORD_HEADER_SIZE,
                }
            }

            pub(crate) fn encode_fields(&self, buf: &mut IpcBuffer<'_>, at: usize, policy: CopyPolicy) -> Result<()> {
                match self {
                    $(Record::$name(inner) => inner.encode_fields(buf, at, policy),)*
                    Record::Unknown(_) => Ok(()),
                }
            }

            /// `None` when `ty` is not a kind this layer knows.
            pub(crate) fn decode_fields(ty: StructureType, buf: &IpcBuffer<'_>, at: usize) -> Result<Option<Record>> {
                $(
                    if ty == StructureType::$ty_const {
                        return Ok(Some(Record::$name($name::decode_fields(buf, at)?)));
                    }
                )*
                Ok(None)
            }

            /// Copy this record without its successors. `None` for unknown kinds.
            pub(crate) fn copy_detached(&self, policy: CopyPolicy) -> Result<Option<Record>> {
                let copy = match (self, policy) {
                    $(
                        (Record::$name(inner), CopyPolicy::Everything) => Record::$name(inner.copy_fields()?),
                        (Record::$name(_), CopyPolicy::TypeAndNext) => Record::$name($name::default()),
                    )*
                    (Record::Unknown(_), _) => return Ok(None),
                };
                Ok(Some(copy))
            }

            pub(crate) fn visit_fields(&mut self, visitor: &mut dyn HandleVisitor) -> Result<()> {
                match self {
                    $(Record::$name(inner) => inner.visit_fields(visitor),)*
                    Record::Unknown(unknown) => {
                        xrov_config::log_chain_info!(
                            "Skipping unknown structure while substituting handles",
                            structure_type = unknown.ty.0
                        );
                        Ok(())
                    }
                }
            }

            pub(crate) fn write_back_fields(&self, buf: &mut IpcBuffer<'_>, at: usize) -> Result<()> {
                match self {
                    $(Record::$name(inner) => inner.write_back_fields(buf, at),)*
                    Record::Unknown(_) => Ok(()),
                }
            }

            pub(crate) fn copy_out_fields(&mut self, buf: &IpcBuffer<'_>, at: usize) -> Result<()> {
                match self {
                    $(Record::$name(inner) => inner.copy_out_fields(buf, at),)*
                    Record::Unknown(_) => Ok(()),
                }
            }
        }
    };
}

/// A record whose structure type this layer does not recognize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownRecord {
    pub ty: StructureType,
    pub next: Chain,
}

impl From<UnknownRecord> for Record {
    fn from(record: UnknownRecord) -> Self {
        Record::Unknown(record)
    }
}

xr_pod! {
    pub struct Vector2f { x: f32, y: f32 }
    pub struct Vector3f { x: f32, y: f32, z: f32 }
    pub struct Quaternionf { x: f32, y: f32, z: f32, w: f32 }
    pub struct Posef { orientation: Quaternionf, position: Vector3f }
    pub struct Fovf { angle_left: f32, angle_right: f32, angle_up: f32, angle_down: f32 }
    pub struct Extent2Df { width: f32, height: f32 }
    pub struct Offset2Di { x: i32, y: i32 }
    pub struct Extent2Di { width: i32, height: i32 }
    pub struct Rect2Di { offset: Offset2Di, extent: Extent2Di }
    pub struct SwapchainSubImage { swapchain: SwapchainHandle, image_rect: Rect2Di, image_array_index: u32 }
    pub struct ApplicationInfo {
        application_name: FixedStr<128>,
        application_version: u32,
        engine_name: FixedStr<128>,
        engine_version: u32,
        api_version: u64,
    }
    pub struct ActionSuggestedBinding { action: ActionHandle, binding: Path }
    pub struct ActiveActionSet { action_set: ActionSetHandle, subaction_path: Path }
}

impl Quaternionf {
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };
}

xr_records! {
    pub struct InstanceCreateInfo = INSTANCE_CREATE_INFO {
        create_flags: u64,
        application_info: ApplicationInfo,
        enabled_api_layer_names: Vec<String>,
        enabled_extension_names: Vec<String>,
    }

    pub struct SystemGetInfo = SYSTEM_GET_INFO { form_factor: FormFactor }

    pub struct SessionCreateInfo = SESSION_CREATE_INFO {
        create_flags: u64,
        system_id: SystemId,
    }

    /// Marks a session as an overlay on another process's session.
    pub struct SessionCreateInfoOverlayEXTX = SESSION_CREATE_INFO_OVERLAY_EXTX {
        create_flags: u64,
        session_layers_placement: u32,
    }

    pub struct SessionBeginInfo = SESSION_BEGIN_INFO {
        primary_view_configuration_type: ViewConfigurationType,
    }

    pub struct SwapchainCreateInfo = SWAPCHAIN_CREATE_INFO {
        create_flags: u64,
        usage_flags: u64,
        format: i64,
        sample_count: u32,
        width: u32,
        height: u32,
        face_count: u32,
        array_size: u32,
        mip_count: u32,
    }

    pub struct SwapchainImageAcquireInfo = SWAPCHAIN_IMAGE_ACQUIRE_INFO {}
    pub struct SwapchainImageWaitInfo = SWAPCHAIN_IMAGE_WAIT_INFO { timeout: XrDuration }
    pub struct SwapchainImageReleaseInfo = SWAPCHAIN_IMAGE_RELEASE_INFO {}

    pub struct ReferenceSpaceCreateInfo = REFERENCE_SPACE_CREATE_INFO {
        reference_space_type: ReferenceSpaceType,
        pose_in_reference_space: Posef,
    }

    pub struct ActionSpaceCreateInfo = ACTION_SPACE_CREATE_INFO {
        action: ActionHandle,
        subaction_path: Path,
        pose_in_action_space: Posef,
    }

    pub struct SpaceLocation = SPACE_LOCATION {
        location_flags: u64,
        pose: Posef,
    }

    pub struct SpaceVelocity = SPACE_VELOCITY {
        velocity_flags: u64,
        linear_velocity: Vector3f,
        angular_velocity: Vector3f,
    }

    pub struct FrameWaitInfo = FRAME_WAIT_INFO {}

    pub struct FrameState = FRAME_STATE {
        predicted_display_time: Time,
        predicted_display_period: XrDuration,
        should_render: bool,
    }

    pub struct FrameBeginInfo = FRAME_BEGIN_INFO {}

    pub struct FrameEndInfo = FRAME_END_INFO {
        display_time: Time,
        environment_blend_mode: EnvironmentBlendMode,
        layers: Vec<Chain>,
    }

    pub struct CompositionLayerProjectionView = COMPOSITION_LAYER_PROJECTION_VIEW {
        pose: Posef,
        fov: Fovf,
        sub_image: SwapchainSubImage,
    }

    pub struct CompositionLayerProjection = COMPOSITION_LAYER_PROJECTION {
        layer_flags: u64,
        space: SpaceHandle,
        views: Vec<CompositionLayerProjectionView>,
    }

    pub struct CompositionLayerQuad = COMPOSITION_LAYER_QUAD {
        layer_flags: u64,
        space: SpaceHandle,
        eye_visibility: u32,
        sub_image: SwapchainSubImage,
        pose: Posef,
        size: Extent2Df,
    }

    pub struct ViewLocateInfo = VIEW_LOCATE_INFO {
        view_configuration_type: ViewConfigurationType,
        display_time: Time,
        space: SpaceHandle,
    }

    pub struct ViewState = VIEW_STATE { view_state_flags: u64 }

    pub struct View = VIEW {
        pose: Posef,
        fov: Fovf,
    }

    pub struct EventDataInstanceLossPending = EVENT_DATA_INSTANCE_LOSS_PENDING { loss_time: Time }

    pub struct EventDataSessionStateChanged = EVENT_DATA_SESSION_STATE_CHANGED {
        session: SessionHandle,
        state: SessionState,
        time: Time,
    }

    pub struct EventDataReferenceSpaceChangePending = EVENT_DATA_REFERENCE_SPACE_CHANGE_PENDING {
        session: SessionHandle,
        reference_space_type: ReferenceSpaceType,
        change_time: Time,
        pose_valid: bool,
        pose_in_previous_space: Posef,
    }

    pub struct EventDataInteractionProfileChanged = EVENT_DATA_INTERACTION_PROFILE_CHANGED {
        session: SessionHandle,
    }

    pub struct EventDataEventsLost = EVENT_DATA_EVENTS_LOST { lost_event_count: u32 }

    pub struct ActionSetCreateInfo = ACTION_SET_CREATE_INFO {
        action_set_name: FixedStr<64>,
        localized_action_set_name: FixedStr<128>,
        priority: u32,
    }

    pub struct ActionCreateInfo = ACTION_CREATE_INFO {
        action_name: FixedStr<64>,
        action_type: ActionType,
        subaction_paths: Vec<Path>,
        localized_action_name: FixedStr<128>,
    }

    pub struct InteractionProfileSuggestedBinding = INTERACTION_PROFILE_SUGGESTED_BINDING {
        interaction_profile: Path,
        suggested_bindings: Vec<ActionSuggestedBinding>,
    }

    pub struct SessionActionSetsAttachInfo = SESSION_ACTION_SETS_ATTACH_INFO {
        action_sets: Vec<ActionSetHandle>,
    }

    pub struct ActionsSyncInfo = ACTIONS_SYNC_INFO {
        active_action_sets: Vec<ActiveActionSet>,
    }

    pub struct ActionStateGetInfo = ACTION_STATE_GET_INFO {
        action: ActionHandle,
        subaction_path: Path,
    }

    pub struct ActionStateBoolean = ACTION_STATE_BOOLEAN {
        current_state: bool,
        changed_since_last_sync: bool,
        last_change_time: Time,
        is_active: bool,
    }

    pub struct ActionStateFloat = ACTION_STATE_FLOAT {
        current_state: f32,
        changed_since_last_sync: bool,
        last_change_time: Time,
        is_active: bool,
    }

    pub struct ActionStateVector2f = ACTION_STATE_VECTOR2F {
        current_state: Vector2f,
        changed_since_last_sync: bool,
        last_change_time: Time,
        is_active: bool,
    }

    pub struct ActionStatePose = ACTION_STATE_POSE { is_active: bool }

    pub struct InteractionProfileState = INTERACTION_PROFILE_STATE { interaction_profile: Path }

    pub struct HapticActionInfo = HAPTIC_ACTION_INFO {
        action: ActionHandle,
        subaction_path: Path,
    }

    pub struct HapticVibration = HAPTIC_VIBRATION {
        duration: XrDuration,
        frequency: f32,
        amplitude: f32,
    }

    pub struct DebugUtilsObjectNameInfoEXT = DEBUG_UTILS_OBJECT_NAME_INFO_EXT {
        object_type: ObjectType,
        object_handle: u64,
        object_name: String,
    }

    pub struct DebugUtilsMessengerCreateInfoEXT = DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT {
        message_severities: u64,
        message_types: u64,
    }

    pub struct DebugUtilsLabelEXT = DEBUG_UTILS_LABEL_EXT { label_name: String }
}
