//! Handle substitution over already-copied structures.
//!
//! Before a structure reaches the runtime (or the main process) every
//! virtualized handle in it is swapped for its actual value; results coming
//! back get the reverse treatment. Both walks are strict: a handle with no
//! mapping aborts the walk with `HandleInvalid`.

use crate::chain::{Field, HandleSlot, HandleVisitor};
use crate::error::Result;
use crate::state::HandleTables;
use crate::sync::lock;

struct RestoreActual<'a> {
    tables: &'a HandleTables,
}

impl HandleVisitor for RestoreActual<'_> {
    fn visit(&mut self, slot: HandleSlot<'_>) -> Result<()> {
        match slot {
            HandleSlot::Session(handle) => *handle = self.tables.sessions.get(*handle)?.actual,
            HandleSlot::Swapchain(handle) => *handle = self.tables.swapchains.get(*handle)?.actual,
            HandleSlot::Space(handle) => {
                // An overlay's action space stands for whichever main space it is bound to.
                let entry = self.tables.spaces.get(*handle)?;
                let bound = lock(&entry.extra.bound).as_ref().map(|bound| bound.main_space);
                *handle = bound.unwrap_or(entry.actual);
            }
        }
        Ok(())
    }
}

struct SubstituteLocal<'a> {
    tables: &'a HandleTables,
}

impl HandleVisitor for SubstituteLocal<'_> {
    fn visit(&mut self, slot: HandleSlot<'_>) -> Result<()> {
        match slot {
            HandleSlot::Session(handle) => *handle = self.tables.sessions.local_for_actual(*handle)?,
            HandleSlot::Swapchain(handle) => {
                *handle = self.tables.swapchains.local_for_actual(*handle)?
            }
            HandleSlot::Space(handle) => *handle = self.tables.spaces.local_for_actual(*handle)?,
        }
        Ok(())
    }
}

/// Replace every local virtualized handle in `value` with its actual handle.
pub fn restore_actual_handles<F: Field>(tables: &HandleTables, value: &mut F) -> Result<()> {
    value.visit_handles(&mut RestoreActual { tables })
}

/// Replace every actual virtualized handle in `value` with the local handle
/// this process issued for it.
pub fn substitute_local_handles<F: Field>(tables: &HandleTables, value: &mut F) -> Result<()> {
    value.visit_handles(&mut SubstituteLocal { tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{
        Chain, CompositionLayerProjection, CompositionLayerProjectionView, CompositionLayerQuad,
        FrameEndInfo, SwapchainSubImage,
    };
    use crate::error::LayerError;
    use crate::handles::{
        BoundActionSpace, HandleInfo, SessionExtra, SpaceExtra, SpaceOrigin, SwapchainExtra,
    };
    use crate::testing::FakeRuntime;
    use crate::types::{InstanceHandle, ReferenceSpaceType, SessionHandle, SpaceHandle, SwapchainHandle};
    use std::sync::Arc;

    fn tables_with_mappings(runtime: &Arc<FakeRuntime>) -> HandleTables {
        let tables = HandleTables::default();
        tables
            .sessions
            .add(
                HandleInfo::new(SessionHandle(1), InstanceHandle(9), runtime.clone(), SessionExtra::new(Default::default()))
                    .with_actual(SessionHandle(0x101)),
            )
            .unwrap();
        tables
            .spaces
            .add(
                HandleInfo::new(
                    SpaceHandle(2),
                    InstanceHandle(9),
                    runtime.clone(),
                    SpaceExtra::new(SpaceOrigin::Reference(ReferenceSpaceType::LOCAL)),
                )
                .with_actual(SpaceHandle(0x102)),
            )
            .unwrap();
        tables
            .swapchains
            .add(
                HandleInfo::new(
                    SwapchainHandle(3),
                    InstanceHandle(9),
                    runtime.clone(),
                    SwapchainExtra {
                        create_info: Default::default(),
                        image_count: None,
                    },
                )
                .with_actual(SwapchainHandle(0x103)),
            )
            .unwrap();
        tables
    }

    fn frame_end_info(space: u64, swapchain: u64) -> FrameEndInfo {
        let view = CompositionLayerProjectionView {
            sub_image: SwapchainSubImage {
                swapchain: SwapchainHandle(swapchain),
                ..Default::default()
            },
            ..Default::default()
        };
        let projection: Chain = Some(Box::new(
            CompositionLayerProjection {
                space: SpaceHandle(space),
                views: vec![view.clone(), view],
                ..Default::default()
            }
            .into(),
        ));
        let quad: Chain = Some(Box::new(
            CompositionLayerQuad {
                space: SpaceHandle(space),
                sub_image: SwapchainSubImage {
                    swapchain: SwapchainHandle(swapchain),
                    ..Default::default()
                },
                ..Default::default()
            }
            .into(),
        ));
        FrameEndInfo {
            display_time: 42,
            layers: vec![projection, quad],
            ..Default::default()
        }
    }

    #[test]
    fn test_restore_then_substitute_is_identity() {
        let runtime = Arc::new(FakeRuntime::new());
        let tables = tables_with_mappings(&runtime);
        let original = frame_end_info(2, 3);

        let mut value = original.clone();
        restore_actual_handles(&tables, &mut value).unwrap();
        assert_eq!(value, frame_end_info(0x102, 0x103));

        substitute_local_handles(&tables, &mut value).unwrap();
        assert_eq!(value, original);
    }

    #[test]
    fn test_substitute_then_restore_is_identity() {
        let runtime = Arc::new(FakeRuntime::new());
        let tables = tables_with_mappings(&runtime);
        let original = frame_end_info(0x102, 0x103);

        let mut value = original.clone();
        substitute_local_handles(&tables, &mut value).unwrap();
        restore_actual_handles(&tables, &mut value).unwrap();
        assert_eq!(value, original);
    }

    #[test]
    fn test_unknown_handle_aborts_walk() {
        let runtime = Arc::new(FakeRuntime::new());
        let tables = tables_with_mappings(&runtime);

        let mut value = frame_end_info(2, 77);
        let err = restore_actual_handles(&tables, &mut value).unwrap_err();
        assert!(matches!(err, LayerError::HandleInvalid { handle: 77, .. }));

        let mut value = frame_end_info(0x999, 0x103);
        assert!(substitute_local_handles(&tables, &mut value).is_err());
    }

    #[test]
    fn test_action_space_restores_to_its_bound_main_space() {
        let runtime = Arc::new(FakeRuntime::new());
        let tables = tables_with_mappings(&runtime);
        let origin = SpaceOrigin::Action {
            action: Default::default(),
            subaction_path: Default::default(),
            pose_in_action_space: Default::default(),
        };
        let entry = tables
            .spaces
            .add(
                HandleInfo::new(SpaceHandle(4), InstanceHandle(9), runtime.clone(), SpaceExtra::new(origin))
                    .with_actual(SpaceHandle::NULL)
                    .proxied(),
            )
            .unwrap();

        let mut value = frame_end_info(4, 3);
        restore_actual_handles(&tables, &mut value).unwrap();
        assert_eq!(value, frame_end_info(0, 0x103));

        *lock(&entry.extra.bound) = Some(BoundActionSpace {
            main_space: SpaceHandle(0x204),
            profile: "/interaction_profiles/khr/simple_controller".to_string(),
            binding: "/user/hand/left/input/grip/pose".to_string(),
        });
        let mut value = frame_end_info(4, 3);
        restore_actual_handles(&tables, &mut value).unwrap();
        assert_eq!(value, frame_end_info(0x204, 0x103));
    }

    #[test]
    fn test_null_handles_are_left_alone() {
        let tables = HandleTables::default();
        let mut value = frame_end_info(0, 0);
        restore_actual_handles(&tables, &mut value).unwrap();
        assert_eq!(value, frame_end_info(0, 0));
    }
}
