//! Handle lifetimes seen through the public entry points.

use std::sync::Arc;
use xrov_layer::chain::{
    CompositionLayerProjection, CompositionLayerProjectionView, FrameEndInfo, Record,
    SessionCreateInfo, SwapchainSubImage, SystemGetInfo,
};
use xrov_layer::handles::Teardown;
use xrov_layer::substitute::{restore_actual_handles, substitute_local_handles};
use xrov_layer::testing::{capture_warnings, FakeRuntime};
use xrov_layer::types::{FormFactor, InstanceHandle, SessionHandle, SpaceHandle, SwapchainHandle, SystemId};
use xrov_layer::{Layer, LayerError, LayerOptions, XrResult};

fn session(namespace: u64) -> (Arc<FakeRuntime>, Layer, SessionHandle) {
    let runtime = Arc::new(FakeRuntime::new());
    let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), namespace);
    let mut instance = InstanceHandle::NULL;
    assert_eq!(layer.xr_create_instance(&Default::default(), &mut instance), XrResult::SUCCESS);
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
    (runtime, layer, session)
}

#[test]
fn test_destroying_a_swapchain_unregisters_it() {
    let (runtime, layer, session) = session(41);
    let mut swapchain = SwapchainHandle::NULL;
    layer.xr_create_swapchain(session, &Default::default(), &mut swapchain);
    let actual = layer.tables().swapchains.get(swapchain).unwrap().actual;

    assert_eq!(layer.xr_destroy_swapchain(swapchain), XrResult::SUCCESS);
    assert_eq!(runtime.count("destroy_swapchain"), 1);
    assert!(layer.tables().swapchains.local_for_actual(actual).is_err());
    let parent = layer.tables().sessions.get(session).unwrap();
    assert!(!parent.extra.children.lock().unwrap().swapchains.contains(&swapchain));
    assert!(matches!(
        layer.tables().swapchains.get(swapchain),
        Err(LayerError::HandleInvalid { .. })
    ));

    let mut count = 0;
    assert_eq!(
        layer.xr_enumerate_swapchain_images(swapchain, &mut count),
        XrResult::ERROR_VALIDATION_FAILURE
    );
}

#[test]
fn test_entry_teardown_happens_once() {
    let (runtime, layer, session) = session(42);
    let mut swapchain = SwapchainHandle::NULL;
    layer.xr_create_swapchain(session, &Default::default(), &mut swapchain);
    let entry = layer.tables().swapchains.get(swapchain).unwrap();

    let ((first, second), warnings) = capture_warnings(|| (entry.destroy(), entry.destroy()));
    assert_eq!(first, Teardown::Performed(XrResult::SUCCESS));
    assert_eq!(second, Teardown::AlreadyDestroyed);
    assert_eq!(warnings, 1);
    assert_eq!(runtime.count("destroy_swapchain"), 1);
    assert!(entry.downchain().is_err());

    // Dropping the last reference does not tear down again.
    drop(entry);
    assert_eq!(runtime.count("destroy_swapchain"), 1);
}

#[test]
fn test_substitution_inverts_through_live_tables() {
    let (_runtime, layer, session) = session(43);
    let mut swapchain = SwapchainHandle::NULL;
    layer.xr_create_swapchain(session, &Default::default(), &mut swapchain);
    let mut space = SpaceHandle::NULL;
    layer.xr_create_reference_space(session, &Default::default(), &mut space);

    let view = CompositionLayerProjectionView {
        sub_image: SwapchainSubImage {
            swapchain,
            ..Default::default()
        },
        ..Default::default()
    };
    let original = FrameEndInfo {
        display_time: 10,
        layers: vec![Some(Box::new(Record::from(CompositionLayerProjection {
            space,
            views: vec![view.clone(), view],
            ..Default::default()
        })))],
        ..Default::default()
    };

    let mut value = original.clone();
    restore_actual_handles(layer.tables(), &mut value).unwrap();
    assert_ne!(value, original);
    let Some(Record::CompositionLayerProjection(sent)) = value.layers[0].as_deref() else {
        panic!("layer changed kind");
    };
    assert_eq!(sent.space, layer.tables().spaces.get(space).unwrap().actual);

    substitute_local_handles(layer.tables(), &mut value).unwrap();
    assert_eq!(value, original);
}

#[test]
fn test_handles_from_another_layer_are_rejected() {
    let (_, first, first_session) = session(44);
    let (runtime, second, _) = session(45);
    assert_ne!(first_session, second.tables().sessions.handles()[0]);

    let mut swapchain = SwapchainHandle::NULL;
    assert_eq!(
        second.xr_create_swapchain(first_session, &Default::default(), &mut swapchain),
        XrResult::ERROR_VALIDATION_FAILURE
    );
    assert!(swapchain.is_null());
    assert_eq!(runtime.count("create_swapchain"), 0);
    assert!(first.tables().sessions.contains(first_session));
}
