use super::{entry_point, resolve};
use crate::chain::SpaceLocation;
use crate::downchain::dispatch;
use crate::error::{LayerError, Result};
use crate::handles::SpaceOrigin;
use crate::rpc::{self, DestroySpaceArgs, LocateSpaceArgs};
use crate::state::Layer;
use crate::sync::lock;
use crate::types::{SpaceHandle, Time, XrResult};

impl Layer {
    /// Both spaces must live on the same side of the process boundary. A
    /// proxied action space with no current pose binding is not tracked.
    pub fn xr_locate_space(&self, space: SpaceHandle, base_space: SpaceHandle, time: Time, location: &mut SpaceLocation) -> XrResult {
        entry_point("xrLocateSpace", || {
            let entry = resolve(&self.tables.spaces, "xrLocateSpace", space)?;
            let base = self.tables.spaces.get(base_space)?;
            if entry.is_proxied != base.is_proxied {
                return Err(LayerError::ValidationFailure("spaces belong to different sessions"));
            }
            if entry.is_proxied {
                let (Some(space), Some(base_space)) = (self.main_space_for(&entry)?, self.main_space_for(&base)?) else {
                    location.location_flags = 0;
                    return Ok(XrResult::SUCCESS);
                };
                let mut args = LocateSpaceArgs {
                    space,
                    base_space,
                    time,
                    location: location.clone(),
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *location = args.location;
                }
                return Ok(result);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.locate_space(entry.actual, base.actual, time, location)))
        })
    }

    pub fn xr_destroy_space(&self, space: SpaceHandle) -> XrResult {
        entry_point("xrDestroySpace", || self.destroy_space(space))
    }

    fn destroy_space(&self, space: SpaceHandle) -> Result<XrResult> {
        let entry = resolve(&self.tables.spaces, "xrDestroySpace", space)?;
        if entry.is_proxied {
            let main_space = match entry.extra.origin {
                SpaceOrigin::Reference(_) => Some(entry.actual),
                SpaceOrigin::Action { .. } => lock(&entry.extra.bound).take().map(|bound| bound.main_space),
            };
            drop(entry);
            if let Some(space) = main_space {
                let mut args = DestroySpaceArgs { space };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.failed() {
                    return Ok(result);
                }
            }
        } else {
            drop(entry);
        }
        self.retire_space(space)
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::{SessionCreateInfo, SpaceLocation, SystemGetInfo};
    use crate::state::{Layer, LayerOptions};
    use crate::testing::{capture_warnings, FakeRuntime};
    use crate::types::{FormFactor, InstanceHandle, SessionHandle, SpaceHandle, SystemId, XrResult};
    use std::sync::Arc;

    fn session(layer: &Layer) -> SessionHandle {
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
        layer.xr_create_session(instance, &info, &mut session);
        session
    }

    #[test]
    fn test_locate_space_resolves_both_spaces() {
        let runtime = Arc::new(FakeRuntime::new());
        let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), 31);
        let session = session(&layer);
        let mut view = SpaceHandle::NULL;
        let mut local = SpaceHandle::NULL;
        layer.xr_create_reference_space(session, &Default::default(), &mut view);
        layer.xr_create_reference_space(session, &Default::default(), &mut local);

        let mut location = SpaceLocation::default();
        assert_eq!(layer.xr_locate_space(view, local, 1_234, &mut location), XrResult::SUCCESS);
        assert_eq!(location.pose.position.z, 234.0);

        assert_eq!(
            layer.xr_locate_space(view, SpaceHandle(0x77), 0, &mut location),
            XrResult::ERROR_HANDLE_INVALID
        );
    }

    #[test]
    fn test_second_destroy_is_rejected_without_runtime_call() {
        let runtime = Arc::new(FakeRuntime::new());
        let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), 32);
        let session = session(&layer);
        let mut space = SpaceHandle::NULL;
        layer.xr_create_reference_space(session, &Default::default(), &mut space);

        let ((first, second), warnings) = capture_warnings(|| (layer.xr_destroy_space(space), layer.xr_destroy_space(space)));
        assert_eq!(first, XrResult::SUCCESS);
        assert_eq!(second, XrResult::ERROR_VALIDATION_FAILURE);
        assert_eq!(warnings, 0);
        assert_eq!(runtime.count("destroy_space"), 1);
    }
}
