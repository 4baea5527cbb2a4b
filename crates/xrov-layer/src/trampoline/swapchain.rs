use super::{entry_point, resolve};
use crate::chain::{Field, SwapchainImageAcquireInfo, SwapchainImageReleaseInfo, SwapchainImageWaitInfo};
use crate::downchain::dispatch;
use crate::error::{LayerError, Result};
use crate::rpc::{self, AcquireSwapchainImageArgs, DestroySwapchainArgs, ReleaseSwapchainImageArgs, WaitSwapchainImageArgs};
use crate::state::Layer;
use crate::types::{SwapchainHandle, XrResult};

impl Layer {
    pub fn xr_destroy_swapchain(&self, swapchain: SwapchainHandle) -> XrResult {
        entry_point("xrDestroySwapchain", || self.destroy_swapchain(swapchain))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> Result<XrResult> {
        let entry = resolve(&self.tables.swapchains, "xrDestroySwapchain", swapchain)?;
        if entry.is_proxied {
            let mut args = DestroySwapchainArgs { swapchain: entry.actual };
            drop(entry);
            let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
            if result.failed() {
                return Ok(result);
            }
        } else {
            drop(entry);
        }
        self.retire_swapchain(swapchain)
    }

    /// Only the image count is reported; images themselves are not shared
    /// across processes.
    pub fn xr_enumerate_swapchain_images(&self, swapchain: SwapchainHandle, count_output: &mut u32) -> XrResult {
        entry_point("xrEnumerateSwapchainImages", || {
            let entry = resolve(&self.tables.swapchains, "xrEnumerateSwapchainImages", swapchain)?;
            if entry.is_proxied {
                *count_output = entry.extra.image_count.ok_or(LayerError::FunctionUnsupported)?;
                return Ok(XrResult::SUCCESS);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.enumerate_swapchain_images(entry.actual, count_output)))
        })
    }

    pub fn xr_acquire_swapchain_image(
        &self,
        swapchain: SwapchainHandle,
        info: &SwapchainImageAcquireInfo,
        index: &mut u32,
    ) -> XrResult {
        entry_point("xrAcquireSwapchainImage", || {
            let entry = resolve(&self.tables.swapchains, "xrAcquireSwapchainImage", swapchain)?;
            if entry.is_proxied {
                let mut args = AcquireSwapchainImageArgs {
                    swapchain: entry.actual,
                    acquire_info: info.deep_copy()?,
                    index: 0,
                };
                let result = rpc::call(&*self.main_endpoint()?, &mut args)?;
                if result.succeeded() {
                    *index = args.index;
                }
                return Ok(result);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.acquire_swapchain_image(entry.actual, info, index)))
        })
    }

    pub fn xr_wait_swapchain_image(&self, swapchain: SwapchainHandle, info: &SwapchainImageWaitInfo) -> XrResult {
        entry_point("xrWaitSwapchainImage", || {
            let entry = resolve(&self.tables.swapchains, "xrWaitSwapchainImage", swapchain)?;
            if entry.is_proxied {
                let mut args = WaitSwapchainImageArgs {
                    swapchain: entry.actual,
                    wait_info: info.deep_copy()?,
                };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.wait_swapchain_image(entry.actual, info)))
        })
    }

    pub fn xr_release_swapchain_image(&self, swapchain: SwapchainHandle, info: &SwapchainImageReleaseInfo) -> XrResult {
        entry_point("xrReleaseSwapchainImage", || {
            let entry = resolve(&self.tables.swapchains, "xrReleaseSwapchainImage", swapchain)?;
            if entry.is_proxied {
                let mut args = ReleaseSwapchainImageArgs {
                    swapchain: entry.actual,
                    release_info: info.deep_copy()?,
                };
                return rpc::call(&*self.main_endpoint()?, &mut args);
            }
            Ok(dispatch(&entry.downchain()?, |d| d.release_swapchain_image(entry.actual, info)))
        })
    }
}
