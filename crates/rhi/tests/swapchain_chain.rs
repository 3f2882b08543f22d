//! Swapchain build and rebuild against a headless surface.
//!
//! Skips when the driver does not expose `VK_EXT_headless_surface` or no
//! device can present to it.

use tilegpu_rhi::device::Device;
use tilegpu_rhi::instance::Instance;
use tilegpu_rhi::physical_device::select_device;
use tilegpu_rhi::render_pass::RenderPass;
use tilegpu_rhi::swapchain::{Swapchain, SwapchainSupportDetails};
use tilegpu_rhi::vk;

fn assert_chain_consistent(swapchain: &Swapchain, min_image_count: u32) {
    let count = swapchain.image_count();
    assert_eq!(swapchain.image_views().len() as u32, count);
    assert_eq!(swapchain.framebuffers().len() as u32, count);
    assert!(count >= min_image_count);
    for index in 0..count {
        assert!(swapchain.framebuffer(index).is_some());
    }
    assert!(swapchain.framebuffer(count).is_none());
}

#[test]
fn test_chain_lengths_match_after_create_and_recreate() {
    let extensions = [
        ash::khr::surface::NAME.as_ptr(),
        ash::ext::headless_surface::NAME.as_ptr(),
    ];
    let instance = match Instance::new(c"tilegpu-swapchain-tests", false, &extensions) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("skipping: no instance with headless surface support ({e})");
            return;
        }
    };

    let headless = ash::ext::headless_surface::Instance::new(instance.entry(), instance.handle());
    let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
    let surface = match unsafe {
        headless.create_headless_surface(&vk::HeadlessSurfaceCreateInfoEXT::default(), None)
    } {
        Ok(surface) => surface,
        Err(e) => {
            eprintln!("skipping: headless surface creation failed ({e})");
            return;
        }
    };

    let device = match select_device(instance.handle(), surface, &surface_loader)
        .and_then(|candidates| Device::new(&instance, &candidates[0]))
    {
        Ok(device) => device,
        Err(e) => {
            eprintln!("skipping: no device presents to a headless surface ({e})");
            unsafe { surface_loader.destroy_surface(surface, None) };
            return;
        }
    };

    let min_image_count =
        SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)
            .unwrap()
            .capabilities
            .min_image_count;

    let mut swapchain = Swapchain::new(&instance, device.clone(), surface, (640, 480)).unwrap();
    assert!(swapchain.image_count() > 0);
    assert!(swapchain.framebuffers().is_empty());

    let render_pass = RenderPass::new(device.clone(), swapchain.format()).unwrap();
    swapchain.create_framebuffers(render_pass.handle()).unwrap();
    assert_chain_consistent(&swapchain, min_image_count);

    swapchain.recreate((800, 600)).unwrap();
    assert_chain_consistent(&swapchain, min_image_count);
    let extent = swapchain.extent();
    assert!(extent.width > 0 && extent.height > 0);

    drop(swapchain);
    drop(render_pass);
    drop(device);
    unsafe { surface_loader.destroy_surface(surface, None) };
}
