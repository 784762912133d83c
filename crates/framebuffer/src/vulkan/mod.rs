//! `ash` backend.
//!
//! The [`Device`] wraps a logical device created elsewhere and owns the
//! `VkRenderPass` objects derived from [`RenderPassDesc`] keys. Framebuffers
//! are handed out as raw handles and owned by the framebuffer cache.

use std::sync::Arc;

use ash::extensions::ext;
use ash::vk;
use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::clear::{AttachmentClear, StagedClear};
use crate::render_pass::RenderPassDesc;
use crate::serial::QueueSerial;
use crate::{FramebufferFeatures, ResolveCommand};

pub mod command;
pub mod conv;
pub mod device;

#[derive(Debug, Clone, Copy)]
pub struct Api;

impl crate::Backend for Api {
    type Device = Device;
    type CommandRecorder = CommandRecorder;

    type ImageView = vk::ImageView;
    type Framebuffer = vk::Framebuffer;
}

pub struct DeviceShared {
    /// Loads device local functions. Owned by the caller, must outlive this device.
    raw: ash::Device,
    debug_utils: Option<ext::DebugUtils>,
    render_passes: Mutex<FxHashMap<RenderPassDesc, vk::RenderPass>>,
}

pub struct Device {
    shared: Arc<DeviceShared>,
    features: FramebufferFeatures,
}

/// Records masked clears inside a render pass, usually with a full-screen
/// triangle and a color write mask.
pub trait MaskedClearPipeline: Send + Sync {
    unsafe fn record(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        clears: &[AttachmentClear],
        area: vk::Rect2D,
        layer_count: u32,
    );
}

/// Image work that has to happen outside of any render pass. It is picked up
/// by whoever records image layout transitions for the command buffer.
#[derive(Debug, Clone, Copy)]
pub enum PendingImageWork {
    Clear(StagedClear<Api>),
    Resolve(ResolveCommand<Api>),
}

pub struct CommandRecorder {
    raw: vk::CommandBuffer,
    device: Arc<DeviceShared>,
    serial: QueueSerial,
    masked_clear: Arc<dyn MaskedClearPipeline>,
    layer_count: u32,
    in_render_pass: bool,
    pending: Vec<PendingImageWork>,
}
