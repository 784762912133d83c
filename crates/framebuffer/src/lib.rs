#![allow(clippy::missing_safety_doc)]
//! Framebuffer and render-pass object management.
//!
//! Turns mutable framebuffer state (attachments, clears, masks, resolve targets)
//! into immutable, cacheable native objects. Pending clears are batched into
//! render-pass load ops and the depth read-only feedback loop is tracked so that
//! incompatible native objects are never reused mid-pass.
//!
//! Backends plug in through [`Backend`], the same way `wgpu-hal` backends do.

use core::fmt::Debug;

pub use error::*;
pub use rhi_types;

use crate::clear::{AttachmentClear, ClearValue, StagedClear};
use crate::render_pass::RenderPassDesc;
use crate::serial::QueueSerial;
use crate::types::Label;
use arrayvec::ArrayVec;
use rhi_types::{RHIExtent2D, RHIImageLayout, RHIRect2D};

mod error;
pub mod attachment;
pub mod cache;
pub mod clear;
pub mod feedback_loop;
pub mod framebuffer;
pub mod framebuffer_desc;
pub mod reclaim;
pub mod render_pass;
pub mod serial;
pub mod types;
#[cfg(feature = "vulkan")]
pub mod vulkan;

#[cfg(test)]
pub(crate) mod mock;

pub use attachment::{AttachmentSlot, AttachmentView, RenderPassDescriptorDelta, ResolveView};
pub use cache::{FramebufferCache, SharedFramebufferCache};
pub use framebuffer::{FrameContext, Framebuffer, SwapchainResolveMode};
pub use types::*;

/// Max number of color attachments a framebuffer can hold.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;
/// Colors plus the depth/stencil slot.
pub const MAX_ATTACHMENT_SLOTS: usize = MAX_COLOR_ATTACHMENTS + 1;
/// Colors, depth/stencil, per-color resolves and the swapchain resolve.
pub const MAX_FRAMEBUFFER_ATTACHMENTS: usize = MAX_COLOR_ATTACHMENTS * 2 + 2;

pub mod api {
    #[cfg(feature = "vulkan")]
    pub use super::vulkan::Api as Vulkan;
}

// refer to wgpu-hal
pub trait Backend: Clone + Copy + Debug + Sized + 'static {
    type Device: Device<Self>;
    type CommandRecorder: CommandRecorder<Self>;

    /// Native image view handle. Never owned by this crate.
    type ImageView: Copy + Debug + Eq;
    /// Native framebuffer handle. Owned by [`FramebufferCache`].
    type Framebuffer: Copy + Debug + Eq;
}

pub trait Device<A: Backend> {
    fn features(&self) -> &FramebufferFeatures;

    fn create_framebuffer(
        &self,
        info: &FramebufferCreateInfo<'_, A>,
    ) -> Result<A::Framebuffer, DeviceError>;

    /// The framebuffer must no longer be referenced by pending GPU work.
    unsafe fn destroy_framebuffer(&self, framebuffer: A::Framebuffer);
}

/// Everything a backend needs to build one native framebuffer.
///
/// `attachments` is in packed order: enabled colors, depth/stencil, color
/// resolves of subpass-resolved attachments, then the swapchain resolve.
pub struct FramebufferCreateInfo<'a, A: Backend> {
    pub label: Label<'a>,
    pub render_pass: &'a RenderPassDesc,
    pub attachments: &'a [A::ImageView],
    pub extent: RHIExtent2D,
    pub layers: u32,
}

/// Handed to the command recorder when a render pass starts.
#[derive(Debug, Clone)]
pub struct CommandTarget<A: Backend> {
    pub framebuffer: A::Framebuffer,
    pub render_pass: RenderPassDesc,
    pub render_area: RHIRect2D,
    pub layers: u32,
    /// Clear values in packed attachment order, `None` where the load op is not `CLEAR`.
    pub clear_values: ArrayVec<Option<ClearValue>, MAX_FRAMEBUFFER_ATTACHMENTS>,
    pub depth_stencil_layout: RHIImageLayout,
}

/// Explicit resolve of a multisampled color attachment after its render pass ended.
#[derive(Debug, Clone, Copy)]
pub struct ResolveCommand<A: Backend> {
    pub color_index: u32,
    pub src: A::ImageView,
    pub dst: A::ImageView,
    pub area: RHIRect2D,
}

/// The command-buffer side. This crate only selects ops and records the calls
/// below; encoding is left to the backend.
pub trait CommandRecorder<A: Backend> {
    fn begin_render_pass(&mut self, target: &CommandTarget<A>);

    fn end_render_pass(&mut self);

    /// Unmasked clears inside the open render pass.
    fn clear_attachments(&mut self, clears: &[AttachmentClear], area: RHIRect2D);

    /// Masked clears inside the open render pass, drawn with a full-screen primitive.
    fn clear_with_draw(&mut self, clears: &[AttachmentClear], area: RHIRect2D);

    /// Clear applied outside of any render pass against the loaded contents of `clear.view`.
    fn stage_clear(&mut self, clear: StagedClear<A>);

    fn resolve_color(&mut self, resolve: ResolveCommand<A>);

    /// Serial of the submission currently being recorded.
    fn queue_serial(&self) -> QueueSerial;
}
