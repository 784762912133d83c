use arrayvec::ArrayVec;
use rhi_types::RHIExtent2D;

use crate::attachment::{AttachmentIdentity, RenderTargets};
use crate::render_pass::RenderPassDesc;
use crate::serial::ViewSerial;
use crate::{Backend, MAX_ATTACHMENT_SLOTS};

/// Cache key of a native framebuffer.
///
/// Two descriptors are equal exactly when a framebuffer built for one can be
/// used for the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FramebufferDesc {
    attachments: ArrayVec<Option<AttachmentIdentity>, MAX_ATTACHMENT_SLOTS>,
    render_pass: RenderPassDesc,
    extent: RHIExtent2D,
    layers: u32,
    swapchain_resolve: Option<ViewSerial>,
}

impl FramebufferDesc {
    pub fn new<A: Backend>(
        targets: &RenderTargets<A>,
        render_pass: RenderPassDesc,
        swapchain_resolve: Option<ViewSerial>,
    ) -> Self {
        Self {
            attachments: targets.identities(),
            render_pass,
            extent: targets.extent(),
            layers: targets.layer_count(),
            swapchain_resolve,
        }
    }

    pub fn attachments(&self) -> &[Option<AttachmentIdentity>] {
        &self.attachments
    }

    pub fn render_pass(&self) -> &RenderPassDesc {
        &self.render_pass
    }

    pub fn extent(&self) -> RHIExtent2D {
        self.extent
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn swapchain_resolve(&self) -> Option<ViewSerial> {
        self.swapchain_resolve
    }
}
