use arrayvec::ArrayVec;
use rhi_types::{RHIColorComponentFlags, RHIExtent2D, RHIFormat, RHISampleCountFlagBits};
use typed_builder::TypedBuilder;

use crate::render_pass::{RenderPassDesc, ResolveMode};
use crate::serial::{ResourceSerial, ViewSerial};
use crate::{
    Backend, DrawBufferMask, IncompleteReason, MAX_ATTACHMENT_SLOTS, MAX_COLOR_ATTACHMENTS,
    MAX_FRAMEBUFFER_ATTACHMENTS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    Color(u32),
    DepthStencil,
}

/// A view bound to one attachment slot, as supplied by the image layer.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct AttachmentView<A: Backend> {
    pub view: A::ImageView,
    pub resource: ResourceSerial,
    pub view_serial: ViewSerial,
    /// Format the application asked for.
    pub format: RHIFormat,
    /// Format the image really has when `format` is emulated.
    #[builder(default, setter(strip_option))]
    pub emulated_format: Option<RHIFormat>,
    #[builder(default)]
    pub samples: RHISampleCountFlagBits,
    pub extent: RHIExtent2D,
    #[builder(default = 1)]
    pub layer_count: u32,
    #[builder(default = false)]
    pub contents_defined: bool,
}

impl<A: Backend> AttachmentView<A> {
    pub fn actual_format(&self) -> RHIFormat {
        self.emulated_format.unwrap_or(self.format)
    }

    /// Alpha is stored by the image but absent from the requested format.
    pub fn has_emulated_alpha(&self) -> bool {
        !self.format.color_channels().contains(RHIColorComponentFlags::A)
            && self
                .actual_format()
                .color_channels()
                .contains(RHIColorComponentFlags::A)
    }

    pub fn identity(&self, resolve_view: Option<ViewSerial>) -> AttachmentIdentity {
        AttachmentIdentity {
            resource: self.resource,
            view: self.view_serial,
            resolve_view,
            layer_count: self.layer_count,
        }
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.view_serial == other.view_serial
            && self.layer_count == other.layer_count
    }

    fn same_render_pass_layout(&self, other: &Self) -> bool {
        self.format == other.format
            && self.actual_format() == other.actual_format()
            && self.samples == other.samples
    }
}

/// Single-sampled target a multisampled color attachment resolves into.
#[derive(Debug, Clone, Copy)]
pub struct ResolveView<A: Backend> {
    pub view: A::ImageView,
    pub serial: ViewSerial,
}

/// What an attachment occupies inside a framebuffer cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentIdentity {
    pub resource: ResourceSerial,
    pub view: ViewSerial,
    pub resolve_view: Option<ViewSerial>,
    pub layer_count: u32,
}

/// How much of the derived state an attachment update invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderPassDescriptorDelta {
    Unchanged,
    /// Only the framebuffer cache key changed. The render pass is still compatible.
    CacheKeyOnly,
    RenderPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete(IncompleteReason),
}

impl FramebufferStatus {
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }

    pub fn into_result(self) -> Result<(), IncompleteReason> {
        match self {
            Self::Complete => Ok(()),
            Self::Incomplete(reason) => Err(reason),
        }
    }
}

/// The attachments currently bound to a framebuffer.
#[derive(Debug, Clone)]
pub struct RenderTargets<A: Backend> {
    colors: [Option<AttachmentView<A>>; MAX_COLOR_ATTACHMENTS],
    depth_stencil: Option<AttachmentView<A>>,
    color_resolves: [Option<ResolveView<A>>; MAX_COLOR_ATTACHMENTS],
}

impl<A: Backend> Default for RenderTargets<A> {
    fn default() -> Self {
        Self {
            colors: [None; MAX_COLOR_ATTACHMENTS],
            depth_stencil: None,
            color_resolves: [None; MAX_COLOR_ATTACHMENTS],
        }
    }
}

impl<A: Backend> RenderTargets<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachment(&self, slot: AttachmentSlot) -> Option<&AttachmentView<A>> {
        match slot {
            AttachmentSlot::Color(index) => self.colors.get(index as usize)?.as_ref(),
            AttachmentSlot::DepthStencil => self.depth_stencil.as_ref(),
        }
    }

    fn attachment_mut(&mut self, slot: AttachmentSlot) -> &mut Option<AttachmentView<A>> {
        match slot {
            AttachmentSlot::Color(index) => &mut self.colors[index as usize],
            AttachmentSlot::DepthStencil => &mut self.depth_stencil,
        }
    }

    pub fn color(&self, index: u32) -> Option<&AttachmentView<A>> {
        self.attachment(AttachmentSlot::Color(index))
    }

    pub fn depth_stencil(&self) -> Option<&AttachmentView<A>> {
        self.depth_stencil.as_ref()
    }

    pub fn color_resolve(&self, index: u32) -> Option<&ResolveView<A>> {
        self.color_resolves.get(index as usize)?.as_ref()
    }

    /// Color slots that have an attachment bound.
    pub fn color_mask(&self) -> DrawBufferMask {
        DrawBufferMask::from_indices(
            self.colors
                .iter()
                .enumerate()
                .filter(|(_, view)| view.is_some())
                .map(|(index, _)| index as u32),
        )
    }

    fn bound(&self) -> impl Iterator<Item = &AttachmentView<A>> {
        self.colors.iter().flatten().chain(self.depth_stencil.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.bound().next().is_none()
    }

    /// Replaces the view in `slot`. Rebinding the same identity keeps the
    /// tracked contents state.
    pub fn update_attachment(
        &mut self,
        slot: AttachmentSlot,
        view: Option<AttachmentView<A>>,
    ) -> RenderPassDescriptorDelta {
        let delta = self.delta_for(slot, view.as_ref());
        if delta != RenderPassDescriptorDelta::Unchanged {
            *self.attachment_mut(slot) = view;
        }
        delta
    }

    /// What [`update_attachment`](Self::update_attachment) would report, without binding anything.
    pub fn delta_for(
        &self,
        slot: AttachmentSlot,
        view: Option<&AttachmentView<A>>,
    ) -> RenderPassDescriptorDelta {
        match (self.attachment(slot), view) {
            (None, None) => RenderPassDescriptorDelta::Unchanged,
            (Some(old), Some(new)) if old.same_identity(new) => {
                if old.same_render_pass_layout(new) {
                    RenderPassDescriptorDelta::Unchanged
                } else {
                    RenderPassDescriptorDelta::RenderPass
                }
            }
            (Some(old), Some(new)) if old.same_render_pass_layout(new) => {
                RenderPassDescriptorDelta::CacheKeyOnly
            }
            _ => RenderPassDescriptorDelta::RenderPass,
        }
    }

    pub fn update_color_resolve(
        &mut self,
        index: u32,
        resolve: Option<ResolveView<A>>,
    ) -> RenderPassDescriptorDelta {
        let current = &mut self.color_resolves[index as usize];
        let delta = match (current.as_ref(), resolve.as_ref()) {
            (None, None) => RenderPassDescriptorDelta::Unchanged,
            (Some(old), Some(new)) if old.serial == new.serial => {
                RenderPassDescriptorDelta::Unchanged
            }
            (Some(_), Some(_)) => RenderPassDescriptorDelta::CacheKeyOnly,
            _ => RenderPassDescriptorDelta::RenderPass,
        };
        *current = resolve;
        delta
    }

    pub fn contents_defined(&self, slot: AttachmentSlot) -> bool {
        self.attachment(slot)
            .map_or(false, |view| view.contents_defined)
    }

    pub fn set_contents_defined(&mut self, slot: AttachmentSlot, defined: bool) {
        if let Some(view) = self.attachment_mut(slot).as_mut() {
            view.contents_defined = defined;
        }
    }

    pub fn check_status(&self) -> FramebufferStatus {
        let mut bound = self.bound();
        let first = match bound.next() {
            Some(first) => first,
            None => return FramebufferStatus::Incomplete(IncompleteReason::MissingAttachment),
        };
        for view in self.bound() {
            if view.extent.is_empty() || view.layer_count == 0 {
                return FramebufferStatus::Incomplete(IncompleteReason::ZeroSizedAttachment);
            }
        }
        for view in bound {
            if view.extent != first.extent {
                return FramebufferStatus::Incomplete(IncompleteReason::MismatchedDimensions);
            }
            if view.layer_count != first.layer_count {
                return FramebufferStatus::Incomplete(IncompleteReason::MismatchedLayers);
            }
            if view.samples != first.samples {
                return FramebufferStatus::Incomplete(IncompleteReason::MismatchedSamples);
            }
        }
        for (color, resolve) in self.colors.iter().zip(self.color_resolves.iter()) {
            if let (Some(color), Some(_)) = (color, resolve) {
                if !color.samples.is_multisampled() {
                    return FramebufferStatus::Incomplete(IncompleteReason::InvalidResolve);
                }
            }
        }
        FramebufferStatus::Complete
    }

    /// Common extent of the attachments. Only meaningful once complete.
    pub fn extent(&self) -> RHIExtent2D {
        self.bound().next().map(|view| view.extent).unwrap_or_default()
    }

    pub fn layer_count(&self) -> u32 {
        self.bound().next().map_or(1, |view| view.layer_count)
    }

    pub fn samples(&self) -> RHISampleCountFlagBits {
        self.bound().next().map(|view| view.samples).unwrap_or_default()
    }

    /// Attachment identities in slot order, depth/stencil last.
    pub fn identities(&self) -> ArrayVec<Option<AttachmentIdentity>, MAX_ATTACHMENT_SLOTS> {
        let mut identities = ArrayVec::new();
        for (color, resolve) in self.colors.iter().zip(self.color_resolves.iter()) {
            identities.push(
                color
                    .as_ref()
                    .map(|view| view.identity(resolve.as_ref().map(|r| r.serial))),
            );
        }
        identities.push(self.depth_stencil.as_ref().map(|view| view.identity(None)));
        identities
    }

    /// Native views in the packed order the render pass expects.
    pub fn packed_views(
        &self,
        render_pass: &RenderPassDesc,
        swapchain_resolve: Option<&ResolveView<A>>,
    ) -> ArrayVec<A::ImageView, MAX_FRAMEBUFFER_ATTACHMENTS> {
        let mut views = ArrayVec::new();
        for (index, ops) in render_pass.color_attachments() {
            debug_assert!(ops.is_some() == self.colors[index as usize].is_some());
            if let Some(view) = &self.colors[index as usize] {
                views.push(view.view);
            }
        }
        if let Some(view) = &self.depth_stencil {
            views.push(view.view);
        }
        for (index, ops) in render_pass.color_attachments() {
            if !matches!(ops, Some(ops) if ops.resolve == ResolveMode::Subpass) {
                continue;
            }
            if index == 0 {
                if let Some(resolve) = swapchain_resolve {
                    views.push(resolve.view);
                    continue;
                }
            }
            if let Some(resolve) = &self.color_resolves[index as usize] {
                views.push(resolve.view);
            }
        }
        views
    }
}
