use arrayvec::ArrayVec;
use rhi_types::{
    RHIAttachmentLoadOp, RHIAttachmentStoreOp, RHIFormat, RHIImageLayout, RHISampleCountFlagBits,
};

use crate::attachment::{AttachmentSlot, RenderTargets};
use crate::clear::LoadOpClearMask;
use crate::{Backend, MAX_COLOR_ATTACHMENTS};

/// How a multisampled color attachment reaches its single-sampled target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolveMode {
    #[default]
    None,
    /// Resolved by the render pass itself.
    Subpass,
    /// Resolved by an explicit command after the render pass ends.
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentOpsDesc {
    pub format: RHIFormat,
    pub samples: RHISampleCountFlagBits,
    pub load_op: RHIAttachmentLoadOp,
    pub store_op: RHIAttachmentStoreOp,
    pub resolve: ResolveMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilOpsDesc {
    pub format: RHIFormat,
    pub samples: RHISampleCountFlagBits,
    pub load_op: RHIAttachmentLoadOp,
    pub store_op: RHIAttachmentStoreOp,
    pub stencil_load_op: RHIAttachmentLoadOp,
    pub stencil_store_op: RHIAttachmentStoreOp,
}

/// Everything besides attachment identity that selects a render pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPassOptions {
    pub framebuffer_fetch: bool,
    pub depth_read_only_feedback: bool,
    /// Color 0 resolves into the presentation image.
    pub swapchain_resolve: bool,
    pub subpass_resolve_supported: bool,
}

/// Compact, hashable render pass key.
///
/// Color slots are kept up to the last bound one so that gaps stay visible
/// in the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDesc {
    colors: ArrayVec<Option<AttachmentOpsDesc>, MAX_COLOR_ATTACHMENTS>,
    depth_stencil: Option<DepthStencilOpsDesc>,
    has_framebuffer_fetch: bool,
    depth_read_only_feedback: bool,
}

fn load_op_for(cleared: bool, defined: bool) -> RHIAttachmentLoadOp {
    if cleared {
        RHIAttachmentLoadOp::CLEAR
    } else if defined {
        RHIAttachmentLoadOp::LOAD
    } else {
        RHIAttachmentLoadOp::DONT_CARE
    }
}

impl RenderPassDesc {
    pub fn build<A: Backend>(
        targets: &RenderTargets<A>,
        clears: &LoadOpClearMask,
        options: &RenderPassOptions,
    ) -> Self {
        let mut desc = Self {
            has_framebuffer_fetch: options.framebuffer_fetch,
            depth_read_only_feedback: options.depth_read_only_feedback,
            ..Default::default()
        };

        let bound = targets.color_mask();
        let last_bound = bound.iter().last();
        for index in 0..last_bound.map_or(0, |last| last + 1) {
            let ops = targets.color(index).map(|view| {
                let wants_resolve = targets.color_resolve(index).is_some()
                    || (index == 0 && options.swapchain_resolve);
                let resolve = match (wants_resolve, options.subpass_resolve_supported) {
                    (false, _) => ResolveMode::None,
                    (true, true) => ResolveMode::Subpass,
                    (true, false) => ResolveMode::Command,
                };
                AttachmentOpsDesc {
                    format: view.actual_format(),
                    samples: view.samples,
                    load_op: load_op_for(clears.colors.test(index), view.contents_defined),
                    store_op: RHIAttachmentStoreOp::STORE,
                    resolve,
                }
            });
            desc.colors.push(ops);
        }

        desc.depth_stencil = targets.depth_stencil().map(|view| {
            let format = view.actual_format();
            let aspect_ops = |present: bool, cleared: bool| {
                if present {
                    load_op_for(cleared, view.contents_defined)
                } else {
                    RHIAttachmentLoadOp::DONT_CARE
                }
            };
            DepthStencilOpsDesc {
                format,
                samples: view.samples,
                load_op: aspect_ops(format.has_depth(), clears.depth),
                store_op: RHIAttachmentStoreOp::STORE,
                stencil_load_op: aspect_ops(format.has_stencil(), clears.stencil),
                stencil_store_op: if format.has_stencil() {
                    RHIAttachmentStoreOp::STORE
                } else {
                    RHIAttachmentStoreOp::DONT_CARE
                },
            }
        });
        desc
    }

    pub fn color(&self, index: u32) -> Option<&AttachmentOpsDesc> {
        self.colors.get(index as usize)?.as_ref()
    }

    pub fn color_attachments(&self) -> impl Iterator<Item = (u32, Option<&AttachmentOpsDesc>)> {
        self.colors
            .iter()
            .enumerate()
            .map(|(index, ops)| (index as u32, ops.as_ref()))
    }

    pub fn depth_stencil(&self) -> Option<&DepthStencilOpsDesc> {
        self.depth_stencil.as_ref()
    }

    pub fn has_framebuffer_fetch(&self) -> bool {
        self.has_framebuffer_fetch
    }

    pub fn depth_read_only_feedback(&self) -> bool {
        self.depth_read_only_feedback
    }

    pub fn depth_stencil_layout(&self) -> RHIImageLayout {
        if self.depth_read_only_feedback {
            RHIImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else {
            RHIImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
    }

    pub fn color_layout(&self) -> RHIImageLayout {
        if self.has_framebuffer_fetch {
            RHIImageLayout::GENERAL
        } else {
            RHIImageLayout::COLOR_ATTACHMENT_OPTIMAL
        }
    }

    pub fn enabled_color_count(&self) -> usize {
        self.colors.iter().flatten().count()
    }

    /// Color indices resolved as part of the render pass.
    pub fn subpass_resolves(&self) -> impl Iterator<Item = u32> + '_ {
        self.color_attachments()
            .filter(|(_, ops)| matches!(ops, Some(ops) if ops.resolve == ResolveMode::Subpass))
            .map(|(index, _)| index)
    }

    /// Color indices that need an explicit resolve after the render pass.
    pub fn command_resolves(&self) -> impl Iterator<Item = u32> + '_ {
        self.color_attachments()
            .filter(|(_, ops)| matches!(ops, Some(ops) if ops.resolve == ResolveMode::Command))
            .map(|(index, _)| index)
    }

    /// Number of native attachments, including resolve targets.
    pub fn attachment_count(&self) -> usize {
        self.enabled_color_count()
            + usize::from(self.depth_stencil.is_some())
            + self.subpass_resolves().count()
    }

    /// Index of `slot` in the packed native attachment array.
    pub fn packed_index(&self, slot: AttachmentSlot) -> Option<usize> {
        match slot {
            AttachmentSlot::Color(index) => {
                self.color(index)?;
                Some(
                    self.colors[..index as usize]
                        .iter()
                        .filter(|ops| ops.is_some())
                        .count(),
                )
            }
            AttachmentSlot::DepthStencil => {
                self.depth_stencil.map(|_| self.enabled_color_count())
            }
        }
    }

    pub fn samples(&self) -> RHISampleCountFlagBits {
        self.colors
            .iter()
            .flatten()
            .map(|ops| ops.samples)
            .chain(self.depth_stencil.iter().map(|ops| ops.samples))
            .next()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockApi, ViewFactory};
    use crate::DrawBufferMask;

    fn options() -> RenderPassOptions {
        RenderPassOptions {
            subpass_resolve_supported: true,
            ..Default::default()
        }
    }

    #[test]
    fn load_ops_follow_contents_and_clears() {
        let factory = ViewFactory::new();
        let mut targets = RenderTargets::<MockApi>::new();
        targets.update_attachment(
            AttachmentSlot::Color(0),
            Some(factory.color(RHIFormat::R8G8B8A8_UNORM, 16, 16)),
        );
        targets.update_attachment(
            AttachmentSlot::Color(1),
            Some(factory.color_defined(RHIFormat::R8G8B8A8_UNORM, 16, 16)),
        );

        let desc = RenderPassDesc::build(&targets, &LoadOpClearMask::default(), &options());
        assert_eq!(desc.color(0).map(|c| c.load_op), Some(RHIAttachmentLoadOp::DONT_CARE));
        assert_eq!(desc.color(1).map(|c| c.load_op), Some(RHIAttachmentLoadOp::LOAD));

        let clears = LoadOpClearMask {
            colors: DrawBufferMask::from_indices([1]),
            ..Default::default()
        };
        let cleared = RenderPassDesc::build(&targets, &clears, &options());
        assert_eq!(cleared.color(1).map(|c| c.load_op), Some(RHIAttachmentLoadOp::CLEAR));
        assert_ne!(desc, cleared);
    }

    #[test]
    fn gaps_are_part_of_the_key() {
        let factory = ViewFactory::new();
        let view = factory.color(RHIFormat::R8G8B8A8_UNORM, 16, 16);

        let mut first = RenderTargets::<MockApi>::new();
        first.update_attachment(AttachmentSlot::Color(0), Some(view));
        let mut second = RenderTargets::<MockApi>::new();
        second.update_attachment(AttachmentSlot::Color(1), Some(view));

        let a = RenderPassDesc::build(&first, &LoadOpClearMask::default(), &options());
        let b = RenderPassDesc::build(&second, &LoadOpClearMask::default(), &options());
        assert_ne!(a, b);
        assert_eq!(b.packed_index(AttachmentSlot::Color(1)), Some(0));
        assert_eq!(b.packed_index(AttachmentSlot::Color(0)), None);
    }

    #[test]
    fn resolve_mode_depends_on_device_support() {
        let factory = ViewFactory::new();
        let mut targets = RenderTargets::<MockApi>::new();
        targets.update_attachment(
            AttachmentSlot::Color(0),
            Some(factory.color_ms(RHIFormat::R8G8B8A8_UNORM, 16, 16, RHISampleCountFlagBits::TYPE_4)),
        );
        targets.update_color_resolve(0, Some(factory.resolve()));

        let subpass = RenderPassDesc::build(&targets, &LoadOpClearMask::default(), &options());
        assert_eq!(subpass.color(0).map(|c| c.resolve), Some(ResolveMode::Subpass));
        assert_eq!(subpass.attachment_count(), 2);

        let command = RenderPassDesc::build(
            &targets,
            &LoadOpClearMask::default(),
            &RenderPassOptions::default(),
        );
        assert_eq!(command.command_resolves().collect::<Vec<_>>(), vec![0]);
        assert_eq!(command.attachment_count(), 1);
    }

    #[test]
    fn depth_only_format_never_touches_stencil() {
        let factory = ViewFactory::new();
        let mut targets = RenderTargets::<MockApi>::new();
        targets.update_attachment(
            AttachmentSlot::DepthStencil,
            Some(factory.depth(RHIFormat::D32_SFLOAT, 16, 16)),
        );
        let clears = LoadOpClearMask {
            depth: true,
            stencil: true,
            ..Default::default()
        };
        let desc = RenderPassDesc::build(
            &targets,
            &clears,
            &RenderPassOptions {
                depth_read_only_feedback: true,
                ..options()
            },
        );
        let ds = desc.depth_stencil().copied().unwrap();
        assert_eq!(ds.load_op, RHIAttachmentLoadOp::CLEAR);
        assert_eq!(ds.stencil_load_op, RHIAttachmentLoadOp::DONT_CARE);
        assert_eq!(ds.stencil_store_op, RHIAttachmentStoreOp::DONT_CARE);
        assert_eq!(
            desc.depth_stencil_layout(),
            RHIImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(desc.packed_index(AttachmentSlot::DepthStencil), Some(0));
    }
}
