use arrayvec::ArrayVec;
use rhi_types::{RHIClearColorValue, RHIColorComponentFlags, RHIRect2D, RHISampleCountFlagBits};
use typed_builder::TypedBuilder;

use crate::attachment::{
    AttachmentSlot, AttachmentView, FramebufferStatus, RenderPassDescriptorDelta, RenderTargets,
    ResolveView,
};
use crate::cache::SharedFramebufferCache;
use crate::clear::{
    corrected_clear_color, stage_clears, AttachmentClear, DeferredClears, STENCIL_FULL_MASK,
};
use crate::feedback_loop::{FeedbackLoopMode, FeedbackLoopTracker, FeedbackTransition};
use crate::framebuffer_desc::FramebufferDesc;
use crate::render_pass::{RenderPassDesc, RenderPassOptions};
use crate::{
    Backend, CommandRecorder, CommandTarget, Device, DrawBufferMask, FramebufferCreateInfo,
    FramebufferError, FramebufferFeatures, IncompleteReason, ResolveCommand,
    MAX_COLOR_ATTACHMENTS,
};

/// Device and command buffer a framebuffer operation records into.
pub struct FrameContext<'a, A: Backend> {
    pub device: &'a A::Device,
    pub recorder: &'a mut A::CommandRecorder,
}

impl<'a, A: Backend> FrameContext<'a, A> {
    pub fn new(device: &'a A::Device, recorder: &'a mut A::CommandRecorder) -> Self {
        Self { device, recorder }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapchainResolveMode {
    #[default]
    Disabled,
    /// Color 0 resolves into the presentation image inside the render pass.
    Enabled,
}

#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct ClearRequest {
    #[builder(default)]
    pub color_buffers: DrawBufferMask,
    #[builder(default)]
    pub color: RHIClearColorValue,
    #[builder(default = RHIColorComponentFlags::RGBA)]
    pub color_mask: RHIColorComponentFlags,
    #[builder(default, setter(strip_option))]
    pub depth: Option<f32>,
    #[builder(default, setter(strip_option))]
    pub stencil: Option<u32>,
    #[builder(default = STENCIL_FULL_MASK)]
    pub stencil_write_mask: u32,
    #[builder(default, setter(strip_option))]
    pub scissor: Option<RHIRect2D>,
}

#[derive(Debug, Clone, Copy, Default)]
struct InvalidatedAttachments {
    colors: DrawBufferMask,
    depth_stencil: bool,
}

#[derive(Debug)]
struct OpenRenderPass {
    render_pass: RenderPassDesc,
    render_area: RHIRect2D,
    depth_mode: FeedbackLoopMode,
    invalidated: InvalidatedAttachments,
}

/// Mutable framebuffer state bound to immutable native objects.
///
/// Attachment updates, clears and feedback-loop changes only touch the
/// descriptors here. Native framebuffers are looked up in, or added to, the
/// shared cache when a render pass starts.
pub struct Framebuffer<A: Backend> {
    features: FramebufferFeatures,
    cache: SharedFramebufferCache<A>,
    targets: RenderTargets<A>,
    render_pass_desc: RenderPassDesc,
    deferred_clears: DeferredClears,
    feedback: FeedbackLoopTracker,
    framebuffer_fetch: bool,
    current_framebuffer: Option<A::Framebuffer>,
    last_render_pass: Option<RenderPassDesc>,
    open_render_pass: Option<OpenRenderPass>,
}

impl<A: Backend> Framebuffer<A> {
    pub fn new(features: FramebufferFeatures, cache: SharedFramebufferCache<A>) -> Self {
        Self {
            features,
            cache,
            targets: RenderTargets::new(),
            render_pass_desc: RenderPassDesc::default(),
            deferred_clears: DeferredClears::new(),
            feedback: FeedbackLoopTracker::new(),
            framebuffer_fetch: false,
            current_framebuffer: None,
            last_render_pass: None,
            open_render_pass: None,
        }
    }

    pub fn features(&self) -> &FramebufferFeatures {
        &self.features
    }

    pub fn targets(&self) -> &RenderTargets<A> {
        &self.targets
    }

    pub fn render_pass_desc(&self) -> &RenderPassDesc {
        &self.render_pass_desc
    }

    pub fn samples(&self) -> RHISampleCountFlagBits {
        self.targets.samples()
    }

    pub fn check_status(&self) -> FramebufferStatus {
        self.targets.check_status()
    }

    pub fn has_deferred_clears(&self) -> bool {
        !self.deferred_clears.is_empty()
    }

    pub fn deferred_clears(&self) -> &DeferredClears {
        &self.deferred_clears
    }

    pub fn is_render_pass_open(&self) -> bool {
        self.open_render_pass.is_some()
    }

    /// The framebuffer used by the last started render pass. Owned by the cache.
    pub fn current_framebuffer(&self) -> Option<A::Framebuffer> {
        self.current_framebuffer
    }

    pub fn has_framebuffer_fetch(&self) -> bool {
        self.framebuffer_fetch
    }

    pub fn is_read_only_depth_feedback_loop_mode(&self) -> bool {
        self.feedback.is_read_only_depth()
    }

    fn render_pass_options(&self, swapchain_resolve: bool) -> RenderPassOptions {
        RenderPassOptions {
            framebuffer_fetch: self.framebuffer_fetch,
            depth_read_only_feedback: self.feedback.is_read_only_depth(),
            swapchain_resolve,
            subpass_resolve_supported: self.features.subpass_resolve,
        }
    }

    fn refresh_render_pass_desc(&mut self) -> bool {
        let clears = self.deferred_clears.load_op_mask(&self.targets);
        let desc = RenderPassDesc::build(&self.targets, &clears, &self.render_pass_options(false));
        let changed = desc != self.render_pass_desc;
        self.render_pass_desc = desc;
        changed
    }

    /// Binds `view` to `slot`, or unbinds it with `None`.
    ///
    /// An open render pass is ended first, and clears still queued for the
    /// outgoing attachment are staged against it.
    pub fn update_attachment(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        slot: AttachmentSlot,
        view: Option<AttachmentView<A>>,
    ) -> RenderPassDescriptorDelta {
        if let AttachmentSlot::Color(index) = slot {
            assert!(
                (index as usize) < MAX_COLOR_ATTACHMENTS
                    && index < self.features.max_color_attachments,
                "color attachment {index} out of range"
            );
        }
        if self.targets.delta_for(slot, view.as_ref()) == RenderPassDescriptorDelta::Unchanged {
            return RenderPassDescriptorDelta::Unchanged;
        }

        self.end_render_pass(ctx);
        if self.deferred_clears.contains(slot) {
            let clears = self.deferred_clears.take_slot(slot);
            stage_clears(&self.targets, &mut *ctx.recorder, clears);
        }
        self.targets.update_attachment(slot, view);
        if slot == AttachmentSlot::DepthStencil {
            self.feedback.on_attachment_changed();
        }
        self.current_framebuffer = None;

        if self.refresh_render_pass_desc() {
            RenderPassDescriptorDelta::RenderPass
        } else {
            RenderPassDescriptorDelta::CacheKeyOnly
        }
    }

    pub fn update_color_resolve(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        index: u32,
        resolve: ResolveView<A>,
    ) -> RenderPassDescriptorDelta {
        self.set_color_resolve(ctx, index, Some(resolve))
    }

    pub fn remove_color_resolve(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        index: u32,
    ) -> RenderPassDescriptorDelta {
        self.set_color_resolve(ctx, index, None)
    }

    fn set_color_resolve(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        index: u32,
        resolve: Option<ResolveView<A>>,
    ) -> RenderPassDescriptorDelta {
        assert!(
            (index as usize) < MAX_COLOR_ATTACHMENTS && index < self.features.max_color_attachments,
            "color resolve {index} out of range"
        );
        let unchanged = match (self.targets.color_resolve(index), resolve.as_ref()) {
            (None, None) => true,
            (Some(old), Some(new)) => old.serial == new.serial,
            _ => false,
        };
        if unchanged {
            return RenderPassDescriptorDelta::Unchanged;
        }
        self.end_render_pass(ctx);
        self.targets.update_color_resolve(index, resolve);
        self.current_framebuffer = None;
        if self.refresh_render_pass_desc() {
            RenderPassDescriptorDelta::RenderPass
        } else {
            RenderPassDescriptorDelta::CacheKeyOnly
        }
    }

    /// Clears the requested attachments.
    ///
    /// Full-area clears issued outside of a render pass are queued and folded
    /// into the next render pass. Everything else is recorded right away,
    /// after any clears that are already queued.
    pub fn clear(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        request: &ClearRequest,
    ) -> Result<(), FramebufferError> {
        profiling::scope!("Framebuffer::clear");
        let extent = self.targets.extent();
        let full = RHIRect2D::from_extent(extent);
        let area = request.scissor.map_or(full, |scissor| scissor.intersect(&full));
        if area.extent.is_empty() {
            return Ok(());
        }

        let mut clears = ArrayVec::<AttachmentClear, { MAX_COLOR_ATTACHMENTS + 2 }>::new();
        if !request.color_mask.is_empty() {
            for index in request.color_buffers.iter() {
                if self.targets.color(index).is_some() {
                    clears.push(AttachmentClear::Color {
                        index,
                        value: request.color,
                        mask: request.color_mask,
                    });
                }
            }
        }
        if let Some(format) = self.targets.depth_stencil().map(|view| view.format) {
            if let (Some(depth), true) = (request.depth, format.has_depth()) {
                clears.push(AttachmentClear::Depth(depth));
            }
            if let (Some(stencil), true) = (request.stencil, format.has_stencil()) {
                if request.stencil_write_mask & STENCIL_FULL_MASK != 0 {
                    clears.push(AttachmentClear::Stencil {
                        value: stencil,
                        write_mask: request.stencil_write_mask & STENCIL_FULL_MASK,
                    });
                }
            }
        }
        if clears.is_empty() {
            return Ok(());
        }

        let writes_depth_stencil = clears
            .iter()
            .any(|clear| clear.slot() == AttachmentSlot::DepthStencil);
        if writes_depth_stencil && self.feedback.is_read_only_depth() {
            let transition = self.feedback.set_mode(FeedbackLoopMode::Normal);
            self.on_feedback_transition(ctx, transition);
        }

        if self.features.defer_clears && area.covers(extent) && self.open_render_pass.is_none() {
            log::trace!("deferring {} clears", clears.len());
            for clear in clears {
                self.deferred_clears.enqueue(clear);
            }
            self.refresh_render_pass_desc();
            return Ok(());
        }

        self.flush_deferred_clears(ctx)?;
        match self.open_render_pass.as_ref().map(|open| open.render_area) {
            None => {
                self.start_new_render_pass(ctx, area)?;
            }
            Some(render_area) if !render_area.contains(&area) => {
                log::debug!("render area {:?} does not cover the clear, restarting", render_area);
                self.start_new_render_pass(ctx, render_area.union(&area))?;
            }
            Some(_) => {}
        }

        let mut unmasked = ArrayVec::<AttachmentClear, { MAX_COLOR_ATTACHMENTS + 2 }>::new();
        let mut masked = ArrayVec::<AttachmentClear, { MAX_COLOR_ATTACHMENTS + 2 }>::new();
        for clear in clears {
            let view = match self.targets.attachment(clear.slot()) {
                Some(view) => view,
                None => continue,
            };
            let clear = match clear {
                AttachmentClear::Color { index, value, mask } => AttachmentClear::Color {
                    index,
                    value: corrected_clear_color(view, value),
                    mask,
                },
                other => other,
            };
            if clear.is_masked(view) || self.features.prefer_draw_clear_over_clear_attachments {
                masked.push(clear);
            } else {
                unmasked.push(clear);
            }
        }
        if !unmasked.is_empty() {
            ctx.recorder.clear_attachments(&unmasked, area);
        }
        if !masked.is_empty() {
            ctx.recorder.clear_with_draw(&masked, area);
        }
        Ok(())
    }

    /// Looks up or creates the framebuffer matching the current state.
    pub fn get_framebuffer(
        &mut self,
        device: &A::Device,
        resolve_view: Option<&ResolveView<A>>,
        mode: SwapchainResolveMode,
    ) -> Result<A::Framebuffer, FramebufferError> {
        self.targets
            .check_status()
            .into_result()
            .map_err(FramebufferError::Incomplete)?;
        let swapchain_resolve = match mode {
            SwapchainResolveMode::Enabled => {
                self.check_swapchain_resolve(resolve_view.is_some())
                    .map_err(FramebufferError::Incomplete)?;
                resolve_view
            }
            SwapchainResolveMode::Disabled => None,
        };
        let render_pass = if swapchain_resolve.is_some() {
            let clears = self.deferred_clears.load_op_mask(&self.targets);
            RenderPassDesc::build(&self.targets, &clears, &self.render_pass_options(true))
        } else {
            self.render_pass_desc.clone()
        };
        self.framebuffer_for(device, &render_pass, swapchain_resolve)
    }

    /// The presentation image can only be written by a subpass resolve of a
    /// multisampled color 0.
    fn check_swapchain_resolve(&self, has_view: bool) -> Result<(), IncompleteReason> {
        let multisampled = self
            .targets
            .color(0)
            .map_or(false, |view| view.samples.is_multisampled());
        if has_view && multisampled && self.features.subpass_resolve {
            Ok(())
        } else {
            log::warn!(
                "swapchain resolve rejected: view bound {has_view}, multisampled {multisampled}, subpass resolve {}",
                self.features.subpass_resolve
            );
            Err(IncompleteReason::InvalidResolve)
        }
    }

    fn framebuffer_for(
        &mut self,
        device: &A::Device,
        render_pass: &RenderPassDesc,
        swapchain_resolve: Option<&ResolveView<A>>,
    ) -> Result<A::Framebuffer, FramebufferError> {
        let desc = FramebufferDesc::new(
            &self.targets,
            render_pass.clone(),
            swapchain_resolve.map(|resolve| resolve.serial),
        );
        let mut cache = self.cache.lock();
        if let Some(framebuffer) = cache.get(&desc) {
            self.current_framebuffer = Some(framebuffer);
            return Ok(framebuffer);
        }

        profiling::scope!("Framebuffer::create");
        let views = self.targets.packed_views(render_pass, swapchain_resolve);
        let framebuffer = device.create_framebuffer(&FramebufferCreateInfo {
            label: None,
            render_pass,
            attachments: &views,
            extent: desc.extent(),
            layers: desc.layers(),
        })?;
        log::debug!(
            "created framebuffer {:?}: {} attachments, {}x{}x{}",
            framebuffer,
            views.len(),
            desc.extent().width,
            desc.extent().height,
            desc.layers()
        );
        cache.insert(desc, framebuffer);
        self.current_framebuffer = Some(framebuffer);
        Ok(framebuffer)
    }

    /// Ends the open render pass, if any, and begins a new one covering
    /// `render_area`. Queued clears become load ops or in-pass clears of the
    /// new render pass.
    ///
    /// Also returns whether the render pass differs from the previously started one.
    pub fn start_new_render_pass(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        render_area: RHIRect2D,
    ) -> Result<(CommandTarget<A>, bool), FramebufferError> {
        profiling::scope!("Framebuffer::start_new_render_pass");
        self.end_render_pass(ctx);
        if let Err(reason) = self.targets.check_status().into_result() {
            log::warn!("cannot start render pass: {reason}");
            return Err(FramebufferError::Incomplete(reason));
        }

        let drained = self.deferred_clears.drain(&self.targets);
        let render_pass = RenderPassDesc::build(
            &self.targets,
            &drained.load_ops,
            &self.render_pass_options(false),
        );
        let framebuffer = match self.framebuffer_for(ctx.device, &render_pass, None) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                log::warn!("render pass not started, keeping queued clears: {err}");
                self.deferred_clears.restore(drained);
                return Err(err);
            }
        };

        let full = RHIRect2D::from_extent(self.targets.extent());
        let render_area = if drained.is_empty() {
            render_area.intersect(&full)
        } else {
            full
        };
        let target = CommandTarget {
            framebuffer,
            render_pass: render_pass.clone(),
            render_area,
            layers: self.targets.layer_count(),
            clear_values: drained.packed_clear_values(&render_pass),
            depth_stencil_layout: render_pass.depth_stencil_layout(),
        };
        ctx.recorder.begin_render_pass(&target);
        if !drained.draw_clears.is_empty() {
            ctx.recorder.clear_with_draw(&drained.draw_clears, render_area);
        }

        let changed = self.last_render_pass.as_ref() != Some(&render_pass);
        self.last_render_pass = Some(render_pass.clone());
        self.open_render_pass = Some(OpenRenderPass {
            render_pass,
            render_area,
            depth_mode: self.feedback.mode(),
            invalidated: InvalidatedAttachments::default(),
        });
        self.refresh_render_pass_desc();
        Ok((target, changed))
    }

    /// Panics if the open render pass binds depth/stencil in a layout other
    /// than the one the feedback loop mode requires.
    pub fn assert_draw_compatible(&self) {
        if let Some(open) = &self.open_render_pass {
            assert_eq!(
                open.depth_mode,
                self.feedback.mode(),
                "render pass depth/stencil layout does not match the feedback loop mode"
            );
        }
    }

    pub fn end_render_pass(&mut self, ctx: &mut FrameContext<'_, A>) {
        let open = match self.open_render_pass.take() {
            Some(open) => open,
            None => return,
        };
        ctx.recorder.end_render_pass();

        for index in open.render_pass.command_resolves() {
            if let (Some(color), Some(resolve)) =
                (self.targets.color(index), self.targets.color_resolve(index))
            {
                ctx.recorder.resolve_color(ResolveCommand {
                    color_index: index,
                    src: color.view,
                    dst: resolve.view,
                    area: open.render_area,
                });
            }
        }

        for (index, ops) in open.render_pass.color_attachments() {
            if ops.is_some() {
                self.targets.set_contents_defined(
                    AttachmentSlot::Color(index),
                    !open.invalidated.colors.test(index),
                );
            }
        }
        if open.render_pass.depth_stencil().is_some() {
            if open.invalidated.depth_stencil {
                self.targets
                    .set_contents_defined(AttachmentSlot::DepthStencil, false);
            } else if open.depth_mode == FeedbackLoopMode::Normal {
                self.targets
                    .set_contents_defined(AttachmentSlot::DepthStencil, true);
            }
        }
        self.refresh_render_pass_desc();
        log::trace!("render pass ended");
    }

    /// Starts a render pass so that queued clears are executed. No-op when
    /// nothing is queued.
    pub fn flush_deferred_clears(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
    ) -> Result<(), FramebufferError> {
        if self.deferred_clears.is_empty() {
            return Ok(());
        }
        let full = RHIRect2D::from_extent(self.targets.extent());
        self.start_new_render_pass(ctx, full).map(|_| ())
    }

    /// Records every queued clear as an explicit clear of the attachment contents.
    pub fn redefer_clears(&mut self, ctx: &mut FrameContext<'_, A>) {
        debug_assert!(self.open_render_pass.is_none() || self.deferred_clears.is_empty());
        let slots: Vec<AttachmentSlot> = self
            .deferred_clears
            .entries()
            .iter()
            .map(AttachmentClear::slot)
            .collect();
        let staged = self
            .deferred_clears
            .redefer(&self.targets, &mut *ctx.recorder);
        if staged > 0 {
            log::debug!("redeferred {staged} clears");
            for slot in slots {
                self.targets.set_contents_defined(slot, true);
            }
            self.refresh_render_pass_desc();
        }
    }

    pub fn set_read_only_depth_feedback_loop_mode(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        enabled: bool,
    ) {
        let mode = if enabled {
            FeedbackLoopMode::ReadOnlyDepth
        } else {
            FeedbackLoopMode::Normal
        };
        let transition = self.feedback.set_mode(mode);
        self.on_feedback_transition(ctx, transition);
    }

    /// Called whenever sampled textures or depth write state change.
    pub fn update_depth_feedback(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        depth_sampled: bool,
        depth_writes_disabled: bool,
    ) {
        if self.targets.depth_stencil().is_none() {
            return;
        }
        let transition = self.feedback.update(depth_sampled, depth_writes_disabled);
        self.on_feedback_transition(ctx, transition);
    }

    fn on_feedback_transition(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        transition: Option<FeedbackTransition>,
    ) {
        let transition = match transition {
            Some(transition) => transition,
            None => return,
        };
        self.end_render_pass(ctx);
        // A read-only render pass cannot execute depth/stencil clears.
        if transition.to == FeedbackLoopMode::ReadOnlyDepth
            && self.deferred_clears.contains(AttachmentSlot::DepthStencil)
        {
            let clears = self.deferred_clears.take_slot(AttachmentSlot::DepthStencil);
            if stage_clears(&self.targets, &mut *ctx.recorder, clears) > 0 {
                self.targets
                    .set_contents_defined(AttachmentSlot::DepthStencil, true);
            }
        }
        self.refresh_render_pass_desc();
    }

    pub fn on_switch_program_framebuffer_fetch(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
        uses_framebuffer_fetch: bool,
    ) {
        if self.framebuffer_fetch == uses_framebuffer_fetch {
            return;
        }
        self.end_render_pass(ctx);
        self.framebuffer_fetch = uses_framebuffer_fetch;
        self.refresh_render_pass_desc();
    }

    /// Marks the contents of `slots` as no longer needed.
    pub fn invalidate(&mut self, slots: &[AttachmentSlot]) {
        if let Some(open) = &mut self.open_render_pass {
            for slot in slots {
                match *slot {
                    AttachmentSlot::Color(index) => open.invalidated.colors.set(index),
                    AttachmentSlot::DepthStencil => open.invalidated.depth_stencil = true,
                }
            }
            return;
        }
        for slot in slots {
            self.targets.set_contents_defined(*slot, false);
        }
        self.refresh_render_pass_desc();
    }

    /// Like [`invalidate`](Self::invalidate), restricted to `area`. Contents
    /// are only dropped when `area` covers the whole framebuffer or the open
    /// render area; a smaller region is left untouched.
    pub fn invalidate_sub(&mut self, slots: &[AttachmentSlot], area: RHIRect2D) {
        let covers_framebuffer = area.covers(self.targets.extent());
        let covers_render_area = self
            .open_render_pass
            .as_ref()
            .map_or(false, |open| area.contains(&open.render_area));
        if covers_framebuffer || covers_render_area {
            self.invalidate(slots);
        } else {
            log::trace!("partial invalidate of {:?} ignored", area);
        }
    }

    /// Makes the attachment contents visible to reads outside of a render pass.
    pub fn prepare_for_read(
        &mut self,
        ctx: &mut FrameContext<'_, A>,
    ) -> Result<(), FramebufferError> {
        self.flush_deferred_clears(ctx)?;
        self.end_render_pass(ctx);
        Ok(())
    }

    /// Detaches from the command stream. Queued clears are staged so that
    /// none of them is lost.
    pub fn release(&mut self, ctx: &mut FrameContext<'_, A>) {
        self.end_render_pass(ctx);
        self.redefer_clears(ctx);
        self.current_framebuffer = None;
        self.last_render_pass = None;
    }
}

#[cfg(test)]
#[path = "framebuffer_tests.rs"]
mod tests;
