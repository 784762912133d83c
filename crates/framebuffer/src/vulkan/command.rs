use std::sync::Arc;

use arrayvec::ArrayVec;
use ash::vk;
use rhi_types::RHIRect2D;

use super::{conv, Api, CommandRecorder, Device, MaskedClearPipeline, PendingImageWork};
use crate::clear::{AttachmentClear, StagedClear};
use crate::serial::QueueSerial;
use crate::{CommandTarget, ResolveCommand, MAX_FRAMEBUFFER_ATTACHMENTS};

impl CommandRecorder {
    /// `raw` must be in the recording state for as long as this recorder is used.
    pub fn new(
        device: &Device,
        raw: vk::CommandBuffer,
        serial: QueueSerial,
        masked_clear: Arc<dyn MaskedClearPipeline>,
    ) -> Self {
        Self {
            raw,
            device: Arc::clone(device.shared()),
            serial,
            masked_clear,
            layer_count: 1,
            in_render_pass: false,
            pending: Vec::new(),
        }
    }

    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    /// Starts recording the next submission into `raw`.
    pub fn reset(&mut self, raw: vk::CommandBuffer, serial: QueueSerial) {
        if !self.pending.is_empty() {
            log::warn!(
                "{} pending image operations dropped on recorder reset",
                self.pending.len()
            );
        }
        self.raw = raw;
        self.serial = serial;
        self.in_render_pass = false;
        self.pending.clear();
    }

    /// Staged clears and command resolves, in the order they were recorded.
    pub fn take_pending(&mut self) -> Vec<PendingImageWork> {
        std::mem::take(&mut self.pending)
    }

    /// False when `begin_render_pass` could not open a render pass.
    pub fn is_render_pass_open(&self) -> bool {
        self.in_render_pass
    }

    fn check_in_render_pass(&self, command: &str) -> bool {
        if !self.in_render_pass {
            log::error!("{command} dropped: no render pass is open");
        }
        self.in_render_pass
    }

    fn clear_rect(&self, area: RHIRect2D) -> vk::ClearRect {
        vk::ClearRect {
            rect: conv::map_rect2d(area),
            base_array_layer: 0,
            layer_count: self.layer_count,
        }
    }
}

/// Render passes are created together with their framebuffers, so a miss
/// means they were freed while framebuffers still referenced them.
fn require_render_pass(
    render_pass: Option<vk::RenderPass>,
    framebuffer: vk::Framebuffer,
) -> Option<vk::RenderPass> {
    debug_assert!(
        render_pass.is_some(),
        "no render pass was created for framebuffer {:?}",
        framebuffer
    );
    if render_pass.is_none() {
        log::error!("no render pass was created for framebuffer {:?}", framebuffer);
    }
    render_pass
}

impl crate::CommandRecorder<Api> for CommandRecorder {
    fn begin_render_pass(&mut self, target: &CommandTarget<Api>) {
        let render_pass = match require_render_pass(
            self.device.cached_render_pass(&target.render_pass),
            target.framebuffer,
        ) {
            Some(render_pass) => render_pass,
            None => return,
        };
        let clear_values: ArrayVec<vk::ClearValue, MAX_FRAMEBUFFER_ATTACHMENTS> = target
            .clear_values
            .iter()
            .map(|value| conv::map_clear_value(*value))
            .collect();
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(target.framebuffer)
            .render_area(conv::map_rect2d(target.render_area))
            .clear_values(&clear_values)
            .build();

        self.layer_count = target.layers;
        self.in_render_pass = true;
        unsafe {
            self.device.raw().cmd_begin_render_pass(
                self.raw,
                &begin_info,
                vk::SubpassContents::INLINE,
            )
        };
    }

    fn end_render_pass(&mut self) {
        if !std::mem::take(&mut self.in_render_pass) {
            log::error!("end_render_pass without a render pass");
            return;
        }
        unsafe { self.device.raw().cmd_end_render_pass(self.raw) };
    }

    fn clear_attachments(&mut self, clears: &[AttachmentClear], area: RHIRect2D) {
        if !self.check_in_render_pass("clear_attachments") {
            return;
        }
        let attachments: Vec<vk::ClearAttachment> =
            clears.iter().map(conv::map_attachment_clear).collect();
        let rects = [self.clear_rect(area)];
        unsafe {
            self.device
                .raw()
                .cmd_clear_attachments(self.raw, &attachments, &rects)
        };
    }

    fn clear_with_draw(&mut self, clears: &[AttachmentClear], area: RHIRect2D) {
        if !self.check_in_render_pass("clear_with_draw") {
            return;
        }
        unsafe {
            self.masked_clear.record(
                self.device.raw(),
                self.raw,
                clears,
                conv::map_rect2d(area),
                self.layer_count,
            )
        };
    }

    fn stage_clear(&mut self, clear: StagedClear<Api>) {
        self.pending.push(PendingImageWork::Clear(clear));
    }

    fn resolve_color(&mut self, resolve: ResolveCommand<Api>) {
        self.pending.push(PendingImageWork::Resolve(resolve));
    }

    fn queue_serial(&self) -> QueueSerial {
        self.serial
    }
}
