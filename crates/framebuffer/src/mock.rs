//! Recording backend used by unit tests.

use std::cell::{Cell, RefCell};

use rhi_types::{RHIExtent2D, RHIFormat, RHIRect2D, RHISampleCountFlagBits};

use crate::attachment::{AttachmentView, ResolveView};
use crate::clear::{AttachmentClear, ClearValue, StagedClear};
use crate::framebuffer::FrameContext;
use crate::render_pass::RenderPassDesc;
use crate::serial::{QueueSerial, SerialFactory};
use crate::{
    Backend, CommandRecorder, CommandTarget, Device, DeviceError, FramebufferCreateInfo,
    FramebufferFeatures, ResolveCommand,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Copy)]
pub struct MockApi;

impl Backend for MockApi {
    type Device = MockDevice;
    type CommandRecorder = MockRecorder;
    type ImageView = u64;
    type Framebuffer = MockFramebuffer;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockFramebuffer(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedFramebuffer {
    pub framebuffer: MockFramebuffer,
    pub render_pass: RenderPassDesc,
    pub attachments: Vec<u64>,
    pub extent: RHIExtent2D,
    pub layers: u32,
}

#[derive(Default)]
pub struct MockDevice {
    features: FramebufferFeatures,
    next_handle: Cell<u64>,
    fail_next_create: Cell<Option<DeviceError>>,
    created: RefCell<Vec<CreatedFramebuffer>>,
    destroyed: RefCell<Vec<MockFramebuffer>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_features(FramebufferFeatures::default())
    }

    pub fn with_features(features: FramebufferFeatures) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    pub fn fail_next_create(&self, error: DeviceError) {
        self.fail_next_create.set(Some(error));
    }

    pub fn created(&self) -> Vec<CreatedFramebuffer> {
        self.created.borrow().clone()
    }

    pub fn destroyed(&self) -> Vec<MockFramebuffer> {
        self.destroyed.borrow().clone()
    }
}

impl Device<MockApi> for MockDevice {
    fn features(&self) -> &FramebufferFeatures {
        &self.features
    }

    fn create_framebuffer(
        &self,
        info: &FramebufferCreateInfo<'_, MockApi>,
    ) -> Result<MockFramebuffer, DeviceError> {
        if let Some(error) = self.fail_next_create.take() {
            return Err(error);
        }
        assert_eq!(info.attachments.len(), info.render_pass.attachment_count());
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        let framebuffer = MockFramebuffer(handle);
        self.created.borrow_mut().push(CreatedFramebuffer {
            framebuffer,
            render_pass: info.render_pass.clone(),
            attachments: info.attachments.to_vec(),
            extent: info.extent,
            layers: info.layers,
        });
        Ok(framebuffer)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: MockFramebuffer) {
        self.destroyed.borrow_mut().push(framebuffer);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        framebuffer: MockFramebuffer,
        render_pass: RenderPassDesc,
        render_area: RHIRect2D,
        clear_values: Vec<Option<ClearValue>>,
    },
    EndRenderPass,
    ClearAttachments {
        clears: Vec<AttachmentClear>,
        area: RHIRect2D,
    },
    ClearWithDraw {
        clears: Vec<AttachmentClear>,
        area: RHIRect2D,
    },
    StageClear {
        view: u64,
        clear: AttachmentClear,
    },
    ResolveColor {
        color_index: u32,
        src: u64,
        dst: u64,
    },
}

#[derive(Debug, Default)]
pub struct MockRecorder {
    serial: QueueSerial,
    commands: Vec<Command>,
}

impl MockRecorder {
    pub fn new() -> Self {
        Self {
            serial: QueueSerial::from(1),
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Short names of the recorded commands, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .map(|command| match command {
                Command::BeginRenderPass { .. } => "begin",
                Command::EndRenderPass => "end",
                Command::ClearAttachments { .. } => "clear_attachments",
                Command::ClearWithDraw { .. } => "clear_with_draw",
                Command::StageClear { .. } => "stage_clear",
                Command::ResolveColor { .. } => "resolve",
            })
            .collect()
    }
}

impl CommandRecorder<MockApi> for MockRecorder {
    fn begin_render_pass(&mut self, target: &CommandTarget<MockApi>) {
        self.commands.push(Command::BeginRenderPass {
            framebuffer: target.framebuffer,
            render_pass: target.render_pass.clone(),
            render_area: target.render_area,
            clear_values: target.clear_values.to_vec(),
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    fn clear_attachments(&mut self, clears: &[AttachmentClear], area: RHIRect2D) {
        self.commands.push(Command::ClearAttachments {
            clears: clears.to_vec(),
            area,
        });
    }

    fn clear_with_draw(&mut self, clears: &[AttachmentClear], area: RHIRect2D) {
        self.commands.push(Command::ClearWithDraw {
            clears: clears.to_vec(),
            area,
        });
    }

    fn stage_clear(&mut self, clear: StagedClear<MockApi>) {
        self.commands.push(Command::StageClear {
            view: clear.view,
            clear: clear.clear,
        });
    }

    fn resolve_color(&mut self, resolve: ResolveCommand<MockApi>) {
        self.commands.push(Command::ResolveColor {
            color_index: resolve.color_index,
            src: resolve.src,
            dst: resolve.dst,
        });
    }

    fn queue_serial(&self) -> QueueSerial {
        self.serial
    }
}

/// Device plus recorder, handing out [`FrameContext`]s.
#[derive(Default)]
pub struct MockContext {
    pub device: MockDevice,
    pub recorder: MockRecorder,
}

impl MockContext {
    pub fn new() -> Self {
        Self::with_features(FramebufferFeatures::default())
    }

    pub fn with_features(features: FramebufferFeatures) -> Self {
        Self {
            device: MockDevice::with_features(features),
            recorder: MockRecorder::new(),
        }
    }

    pub fn frame(&mut self) -> FrameContext<'_, MockApi> {
        FrameContext::new(&self.device, &mut self.recorder)
    }
}

/// Makes attachment views with fresh serials and view handles.
#[derive(Debug, Default)]
pub struct ViewFactory {
    serials: SerialFactory,
}

impl ViewFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serials(&self) -> &SerialFactory {
        &self.serials
    }

    fn view(
        &self,
        format: RHIFormat,
        width: u32,
        height: u32,
        samples: RHISampleCountFlagBits,
        layer_count: u32,
    ) -> AttachmentView<MockApi> {
        AttachmentView::<MockApi>::builder()
            .view(self.serials.generate::<u64>())
            .resource(self.serials.generate())
            .view_serial(self.serials.generate())
            .format(format)
            .samples(samples)
            .extent(RHIExtent2D::new(width, height))
            .layer_count(layer_count)
            .build()
    }

    pub fn color(&self, format: RHIFormat, width: u32, height: u32) -> AttachmentView<MockApi> {
        self.view(format, width, height, RHISampleCountFlagBits::TYPE_1, 1)
    }

    pub fn color_defined(
        &self,
        format: RHIFormat,
        width: u32,
        height: u32,
    ) -> AttachmentView<MockApi> {
        AttachmentView {
            contents_defined: true,
            ..self.color(format, width, height)
        }
    }

    pub fn color_layers(
        &self,
        format: RHIFormat,
        width: u32,
        height: u32,
        layers: u32,
    ) -> AttachmentView<MockApi> {
        self.view(format, width, height, RHISampleCountFlagBits::TYPE_1, layers)
    }

    pub fn color_ms(
        &self,
        format: RHIFormat,
        width: u32,
        height: u32,
        samples: RHISampleCountFlagBits,
    ) -> AttachmentView<MockApi> {
        self.view(format, width, height, samples, 1)
    }

    pub fn depth(&self, format: RHIFormat, width: u32, height: u32) -> AttachmentView<MockApi> {
        self.view(format, width, height, RHISampleCountFlagBits::TYPE_1, 1)
    }

    pub fn resolve(&self) -> ResolveView<MockApi> {
        ResolveView {
            view: self.serials.generate::<u64>(),
            serial: self.serials.generate(),
        }
    }
}
