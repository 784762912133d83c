use std::ffi::CStr;
use std::sync::Arc;

use ash::extensions::ext;
use ash::vk;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use rhi_types::{RHIAttachmentLoadOp, RHISampleCountFlagBits};

use super::{conv, Api, Device, DeviceShared};
use crate::render_pass::{RenderPassDesc, ResolveMode};
use crate::{DeviceError, FramebufferCreateInfo, FramebufferFeatures};

impl DeviceShared {
    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub unsafe fn set_object_name(
        &self,
        object_type: vk::ObjectType,
        object: impl vk::Handle,
        name: &str,
    ) {
        let debug_utils = match &self.debug_utils {
            Some(utils) => utils,
            None => return,
        };

        let mut buffer: [u8; 64] = [0u8; 64];
        let buffer_vec: Vec<u8>;

        let name_bytes = if name.len() < buffer.len() {
            buffer[..name.len()].copy_from_slice(name.as_bytes());
            buffer[name.len()] = 0;
            &buffer[..name.len() + 1]
        } else {
            buffer_vec = name
                .as_bytes()
                .iter()
                .cloned()
                .chain(std::iter::once(0))
                .collect();
            &buffer_vec
        };

        let name = match CStr::from_bytes_with_nul(name_bytes) {
            Ok(name) => name,
            Err(_) => return,
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(object_type)
            .object_handle(object.as_raw())
            .object_name(name)
            .build();
        let _result = debug_utils.set_debug_utils_object_name(self.raw.handle(), &name_info);
    }

    /// Render pass matching `desc`, created on first use.
    pub fn render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass, DeviceError> {
        let mut render_passes = self.render_passes.lock();
        if let Some(&render_pass) = render_passes.get(desc) {
            return Ok(render_pass);
        }
        let render_pass = unsafe { self.create_render_pass(desc)? };
        log::debug!(
            "created render pass {:?}: {} attachments",
            render_pass,
            desc.attachment_count()
        );
        render_passes.insert(desc.clone(), render_pass);
        Ok(render_pass)
    }

    pub(super) fn cached_render_pass(&self, desc: &RenderPassDesc) -> Option<vk::RenderPass> {
        self.render_passes.lock().get(desc).copied()
    }

    unsafe fn create_render_pass(
        &self,
        desc: &RenderPassDesc,
    ) -> Result<vk::RenderPass, DeviceError> {
        profiling::scope!("create_render_pass");

        let unused = vk::AttachmentReference {
            attachment: vk::ATTACHMENT_UNUSED,
            layout: vk::ImageLayout::UNDEFINED,
        };
        let color_layout = conv::map_image_layout(desc.color_layout());
        let mut attachments = Vec::with_capacity(desc.attachment_count());
        let mut color_refs = Vec::new();

        for (_, ops) in desc.color_attachments() {
            let ops = match ops {
                Some(ops) => ops,
                None => {
                    color_refs.push(unused);
                    continue;
                }
            };
            let initial_layout = if ops.load_op == RHIAttachmentLoadOp::LOAD {
                color_layout
            } else {
                vk::ImageLayout::UNDEFINED
            };
            color_refs.push(vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout: color_layout,
            });
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(conv::map_format(ops.format))
                    .samples(conv::map_sample_count(ops.samples))
                    .load_op(conv::map_load_op(ops.load_op))
                    .store_op(conv::map_store_op(ops.store_op))
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(initial_layout)
                    .final_layout(color_layout)
                    .build(),
            );
        }

        let depth_ref = desc.depth_stencil().map(|ops| {
            let layout = conv::map_image_layout(desc.depth_stencil_layout());
            let loads = ops.load_op == RHIAttachmentLoadOp::LOAD
                || ops.stencil_load_op == RHIAttachmentLoadOp::LOAD;
            let reference = vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout,
            };
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(conv::map_format(ops.format))
                    .samples(conv::map_sample_count(ops.samples))
                    .load_op(conv::map_load_op(ops.load_op))
                    .store_op(conv::map_store_op(ops.store_op))
                    .stencil_load_op(conv::map_load_op(ops.stencil_load_op))
                    .stencil_store_op(conv::map_store_op(ops.stencil_store_op))
                    .initial_layout(if loads {
                        layout
                    } else {
                        vk::ImageLayout::UNDEFINED
                    })
                    .final_layout(layout)
                    .build(),
            );
            reference
        });

        // Resolve references must line up with the color references.
        let mut resolve_refs = Vec::new();
        if desc.subpass_resolves().next().is_some() {
            for (_, ops) in desc.color_attachments() {
                match ops {
                    Some(ops) if ops.resolve == ResolveMode::Subpass => {
                        resolve_refs.push(vk::AttachmentReference {
                            attachment: attachments.len() as u32,
                            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                        });
                        attachments.push(
                            vk::AttachmentDescription::builder()
                                .format(conv::map_format(ops.format))
                                .samples(conv::map_sample_count(RHISampleCountFlagBits::TYPE_1))
                                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                                .store_op(vk::AttachmentStoreOp::STORE)
                                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                                .initial_layout(vk::ImageLayout::UNDEFINED)
                                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                                .build(),
                        );
                    }
                    _ => resolve_refs.push(unused),
                }
            }
        }

        let input_refs = if desc.has_framebuffer_fetch() {
            color_refs.clone()
        } else {
            Vec::new()
        };

        // avoid temporary array pointers: build the subpass from locals that outlive create_info
        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .input_attachments(&input_refs);
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass.build()];

        let dependencies = Self::get_dependencies(desc);
        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies)
            .build();

        Ok(self.raw.create_render_pass(&create_info, None)?)
    }

    fn get_dependencies(desc: &RenderPassDesc) -> Vec<vk::SubpassDependency> {
        let mut dependencies = vec![];
        if desc.enabled_color_count() > 0 {
            dependencies.push(
                vk::SubpassDependency::builder()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(0)
                    .src_stage_mask(
                        vk::PipelineStageFlags::FRAGMENT_SHADER
                            | vk::PipelineStageFlags::TRANSFER,
                    )
                    .src_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_WRITE)
                    .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .dst_access_mask(
                        vk::AccessFlags::COLOR_ATTACHMENT_READ
                            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    )
                    .build(),
            );
            dependencies.push(
                vk::SubpassDependency::builder()
                    .src_subpass(0)
                    .dst_subpass(vk::SUBPASS_EXTERNAL)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_stage_mask(
                        vk::PipelineStageFlags::FRAGMENT_SHADER
                            | vk::PipelineStageFlags::TRANSFER,
                    )
                    .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ)
                    .build(),
            );
        }

        if desc.depth_stencil().is_some() {
            let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            let depth_access = if desc.depth_read_only_feedback() {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            } else {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            };
            dependencies.push(
                vk::SubpassDependency::builder()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(0)
                    .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | depth_stages)
                    .src_access_mask(
                        vk::AccessFlags::SHADER_READ
                            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    )
                    .dst_stage_mask(depth_stages)
                    .dst_access_mask(depth_access)
                    .build(),
            );
            dependencies.push(
                vk::SubpassDependency::builder()
                    .src_subpass(0)
                    .dst_subpass(vk::SUBPASS_EXTERNAL)
                    .src_stage_mask(depth_stages)
                    .src_access_mask(depth_access)
                    .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ)
                    .build(),
            );
        }

        if desc.has_framebuffer_fetch() {
            dependencies.push(
                vk::SubpassDependency::builder()
                    .src_subpass(0)
                    .dst_subpass(0)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                    .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
                    .dependency_flags(vk::DependencyFlags::BY_REGION)
                    .build(),
            );
        }
        dependencies
    }

    /// Destroys every cached render pass. No command buffer may still use them.
    pub unsafe fn free_resources(&self) {
        let mut render_passes = self.render_passes.lock();
        log::debug!("destroying {} render passes", render_passes.len());
        for (_, render_pass) in render_passes.drain() {
            self.raw.destroy_render_pass(render_pass, None);
        }
    }
}

impl Device {
    /// Wraps an already created logical device. The device itself stays owned
    /// by the caller; only render passes created here are destroyed by
    /// [`DeviceShared::free_resources`].
    pub fn new(
        raw: ash::Device,
        debug_utils: Option<ext::DebugUtils>,
        features: FramebufferFeatures,
    ) -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                raw,
                debug_utils,
                render_passes: Mutex::new(FxHashMap::default()),
            }),
            features,
        }
    }

    pub fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn raw(&self) -> &ash::Device {
        &self.shared.raw
    }
}

impl crate::Device<Api> for Device {
    fn features(&self) -> &FramebufferFeatures {
        &self.features
    }

    fn create_framebuffer(
        &self,
        info: &FramebufferCreateInfo<'_, Api>,
    ) -> Result<vk::Framebuffer, DeviceError> {
        profiling::scope!("create_framebuffer");

        let render_pass = self.shared.render_pass(info.render_pass)?;
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(info.attachments)
            .width(info.extent.width)
            .height(info.extent.height)
            .layers(info.layers)
            .build();

        let framebuffer = unsafe { self.shared.raw.create_framebuffer(&create_info, None)? };
        if let Some(label) = info.label {
            unsafe {
                self.shared
                    .set_object_name(vk::ObjectType::FRAMEBUFFER, framebuffer, label)
            };
        }
        Ok(framebuffer)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.shared.raw.destroy_framebuffer(framebuffer, None);
    }
}

