use ash::vk;
use rhi_types::{
    RHIAttachmentLoadOp, RHIAttachmentStoreOp, RHIClearColorValue, RHIClearDepthStencilValue,
    RHIColorComponentFlags, RHIFormat, RHIImageLayout, RHIRect2D, RHISampleCountFlagBits,
};

use crate::clear::{AttachmentClear, ClearValue};

// The rhi enums share their discriminants with the Vulkan ones.

pub fn map_format(format: RHIFormat) -> vk::Format {
    vk::Format::from_raw(format as i32)
}

pub fn map_sample_count(samples: RHISampleCountFlagBits) -> vk::SampleCountFlags {
    vk::SampleCountFlags::from_raw(samples as u32)
}

pub fn map_load_op(op: RHIAttachmentLoadOp) -> vk::AttachmentLoadOp {
    vk::AttachmentLoadOp::from_raw(op as i32)
}

pub fn map_store_op(op: RHIAttachmentStoreOp) -> vk::AttachmentStoreOp {
    vk::AttachmentStoreOp::from_raw(op as i32)
}

pub fn map_image_layout(layout: RHIImageLayout) -> vk::ImageLayout {
    vk::ImageLayout::from_raw(layout as i32)
}

pub fn map_color_components(flags: RHIColorComponentFlags) -> vk::ColorComponentFlags {
    vk::ColorComponentFlags::from_raw(flags.bits())
}

pub fn map_rect2d(rect: RHIRect2D) -> vk::Rect2D {
    vk::Rect2D::builder()
        .offset(vk::Offset2D {
            x: rect.offset.x,
            y: rect.offset.y,
        })
        .extent(vk::Extent2D {
            width: rect.extent.width,
            height: rect.extent.height,
        })
        .build()
}

pub fn map_clear_color(value: RHIClearColorValue) -> vk::ClearColorValue {
    match value {
        RHIClearColorValue::Float32(float32) => vk::ClearColorValue { float32 },
        RHIClearColorValue::Int32(int32) => vk::ClearColorValue { int32 },
        RHIClearColorValue::Uint32(uint32) => vk::ClearColorValue { uint32 },
    }
}

pub fn map_clear_depth_stencil(value: RHIClearDepthStencilValue) -> vk::ClearDepthStencilValue {
    vk::ClearDepthStencilValue {
        depth: value.depth,
        stencil: value.stencil,
    }
}

pub fn map_clear_value(value: Option<ClearValue>) -> vk::ClearValue {
    match value {
        Some(ClearValue::Color(color)) => vk::ClearValue {
            color: map_clear_color(color),
        },
        Some(ClearValue::DepthStencil(depth_stencil)) => vk::ClearValue {
            depth_stencil: map_clear_depth_stencil(depth_stencil),
        },
        None => vk::ClearValue::default(),
    }
}

pub fn map_attachment_clear(clear: &AttachmentClear) -> vk::ClearAttachment {
    match *clear {
        AttachmentClear::Color { index, value, .. } => vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: index,
            clear_value: vk::ClearValue {
                color: map_clear_color(value),
            },
        },
        AttachmentClear::Depth(depth) => vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
        },
        AttachmentClear::Stencil { value, .. } => vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::STENCIL,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil: value,
                },
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_values_line_up() {
        assert_eq!(map_format(RHIFormat::R8G8B8A8_UNORM), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(map_format(RHIFormat::D24_UNORM_S8_UINT), vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(map_format(RHIFormat::B10G11R11_UFLOAT_PACK32), vk::Format::B10G11R11_UFLOAT_PACK32);
        assert_eq!(
            map_sample_count(RHISampleCountFlagBits::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(map_load_op(RHIAttachmentLoadOp::DONT_CARE), vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(map_store_op(RHIAttachmentStoreOp::DONT_CARE), vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            map_image_layout(RHIImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            map_image_layout(RHIImageLayout::PRESENT_SRC_KHR),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(
            map_color_components(RHIColorComponentFlags::RGBA),
            vk::ColorComponentFlags::RGBA
        );
    }

    #[test]
    fn clear_values_keep_their_bits() {
        let value = map_clear_value(Some(ClearValue::Color(RHIClearColorValue::Uint32([
            1, 2, 3, 4,
        ]))));
        assert_eq!(unsafe { value.color.uint32 }, [1, 2, 3, 4]);

        let attachment = map_attachment_clear(&AttachmentClear::Stencil {
            value: 7,
            write_mask: 0xff,
        });
        assert_eq!(attachment.aspect_mask, vk::ImageAspectFlags::STENCIL);
        assert_eq!(unsafe { attachment.clear_value.depth_stencil.stencil }, 7);
    }
}
