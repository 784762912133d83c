#![allow(non_camel_case_types)]

#[macro_use]
extern crate num_derive;

use bitflags::bitflags;
use typed_builder::TypedBuilder;

#[derive(
    FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkFormat.html>"]
pub enum RHIFormat {
    #[default]
    UNDEFINED = 0,
    R8_UNORM = 9,
    R8G8_UNORM = 16,
    R8G8B8_UNORM = 23,
    R8G8B8A8_UNORM = 37,
    R8G8B8A8_UINT = 41,
    R8G8B8A8_SINT = 42,
    R8G8B8A8_SRGB = 43,
    B8G8R8A8_UNORM = 44,
    B8G8R8A8_SRGB = 50,
    A2B10G10R10_UNORM_PACK32 = 64,
    R16G16B16A16_SFLOAT = 97,
    R32_UINT = 98,
    R32_SINT = 99,
    R32_SFLOAT = 100,
    R32G32B32A32_UINT = 107,
    R32G32B32A32_SINT = 108,
    R32G32B32A32_SFLOAT = 109,
    B10G11R11_UFLOAT_PACK32 = 122,
    D16_UNORM = 124,
    X8_D24_UNORM_PACK32 = 125,
    D32_SFLOAT = 126,
    S8_UINT = 127,
    D24_UNORM_S8_UINT = 129,
    D32_SFLOAT_S8_UINT = 130,
}

impl RHIFormat {
    /// Color channels stored by the format. Empty for depth/stencil formats.
    pub fn color_channels(self) -> RHIColorComponentFlags {
        use RHIFormat::*;
        match self {
            R8_UNORM | R32_UINT | R32_SINT | R32_SFLOAT => RHIColorComponentFlags::R,
            R8G8_UNORM => RHIColorComponentFlags::R | RHIColorComponentFlags::G,
            R8G8B8_UNORM | B10G11R11_UFLOAT_PACK32 => RHIColorComponentFlags::RGB,
            R8G8B8A8_UNORM | R8G8B8A8_UINT | R8G8B8A8_SINT | R8G8B8A8_SRGB | B8G8R8A8_UNORM
            | B8G8R8A8_SRGB | A2B10G10R10_UNORM_PACK32 | R16G16B16A16_SFLOAT
            | R32G32B32A32_UINT | R32G32B32A32_SINT | R32G32B32A32_SFLOAT => {
                RHIColorComponentFlags::RGBA
            }
            _ => RHIColorComponentFlags::empty(),
        }
    }

    pub fn has_depth(self) -> bool {
        use RHIFormat::*;
        matches!(
            self,
            D16_UNORM | X8_D24_UNORM_PACK32 | D32_SFLOAT | D24_UNORM_S8_UINT | D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(self) -> bool {
        use RHIFormat::*;
        matches!(self, S8_UINT | D24_UNORM_S8_UINT | D32_SFLOAT_S8_UINT)
    }

    pub fn is_depth_or_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    pub fn is_color(self) -> bool {
        !self.color_channels().is_empty()
    }

    /// Which clear value variant is meaningful for this format.
    pub fn component_type(self) -> RHIComponentType {
        use RHIFormat::*;
        match self {
            R8G8B8A8_UINT | R32_UINT | R32G32B32A32_UINT => RHIComponentType::UINT,
            R8G8B8A8_SINT | R32_SINT | R32G32B32A32_SINT => RHIComponentType::SINT,
            _ => RHIComponentType::FLOAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RHIComponentType {
    FLOAT,
    SINT,
    UINT,
}

#[derive(
    FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkSampleCountFlagBits.html>"]
pub enum RHISampleCountFlagBits {
    #[default]
    TYPE_1 = 1 << 0,
    TYPE_2 = 1 << 1,
    TYPE_4 = 1 << 2,
    TYPE_8 = 1 << 3,
    TYPE_16 = 1 << 4,
    TYPE_32 = 1 << 5,
    TYPE_64 = 1 << 6,
}

impl RHISampleCountFlagBits {
    pub fn from_count(count: u32) -> Option<Self> {
        <Self as num_traits::FromPrimitive>::from_u32(count)
    }

    pub fn count(self) -> u32 {
        self as u32
    }

    pub fn is_multisampled(self) -> bool {
        self != Self::TYPE_1
    }
}

#[derive(
    FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkAttachmentLoadOp.html>"]
pub enum RHIAttachmentLoadOp {
    LOAD = 0,
    CLEAR = 1,
    #[default]
    DONT_CARE = 2,
}

#[derive(
    FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkAttachmentStoreOp.html>"]
pub enum RHIAttachmentStoreOp {
    #[default]
    STORE = 0,
    DONT_CARE = 1,
}

#[derive(
    FromPrimitive, ToPrimitive, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkImageLayout.html>"]
pub enum RHIImageLayout {
    #[default]
    #[doc = "Implicit layout an image is when its contents are undefined due to various reasons (e.g. right after creation)"]
    UNDEFINED = 0,
    #[doc = "General layout when image can be used for any kind of access"]
    GENERAL = 1,
    #[doc = "Optimal layout when image is only used for color attachment read/write"]
    COLOR_ATTACHMENT_OPTIMAL = 2,
    #[doc = "Optimal layout when image is only used for depth/stencil attachment read/write"]
    DEPTH_STENCIL_ATTACHMENT_OPTIMAL = 3,
    #[doc = "Optimal layout when image is used for read only depth/stencil attachment and shader access"]
    DEPTH_STENCIL_READ_ONLY_OPTIMAL = 4,
    #[doc = "Optimal layout when image is used for read only shader access"]
    SHADER_READ_ONLY_OPTIMAL = 5,
    #[doc = "Optimal layout when image is used only as source of transfer operations"]
    TRANSFER_SRC_OPTIMAL = 6,
    #[doc = "Optimal layout when image is used only as destination of transfer operations"]
    TRANSFER_DST_OPTIMAL = 7,
    #[doc = "Generated from 'VK_KHR_swapchain'"]
    PRESENT_SRC_KHR = 1_000_001_002,
}

bitflags! {
    #[derive(Debug, Clone,  Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    #[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkColorComponentFlagBits.html>"]
    pub struct RHIColorComponentFlags: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const RGB = Self::R.bits() | Self::G.bits() | Self::B.bits();
        const RGBA = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

impl RHIColorComponentFlags {
    /// Channel index order used by [`RHIClearColorValue`].
    pub const CHANNELS: [RHIColorComponentFlags; 4] = [Self::R, Self::G, Self::B, Self::A];
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkClearColorValue.html>"]
pub enum RHIClearColorValue {
    Float32([f32; 4]),
    Int32([i32; 4]),
    Uint32([u32; 4]),
}

impl Default for RHIClearColorValue {
    fn default() -> Self {
        Self::Float32([0.0; 4])
    }
}

impl RHIClearColorValue {
    pub fn component_type(&self) -> RHIComponentType {
        match self {
            Self::Float32(_) => RHIComponentType::FLOAT,
            Self::Int32(_) => RHIComponentType::SINT,
            Self::Uint32(_) => RHIComponentType::UINT,
        }
    }

    /// Raw channel bits, the way the value is laid out in `VkClearColorValue`.
    pub fn to_bits(&self) -> [u32; 4] {
        match *self {
            Self::Float32(v) => v.map(f32::to_bits),
            Self::Int32(v) => v.map(|c| c as u32),
            Self::Uint32(v) => v,
        }
    }

    pub fn from_bits(ty: RHIComponentType, bits: [u32; 4]) -> Self {
        match ty {
            RHIComponentType::FLOAT => Self::Float32(bits.map(f32::from_bits)),
            RHIComponentType::SINT => Self::Int32(bits.map(|c| c as i32)),
            RHIComponentType::UINT => Self::Uint32(bits),
        }
    }

    /// Replaces the alpha channel with the "one" of the value's type.
    pub fn with_opaque_alpha(self) -> Self {
        match self {
            Self::Float32([r, g, b, _]) => Self::Float32([r, g, b, 1.0]),
            Self::Int32([r, g, b, _]) => Self::Int32([r, g, b, 1]),
            Self::Uint32([r, g, b, _]) => Self::Uint32([r, g, b, 1]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[doc = "<https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkClearDepthStencilValue.html>"]
pub struct RHIClearDepthStencilValue {
    pub depth: f32,
    pub stencil: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct RHIExtent2D {
    pub width: u32,
    pub height: u32,
}

impl RHIExtent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct RHIOffset2D {
    pub x: i32,
    pub y: i32,
}

#[derive(TypedBuilder, Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct RHIRect2D {
    #[builder(default)]
    pub offset: RHIOffset2D,
    pub extent: RHIExtent2D,
}

impl RHIRect2D {
    pub fn from_extent(extent: RHIExtent2D) -> Self {
        Self {
            offset: RHIOffset2D::default(),
            extent,
        }
    }

    /// Whether `self` covers the whole `extent`-sized area starting at the origin.
    pub fn covers(&self, extent: RHIExtent2D) -> bool {
        self.offset.x <= 0
            && self.offset.y <= 0
            && i64::from(self.offset.x) + i64::from(self.extent.width) >= i64::from(extent.width)
            && i64::from(self.offset.y) + i64::from(self.extent.height)
                >= i64::from(extent.height)
    }

    pub fn contains(&self, other: &RHIRect2D) -> bool {
        other.offset.x >= self.offset.x
            && other.offset.y >= self.offset.y
            && i64::from(other.offset.x) + i64::from(other.extent.width)
                <= i64::from(self.offset.x) + i64::from(self.extent.width)
            && i64::from(other.offset.y) + i64::from(other.extent.height)
                <= i64::from(self.offset.y) + i64::from(self.extent.height)
    }

    /// Smallest rect containing both.
    pub fn union(&self, other: &RHIRect2D) -> RHIRect2D {
        let x0 = self.offset.x.min(other.offset.x);
        let y0 = self.offset.y.min(other.offset.y);
        let x1 = (i64::from(self.offset.x) + i64::from(self.extent.width))
            .max(i64::from(other.offset.x) + i64::from(other.extent.width));
        let y1 = (i64::from(self.offset.y) + i64::from(self.extent.height))
            .max(i64::from(other.offset.y) + i64::from(other.extent.height));
        RHIRect2D {
            offset: RHIOffset2D { x: x0, y: y0 },
            extent: RHIExtent2D {
                width: (x1 - i64::from(x0)) as u32,
                height: (y1 - i64::from(y0)) as u32,
            },
        }
    }

    pub fn intersect(&self, other: &RHIRect2D) -> RHIRect2D {
        let x0 = self.offset.x.max(other.offset.x);
        let y0 = self.offset.y.max(other.offset.y);
        let x1 = (i64::from(self.offset.x) + i64::from(self.extent.width))
            .min(i64::from(other.offset.x) + i64::from(other.extent.width));
        let y1 = (i64::from(self.offset.y) + i64::from(self.extent.height))
            .min(i64::from(other.offset.y) + i64::from(other.extent.height));
        RHIRect2D {
            offset: RHIOffset2D { x: x0, y: y0 },
            extent: RHIExtent2D {
                width: (x1 - i64::from(x0)).max(0) as u32,
                height: (y1 - i64::from(y0)).max(0) as u32,
            },
        }
    }
}
