use typed_builder::TypedBuilder;

use crate::MAX_COLOR_ATTACHMENTS;

pub type Label<'a> = Option<&'a str>;

/// Device capabilities and tuning switches that shape render-pass selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct FramebufferFeatures {
    /// Multisample resolve can happen as part of the render pass.
    #[builder(default = true)]
    pub subpass_resolve: bool,
    /// Full-area clears are folded into the next render pass's load ops.
    #[builder(default = true)]
    pub defer_clears: bool,
    #[builder(default = false)]
    pub prefer_draw_clear_over_clear_attachments: bool,
    #[builder(default = MAX_COLOR_ATTACHMENTS as u32)]
    pub max_color_attachments: u32,
}

impl Default for FramebufferFeatures {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One bit per color attachment index.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    derive_more::BitOr,
    derive_more::BitAnd,
)]
pub struct DrawBufferMask(u8);

impl DrawBufferMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The first `count` color attachments.
    pub fn first(count: u32) -> Self {
        debug_assert!(count as usize <= MAX_COLOR_ATTACHMENTS);
        Self(((1u16 << count) - 1) as u8)
    }

    pub fn from_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        let mut mask = Self::empty();
        for index in indices {
            mask.set(index);
        }
        mask
    }

    pub fn set(&mut self, index: u32) {
        debug_assert!((index as usize) < MAX_COLOR_ATTACHMENTS);
        self.0 |= 1 << index;
    }

    pub fn reset(&mut self, index: u32) {
        self.0 &= !(1 << index);
    }

    pub fn test(self, index: u32) -> bool {
        (index as usize) < MAX_COLOR_ATTACHMENTS && self.0 & (1 << index) != 0
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }

    pub fn none(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..MAX_COLOR_ATTACHMENTS as u32).filter(move |&i| self.test(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_buffer_mask_bits() {
        let mut mask = DrawBufferMask::from_indices([0, 3]);
        assert!(mask.test(0) && mask.test(3) && !mask.test(1));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 3]);

        mask.reset(0);
        assert_eq!(mask.count(), 1);
        assert_eq!(DrawBufferMask::first(8).bits(), 0xff);
        assert_eq!(
            (DrawBufferMask::first(2) | DrawBufferMask::from_indices([3])).bits(),
            0b1011
        );
        assert!((DrawBufferMask::first(2) & DrawBufferMask::from_indices([3])).none());
    }

    #[test]
    fn feature_defaults() {
        let features = FramebufferFeatures::default();
        assert!(features.subpass_resolve);
        assert!(features.defer_clears);
        assert_eq!(features.max_color_attachments, 8);
    }
}
