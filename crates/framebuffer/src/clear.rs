//! Deferred clears.
//!
//! Clears that cover the whole framebuffer are not recorded right away.
//! They are queued per attachment and later folded into the load ops of the
//! next render pass, drawn right after it begins, or staged as explicit clears
//! when the render pass they were meant for never starts.

use arrayvec::ArrayVec;
use rhi_types::{
    RHIClearColorValue, RHIClearDepthStencilValue, RHIColorComponentFlags, RHIComponentType,
};

use crate::attachment::{AttachmentSlot, AttachmentView, RenderTargets};
use crate::render_pass::RenderPassDesc;
use crate::{
    Backend, CommandRecorder, DrawBufferMask, MAX_COLOR_ATTACHMENTS, MAX_FRAMEBUFFER_ATTACHMENTS,
};

/// Stencil bits a clear must write to be expressible as a load op.
pub const STENCIL_FULL_MASK: u32 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color(RHIClearColorValue),
    DepthStencil(RHIClearDepthStencilValue),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentClear {
    Color {
        index: u32,
        value: RHIClearColorValue,
        mask: RHIColorComponentFlags,
    },
    Depth(f32),
    Stencil {
        value: u32,
        write_mask: u32,
    },
}

impl AttachmentClear {
    pub fn slot(&self) -> AttachmentSlot {
        match *self {
            Self::Color { index, .. } => AttachmentSlot::Color(index),
            Self::Depth(_) | Self::Stencil { .. } => AttachmentSlot::DepthStencil,
        }
    }

    /// Whether the clear leaves some channels or bits of `view` untouched.
    pub fn is_masked<A: Backend>(&self, view: &AttachmentView<A>) -> bool {
        match *self {
            Self::Color { mask, .. } => !mask.contains(view.format.color_channels()),
            Self::Depth(_) => false,
            Self::Stencil { write_mask, .. } => {
                write_mask & STENCIL_FULL_MASK != STENCIL_FULL_MASK
            }
        }
    }
}

/// A clear recorded outside of any render pass.
#[derive(Debug, Clone, Copy)]
pub struct StagedClear<A: Backend> {
    pub view: A::ImageView,
    pub clear: AttachmentClear,
}

/// Which attachments start the next render pass with a `CLEAR` load op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOpClearMask {
    pub colors: DrawBufferMask,
    pub depth: bool,
    pub stencil: bool,
}

impl LoadOpClearMask {
    pub fn any(&self) -> bool {
        self.colors.any() || self.depth || self.stencil
    }
}

/// Alpha of an emulated channel must read back as one.
pub fn corrected_clear_color<A: Backend>(
    view: &AttachmentView<A>,
    value: RHIClearColorValue,
) -> RHIClearColorValue {
    if view.has_emulated_alpha() {
        value.with_opaque_alpha()
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingColor {
    ty: RHIComponentType,
    bits: [u32; 4],
    mask: RHIColorComponentFlags,
}

impl PendingColor {
    fn value(&self) -> RHIClearColorValue {
        RHIClearColorValue::from_bits(self.ty, self.bits)
    }

    fn merge(&mut self, value: RHIClearColorValue, mask: RHIColorComponentFlags) {
        let bits = value.to_bits();
        for (channel, flag) in RHIColorComponentFlags::CHANNELS.iter().enumerate() {
            if mask.contains(*flag) {
                self.bits[channel] = bits[channel];
            }
        }
        self.ty = value.component_type();
        self.mask |= mask;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingStencil {
    value: u32,
    write_mask: u32,
}

/// Clears accepted but not yet recorded, at most one per attachment aspect.
///
/// A later clear of the same aspect overrides earlier ones channel by channel:
/// channels it writes take its value, the others keep the earlier value, and
/// the resulting mask is the union of both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeferredClears {
    colors: [Option<PendingColor>; MAX_COLOR_ATTACHMENTS],
    depth: Option<f32>,
    stencil: Option<PendingStencil>,
}

impl DeferredClears {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.iter().all(Option::is_none) && self.depth.is_none() && self.stencil.is_none()
    }

    pub fn len(&self) -> usize {
        self.colors.iter().flatten().count()
            + usize::from(self.depth.is_some())
            + usize::from(self.stencil.is_some())
    }

    pub fn enqueue(&mut self, clear: AttachmentClear) {
        match clear {
            AttachmentClear::Color { index, value, mask } => {
                if mask.is_empty() {
                    return;
                }
                match self.colors[index as usize].as_mut() {
                    Some(pending) => pending.merge(value, mask),
                    None => {
                        self.colors[index as usize] = Some(PendingColor {
                            ty: value.component_type(),
                            bits: value.to_bits(),
                            mask,
                        })
                    }
                }
            }
            AttachmentClear::Depth(depth) => self.depth = Some(depth),
            AttachmentClear::Stencil { value, write_mask } => {
                if write_mask == 0 {
                    return;
                }
                let pending = self.stencil.get_or_insert(PendingStencil {
                    value: 0,
                    write_mask: 0,
                });
                pending.value = (pending.value & !write_mask) | (value & write_mask);
                pending.write_mask |= write_mask;
            }
        }
    }

    /// Pending clears in slot order.
    pub fn entries(&self) -> Vec<AttachmentClear> {
        let mut entries: Vec<AttachmentClear> = self
            .colors
            .iter()
            .enumerate()
            .filter_map(|(index, pending)| {
                pending.map(|pending| AttachmentClear::Color {
                    index: index as u32,
                    value: pending.value(),
                    mask: pending.mask,
                })
            })
            .collect();
        entries.extend(self.depth.map(AttachmentClear::Depth));
        entries.extend(self.stencil.map(|pending| AttachmentClear::Stencil {
            value: pending.value,
            write_mask: pending.write_mask,
        }));
        entries
    }

    pub fn contains(&self, slot: AttachmentSlot) -> bool {
        match slot {
            AttachmentSlot::Color(index) => self
                .colors
                .get(index as usize)
                .map_or(false, Option::is_some),
            AttachmentSlot::DepthStencil => self.depth.is_some() || self.stencil.is_some(),
        }
    }

    /// Removes and returns the clears targeting `slot`.
    pub fn take_slot(&mut self, slot: AttachmentSlot) -> Vec<AttachmentClear> {
        let taken = Self {
            colors: match slot {
                AttachmentSlot::Color(index) => {
                    let mut colors = [None; MAX_COLOR_ATTACHMENTS];
                    colors[index as usize] = self.colors[index as usize].take();
                    colors
                }
                AttachmentSlot::DepthStencil => [None; MAX_COLOR_ATTACHMENTS],
            },
            depth: match slot {
                AttachmentSlot::DepthStencil => self.depth.take(),
                AttachmentSlot::Color(_) => None,
            },
            stencil: match slot {
                AttachmentSlot::DepthStencil => self.stencil.take(),
                AttachmentSlot::Color(_) => None,
            },
        };
        taken.entries()
    }

    /// Attachments whose pending clear can be done by the render pass load op.
    pub fn load_op_mask<A: Backend>(&self, targets: &RenderTargets<A>) -> LoadOpClearMask {
        let mut mask = LoadOpClearMask::default();
        for clear in self.entries() {
            let view = match targets.attachment(clear.slot()) {
                Some(view) if !clear.is_masked(view) => view,
                _ => continue,
            };
            match clear {
                AttachmentClear::Color { index, .. } => mask.colors.set(index),
                AttachmentClear::Depth(_) => mask.depth = view.format.has_depth(),
                AttachmentClear::Stencil { .. } => mask.stencil = view.format.has_stencil(),
            }
        }
        mask
    }

    /// Empties the queue, splitting the clears into load-op clears and clears
    /// drawn inside the render pass.
    pub fn drain<A: Backend>(&mut self, targets: &RenderTargets<A>) -> DrainedClears {
        let source = std::mem::take(self);
        let mut drained = DrainedClears {
            load_ops: source.load_op_mask(targets),
            colors: [None; MAX_COLOR_ATTACHMENTS],
            depth_stencil: RHIClearDepthStencilValue::default(),
            draw_clears: Vec::new(),
            source,
        };
        for clear in drained.source.entries() {
            let view = match targets.attachment(clear.slot()) {
                Some(view) => view,
                None => {
                    log::trace!("dropping clear of unbound attachment {:?}", clear.slot());
                    continue;
                }
            };
            match clear {
                AttachmentClear::Color { index, value, mask } => {
                    let value = corrected_clear_color(view, value);
                    if drained.load_ops.colors.test(index) {
                        drained.colors[index as usize] = Some(value);
                    } else {
                        drained.draw_clears.push(AttachmentClear::Color { index, value, mask });
                    }
                }
                AttachmentClear::Depth(depth) if drained.load_ops.depth => {
                    drained.depth_stencil.depth = depth;
                }
                AttachmentClear::Stencil { value, .. } if drained.load_ops.stencil => {
                    drained.depth_stencil.stencil = value;
                }
                AttachmentClear::Stencil { .. } if view.format.has_stencil() => {
                    drained.draw_clears.push(clear);
                }
                _ => {}
            }
        }
        drained
    }

    /// Puts back clears whose render pass never started. Clears queued since
    /// the drain are newer and win.
    pub fn restore(&mut self, drained: DrainedClears) {
        let newer = std::mem::replace(self, drained.source);
        for clear in newer.entries() {
            self.enqueue(clear);
        }
    }

    /// Turns every pending clear into an explicit clear of the attachment's
    /// current contents. The queue is empty afterwards.
    pub fn redefer<A: Backend, R: CommandRecorder<A>>(
        &mut self,
        targets: &RenderTargets<A>,
        recorder: &mut R,
    ) -> usize {
        let pending = std::mem::take(self).entries();
        stage_clears(targets, recorder, pending)
    }
}

pub(crate) fn stage_clears<A: Backend, R: CommandRecorder<A>>(
    targets: &RenderTargets<A>,
    recorder: &mut R,
    clears: Vec<AttachmentClear>,
) -> usize {
    let mut staged = 0;
    for clear in clears {
        let view = match targets.attachment(clear.slot()) {
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
        recorder.stage_clear(StagedClear {
            view: view.view,
            clear,
        });
        staged += 1;
    }
    staged
}

/// Output of [`DeferredClears::drain`].
#[derive(Debug, Clone)]
pub struct DrainedClears {
    pub load_ops: LoadOpClearMask,
    colors: [Option<RHIClearColorValue>; MAX_COLOR_ATTACHMENTS],
    depth_stencil: RHIClearDepthStencilValue,
    /// Clears that have to be drawn right after the render pass begins.
    pub draw_clears: Vec<AttachmentClear>,
    source: DeferredClears,
}

impl DrainedClears {
    pub fn is_empty(&self) -> bool {
        !self.load_ops.any() && self.draw_clears.is_empty()
    }

    pub fn color_value(&self, index: u32) -> Option<RHIClearColorValue> {
        self.colors.get(index as usize).copied().flatten()
    }

    /// Clear values in the packed attachment order of `render_pass`.
    pub fn packed_clear_values(
        &self,
        render_pass: &RenderPassDesc,
    ) -> ArrayVec<Option<ClearValue>, MAX_FRAMEBUFFER_ATTACHMENTS> {
        let mut values = ArrayVec::new();
        for (index, ops) in render_pass.color_attachments() {
            if ops.is_some() {
                values.push(self.color_value(index).map(ClearValue::Color));
            }
        }
        if render_pass.depth_stencil().is_some() {
            values.push(
                (self.load_ops.depth || self.load_ops.stencil)
                    .then_some(ClearValue::DepthStencil(self.depth_stencil)),
            );
        }
        for _ in render_pass.subpass_resolves() {
            values.push(None);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Command, MockApi, MockRecorder, ViewFactory};
    use rhi_types::RHIFormat;

    fn color(index: u32, value: [f32; 4], mask: RHIColorComponentFlags) -> AttachmentClear {
        AttachmentClear::Color {
            index,
            value: RHIClearColorValue::Float32(value),
            mask,
        }
    }

    fn rgba_targets(factory: &ViewFactory, count: u32) -> RenderTargets<MockApi> {
        let mut targets = RenderTargets::new();
        for index in 0..count {
            targets.update_attachment(
                AttachmentSlot::Color(index),
                Some(factory.color(RHIFormat::R8G8B8A8_UNORM, 16, 16)),
            );
        }
        targets
    }

    #[test]
    fn last_write_wins_per_channel_with_disjoint_masks() {
        let mut clears = DeferredClears::new();
        clears.enqueue(color(0, [1.0, 0.0, 0.0, 0.0], RHIColorComponentFlags::R));
        clears.enqueue(color(0, [0.0, 0.5, 0.0, 0.0], RHIColorComponentFlags::G));

        assert_eq!(
            clears.entries(),
            vec![color(
                0,
                [1.0, 0.5, 0.0, 0.0],
                RHIColorComponentFlags::R | RHIColorComponentFlags::G
            )]
        );
    }

    #[test]
    fn last_write_wins_per_channel_with_overlapping_masks() {
        let mut clears = DeferredClears::new();
        clears.enqueue(color(1, [0.1, 0.2, 0.3, 0.4], RHIColorComponentFlags::RGB));
        clears.enqueue(color(
            1,
            [0.9, 0.9, 0.9, 0.9],
            RHIColorComponentFlags::B | RHIColorComponentFlags::A,
        ));

        assert_eq!(
            clears.entries(),
            vec![color(1, [0.1, 0.2, 0.9, 0.9], RHIColorComponentFlags::RGBA)]
        );
        assert_eq!(clears.len(), 1);
    }

    #[test]
    fn stencil_merges_per_bit() {
        let mut clears = DeferredClears::new();
        clears.enqueue(AttachmentClear::Stencil {
            value: 0xff,
            write_mask: 0x0f,
        });
        clears.enqueue(AttachmentClear::Stencil {
            value: 0x30,
            write_mask: 0xf0,
        });
        assert_eq!(
            clears.entries(),
            vec![AttachmentClear::Stencil {
                value: 0x3f,
                write_mask: 0xff
            }]
        );
    }

    #[test]
    fn drain_splits_load_op_and_draw_clears() {
        let factory = ViewFactory::new();
        let mut targets = rgba_targets(&factory, 2);
        targets.update_attachment(
            AttachmentSlot::DepthStencil,
            Some(factory.depth(RHIFormat::D24_UNORM_S8_UINT, 16, 16)),
        );

        let mut clears = DeferredClears::new();
        clears.enqueue(color(0, [1.0; 4], RHIColorComponentFlags::RGBA));
        clears.enqueue(color(1, [1.0; 4], RHIColorComponentFlags::R));
        clears.enqueue(AttachmentClear::Depth(0.5));
        clears.enqueue(AttachmentClear::Stencil {
            value: 1,
            write_mask: 0x01,
        });

        let drained = clears.drain(&targets);
        assert!(clears.is_empty());
        assert_eq!(
            drained.load_ops,
            LoadOpClearMask {
                colors: DrawBufferMask::from_indices([0]),
                depth: true,
                stencil: false,
            }
        );
        assert_eq!(
            drained.color_value(0),
            Some(RHIClearColorValue::Float32([1.0; 4]))
        );
        assert_eq!(
            drained.draw_clears,
            vec![
                color(1, [1.0; 4], RHIColorComponentFlags::R),
                AttachmentClear::Stencil {
                    value: 1,
                    write_mask: 0x01
                },
            ]
        );
    }

    #[test]
    fn restore_keeps_newer_clears() {
        let factory = ViewFactory::new();
        let targets = rgba_targets(&factory, 1);
        let mut clears = DeferredClears::new();
        clears.enqueue(color(0, [1.0, 1.0, 1.0, 1.0], RHIColorComponentFlags::RGBA));

        let drained = clears.drain(&targets);
        clears.enqueue(color(0, [0.0, 0.0, 0.0, 0.0], RHIColorComponentFlags::R));
        clears.restore(drained);

        assert_eq!(
            clears.entries(),
            vec![color(0, [0.0, 1.0, 1.0, 1.0], RHIColorComponentFlags::RGBA)]
        );
    }

    #[test]
    fn redefer_stages_every_pending_clear_once() {
        let factory = ViewFactory::new();
        let targets = rgba_targets(&factory, 2);
        let mut recorder = MockRecorder::new();
        let mut clears = DeferredClears::new();
        clears.enqueue(color(0, [0.25; 4], RHIColorComponentFlags::RGBA));
        clears.enqueue(color(1, [0.75; 4], RHIColorComponentFlags::G));

        assert_eq!(clears.redefer(&targets, &mut recorder), 2);
        assert_eq!(clears.redefer(&targets, &mut recorder), 0);
        assert!(clears.is_empty());

        let staged: Vec<_> = recorder
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::StageClear { view, clear } => Some((*view, *clear)),
                _ => None,
            })
            .collect();
        assert_eq!(
            staged,
            vec![
                (
                    targets.color(0).map(|v| v.view).unwrap(),
                    color(0, [0.25; 4], RHIColorComponentFlags::RGBA)
                ),
                (
                    targets.color(1).map(|v| v.view).unwrap(),
                    color(1, [0.75; 4], RHIColorComponentFlags::G)
                ),
            ]
        );
    }

    #[test]
    fn emulated_alpha_is_forced_opaque() {
        let factory = ViewFactory::new();
        let mut targets = RenderTargets::<MockApi>::new();
        targets.update_attachment(
            AttachmentSlot::Color(0),
            Some(AttachmentView {
                emulated_format: Some(RHIFormat::R8G8B8A8_UNORM),
                ..factory.color(RHIFormat::R8G8B8_UNORM, 16, 16)
            }),
        );
        let mut clears = DeferredClears::new();
        clears.enqueue(color(0, [0.2, 0.4, 0.6, 0.0], RHIColorComponentFlags::RGB));

        let drained = clears.drain(&targets);
        assert!(drained.load_ops.colors.test(0));
        assert_eq!(
            drained.color_value(0),
            Some(RHIClearColorValue::Float32([0.2, 0.4, 0.6, 1.0]))
        );
    }
}
