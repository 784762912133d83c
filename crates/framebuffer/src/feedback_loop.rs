use rhi_types::RHIImageLayout;

/// How the depth/stencil attachment is bound while it may also be sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeedbackLoopMode {
    #[default]
    Normal,
    /// Depth is sampled and only read by the render pass.
    ReadOnlyDepth,
}

impl FeedbackLoopMode {
    pub fn depth_stencil_layout(self) -> RHIImageLayout {
        match self {
            Self::Normal => RHIImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::ReadOnlyDepth => RHIImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackTransition {
    pub from: FeedbackLoopMode,
    pub to: FeedbackLoopMode,
}

/// Tracks the depth feedback loop state.
///
/// Every returned transition requires the open render pass to end, since
/// the depth attachment layout is baked into it.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLoopTracker {
    mode: FeedbackLoopMode,
}

impl FeedbackLoopTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> FeedbackLoopMode {
        self.mode
    }

    pub fn is_read_only_depth(&self) -> bool {
        self.mode == FeedbackLoopMode::ReadOnlyDepth
    }

    /// Enters read-only depth mode once the bound depth attachment is both
    /// sampled and never written. Leaving the mode is explicit.
    pub fn update(&mut self, depth_sampled: bool, depth_writes_disabled: bool) -> Option<FeedbackTransition> {
        if depth_sampled && depth_writes_disabled {
            self.set_mode(FeedbackLoopMode::ReadOnlyDepth)
        } else {
            None
        }
    }

    pub fn set_mode(&mut self, mode: FeedbackLoopMode) -> Option<FeedbackTransition> {
        if self.mode == mode {
            return None;
        }
        let transition = FeedbackTransition {
            from: self.mode,
            to: mode,
        };
        self.mode = mode;
        log::debug!("depth feedback loop {:?} -> {:?}", transition.from, transition.to);
        Some(transition)
    }

    /// A different depth attachment is never in a feedback loop with the textures sampled so far.
    pub fn on_attachment_changed(&mut self) -> Option<FeedbackTransition> {
        self.set_mode(FeedbackLoopMode::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enters_only_when_sampled_and_read_only() {
        let mut tracker = FeedbackLoopTracker::new();
        assert_eq!(tracker.update(true, false), None);
        assert_eq!(tracker.update(false, true), None);
        assert_eq!(
            tracker.update(true, true),
            Some(FeedbackTransition {
                from: FeedbackLoopMode::Normal,
                to: FeedbackLoopMode::ReadOnlyDepth,
            })
        );
        assert_eq!(tracker.update(true, true), None);
        // Stops sampling but stays in the mode until told otherwise.
        assert_eq!(tracker.update(false, false), None);
        assert!(tracker.is_read_only_depth());
    }

    #[test]
    fn attachment_change_returns_to_normal() {
        let mut tracker = FeedbackLoopTracker::new();
        assert_eq!(tracker.on_attachment_changed(), None);
        tracker.set_mode(FeedbackLoopMode::ReadOnlyDepth);
        assert_eq!(
            tracker.mode().depth_stencil_layout(),
            RHIImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            tracker.on_attachment_changed().map(|t| t.to),
            Some(FeedbackLoopMode::Normal)
        );
    }
}
