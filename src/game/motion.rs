use crate::game::snapshot::Side;
use glam::Vec2;

/// A per-frame motion rule for the two display positions.
///
/// Live play and the conclusion ring-out both go through this, so the
/// renderer only ever sees display positions and never which rule moved
/// them.
pub trait MotionLaw {
    fn advance(&self, side: Side, display: Vec2) -> Vec2;
}

/// Exponential approach: `display + (target - display) * rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    pub targets: [Vec2; 2],
    pub rate: f32,
}

impl MotionLaw for Smoothing {
    #[inline(always)]
    fn advance(&self, side: Side, display: Vec2) -> Vec2 {
        display + (self.targets[side.index()] - display) * self.rate
    }
}

/// Positions stay exactly where they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hold;

impl MotionLaw for Hold {
    #[inline(always)]
    fn advance(&self, _side: Side, display: Vec2) -> Vec2 {
        display
    }
}

#[derive(Debug, Clone)]
pub struct Interpolator {
    display: Option<[Vec2; 2]>,
    targets: Option<[Vec2; 2]>,
    alpha: f32,
}

impl Interpolator {
    pub fn new(alpha: f32) -> Self {
        Self {
            display: None,
            targets: None,
            alpha: alpha.clamp(f32::EPSILON, 1.0),
        }
    }

    /// Records new targets. The first targets after a reset are shown as-is.
    pub fn set_targets(&mut self, targets: [Vec2; 2]) {
        if self.display.is_none() {
            self.display = Some(targets);
        }
        self.targets = Some(targets);
    }

    /// One render frame of live smoothing toward the last known targets.
    pub fn step(&mut self) {
        if let Some(targets) = self.targets {
            let law = Smoothing {
                targets,
                rate: self.alpha,
            };
            self.step_with(&law);
        }
    }

    /// One render frame under an externally supplied rule.
    pub fn step_with(&mut self, law: &dyn MotionLaw) {
        if let Some(display) = self.display.as_mut() {
            for side in Side::BOTH {
                display[side.index()] = law.advance(side, display[side.index()]);
            }
        }
    }

    pub const fn display(&self) -> Option<[Vec2; 2]> {
        self.display
    }

    pub fn reset(&mut self) {
        self.display = None;
        self.targets = None;
    }
}
