//! The end-of-match choreography: RING_OUT, DECISION, WINNER, then reset.
//!
//! Entered once per match from the first decided snapshot. All four
//! deadlines (shake end and the three phase changes) are scheduled at entry
//! from cumulative durations, so the sequence cannot drift with frame
//! timing. Cancellation removes every pending deadline and bumps the epoch.

use crate::core::timers::{Millis, TimerId, Timers};
use crate::game::Wake;
use crate::game::motion::{Hold, MotionLaw, Smoothing};
use crate::game::snapshot::{MatchSnapshot, RING_CENTER, RING_RADIUS, Side};
use glam::Vec2;
use log::info;
use smallvec::SmallVec;

/// How far past the ring edge the loser is carried, in ring radii.
const RING_OUT_DISTANCE: f32 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConclusionPhase {
    RingOut,
    Decision,
    Winner,
}

impl ConclusionPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RingOut => "RING_OUT",
            Self::Decision => "DECISION",
            Self::Winner => "WINNER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConclusionStep {
    ShakeEnd,
    Decision,
    Winner,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConclusionTimings {
    pub ring_out_ms: Millis,
    pub decision_ms: Millis,
    pub winner_ms: Millis,
    pub shake_ms: Millis,
    pub ring_out_rate: f32,
}

impl Default for ConclusionTimings {
    fn default() -> Self {
        Self {
            ring_out_ms: 3000,
            decision_ms: 3000,
            winner_ms: 5000,
            shake_ms: 500,
            ring_out_rate: 0.05,
        }
    }
}

impl ConclusionTimings {
    pub const fn total_ms(&self) -> Millis {
        self.ring_out_ms + self.decision_ms + self.winner_ms
    }
}

/// Where the loser ends up: pushed out from the ring centre along the line
/// through its last position.
pub fn ring_out_target(last: Vec2, side: Side) -> Vec2 {
    let from_center = last - RING_CENTER;
    let len = from_center.length();
    let dir = if len > 1e-3 {
        from_center / len
    } else {
        // Dead centre: send each side out its own way.
        match side {
            Side::Left => Vec2::NEG_X,
            Side::Right => Vec2::X,
        }
    };
    let out = RING_RADIUS * RING_OUT_DISTANCE;
    RING_CENTER + dir * len.max(out)
}

#[derive(Debug)]
struct Run {
    epoch: u64,
    phase: ConclusionPhase,
    started_at: Millis,
    winner: Side,
    winner_name: String,
    match_id: Option<String>,
    shaking: bool,
    ring_out: Smoothing,
    timers: SmallVec<[TimerId; 4]>,
}

#[derive(Debug)]
pub struct Choreographer {
    timings: ConclusionTimings,
    epoch: u64,
    run: Option<Run>,
}

impl Choreographer {
    pub const fn new(timings: ConclusionTimings) -> Self {
        Self {
            timings,
            epoch: 0,
            run: None,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.run.is_some()
    }

    pub fn phase(&self) -> Option<ConclusionPhase> {
        self.run.as_ref().map(|r| r.phase)
    }

    pub fn shaking(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.shaking)
    }

    pub fn winner(&self) -> Option<(Side, &str)> {
        self.run.as_ref().map(|r| (r.winner, r.winner_name.as_str()))
    }

    pub fn match_id(&self) -> Option<&str> {
        self.run.as_ref().and_then(|r| r.match_id.as_deref())
    }

    #[cfg(test)]
    pub fn started_at(&self) -> Option<Millis> {
        self.run.as_ref().map(|r| r.started_at)
    }

    /// Starts the sequence for a decided snapshot. Returns `false` when one
    /// is already running or the snapshot names no winner on either side.
    pub fn begin(
        &mut self,
        snap: &MatchSnapshot,
        match_id: Option<&str>,
        display: [Vec2; 2],
        now: Millis,
        timers: &mut Timers<Wake>,
    ) -> bool {
        if self.run.is_some() || !snap.game_over {
            return false;
        }
        let Some(winner) = snap.winner_side() else {
            return false;
        };
        self.epoch += 1;
        let epoch = self.epoch;

        let loser = winner.opponent();
        let mut targets = display;
        targets[loser.index()] = ring_out_target(display[loser.index()], loser);

        let t = self.timings;
        let mut ids = SmallVec::new();
        for (at, step) in [
            (now + t.shake_ms.min(t.ring_out_ms), ConclusionStep::ShakeEnd),
            (now + t.ring_out_ms, ConclusionStep::Decision),
            (now + t.ring_out_ms + t.decision_ms, ConclusionStep::Winner),
            (now + t.total_ms(), ConclusionStep::Reset),
        ] {
            ids.push(timers.schedule_at(at, Wake::Conclusion { epoch, step }));
        }

        let winner_name = snap.winner_display_name();
        info!("Match concluded: {winner_name} wins. Ring-out begins.");
        self.run = Some(Run {
            epoch,
            phase: ConclusionPhase::RingOut,
            started_at: now,
            winner,
            winner_name,
            match_id: match_id.map(str::to_owned),
            shaking: true,
            ring_out: Smoothing {
                targets,
                rate: t.ring_out_rate,
            },
            timers: ids,
        });
        true
    }

    /// Applies a fired step. Returns it if it belonged to the running
    /// sequence.
    pub fn on_wake(&mut self, epoch: u64, step: ConclusionStep) -> Option<ConclusionStep> {
        let run = self.run.as_mut().filter(|r| r.epoch == epoch)?;
        match step {
            ConclusionStep::ShakeEnd => run.shaking = false,
            ConclusionStep::Decision => {
                run.phase = ConclusionPhase::Decision;
                run.shaking = false;
            }
            ConclusionStep::Winner => run.phase = ConclusionPhase::Winner,
            ConclusionStep::Reset => {
                info!("Conclusion finished; returning to discovery.");
                self.run = None;
            }
        }
        Some(step)
    }

    /// Motion rule while concluding: the ring-out drift, then a hold.
    pub fn motion(&self) -> Option<&dyn MotionLaw> {
        let run = self.run.as_ref()?;
        let law: &dyn MotionLaw = match run.phase {
            ConclusionPhase::RingOut => &run.ring_out,
            ConclusionPhase::Decision | ConclusionPhase::Winner => &Hold,
        };
        Some(law)
    }

    pub fn cancel(&mut self, timers: &mut Timers<Wake>) {
        if let Some(run) = self.run.take() {
            for id in run.timers {
                timers.cancel(id);
            }
            info!(
                "Conclusion started at {}ms cancelled during {}.",
                run.started_at,
                run.phase.as_str()
            );
        }
        self.epoch += 1;
    }
}
