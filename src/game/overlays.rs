use crate::core::timers::Millis;
use crate::game::snapshot::{MatchEvent, MatchSnapshot, Side};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Identifies one popup. Events are keyed by their timestamp; `seq`
/// separates distinct events that share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayKey {
    pub timestamp_bits: u64,
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOverlay {
    pub key: OverlayKey,
    pub event: MatchEvent,
    pub side: Side,
    pub expires_at: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenEffects {
    pub matta_flash: bool,
    pub tachiai_burst: bool,
    pub shake: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayDurations {
    pub skill_ms: Millis,
    pub matta_ms: Millis,
    pub tachiai_ms: Millis,
}

impl Default for OverlayDurations {
    fn default() -> Self {
        Self {
            skill_ms: 1500,
            matta_ms: 1500,
            tachiai_ms: 1000,
        }
    }
}

/// How far behind the newest snapshot tick an event is still remembered
/// for de-duplication, in match seconds.
const EVENT_MEMORY_SECS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Fingerprint {
    Skill {
        at: u64,
        wrestler_id: String,
        skill_name: String,
    },
    Matta {
        at: u64,
        offender: Side,
    },
    Tachiai {
        at: u64,
    },
}

impl Fingerprint {
    fn at(&self) -> f64 {
        let (Self::Skill { at, .. } | Self::Matta { at, .. } | Self::Tachiai { at }) = self;
        f64::from_bits(*at)
    }
}

fn fingerprint(event: &MatchEvent) -> Option<Fingerprint> {
    Some(match event {
        MatchEvent::Skill {
            wrestler_id,
            skill_name,
            timestamp,
            ..
        } => Fingerprint::Skill {
            at: timestamp.to_bits(),
            wrestler_id: wrestler_id.clone(),
            skill_name: skill_name.clone(),
        },
        MatchEvent::Matta {
            offender,
            timestamp,
        } => Fingerprint::Matta {
            at: timestamp.to_bits(),
            offender: *offender,
        },
        MatchEvent::Tachiai { timestamp } => Fingerprint::Tachiai {
            at: timestamp.to_bits(),
        },
        MatchEvent::Unknown => return None,
    })
}

type SideQueue = SmallVec<[ActiveOverlay; 4]>;

/// Turns snapshot events into timed popups and full-screen effects.
#[derive(Debug, Default)]
pub struct EventSequencer {
    durations: OverlayDurations,
    queues: [SideQueue; 2],
    matta_until: Option<Millis>,
    tachiai_until: Option<Millis>,
    scheduled: FxHashSet<Fingerprint>,
    next_seq: FxHashMap<u64, u32>,
    newest_tick: Option<f64>,
}

impl EventSequencer {
    pub fn new(durations: OverlayDurations) -> Self {
        Self {
            durations,
            ..Self::default()
        }
    }

    /// Schedules every event in `snap` not seen before. Returns how many
    /// were scheduled.
    pub fn ingest(&mut self, snap: &MatchSnapshot, now: Millis) -> usize {
        self.forget_old_events(snap.t);
        let mut scheduled = 0;
        for event in &snap.events {
            let Some(print) = fingerprint(event) else {
                continue;
            };
            if !self.scheduled.insert(print) {
                continue;
            }
            let (side, duration) = match event {
                MatchEvent::Skill { wrestler_id, .. } => match snap.side_of(wrestler_id) {
                    Some(side) => (side, self.durations.skill_ms),
                    None => {
                        debug!("Skill event for unknown wrestler '{wrestler_id}' ignored.");
                        continue;
                    }
                },
                MatchEvent::Matta { offender, .. } => {
                    extend(&mut self.matta_until, now + self.durations.matta_ms);
                    (*offender, self.durations.matta_ms)
                }
                MatchEvent::Tachiai { .. } => {
                    extend(&mut self.tachiai_until, now + self.durations.tachiai_ms);
                    scheduled += 1;
                    continue;
                }
                MatchEvent::Unknown => continue,
            };
            let Some(timestamp) = event.timestamp() else {
                continue;
            };
            let key = self.next_key(timestamp);
            self.queues[side.index()].push(ActiveOverlay {
                key,
                event: event.clone(),
                side,
                expires_at: now + duration,
            });
            scheduled += 1;
        }
        scheduled
    }

    // Bounds the de-duplication memory. A tick that goes backwards means a
    // new bout on the same feed, so everything remembered is dropped.
    fn forget_old_events(&mut self, tick: f64) {
        if !tick.is_finite() {
            return;
        }
        if self.newest_tick.is_some_and(|newest| tick < newest) {
            debug!("Snapshot tick went back to {tick}; forgetting seen events.");
            self.scheduled.clear();
            self.next_seq.clear();
            self.newest_tick = Some(tick);
            return;
        }
        self.newest_tick = Some(tick);
        let horizon = tick - EVENT_MEMORY_SECS;
        self.scheduled.retain(|print| print.at() >= horizon);
        self.next_seq.retain(|&bits, _| f64::from_bits(bits) >= horizon);
    }

    fn next_key(&mut self, timestamp: f64) -> OverlayKey {
        let timestamp_bits = timestamp.to_bits();
        let seq = self.next_seq.entry(timestamp_bits).or_insert(0);
        let key = OverlayKey {
            timestamp_bits,
            seq: *seq,
        };
        *seq += 1;
        key
    }

    /// Drops everything whose display time has elapsed.
    pub fn retire(&mut self, now: Millis) {
        for queue in &mut self.queues {
            queue.retain(|o| o.expires_at > now);
        }
        if self.matta_until.is_some_and(|t| t <= now) {
            self.matta_until = None;
        }
        if self.tachiai_until.is_some_and(|t| t <= now) {
            self.tachiai_until = None;
        }
    }

    pub fn overlays(&self, side: Side) -> &[ActiveOverlay] {
        &self.queues[side.index()]
    }

    pub fn active_overlays(&self) -> Vec<ActiveOverlay> {
        Side::BOTH
            .into_iter()
            .flat_map(|side| self.overlays(side))
            .cloned()
            .collect()
    }

    pub fn effects(&self, now: Millis) -> ScreenEffects {
        ScreenEffects {
            matta_flash: self.matta_until.is_some_and(|t| now < t),
            tachiai_burst: self.tachiai_until.is_some_and(|t| now < t),
            shake: false,
        }
    }

    pub fn reset(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.matta_until = None;
        self.tachiai_until = None;
        self.scheduled.clear();
        self.next_seq.clear();
        self.newest_tick = None;
    }
}

fn extend(until: &mut Option<Millis>, to: Millis) {
    *until = Some(until.map_or(to, |t| t.max(to)));
}
