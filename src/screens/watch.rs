//! The watch screen: owns every piece of the live viewer and is the only
//! place that decides which feed drives the ring.
//!
//! Each frame it drains transport results, fires due timers, retires
//! overlays and advances motion, in that order. Discovery is the sole
//! arbiter between the demo feed and the live stream: the demo only runs
//! while nothing real is tracked and no conclusion is playing.

use crate::config::Config;
use crate::core::network::{Transport, TransportEvent};
use crate::core::timers::{Fired, Millis, Timers};
use crate::game::Wake;
use crate::game::channel::{ChannelUpdate, LiveChannel, Reconnect};
use crate::game::conclusion::{Choreographer, ConclusionPhase, ConclusionStep, ConclusionTimings};
use crate::game::connection::{Arbiter, ConnectionState, Transition};
use crate::game::demo::DemoDriver;
use crate::game::discovery::{Discovery, DiscoveryPoller};
use crate::game::motion::Interpolator;
use crate::game::overlays::{ActiveOverlay, EventSequencer, OverlayDurations, ScreenEffects};
use crate::game::snapshot::{MatchPhase, MatchSnapshot, Side};
use glam::Vec2;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Demo,
    Live,
}

pub struct State {
    timers: Timers<Wake>,
    arbiter: Arbiter,
    discovery: DiscoveryPoller,
    demo: DemoDriver,
    demo_enabled: bool,
    channel: LiveChannel,
    interp: Interpolator,
    events: EventSequencer,
    conclusion: Choreographer,
    snapshot: Option<MatchSnapshot>,
    source: Option<Source>,
    now: Millis,
    inbox: Vec<TransportEvent>,
    torn_down: bool,
}

/// What the renderer gets each frame. Read-only.
#[derive(Debug)]
pub struct FrameView<'a> {
    pub now: Millis,
    pub connection: ConnectionState,
    pub match_id: Option<&'a str>,
    pub source: Option<Source>,
    pub phase: Option<MatchPhase>,
    pub snapshot: Option<&'a MatchSnapshot>,
    pub display: Option<[Vec2; 2]>,
    pub overlays: Vec<ActiveOverlay>,
    pub effects: ScreenEffects,
    pub conclusion: Option<ConclusionPhase>,
    pub winner: Option<(Side, &'a str)>,
}

pub fn init(cfg: &Config, now: Millis) -> State {
    let mut state = State {
        timers: Timers::new(),
        arbiter: Arbiter::default(),
        discovery: DiscoveryPoller::new(cfg.active_match_poll_ms),
        demo: DemoDriver::new(cfg.demo_poll_ms),
        demo_enabled: cfg.demo_enabled,
        channel: LiveChannel::new(cfg.reconnect_delay_ms),
        interp: Interpolator::new(cfg.lerp_factor),
        events: EventSequencer::new(OverlayDurations {
            skill_ms: cfg.skill_popup_ms,
            matta_ms: cfg.matta_flash_ms,
            tachiai_ms: cfg.tachiai_burst_ms,
        }),
        conclusion: Choreographer::new(ConclusionTimings {
            ring_out_ms: cfg.ring_out_ms,
            decision_ms: cfg.decision_ms,
            winner_ms: cfg.winner_display_ms,
            shake_ms: cfg.shake_ms,
            ring_out_rate: cfg.ring_out_lerp_factor,
        }),
        snapshot: None,
        source: None,
        now,
        inbox: Vec::new(),
        torn_down: false,
    };
    state.discovery.start(now, &mut state.timers);
    sync_demo(&mut state);
    info!("Watch screen mounted.");
    state
}

pub fn update(state: &mut State, now: Millis, transport: &mut dyn Transport) {
    let mut inbox = std::mem::take(&mut state.inbox);
    transport.poll_events(&mut inbox);
    if state.torn_down {
        inbox.clear();
        state.inbox = inbox;
        return;
    }
    state.now = state.now.max(now);

    for event in inbox.drain(..) {
        handle_transport(state, event, transport);
    }
    state.inbox = inbox;

    while let Some(fired) = state.timers.pop_due(state.now) {
        handle_wake(state, fired, transport);
    }

    state.events.retire(state.now);
    match state.conclusion.motion() {
        Some(law) => state.interp.step_with(law),
        None => state.interp.step(),
    }
    sync_demo(state);
}

pub fn frame(state: &State) -> FrameView<'_> {
    let mut effects = state.events.effects(state.now);
    effects.shake = state.conclusion.shaking();
    FrameView {
        now: state.now,
        connection: state.arbiter.state(),
        match_id: state.arbiter.match_id(),
        source: state.source,
        phase: state.snapshot.as_ref().map(MatchSnapshot::effective_phase),
        snapshot: state.snapshot.as_ref(),
        display: state.interp.display(),
        overlays: state.events.active_overlays(),
        effects,
        conclusion: state.conclusion.phase(),
        winner: state.conclusion.winner(),
    }
}

/// Unmount. Cancels every timer, the stream and any running conclusion;
/// nothing fires afterwards.
pub fn shutdown(state: &mut State, transport: &mut dyn Transport) {
    if state.torn_down {
        return;
    }
    state.torn_down = true;
    state.discovery.cancel(&mut state.timers);
    state.demo.stop(&mut state.timers);
    state.conclusion.cancel(&mut state.timers);
    state.channel.close(transport, &mut state.timers);
    state.timers.clear();
    state.arbiter.release();
    clear_presentation(state);
    info!("Watch screen unmounted.");
}

fn handle_transport(state: &mut State, event: TransportEvent, transport: &mut dyn Transport) {
    match event {
        TransportEvent::ActiveMatch(body) => {
            match state.discovery.on_response(body, state.arbiter.match_id()) {
                Discovery::NewMatch(id) => switch_to_match(state, &id, transport),
                Discovery::NoMatch | Discovery::Unchanged => {}
            }
        }
        TransportEvent::DemoState { token, body } => {
            if let Some(snap) = state.demo.on_response(token, body) {
                apply_snapshot(state, snap, Source::Demo);
            }
        }
        TransportEvent::Channel { id, event } => {
            let concluding = state.conclusion.is_active();
            match state
                .channel
                .on_event(id, event, concluding, state.now, &mut state.timers)
            {
                ChannelUpdate::Stale | ChannelUpdate::Dropped => {}
                ChannelUpdate::Opened => {
                    state.arbiter.apply(Transition::Opened);
                }
                ChannelUpdate::Snapshot(snap) => apply_snapshot(state, *snap, Source::Live),
                ChannelUpdate::Ended { normal } => {
                    if !concluding {
                        debug!("Stream ended (normal: {normal}) before a result.");
                        release_match(state);
                    }
                }
                ChannelUpdate::LostAbnormally { retry_at } => {
                    if state.arbiter.apply(Transition::LostAbnormally) {
                        debug!("Waiting until {retry_at}ms to reconnect.");
                    }
                }
            }
        }
    }
}

fn handle_wake(state: &mut State, fired: Fired<Wake>, transport: &mut dyn Transport) {
    match fired.payload {
        Wake::DiscoveryPoll { epoch } => {
            state
                .discovery
                .on_wake(epoch, fired.due, &mut state.timers, transport);
        }
        Wake::DemoPoll { epoch } => {
            state
                .demo
                .on_wake(epoch, fired.due, &mut state.timers, transport);
        }
        Wake::Reconnect { channel } => {
            let still_wanted = state.arbiter.match_id().is_some()
                && state.arbiter.match_id() == state.channel.match_id()
                && !state.discovery.reported_no_match()
                && !state.conclusion.is_active();
            match state.channel.on_reconnect_wake(channel, still_wanted, transport) {
                Reconnect::Stale | Reconnect::Retrying => {}
                Reconnect::Abandoned => release_match(state),
            }
        }
        Wake::Conclusion { epoch, step } => {
            let concluded_id = state.conclusion.match_id().map(str::to_owned);
            if state.conclusion.on_wake(epoch, step) == Some(ConclusionStep::Reset) {
                finish_conclusion(state, concluded_id, transport);
            }
        }
    }
}

fn switch_to_match(state: &mut State, match_id: &str, transport: &mut dyn Transport) {
    if state.conclusion.is_active() {
        state.conclusion.cancel(&mut state.timers);
    }
    state.demo.stop(&mut state.timers);
    clear_presentation(state);
    state.channel.connect(match_id, transport, &mut state.timers);
    state.arbiter.track(match_id);
}

fn apply_snapshot(state: &mut State, snap: MatchSnapshot, source: Source) {
    // The conclusion owns the screen until reset.
    if state.conclusion.is_active() {
        return;
    }
    state.interp.set_targets(snap.targets());
    state.events.ingest(&snap, state.now);

    if snap.is_decided() {
        let display = state.interp.display().unwrap_or_else(|| snap.targets());
        let match_id = match source {
            Source::Live => state.arbiter.match_id(),
            Source::Demo => None,
        };
        let began = state
            .conclusion
            .begin(&snap, match_id, display, state.now, &mut state.timers);
        if began && source == Source::Demo {
            state.demo.stop(&mut state.timers);
            state.arbiter.apply(Transition::DemoStopped);
        }
    }
    state.snapshot = Some(snap);
    state.source = Some(source);
}

fn finish_conclusion(state: &mut State, concluded_id: Option<String>, transport: &mut dyn Transport) {
    if let Some(id) = concluded_id.as_deref() {
        state.discovery.mark_concluded(id);
    }
    state.channel.close(transport, &mut state.timers);
    if state.arbiter.match_id().is_some() {
        state.arbiter.release();
    }
    clear_presentation(state);
    state.discovery.poll_now(state.now, &mut state.timers);
}

fn release_match(state: &mut State) {
    debug!("Releasing tracked match.");
    state.arbiter.release();
    clear_presentation(state);
}

fn clear_presentation(state: &mut State) {
    state.snapshot = None;
    state.source = None;
    state.interp.reset();
    state.events.reset();
}

// Starts or stops the demo feed so it runs exactly when nothing else may.
fn sync_demo(state: &mut State) {
    let allowed = state.demo_enabled
        && !state.torn_down
        && state.arbiter.state().allows_demo()
        && state.arbiter.match_id().is_none()
        && !state.channel.is_live()
        && !state.conclusion.is_active();
    if allowed && !state.demo.is_active() {
        state.demo.start(state.now, &mut state.timers);
        if state.arbiter.state() == ConnectionState::Idle {
            state.arbiter.apply(Transition::DemoStarted);
        }
    } else if !allowed && state.demo.is_active() {
        state.demo.stop(&mut state.timers);
        if state.arbiter.state() == ConnectionState::Demo {
            state.arbiter.apply(Transition::DemoStopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Source, State, frame, init, shutdown, update};
    use crate::config::Config;
    use crate::core::network::{ChannelEvent, ChannelId, CloseKind, Transport, TransportEvent};
    use crate::game::Wake;
    use crate::game::conclusion::ConclusionPhase;
    use crate::game::connection::ConnectionState;
    use crate::game::snapshot::Side;

    #[derive(Default)]
    struct Scripted {
        queued: Vec<TransportEvent>,
        discovery_requests: usize,
        demo_requests: usize,
        demo_tokens: Vec<u64>,
        opened: Vec<(ChannelId, String)>,
        closed: Vec<ChannelId>,
    }

    impl Scripted {
        fn active(&mut self, match_id: Option<&str>) {
            let body = match match_id {
                Some(id) => format!(r#"{{"match_id": "{id}", "status": "active"}}"#),
                None => r#"{"match_id": null, "status": "idle"}"#.to_string(),
            };
            self.queued.push(TransportEvent::ActiveMatch(Ok(body)));
        }

        /// Answers the most recent demo request.
        fn demo(&mut self, x1: f32, x2: f32) {
            let token = *self.demo_tokens.last().expect("a demo request was made");
            self.demo_with(token, x1, x2);
        }

        fn demo_with(&mut self, token: u64, x1: f32, x2: f32) {
            let body = Ok(snapshot_json(x1, x2, None));
            self.queued.push(TransportEvent::DemoState { token, body });
        }

        fn channel(&mut self, event: ChannelEvent) {
            let (id, _) = self.opened.last().cloned().expect("a stream was opened");
            self.queued.push(TransportEvent::Channel { id, event });
        }

        fn snapshot(&mut self, x1: f32, x2: f32, winner: Option<&str>) {
            self.channel(ChannelEvent::Message(snapshot_json(x1, x2, winner)));
        }
    }

    impl Transport for Scripted {
        fn request_active_match(&mut self) {
            self.discovery_requests += 1;
        }
        fn request_demo_state(&mut self, token: u64) {
            self.demo_requests += 1;
            self.demo_tokens.push(token);
        }
        fn open_channel(&mut self, id: ChannelId, match_id: &str) {
            self.opened.push((id, match_id.to_owned()));
        }
        fn close_channel(&mut self, id: ChannelId) {
            self.closed.push(id);
        }
        fn poll_events(&mut self, out: &mut Vec<TransportEvent>) {
            out.append(&mut self.queued);
        }
    }

    fn snapshot_json(x1: f32, x2: f32, winner: Option<&str>) -> String {
        let (over, winner) = match winner {
            Some(w) => ("true", format!("\"{w}\"")),
            None => ("false", "null".to_string()),
        };
        format!(
            r#"{{"phase": "FIGHTING", "t": 1.0, "game_over": {over}, "winner": {winner},
                 "p1": {{"id": "w1", "x": {x1}, "y": 16, "name": "Asa", "color": "200,40,40"}},
                 "p2": {{"id": "w2", "x": {x2}, "y": 16, "name": "Bando", "color": "40,40,200"}}}}"#
        )
    }

    fn config(demo: bool) -> Config {
        Config {
            demo_enabled: demo,
            ..Config::default()
        }
    }

    fn assert_exclusive(state: &State) {
        assert!(
            !(state.demo.is_active() && state.channel.is_live()),
            "demo and live stream must never drive the ring together"
        );
    }

    /// Steps frames of `dt` from `from` (exclusive) up to `to` (inclusive).
    fn run(state: &mut State, net: &mut Scripted, from: u64, to: u64, dt: u64) {
        let mut now = from;
        while now < to {
            now = (now + dt).min(to);
            update(state, now, net);
            assert_exclusive(state);
        }
    }

    /// Mounts and follows `m1` until the stream reports open.
    fn connected(demo: bool) -> (State, Scripted) {
        let mut net = Scripted::default();
        let mut state = init(&config(demo), 0);
        update(&mut state, 0, &mut net);
        net.active(Some("m1"));
        update(&mut state, 16, &mut net);
        net.channel(ChannelEvent::Opened);
        update(&mut state, 32, &mut net);
        assert_eq!(state.arbiter.state(), ConnectionState::Connected);
        (state, net)
    }

    #[test]
    fn scenario_a_first_snapshot_snaps_then_smooths() {
        let (mut state, mut net) = connected(false);
        assert_eq!(net.opened[0].1, "m1");

        net.snapshot(12.0, 40.0, None);
        update(&mut state, 48, &mut net);
        let display = frame(&state).display.expect("display after first snapshot");
        assert_eq!(display[0].x, 12.0, "first snapshot snaps");

        net.snapshot(14.0, 40.0, None);
        update(&mut state, 64, &mut net);
        let x = frame(&state).display.unwrap()[0].x;
        assert!((x - 12.5).abs() < 1e-5, "one smoothing step toward 14, got {x}");

        for (i, target) in [16.0, 18.0, 20.0].into_iter().enumerate() {
            net.snapshot(target, 40.0, None);
            update(&mut state, 80 + i as u64 * 16, &mut net);
        }
        let mut last = f32::MAX;
        for frame_no in 0..60 {
            update(&mut state, 200 + frame_no * 16, &mut net);
            let x = frame(&state).display.unwrap()[0].x;
            assert!(x <= 20.0, "no overshoot");
            assert!(20.0 - x <= last, "keeps closing in between snapshots");
            last = 20.0 - x;
        }
        assert!(last < 1e-3);
    }

    #[test]
    fn scenario_b_abnormal_close_reconnects_once_after_delay() {
        let (mut state, mut net) = connected(false);
        net.channel(ChannelEvent::Closed(CloseKind::Abnormal));
        update(&mut state, 1000, &mut net);
        assert_eq!(state.arbiter.state(), ConnectionState::Reconnecting);

        run(&mut state, &mut net, 1000, 2999, 16);
        assert_eq!(net.opened.len(), 1, "no reconnect before 2000ms have passed");
        update(&mut state, 3000, &mut net);
        assert_eq!(net.opened.len(), 2, "exactly one reconnect attempt");
        assert_eq!(net.opened[1].1, "m1");
        run(&mut state, &mut net, 3000, 8000, 16);
        assert_eq!(net.opened.len(), 2, "no busy reconnect loop");

        net.channel(ChannelEvent::Opened);
        update(&mut state, 8016, &mut net);
        assert_eq!(state.arbiter.state(), ConnectionState::Connected);
    }

    #[test]
    fn failed_reconnect_waits_the_full_delay_again() {
        let (mut state, mut net) = connected(false);
        net.channel(ChannelEvent::Closed(CloseKind::Abnormal));
        update(&mut state, 100, &mut net);
        update(&mut state, 2100, &mut net);
        assert_eq!(net.opened.len(), 2);

        net.channel(ChannelEvent::Closed(CloseKind::Abnormal));
        update(&mut state, 2116, &mut net);
        run(&mut state, &mut net, 2116, 4115, 16);
        assert_eq!(net.opened.len(), 2);
        update(&mut state, 4116, &mut net);
        assert_eq!(net.opened.len(), 3);
        assert_eq!(state.arbiter.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn scenario_c_conclusion_runs_to_reset() {
        let (mut state, mut net) = connected(false);
        net.snapshot(20.0, 44.0, None);
        update(&mut state, 48, &mut net);

        let t0 = 1000;
        net.snapshot(20.0, 47.0, Some("w1"));
        update(&mut state, t0, &mut net);
        let view = frame(&state);
        assert_eq!(view.conclusion, Some(ConclusionPhase::RingOut));
        assert_eq!(view.winner, Some((Side::Left, "Asa")));
        assert!(view.effects.shake);

        net.snapshot(20.0, 47.0, Some("w1"));
        update(&mut state, t0 + 16, &mut net);
        assert_eq!(state.conclusion.started_at(), Some(t0), "duplicate game over ignored");

        run(&mut state, &mut net, t0 + 16, t0 + 2999, 16);
        assert_eq!(frame(&state).conclusion, Some(ConclusionPhase::RingOut));
        assert!(!frame(&state).effects.shake);
        update(&mut state, t0 + 3000, &mut net);
        assert_eq!(frame(&state).conclusion, Some(ConclusionPhase::Decision));
        update(&mut state, t0 + 5999, &mut net);
        assert_eq!(frame(&state).conclusion, Some(ConclusionPhase::Decision));
        update(&mut state, t0 + 6000, &mut net);
        assert_eq!(frame(&state).conclusion, Some(ConclusionPhase::Winner));

        // Frame by frame so every discovery tick of the winner phase sees the
        // poll made before the ring-out still outstanding and skips.
        let polls_before = net.discovery_requests;
        run(&mut state, &mut net, t0 + 6000, t0 + 10_998, 16);
        assert_eq!(net.discovery_requests, polls_before);
        // That poll finally lands just before reset.
        net.active(Some("m1"));
        update(&mut state, t0 + 10_999, &mut net);
        assert_eq!(frame(&state).conclusion, Some(ConclusionPhase::Winner));
        update(&mut state, t0 + 11_000, &mut net);
        let view = frame(&state);
        assert_eq!(view.conclusion, None);
        assert_eq!(view.connection, ConnectionState::Idle);
        assert!(view.snapshot.is_none());
        assert!(!state.channel.is_live());
        assert_eq!(net.closed.len(), 1, "stream closed at reset");

        assert!(net.discovery_requests > polls_before, "discovery re-armed at reset");

        // The server still advertises the finished match for a while.
        net.active(Some("m1"));
        update(&mut state, t0 + 11_016, &mut net);
        assert_eq!(net.opened.len(), 1, "a concluded match is not re-entered");
    }

    #[test]
    fn ring_out_carries_loser_outside_while_snapshots_are_ignored() {
        let (mut state, mut net) = connected(false);
        net.snapshot(20.0, 44.0, None);
        update(&mut state, 48, &mut net);
        net.snapshot(20.0, 44.0, Some("w1"));
        update(&mut state, 64, &mut net);

        net.snapshot(5.0, 5.0, None);
        run(&mut state, &mut net, 64, 3000, 16);
        let display = frame(&state).display.unwrap();
        assert_eq!(display[0].x, 20.0, "winner held in place");
        assert!(display[1].x > 32.0 + 14.0, "loser carried past the ring edge");
    }

    #[test]
    fn scenario_d_real_match_preempts_demo() {
        let mut net = Scripted::default();
        let mut state = init(&config(true), 0);
        assert_eq!(state.arbiter.state(), ConnectionState::Demo);
        update(&mut state, 0, &mut net);
        assert_eq!(net.demo_requests, 1);

        net.demo(25.0, 39.0);
        update(&mut state, 16, &mut net);
        assert_eq!(frame(&state).source, Some(Source::Demo));
        run(&mut state, &mut net, 16, 100, 16);
        let demo_polls = net.demo_requests;
        assert!(demo_polls >= 2);

        net.active(Some("m7"));
        update(&mut state, 116, &mut net);
        assert!(!state.demo.is_active(), "demo stops on the same frame");
        assert_eq!(net.opened.len(), 1);
        assert_eq!(net.opened[0].1, "m7");
        assert_eq!(state.arbiter.state(), ConnectionState::Connecting);

        // A reply the demo worker was still carrying must not leak through.
        net.demo(1.0, 1.0);
        run(&mut state, &mut net, 116, 1000, 16);
        assert_eq!(net.demo_requests, demo_polls);
        assert!(frame(&state).snapshot.is_none());
    }

    #[test]
    fn demo_reply_from_before_a_match_is_ignored_once_demo_resumes() {
        let mut net = Scripted::default();
        let mut state = init(&config(true), 0);
        update(&mut state, 0, &mut net);
        let old_token = net.demo_tokens[0];

        net.active(Some("m7"));
        update(&mut state, 16, &mut net);
        assert!(!state.demo.is_active());
        net.channel(ChannelEvent::Closed(CloseKind::Normal));
        update(&mut state, 32, &mut net);
        assert!(state.demo.is_active(), "demo restarts once the match is released");
        update(&mut state, 48, &mut net);
        assert_eq!(net.demo_requests, 2);
        assert_ne!(net.demo_tokens[1], old_token);

        net.demo_with(old_token, 1.0, 1.0);
        update(&mut state, 64, &mut net);
        assert!(frame(&state).snapshot.is_none(), "reply from the stopped run is dropped");

        net.demo(25.0, 39.0);
        update(&mut state, 80, &mut net);
        let view = frame(&state);
        assert_eq!(view.source, Some(Source::Demo));
        assert_eq!(view.display.expect("demo display")[0].x, 25.0);
    }

    #[test]
    fn demo_waits_for_reset_even_if_match_disappears() {
        let (mut state, mut net) = connected(true);
        assert!(!state.demo.is_active());
        net.snapshot(20.0, 44.0, Some("w2"));
        update(&mut state, 100, &mut net);
        assert!(state.conclusion.is_active());

        net.channel(ChannelEvent::Closed(CloseKind::Abnormal));
        net.active(None);
        run(&mut state, &mut net, 100, 11_099, 16);
        assert!(!state.demo.is_active(), "no demo during the conclusion");
        assert_eq!(net.opened.len(), 1, "no reconnect after the match concluded");

        update(&mut state, 11_100, &mut net);
        assert!(state.demo.is_active(), "demo resumes after reset");
        assert_eq!(state.arbiter.state(), ConnectionState::Demo);
    }

    #[test]
    fn new_match_cancels_running_conclusion() {
        let (mut state, mut net) = connected(false);
        net.snapshot(20.0, 44.0, Some("w1"));
        update(&mut state, 100, &mut net);
        assert!(state.conclusion.is_active());

        net.active(Some("m2"));
        update(&mut state, 500, &mut net);
        assert!(!state.conclusion.is_active());
        assert!(
            !state.timers.iter().any(|w| matches!(w, Wake::Conclusion { .. })),
            "every conclusion deadline is cancelled"
        );
        assert_eq!(net.opened.last().map(|(_, m)| m.as_str()), Some("m2"));
        assert_eq!(net.closed.len(), 1, "old stream closed before the new one opened");

        run(&mut state, &mut net, 500, 12_000, 16);
        assert_eq!(state.arbiter.match_id(), Some("m2"), "stale reset never fires");
    }

    #[test]
    fn teardown_mid_conclusion_silences_everything() {
        let (mut state, mut net) = connected(false);
        net.snapshot(20.0, 44.0, Some("w1"));
        update(&mut state, 100, &mut net);
        shutdown(&mut state, &mut net);
        assert!(state.timers.is_empty());
        assert_eq!(net.closed.len(), 1);

        let polls = net.discovery_requests;
        net.snapshot(20.0, 44.0, None);
        net.active(Some("m9"));
        run(&mut state, &mut net, 100, 15_000, 16);
        let view = frame(&state);
        assert_eq!(view.conclusion, None);
        assert!(view.snapshot.is_none());
        assert_eq!(net.discovery_requests, polls);
        assert_eq!(net.opened.len(), 1);
    }

    #[test]
    fn reconnect_abandoned_when_discovery_sees_no_match() {
        let (mut state, mut net) = connected(false);
        net.channel(ChannelEvent::Closed(CloseKind::Abnormal));
        update(&mut state, 100, &mut net);
        net.active(None);
        update(&mut state, 116, &mut net);

        update(&mut state, 2100, &mut net);
        assert_eq!(net.opened.len(), 1, "match is gone, no reconnect");
        assert_eq!(state.arbiter.state(), ConnectionState::Idle);
        assert_eq!(state.arbiter.match_id(), None);
    }

    #[test]
    fn normal_close_releases_match() {
        let (mut state, mut net) = connected(false);
        net.snapshot(20.0, 44.0, None);
        net.channel(ChannelEvent::Closed(CloseKind::Normal));
        update(&mut state, 100, &mut net);
        assert_eq!(state.arbiter.state(), ConnectionState::Idle);
        assert!(frame(&state).snapshot.is_none());
        run(&mut state, &mut net, 100, 5000, 16);
        assert_eq!(net.opened.len(), 1);
    }

    #[test]
    fn malformed_snapshot_keeps_previous_display() {
        let (mut state, mut net) = connected(false);
        net.snapshot(20.0, 44.0, None);
        update(&mut state, 48, &mut net);
        let before = frame(&state).display;

        net.channel(ChannelEvent::Message("{\"p1\": ".into()));
        update(&mut state, 64, &mut net);
        assert_eq!(frame(&state).display, before);
        assert_eq!(state.arbiter.state(), ConnectionState::Connected);
    }

    #[test]
    fn live_events_become_overlays() {
        let (mut state, mut net) = connected(false);
        net.channel(ChannelEvent::Message(
            r#"{"phase": "FIGHTING", "t": 4.0,
                "events": [{"type": "skill", "wrestler_id": "w2", "skill_name": "PUSH!",
                            "skill_jp": "押し", "timestamp": 4.0},
                           {"type": "tachiai", "timestamp": 4.0}],
                "p1": {"id": "w1", "x": 30, "y": 16}, "p2": {"id": "w2", "x": 34, "y": 16}}"#
                .into(),
        ));
        update(&mut state, 100, &mut net);
        let view = frame(&state);
        assert_eq!(view.overlays.len(), 1);
        assert_eq!(view.overlays[0].side, Side::Right);
        assert!(view.effects.tachiai_burst);

        update(&mut state, 1600, &mut net);
        assert!(frame(&state).overlays.is_empty());
    }
}
