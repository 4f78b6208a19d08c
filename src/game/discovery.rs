use crate::core::network::{FeedError, Transport};
use crate::core::timers::{Millis, TimerId, Timers};
use crate::game::Wake;
use crate::game::snapshot::ActiveMatch;
use log::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Unchanged,
    NoMatch,
    NewMatch(String),
}

/// Asks the server for the active match on a fixed interval.
///
/// The poller never fails: request and decode errors are logged and the next
/// tick simply asks again. At most one request is in flight.
#[derive(Debug)]
pub struct DiscoveryPoller {
    interval_ms: Millis,
    epoch: u64,
    timer: Option<TimerId>,
    running: bool,
    in_flight: bool,
    reported_no_match: bool,
    // A match that already ran to its conclusion; the server may keep
    // advertising it for a while.
    concluded: Option<String>,
}

impl DiscoveryPoller {
    pub const fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms,
            epoch: 0,
            timer: None,
            running: false,
            in_flight: false,
            reported_no_match: false,
            concluded: None,
        }
    }

    /// The last answer was "no active match".
    pub const fn reported_no_match(&self) -> bool {
        self.reported_no_match
    }

    /// Starts polling with an immediate first check.
    pub fn start(&mut self, now: Millis, timers: &mut Timers<Wake>) {
        if self.running {
            return;
        }
        self.running = true;
        self.schedule(now, timers);
    }

    /// Replaces the pending tick with an immediate one.
    pub fn poll_now(&mut self, now: Millis, timers: &mut Timers<Wake>) {
        if !self.running {
            return;
        }
        if let Some(id) = self.timer.take() {
            timers.cancel(id);
        }
        self.schedule(now, timers);
    }

    pub fn cancel(&mut self, timers: &mut Timers<Wake>) {
        if let Some(id) = self.timer.take() {
            timers.cancel(id);
        }
        self.running = false;
        self.in_flight = false;
        self.epoch += 1;
    }

    fn schedule(&mut self, at: Millis, timers: &mut Timers<Wake>) {
        self.epoch += 1;
        self.timer = Some(timers.schedule_at(at, Wake::DiscoveryPoll { epoch: self.epoch }));
    }

    pub fn on_wake(
        &mut self,
        epoch: u64,
        due: Millis,
        timers: &mut Timers<Wake>,
        transport: &mut dyn Transport,
    ) {
        if !self.running || epoch != self.epoch {
            return;
        }
        // Next tick is relative to this one's due time, not the frame that
        // happened to pop it.
        self.schedule(due + self.interval_ms, timers);
        if !self.in_flight {
            self.in_flight = true;
            transport.request_active_match();
        }
    }

    pub fn on_response(
        &mut self,
        body: Result<String, FeedError>,
        tracked: Option<&str>,
    ) -> Discovery {
        self.in_flight = false;
        if !self.running {
            return Discovery::Unchanged;
        }
        let answer = match body.and_then(|text| Ok(ActiveMatch::decode(&text)?)) {
            Ok(answer) => answer,
            Err(e) => {
                debug!("Active match poll failed: {e}");
                return Discovery::Unchanged;
            }
        };
        let Some(id) = answer.match_id else {
            self.reported_no_match = true;
            return Discovery::NoMatch;
        };
        self.reported_no_match = false;
        if tracked == Some(id.as_str()) || self.concluded.as_deref() == Some(id.as_str()) {
            return Discovery::Unchanged;
        }
        info!("Discovered active match '{id}'.");
        Discovery::NewMatch(id)
    }

    /// Remembers `match_id` as finished so it is not entered again.
    pub fn mark_concluded(&mut self, match_id: &str) {
        self.concluded = Some(match_id.to_owned());
    }
}
