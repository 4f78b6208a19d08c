use crate::core::network::{FeedError, Transport};
use crate::core::timers::{Millis, TimerId, Timers};
use crate::game::Wake;
use crate::game::snapshot::MatchSnapshot;
use log::{debug, info, warn};

/// Keeps the ring populated from the server's demo feed while no real match
/// is being followed. The watch screen decides when it may run; the driver
/// only guarantees that once stopped, nothing it requested earlier gets
/// through.
#[derive(Debug)]
pub struct DemoDriver {
    interval_ms: Millis,
    epoch: u64,
    active: bool,
    timer: Option<TimerId>,
    // Token (epoch) of the outstanding request. Replies echo it back.
    in_flight: Option<u64>,
}

impl DemoDriver {
    pub const fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms,
            epoch: 0,
            active: false,
            timer: None,
            in_flight: None,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self, now: Millis, timers: &mut Timers<Wake>) {
        if self.active {
            return;
        }
        self.active = true;
        self.epoch += 1;
        self.timer = Some(timers.schedule_at(now, Wake::DemoPoll { epoch: self.epoch }));
        info!("Demo feed started.");
    }

    pub fn stop(&mut self, timers: &mut Timers<Wake>) {
        if !self.active {
            return;
        }
        if let Some(id) = self.timer.take() {
            timers.cancel(id);
        }
        self.active = false;
        self.epoch += 1;
        info!("Demo feed stopped.");
    }

    pub fn on_wake(
        &mut self,
        epoch: u64,
        due: Millis,
        timers: &mut Timers<Wake>,
        transport: &mut dyn Transport,
    ) {
        if !self.active || epoch != self.epoch {
            return;
        }
        self.timer = Some(timers.schedule_at(
            due + self.interval_ms,
            Wake::DemoPoll { epoch: self.epoch },
        ));
        // A request from an older run may still be outstanding; its reply
        // carries the old token and is discarded, so it does not block a
        // fresh one.
        if self.in_flight != Some(self.epoch) {
            self.in_flight = Some(self.epoch);
            transport.request_demo_state(self.epoch);
        }
    }

    /// Returns the decoded snapshot if `token` is the current run's
    /// outstanding request.
    pub fn on_response(
        &mut self,
        token: u64,
        body: Result<String, FeedError>,
    ) -> Option<MatchSnapshot> {
        if !self.active || token != self.epoch || self.in_flight != Some(token) {
            debug!("Discarding demo state requested under token {token}.");
            return None;
        }
        self.in_flight = None;
        match body {
            Ok(text) => match MatchSnapshot::decode(&text) {
                Ok(snap) => Some(snap),
                Err(e) => {
                    warn!("Malformed demo state dropped: {e}");
                    None
                }
            },
            Err(e) => {
                debug!("Demo state poll failed: {e}");
                None
            }
        }
    }
}
