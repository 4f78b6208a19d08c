use crate::core::network::{ChannelEvent, ChannelId, CloseKind, Transport};
use crate::core::timers::{Millis, TimerId, Timers};
use crate::game::Wake;
use crate::game::snapshot::MatchSnapshot;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Opening,
    Open,
    /// Lost abnormally; a reconnect is scheduled.
    Waiting,
}

#[derive(Debug)]
struct Link {
    id: ChannelId,
    match_id: String,
    status: LinkStatus,
    reconnect: Option<TimerId>,
}

#[derive(Debug)]
pub enum ChannelUpdate {
    /// Not for the current link.
    Stale,
    Opened,
    Snapshot(Box<MatchSnapshot>),
    /// A message that did not decode. Display state is left as it was.
    Dropped,
    /// The link is gone and will not come back.
    Ended { normal: bool },
    LostAbnormally { retry_at: Millis },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    Stale,
    Retrying,
    Abandoned,
}

/// The receive-only stream for one match. Holds at most one link; opening
/// a new one always closes the old one first.
#[derive(Debug)]
pub struct LiveChannel {
    reconnect_delay_ms: Millis,
    next_id: u64,
    link: Option<Link>,
}

impl LiveChannel {
    pub const fn new(reconnect_delay_ms: Millis) -> Self {
        Self {
            reconnect_delay_ms,
            next_id: 0,
            link: None,
        }
    }

    /// A link exists, open or on its way back.
    pub const fn is_live(&self) -> bool {
        self.link.is_some()
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<LinkStatus> {
        self.link.as_ref().map(|l| l.status)
    }

    pub fn match_id(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.match_id.as_str())
    }

    #[cfg(test)]
    pub fn current_id(&self) -> Option<ChannelId> {
        self.link.as_ref().map(|l| l.id)
    }

    fn allocate(&mut self) -> ChannelId {
        self.next_id += 1;
        ChannelId(self.next_id)
    }

    pub fn connect(
        &mut self,
        match_id: &str,
        transport: &mut dyn Transport,
        timers: &mut Timers<Wake>,
    ) {
        self.close(transport, timers);
        let id = self.allocate();
        info!("Opening stream {} for match '{match_id}'.", id.0);
        transport.open_channel(id, match_id);
        self.link = Some(Link {
            id,
            match_id: match_id.to_owned(),
            status: LinkStatus::Opening,
            reconnect: None,
        });
    }

    pub fn close(&mut self, transport: &mut dyn Transport, timers: &mut Timers<Wake>) {
        let Some(link) = self.link.take() else {
            return;
        };
        if let Some(timer) = link.reconnect {
            timers.cancel(timer);
        }
        if link.status != LinkStatus::Waiting {
            transport.close_channel(link.id);
        }
        debug!("Stream {} for '{}' closed.", link.id.0, link.match_id);
    }

    /// `concluded`: a conclusion sequence is running, so losing the stream
    /// is expected.
    pub fn on_event(
        &mut self,
        id: ChannelId,
        event: ChannelEvent,
        concluded: bool,
        now: Millis,
        timers: &mut Timers<Wake>,
    ) -> ChannelUpdate {
        let Some(link) = self.link.as_mut().filter(|l| l.id == id) else {
            return ChannelUpdate::Stale;
        };
        match event {
            ChannelEvent::Opened => {
                link.status = LinkStatus::Open;
                ChannelUpdate::Opened
            }
            ChannelEvent::Message(text) => match MatchSnapshot::decode(&text) {
                Ok(snap) => ChannelUpdate::Snapshot(Box::new(snap)),
                Err(e) => {
                    warn!("Malformed snapshot on stream {} dropped: {e}", id.0);
                    ChannelUpdate::Dropped
                }
            },
            ChannelEvent::Closed(CloseKind::Normal) => {
                info!("Stream {} closed normally.", id.0);
                self.link = None;
                ChannelUpdate::Ended { normal: true }
            }
            ChannelEvent::Closed(CloseKind::Abnormal) if concluded => {
                debug!("Stream {} dropped after the match concluded.", id.0);
                self.link = None;
                ChannelUpdate::Ended { normal: false }
            }
            ChannelEvent::Closed(CloseKind::Abnormal) => {
                let retry_at = now + self.reconnect_delay_ms;
                link.status = LinkStatus::Waiting;
                link.reconnect = Some(timers.schedule_at(retry_at, Wake::Reconnect { channel: id }));
                warn!(
                    "Stream {} for '{}' lost; reconnecting at {retry_at}ms.",
                    id.0, link.match_id
                );
                ChannelUpdate::LostAbnormally { retry_at }
            }
        }
    }

    /// Handles the reconnect timer for `channel`. `still_wanted` is the
    /// caller's verdict on whether the match is still the one to follow.
    pub fn on_reconnect_wake(
        &mut self,
        channel: ChannelId,
        still_wanted: bool,
        transport: &mut dyn Transport,
    ) -> Reconnect {
        let waiting = self
            .link
            .as_ref()
            .is_some_and(|l| l.id == channel && l.status == LinkStatus::Waiting);
        if !waiting {
            return Reconnect::Stale;
        }
        if !still_wanted {
            if let Some(link) = self.link.take() {
                info!("Not reconnecting to '{}': no longer active.", link.match_id);
            }
            return Reconnect::Abandoned;
        }
        let id = self.allocate();
        let Some(link) = self.link.as_mut() else {
            return Reconnect::Stale;
        };
        link.id = id;
        link.status = LinkStatus::Opening;
        link.reconnect = None;
        info!("Reconnecting to '{}' as stream {}.", link.match_id, id.0);
        transport.open_channel(id, &link.match_id);
        Reconnect::Retrying
    }
}
