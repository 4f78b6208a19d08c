use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Demo,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Demo => "DEMO",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
        }
    }

    /// Demo playback is only allowed from these states.
    pub const fn allows_demo(self) -> bool {
        matches!(self, Self::Idle | Self::Demo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    DemoStarted,
    DemoStopped,
    MatchFound,
    Opened,
    LostAbnormally,
    Released,
}

/// The transition table.
///
/// | from                                  | on             | to           |
/// |---------------------------------------|----------------|--------------|
/// | Idle                                  | DemoStarted    | Demo         |
/// | Demo                                  | DemoStopped    | Idle         |
/// | any                                   | MatchFound     | Connecting   |
/// | Connecting, Reconnecting              | Opened         | Connected    |
/// | Connecting, Connected, Reconnecting   | LostAbnormally | Reconnecting |
/// | any                                   | Released       | Idle         |
pub const fn next(from: ConnectionState, on: Transition) -> Option<ConnectionState> {
    use ConnectionState as S;
    use Transition as T;
    match (from, on) {
        (S::Idle, T::DemoStarted) => Some(S::Demo),
        (S::Demo, T::DemoStopped) => Some(S::Idle),
        (_, T::MatchFound) => Some(S::Connecting),
        (S::Connecting | S::Reconnecting, T::Opened) => Some(S::Connected),
        (S::Connecting | S::Connected | S::Reconnecting, T::LostAbnormally) => {
            Some(S::Reconnecting)
        }
        (_, T::Released) => Some(S::Idle),
        _ => None,
    }
}

/// Holds the two values shared across the viewer: the connection state and
/// the match id being followed. Only the watch screen mutates it, and only
/// through [`Arbiter::apply`], [`Arbiter::track`] and [`Arbiter::release`].
#[derive(Debug, Default)]
pub struct Arbiter {
    state: ConnectionState,
    match_id: Option<String>,
}

impl Arbiter {
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }

    /// Applies `on` if the table allows it; rejected transitions are logged
    /// and leave the state untouched.
    pub fn apply(&mut self, on: Transition) -> bool {
        let Some(to) = next(self.state, on) else {
            warn!(
                "Rejected connection transition {on:?} from {}.",
                self.state.as_str()
            );
            return false;
        };
        if to != self.state {
            info!(
                "Connection {} -> {} ({on:?}).",
                self.state.as_str(),
                to.as_str()
            );
            self.state = to;
        }
        true
    }

    pub fn track(&mut self, match_id: &str) {
        self.match_id = Some(match_id.to_owned());
        self.apply(Transition::MatchFound);
    }

    pub fn release(&mut self) {
        self.match_id = None;
        self.apply(Transition::Released);
    }
}
