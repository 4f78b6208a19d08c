use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

// How often a stream thread wakes from a blocking read to check for close.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("stream error: {0}")]
    Stream(#[from] tungstenite::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifies one physical stream. Every (re)connect gets a fresh id, so
/// events from a socket the viewer already gave up on can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Normal,
    Abnormal,
}

#[derive(Debug)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    Closed(CloseKind),
}

#[derive(Debug)]
pub enum TransportEvent {
    /// Raw body of the active-match endpoint.
    ActiveMatch(Result<String, FeedError>),
    /// Raw body of the demo-state endpoint, with the token it was
    /// requested under.
    DemoState {
        token: u64,
        body: Result<String, FeedError>,
    },
    Channel { id: ChannelId, event: ChannelEvent },
}

/// Everything the viewer needs from the outside world. Requests never
/// block; results come back through [`Transport::poll_events`] on a later
/// frame.
pub trait Transport {
    fn request_active_match(&mut self);
    /// `token` comes back unchanged on the matching
    /// [`TransportEvent::DemoState`].
    fn request_demo_state(&mut self, token: u64);
    fn open_channel(&mut self, id: ChannelId, match_id: &str);
    fn close_channel(&mut self, id: ChannelId);
    fn poll_events(&mut self, out: &mut Vec<TransportEvent>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub active_match_url: String,
    pub demo_state_url: String,
    pub stream_base_url: String,
}

impl Endpoints {
    pub fn new(api_base_url: &str, stream_base_url: &str) -> Self {
        let api = api_base_url.trim_end_matches('/');
        Self {
            active_match_url: format!("{api}/matches/active"),
            demo_state_url: format!("{api}/demo/state"),
            stream_base_url: stream_base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn stream_url(&self, match_id: &str) -> String {
        format!("{}/ws/{match_id}", self.stream_base_url)
    }
}

/// The websocket address that goes with an HTTP API base:
/// `https://host/api` becomes `wss://host`.
pub fn stream_base_for(api_base_url: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };
    base.strip_suffix("/api").map_or_else(|| base.clone(), str::to_owned)
}

pub fn get_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn fetch_text(agent: &ureq::Agent, url: &str) -> Result<String, FeedError> {
    let resp = agent.get(url).call()?;
    let mut body = resp.into_body();
    Ok(body.read_to_string()?)
}

type WrapReply = fn(u64, Result<String, FeedError>) -> TransportEvent;

fn active_match_reply(_token: u64, body: Result<String, FeedError>) -> TransportEvent {
    TransportEvent::ActiveMatch(body)
}

fn demo_state_reply(token: u64, body: Result<String, FeedError>) -> TransportEvent {
    TransportEvent::DemoState { token, body }
}

// One worker per endpoint keeps a slow discovery poll from stalling the
// demo feed. Requests queue on the job channel and are served in order.
fn spawn_http_worker(
    name: &str,
    agent: ureq::Agent,
    url: String,
    wrap: WrapReply,
    events: Sender<TransportEvent>,
) -> Option<Sender<u64>> {
    let (job_tx, job_rx) = mpsc::channel::<u64>();
    let spawned = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            while let Ok(token) = job_rx.recv() {
                if events.send(wrap(token, fetch_text(&agent, &url))).is_err() {
                    break;
                }
            }
        });
    match spawned {
        Ok(_) => Some(job_tx),
        Err(e) => {
            warn!("Failed to spawn {name} worker: {e}");
            None
        }
    }
}

// A missing or dead worker answers at once with an error, so the
// requester's in-flight guard is released instead of waiting forever.
fn dispatch(
    jobs: Option<&Sender<u64>>,
    token: u64,
    wrap: WrapReply,
    events: &Sender<TransportEvent>,
) {
    if jobs.is_some_and(|jobs| jobs.send(token).is_ok()) {
        return;
    }
    let unavailable = std::io::Error::other("HTTP worker is not running");
    let _ = events.send(wrap(token, Err(unavailable.into())));
}

fn set_read_timeout(socket: &WebSocket<MaybeTlsStream<TcpStream>>) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(s) => s.set_read_timeout(Some(STREAM_POLL_INTERVAL)),
        MaybeTlsStream::Rustls(s) => s.sock.set_read_timeout(Some(STREAM_POLL_INTERVAL)),
        _ => Ok(()),
    }
}

fn run_stream(id: ChannelId, url: String, stop: Arc<AtomicBool>, events: Sender<TransportEvent>) {
    let send = |event: ChannelEvent| {
        let _ = events.send(TransportEvent::Channel { id, event });
    };

    let mut socket = match tungstenite::connect(url.as_str()) {
        Ok((socket, _)) => socket,
        Err(e) => {
            warn!("Stream connect to {url} failed: {e}");
            send(ChannelEvent::Closed(CloseKind::Abnormal));
            return;
        }
    };
    if let Err(e) = set_read_timeout(&socket) {
        warn!("Failed to set stream read timeout: {e}");
    }
    info!("Stream {} open: {url}", id.0);
    send(ChannelEvent::Opened);

    loop {
        if stop.load(Ordering::Acquire) {
            let _ = socket.close(None);
            let _ = socket.flush();
            debug!("Stream {} closed locally.", id.0);
            return;
        }
        match socket.read() {
            Ok(Message::Text(text)) => send(ChannelEvent::Message(text.as_str().to_owned())),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => send(ChannelEvent::Message(text)),
                Err(_) => debug!("Stream {} sent a non-UTF-8 frame.", id.0),
            },
            Ok(Message::Close(frame)) => {
                let kind = match frame {
                    Some(f) if f.code != CloseCode::Normal => CloseKind::Abnormal,
                    _ => CloseKind::Normal,
                };
                send(ChannelEvent::Closed(kind));
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed) => {
                send(ChannelEvent::Closed(CloseKind::Normal));
                return;
            }
            Err(e) => {
                warn!("Stream {} dropped: {e}", id.0);
                send(ChannelEvent::Closed(CloseKind::Abnormal));
                return;
            }
        }
    }
}

/// The real transport: blocking `ureq` and `tungstenite` I/O on worker
/// threads, results funnelled back over one channel.
pub struct NetTransport {
    endpoints: Endpoints,
    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,
    discovery_jobs: Option<Sender<u64>>,
    demo_jobs: Option<Sender<u64>>,
    streams: FxHashMap<ChannelId, Arc<AtomicBool>>,
}

impl NetTransport {
    pub fn new(endpoints: Endpoints, request_timeout: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let agent = get_agent(request_timeout);
        let discovery_jobs = spawn_http_worker(
            "discovery-http",
            agent.clone(),
            endpoints.active_match_url.clone(),
            active_match_reply,
            events_tx.clone(),
        );
        let demo_jobs = spawn_http_worker(
            "demo-http",
            agent,
            endpoints.demo_state_url.clone(),
            demo_state_reply,
            events_tx.clone(),
        );
        info!(
            "Network transport ready (discovery: {}, demo: {}).",
            endpoints.active_match_url, endpoints.demo_state_url
        );
        Self {
            endpoints,
            events_tx,
            events_rx,
            discovery_jobs,
            demo_jobs,
            streams: FxHashMap::default(),
        }
    }
}

impl Transport for NetTransport {
    fn request_active_match(&mut self) {
        dispatch(
            self.discovery_jobs.as_ref(),
            0,
            active_match_reply,
            &self.events_tx,
        );
    }

    fn request_demo_state(&mut self, token: u64) {
        dispatch(self.demo_jobs.as_ref(), token, demo_state_reply, &self.events_tx);
    }

    fn open_channel(&mut self, id: ChannelId, match_id: &str) {
        let url = self.endpoints.stream_url(match_id);
        let stop = Arc::new(AtomicBool::new(false));
        let events = self.events_tx.clone();
        let thread_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name(format!("stream-{}", id.0))
            .spawn(move || run_stream(id, url, thread_stop, events));
        match spawned {
            Ok(_) => {
                self.streams.insert(id, stop);
            }
            Err(e) => {
                warn!("Failed to spawn stream thread: {e}");
                let _ = self.events_tx.send(TransportEvent::Channel {
                    id,
                    event: ChannelEvent::Closed(CloseKind::Abnormal),
                });
            }
        }
    }

    fn close_channel(&mut self, id: ChannelId) {
        if let Some(stop) = self.streams.remove(&id) {
            stop.store(true, Ordering::Release);
        }
    }

    fn poll_events(&mut self, out: &mut Vec<TransportEvent>) {
        for event in self.events_rx.try_iter() {
            if let TransportEvent::Channel {
                id,
                event: ChannelEvent::Closed(_),
            } = &event
            {
                self.streams.remove(id);
            }
            out.push(event);
        }
    }
}

impl Drop for NetTransport {
    fn drop(&mut self) {
        for stop in self.streams.values() {
            stop.store(true, Ordering::Release);
        }
    }
}
