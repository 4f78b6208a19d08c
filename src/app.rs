use crate::config;
use crate::core::network::{Endpoints, NetTransport};
use crate::core::timers::Millis;
use crate::screens::watch;
use crate::ui::ring::RingRenderer;
use log::{error, info};
use std::error::Error;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/* -------------------- frame pacing -------------------- */
fn frame_budget(rate_hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)))
}

fn elapsed_ms(start: Instant) -> Millis {
    Millis::try_from(start.elapsed().as_millis()).unwrap_or(Millis::MAX)
}

/// Runs the viewer until the terminal goes away.
pub fn run() -> Result<(), Box<dyn Error>> {
    let cfg = config::get();
    let stream_base = cfg.stream_base();
    info!(
        "Watching {} (streams from {stream_base}) at {} Hz.",
        cfg.api_base_url, cfg.frame_rate_hz
    );
    let mut transport = NetTransport::new(
        Endpoints::new(&cfg.api_base_url, &stream_base),
        Duration::from_millis(cfg.request_timeout_ms),
    );

    let budget = frame_budget(cfg.frame_rate_hz);
    let start = Instant::now();
    let mut state = watch::init(&cfg, 0);
    let mut renderer = RingRenderer::default();
    let mut out = io::stdout().lock();

    loop {
        let frame_start = Instant::now();
        watch::update(&mut state, elapsed_ms(start), &mut transport);
        if let Err(e) = renderer.draw(&watch::frame(&state), &mut out) {
            error!("Terminal write failed, shutting down: {e}");
            watch::shutdown(&mut state, &mut transport);
            return Ok(());
        }
        if let Some(rest) = budget.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }
}
