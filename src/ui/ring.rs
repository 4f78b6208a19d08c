//! Terminal rendering of a [`FrameView`]. Pure presentation: everything here
//! is a function of the view it is handed.

use crate::game::conclusion::ConclusionPhase;
use crate::game::connection::ConnectionState;
use crate::game::snapshot::{ENGINE_HEIGHT, ENGINE_WIDTH, MatchEvent, RING_CENTER, RING_RADIUS, Rgb, Side};
use crate::screens::watch::{FrameView, Source};
use glam::Vec2;
use std::fmt::Write as _;
use std::io::{self, Write};

const COLS: usize = ENGINE_WIDTH as usize;
// Terminal cells are about twice as tall as wide.
const ROWS: usize = (ENGINE_HEIGHT / 2.0) as usize;

const WAITING_DOT_MS: u64 = 500;
const SHAKE_PERIOD_MS: u64 = 50;

const CLEAR: &str = "\x1b[2J\x1b[H";
const RESET: &str = "\x1b[0m";

fn paint(out: &mut String, color: Rgb, text: &str) {
    let [r, g, b] = color.0;
    let _ = write!(out, "\x1b[38;2;{r};{g};{b}m{text}{RESET}");
}

fn cell_of(pos: Vec2) -> Option<(usize, usize)> {
    let col = pos.x.round();
    let row = (pos.y / 2.0).round();
    if col < 0.0 || row < 0.0 || col >= COLS as f32 || row >= ROWS as f32 {
        return None;
    }
    Some((row as usize, col as usize))
}

fn ring_grid() -> Vec<Vec<char>> {
    let mut grid = vec![vec![' '; COLS]; ROWS];
    for (row, line) in grid.iter_mut().enumerate() {
        for (col, cell) in line.iter_mut().enumerate() {
            let p = Vec2::new(col as f32, row as f32 * 2.0);
            let d = (p - RING_CENTER).length();
            if (d - RING_RADIUS).abs() < 0.9 {
                *cell = 'o';
            }
        }
    }
    grid
}

fn header(view: &FrameView<'_>) -> String {
    let mut line = format!("[{}]", view.connection.as_str());
    if let Some(id) = view.match_id {
        let _ = write!(line, " match {id}");
    } else if view.source == Some(Source::Demo) {
        line.push_str(" demo bout");
    }
    if let Some(phase) = view.phase {
        let _ = write!(line, " | {phase:?}");
    }
    if let Some(snap) = view.snapshot {
        let _ = write!(line, " | t={:.1}", snap.t);
        if let Some(left) = snap.countdown_remaining
            && left > 0.0
        {
            let _ = write!(line, " | {:.0}", left.ceil());
        }
        if snap.collision == Some(true) {
            line.push_str(" | CLASH");
        }
    }
    line
}

fn waiting_line(view: &FrameView<'_>) -> Option<String> {
    if view.snapshot.is_some() {
        return None;
    }
    match view.connection {
        ConnectionState::Idle | ConnectionState::Demo => {
            let dots = ((view.now / WAITING_DOT_MS) % 4) as usize;
            Some(format!("WAITING FOR MATCH{}", ".".repeat(dots)))
        }
        ConnectionState::Connecting => Some("CONNECTING...".to_string()),
        ConnectionState::Reconnecting => Some("CONNECTION LOST, RETRYING...".to_string()),
        ConnectionState::Connected => None,
    }
}

fn overlay_text(event: &MatchEvent) -> Option<String> {
    match event {
        MatchEvent::Skill {
            wrestler_name,
            skill_name,
            skill_jp,
            ..
        } => {
            let mut text = String::new();
            if let Some(who) = wrestler_name.as_deref().filter(|w| !w.is_empty()) {
                let _ = write!(text, "{who}: ");
            }
            if !skill_jp.is_empty() {
                let _ = write!(text, "{skill_jp} ");
            }
            text.push_str(skill_name);
            Some(text)
        }
        MatchEvent::Matta { .. } => Some("MATTA!".to_string()),
        MatchEvent::Tachiai { .. } | MatchEvent::Unknown => None,
    }
}

/// Builds the full screen for one frame.
pub fn compose(view: &FrameView<'_>) -> String {
    let mut out = String::with_capacity(COLS * (ROWS + 8) * 2);
    out.push_str(CLEAR);
    out.push_str(&header(view));
    out.push('\n');

    let mut grid = ring_grid();
    let mut colors = [Rgb::default(); 2];
    if let (Some(display), Some(snap)) = (view.display, view.snapshot) {
        for side in Side::BOTH {
            if let Some((row, col)) = cell_of(display[side.index()]) {
                grid[row][col] = if side == Side::Left { '1' } else { '2' };
            }
            colors[side.index()] = snap.wrestler(side).color;
        }
    }

    let indent = if view.effects.shake && (view.now / SHAKE_PERIOD_MS) % 2 == 0 {
        " "
    } else {
        ""
    };
    for line in &grid {
        out.push_str(indent);
        for &ch in line {
            match ch {
                '1' => paint(&mut out, colors[0], "1"),
                '2' => paint(&mut out, colors[1], "2"),
                c => out.push(c),
            }
        }
        out.push('\n');
    }

    if let Some(snap) = view.snapshot {
        for side in Side::BOTH {
            let w = snap.wrestler(side);
            let tag = if side == Side::Left { "P1" } else { "P2" };
            let _ = write!(out, "{tag} ");
            paint(&mut out, w.color, w.display_name());
            if let Some(stamina) = w.stamina {
                let filled = (stamina.clamp(0.0, 100.0) / 10.0).round() as usize;
                let _ = write!(out, " [{}{}]", "#".repeat(filled), "-".repeat(10 - filled));
            }
            if let Some(count) = snap.matta_counts.map(|m| m.get(side))
                && count > 0
            {
                let _ = write!(out, " matta x{count}");
            }
            let danger = snap.edge_danger.map_or(0.0, |d| d.get(side));
            if danger > 0.7 {
                out.push_str("  (at the edge)");
            }
            let mut popups: Vec<_> = view.overlays.iter().filter(|o| o.side == side).collect();
            popups.sort_by_key(|o| o.key);
            for overlay in popups {
                if let Some(text) = overlay_text(&overlay.event) {
                    let _ = write!(out, "  <{text}>");
                }
            }
            out.push('\n');
        }
    }

    if view.effects.matta_flash {
        out.push_str("!!!!!!!! MATTA !!!!!!!!\n");
    }
    if view.effects.tachiai_burst {
        out.push_str("******* TACHIAI *******\n");
    }
    match view.conclusion {
        Some(ConclusionPhase::RingOut) => out.push_str("RING OUT!\n"),
        Some(ConclusionPhase::Decision) => out.push_str("SHOBU-ARI\n"),
        Some(ConclusionPhase::Winner) => {
            if let Some((side, name)) = view.winner {
                let color = view
                    .snapshot
                    .map_or_else(Rgb::default, |s| s.wrestler(side).color);
                out.push_str("勝者 ");
                paint(&mut out, color, name);
                out.push('\n');
            }
        }
        None => {}
    }
    if let Some(line) = waiting_line(view) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Writes frames to a terminal, skipping frames identical to the last one.
#[derive(Default)]
pub struct RingRenderer {
    last: String,
}

impl RingRenderer {
    pub fn draw(&mut self, view: &FrameView<'_>, out: &mut impl Write) -> io::Result<bool> {
        let screen = compose(view);
        if screen == self.last {
            return Ok(false);
        }
        out.write_all(screen.as_bytes())?;
        out.flush()?;
        self.last = screen;
        Ok(true)
    }
}
