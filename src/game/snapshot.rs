use glam::Vec2;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

// Engine space mirrors the match server: 64x32 units, ring centred.
pub const ENGINE_WIDTH: f32 = 64.0;
pub const ENGINE_HEIGHT: f32 = 32.0;
pub const RING_CENTER: Vec2 = Vec2::new(ENGINE_WIDTH / 2.0, ENGINE_HEIGHT / 2.0);
pub const RING_RADIUS: f32 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "p1")]
    Left,
    #[serde(alias = "p2")]
    Right,
}

impl Side {
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub const fn opponent(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum MatchPhase {
    #[default]
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "P1_READY")]
    P1Ready,
    #[serde(rename = "P2_READY")]
    P2Ready,
    #[serde(rename = "COUNTDOWN")]
    Countdown,
    #[serde(rename = "FIGHTING")]
    Fighting,
    #[serde(rename = "MATTA")]
    Matta,
    #[serde(rename = "GAME_OVER")]
    GameOver,
}

/// A wrestler's colour. The server sends either `"r,g,b"` or `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub [u8; 3]);

impl Default for Rgb {
    fn default() -> Self {
        Self([255, 255, 255])
    }
}

fn parse_rgb(text: &str) -> Option<Rgb> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return Some(Rgb([channel(0)?, channel(2)?, channel(4)?]));
    }
    let mut parts = text.split(',').map(|p| p.trim().parse::<u8>());
    let rgb = [
        parts.next()?.ok()?,
        parts.next()?.ok()?,
        parts.next()?.ok()?,
    ];
    parts.next().is_none().then_some(Rgb(rgb))
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Triplet([u8; 3]),
        }
        match Repr::deserialize(de)? {
            Repr::Triplet(rgb) => Ok(Self(rgb)),
            Repr::Text(text) => {
                parse_rgb(&text).ok_or_else(|| D::Error::custom(format!("invalid color {text:?}")))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(i64),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> Self {
        match id {
            IdRepr::Text(s) => s,
            IdRepr::Number(n) => n.to_string(),
        }
    }
}

// Wrestler ids are strings on the current server and integers on older ones.
fn id_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    IdRepr::deserialize(de).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<IdRepr>::deserialize(de)?
        .map(String::from)
        .filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WrestlerState {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "customName")]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub color: Rgb,
    #[serde(default, alias = "avatarSeed")]
    pub avatar_seed: Option<u64>,
    /// 0-100 when the server tracks it.
    #[serde(default)]
    pub stamina: Option<f32>,
}

impl WrestlerState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn display_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct SidePair<T> {
    pub p1: T,
    pub p2: T,
}

impl<T: Copy> SidePair<T> {
    pub const fn get(&self, side: Side) -> T {
        match side {
            Side::Left => self.p1,
            Side::Right => self.p2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    Skill {
        #[serde(alias = "wrestlerId", deserialize_with = "id_string")]
        wrestler_id: String,
        #[serde(default, alias = "wrestlerName")]
        wrestler_name: Option<String>,
        #[serde(alias = "skillName")]
        skill_name: String,
        #[serde(default, alias = "skillJp")]
        skill_jp: String,
        timestamp: f64,
    },
    Matta {
        #[serde(alias = "offenderSide", alias = "offender_side")]
        offender: Side,
        timestamp: f64,
    },
    Tachiai {
        timestamp: f64,
    },
    /// Event kinds this viewer has no presentation for.
    #[serde(other)]
    Unknown,
}

impl MatchEvent {
    pub const fn timestamp(&self) -> Option<f64> {
        match self {
            Self::Skill { timestamp, .. }
            | Self::Matta { timestamp, .. }
            | Self::Tachiai { timestamp } => Some(*timestamp),
            Self::Unknown => None,
        }
    }
}

/// One instant of match state as broadcast by the server. Treated as an
/// immutable value once decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchSnapshot {
    #[serde(default)]
    pub phase: MatchPhase,
    pub p1: WrestlerState,
    pub p2: WrestlerState,
    #[serde(default, alias = "gameOver")]
    pub game_over: bool,
    #[serde(
        default,
        rename = "winner",
        alias = "winner_id",
        alias = "winnerId",
        deserialize_with = "opt_id_string"
    )]
    pub winner_id: Option<String>,
    #[serde(default, alias = "winnerName")]
    pub winner_name: Option<String>,
    #[serde(default)]
    pub collision: Option<bool>,
    #[serde(default)]
    pub events: Vec<MatchEvent>,
    #[serde(default, alias = "edgeDanger")]
    pub edge_danger: Option<SidePair<f32>>,
    #[serde(default, alias = "mattaCounts")]
    pub matta_counts: Option<SidePair<u32>>,
    #[serde(default, alias = "countdownRemaining")]
    pub countdown_remaining: Option<f32>,
    #[serde(default)]
    pub t: f64,
}

impl MatchSnapshot {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub const fn wrestler(&self, side: Side) -> &WrestlerState {
        match side {
            Side::Left => &self.p1,
            Side::Right => &self.p2,
        }
    }

    pub fn side_of(&self, wrestler_id: &str) -> Option<Side> {
        if self.p1.id == wrestler_id {
            Some(Side::Left)
        } else if self.p2.id == wrestler_id {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn targets(&self) -> [Vec2; 2] {
        [self.p1.position(), self.p2.position()]
    }

    pub fn winner_side(&self) -> Option<Side> {
        self.winner_id.as_deref().and_then(|id| self.side_of(id))
    }

    /// Over with a winner we can place on a side.
    pub fn is_decided(&self) -> bool {
        self.game_over && self.winner_side().is_some()
    }

    /// The phase to present. Older servers never send `phase`, only
    /// `game_over`.
    pub fn effective_phase(&self) -> MatchPhase {
        if self.game_over {
            MatchPhase::GameOver
        } else {
            self.phase
        }
    }

    pub fn winner_display_name(&self) -> String {
        if let Some(side) = self.winner_side() {
            return self.wrestler(side).display_name().to_owned();
        }
        self.winner_name.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActiveMatch {
    #[serde(default, alias = "matchId", deserialize_with = "opt_id_string")]
    pub match_id: Option<String>,
}

impl ActiveMatch {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::{ActiveMatch, MatchEvent, MatchPhase, MatchSnapshot, Rgb, Side};

    const SERVER_FRAME: &str = r#"{
        "t": 12.5,
        "game_over": false,
        "winner": null,
        "winner_name": null,
        "collision": true,
        "events": [
            {"type": "skill", "wrestler_id": "abc", "wrestler_name": "Taiho",
             "skill_name": "THROW!", "skill_jp": "上手投げ", "timestamp": 12.5}
        ],
        "p1": {"id": "abc", "x": 22.0, "y": 16.0, "vx": 0.1, "vy": 0.0,
               "state": "IDLE", "name": "Taiho", "color": "255, 80, 0"},
        "p2": {"id": 7, "x": 42.0, "y": 16.0, "name": "Hakuho",
               "custom_name": "The Wall", "color": [0, 128, 255], "avatar_seed": 99}
    }"#;

    #[test]
    fn decodes_server_frame() {
        let snap = MatchSnapshot::decode(SERVER_FRAME).expect("server frame should decode");
        assert_eq!(snap.phase, MatchPhase::Waiting, "missing phase defaults to WAITING");
        assert_eq!(snap.p1.color, Rgb([255, 80, 0]));
        assert_eq!(snap.p2.color, Rgb([0, 128, 255]));
        assert_eq!(snap.p2.id, "7", "integer ids are stringified");
        assert_eq!(snap.p2.display_name(), "The Wall");
        assert_eq!(snap.p2.avatar_seed, Some(99));
        assert_eq!(snap.p1.avatar_seed, None);
        assert_eq!(snap.p1.display_name(), "Taiho");
        assert_eq!(snap.winner_id, None);
        assert_eq!(snap.collision, Some(true));
        assert!(matches!(
            &snap.events[..],
            [MatchEvent::Skill { wrestler_id, .. }] if wrestler_id == "abc"
        ));
        assert_eq!(snap.side_of("7"), Some(Side::Right));
    }

    #[test]
    fn decodes_camel_case_and_extended_fields() {
        let snap = MatchSnapshot::decode(
            r##"{"phase": "P1_READY", "gameOver": true, "winnerId": "a", "t": 3,
                "edgeDanger": {"p1": 0.9, "p2": 0.1}, "mattaCounts": {"p1": 1, "p2": 0},
                "countdownRemaining": 2.0,
                "events": [{"type": "matta", "offenderSide": "p2", "timestamp": 1.0},
                           {"type": "tachiai", "timestamp": 2.0},
                           {"type": "crowd_roar", "timestamp": 3.0}],
                "p1": {"id": "a", "x": 1, "y": 2, "name": "A", "color": "#ff0010"},
                "p2": {"id": "b", "x": 3, "y": 4, "name": "B"}}"##,
        )
        .expect("camelCase frame should decode");
        assert_eq!(snap.phase, MatchPhase::P1Ready);
        assert_eq!(snap.effective_phase(), MatchPhase::GameOver);
        assert!(snap.is_decided());
        assert_eq!(snap.winner_side(), Some(Side::Left));
        assert_eq!(snap.p1.color, Rgb([255, 0, 16]));
        assert_eq!(snap.edge_danger.map(|d| d.get(Side::Left)), Some(0.9));
        assert_eq!(snap.matta_counts.map(|m| m.p1), Some(1));
        assert_eq!(
            snap.events,
            vec![
                MatchEvent::Matta {
                    offender: Side::Right,
                    timestamp: 1.0
                },
                MatchEvent::Tachiai { timestamp: 2.0 },
                MatchEvent::Unknown,
            ]
        );
    }

    #[test]
    fn game_over_without_known_winner_is_not_decided() {
        let snap = MatchSnapshot::decode(
            r#"{"game_over": true, "winner": "zzz",
                "p1": {"id": "a", "x": 0, "y": 0}, "p2": {"id": "b", "x": 0, "y": 0}}"#,
        )
        .expect("frame should decode");
        assert!(!snap.is_decided());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(MatchSnapshot::decode("not json").is_err());
        assert!(MatchSnapshot::decode(r#"{"p1": {"id": "a", "x": 0, "y": 0}}"#).is_err());
        assert!(
            MatchSnapshot::decode(
                r#"{"p1": {"id": "a", "x": 0, "y": 0, "color": "1,2"},
                    "p2": {"id": "b", "x": 0, "y": 0}}"#
            )
            .is_err(),
            "two-channel colour must be rejected"
        );
    }

    #[test]
    fn active_match_treats_empty_and_null_as_idle() {
        let idle = ActiveMatch::decode(r#"{"match_id": null, "status": "idle"}"#).unwrap();
        assert_eq!(idle.match_id, None);
        let empty = ActiveMatch::decode(r#"{"match_id": ""}"#).unwrap();
        assert_eq!(empty.match_id, None);
        let live = ActiveMatch::decode(r#"{"matchId": "m1"}"#).unwrap();
        assert_eq!(live.match_id.as_deref(), Some("m1"));
    }
}
