use crate::core::network::stream_base_for;
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "dohyo-watch.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content);
        Ok(())
    }

    pub fn parse(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let section = line[1..line.len() - 1].trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            // Key/value pair: key=value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    /// Empty means "derive from `api_base_url`".
    pub stream_base_url: String,
    pub active_match_poll_ms: u64,
    pub demo_enabled: bool,
    pub demo_poll_ms: u64,
    pub reconnect_delay_ms: u64,
    // Per-frame exponential smoothing factors, (0, 1].
    pub lerp_factor: f32,
    pub ring_out_lerp_factor: f32,
    pub ring_out_ms: u64,
    pub decision_ms: u64,
    /// Winner celebration, 5000-8000ms.
    pub winner_display_ms: u64,
    pub shake_ms: u64,
    pub skill_popup_ms: u64,
    pub matta_flash_ms: u64,
    pub tachiai_burst_ms: u64,
    pub frame_rate_hz: u32,
    pub request_timeout_ms: u64,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            stream_base_url: String::new(),
            active_match_poll_ms: 2000,
            demo_enabled: true,
            demo_poll_ms: 50,
            reconnect_delay_ms: 2000,
            lerp_factor: 0.25,
            ring_out_lerp_factor: 0.05,
            ring_out_ms: 3000,
            decision_ms: 3000,
            winner_display_ms: 5000,
            shake_ms: 500,
            skill_popup_ms: 1500,
            matta_flash_ms: 1500,
            tachiai_burst_ms: 1000,
            frame_rate_hz: 60,
            request_timeout_ms: 5000,
            log_level: LogLevel::Warn,
        }
    }
}

impl Config {
    pub fn stream_base(&self) -> String {
        if self.stream_base_url.trim().is_empty() {
            stream_base_for(&self.api_base_url)
        } else {
            self.stream_base_url.trim().to_string()
        }
    }

    /// Reads `[Options]`, falling back to defaults for missing or invalid
    /// keys.
    pub fn from_ini(conf: &SimpleIni) -> Self {
        let default = Self::default();
        let ms = |key: &str, fallback: u64, min: u64, max: u64| {
            conf.get("Options", key)
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(fallback, |v| v.clamp(min, max))
        };
        let factor = |key: &str, fallback: f32| {
            conf.get("Options", key)
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
                .map_or(fallback, |v| v.min(1.0))
        };

        Self {
            api_base_url: conf
                .get("Options", "ApiBaseUrl")
                .filter(|v| !v.is_empty())
                .unwrap_or(default.api_base_url),
            stream_base_url: conf
                .get("Options", "StreamBaseUrl")
                .unwrap_or(default.stream_base_url),
            active_match_poll_ms: ms("ActiveMatchPollMs", default.active_match_poll_ms, 250, 60_000),
            demo_enabled: conf
                .get("Options", "DemoEnabled")
                .and_then(|v| v.parse::<u8>().ok())
                .map_or(default.demo_enabled, |v| v != 0),
            demo_poll_ms: ms("DemoPollMs", default.demo_poll_ms, 10, 5000),
            reconnect_delay_ms: ms("ReconnectDelayMs", default.reconnect_delay_ms, 100, 60_000),
            lerp_factor: factor("LerpFactor", default.lerp_factor),
            ring_out_lerp_factor: factor("RingOutLerpFactor", default.ring_out_lerp_factor),
            ring_out_ms: ms("RingOutMs", default.ring_out_ms, 0, 30_000),
            decision_ms: ms("DecisionMs", default.decision_ms, 0, 30_000),
            winner_display_ms: ms("WinnerDisplayMs", default.winner_display_ms, 5000, 8000),
            shake_ms: ms("ShakeMs", default.shake_ms, 0, 5000),
            skill_popup_ms: ms("SkillPopupMs", default.skill_popup_ms, 100, 10_000),
            matta_flash_ms: ms("MattaFlashMs", default.matta_flash_ms, 100, 10_000),
            tachiai_burst_ms: ms("TachiaiBurstMs", default.tachiai_burst_ms, 100, 10_000),
            frame_rate_hz: conf
                .get("Options", "FrameRateHz")
                .and_then(|v| v.parse::<u32>().ok())
                .map_or(default.frame_rate_hz, |v| v.clamp(1, 240)),
            request_timeout_ms: ms("RequestTimeoutMs", default.request_timeout_ms, 500, 60_000),
            log_level: conf
                .get("Options", "LogLevel")
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or(default.log_level),
        }
    }

    fn to_ini_string(&self) -> String {
        let mut content = String::new();

        // [Options] (alphabetical order)
        content.push_str("[Options]\n");
        content.push_str(&format!("ActiveMatchPollMs={}\n", self.active_match_poll_ms));
        content.push_str(&format!("ApiBaseUrl={}\n", self.api_base_url));
        content.push_str(&format!("DecisionMs={}\n", self.decision_ms));
        content.push_str(&format!(
            "DemoEnabled={}\n",
            if self.demo_enabled { "1" } else { "0" }
        ));
        content.push_str(&format!("DemoPollMs={}\n", self.demo_poll_ms));
        content.push_str(&format!("FrameRateHz={}\n", self.frame_rate_hz));
        content.push_str(&format!("LerpFactor={}\n", self.lerp_factor));
        content.push_str(&format!("LogLevel={}\n", self.log_level.as_str()));
        content.push_str(&format!("MattaFlashMs={}\n", self.matta_flash_ms));
        content.push_str(&format!("ReconnectDelayMs={}\n", self.reconnect_delay_ms));
        content.push_str(&format!("RequestTimeoutMs={}\n", self.request_timeout_ms));
        content.push_str(&format!("RingOutLerpFactor={}\n", self.ring_out_lerp_factor));
        content.push_str(&format!("RingOutMs={}\n", self.ring_out_ms));
        content.push_str(&format!("ShakeMs={}\n", self.shake_ms));
        content.push_str(&format!("SkillPopupMs={}\n", self.skill_popup_ms));
        content.push_str(&format!("StreamBaseUrl={}\n", self.stream_base_url));
        content.push_str(&format!("TachiaiBurstMs={}\n", self.tachiai_burst_ms));
        content.push_str(&format!("WinnerDisplayMs={}\n", self.winner_display_ms));
        content.push('\n');
        content
    }
}

// Global configuration, read once at startup.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    std::fs::write(CONFIG_PATH, Config::default().to_ini_string())
}

pub fn load() {
    if !Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(CONFIG_PATH) {
        Ok(()) => {
            let loaded = Config::from_ini(&conf);
            info!("Configuration loaded from '{CONFIG_PATH}'.");
            *CONFIG.lock().unwrap() = loaded;
        }
        Err(e) => {
            warn!("Failed to load '{CONFIG_PATH}': {e}. Using defaults.");
        }
    }
}

pub fn get() -> Config {
    CONFIG.lock().unwrap().clone()
}
