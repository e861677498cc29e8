use serde::Deserialize;
use std::time::Duration;

pub const AUDIO_TRACE_ENV: &str = "STRIPBAR_AUDIO_TRACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    Pulse,
    Alsa,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    /// Connection order tried by `start`.
    pub backends: Vec<BackendChoice>,
    pub app_name: String,
    pub app_id: String,
    pub alsa_card: String,
    pub alsa_master: String,
    /// Controls muted and unmuted together with the master control.
    pub alsa_siblings: Vec<String>,
    pub query_timeout_ms: u64,
    pub volume_echo_ms: u64,
    pub peak_metering: bool,
    pub peak_rate_hz: u32,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            backends: vec![BackendChoice::Pulse, BackendChoice::Alsa],
            app_name: "stripbar".to_string(),
            app_id: "org.stripbar.panel".to_string(),
            alsa_card: "default".to_string(),
            alsa_master: "Master".to_string(),
            alsa_siblings: vec!["Headphone".to_string(), "Speaker".to_string()],
            query_timeout_ms: 2000,
            volume_echo_ms: 250,
            peak_metering: true,
            peak_rate_hz: 25,
        }
    }
}

impl AudioOptions {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    pub fn volume_echo(&self) -> Duration {
        Duration::from_millis(self.volume_echo_ms)
    }

    pub fn trace_enabled() -> bool {
        env_flag(AUDIO_TRACE_ENV)
    }
}

pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    let s = value.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}
