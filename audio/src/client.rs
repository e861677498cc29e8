use crate::{backend::MixerBackend, error::AudioError, peak::PeakLevel, volume::Volume};
use std::fmt;
use std::ops::Deref;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Pulse,
    Alsa,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Pulse => "PulseAudio",
            BackendKind::Alsa => "ALSA",
        }
    }
}

/// Backend-specific key of a client. Devices and streams live in separate
/// namespaces even when the server reuses an index for both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    KernelControl { name: String, index: u32 },
    ServerDevice(u32),
    ServerStream(u32),
}

impl Identity {
    pub fn backend(&self) -> BackendKind {
        match self {
            Identity::KernelControl { .. } => BackendKind::Alsa,
            Identity::ServerDevice(_) | Identity::ServerStream(_) => BackendKind::Pulse,
        }
    }

    /// Only devices and kernel controls can be the default output.
    pub fn can_be_master(&self) -> bool {
        !self.is_stream()
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Identity::ServerStream(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::KernelControl { name, index } => write!(f, "control '{name}',{index}"),
            Identity::ServerDevice(index) => write!(f, "sink #{index}"),
            Identity::ServerStream(index) => write!(f, "sink-input #{index}"),
        }
    }
}

/// One enumerated endpoint as reported by a backend query.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub identity: Identity,
    /// Backend-internal name, matched against the default output name.
    pub name: String,
    pub title: String,
    pub subtitle: String,
    pub volume: Volume,
    pub muted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub default_output: Option<String>,
}

#[derive(Debug)]
pub struct AudioClient {
    identity: Identity,
    name: String,
    title: String,
    subtitle: String,
    volume: Volume,
    muted: bool,
    is_master: bool,
    peak: PeakLevel,
    last_volume_set: Option<Instant>,
    pub(crate) seen: bool,
}

impl AudioClient {
    pub(crate) fn from_info(info: ClientInfo) -> Self {
        Self {
            identity: info.identity,
            name: info.name,
            title: info.title,
            subtitle: info.subtitle,
            volume: info.volume,
            muted: info.muted,
            is_master: false,
            peak: PeakLevel::new(),
            last_volume_set: None,
            seen: true,
        }
    }

    /// Applies a fresh enumeration result. A volume this client set itself
    /// within `echo` is kept, the server may still report the old value.
    pub(crate) fn update(&mut self, info: ClientInfo, now: Instant, echo: Duration) {
        debug_assert_eq!(self.identity, info.identity);
        self.name = info.name;
        self.title = info.title;
        self.subtitle = info.subtitle;
        self.muted = info.muted;
        let echoing = self
            .last_volume_set
            .is_some_and(|at| now.saturating_duration_since(at) < echo);
        if !echoing || self.volume.channels() != info.volume.channels() {
            self.volume = info.volume;
        }
        self.seen = true;
    }

    pub(crate) fn set_master(&mut self, is_master: bool) {
        self.is_master = is_master && self.identity.can_be_master();
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn unique_id(&self) -> &Identity {
        &self.identity
    }

    pub fn backend(&self) -> BackendKind {
        self.identity.backend()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn get_volume(&self) -> f64 {
        self.volume.normalized()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn peak_level(&self) -> f32 {
        self.peak.get()
    }

    pub fn peak(&self) -> &PeakLevel {
        &self.peak
    }

    pub fn last_volume_set(&self) -> Option<Instant> {
        self.last_volume_set
    }
}

/// Mutable access to one client together with the backend that owns it.
pub struct ClientHandle<'a> {
    client: &'a mut AudioClient,
    backend: &'a mut dyn MixerBackend,
}

impl<'a> ClientHandle<'a> {
    pub(crate) fn new(client: &'a mut AudioClient, backend: &'a mut dyn MixerBackend) -> Self {
        Self { client, backend }
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<(), AudioError> {
        let target = self.client.volume.with_normalized(volume);
        if let Err(e) = self.backend.set_volume(&self.client.identity, &target) {
            warn!("{} set_volume failed: {}", self.backend.kind().label(), e);
            return Err(e);
        }
        self.client.volume = target;
        self.client.last_volume_set = Some(Instant::now());
        Ok(())
    }

    pub fn set_mute(&mut self, muted: bool) -> Result<(), AudioError> {
        if let Err(e) = self.backend.set_mute(&self.client.identity, muted) {
            warn!("{} set_mute failed: {}", self.backend.kind().label(), e);
            return Err(e);
        }
        self.client.muted = muted;
        Ok(())
    }
}

impl Deref for ClientHandle<'_> {
    type Target = AudioClient;

    fn deref(&self) -> &AudioClient {
        self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::SERVER_VOLUME_NORM;

    fn info(volume: u32) -> ClientInfo {
        ClientInfo {
            identity: Identity::ServerDevice(3),
            name: "alsa_output.speakers".to_string(),
            title: "Speakers".to_string(),
            subtitle: String::new(),
            volume: Volume::Server(vec![volume, volume]),
            muted: false,
        }
    }

    #[test]
    fn streams_never_master() {
        let mut c = AudioClient::from_info(ClientInfo {
            identity: Identity::ServerStream(3),
            ..info(0)
        });
        c.set_master(true);
        assert!(!c.is_master());
    }

    #[test]
    fn same_index_different_namespace() {
        assert_ne!(Identity::ServerDevice(7), Identity::ServerStream(7));
        assert_eq!(Identity::ServerStream(7).backend(), BackendKind::Pulse);
        assert_eq!(
            Identity::KernelControl {
                name: "Master".into(),
                index: 0
            }
            .backend(),
            BackendKind::Alsa
        );
    }

    #[test]
    fn recent_local_volume_survives_stale_enumeration() {
        let mut c = AudioClient::from_info(info(0));
        let now = Instant::now();
        c.volume = Volume::Server(vec![SERVER_VOLUME_NORM; 2]);
        c.last_volume_set = Some(now);

        c.update(info(100), now + Duration::from_millis(50), Duration::from_millis(250));
        assert_eq!(c.get_volume(), 1.0);

        c.update(info(0), now + Duration::from_millis(400), Duration::from_millis(250));
        assert_eq!(c.get_volume(), 0.0);
    }

    #[test]
    fn update_refreshes_labels_and_mute() {
        let mut c = AudioClient::from_info(info(0));
        let mut next = info(SERVER_VOLUME_NORM);
        next.title = "Headphones".to_string();
        next.muted = true;
        c.update(next, Instant::now(), Duration::ZERO);
        assert_eq!(c.title(), "Headphones");
        assert!(c.is_muted());
        assert_eq!(c.get_volume(), 1.0);
    }
}
