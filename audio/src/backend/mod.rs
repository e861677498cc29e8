use crate::{
    bridge::ChangeNotifier,
    client::{BackendKind, ClientInfo, Identity, ServerInfo},
    config::{AudioOptions, BackendChoice},
    error::AudioError,
    peak::PeakLevel,
    volume::Volume,
};
use std::os::fd::RawFd;

#[cfg(target_os = "linux")]
pub mod alsa;
#[cfg(test)]
pub(crate) mod fake;
#[cfg(target_os = "linux")]
pub mod pulse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDescriptor {
    pub fd: RawFd,
    pub events: i16,
}

/// Reply to one list query. When the reply ended early, `interrupted`
/// holds the cause and `items` whatever arrived before it.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub items: Vec<ClientInfo>,
    pub interrupted: Option<AudioError>,
}

impl Enumeration {
    pub fn complete(items: Vec<ClientInfo>) -> Self {
        Self {
            items,
            interrupted: None,
        }
    }

    pub fn failed(error: AudioError) -> Self {
        Self {
            items: Vec::new(),
            interrupted: Some(error),
        }
    }
}

impl From<Result<Vec<ClientInfo>, AudioError>> for Enumeration {
    fn from(result: Result<Vec<ClientInfo>, AudioError>) -> Self {
        match result {
            Ok(items) => Self::complete(items),
            Err(e) => Self::failed(e),
        }
    }
}

/// Uniform contract every mixer adapter implements. Queries block until
/// the backend has delivered the whole list or gave up on it; mutations
/// never wait for the backend's reply.
pub trait MixerBackend: Send {
    fn kind(&self) -> BackendKind;
    fn connection_state(&self) -> ConnectionState;

    fn query_devices(&mut self) -> Enumeration;
    fn query_streams(&mut self) -> Enumeration;
    fn query_server_info(&mut self) -> Result<ServerInfo, AudioError>;

    fn set_volume(&mut self, identity: &Identity, volume: &Volume) -> Result<(), AudioError>;
    fn set_mute(&mut self, identity: &Identity, muted: bool) -> Result<(), AudioError>;

    /// Descriptors the host loop must watch for this backend.
    fn poll_descriptors(&self) -> Vec<PollDescriptor> {
        Vec::new()
    }

    /// Handles pending events after a descriptor wakeup. Returns true when
    /// the change concerns the master control.
    fn pump(&mut self) -> Result<bool, AudioError> {
        Ok(false)
    }

    /// Starts metering `identity` into `level`. Returns false when a
    /// monitor already exists or the backend cannot meter.
    fn attach_peak(&mut self, _identity: &Identity, _level: &PeakLevel) -> Result<bool, AudioError> {
        Ok(false)
    }

    fn detach_peak(&mut self, _identity: &Identity) {}

    /// Stops callbacks and releases monitors ahead of drop.
    fn shutdown(&mut self) {}
}

pub trait BackendConnector: Send {
    fn kind(&self) -> BackendKind;

    /// Whether the backend pushes change notifications through the
    /// notifier handed to `connect`. Only those get a resync worker.
    fn notifies(&self) -> bool {
        true
    }

    fn connect(
        &self,
        options: &AudioOptions,
        notifier: ChangeNotifier,
    ) -> Result<Box<dyn MixerBackend>, AudioError>;
}

pub fn default_connectors(options: &AudioOptions) -> Vec<Box<dyn BackendConnector>> {
    let mut out: Vec<Box<dyn BackendConnector>> = Vec::new();
    for choice in &options.backends {
        match choice {
            #[cfg(target_os = "linux")]
            BackendChoice::Pulse => out.push(Box::new(pulse::PulseConnector)),
            #[cfg(target_os = "linux")]
            BackendChoice::Alsa => out.push(Box::new(alsa::AlsaConnector)),
            #[cfg(not(target_os = "linux"))]
            _ => {}
        }
    }
    out
}
