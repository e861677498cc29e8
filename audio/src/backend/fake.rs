use super::{BackendConnector, ConnectionState, Enumeration, MixerBackend, PollDescriptor};
use crate::{
    bridge::ChangeNotifier,
    client::{BackendKind, ClientInfo, Identity, ServerInfo},
    config::AudioOptions,
    error::AudioError,
    peak::PeakLevel,
    volume::{SERVER_VOLUME_NORM, Volume},
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

pub(crate) fn device(index: u32, name: &str, title: &str) -> ClientInfo {
    ClientInfo {
        identity: Identity::ServerDevice(index),
        name: name.to_string(),
        title: title.to_string(),
        subtitle: String::new(),
        volume: Volume::Server(vec![SERVER_VOLUME_NORM / 2; 2]),
        muted: false,
    }
}

pub(crate) fn stream(index: u32, title: &str) -> ClientInfo {
    ClientInfo {
        identity: Identity::ServerStream(index),
        name: format!("stream-{index}"),
        title: title.to_string(),
        subtitle: String::new(),
        volume: Volume::Server(vec![SERVER_VOLUME_NORM; 2]),
        muted: false,
    }
}

pub(crate) fn master_control(raw: i64) -> ClientInfo {
    ClientInfo {
        identity: Identity::KernelControl {
            name: "Master".to_string(),
            index: 0,
        },
        name: "Master".to_string(),
        title: "Master".to_string(),
        subtitle: "default".to_string(),
        volume: Volume::Kernel { raw, min: 0, max: 87 },
        muted: false,
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub devices: Vec<ClientInfo>,
    pub streams: Vec<ClientInfo>,
    pub default: Option<String>,
    pub fail_devices: bool,
    pub fail_streams: bool,
    pub cut_streams_after: Option<usize>,
    pub reject: bool,
    pub monitored: BTreeSet<Identity>,
    pub attach_calls: usize,
    pub volume_calls: Vec<(Identity, Volume)>,
    pub mute_calls: Vec<(Identity, bool)>,
    pub device_queries: usize,
    pub master_changed: bool,
    pub descriptors: Vec<PollDescriptor>,
    pub notifier: Option<ChangeNotifier>,
    pub shutdowns: usize,
    pub connects: usize,
}

impl FakeState {
    fn entry_mut(&mut self, identity: &Identity) -> Option<&mut ClientInfo> {
        self.devices
            .iter_mut()
            .chain(self.streams.iter_mut())
            .find(|c| &c.identity == identity)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeBackend {
    kind: BackendKind,
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn pulse() -> Self {
        Self::with_state(BackendKind::Pulse, Arc::default())
    }

    pub fn with_state(kind: BackendKind, state: Arc<Mutex<FakeState>>) -> Self {
        Self { kind, state }
    }

    pub fn set_devices(&mut self, devices: Vec<ClientInfo>) {
        self.state.lock().devices = devices;
    }

    pub fn set_streams(&mut self, streams: Vec<ClientInfo>) {
        self.state.lock().streams = streams;
    }

    pub fn set_default(&mut self, name: Option<&str>) {
        self.state.lock().default = name.map(str::to_string);
    }

    pub fn fail_devices(&mut self, fail: bool) {
        self.state.lock().fail_devices = fail;
    }

    pub fn fail_streams(&mut self, fail: bool) {
        self.state.lock().fail_streams = fail;
    }

    /// Ends the stream reply early after `count` entries.
    pub fn cut_streams_after(&mut self, count: Option<usize>) {
        self.state.lock().cut_streams_after = count;
    }

    pub fn peak_attach_calls(&self) -> usize {
        self.state.lock().attach_calls
    }

    pub fn monitored(&self) -> BTreeSet<Identity> {
        self.state.lock().monitored.clone()
    }
}

impl FakeBackend {
    fn timeout(&self, query: &'static str) -> AudioError {
        AudioError::QueryTimeout {
            backend: self.kind.label(),
            query,
        }
    }
}

impl MixerBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Ready
    }

    fn query_devices(&mut self) -> Enumeration {
        let mut st = self.state.lock();
        st.device_queries += 1;
        if st.fail_devices {
            return Enumeration::failed(self.timeout("devices"));
        }
        Enumeration::complete(st.devices.clone())
    }

    fn query_streams(&mut self) -> Enumeration {
        let st = self.state.lock();
        if st.fail_streams {
            return Enumeration::failed(self.timeout("streams"));
        }
        match st.cut_streams_after {
            Some(count) => Enumeration {
                items: st.streams.iter().take(count).cloned().collect(),
                interrupted: Some(AudioError::ConnectionLost {
                    backend: self.kind.label(),
                }),
            },
            None => Enumeration::complete(st.streams.clone()),
        }
    }

    fn query_server_info(&mut self) -> Result<ServerInfo, AudioError> {
        Ok(ServerInfo {
            default_output: self.state.lock().default.clone(),
        })
    }

    fn set_volume(&mut self, identity: &Identity, volume: &Volume) -> Result<(), AudioError> {
        let mut st = self.state.lock();
        if st.reject {
            return Err(AudioError::Rejected {
                backend: self.kind.label(),
                op: "set_volume",
                identity: identity.clone(),
            });
        }
        st.volume_calls.push((identity.clone(), volume.clone()));
        if let Some(entry) = st.entry_mut(identity) {
            entry.volume = volume.clone();
        }
        Ok(())
    }

    fn set_mute(&mut self, identity: &Identity, muted: bool) -> Result<(), AudioError> {
        let mut st = self.state.lock();
        if st.reject {
            return Err(AudioError::Rejected {
                backend: self.kind.label(),
                op: "set_mute",
                identity: identity.clone(),
            });
        }
        st.mute_calls.push((identity.clone(), muted));
        if let Some(entry) = st.entry_mut(identity) {
            entry.muted = muted;
        }
        Ok(())
    }

    fn poll_descriptors(&self) -> Vec<PollDescriptor> {
        self.state.lock().descriptors.clone()
    }

    fn pump(&mut self) -> Result<bool, AudioError> {
        Ok(std::mem::take(&mut self.state.lock().master_changed))
    }

    fn attach_peak(&mut self, identity: &Identity, _level: &PeakLevel) -> Result<bool, AudioError> {
        let mut st = self.state.lock();
        st.attach_calls += 1;
        if self.kind != BackendKind::Pulse {
            return Ok(false);
        }
        Ok(st.monitored.insert(identity.clone()))
    }

    fn detach_peak(&mut self, identity: &Identity) {
        self.state.lock().monitored.remove(identity);
    }

    fn shutdown(&mut self) {
        let mut st = self.state.lock();
        st.shutdowns += 1;
        st.monitored.clear();
        st.notifier = None;
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnector {
    pub kind: BackendKind,
    pub state: Arc<Mutex<FakeState>>,
    pub available: bool,
}

impl BackendConnector for FakeConnector {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn notifies(&self) -> bool {
        self.kind == BackendKind::Pulse
    }

    fn connect(
        &self,
        _options: &AudioOptions,
        notifier: ChangeNotifier,
    ) -> Result<Box<dyn MixerBackend>, AudioError> {
        let mut st = self.state.lock();
        st.connects += 1;
        if !self.available {
            return Err(AudioError::unavailable(self.kind.label(), "not running"));
        }
        st.notifier = Some(notifier);
        Ok(Box::new(FakeBackend::with_state(self.kind, self.state.clone())))
    }
}
