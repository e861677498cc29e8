use crate::{
    backend::{BackendConnector, ConnectionState, MixerBackend, default_connectors},
    bridge::{ChangeBridge, ChangeNotifier, ResyncTarget},
    client::{AudioClient, BackendKind, ClientHandle, Identity},
    config::AudioOptions,
    error::AudioError,
    host::FdRegistrar,
    registry::{ClientRegistry, RefreshPolicy},
};
use parking_lot::Mutex;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// The main-loop lock. Whoever holds it may touch the registry and the
/// backend; the host loop releases it while blocked in `poll`.
pub type SharedAudio = Arc<Mutex<AudioSubsystem>>;

pub type ChangeCallback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Session {
    backend: Option<Box<dyn MixerBackend>>,
    registry: ClientRegistry,
    shutdown: Arc<AtomicBool>,
    bridge: Option<ChangeBridge>,
    watched: Vec<RawFd>,
}

impl Session {
    /// Releases monitors and backend handles. Returns the descriptors that
    /// were registered with the host.
    fn teardown(mut self) -> Vec<RawFd> {
        self.shutdown.store(true, Ordering::Release);
        if let Some(bridge) = self.bridge.take() {
            bridge.detach();
        }
        if let Some(backend) = self.backend.as_deref_mut() {
            for client in self.registry.clear() {
                backend.detach_peak(client.identity());
            }
            backend.shutdown();
        }
        std::mem::take(&mut self.watched)
    }
}

pub struct AudioSubsystem {
    options: AudioOptions,
    connectors: Vec<Box<dyn BackendConnector>>,
    session: Session,
    on_change: Option<ChangeCallback>,
    this: Weak<Mutex<AudioSubsystem>>,
}

impl std::fmt::Debug for AudioSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSubsystem")
            .field("backend", &self.backend_kind())
            .field("clients", &self.session.registry.len())
            .field("default_output", &self.session.registry.default_output())
            .field("watched", &self.session.watched)
            .field("has_callback", &self.on_change.is_some())
            .finish()
    }
}

impl AudioSubsystem {
    pub fn new_shared(options: AudioOptions) -> SharedAudio {
        let connectors = default_connectors(&options);
        Self::with_connectors(options, connectors)
    }

    pub fn with_connectors(
        options: AudioOptions,
        connectors: Vec<Box<dyn BackendConnector>>,
    ) -> SharedAudio {
        Arc::new_cyclic(|this| {
            Mutex::new(Self {
                options,
                connectors,
                session: Session::default(),
                on_change: None,
                this: this.clone(),
            })
        })
    }

    /// Connects the first available backend in configured order. A no-op
    /// while a backend is active. Returns the active backend, if any.
    pub fn start(&mut self, host: &mut dyn FdRegistrar) -> Option<BackendKind> {
        if let Some(kind) = self.backend_kind() {
            debug!("{} audio backend already active", kind.label());
            return Some(kind);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut bridge: Option<ChangeBridge> = None;
        let mut chosen = None;
        for connector in &self.connectors {
            let label = connector.kind().label();
            let notifier = if connector.notifies() {
                if bridge.is_none() {
                    bridge = self.spawn_bridge(&shutdown);
                }
                bridge
                    .as_ref()
                    .map(ChangeBridge::notifier)
                    .unwrap_or_else(ChangeNotifier::disconnected)
            } else {
                ChangeNotifier::disconnected()
            };
            match connector.connect(&self.options, notifier) {
                Ok(backend) => {
                    info!("{label} audio backend connected");
                    if !connector.notifies()
                        && let Some(idle) = bridge.take()
                    {
                        idle.detach();
                    }
                    chosen = Some(backend);
                    break;
                }
                Err(e) => warn!("{label} audio backend unavailable: {e}"),
            }
        }

        let Some(backend) = chosen else {
            if let Some(bridge) = bridge {
                bridge.detach();
            }
            warn!("no audio backend available, volume control disabled");
            return None;
        };

        self.session = Session {
            backend: Some(backend),
            registry: ClientRegistry::new(),
            shutdown,
            bridge,
            watched: vec![],
        };
        self.watch_descriptors(host);
        if let Err(e) = self.refresh_full() {
            warn!("initial audio refresh incomplete: {e}");
        }
        self.trace_registry("start");
        self.backend_kind()
    }

    fn spawn_bridge(&self, shutdown: &Arc<AtomicBool>) -> Option<ChangeBridge> {
        match ChangeBridge::spawn(self.this.clone(), shutdown.clone()) {
            Ok(bridge) => Some(bridge),
            Err(e) => {
                error!("failed to start audio resync worker: {e}");
                None
            }
        }
    }

    /// Drops every client and the backend, leaving a fresh session.
    pub fn stop(&mut self, host: &mut dyn FdRegistrar) {
        let kind = self.backend_kind();
        let session = std::mem::take(&mut self.session);
        for fd in session.teardown() {
            host.unregister_fd(fd);
        }
        if let Some(kind) = kind {
            info!("{} audio backend stopped", kind.label());
        }
    }

    /// Replaces the callback run after the registry was refreshed because
    /// of an external change. It runs with the main-loop lock held.
    pub fn set_change_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_change = Some(Box::new(callback));
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.session.backend.as_ref().map(|b| b.kind())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session
            .backend
            .as_ref()
            .map(|b| b.connection_state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.session.registry
    }

    pub fn clients(&self) -> &[AudioClient] {
        self.session.registry.clients()
    }

    pub fn client(&self, index: usize) -> Option<&AudioClient> {
        self.session.registry.get(index)
    }

    pub fn master(&self) -> Option<&AudioClient> {
        self.session.registry.master()
    }

    pub fn client_mut(&mut self, index: usize) -> Option<ClientHandle<'_>> {
        let Session {
            backend, registry, ..
        } = &mut self.session;
        let backend = backend.as_deref_mut()?;
        let client = registry.get_mut(index)?;
        Some(ClientHandle::new(client, backend))
    }

    pub fn client_by_id_mut(&mut self, identity: &Identity) -> Result<ClientHandle<'_>, AudioError> {
        let index = self
            .session
            .registry
            .position(identity)
            .ok_or_else(|| AudioError::UnknownClient(identity.clone()))?;
        self.client_mut(index)
            .ok_or_else(|| AudioError::UnknownClient(identity.clone()))
    }

    pub fn refresh_full(&mut self) -> Result<(), AudioError> {
        let policy = RefreshPolicy {
            volume_echo: self.options.volume_echo(),
            peak_metering: self.options.peak_metering,
        };
        let Session {
            backend, registry, ..
        } = &mut self.session;
        let Some(backend) = backend.as_deref_mut() else {
            return Ok(());
        };
        registry.refresh_full(backend, policy)
    }

    /// Descriptor wakeup from the host loop.
    pub fn handle_backend_wakeup(&mut self) {
        if self.session.shutdown.load(Ordering::Acquire) {
            return;
        }
        let Some(backend) = self.session.backend.as_deref_mut() else {
            return;
        };
        match backend.pump() {
            Ok(true) => self.resync_and_notify(),
            Ok(false) => {}
            Err(e) => warn!("{} event pump failed: {e}", backend.kind().label()),
        }
    }

    fn resync_and_notify(&mut self) {
        if let Err(e) = self.refresh_full() {
            warn!("audio resync incomplete: {e}");
        }
        self.trace_registry("resync");
        if let Some(callback) = self.on_change.as_mut() {
            callback();
        }
    }

    fn watch_descriptors(&mut self, host: &mut dyn FdRegistrar) {
        let Some(backend) = self.session.backend.as_ref() else {
            return;
        };
        for desc in backend.poll_descriptors() {
            host.register_fd(
                desc.fd,
                desc.events,
                Box::new(|audio: &mut AudioSubsystem| audio.handle_backend_wakeup()),
            );
            self.session.watched.push(desc.fd);
        }
    }

    fn trace_registry(&self, reason: &str) {
        if !AudioOptions::trace_enabled() {
            return;
        }
        for (idx, c) in self.clients().iter().enumerate() {
            info!(
                "{reason} [{idx}] {} '{}' vol={:.3} muted={} master={}",
                c.identity(),
                c.title(),
                c.get_volume(),
                c.is_muted(),
                c.is_master()
            );
        }
    }
}

impl ResyncTarget for AudioSubsystem {
    fn resync(&mut self) {
        if self.session.backend.is_none() {
            return;
        }
        self.resync_and_notify();
    }
}

impl Drop for AudioSubsystem {
    fn drop(&mut self) {
        let session = std::mem::take(&mut self.session);
        let orphaned = session.teardown();
        if !orphaned.is_empty() {
            debug!("audio dropped with {} descriptors still registered", orphaned.len());
        }
    }
}
