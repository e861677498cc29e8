use super::{BackendConnector, ConnectionState, Enumeration, MixerBackend, PollDescriptor};
use crate::{
    bridge::ChangeNotifier,
    client::{BackendKind, ClientInfo, Identity, ServerInfo},
    config::AudioOptions,
    error::AudioError,
    volume::Volume,
};
use alsa::mixer::{Mixer, SelemChannelId, SelemId};
use alsa::poll::Descriptors;
use tracing::{debug, info, warn};

const LABEL: &str = "ALSA";

/// Opens the simple mixer of the configured card.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlsaConnector;

impl BackendConnector for AlsaConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Alsa
    }

    // Changes arrive on the mixer descriptors instead.
    fn notifies(&self) -> bool {
        false
    }

    fn connect(
        &self,
        options: &AudioOptions,
        _notifier: ChangeNotifier,
    ) -> Result<Box<dyn MixerBackend>, AudioError> {
        Ok(Box::new(AlsaMixer::open(options)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MasterState {
    raw: i64,
    min: i64,
    max: i64,
    switch_on: bool,
}

/// Names from `wanted` that `present` reports, in order, without the
/// master control and without duplicates.
pub fn discover_siblings<F>(wanted: &[String], master: &str, present: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let mut found: Vec<String> = Vec::new();
    for name in wanted {
        if name == master || found.contains(name) {
            continue;
        }
        if present(name) {
            found.push(name.clone());
        }
    }
    found
}

fn master_info(name: &str, card: &str, state: MasterState) -> ClientInfo {
    ClientInfo {
        identity: Identity::KernelControl {
            name: name.to_string(),
            index: 0,
        },
        name: name.to_string(),
        title: name.to_string(),
        subtitle: card.to_string(),
        volume: Volume::Kernel {
            raw: state.raw,
            min: state.min,
            max: state.max,
        },
        muted: !state.switch_on,
    }
}

/// Kernel mixer session. Exposes only the master control as a client;
/// sibling outputs follow its mute switch.
pub struct AlsaMixer {
    // Field order matters on drop: the mixer handle closes before the
    // selem ids are freed.
    mixer: Mixer,
    master: SelemId,
    siblings: Vec<SelemId>,
    master_name: String,
    card: String,
    cached: Option<MasterState>,
    state: ConnectionState,
}

// SAFETY: the mixer handle and selem ids are only used through
// `MixerBackend`, which the subsystem calls with the main-loop lock held,
// so they are never touched from two threads at once.
unsafe impl Send for AlsaMixer {}

impl std::fmt::Debug for AlsaMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlsaMixer")
            .field("card", &self.card)
            .field("master", &self.master_name)
            .field("siblings", &self.siblings.len())
            .field("state", &self.state)
            .finish()
    }
}

impl AlsaMixer {
    pub fn open(options: &AudioOptions) -> Result<Self, AudioError> {
        let card = options.alsa_card.as_str();
        let mixer = Mixer::new(card, false)
            .map_err(|e| AudioError::unavailable(LABEL, format!("open mixer '{card}': {e}")))?;

        let master = SelemId::new(&options.alsa_master, 0);
        if mixer.find_selem(&master).is_none() {
            return Err(AudioError::unavailable(
                LABEL,
                format!("card '{card}' has no '{}' control", options.alsa_master),
            ));
        }

        let names = discover_siblings(&options.alsa_siblings, &options.alsa_master, |name| {
            mixer.find_selem(&SelemId::new(name, 0)).is_some()
        });
        if !names.is_empty() {
            debug!("{LABEL} mute follows master on {}", names.join(", "));
        }
        let siblings = names.iter().map(|n| SelemId::new(n, 0)).collect();

        let mut this = Self {
            mixer,
            master,
            siblings,
            master_name: options.alsa_master.clone(),
            card: card.to_string(),
            cached: None,
            state: ConnectionState::Ready,
        };
        this.cached = this.read_master().ok();
        info!("{LABEL} mixer opened on '{card}'");
        Ok(this)
    }

    fn is_master(&self, identity: &Identity) -> bool {
        matches!(identity, Identity::KernelControl { name, index: 0 } if *name == self.master_name)
    }

    fn read_master(&self) -> Result<MasterState, AudioError> {
        let selem = self
            .mixer
            .find_selem(&self.master)
            .ok_or(AudioError::ConnectionLost { backend: LABEL })?;
        let (min, max) = selem.get_playback_volume_range();
        let raw = selem.get_playback_volume(SelemChannelId::mono())?;
        let switch_on = if selem.has_playback_switch() {
            selem.get_playback_switch(SelemChannelId::mono())? != 0
        } else {
            true
        };
        Ok(MasterState {
            raw,
            min,
            max,
            switch_on,
        })
    }

    fn recache(&mut self) {
        match self.read_master() {
            Ok(state) => self.cached = Some(state),
            Err(e) => debug!("{LABEL} reading master back failed: {e}"),
        }
    }
}

impl MixerBackend for AlsaMixer {
    fn kind(&self) -> BackendKind {
        BackendKind::Alsa
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn query_devices(&mut self) -> Enumeration {
        let state = self.read_master();
        if let Ok(state) = &state {
            self.cached = Some(*state);
        }
        state
            .map(|state| vec![master_info(&self.master_name, &self.card, state)])
            .into()
    }

    fn query_streams(&mut self) -> Enumeration {
        Enumeration::complete(Vec::new())
    }

    fn query_server_info(&mut self) -> Result<ServerInfo, AudioError> {
        Ok(ServerInfo {
            default_output: Some(self.master_name.clone()),
        })
    }

    fn set_volume(&mut self, identity: &Identity, volume: &Volume) -> Result<(), AudioError> {
        if !self.is_master(identity) {
            return Err(AudioError::UnknownClient(identity.clone()));
        }
        let Volume::Kernel { raw, .. } = volume else {
            return Err(AudioError::Rejected {
                backend: LABEL,
                op: "set_volume",
                identity: identity.clone(),
            });
        };
        {
            let selem = self
                .mixer
                .find_selem(&self.master)
                .ok_or(AudioError::ConnectionLost { backend: LABEL })?;
            selem.set_playback_volume_all(*raw)?;
        }
        self.recache();
        Ok(())
    }

    fn set_mute(&mut self, identity: &Identity, muted: bool) -> Result<(), AudioError> {
        if !self.is_master(identity) {
            return Err(AudioError::UnknownClient(identity.clone()));
        }
        let value = if muted { 0 } else { 1 };
        {
            let selem = self
                .mixer
                .find_selem(&self.master)
                .ok_or(AudioError::ConnectionLost { backend: LABEL })?;
            if !selem.has_playback_switch() {
                return Err(AudioError::Rejected {
                    backend: LABEL,
                    op: "set_mute",
                    identity: identity.clone(),
                });
            }
            selem.set_playback_switch_all(value)?;
        }
        for id in &self.siblings {
            let Some(sibling) = self.mixer.find_selem(id) else {
                continue;
            };
            if !sibling.has_playback_switch() {
                continue;
            }
            if let Err(e) = sibling.set_playback_switch_all(value) {
                let name = id.get_name().unwrap_or("?");
                warn!("{LABEL} switching '{name}' failed: {e}");
            }
        }
        self.recache();
        Ok(())
    }

    fn poll_descriptors(&self) -> Vec<PollDescriptor> {
        match Descriptors::get(&self.mixer) {
            Ok(fds) => fds
                .into_iter()
                .map(|p| PollDescriptor {
                    fd: p.fd,
                    events: p.events,
                })
                .collect(),
            Err(e) => {
                warn!("{LABEL} poll descriptors unavailable: {e}");
                Vec::new()
            }
        }
    }

    fn pump(&mut self) -> Result<bool, AudioError> {
        self.mixer.handle_events()?;
        let now = self.read_master()?;
        let changed = self.cached != Some(now);
        self.cached = Some(now);
        Ok(changed)
    }

    fn shutdown(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}
