use crate::{
    backend::{Enumeration, MixerBackend},
    client::{AudioClient, ClientInfo, Identity},
    error::AudioError,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshPolicy {
    pub volume_echo: Duration,
    pub peak_metering: bool,
}

/// Ordered clients of the active backend. Index 0 is the default output
/// whenever one is known.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<AudioClient>,
    default_output: Option<String>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients(&self) -> &[AudioClient] {
        &self.clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AudioClient> {
        self.clients.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut AudioClient> {
        self.clients.get_mut(index)
    }

    pub fn position(&self, identity: &Identity) -> Option<usize> {
        self.clients.iter().position(|c| c.identity() == identity)
    }

    pub fn find(&self, identity: &Identity) -> Option<&AudioClient> {
        self.clients.iter().find(|c| c.identity() == identity)
    }

    pub fn master(&self) -> Option<&AudioClient> {
        self.clients.iter().find(|c| c.is_master())
    }

    pub fn default_output(&self) -> Option<&str> {
        self.default_output.as_deref()
    }

    /// Updates the client with the same identity in place, or appends one.
    /// Returns its index.
    pub fn upsert(&mut self, info: ClientInfo, now: Instant, echo: Duration) -> usize {
        match self.position(&info.identity) {
            Some(idx) => {
                self.clients[idx].update(info, now, echo);
                idx
            }
            None => {
                self.clients.push(AudioClient::from_info(info));
                self.clients.len() - 1
            }
        }
    }

    /// Re-flags the master client from the current default output name.
    pub fn apply_default(&mut self) {
        let default = self.default_output.as_deref();
        for client in &mut self.clients {
            let is_default = default.is_some_and(|d| d == client.name());
            client.set_master(is_default);
        }
    }

    /// Moves the master client to index 0, keeping the others in order.
    pub fn promote_default(&mut self) {
        if let Some(pos) = self.clients.iter().position(|c| c.is_master())
            && pos != 0
        {
            let master = self.clients.remove(pos);
            self.clients.insert(0, master);
        }
    }

    /// Removes every client. Callers detach their monitors.
    pub fn clear(&mut self) -> Vec<AudioClient> {
        self.default_output = None;
        std::mem::take(&mut self.clients)
    }

    /// Upserts one phase's reply. When the reply was cut short, the clients
    /// of that phase it did not mention keep their last known state.
    fn apply_phase(
        &mut self,
        listing: Enumeration,
        streams: bool,
        now: Instant,
        echo: Duration,
    ) -> Option<AudioError> {
        for info in listing.items {
            self.upsert(info, now, echo);
        }
        let err = listing.interrupted?;
        for client in &mut self.clients {
            if client.identity().is_stream() == streams {
                client.seen = true;
            }
        }
        Some(err)
    }

    /// Devices, then streams, then server info, strictly in that order.
    /// Flagging is reapplied after each phase because a later phase may
    /// add the default client or change the default name. Clients that a
    /// completed phase no longer reports are removed afterwards.
    pub fn refresh_full(
        &mut self,
        backend: &mut dyn MixerBackend,
        policy: RefreshPolicy,
    ) -> Result<(), AudioError> {
        let label = backend.kind().label();
        let now = Instant::now();
        let mut first_err = None;

        for client in &mut self.clients {
            client.seen = false;
        }

        if let Some(e) = self.apply_phase(backend.query_devices(), false, now, policy.volume_echo) {
            warn!("{label} device list incomplete: {e}");
            first_err.get_or_insert(e);
        }
        self.apply_default();

        if let Some(e) = self.apply_phase(backend.query_streams(), true, now, policy.volume_echo) {
            warn!("{label} stream list incomplete: {e}");
            first_err.get_or_insert(e);
        }
        self.apply_default();

        match backend.query_server_info() {
            Ok(info) => self.default_output = info.default_output,
            Err(e) => {
                warn!("{label} server info failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        self.apply_default();

        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.clients)
            .into_iter()
            .partition(|c| c.seen);
        self.clients = kept;
        for client in gone {
            debug!("{label} client gone: {}", client.identity());
            backend.detach_peak(client.identity());
        }

        self.promote_default();

        if policy.peak_metering {
            for client in &self.clients {
                if let Err(e) = backend.attach_peak(client.identity(), client.peak()) {
                    debug!("{label} no peak monitor for {}: {e}", client.identity());
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
