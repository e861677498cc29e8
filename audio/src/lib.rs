//! Audio backend for the panel: enumerates output devices and per-app
//! streams from the sound server, or the kernel mixer as a fallback, and
//! exposes them as an ordered list of volume-controllable clients.

pub mod backend;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod peak;
pub mod registry;
pub mod subsystem;
pub mod volume;

pub use backend::{BackendConnector, ConnectionState, Enumeration, MixerBackend, PollDescriptor};
pub use bridge::ChangeNotifier;
pub use client::{AudioClient, BackendKind, ClientHandle, ClientInfo, Identity, ServerInfo};
pub use config::{AudioOptions, BackendChoice};
pub use error::AudioError;
pub use host::{FdRegistrar, NoFdLoop, Wakeup};
pub use peak::PeakLevel;
pub use registry::ClientRegistry;
pub use subsystem::{AudioSubsystem, ChangeCallback, SharedAudio};
pub use volume::Volume;
