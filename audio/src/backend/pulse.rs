//! Sound server adapter over the threaded libpulse mainloop.
//!
//! Callbacks run on the mainloop thread with the mainloop lock held. The
//! mainloop is shared with them through `Rc<RefCell<_>>` and signalled via
//! its raw pointer, since the owner is parked inside `wait()` holding the
//! `RefCell` borrow at that point.

use super::{BackendConnector, ConnectionState, Enumeration, MixerBackend};
use crate::{
    bridge::ChangeNotifier,
    client::{BackendKind, ClientInfo, Identity, ServerInfo},
    config::AudioOptions,
    error::AudioError,
    peak::PeakLevel,
    volume::Volume,
};
use libpulse_binding as pulse;
use pulse::callbacks::ListResult;
use pulse::context::introspect::{SinkInfo, SinkInputInfo};
use pulse::context::subscribe::InterestMaskSet;
use pulse::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
use pulse::def::BufferAttr;
use pulse::mainloop::api::Mainloop as _;
use pulse::mainloop::threaded::Mainloop;
use pulse::operation::{Operation, State as OperationState};
use pulse::proplist::{Proplist, properties};
use pulse::sample::{Format, Spec};
use pulse::stream::{FlagSet as StreamFlagSet, PeekResult, Stream};
use pulse::time::{MicroSeconds, MonotonicTs};
use pulse::volume::{ChannelVolumes, Volume as PaVolume};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LABEL: &str = "PulseAudio";
const MAX_CHANNELS: usize = 32;

type SharedLoop = Rc<RefCell<Mainloop>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct PulseConnector;

impl BackendConnector for PulseConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Pulse
    }

    fn connect(
        &self,
        options: &AudioOptions,
        notifier: ChangeNotifier,
    ) -> Result<Box<dyn MixerBackend>, AudioError> {
        Ok(Box::new(PulseMixer::connect(options, notifier)?))
    }
}

fn signal(mainloop: &SharedLoop) {
    // SAFETY: only called from mainloop callbacks. They run with the
    // mainloop lock held, while the owner is either blocked on that lock or
    // parked in wait() holding the RefCell borrow.
    unsafe { (*mainloop.as_ptr()).signal(false) }
}

/// Holds the mainloop lock for its lifetime.
struct LoopGuard(SharedLoop);

impl LoopGuard {
    fn lock(mainloop: &SharedLoop) -> Self {
        mainloop.borrow_mut().lock();
        Self(Rc::clone(mainloop))
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.borrow_mut().unlock();
    }
}

enum Wake {
    Done,
    Pending,
    Lost,
}

enum Blocked {
    Lost,
    TimedOut,
}

/// Waits on the mainloop until `poll` reports completion, the connection
/// drops, or `timeout` passes. Caller holds the mainloop lock.
fn block_on<F>(mainloop: &SharedLoop, timeout: Duration, mut poll: F) -> Result<(), Blocked>
where
    F: FnMut() -> Wake,
{
    let deadline = Instant::now() + timeout;
    let at = MonotonicTs::now() + MicroSeconds(u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX));
    let fired = Rc::new(Cell::new(false));
    let waker = Rc::clone(mainloop);
    let expired = Rc::clone(&fired);
    let _timer = mainloop.borrow_mut().new_timer_event_rt(
        at,
        Box::new(move |_| {
            expired.set(true);
            signal(&waker);
        }),
    );
    loop {
        match poll() {
            Wake::Done => return Ok(()),
            Wake::Lost => return Err(Blocked::Lost),
            Wake::Pending => {}
        }
        // The timer is the only wakeup left once it has fired.
        if fired.get() || Instant::now() >= deadline {
            return Err(Blocked::TimedOut);
        }
        mainloop.borrow_mut().wait();
    }
}

struct Collected<T> {
    items: Vec<T>,
    failed: bool,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failed: false,
        }
    }
}

impl<T> Collected<T> {
    /// Everything delivered so far, with the error that cut the reply short.
    fn take_partial(&mut self, outcome: Result<(), AudioError>) -> (Vec<T>, Option<AudioError>) {
        (std::mem::take(&mut self.items), outcome.err())
    }
}

struct SinkEntry {
    info: ClientInfo,
    monitor_source: Option<String>,
}

struct InputEntry {
    info: ClientInfo,
    sink: u32,
}

fn to_volume(cv: &ChannelVolumes) -> Volume {
    Volume::Server(cv.get().iter().map(|v| v.0).collect())
}

fn to_channel_volumes(channels: &[u32]) -> Option<ChannelVolumes> {
    if channels.is_empty() || channels.len() > MAX_CHANNELS {
        return None;
    }
    let mut cv = ChannelVolumes::default();
    cv.set_len(u8::try_from(channels.len()).ok()?);
    for (slot, &v) in cv.get_mut().iter_mut().zip(channels) {
        *slot = PaVolume(v);
    }
    cv.is_valid().then_some(cv)
}

/// Application name when the stream carries one, else the stream's name.
fn stream_title(app_name: Option<String>, stream_name: &str) -> String {
    match app_name {
        Some(app) if !app.trim().is_empty() => app,
        _ => stream_name.to_string(),
    }
}

fn sink_entry(info: &SinkInfo) -> SinkEntry {
    let name = info.name.as_deref().unwrap_or_default().to_string();
    let title = info
        .description
        .as_deref()
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());
    SinkEntry {
        info: ClientInfo {
            identity: Identity::ServerDevice(info.index),
            title,
            subtitle: name.clone(),
            name,
            volume: to_volume(&info.volume),
            muted: info.mute,
        },
        monitor_source: info.monitor_source_name.as_deref().map(str::to_string),
    }
}

fn input_entry(info: &SinkInputInfo) -> InputEntry {
    let name = info.name.as_deref().unwrap_or_default().to_string();
    let app = info.proplist.get_str(properties::APPLICATION_NAME);
    InputEntry {
        info: ClientInfo {
            identity: Identity::ServerStream(info.index),
            title: stream_title(app, &name),
            subtitle: name.clone(),
            name,
            volume: to_volume(&info.volume),
            muted: info.mute,
        },
        sink: info.sink,
    }
}

/// Record stream on a monitor source feeding one `PeakLevel`.
struct PeakStream {
    stream: Rc<RefCell<Stream>>,
}

impl PeakStream {
    /// Caller holds the mainloop lock.
    fn connect(
        context: &mut Context,
        source: &str,
        monitored_input: Option<u32>,
        rate: u32,
        level: &PeakLevel,
    ) -> Result<Self, AudioError> {
        let spec = Spec {
            format: Format::FLOAT32NE,
            channels: 1,
            rate,
        };
        let stream = Stream::new(context, "peak", &spec, None)
            .ok_or_else(|| AudioError::Pulse(context.errno()))?;
        let stream = Rc::new(RefCell::new(stream));
        {
            let mut s = stream.borrow_mut();
            if let Some(index) = monitored_input {
                s.set_monitor_stream(index)?;
            }

            let weak = Rc::downgrade(&stream);
            let sink = level.clone();
            s.set_read_callback(Some(Box::new(move |_| read_fragment(&weak, &sink))));

            let weak = Rc::downgrade(&stream);
            let sink = level.clone();
            s.set_suspended_callback(Some(Box::new(move || {
                let Some(rc) = weak.upgrade() else {
                    return;
                };
                // SAFETY: mainloop thread with the lock held, see read_fragment.
                let suspended = unsafe { (*rc.as_ptr()).is_suspended() };
                if suspended.unwrap_or(false) {
                    sink.suspend();
                }
            })));

            let attr = BufferAttr {
                maxlength: u32::MAX,
                tlength: u32::MAX,
                prebuf: u32::MAX,
                minreq: u32::MAX,
                fragsize: std::mem::size_of::<f32>() as u32,
            };
            s.connect_record(
                Some(source),
                Some(&attr),
                StreamFlagSet::DONT_MOVE | StreamFlagSet::ADJUST_LATENCY | StreamFlagSet::PEAK_DETECT,
            )?;
        }
        Ok(Self { stream })
    }

    /// Caller holds the mainloop lock.
    fn release(self) {
        let mut s = self.stream.borrow_mut();
        s.set_read_callback(None);
        s.set_suspended_callback(None);
        if let Err(e) = s.disconnect() {
            debug!("{LABEL} peak stream disconnect: {e}");
        }
    }
}

fn read_fragment(stream: &Weak<RefCell<Stream>>, level: &PeakLevel) {
    let Some(rc) = stream.upgrade() else {
        return;
    };
    // SAFETY: read callbacks run on the mainloop thread with its lock held;
    // the owner only touches the stream under the same lock.
    let s = unsafe { &mut *rc.as_ptr() };
    let consumed = match s.peek() {
        Ok(PeekResult::Data(data)) => {
            level.feed_f32_ne(data);
            true
        }
        Ok(PeekResult::Hole(_)) => true,
        Ok(PeekResult::Empty) | Err(_) => false,
    };
    if consumed {
        let _ = s.discard();
    }
}

/// Connected sound server session.
pub struct PulseMixer {
    // Drop order: monitors, then the context, then the mainloop.
    peaks: HashMap<Identity, PeakStream>,
    context: Context,
    mainloop: SharedLoop,
    state: ConnectionState,
    query_timeout: Duration,
    peak_rate: u32,
    monitor_sources: HashMap<u32, String>,
    input_sinks: HashMap<u32, u32>,
}

// SAFETY: the mainloop, context and streams are only touched by the mainloop
// thread inside callbacks and by the owner while holding the mainloop lock.
// The owner itself is only reached through the main-loop lock.
unsafe impl Send for PulseMixer {}

impl std::fmt::Debug for PulseMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseMixer")
            .field("state", &self.state)
            .field("peaks", &self.peaks.len())
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl PulseMixer {
    pub fn connect(options: &AudioOptions, notifier: ChangeNotifier) -> Result<Self, AudioError> {
        let mainloop =
            Mainloop::new().ok_or_else(|| AudioError::unavailable(LABEL, "mainloop creation failed"))?;

        let mut proplist =
            Proplist::new().ok_or_else(|| AudioError::unavailable(LABEL, "proplist creation failed"))?;
        if proplist
            .set_str(properties::APPLICATION_NAME, &options.app_name)
            .is_err()
            || proplist
                .set_str(properties::APPLICATION_ID, &options.app_id)
                .is_err()
        {
            debug!("{LABEL} could not set application properties");
        }

        let context = Context::new_with_proplist(&mainloop, &options.app_name, &proplist)
            .ok_or_else(|| AudioError::unavailable(LABEL, "context creation failed"))?;

        let mut this = Self {
            peaks: HashMap::new(),
            context,
            mainloop: Rc::new(RefCell::new(mainloop)),
            state: ConnectionState::Connecting,
            query_timeout: options.query_timeout(),
            peak_rate: options.peak_rate_hz.max(1),
            monitor_sources: HashMap::new(),
            input_sinks: HashMap::new(),
        };

        let waker = Rc::clone(&this.mainloop);
        this.context
            .set_state_callback(Some(Box::new(move || signal(&waker))));
        this.context
            .connect(None, ContextFlagSet::NOFLAGS, None)
            .map_err(|e| AudioError::unavailable(LABEL, format!("connect: {e}")))?;
        this.mainloop
            .borrow_mut()
            .start()
            .map_err(|e| AudioError::unavailable(LABEL, format!("mainloop start: {e}")))?;

        let guard = LoopGuard::lock(&this.mainloop);
        let ready = block_on(&this.mainloop, this.query_timeout, || match this.context.get_state() {
            ContextState::Ready => Wake::Done,
            ContextState::Failed | ContextState::Terminated => Wake::Lost,
            _ => Wake::Pending,
        });
        if let Err(blocked) = ready {
            this.state = ConnectionState::Failed;
            drop(guard);
            return Err(match blocked {
                Blocked::Lost => AudioError::unavailable(LABEL, "connection refused"),
                Blocked::TimedOut => AudioError::unavailable(LABEL, "connection timed out"),
            });
        }

        this.context.set_subscribe_callback(Some(Box::new(move |facility, _op, _index| {
            if facility.is_some() {
                notifier.notify();
            }
        })));
        let mask = InterestMaskSet::SINK
            | InterestMaskSet::SOURCE
            | InterestMaskSet::SINK_INPUT
            | InterestMaskSet::CLIENT
            | InterestMaskSet::SERVER
            | InterestMaskSet::CARD;
        drop(this.context.subscribe(mask, |ok| {
            if !ok {
                warn!("{LABEL} subscription refused");
            }
        }));
        this.state = ConnectionState::Ready;
        drop(guard);

        info!("{LABEL} context ready");
        Ok(this)
    }

    /// Waits for a submitted query. Caller holds the mainloop lock.
    fn settle<C: ?Sized>(
        &mut self,
        op: &mut Operation<C>,
        failed: impl Fn() -> bool,
        query: &'static str,
    ) -> Result<(), AudioError> {
        let context = &self.context;
        let outcome = block_on(&self.mainloop, self.query_timeout, || {
            if !context.get_state().is_good() {
                Wake::Lost
            } else if op.get_state() != OperationState::Running {
                Wake::Done
            } else {
                Wake::Pending
            }
        });
        match outcome {
            Ok(()) if failed() => Err(AudioError::Pulse(self.context.errno())),
            Ok(()) => Ok(()),
            Err(Blocked::Lost) => {
                op.cancel();
                self.state = ConnectionState::Failed;
                Err(AudioError::ConnectionLost { backend: LABEL })
            }
            Err(Blocked::TimedOut) => {
                op.cancel();
                Err(AudioError::QueryTimeout {
                    backend: LABEL,
                    query,
                })
            }
        }
    }

    /// Caller holds the mainloop lock.
    fn ensure_ready(&mut self) -> Result<(), AudioError> {
        if self.context.get_state() == ContextState::Ready {
            return Ok(());
        }
        self.state = ConnectionState::Failed;
        Err(AudioError::ConnectionLost { backend: LABEL })
    }

    fn release_peaks(&mut self) {
        if self.peaks.is_empty() {
            return;
        }
        let _guard = LoopGuard::lock(&self.mainloop);
        for (_, peak) in self.peaks.drain() {
            peak.release();
        }
    }

    fn disconnect(&mut self) {
        self.release_peaks();
        let _guard = LoopGuard::lock(&self.mainloop);
        self.context.set_subscribe_callback(None);
        self.context.set_state_callback(None);
        if self.state != ConnectionState::Disconnected {
            self.context.disconnect();
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl MixerBackend for PulseMixer {
    fn kind(&self) -> BackendKind {
        BackendKind::Pulse
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn query_devices(&mut self) -> Enumeration {
        let collected: Rc<RefCell<Collected<SinkEntry>>> = Rc::default();
        let _guard = LoopGuard::lock(&self.mainloop);
        if let Err(e) = self.ensure_ready() {
            return Enumeration::failed(e);
        }
        let mut op = {
            let collected = Rc::clone(&collected);
            let waker = Rc::clone(&self.mainloop);
            self.context
                .introspect()
                .get_sink_info_list(move |result| match result {
                    ListResult::Item(info) => collected.borrow_mut().items.push(sink_entry(info)),
                    ListResult::End => signal(&waker),
                    ListResult::Error => {
                        collected.borrow_mut().failed = true;
                        signal(&waker);
                    }
                })
        };
        let outcome = self.settle(&mut op, || collected.borrow().failed, "sinks");
        drop(op);

        let (entries, interrupted) = collected.borrow_mut().take_partial(outcome);
        if let Some(e) = &interrupted {
            warn!("{LABEL} sink list cut short after {} entries: {e}", entries.len());
        } else {
            self.monitor_sources.clear();
        }
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            if let (Identity::ServerDevice(index), Some(source)) = (&entry.info.identity, entry.monitor_source) {
                self.monitor_sources.insert(*index, source);
            }
            items.push(entry.info);
        }
        Enumeration { items, interrupted }
    }

    fn query_streams(&mut self) -> Enumeration {
        let collected: Rc<RefCell<Collected<InputEntry>>> = Rc::default();
        let _guard = LoopGuard::lock(&self.mainloop);
        if let Err(e) = self.ensure_ready() {
            return Enumeration::failed(e);
        }
        let mut op = {
            let collected = Rc::clone(&collected);
            let waker = Rc::clone(&self.mainloop);
            self.context
                .introspect()
                .get_sink_input_info_list(move |result| match result {
                    ListResult::Item(info) => collected.borrow_mut().items.push(input_entry(info)),
                    ListResult::End => signal(&waker),
                    ListResult::Error => {
                        collected.borrow_mut().failed = true;
                        signal(&waker);
                    }
                })
        };
        let outcome = self.settle(&mut op, || collected.borrow().failed, "sink inputs");
        drop(op);

        let (entries, interrupted) = collected.borrow_mut().take_partial(outcome);
        if let Some(e) = &interrupted {
            warn!("{LABEL} sink input list cut short after {} entries: {e}", entries.len());
        } else {
            self.input_sinks.clear();
        }
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Identity::ServerStream(index) = entry.info.identity {
                self.input_sinks.insert(index, entry.sink);
            }
            items.push(entry.info);
        }
        Enumeration { items, interrupted }
    }

    fn query_server_info(&mut self) -> Result<ServerInfo, AudioError> {
        let answer: Rc<RefCell<Option<ServerInfo>>> = Rc::default();
        let _guard = LoopGuard::lock(&self.mainloop);
        self.ensure_ready()?;
        let mut op = {
            let answer = Rc::clone(&answer);
            let waker = Rc::clone(&self.mainloop);
            self.context.introspect().get_server_info(move |info| {
                *answer.borrow_mut() = Some(ServerInfo {
                    default_output: info.default_sink_name.as_deref().map(str::to_string),
                });
                signal(&waker);
            })
        };
        self.settle(&mut op, || false, "server info")?;
        drop(op);
        let info = answer.borrow_mut().take();
        Ok(info.unwrap_or_default())
    }

    fn set_volume(&mut self, identity: &Identity, volume: &Volume) -> Result<(), AudioError> {
        let rejected = || AudioError::Rejected {
            backend: LABEL,
            op: "set_volume",
            identity: identity.clone(),
        };
        let Volume::Server(channels) = volume else {
            return Err(rejected());
        };
        let cv = to_channel_volumes(channels).ok_or_else(rejected)?;

        let _guard = LoopGuard::lock(&self.mainloop);
        self.ensure_ready()?;
        let mut introspect = self.context.introspect();
        let op = match identity {
            Identity::ServerDevice(index) => introspect.set_sink_volume_by_index(*index, &cv, None),
            Identity::ServerStream(index) => introspect.set_sink_input_volume(*index, &cv, None),
            Identity::KernelControl { .. } => return Err(rejected()),
        };
        if op.get_state() == OperationState::Cancelled {
            return Err(rejected());
        }
        Ok(())
    }

    fn set_mute(&mut self, identity: &Identity, muted: bool) -> Result<(), AudioError> {
        let rejected = || AudioError::Rejected {
            backend: LABEL,
            op: "set_mute",
            identity: identity.clone(),
        };
        let _guard = LoopGuard::lock(&self.mainloop);
        self.ensure_ready()?;
        let mut introspect = self.context.introspect();
        let op = match identity {
            Identity::ServerDevice(index) => introspect.set_sink_mute_by_index(*index, muted, None),
            Identity::ServerStream(index) => introspect.set_sink_input_mute(*index, muted, None),
            Identity::KernelControl { .. } => return Err(rejected()),
        };
        if op.get_state() == OperationState::Cancelled {
            return Err(rejected());
        }
        Ok(())
    }

    fn attach_peak(&mut self, identity: &Identity, level: &PeakLevel) -> Result<bool, AudioError> {
        if self.peaks.contains_key(identity) {
            return Ok(false);
        }
        let (source, monitored_input) = match identity {
            Identity::ServerDevice(index) => (self.monitor_sources.get(index), None),
            Identity::ServerStream(index) => (
                self.input_sinks
                    .get(index)
                    .and_then(|sink| self.monitor_sources.get(sink)),
                Some(*index),
            ),
            Identity::KernelControl { .. } => return Ok(false),
        };
        let Some(source) = source.cloned() else {
            debug!("{LABEL} no monitor source for {identity}");
            return Ok(false);
        };

        let _guard = LoopGuard::lock(&self.mainloop);
        self.ensure_ready()?;
        let peak = PeakStream::connect(&mut self.context, &source, monitored_input, self.peak_rate, level)?;
        self.peaks.insert(identity.clone(), peak);
        Ok(true)
    }

    fn detach_peak(&mut self, identity: &Identity) {
        if let Some(peak) = self.peaks.remove(identity) {
            let _guard = LoopGuard::lock(&self.mainloop);
            peak.release();
        }
    }

    fn shutdown(&mut self) {
        self.disconnect();
    }
}

impl Drop for PulseMixer {
    fn drop(&mut self) {
        self.disconnect();
        self.mainloop.borrow_mut().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::SERVER_VOLUME_NORM;

    #[test]
    fn channel_volumes_keep_every_channel() {
        let cv = to_channel_volumes(&[SERVER_VOLUME_NORM, SERVER_VOLUME_NORM / 2]).unwrap();
        assert_eq!(cv.len(), 2);
        assert_eq!(
            to_volume(&cv),
            Volume::Server(vec![SERVER_VOLUME_NORM, SERVER_VOLUME_NORM / 2])
        );
    }

    #[test]
    fn channel_count_must_be_sane() {
        assert!(to_channel_volumes(&[]).is_none());
        assert!(to_channel_volumes(&[SERVER_VOLUME_NORM; MAX_CHANNELS + 1]).is_none());
        assert!(to_channel_volumes(&[SERVER_VOLUME_NORM; MAX_CHANNELS]).is_some());
    }

    #[test]
    fn norm_matches_server_scale() {
        assert_eq!(PaVolume::NORMAL.0, SERVER_VOLUME_NORM);
    }

    #[test]
    fn cut_short_listing_keeps_delivered_items() {
        let mut collected = Collected {
            items: vec![1u32, 2, 3],
            failed: true,
        };
        let (items, err) = collected.take_partial(Err(AudioError::QueryTimeout {
            backend: LABEL,
            query: "sinks",
        }));
        assert_eq!(items, vec![1, 2, 3]);
        assert!(matches!(err, Some(AudioError::QueryTimeout { .. })));
        assert!(collected.items.is_empty());

        collected.items.push(4);
        let (items, err) = collected.take_partial(Ok(()));
        assert_eq!(items, vec![4]);
        assert!(err.is_none());
    }

    fn running_loop() -> SharedLoop {
        let mut mainloop = Mainloop::new().unwrap();
        mainloop.start().unwrap();
        Rc::new(RefCell::new(mainloop))
    }

    fn stop_loop(mainloop: SharedLoop) {
        mainloop.borrow_mut().stop();
    }

    #[test]
    fn wait_gives_up_at_the_deadline() {
        let mainloop = running_loop();
        let started = Instant::now();
        let mut polls = 0;
        let outcome = {
            let _guard = LoopGuard::lock(&mainloop);
            block_on(&mainloop, Duration::from_millis(50), || {
                polls += 1;
                Wake::Pending
            })
        };
        let elapsed = started.elapsed();
        assert!(matches!(outcome, Err(Blocked::TimedOut)));
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_secs(2));
        assert!(polls >= 2);
        stop_loop(mainloop);
    }

    #[test]
    fn wait_ends_at_once_when_connection_drops() {
        let mainloop = running_loop();
        let started = Instant::now();
        let outcome = {
            let _guard = LoopGuard::lock(&mainloop);
            block_on(&mainloop, Duration::from_secs(10), || Wake::Lost)
        };
        assert!(matches!(outcome, Err(Blocked::Lost)));
        assert!(started.elapsed() < Duration::from_secs(1));
        stop_loop(mainloop);
    }

    #[test]
    fn wait_returns_when_done() {
        let mainloop = running_loop();
        let outcome = {
            let _guard = LoopGuard::lock(&mainloop);
            block_on(&mainloop, Duration::from_secs(10), || Wake::Done)
        };
        assert!(outcome.is_ok());
        stop_loop(mainloop);
    }

    #[test]
    fn stream_title_prefers_application() {
        assert_eq!(stream_title(Some("Firefox".into()), "AudioStream"), "Firefox");
        assert_eq!(stream_title(Some("  ".into()), "AudioStream"), "AudioStream");
        assert_eq!(stream_title(None, "Playback"), "Playback");
    }
}
