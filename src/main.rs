mod config;
#[cfg(unix)]
mod event_loop;
mod logging;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stripbar_audio::AudioSubsystem;
use tracing::{error, info, warn};

#[cfg(unix)]
fn main() -> ExitCode {
    logging::init();
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::load_or_default(explicit.as_deref());

    let signals = match event_loop::shutdown_signals() {
        Ok(signals) => signals,
        Err(e) => {
            error!("cannot install signal handling: {e}");
            return ExitCode::FAILURE;
        }
    };

    let audio = AudioSubsystem::new_shared(config.audio.clone());
    let mut fd_loop = event_loop::FdLoop::default();
    let changed = Arc::new(AtomicBool::new(true));
    {
        let mut a = audio.lock();
        match a.start(&mut fd_loop) {
            Some(kind) => info!("volume control via {}", kind.label()),
            None => warn!("running without volume control"),
        }
        let changed = changed.clone();
        a.set_change_callback(move || changed.store(true, Ordering::Release));
    }

    let mut status = status::StatusLine::new(config.panel.show_peaks);
    let result = fd_loop.run(&audio, &signals, config.panel.frame_interval(), |a| {
        let dirty = changed.swap(false, Ordering::AcqRel);
        if !dirty && !status.show_peaks() {
            return;
        }
        if let Some(line) = status.update(a.clients()) {
            println!("{line}");
        }
    });

    audio.lock().stop(&mut fd_loop);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("event loop failed: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(unix))]
fn main() -> ExitCode {
    logging::init();
    error!("stripbar needs a unix descriptor loop");
    ExitCode::FAILURE
}
