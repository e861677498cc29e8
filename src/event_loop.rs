use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use std::os::fd::{AsFd, BorrowedFd, RawFd};
use std::time::{Duration, Instant};
use stripbar_audio::{AudioSubsystem, FdRegistrar, SharedAudio, Wakeup};
use tracing::{debug, info};

struct Watch {
    fd: RawFd,
    events: PollFlags,
    wakeup: Wakeup,
}

/// Single-threaded descriptor loop standing in for the panel's own.
#[derive(Default)]
pub struct FdLoop {
    watches: Vec<Watch>,
}

impl std::fmt::Debug for FdLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fds: Vec<RawFd> = self.watches.iter().map(|w| w.fd).collect();
        f.debug_struct("FdLoop").field("fds", &fds).finish()
    }
}

impl FdRegistrar for FdLoop {
    fn register_fd(&mut self, fd: RawFd, events: i16, wakeup: Wakeup) {
        let events = PollFlags::from_bits_truncate(events);
        self.watches.retain(|w| w.fd != fd);
        self.watches.push(Watch { fd, events, wakeup });
        debug!("watching fd {fd}");
    }

    fn unregister_fd(&mut self, fd: RawFd) {
        self.watches.retain(|w| w.fd != fd);
        debug!("released fd {fd}");
    }
}

/// Blocks SIGINT and SIGTERM for this thread and returns a descriptor that
/// becomes readable when either arrives.
pub fn shutdown_signals() -> nix::Result<SignalFd> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()?;
    SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
}

fn until_next_frame(last: Instant, interval: Duration) -> u16 {
    let left = interval.saturating_sub(last.elapsed());
    u16::try_from(left.as_millis()).unwrap_or(u16::MAX)
}

impl FdLoop {
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Runs until a shutdown signal arrives. The main-loop lock is only
    /// held while dispatching wakeups and drawing a frame.
    pub fn run<F>(
        &mut self,
        audio: &SharedAudio,
        signals: &SignalFd,
        frame_interval: Duration,
        mut on_frame: F,
    ) -> nix::Result<()>
    where
        F: FnMut(&mut AudioSubsystem),
    {
        let mut last_frame = Instant::now();
        loop {
            let mut ready: Vec<RawFd> = Vec::new();
            {
                let mut fds = Vec::with_capacity(self.watches.len() + 1);
                fds.push(PollFd::new(signals.as_fd(), PollFlags::POLLIN));
                for w in &self.watches {
                    // SAFETY: backends keep registered descriptors open until
                    // they are unregistered, which also drops the watch.
                    let fd = unsafe { BorrowedFd::borrow_raw(w.fd) };
                    fds.push(PollFd::new(fd, w.events));
                }

                let timeout = PollTimeout::from(until_next_frame(last_frame, frame_interval));
                match poll(&mut fds, timeout) {
                    Ok(_) => {}
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e),
                }

                let fired = |pfd: &PollFd<'_>| pfd.revents().is_some_and(|r| !r.is_empty());
                if fired(&fds[0]) {
                    if let Ok(Some(info)) = signals.read_signal() {
                        info!("received signal {}, shutting down", info.ssi_signo);
                    }
                    return Ok(());
                }
                for (pfd, w) in fds[1..].iter().zip(&self.watches) {
                    if fired(pfd) {
                        ready.push(w.fd);
                    }
                }
            }

            let mut guard = audio.lock();
            for fd in ready {
                if let Some(w) = self.watches.iter_mut().find(|w| w.fd == fd) {
                    (w.wakeup)(&mut *guard);
                }
            }
            if last_frame.elapsed() >= frame_interval {
                on_frame(&mut *guard);
                last_frame = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_replaces_the_watch() {
        let mut fd_loop = FdLoop::default();
        fd_loop.register_fd(5, PollFlags::POLLIN.bits(), Box::new(|_| {}));
        fd_loop.register_fd(5, PollFlags::POLLOUT.bits(), Box::new(|_| {}));
        fd_loop.register_fd(6, PollFlags::POLLIN.bits(), Box::new(|_| {}));
        assert_eq!(fd_loop.len(), 2);
        assert_eq!(fd_loop.watches[1].fd, 5);
        assert_eq!(fd_loop.watches[1].events, PollFlags::POLLOUT);

        fd_loop.unregister_fd(5);
        fd_loop.unregister_fd(42);
        assert_eq!(fd_loop.len(), 1);
        fd_loop.unregister_fd(6);
        assert!(fd_loop.is_empty());
    }

    #[test]
    fn frame_timeout_shrinks_toward_zero() {
        let interval = Duration::from_millis(40);
        assert_eq!(until_next_frame(Instant::now() - interval * 2, interval), 0);
        assert!(until_next_frame(Instant::now(), interval) <= 40);
    }
}
