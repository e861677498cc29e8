use crate::subsystem::AudioSubsystem;
use std::os::fd::RawFd;

/// Called by the host loop, with the main-loop lock held, when a
/// registered descriptor becomes ready.
pub type Wakeup = Box<dyn FnMut(&mut AudioSubsystem) + Send>;

/// Descriptor registration supplied by the surrounding application.
pub trait FdRegistrar {
    fn register_fd(&mut self, fd: RawFd, events: i16, wakeup: Wakeup);
    fn unregister_fd(&mut self, fd: RawFd);
}

/// For hosts without a descriptor loop. Kernel mixer changes made by other
/// programs then go unnoticed until the next explicit refresh.
#[derive(Debug, Default)]
pub struct NoFdLoop;

impl FdRegistrar for NoFdLoop {
    fn register_fd(&mut self, _fd: RawFd, _events: i16, _wakeup: Wakeup) {}

    fn unregister_fd(&mut self, _fd: RawFd) {}
}
