//! Readiness multiplexer.
//!
//! Thin wrapper over Linux epoll. The listening socket is registered
//! level-triggered; connection sockets are registered edge-triggered and
//! one-shot, so a reported socket stays silent until explicitly re-armed.
//! That re-arm discipline is what serializes access to a connection's
//! buffers across the reactor and the worker pool.

use std::io;
use std::os::fd::AsFd;
use std::sync::{Mutex, PoisonError};

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

/// Reserved token for the listening socket. Connection tokens are issued
/// monotonically from zero and can never collide with it.
pub const LISTENER_TOKEN: u64 = u64::MAX;

/// Upper bound on events surfaced by a single wait.
const MAX_EVENTS: usize = 1024;

/// One readiness report, already translated out of the epoll flag set.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
    /// Peer hangup, half-close, or socket error: close unconditionally.
    pub error: bool,
}

impl From<EpollEvent> for Readiness {
    fn from(event: EpollEvent) -> Self {
        let flags = event.events();
        Readiness {
            token: event.data(),
            readable: flags.contains(EpollFlags::EPOLLIN),
            writable: flags.contains(EpollFlags::EPOLLOUT),
            error: flags
                .intersects(EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR),
        }
    }
}

pub struct Poller {
    epoll: Epoll,
    /// Reusable event buffer; only the reactor thread waits, the mutex
    /// just keeps `wait` on `&self`.
    events: Mutex<Vec<EpollEvent>>,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(to_io)?;
        Ok(Self {
            epoll,
            events: Mutex::new(vec![EpollEvent::empty(); MAX_EVENTS]),
        })
    }

    pub fn register_listener(&self, fd: &impl AsFd) -> io::Result<()> {
        self.epoll
            .add(fd, EpollEvent::new(EpollFlags::EPOLLIN, LISTENER_TOKEN))
            .map_err(to_io)
    }

    pub fn register_conn(&self, fd: &impl AsFd, token: u64) -> io::Result<()> {
        self.epoll
            .add(fd, EpollEvent::new(oneshot(EpollFlags::EPOLLIN), token))
            .map_err(to_io)
    }

    /// Re-arms a one-shot registration for readable readiness.
    pub fn rearm_read(&self, fd: &impl AsFd, token: u64) -> io::Result<()> {
        self.epoll
            .modify(fd, &mut EpollEvent::new(oneshot(EpollFlags::EPOLLIN), token))
            .map_err(to_io)
    }

    /// Re-arms a one-shot registration for writable readiness.
    pub fn rearm_write(&self, fd: &impl AsFd, token: u64) -> io::Result<()> {
        self.epoll
            .modify(fd, &mut EpollEvent::new(oneshot(EpollFlags::EPOLLOUT), token))
            .map_err(to_io)
    }

    pub fn deregister(&self, fd: &impl AsFd) -> io::Result<()> {
        self.epoll.delete(fd).map_err(to_io)
    }

    /// Blocks until readiness is reported, filling `out`.
    ///
    /// A signal interrupting the wait is transient and reports zero
    /// events; any other failure is fatal to the event loop.
    pub fn wait(&self, out: &mut Vec<Readiness>) -> io::Result<usize> {
        out.clear();
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match self.epoll.wait(&mut events, EpollTimeout::NONE) {
            Ok(n) => {
                out.extend(events[..n].iter().copied().map(Readiness::from));
                Ok(n)
            }
            Err(Errno::EINTR) => Ok(0),
            Err(e) => Err(to_io(e)),
        }
    }
}

fn oneshot(ready: EpollFlags) -> EpollFlags {
    ready | EpollFlags::EPOLLET | EpollFlags::EPOLLONESHOT | EpollFlags::EPOLLRDHUP
}

fn to_io(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}
