//! Event-driven server core.
//!
//! The reactor owns the listening socket and the readiness loop; workers
//! borrow connections through [`Shared`], which ties together the poller,
//! the connection table and the idle-timer list.
//!
//! Lock order is connection first, then table or timer list, never the
//! reverse. The sweep collects expired ids under the timer lock and
//! releases it before touching any connection, so the two directions
//! never hold-and-wait against each other.

pub mod poller;
pub mod reactor;

pub use poller::Poller;
pub use reactor::Server;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::http::connection::Connection;
use crate::timers::TimerList;

struct ConnTable {
    map: HashMap<u64, Arc<Mutex<Connection>>>,
    next_id: u64,
}

/// State shared between the reactor, the workers and the tick thread.
pub struct Shared {
    pub poller: Poller,
    pub doc_root: PathBuf,
    idle_timeout: Duration,
    timers: Mutex<TimerList>,
    conns: Mutex<ConnTable>,
}

impl Shared {
    pub fn new(poller: Poller, doc_root: PathBuf, idle_timeout: Duration) -> Self {
        Self {
            poller,
            doc_root,
            idle_timeout,
            timers: Mutex::new(TimerList::new()),
            conns: Mutex::new(ConnTable {
                map: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    fn lock_conns(&self) -> MutexGuard<'_, ConnTable> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timers(&self) -> MutexGuard<'_, TimerList> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection_count(&self) -> usize {
        self.lock_conns().map.len()
    }

    /// Issues a fresh id and installs the connection the closure builds
    /// around it. Ids are monotonic and never reused, so a late readiness
    /// event for a dead connection can only miss, not alias.
    pub fn insert(
        &self,
        make: impl FnOnce(u64) -> Connection,
    ) -> (u64, Arc<Mutex<Connection>>) {
        let mut table = self.lock_conns();
        let id = table.next_id;
        table.next_id += 1;
        let conn = Arc::new(Mutex::new(make(id)));
        table.map.insert(id, Arc::clone(&conn));
        (id, conn)
    }

    pub fn get(&self, id: u64) -> Option<Arc<Mutex<Connection>>> {
        self.lock_conns().map.get(&id).cloned()
    }

    fn take(&self, id: u64) -> Option<Arc<Mutex<Connection>>> {
        self.lock_conns().map.remove(&id)
    }

    /// Registers an idle deadline for the connection.
    pub fn add_timer(&self, conn: &mut Connection) {
        let expire = Instant::now() + self.idle_timeout;
        conn.timer = Some(self.lock_timers().add(conn.id(), expire));
    }

    /// Pushes the connection's idle deadline out after activity.
    pub fn touch(&self, conn: &Connection) {
        if let Some(timer) = conn.timer {
            self.lock_timers().renew(timer, Instant::now() + self.idle_timeout);
        }
    }

    /// Tears a connection down completely: socket, timer and table entry.
    /// Safe to call more than once for the same connection.
    pub fn discard(&self, conn: &mut Connection) {
        conn.close(self);
        if let Some(timer) = conn.timer.take() {
            self.lock_timers().remove(timer);
        }
        self.take(conn.id());
    }

    /// Closes every connection whose idle deadline has passed. Runs on the
    /// tick thread.
    pub fn sweep(&self) {
        let expired = self.lock_timers().sweep(Instant::now());
        for id in expired {
            if let Some(conn) = self.take(id) {
                let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
                // The timer node is already gone with the sweep.
                conn.timer = None;
                info!(conn = id, peer = %conn.peer(), "closing idle connection");
                conn.close(self);
            }
        }
    }
}
