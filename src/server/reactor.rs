use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::connection::{Connection, WriteOutcome};
use crate::pool::{Job, WorkerPool};
use crate::server::poller::{Poller, Readiness, LISTENER_TOKEN};
use crate::server::Shared;

/// The reactor: accepts connections, waits for readiness and drives all
/// socket I/O from a single thread. Parsing and response composition are
/// handed to the worker pool.
pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    pool: WorkerPool,
    max_connections: usize,
}

impl Server {
    /// Binds the listener, sets up the poller and worker pool, and spawns
    /// the tick thread that reaps idle connections.
    pub fn new(cfg: Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.server.listen_addr)
            .with_context(|| format!("binding {}", cfg.server.listen_addr))?;
        listener
            .set_nonblocking(true)
            .context("setting listener non-blocking")?;

        let poller = Poller::new().context("creating poller")?;
        poller
            .register_listener(&listener)
            .context("registering listener")?;

        let shared = Arc::new(Shared::new(
            poller,
            cfg.static_files.root.clone(),
            cfg.timeouts.idle(),
        ));
        let pool = WorkerPool::new(cfg.pool.workers, cfg.pool.queue_depth, Arc::clone(&shared))?;

        let tick = cfg.timeouts.tick();
        let sweeper = Arc::clone(&shared);
        thread::Builder::new()
            .name("hearth-tick".into())
            .spawn(move || loop {
                thread::sleep(tick);
                sweeper.sweep();
            })
            .context("spawning tick thread")?;

        info!(
            addr = %listener.local_addr().context("reading bound address")?,
            root = %cfg.static_files.root.display(),
            workers = cfg.pool.workers,
            "listening"
        );

        Ok(Self {
            listener,
            shared,
            pool,
            max_connections: cfg.server.max_connections,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop. Returns only on a fatal poller failure.
    pub fn run(self) -> anyhow::Result<()> {
        let mut events = Vec::new();
        loop {
            self.shared
                .poller
                .wait(&mut events)
                .context("waiting for readiness")?;
            for event in &events {
                if event.token == LISTENER_TOKEN {
                    self.accept_ready();
                } else {
                    self.conn_ready(*event);
                }
            }
        }
    }

    /// Drains the accept queue; the listener is level-triggered but one
    /// readable report can cover several queued connections.
    fn accept_ready(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    warn!(%error, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if self.shared.connection_count() >= self.max_connections {
            warn!(%peer, "connection table full, rejecting");
            return;
        }
        if let Err(error) = stream.set_nonblocking(true) {
            warn!(%peer, %error, "failed to set connection non-blocking");
            return;
        }

        let (id, conn) = self.shared.insert(|id| Connection::new(id, stream, peer));
        let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.add_timer(&mut conn);
        if let Err(error) = conn.register(&self.shared) {
            warn!(conn = id, %peer, %error, "failed to register connection");
            self.shared.discard(&mut conn);
            return;
        }
        debug!(conn = id, %peer, "accepted");
    }

    fn conn_ready(&self, event: Readiness) {
        let Some(conn) = self.shared.get(event.token) else {
            // Already reaped or discarded; the event is stale.
            return;
        };
        let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_closed() {
            return;
        }

        if event.error {
            debug!(conn = event.token, "peer hung up");
            self.shared.discard(&mut guard);
            return;
        }

        if event.readable {
            match guard.on_readable() {
                Ok(()) => {
                    self.shared.touch(&guard);
                    drop(guard);
                    self.submit(event.token, conn);
                }
                Err(error) => {
                    debug!(conn = event.token, %error, "read failed");
                    self.shared.discard(&mut guard);
                }
            }
            return;
        }

        if event.writable {
            match guard.on_writable(&self.shared) {
                Ok(WriteOutcome::Open) => self.shared.touch(&guard),
                Ok(WriteOutcome::NextRequest) => {
                    // Pipelined bytes are already buffered; edge-triggered
                    // readiness will not announce them again, so parse now.
                    self.shared.touch(&guard);
                    drop(guard);
                    self.submit(event.token, conn);
                }
                Ok(WriteOutcome::Finished) => {
                    debug!(conn = event.token, "response flushed, closing");
                    self.shared.discard(&mut guard);
                }
                Err(error) => {
                    debug!(conn = event.token, %error, "write failed");
                    self.shared.discard(&mut guard);
                }
            }
        }
    }

    fn submit(&self, id: u64, conn: Arc<Mutex<Connection>>) {
        if self.pool.submit(Job::new(id, conn)).is_err() {
            // Do not block the reactor on a saturated pool; the idle
            // reaper collects the connection if the backlog never clears.
            warn!(conn = id, "job queue full, deferring connection");
        }
    }
}
