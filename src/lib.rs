//! hearth: a single-process, event-driven static file server.
//!
//! One reactor thread multiplexes every socket through epoll with
//! edge-triggered, one-shot readiness; a bounded pool of worker threads
//! parses requests and composes responses; a sorted timer list reaps
//! idle connections on a fixed tick. Files are served straight out of
//! read-only memory maps with vectored writes.

pub mod config;
pub mod http;
pub mod pool;
pub mod server;
pub mod sync;
pub mod timers;
