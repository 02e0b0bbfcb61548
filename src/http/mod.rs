//! HTTP/1.1 request handling.
//!
//! A connection moves through a small set of states, with the reactor
//! thread on the socket side and a worker on the CPU side:
//!
//! ```text
//!                    readable edge            queue
//!   +--------+   +-----------------+   +----------------+
//!   | accept |-->| reactor: recv   |-->| worker: parse  |
//!   +--------+   | into read_buf   |   | resolve + map  |
//!                +-----------------+   | compose head   |
//!                        ^             +----------------+
//!                        |                     |
//!                        | keep-alive          | arm for write
//!                        | reset               v
//!                +-----------------+   writable edge
//!                | reactor: send   |<------------------+
//!                | head + mmap via |
//!                | vectored write  |--> close (Connection: close,
//!                +-----------------+     error, or idle timeout)
//! ```
//!
//! The parser works in place on the read buffer and keeps its position
//! across readable edges, so request fragmentation never changes the
//! outcome. The response travels as two segments, the composed head and
//! the mapped file, with independent sent offsets.

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
