//! IPC server: framed JSON protocol over a Unix domain socket.
//!
//! Wire format: 4-byte big-endian length prefix + UTF-8 JSON payload.
//! Gaze samples and distance readings arrive as tagged messages; pipeline
//! events are broadcast to every connected client.

pub mod dispatch;
pub mod server;

pub use server::IpcServer;
