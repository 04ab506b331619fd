//! # fusedb-server
//!
//! Binary RPC front-end for the fusedb engine: framed wire protocol,
//! session table, request dispatch, and columnar result encoding.

/// Wire ↔ engine conversions.
pub mod convert;
/// Session table, per-verb handlers, result encoding.
pub mod handlers;
/// Framed messages, wire enum codes, request/response structures.
pub mod protocol;
/// TCP accept loop.
pub mod server;
