//! Adapters Layer: Socket Lifecycle and Streams
//!
//! Provides the TCP socket subsystem for the runtime: descriptor lifecycle
//! management, independently closable stream pairs over each descriptor,
//! and platform name resolution. Socket operations use the `socket2` crate;
//! descriptor bookkeeping lives in the entities layer.
//!
//! ## Overview
//!
//! The `adapters_socket` crate provides:
//! - **Lifecycle operations**: create, bind, listen, connect, accept, and
//!   forced close over registered descriptors
//! - **Stream pairs**: an input stream and, for non-listening descriptors,
//!   an output stream, closed independently with the descriptor released
//!   exactly once
//! - **Name resolution**: host, service, and reverse lookups through the
//!   platform resolver, with resolver-namespace error reporting
//!
//! ## Architecture
//!
//! This crate is part of the adapters layer in the CLEAN architecture
//! implementation. It depends on:
//! - `entities_socket_state`: For descriptor identity, role bookkeeping,
//!   and the address forms crossing the runtime boundary
//!
//! Every OS effect follows a registry verdict: stream attachment is
//! recorded atomically before streams exist, and the descriptor close is
//! performed by whichever path removes the last stream reference.
//!
//! ## See Also
//!
//! - [`entities_socket_state`](../entities_socket_state/index.html): The
//!   pure bookkeeping core this crate composes with the OS transport

pub mod error;
pub mod resolve;
pub mod stream;
pub mod tcp;

pub use error::{ResolveError, SocketError};
pub use stream::{InputStream, OutputStream};
pub use tcp::TcpDriver;

// The boundary types travel with the driver API.
pub use entities_socket_state::{Address, Ip4, PortSpec, RoleFlags, SocketId};
