//! Entities Layer: Socket State
//!
//! This crate provides the descriptor bookkeeping core of the runtime's socket
//! subsystem. It records which roles each live socket descriptor has
//! accumulated (bound, listening, connected, accepted, streams attached) and
//! decides when the last stream reference to a descriptor is gone, so the
//! descriptor is closed exactly once.
//!
//! ## Overview
//!
//! The `entities_socket_state` crate is the innermost layer of the socket
//! subsystem. It performs no OS calls: descriptors are tracked as opaque
//! [`SocketId`] values, and the adapters layer is responsible for every
//! actual socket operation. Keeping the bookkeeping pure makes the lifecycle
//! rules (one record per live descriptor, release on last stream close)
//! testable without touching the network.
//!
//! ## Modules
//!
//! - **[`handle`](handle/index.html)**: The handle registry. Maps descriptors
//!   to accumulated [`RoleFlags`], attaches stream pairs atomically, and
//!   reports when clearing a stream-presence flag dropped the last reference.
//!
//! - **[`addr`](addr/index.html)**: Boundary address forms. Four-octet
//!   [`Ip4`] addresses with host-order integer packing, [`PortSpec`] port
//!   selectors (numeric or service name), and the [`Address`] bind/connect
//!   target.
//!
//! ## Architecture
//!
//! This crate has no dependencies on other crates in the system. The adapters
//! layer (`adapters_socket`) composes it with the OS transport: every
//! lifecycle operation consults the table first, and the table's verdicts
//! (attach allowed, last reference gone) drive the OS-level effects.
//!
//! ## See Also
//!
//! - [`adapters_socket`](../adapters_socket/index.html): TCP transport,
//!   stream objects, and the platform resolver built on top of this crate

pub mod addr;
pub mod handle;

// Re-export main types for convenience
pub use addr::{Address, Ip4, PortSpec};
pub use handle::{ClearOutcome, HandleTable, RawSocketHandle, RoleFlags, SocketId, StreamStart};
