//! Socket Handle Registry
//!
//! Tracks the lifecycle roles of live socket descriptors. Every descriptor the
//! socket subsystem hands out is recorded here together with a bitmask of the
//! roles it has accumulated (bound, listening, connected, accepted) and of the
//! stream objects currently attached to it.
//!
//! The registry is pure bookkeeping: it never touches the OS. Callers perform
//! the actual descriptor close after the registry has decided that the last
//! stream reference is gone, so the record is always removed before the close
//! is attempted and a failing close can never strand a stale record.
//!
//! ## Overview
//!
//! The table answers three questions for the adapters layer:
//! - which roles has this descriptor accumulated so far,
//! - may a stream pair be attached to it right now, and
//! - did clearing a stream-presence flag just drop the last reference.
//!
//! All mutation goes through one mutex, and the compound checks
//! ([`HandleTable::begin_streams`], [`HandleTable::clear_role`]) each run as a
//! single critical section. When two threads close the two halves of a stream
//! pair concurrently, exactly one of them observes [`ClearOutcome::Released`]
//! and owns the descriptor close.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use bitflags::bitflags;

/// Raw OS representation of a socket descriptor
#[cfg(unix)]
pub type RawSocketHandle = std::os::unix::io::RawFd;
/// Raw OS representation of a socket descriptor
#[cfg(windows)]
pub type RawSocketHandle = std::os::windows::io::RawSocket;

/// Opaque descriptor identity used across the subsystem boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(RawSocketHandle);

impl SocketId {
    /// Wrap a raw descriptor value
    pub fn from_raw(raw: RawSocketHandle) -> Self {
        Self(raw)
    }

    /// Get the raw descriptor value
    pub fn as_raw(&self) -> RawSocketHandle {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Roles a socket descriptor has accumulated.
    ///
    /// Role bits are only ever added over a descriptor's lifetime; the two
    /// stream-presence bits are the single exception and are cleared when the
    /// corresponding stream object is closed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoleFlags: u8 {
        /// An input stream object is attached
        const INPUT_STREAM = 0x01;
        /// An output stream object is attached
        const OUTPUT_STREAM = 0x02;
        /// The descriptor has been bound to a local address
        const BOUND = 0x04;
        /// The descriptor is a passive (listening) socket
        const LISTENING = 0x08;
        /// The descriptor holds an established active connection
        const CONNECTED = 0x10;
        /// The descriptor was produced by accepting a connection
        const ACCEPTED = 0x20;
        /// Both stream-presence bits
        const STREAM_MASK = Self::INPUT_STREAM.bits() | Self::OUTPUT_STREAM.bits();
    }
}

/// Result of clearing role bits from a descriptor record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The record remains; other references are still live
    Retained,
    /// The last stream reference is gone and the record was removed;
    /// the caller now owns closing the OS descriptor
    Released,
}

/// Result of attempting to attach a stream pair to a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStart {
    /// The descriptor is not registered
    Unregistered,
    /// A stream pair is already attached
    AlreadyStreaming,
    /// Stream presence was recorded; `output` is false for listening
    /// descriptors, which only get an input stream
    Started {
        /// Whether an output stream was started alongside the input stream
        output: bool,
    },
}

/// Registry of live socket descriptors and their accumulated roles
#[derive(Debug)]
pub struct HandleTable {
    entries: Mutex<HashMap<SocketId, RoleFlags>>,
}

impl HandleTable {
    /// Create an empty handle table
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the roles recorded for a descriptor, inserting an empty
    /// record first if the descriptor has not been seen before.
    pub fn lookup_or_create(&self, id: SocketId) -> RoleFlags {
        let mut entries = self.entries.lock().unwrap();
        *entries.entry(id).or_insert(RoleFlags::empty())
    }

    /// Add role bits to a descriptor record, creating the record if needed
    pub fn set_role(&self, id: SocketId, flags: RoleFlags) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(id).or_insert(RoleFlags::empty()).insert(flags);
    }

    /// Remove role bits from a descriptor record.
    ///
    /// If the clear removes the last stream-presence bit, the record is
    /// dropped from the table in the same critical section and the caller is
    /// told to close the OS descriptor. Clearing bits on an unknown
    /// descriptor is a no-op.
    ///
    /// # Returns
    ///
    /// * [`ClearOutcome::Released`] - the record was removed; close the descriptor
    /// * [`ClearOutcome::Retained`] - the record remains (or never existed)
    pub fn clear_role(&self, id: SocketId, flags: RoleFlags) -> ClearOutcome {
        let mut entries = self.entries.lock().unwrap();

        let roles = match entries.get_mut(&id) {
            Some(roles) => roles,
            None => return ClearOutcome::Retained,
        };

        let had_stream = roles.intersects(RoleFlags::STREAM_MASK);
        roles.remove(flags);

        if had_stream
            && flags.intersects(RoleFlags::STREAM_MASK)
            && !roles.intersects(RoleFlags::STREAM_MASK)
        {
            entries.remove(&id);
            return ClearOutcome::Released;
        }

        ClearOutcome::Retained
    }

    /// Record stream attachment for a descriptor.
    ///
    /// Checks registration, rejects a second attachment while stream-presence
    /// bits are set, and decides whether an output stream accompanies the
    /// input stream (listening descriptors only get an input stream). The
    /// whole check-and-set runs under one lock acquisition so two concurrent
    /// attachments cannot both succeed.
    ///
    /// # Returns
    ///
    /// * [`StreamStart::Started`] - presence bits were set; `output` says
    ///   whether an output stream was included
    /// * [`StreamStart::AlreadyStreaming`] - a pair is already attached
    /// * [`StreamStart::Unregistered`] - the descriptor is unknown
    pub fn begin_streams(&self, id: SocketId) -> StreamStart {
        let mut entries = self.entries.lock().unwrap();

        let roles = match entries.get_mut(&id) {
            Some(roles) => roles,
            None => return StreamStart::Unregistered,
        };

        if roles.intersects(RoleFlags::STREAM_MASK) {
            return StreamStart::AlreadyStreaming;
        }

        roles.insert(RoleFlags::INPUT_STREAM);
        let output = !roles.contains(RoleFlags::LISTENING);
        if output {
            roles.insert(RoleFlags::OUTPUT_STREAM);
        }

        StreamStart::Started { output }
    }

    /// Remove a descriptor record unconditionally, bypassing stream
    /// reference counting. Returns whether the record existed.
    pub fn release(&self, id: SocketId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&id).is_some()
    }

    /// Get the roles recorded for a descriptor, if it is registered
    pub fn roles(&self, id: SocketId) -> Option<RoleFlags> {
        let entries = self.entries.lock().unwrap();
        entries.get(&id).copied()
    }

    /// Whether a descriptor is registered
    pub fn contains(&self, id: SocketId) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.contains_key(&id)
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap();
        entries.len()
    }

    /// Whether the table has no registered descriptors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i32) -> SocketId {
        SocketId::from_raw(raw as RawSocketHandle)
    }

    #[test]
    fn test_lookup_or_create_is_idempotent() {
        let table = HandleTable::new();

        let first = table.lookup_or_create(id(7));
        let second = table.lookup_or_create(id(7));

        assert_eq!(first, RoleFlags::empty());
        assert_eq!(second, RoleFlags::empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_set_role_accumulates_bits() {
        let table = HandleTable::new();

        table.set_role(id(3), RoleFlags::BOUND);
        table.set_role(id(3), RoleFlags::LISTENING);

        let roles = table.roles(id(3)).unwrap();
        assert!(roles.contains(RoleFlags::BOUND));
        assert!(roles.contains(RoleFlags::LISTENING));
    }

    #[test]
    fn test_roles_survive_stream_attach_and_detach() {
        let table = HandleTable::new();

        table.set_role(id(4), RoleFlags::CONNECTED);
        assert!(matches!(
            table.begin_streams(id(4)),
            StreamStart::Started { output: true }
        ));

        // Detaching one half must not disturb the accumulated roles.
        assert_eq!(
            table.clear_role(id(4), RoleFlags::INPUT_STREAM),
            ClearOutcome::Retained
        );
        let roles = table.roles(id(4)).unwrap();
        assert!(roles.contains(RoleFlags::CONNECTED));
        assert!(roles.contains(RoleFlags::OUTPUT_STREAM));
        assert!(!roles.contains(RoleFlags::INPUT_STREAM));
    }

    #[test]
    fn test_begin_streams_requires_registration() {
        let table = HandleTable::new();
        assert_eq!(table.begin_streams(id(9)), StreamStart::Unregistered);
        assert!(!table.contains(id(9)));
    }

    #[test]
    fn test_begin_streams_rejects_second_attachment() {
        let table = HandleTable::new();

        table.set_role(id(5), RoleFlags::CONNECTED);
        assert!(matches!(
            table.begin_streams(id(5)),
            StreamStart::Started { .. }
        ));
        assert_eq!(table.begin_streams(id(5)), StreamStart::AlreadyStreaming);
    }

    #[test]
    fn test_listening_descriptor_gets_no_output_stream() {
        let table = HandleTable::new();

        table.set_role(id(6), RoleFlags::BOUND | RoleFlags::LISTENING);
        assert_eq!(
            table.begin_streams(id(6)),
            StreamStart::Started { output: false }
        );

        let roles = table.roles(id(6)).unwrap();
        assert!(roles.contains(RoleFlags::INPUT_STREAM));
        assert!(!roles.contains(RoleFlags::OUTPUT_STREAM));
    }

    #[test]
    fn test_clear_of_last_stream_flag_releases() {
        let table = HandleTable::new();

        table.set_role(id(8), RoleFlags::CONNECTED);
        table.begin_streams(id(8));

        assert_eq!(
            table.clear_role(id(8), RoleFlags::OUTPUT_STREAM),
            ClearOutcome::Retained
        );
        assert_eq!(
            table.clear_role(id(8), RoleFlags::INPUT_STREAM),
            ClearOutcome::Released
        );
        assert!(!table.contains(id(8)));
    }

    #[test]
    fn test_input_only_pair_releases_on_single_clear() {
        let table = HandleTable::new();

        table.set_role(id(2), RoleFlags::LISTENING);
        assert_eq!(
            table.begin_streams(id(2)),
            StreamStart::Started { output: false }
        );
        assert_eq!(
            table.clear_role(id(2), RoleFlags::INPUT_STREAM),
            ClearOutcome::Released
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_without_streams_never_releases() {
        let table = HandleTable::new();

        table.set_role(id(1), RoleFlags::BOUND);
        assert_eq!(
            table.clear_role(id(1), RoleFlags::INPUT_STREAM),
            ClearOutcome::Retained
        );
        assert!(table.contains(id(1)));
    }

    #[test]
    fn test_clear_on_unknown_descriptor_is_noop() {
        let table = HandleTable::new();
        assert_eq!(
            table.clear_role(id(42), RoleFlags::INPUT_STREAM),
            ClearOutcome::Retained
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_release_removes_record() {
        let table = HandleTable::new();

        table.set_role(id(11), RoleFlags::CONNECTED);
        table.begin_streams(id(11));

        assert!(table.release(id(11)));
        assert!(!table.release(id(11)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_socket_id_display_shows_raw_value() {
        assert_eq!(id(12).to_string(), "12");
        assert_eq!(id(12).as_raw(), 12 as RawSocketHandle);
    }
}
