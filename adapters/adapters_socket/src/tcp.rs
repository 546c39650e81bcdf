//! TCP Socket Driver
//!
//! Socket lifecycle operations over the `socket2` transport: create, bind,
//! listen, connect, accept, stream attachment, and forced close. Every
//! operation consults the handle registry before touching the OS, and the
//! registry's verdicts drive the OS effects, so a descriptor is released
//! exactly once regardless of which stream half goes away last.
//!
//! The driver keeps no live socket objects. Descriptors live in the
//! registry as raw values, and each operation materializes a transient,
//! non-owning view of the descriptor for the duration of one call.

use std::io;
use std::mem::ManuallyDrop;
use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

#[cfg(unix)]
use std::os::unix::io::{FromRawFd, IntoRawFd};
#[cfg(windows)]
use std::os::windows::io::{FromRawSocket, IntoRawSocket};

use entities_socket_state::{Address, HandleTable, RoleFlags, SocketId, StreamStart};

use crate::error::SocketError;
use crate::resolve;
use crate::stream::{InputStream, OutputStream};

/// Run `f` against a transient, non-owning view of a descriptor.
///
/// The handle registry owns the descriptor, so the view must never close
/// it; `ManuallyDrop` keeps the close where it belongs, with the registry's
/// release decision.
pub(crate) fn with_socket<R>(id: SocketId, f: impl FnOnce(&mut Socket) -> R) -> R {
    #[cfg(unix)]
    let mut socket = ManuallyDrop::new(unsafe { Socket::from_raw_fd(id.as_raw()) });
    #[cfg(windows)]
    let mut socket = ManuallyDrop::new(unsafe { Socket::from_raw_socket(id.as_raw()) });
    f(&mut socket)
}

/// Close the OS descriptor, surfacing the OS error.
///
/// Callers remove the registry record first, so a failing close can never
/// leave a stale record behind.
#[cfg(unix)]
pub(crate) fn close_descriptor(id: SocketId) -> io::Result<()> {
    if unsafe { libc::close(id.as_raw()) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
pub(crate) fn close_descriptor(id: SocketId) -> io::Result<()> {
    drop(unsafe { Socket::from_raw_socket(id.as_raw()) });
    Ok(())
}

#[cfg(unix)]
fn into_id(socket: Socket) -> SocketId {
    SocketId::from_raw(socket.into_raw_fd())
}

#[cfg(windows)]
fn into_id(socket: Socket) -> SocketId {
    SocketId::from_raw(socket.into_raw_socket())
}

/// TCP socket driver.
///
/// Owns the handle registry and exposes the socket lifecycle: descriptors
/// are minted by [`TcpDriver::socket`] and [`TcpDriver::accept`], accumulate
/// roles through [`TcpDriver::bind`], [`TcpDriver::listen`] and
/// [`TcpDriver::connect`], gain a stream pair through
/// [`TcpDriver::open_streams`], and are released either by the last stream
/// close or by [`TcpDriver::close_socket`].
pub struct TcpDriver {
    table: Arc<HandleTable>,
}

impl TcpDriver {
    /// Create a driver with an empty handle registry
    pub fn new() -> Self {
        Self {
            table: Arc::new(HandleTable::new()),
        }
    }

    fn ensure_registered(&self, id: SocketId) -> Result<(), SocketError> {
        if self.table.contains(id) {
            Ok(())
        } else {
            Err(SocketError::UnknownSocket(id))
        }
    }

    /// Create a new IPv4 stream socket and register it.
    ///
    /// The socket starts in blocking mode with no roles recorded.
    ///
    /// # Returns
    ///
    /// * `Ok(SocketId)` - Registered descriptor
    /// * `Err(SocketError)` - Error creating the socket
    pub fn socket(&self) -> Result<SocketId, SocketError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| SocketError::transport("socket", e))?;

        let id = into_id(socket);
        self.table.lookup_or_create(id);
        Ok(id)
    }

    /// Bind a descriptor to a local address.
    ///
    /// An absent host in `addr` binds the wildcard interface; a service
    /// name port is resolved through the services database first.
    ///
    /// # Arguments
    ///
    /// * `id` - Registered descriptor
    /// * `addr` - Local address to bind to
    pub fn bind(&self, id: SocketId, addr: &Address) -> Result<(), SocketError> {
        self.ensure_registered(id)?;
        let endpoint = resolve::socket_addr(addr)?;

        with_socket(id, |socket| socket.bind(&SockAddr::from(endpoint)))
            .map_err(|e| SocketError::transport("bind", e))?;

        self.table.set_role(id, RoleFlags::BOUND);
        Ok(())
    }

    /// Mark a descriptor as a passive (listening) socket.
    ///
    /// # Arguments
    ///
    /// * `id` - Registered descriptor
    /// * `backlog` - Maximum number of pending connections
    pub fn listen(&self, id: SocketId, backlog: i32) -> Result<(), SocketError> {
        self.ensure_registered(id)?;
        if backlog < 0 {
            return Err(SocketError::Argument(format!(
                "negative listen backlog: {}",
                backlog
            )));
        }

        with_socket(id, |socket| socket.listen(backlog))
            .map_err(|e| SocketError::transport("listen", e))?;

        self.table.set_role(id, RoleFlags::LISTENING);
        Ok(())
    }

    /// Connect a descriptor to a remote address.
    ///
    /// The address must name a host; a service name port is resolved
    /// through the services database first.
    ///
    /// # Arguments
    ///
    /// * `id` - Registered descriptor
    /// * `addr` - Remote address to connect to
    pub fn connect(&self, id: SocketId, addr: &Address) -> Result<(), SocketError> {
        self.ensure_registered(id)?;
        if addr.host.is_none() {
            return Err(SocketError::Argument("connect requires a host".to_string()));
        }
        let endpoint = resolve::socket_addr(addr)?;

        with_socket(id, |socket| socket.connect(&SockAddr::from(endpoint)))
            .map_err(|e| SocketError::transport("connect", e))?;

        self.table.set_role(id, RoleFlags::CONNECTED);
        Ok(())
    }

    /// Accept a pending connection on a listening descriptor.
    ///
    /// Blocks until a connection arrives unless the descriptor is in
    /// non-blocking mode. The new descriptor is registered with the
    /// accepted role.
    ///
    /// # Arguments
    ///
    /// * `id` - Registered listening descriptor
    ///
    /// # Returns
    ///
    /// * `Ok((SocketId, SocketAddr))` - Accepted descriptor and peer address
    /// * `Err(SocketError)` - Error accepting a connection
    pub fn accept(&self, id: SocketId) -> Result<(SocketId, SocketAddr), SocketError> {
        self.ensure_registered(id)?;

        let (socket, addr) = with_socket(id, |socket| socket.accept())
            .map_err(|e| SocketError::transport("accept", e))?;

        let peer = addr.as_socket().ok_or_else(|| {
            SocketError::transport(
                "accept",
                io::Error::new(io::ErrorKind::InvalidInput, "peer is not an internet address"),
            )
        })?;

        let slave = into_id(socket);
        self.table.set_role(slave, RoleFlags::ACCEPTED);
        Ok((slave, peer))
    }

    /// Attach a stream pair to a descriptor.
    ///
    /// An input stream is always produced; an output stream is produced
    /// unless the descriptor is listening. The registry records the
    /// attachment atomically, so a second attachment fails rather than
    /// corrupting the release bookkeeping.
    ///
    /// # Arguments
    ///
    /// * `id` - Registered descriptor
    ///
    /// # Returns
    ///
    /// * `Ok((InputStream, Option<OutputStream>))` - The attached halves
    /// * `Err(SocketError::UnknownSocket)` - Descriptor not registered
    /// * `Err(SocketError::StreamsAlreadyOpen)` - A pair is already attached
    pub fn open_streams(
        &self,
        id: SocketId,
    ) -> Result<(InputStream, Option<OutputStream>), SocketError> {
        match self.table.begin_streams(id) {
            StreamStart::Unregistered => Err(SocketError::UnknownSocket(id)),
            StreamStart::AlreadyStreaming => Err(SocketError::StreamsAlreadyOpen(id)),
            StreamStart::Started { output } => {
                let input = InputStream::new(id, Arc::clone(&self.table));
                let output = if output {
                    Some(OutputStream::new(id, Arc::clone(&self.table)))
                } else {
                    None
                };
                Ok((input, output))
            }
        }
    }

    /// Release a descriptor unconditionally, bypassing stream reference
    /// counting.
    ///
    /// The registry record is removed before the OS close is attempted, so
    /// the record is gone even if the close reports a failure.
    ///
    /// # Arguments
    ///
    /// * `id` - Registered descriptor
    pub fn close_socket(&self, id: SocketId) -> Result<(), SocketError> {
        if !self.table.release(id) {
            return Err(SocketError::UnknownSocket(id));
        }
        close_descriptor(id).map_err(|e| SocketError::transport("close", e))
    }

    /// Toggle non-blocking mode for a descriptor.
    ///
    /// In non-blocking mode, accepts and connects that would wait surface
    /// [`SocketError::WouldBlock`], and stream reads report the would-block
    /// condition through their `io::Error`.
    pub fn set_nonblocking(&self, id: SocketId, enabled: bool) -> Result<(), SocketError> {
        self.ensure_registered(id)?;
        with_socket(id, |socket| socket.set_nonblocking(enabled))
            .map_err(|e| SocketError::transport("set_nonblocking", e))
    }

    /// Toggle local address reuse for a descriptor
    pub fn set_reuse_address(&self, id: SocketId, enabled: bool) -> Result<(), SocketError> {
        self.ensure_registered(id)?;
        with_socket(id, |socket| socket.set_reuse_address(enabled))
            .map_err(|e| SocketError::transport("set_reuse_address", e))
    }

    /// Get the local address of a descriptor
    pub fn local_addr(&self, id: SocketId) -> Result<SocketAddr, SocketError> {
        self.ensure_registered(id)?;
        with_socket(id, |socket| {
            socket.local_addr().and_then(|addr| {
                addr.as_socket().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "not an internet address")
                })
            })
        })
        .map_err(|e| SocketError::transport("local_addr", e))
    }

    /// Get the peer address of a connected descriptor
    pub fn peer_addr(&self, id: SocketId) -> Result<SocketAddr, SocketError> {
        self.ensure_registered(id)?;
        with_socket(id, |socket| {
            socket.peer_addr().and_then(|addr| {
                addr.as_socket().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "not an internet address")
                })
            })
        })
        .map_err(|e| SocketError::transport("peer_addr", e))
    }

    /// Get the roles recorded for a descriptor, if it is registered
    pub fn roles(&self, id: SocketId) -> Option<RoleFlags> {
        self.table.roles(id)
    }

    /// Whether a descriptor is registered with this driver
    pub fn registered(&self, id: SocketId) -> bool {
        self.table.contains(id)
    }
}

impl Default for TcpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entities_socket_state::RawSocketHandle;
    use std::net::Ipv4Addr;

    fn loopback_listener(driver: &TcpDriver) -> (SocketId, u16) {
        let listener = driver.socket().unwrap();
        driver.bind(listener, &Address::any(0)).unwrap();
        driver.listen(listener, 8).unwrap();
        let port = driver.local_addr(listener).unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_socket_registers_descriptor() {
        let driver = TcpDriver::new();

        let id = driver.socket().unwrap();
        assert!(driver.registered(id));
        assert_eq!(driver.roles(id), Some(RoleFlags::empty()));

        driver.close_socket(id).unwrap();
        assert!(!driver.registered(id));
    }

    #[test]
    fn test_bind_and_listen_accumulate_roles() {
        let driver = TcpDriver::new();

        let id = driver.socket().unwrap();
        driver.bind(id, &Address::any(0)).unwrap();
        assert!(driver.roles(id).unwrap().contains(RoleFlags::BOUND));

        driver.listen(id, 8).unwrap();
        let roles = driver.roles(id).unwrap();
        assert!(roles.contains(RoleFlags::BOUND));
        assert!(roles.contains(RoleFlags::LISTENING));

        let local = driver.local_addr(id).unwrap();
        assert!(local.port() > 0);

        driver.close_socket(id).unwrap();
    }

    #[test]
    fn test_connect_and_accept() {
        let driver = TcpDriver::new();
        let (listener, port) = loopback_listener(&driver);

        // The listener backlog completes the handshake, so a blocking
        // connect before the accept cannot deadlock.
        let client = driver.socket().unwrap();
        driver
            .connect(client, &Address::host("127.0.0.1", port))
            .unwrap();
        assert!(driver.roles(client).unwrap().contains(RoleFlags::CONNECTED));

        let (slave, peer) = driver.accept(listener).unwrap();
        assert_eq!(peer.ip(), Ipv4Addr::LOCALHOST);
        assert!(driver.roles(slave).unwrap().contains(RoleFlags::ACCEPTED));

        let peer_of_client = driver.peer_addr(client).unwrap();
        assert_eq!(peer_of_client.port(), port);

        driver.close_socket(slave).unwrap();
        driver.close_socket(client).unwrap();
        driver.close_socket(listener).unwrap();
    }

    #[test]
    fn test_operations_on_unknown_descriptor() {
        let driver = TcpDriver::new();
        let bogus = SocketId::from_raw(RawSocketHandle::MAX);

        match driver.bind(bogus, &Address::any(0)) {
            Err(SocketError::UnknownSocket(id)) => assert_eq!(id, bogus),
            other => panic!("Expected UnknownSocket, got {:?}", other),
        }
        match driver.open_streams(bogus) {
            Err(SocketError::UnknownSocket(_)) => {}
            other => panic!("Expected UnknownSocket, got {:?}", other),
        }
        match driver.close_socket(bogus) {
            Err(SocketError::UnknownSocket(_)) => {}
            other => panic!("Expected UnknownSocket, got {:?}", other),
        }
    }

    #[test]
    fn test_close_socket_twice_reports_unknown() {
        let driver = TcpDriver::new();

        let id = driver.socket().unwrap();
        driver.close_socket(id).unwrap();
        match driver.close_socket(id) {
            Err(SocketError::UnknownSocket(_)) => {}
            other => panic!("Expected UnknownSocket, got {:?}", other),
        }
    }

    #[test]
    fn test_listen_rejects_negative_backlog() {
        let driver = TcpDriver::new();

        let id = driver.socket().unwrap();
        match driver.listen(id, -1) {
            Err(SocketError::Argument(_)) => {}
            other => panic!("Expected Argument, got {:?}", other),
        }
        // No role was recorded for the rejected call.
        assert!(!driver.roles(id).unwrap().contains(RoleFlags::LISTENING));

        driver.close_socket(id).unwrap();
    }

    #[test]
    fn test_connect_requires_host() {
        let driver = TcpDriver::new();

        let id = driver.socket().unwrap();
        match driver.connect(id, &Address::any(4242)) {
            Err(SocketError::Argument(_)) => {}
            other => panic!("Expected Argument, got {:?}", other),
        }

        driver.close_socket(id).unwrap();
    }

    #[test]
    fn test_open_streams_on_listener_is_input_only() {
        let driver = TcpDriver::new();
        let (listener, _port) = loopback_listener(&driver);

        let (input, output) = driver.open_streams(listener).unwrap();
        assert!(output.is_none());

        let roles = driver.roles(listener).unwrap();
        assert!(roles.contains(RoleFlags::INPUT_STREAM));
        assert!(!roles.contains(RoleFlags::OUTPUT_STREAM));

        // The single stream is the last reference.
        input.close().unwrap();
        assert!(!driver.registered(listener));
    }

    #[test]
    fn test_open_streams_twice_is_rejected() {
        let driver = TcpDriver::new();
        let (listener, _port) = loopback_listener(&driver);

        let (_input, _output) = driver.open_streams(listener).unwrap();
        match driver.open_streams(listener) {
            Err(SocketError::StreamsAlreadyOpen(id)) => assert_eq!(id, listener),
            other => panic!("Expected StreamsAlreadyOpen, got {:?}", other),
        }
    }

    #[test]
    fn test_nonblocking_accept_would_block() {
        let driver = TcpDriver::new();
        let (listener, _port) = loopback_listener(&driver);

        driver.set_nonblocking(listener, true).unwrap();
        match driver.accept(listener) {
            Err(SocketError::WouldBlock) => {}
            other => panic!("Expected WouldBlock, got {:?}", other),
        }

        driver.close_socket(listener).unwrap();
    }

    #[test]
    fn test_set_reuse_address() {
        let driver = TcpDriver::new();

        let id = driver.socket().unwrap();
        driver.set_reuse_address(id, true).unwrap();
        driver.set_reuse_address(id, false).unwrap();

        driver.close_socket(id).unwrap();
    }

    #[test]
    fn test_forced_close_with_open_streams() {
        let driver = TcpDriver::new();
        let (listener, _port) = loopback_listener(&driver);

        let (input, output) = driver.open_streams(listener).unwrap();
        assert!(output.is_none());

        // Forced close bypasses the stream reference counting.
        driver.close_socket(listener).unwrap();
        assert!(!driver.registered(listener));

        // The orphaned stream close is a harmless no-op.
        input.close().unwrap();
        assert!(!driver.registered(listener));
    }
}
