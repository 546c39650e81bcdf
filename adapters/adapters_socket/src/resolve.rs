//! Name Resolution
//!
//! Platform resolver access for the socket subsystem: forward and reverse
//! host lookups, service name lookups, the local host name, and the
//! translation of a logical [`Address`] into a concrete IPv4 endpoint.
//!
//! Lookup failures carry the resolver's own error codes rather than errno,
//! so callers can always tell a failed lookup from a failed transport call.
//! On targets without the platform resolver the lookups degrade to numeric
//! parsing only.

use std::net::{Ipv4Addr, SocketAddrV4};

use entities_socket_state::{Address, Ip4, PortSpec};

use crate::error::{ResolveError, SocketError};

#[cfg(unix)]
use std::ffi::{CStr, CString};

/// Build the resolver error for a lookup failure code
#[cfg(unix)]
fn lookup_error(code: i32) -> ResolveError {
    let message = unsafe {
        let msg = libc::gai_strerror(code);
        if msg.is_null() {
            format!("Unknown error {}", code)
        } else {
            CStr::from_ptr(msg).to_string_lossy().to_string()
        }
    };
    ResolveError::Lookup { code, message }
}

/// Resolve a host name to its IPv4 address.
///
/// Numeric dotted quads are accepted as well as names. Only IPv4 results
/// are requested from the resolver; a name with no IPv4 address fails with
/// a resolution error.
#[cfg(unix)]
pub fn host_to_address(host: &str) -> Result<Ip4, SocketError> {
    let host_cstr = CString::new(host)
        .map_err(|_| SocketError::Argument("host name contains NUL byte".to_string()))?;

    unsafe {
        let mut hints: libc::addrinfo = std::mem::zeroed();
        hints.ai_family = libc::AF_INET;
        hints.ai_socktype = libc::SOCK_STREAM;

        let mut res: *mut libc::addrinfo = std::ptr::null_mut();
        let err = libc::getaddrinfo(
            host_cstr.as_ptr(),
            std::ptr::null(),
            &hints as *const libc::addrinfo,
            &mut res as *mut *mut libc::addrinfo,
        );
        if err != 0 {
            return Err(SocketError::Resolve(lookup_error(err)));
        }

        let mut found = None;
        let mut cur = res;
        while !cur.is_null() {
            let ai = &*cur;
            if ai.ai_family == libc::AF_INET && !ai.ai_addr.is_null() {
                let addr = &*(ai.ai_addr as *const libc::sockaddr_in);
                // s_addr is already in network order; keep the byte layout.
                found = Some(Ip4::new(addr.sin_addr.s_addr.to_ne_bytes()));
                break;
            }
            cur = ai.ai_next;
        }
        libc::freeaddrinfo(res);

        found.ok_or_else(|| SocketError::Resolve(lookup_error(libc::EAI_NONAME)))
    }
}

#[cfg(not(unix))]
pub fn host_to_address(host: &str) -> Result<Ip4, SocketError> {
    match host.parse::<Ipv4Addr>() {
        Ok(ip) => Ok(Ip4::from(ip)),
        Err(_) => Err(SocketError::Resolve(ResolveError::Lookup {
            code: 0,
            message: format!("resolver unavailable for host {}", host),
        })),
    }
}

/// Resolve an IPv4 address back to a host name.
///
/// Requires a name to exist for the address; an address with no reverse
/// record fails with a resolution error instead of echoing the numeric
/// form back.
#[cfg(unix)]
pub fn address_to_host(addr: Ip4) -> Result<String, SocketError> {
    unsafe {
        let mut sin: libc::sockaddr_in = std::mem::zeroed();
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_port = 0;
        sin.sin_addr.s_addr = u32::from_ne_bytes(addr.octets());

        let mut host_buf = vec![0u8; libc::NI_MAXHOST as usize + 1];
        let ret = libc::getnameinfo(
            &sin as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            host_buf.as_mut_ptr() as *mut libc::c_char,
            host_buf.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        );
        if ret != 0 {
            return Err(SocketError::Resolve(lookup_error(ret)));
        }

        let host = CStr::from_ptr(host_buf.as_ptr() as *const libc::c_char).to_string_lossy();
        Ok(host.to_string())
    }
}

#[cfg(not(unix))]
pub fn address_to_host(addr: Ip4) -> Result<String, SocketError> {
    Err(SocketError::Resolve(ResolveError::Lookup {
        code: 0,
        message: format!("resolver unavailable for address {}", addr),
    }))
}

/// Get the local host name
#[cfg(unix)]
pub fn hostname() -> Result<String, SocketError> {
    let mut buf = vec![0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return Err(SocketError::transport(
            "gethostname",
            std::io::Error::last_os_error(),
        ));
    }
    if let Some(pos) = buf.iter().position(|b| *b == 0) {
        buf.truncate(pos);
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

#[cfg(not(unix))]
pub fn hostname() -> Result<String, SocketError> {
    Err(SocketError::Resolve(ResolveError::Lookup {
        code: 0,
        message: "resolver unavailable for host name".to_string(),
    }))
}

/// Look up a TCP service name in the services database
#[cfg(unix)]
pub fn service_port(name: &str) -> Result<u16, SocketError> {
    let name_cstr = CString::new(name)
        .map_err(|_| SocketError::Argument("service name contains NUL byte".to_string()))?;

    let serv = unsafe {
        libc::getservbyname(
            name_cstr.as_ptr(),
            b"tcp\0".as_ptr() as *const libc::c_char,
        )
    };
    if serv.is_null() {
        return Err(SocketError::Resolve(ResolveError::UnknownService(
            name.to_string(),
        )));
    }

    let port = unsafe { (*serv).s_port };
    Ok(libc::ntohs(port as u16))
}

#[cfg(not(unix))]
pub fn service_port(name: &str) -> Result<u16, SocketError> {
    Err(SocketError::Resolve(ResolveError::UnknownService(
        name.to_string(),
    )))
}

/// Translate a logical address into a concrete IPv4 endpoint.
///
/// An absent host selects the wildcard interface. Numeric hosts bypass the
/// resolver entirely; service-name ports go through the services database.
pub fn socket_addr(addr: &Address) -> Result<SocketAddrV4, SocketError> {
    let port = match &addr.port {
        PortSpec::Number(port) => *port,
        PortSpec::Service(name) => service_port(name)?,
    };

    let ip = match &addr.host {
        Some(host) => match host.parse::<Ipv4Addr>() {
            Ok(ip) => ip,
            Err(_) => Ipv4Addr::from(host_to_address(host)?),
        },
        None => Ipv4Addr::UNSPECIFIED,
    };

    Ok(SocketAddrV4::new(ip, port))
}
