// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of gelf-udp.
//
// gelf-udp is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gelf-udp is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gelf-udp.  If not,
// see <http://www.gnu.org/licenses/>.

//! The packet connection boundary.
//!
//! This module defines the [`PacketConnection`] trait a [`Client`] sends its datagrams through,
//! along with implementations for UDP & Unix datagram sockets. The client neither opens nor
//! closes the connection; that's up to the caller, as are socket options such as write
//! timeouts.
//!
//! [`Client`]: crate::client::Client
//!
//! # Examples
//!
//! To send GELF over UDP to a Graylog input listening on port 12201 (the default) on localhost:
//!
//! ```rust
//! use gelf_udp::transport::local_udp_socket;
//! let socket = local_udp_socket().unwrap();
//! ```
//!
//! On a non-standard port on another host:
//!
//! ```rust
//! use gelf_udp::transport::udp_socket;
//! let socket = udp_socket("some-host.invalid:5514");
//! assert!(socket.is_err()); // no such host, after all
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;

use std::{
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Arc,
    time::Duration,
};

#[cfg(unix)]
use std::{os::unix::net::UnixDatagram, path::PathBuf};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       packet connections                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations a packet connection must support.
///
/// Implementations must be callable through a shared reference; a
/// [`Client`](crate::client::Client) may be sending several messages at once from different
/// threads, and whatever synchronization the underlying connection needs is its own business.
pub trait PacketConnection {
    /// Destination address type; opaque to this crate beyond being handed back to
    /// [`send_to`](PacketConnection::send_to).
    type Addr;
    /// Send one datagram to `addr`, or to the connection's peer if `addr` is `None`.
    fn send_to(&self, buf: &[u8], addr: Option<&Self::Addr>) -> Result<usize>;
    /// Bound the time a single send may block; `None` means forever.
    fn set_write_timeout(&self, _dur: Option<Duration>) -> Result<()> {
        Ok(())
    }
}

fn transport_error(err: std::io::Error) -> Error {
    Error::Transport {
        source: Box::new(err),
        back: Backtrace::new(),
    }
}

impl PacketConnection for UdpSocket {
    type Addr = SocketAddr;
    fn send_to(&self, buf: &[u8], addr: Option<&SocketAddr>) -> Result<usize> {
        let sent = match addr {
            Some(addr) => UdpSocket::send_to(self, buf, addr),
            None => self.send(buf),
        };
        sent.map_err(transport_error)
    }
    fn set_write_timeout(&self, dur: Option<Duration>) -> Result<()> {
        UdpSocket::set_write_timeout(self, dur).map_err(transport_error)
    }
}

#[cfg(unix)]
impl PacketConnection for UnixDatagram {
    type Addr = PathBuf;
    fn send_to(&self, buf: &[u8], addr: Option<&PathBuf>) -> Result<usize> {
        let sent = match addr {
            Some(path) => UnixDatagram::send_to(self, buf, path),
            None => self.send(buf),
        };
        sent.map_err(transport_error)
    }
    fn set_write_timeout(&self, dur: Option<Duration>) -> Result<()> {
        UnixDatagram::set_write_timeout(self, dur).map_err(transport_error)
    }
}

impl<T: PacketConnection + ?Sized> PacketConnection for &T {
    type Addr = T::Addr;
    fn send_to(&self, buf: &[u8], addr: Option<&Self::Addr>) -> Result<usize> {
        (**self).send_to(buf, addr)
    }
    fn set_write_timeout(&self, dur: Option<Duration>) -> Result<()> {
        (**self).set_write_timeout(dur)
    }
}

impl<T: PacketConnection + ?Sized> PacketConnection for Arc<T> {
    type Addr = T::Addr;
    fn send_to(&self, buf: &[u8], addr: Option<&Self::Addr>) -> Result<usize> {
        (**self).send_to(buf, addr)
    }
    fn set_write_timeout(&self, dur: Option<Duration>) -> Result<()> {
        (**self).set_write_timeout(dur)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     convenience constructors                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The conventional Graylog GELF UDP input port
pub const DEFAULT_GELF_PORT: u16 = 12201;

/// Bind a UDP socket to an ephemeral port & connect it to `addr`.
///
/// The returned socket is pre-connected, so a [`Client`](crate::client::Client) using it needs no
/// server address.
pub fn udp_socket<A: ToSocketAddrs>(addr: A) -> Result<UdpSocket> {
    // Prefer IPv4 when a name resolves to both families ("localhost", e.g.).
    let candidates: Vec<SocketAddr> = addr.to_socket_addrs().map_err(transport_error)?.collect();
    let peer = candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| {
            transport_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address resolved to nothing",
            ))
        })?;
    // Bind to any available port on the matching address family...
    let local: SocketAddr = if peer.is_ipv4() {
        ([0u8; 4], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(local).map_err(transport_error)?;
    // and connect to the Graylog input at `peer`:
    socket.connect(peer).map_err(transport_error)?;
    Ok(socket)
}

/// Bind a UDP socket connected to localhost:12201
pub fn local_udp_socket() -> Result<UdpSocket> {
    udp_socket(("localhost", DEFAULT_GELF_PORT))
}
