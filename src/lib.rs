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

//! A client for sending [GELF] messages to [Graylog] over UDP (or any other packet connection)
//!
//! [GELF]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html
//! [Graylog]: https://graylog.org
//!
//! # Introduction
//!
//! GELF, the Graylog Extended Log Format, is a JSON-oriented log message format. Over UDP, each
//! message is compressed & then, since a compressed message may well be larger than a datagram,
//! split into "chunks": each chunk travels in its own datagram, prefixed with a small header
//! naming the message it belongs to & its place in that message. The receiver reassembles chunks
//! purely by message id, so chunks of concurrently-sent messages may interleave freely.
//!
//! This crate implements the sending side of that protocol, and nothing more. It treats each
//! message as an opaque, newline-terminated blob: producing the JSON (and deciding what to log
//! in the first place) is the business of whatever sits upstream. Delivery is best-effort, as UDP
//! is: lost chunks are not resent, & a message whose sending fails part-way is simply abandoned.
//!
//! # Usage
//!
//! ```rust
//! use gelf_udp::client::{Client, Config};
//! use std::net::UdpSocket;
//!
//! // Stand-in for a Graylog GELF UDP input:
//! let graylog = UdpSocket::bind("127.0.0.1:0").unwrap();
//!
//! let client = Client::new(
//!     Config::builder()
//!         .connection(UdpSocket::bind("127.0.0.1:0").unwrap())
//!         .server_addr(graylog.local_addr().unwrap())
//!         .build(),
//! )
//! .unwrap();
//!
//! let line = b"{\"version\":\"1.1\",\"host\":\"bree\",\"short_message\":\"Hello, world!\"}\n";
//! assert_eq!(client.write(line).unwrap(), line.len() - 1);
//! ```
//!
//! Each call to [`Client::write`] must carry exactly one message, terminated by a newline. Since
//! `&Client` implements [`std::io::Write`], a client can be handed to anything that writes one line
//! per record. For instance, `tracing-subscriber`'s JSON formatter:
//!
//! ```text
//! let client = std::sync::Arc::new(Client::new(config)?);
//! tracing_subscriber::fmt().json().with_writer(client).init();
//! ```
//!
//! [`Client::write`]: crate::client::Client::write
//!
//! # Layout
//!
//! - [`client`]: the [`Client`](crate::client::Client) & its [`Config`](crate::client::Config)
//! - [`transport`]: the [`PacketConnection`](crate::transport::PacketConnection) trait the client
//!   sends through, implemented for UDP & Unix datagram sockets
//! - [`chunk`]: the chunked GELF wire format
//! - [`compression`]: gzip levels & a resettable gzip stream
//! - [`message`] & [`pool`]: the pooled, per-write scratch space
//! - [`error`]: the crate error type

pub mod chunk;
pub mod client;
pub mod compression;
pub mod error;
pub mod message;
pub mod pool;
pub mod transport;

pub use client::{Client, Config};
pub use error::{Error, Result};
