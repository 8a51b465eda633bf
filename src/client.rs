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

//! The GELF transport client.
//!
//! A [`Client`] accepts newline-terminated payloads (typically one JSON-encoded GELF message per
//! line), compresses each one, splits the result into chunks & sends each chunk as a datagram on
//! a caller-supplied [`PacketConnection`].
//!
//! # Examples
//!
//! ```rust
//! use gelf_udp::{client::{Client, Config}, compression::CompressionLevel};
//! use std::net::UdpSocket;
//!
//! let server = UdpSocket::bind("127.0.0.1:0").unwrap();
//! let client = Client::new(
//!     Config::builder()
//!         .connection(UdpSocket::bind("127.0.0.1:0").unwrap())
//!         .server_addr(server.local_addr().unwrap())
//!         .compression_level(CompressionLevel::BEST_SPEED.as_i32())
//!         .build(),
//! )
//! .unwrap();
//!
//! client
//!     .write(b"{\"version\":\"1.1\",\"host\":\"bree\",\"short_message\":\"Hello, world!\"}\n")
//!     .unwrap();
//! ```
//!
//! Since [`Client`] (and a shared reference to one) implements [`std::io::Write`], it can sit
//! underneath anything that produces one line per message, such as a JSON formatter.

use crate::{
    chunk::{InstanceId, MessageId},
    compression::CompressionLevel,
    error::{Error, Result},
    message::Message,
    pool::Pool,
    transport::PacketConnection,
};

use backtrace::Backtrace;
use parking_lot::Mutex;
use tracing::debug;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         configuration                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Used to set up a new [`Client`]
pub struct Config<C: PacketConnection> {
    /// gzip level; see [`CompressionLevel`] for the legal values
    pub compression_level: i32,
    /// Destination for every datagram; may be left unset if `connection` is pre-connected
    pub server_addr: Option<C::Addr>,
    /// Required
    pub connection: Option<C>,
}

impl<C: PacketConnection> std::default::Default for Config<C> {
    fn default() -> Self {
        Config {
            compression_level: CompressionLevel::DEFAULT.as_i32(),
            server_addr: None,
            connection: None,
        }
    }
}

impl<C: PacketConnection> Config<C> {
    pub fn builder() -> ConfigBuilder<C> {
        ConfigBuilder {
            imp: Config::default(),
        }
    }
}

pub struct ConfigBuilder<C: PacketConnection> {
    imp: Config<C>,
}

impl<C: PacketConnection> ConfigBuilder<C> {
    pub fn compression_level(mut self, level: i32) -> Self {
        self.imp.compression_level = level;
        self
    }
    pub fn server_addr(mut self, addr: C::Addr) -> Self {
        self.imp.server_addr = Some(addr);
        self
    }
    pub fn connection(mut self, conn: C) -> Self {
        self.imp.connection = Some(conn);
        self
    }
    pub fn build(self) -> Config<C> {
        self.imp
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Client                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Writes GELF over UDP, or any other [`PacketConnection`].
///
/// A [`Client`] may be shared freely between threads (it is `Sync` whenever the connection & its
/// address type are). Each write borrows its own [`Message`] from an internal pool, so the only
/// state concurrent writes contend on is the message counter.
pub struct Client<C: PacketConnection> {
    compression_level: CompressionLevel,
    instance_id: InstanceId,
    addr: Option<C::Addr>,
    conn: C,
    message_count: Mutex<u32>,
    messages: Pool<Message>,
}

impl<C: PacketConnection> Client<C> {
    /// Create a [`Client`] with the [`Config`] provided.
    ///
    /// Fails if the configuration names no connection or an invalid compression level, or if no
    /// randomness could be had for the client's instance id.
    pub fn new(config: Config<C>) -> Result<Client<C>> {
        let conn = config.connection.ok_or_else(|| Error::NoConnection {
            back: Backtrace::new(),
        })?;
        let compression_level = CompressionLevel::new(config.compression_level)?;
        let instance_id = InstanceId::generate()?;
        debug!(
            "created GELF client {:02x?} with {}",
            instance_id.0, compression_level
        );
        Ok(Client {
            compression_level,
            instance_id,
            addr: config.server_addr,
            conn,
            message_count: Mutex::new(0),
            messages: Pool::new(),
        })
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
    }
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }
    pub fn server_addr(&self) -> Option<&C::Addr> {
        self.addr.as_ref()
    }
    /// The underlying packet connection (to adjust timeouts, say)
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Send the contents of `p` as a single GELF message.
    ///
    /// `p` must end in a newline; leading & trailing whitespace (including that newline) is not
    /// sent. An empty `p` is accepted & ignored. On success, returns the number of bytes handed to
    /// the compressor, which is the length of `p` less any surrounding whitespace.
    ///
    /// Errors:
    ///
    /// - [`Error::MissingNewline`] & [`Error::MessageTooLarge`]: nothing was sent
    /// - [`Error::Transport`]: the message was abandoned part-way; some of its chunks may have
    ///   been sent, and no attempt is made to resend them
    pub fn write(&self, p: &[u8]) -> Result<usize> {
        if p.is_empty() {
            return Ok(0);
        }
        if !p.ends_with(b"\n") {
            return Err(Error::MissingNewline {
                back: Backtrace::new(),
            });
        }
        // Returned to the pool, recycled, on every path out of here.
        let mut msg = self
            .messages
            .get(|| Message::new(self.compression_level));
        let n = msg.assemble(self.message_id(), p)?;
        msg.send(&self.conn, self.addr.as_ref())?;
        Ok(n)
    }

    fn message_id(&self) -> MessageId {
        let mut count = self.message_count.lock();
        *count = count.wrapping_add(1);
        MessageId::new(self.instance_id, *count)
    }
}

impl<C: PacketConnection> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("compression_level", &self.compression_level)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

/// A shared reference to a [`Client`] is itself a writer, much as `&TcpStream` is.
///
/// A successful write reports the whole of `buf` as written; surrounding whitespace is dropped
/// deliberately, not left for the caller to retry.
impl<C: PacketConnection> std::io::Write for &Client<C> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Client::write(*self, buf)?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<C: PacketConnection> std::io::Write for Client<C> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::Write::write(&mut &*self, buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::{
        chunk::{ChunkHeader, CHUNK_HEADER_LEN, MAX_CHUNK_COUNT, MAX_CHUNK_SIZE, MTU_SIZE},
        compression::GzipStream,
        transport::test_conn::RecordingConnection,
    };

    use std::{collections::HashSet, io::Read, net::UdpSocket, time::Duration};

    fn client(conn: RecordingConnection, level: CompressionLevel) -> Client<RecordingConnection> {
        Client::new(
            Config::builder()
                .connection(conn)
                .compression_level(level.as_i32())
                .build(),
        )
        .unwrap()
    }

    fn gunzip(buf: &[u8]) -> Vec<u8> {
        let mut decoder = flate2::read::GzDecoder::new(buf);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    }

    /// Check the framing of one message's datagrams & return its reassembled, compressed payload.
    fn reassemble(datagrams: &[Vec<u8>]) -> (MessageId, Vec<u8>) {
        assert!(!datagrams.is_empty());
        let (first, _) = ChunkHeader::parse(&datagrams[0]).unwrap();
        assert_eq!(first.count as usize, datagrams.len());
        let mut payload = Vec::new();
        for (i, datagram) in datagrams.iter().enumerate() {
            assert!(datagram.len() > CHUNK_HEADER_LEN);
            assert!(datagram.len() <= MTU_SIZE);
            assert!(datagram.len() - CHUNK_HEADER_LEN <= MAX_CHUNK_SIZE);
            let (hdr, chunk) = ChunkHeader::parse(datagram).unwrap();
            assert_eq!(hdr.id, first.id);
            assert_eq!(hdr.sequence as usize, i);
            assert_eq!(hdr.count, first.count);
            payload.extend_from_slice(chunk);
        }
        (first.id, payload)
    }

    fn long_string(n: usize) -> Vec<u8> {
        format!("{{\"long string\":\"{}\"}}\n", "pop ".repeat(n)).into_bytes()
    }

    #[test]
    fn construction() {
        let config: Config<RecordingConnection> = Config::default();
        match Client::new(config) {
            Err(err) => {
                assert!(err.is_configuration());
                assert!(matches!(err, Error::NoConnection { .. }));
            }
            Ok(_) => panic!("a client needs a connection"),
        }

        for level in [-2, 10, 42, -1000] {
            let err = Client::new(Config {
                compression_level: level,
                server_addr: None,
                connection: Some(RecordingConnection::new()),
            })
            .unwrap_err();
            assert!(matches!(err, Error::BadCompressionLevel { .. }));
        }

        for level in -1..=9 {
            let c = Client::new(Config {
                compression_level: level,
                server_addr: Some("graylog:12201".to_owned()),
                connection: Some(RecordingConnection::new()),
            })
            .unwrap();
            assert_eq!(c.compression_level().as_i32(), level);
            assert_eq!(c.server_addr().map(|s| s.as_str()), Some("graylog:12201"));
        }
    }

    #[test]
    fn io_write_contract() {
        let c = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
        let p = b"some bytes to write".to_vec();
        let p2 = p.clone();
        let mut w: &Client<RecordingConnection> = &c;
        match std::io::Write::write(&mut w, &p) {
            Ok(n) => assert_eq!(n, p.len()),
            Err(err) => assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput),
        }
        assert_eq!(p, p2);
        assert!(c.connection().sent().is_empty());

        use std::io::Write;
        w.write_all(b"{\"short_message\":\"Hello, world!\"}\n").unwrap();
        w.flush().unwrap();
        let mut owned = c;
        owned.write_all(b"{\"a\":1}\n").unwrap();
        assert_eq!(owned.connection().sent().len(), 2);
    }

    #[test]
    fn requires_newline() {
        let cases: [(&str, &[u8], bool); 5] = [
            ("just a newline", b"\n", false),
            ("valid JSON without newline", b"{\"something\":3.14}", true),
            ("valid JSON with newline", b"{\"something\":3.14}\n", false),
            (
                "gibberish without newline",
                b"random gibberish and stuff..~!@#$%^&*(",
                true,
            ),
            (
                "gibberish with newline",
                b"random gibberish and stuff..~!@#$%^&*(\n",
                false,
            ),
        ];
        for (name, p, expect_err) in cases {
            let c = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
            let rsp = c.write(p);
            assert_eq!(rsp.is_err(), expect_err, "{}", name);
            if let Err(err) = rsp {
                assert!(err.is_usage(), "{}", name);
                assert!(matches!(err, Error::MissingNewline { .. }), "{}", name);
            }
            let expected = if expect_err { 0 } else { 1 };
            assert_eq!(c.connection().sent().len(), expected, "{}", name);
        }
    }

    #[test]
    fn ignores_empty_writes() {
        let c = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
        assert_eq!(c.write(&[]).unwrap(), 0);
        assert_eq!(c.write(b"").unwrap(), 0);
        assert_eq!(c.write(&Vec::new()).unwrap(), 0);
        assert!(c.connection().sent().is_empty());
    }

    #[test]
    fn single_chunk_example() {
        let c = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
        assert_eq!(c.write(b"{\"a\":1}\n").unwrap(), 7);
        let sent = c.connection().sent();
        assert_eq!(sent.len(), 1);
        let datagram = &sent[0];
        assert_eq!(&datagram[0..2], &[0x1e, 0x0f]);
        assert_eq!(&datagram[2..6], &c.instance_id().0);
        assert_eq!(&datagram[6..10], &1u32.to_le_bytes());
        assert_eq!(&datagram[10..12], &[0x00, 0x01]);
        assert_eq!(gunzip(&datagram[12..]), b"{\"a\":1}");
    }

    #[test]
    fn multiple_chunks() {
        for (name, input, level) in [
            (
                "single message",
                b"{\"short\":{\"pi\":3.14,\"phi\":1.618}}\n".to_vec(),
                CompressionLevel::DEFAULT,
            ),
            (
                "long message, compressed",
                long_string(10000),
                CompressionLevel::DEFAULT,
            ),
            (
                "long message, stored",
                long_string(10000),
                CompressionLevel::NO_COMPRESSION,
            ),
        ] {
            let c = client(RecordingConnection::new(), level);
            let n = c.write(&input).unwrap();
            assert_eq!(n, input.len() - 1, "{}", name);

            let sent = c.connection().sent();
            let (id, payload) = reassemble(&sent);
            assert_eq!(id.instance(), c.instance_id(), "{}", name);
            assert_eq!(
                sent.len(),
                payload.len().div_ceil(MAX_CHUNK_SIZE),
                "{}",
                name
            );
            assert_eq!(gunzip(&payload), &input[..input.len() - 1], "{}", name);
        }

        // 40k of stored payload can't fit in fewer than 29 chunks.
        let c = client(RecordingConnection::new(), CompressionLevel::NO_COMPRESSION);
        c.write(&long_string(10000)).unwrap();
        assert!(c.connection().sent().len() >= 29);
    }

    #[test]
    fn trims_whitespace() {
        let c = client(RecordingConnection::new(), CompressionLevel::BEST_SPEED);
        let input = b" \t{\"short_message\":\"padded\"}  \r\n";
        let trimmed = b"{\"short_message\":\"padded\"}";
        assert_eq!(c.write(input).unwrap(), trimmed.len());
        let (_, payload) = reassemble(&c.connection().sent());
        assert_eq!(gunzip(&payload), trimmed);
    }

    #[test]
    fn too_large() {
        let c = client(RecordingConnection::new(), CompressionLevel::NO_COMPRESSION);
        let err = c.write(&long_string(128 * 1400)).unwrap_err();
        assert!(err.is_usage());
        assert!(matches!(err, Error::MessageTooLarge { .. }));
        assert!(c.connection().sent().is_empty());

        // The same payload is tiny once actually compressed.
        let c = client(RecordingConnection::new(), CompressionLevel::BEST_COMPRESSION);
        c.write(&long_string(128 * 1400)).unwrap();
        assert!(c.connection().sent().len() < MAX_CHUNK_COUNT);
    }

    #[test]
    fn chunk_count_boundary() {
        // Stored-block overhead is up to the deflate backend, so search for the longest run of
        // 'x's whose uncompressed gzip member still fits in MAX_CHUNK_COUNT chunks.
        let limit = MAX_CHUNK_COUNT * MAX_CHUNK_SIZE;
        let stored_len = |n: usize| {
            let mut out = Vec::new();
            GzipStream::new(CompressionLevel::NO_COMPRESSION)
                .compress(&vec![b'x'; n], &mut out)
                .unwrap();
            out.len()
        };
        // Invariant: stored_len(lo) <= limit < stored_len(hi)
        let (mut lo, mut hi) = (0, limit);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if stored_len(mid) <= limit {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let line = |n: usize| {
            let mut p = vec![b'x'; n];
            p.push(b'\n');
            p
        };

        let c = client(RecordingConnection::new(), CompressionLevel::NO_COMPRESSION);
        assert_eq!(c.write(&line(lo)).unwrap(), lo);
        let sent = c.connection().sent();
        assert_eq!(sent.len(), MAX_CHUNK_COUNT);
        let (_, payload) = reassemble(&sent);
        assert_eq!(payload.len(), stored_len(lo));
        let (last, _) = ChunkHeader::parse(&sent[MAX_CHUNK_COUNT - 1]).unwrap();
        assert_eq!((last.sequence, last.count), (127, 128));

        let c = client(RecordingConnection::new(), CompressionLevel::NO_COMPRESSION);
        let err = c.write(&line(hi)).unwrap_err();
        match err {
            Error::MessageTooLarge { length, max, .. } => {
                assert_eq!(length, stored_len(hi));
                assert_eq!(max, limit);
            }
            _ => panic!("expected MessageTooLarge, got {}", err),
        }
        assert!(c.connection().sent().is_empty());
    }

    #[test]
    fn message_counter_wraps() {
        let c = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
        *c.message_count.lock() = u32::MAX - 1;
        c.write(b"{\"a\":1}\n").unwrap();
        c.write(b"{\"a\":2}\n").unwrap();
        let ids: Vec<MessageId> = c
            .connection()
            .sent()
            .iter()
            .map(|d| ChunkHeader::parse(d).unwrap().0.id)
            .collect();
        assert_eq!(ids[0].count(), u32::MAX);
        assert_eq!(ids[1].count(), 0);
        assert!(ids.iter().all(|id| id.instance() == c.instance_id()));
    }

    #[test]
    fn message_ids_increment() {
        let c = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
        for _ in 0..3 {
            c.write(b"{\"a\":1}\n").unwrap();
        }
        // Rejected writes don't consume ids...
        assert!(c.write(b"no newline").is_err());
        c.write(b"{\"a\":2}\n").unwrap();
        let counts: Vec<u32> = c
            .connection()
            .sent()
            .iter()
            .map(|d| ChunkHeader::parse(d).unwrap().0.id.count())
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 4]);

        // but distinct clients are (almost certainly) told apart by their instance ids.
        let other = client(RecordingConnection::new(), CompressionLevel::DEFAULT);
        other.write(b"{\"a\":1}\n").unwrap();
        let theirs = ChunkHeader::parse(&other.connection().sent()[0]).unwrap().0.id;
        assert_eq!(theirs.count(), 1);
        assert_eq!(theirs.instance(), other.instance_id());
    }

    #[test]
    fn server_address_passed_through() {
        let c = Client::new(
            Config::builder()
                .connection(RecordingConnection::new())
                .server_addr("graylog.local:12201".to_owned())
                .compression_level(CompressionLevel::NO_COMPRESSION.as_i32())
                .build(),
        )
        .unwrap();
        c.write(&long_string(1000)).unwrap();
        let addrs = c.connection().addrs();
        assert!(addrs.len() > 1);
        assert!(addrs
            .iter()
            .all(|a| a.as_deref() == Some("graylog.local:12201")));
    }

    #[test]
    fn transport_failure_abandons_message() {
        let c = client(
            RecordingConnection::failing_at(1),
            CompressionLevel::NO_COMPRESSION,
        );
        let err = c.write(&long_string(1000)).unwrap_err();
        assert!(err.is_transport());
        // The first chunk went out; nothing after the failure did.
        assert_eq!(c.connection().sent().len(), 1);
        // The assembler came back to the pool, clean.
        assert_eq!(c.messages.idle(), 1);
        assert_eq!(c.messages.get(|| unreachable!()).id(), MessageId::default());
    }

    #[test]
    fn concurrent_writers() {
        const THREADS: usize = 8;
        const WRITES: usize = 250;
        let c = client(RecordingConnection::new(), CompressionLevel::BEST_SPEED);
        std::thread::scope(|s| {
            for t in 0..THREADS {
                let c = &c;
                s.spawn(move || {
                    for i in 0..WRITES {
                        let line = format!("{{\"thread\":{},\"write\":{}}}\n", t, i);
                        c.write(line.as_bytes()).unwrap();
                    }
                });
            }
        });

        let sent = c.connection().sent();
        assert_eq!(sent.len(), THREADS * WRITES);
        let mut ids = HashSet::new();
        for datagram in &sent {
            let (hdr, chunk) = ChunkHeader::parse(datagram).unwrap();
            assert_eq!(hdr.id.instance(), c.instance_id());
            assert!(ids.insert(hdr.id), "duplicate message id {}", hdr.id);
            let text = String::from_utf8(gunzip(chunk)).unwrap();
            assert!(text.starts_with("{\"thread\":"));
        }
        assert!(c.messages.idle() <= THREADS);
    }

    #[test]
    fn udp_end_to_end() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let c = Client::new(
            Config::builder()
                .connection(UdpSocket::bind("127.0.0.1:0").unwrap())
                .server_addr(server.local_addr().unwrap())
                .compression_level(CompressionLevel::DEFAULT.as_i32())
                .build(),
        )
        .unwrap();
        let input = b"{\"version\":\"1.1\",\"host\":\"bree\",\"short_message\":\"Hello, \xe4\xb8\x96\xe7\x95\x8c!\"}\n";
        c.write(input).unwrap();

        let mut buf = [0u8; MTU_SIZE];
        let n = server.recv(&mut buf).unwrap();
        let (hdr, chunk) = ChunkHeader::parse(&buf[..n]).unwrap();
        assert_eq!((hdr.sequence, hdr.count), (0, 1));
        assert_eq!(gunzip(chunk), &input[..input.len() - 1]);
    }
}
