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

//! The per-write message assembler.
//!
//! A [`Message`] holds everything one write needs as scratch space: the gzip stream, the buffer
//! it compresses into, and the buffer each datagram is framed in. Messages are pooled by the
//! [`Client`](crate::client::Client) & [recycled](crate::pool::Recycle) between writes, so under
//! steady load no write allocates.

use crate::{
    chunk::{chunk_count, ChunkHeader, MessageId, MAX_CHUNK_COUNT, MAX_CHUNK_SIZE, MTU_SIZE},
    compression::{CompressionLevel, GzipStream},
    error::{Error, Result},
    pool::Recycle,
    transport::PacketConnection,
};

use backtrace::Backtrace;
use bytes::BufMut;

// The first (or last) character of `p` & its encoded length, or `None` if `p` is empty or
// starts (ends) with bytes that aren't valid UTF-8.
fn first_char(p: &[u8]) -> Option<(char, usize)> {
    (1..=p.len().min(4))
        .find_map(|k| std::str::from_utf8(&p[..k]).ok())
        .and_then(|s| s.chars().next().map(|c| (c, s.len())))
}

fn last_char(p: &[u8]) -> Option<(char, usize)> {
    (1..=p.len().min(4))
        .find_map(|k| std::str::from_utf8(&p[p.len() - k..]).ok())
        .and_then(|s| s.chars().next_back().map(|c| (c, s.len())))
}

/// Strip leading & trailing Unicode whitespace from `payload`.
///
/// Characters are decoded from each end independently, so invalid UTF-8 in the interior (or
/// at the far end) doesn't stop whitespace from being trimmed; an invalid byte at the edge
/// being trimmed does.
fn trim_space(mut payload: &[u8]) -> &[u8] {
    while let Some((c, n)) = first_char(payload) {
        if !c.is_whitespace() {
            break;
        }
        payload = &payload[n..];
    }
    while let Some((c, n)) = last_char(payload) {
        if !c.is_whitespace() {
            break;
        }
        payload = &payload[..payload.len() - n];
    }
    payload
}

pub struct Message {
    buf: Vec<u8>,
    zip: GzipStream,
    id: MessageId,
    packet: Vec<u8>,
}

impl Message {
    pub fn new(level: CompressionLevel) -> Message {
        Message {
            buf: Vec::new(),
            zip: GzipStream::new(level),
            id: MessageId::default(),
            packet: Vec::with_capacity(MTU_SIZE),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn chunk_count(&self) -> usize {
        chunk_count(self.buf.len())
    }

    /// Compress `payload`, minus surrounding whitespace, as message `id`.
    ///
    /// On success, returns the number of payload bytes the compressor consumed. Fails with
    /// [`Error::MessageTooLarge`] if the compressed form would need more than [`MAX_CHUNK_COUNT`]
    /// chunks.
    pub fn assemble(&mut self, id: MessageId, payload: &[u8]) -> Result<usize> {
        self.id = id;
        let n = self.zip.compress(trim_space(payload), &mut self.buf)?;
        if self.chunk_count() > MAX_CHUNK_COUNT {
            return Err(Error::MessageTooLarge {
                length: self.buf.len(),
                max: MAX_CHUNK_COUNT * MAX_CHUNK_SIZE,
                back: Backtrace::new(),
            });
        }
        Ok(n)
    }

    /// Frame the assembled message & send each chunk as its own datagram on `conn`.
    ///
    /// Chunks go out in sequence order; the first failure abandons the rest of the message.
    /// Chunks already sent stay sent.
    pub fn send<C: PacketConnection + ?Sized>(
        &mut self,
        conn: &C,
        addr: Option<&C::Addr>,
    ) -> Result<()> {
        let count = self.chunk_count();
        // `assemble` has already enforced this, but the header can only carry a byte.
        debug_assert!(count <= MAX_CHUNK_COUNT);
        for (sequence, chunk) in self.buf.chunks(MAX_CHUNK_SIZE).enumerate() {
            self.packet.clear();
            ChunkHeader {
                id: self.id,
                sequence: sequence as u8,
                count: count as u8,
            }
            .put(&mut self.packet);
            self.packet.put_slice(chunk);
            conn.send_to(&self.packet, addr)?;
        }
        Ok(())
    }
}

impl Recycle for Message {
    fn recycle(&mut self) {
        self.buf.clear();
        self.zip.reset();
        self.id = MessageId::default();
        self.packet.clear();
    }
}
