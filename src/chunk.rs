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

//! Chunked GELF wire format.
//!
//! GELF messages sent over UDP are compressed and then split into chunks, each transmitted as an
//! independent datagram prefixed with a twelve byte header:
//!
//! ```text
//!  0      2                      10    11    12
//! +------+-----------------------+-----+-----+-------------------------+
//! | 1e0f |      message id       | seq | cnt |  up to 1420 bytes of    |
//! |      |       (8 bytes)       |     |     |  compressed payload     |
//! +------+-----------------------+-----+-----+-------------------------+
//! ```
//!
//! The receiver reassembles chunks purely by message id, so the id must be unique per message
//! for (at least) the lifetime of the sending client. Here it is formed from a four-byte random
//! [`InstanceId`], fixed for a client, followed by a four-byte little-endian counter.

use crate::error::{Error, Result};

use backtrace::Backtrace;
use bytes::BufMut;
use rand::{rngs::OsRng, RngCore};

/// Assumed path MTU; no datagram exceeds this
pub const MTU_SIZE: usize = 1500;
/// Maximum number of payload bytes per chunk (leaves room for IP, UDP & chunk headers)
pub const MAX_CHUNK_SIZE: usize = 1420;
/// Maximum number of chunks a single message may be split into
pub const MAX_CHUNK_COUNT: usize = 128;
pub const CHUNK_HEADER_LEN: usize = 12;
/// The two "magic" bytes identifying a chunked GELF datagram
pub const GELF_MAGIC: [u8; 2] = [0x1e, 0x0f];

/// The number of chunks needed to carry `len` bytes of compressed payload.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(MAX_CHUNK_SIZE)
}

/// The random, per-client half of every [`MessageId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(pub [u8; 4]);

impl InstanceId {
    /// Draw a new instance id from the operating system's CSPRNG.
    pub fn generate() -> Result<InstanceId> {
        let mut id = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut id)
            .map_err(|err| Error::NoRandomness {
                source: Box::new(err),
                back: Backtrace::new(),
            })?;
        Ok(InstanceId(id))
    }
}

/// Eight bytes identifying one message: an [`InstanceId`] followed by a little-endian counter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MessageId(pub [u8; 8]);

impl MessageId {
    pub fn new(instance: InstanceId, count: u32) -> MessageId {
        let mut id = [0u8; 8];
        id[0..4].copy_from_slice(&instance.0);
        id[4..8].copy_from_slice(&count.to_le_bytes());
        MessageId(id)
    }
    pub fn instance(&self) -> InstanceId {
        InstanceId([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
    pub fn count(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// The header prepended to each chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: MessageId,
    /// Zero-based index of this chunk
    pub sequence: u8,
    /// Total number of chunks in the message
    pub count: u8,
}

impl ChunkHeader {
    /// Append the twelve header bytes to `buf`.
    pub fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&GELF_MAGIC);
        buf.put_slice(&self.id.0);
        buf.put_u8(self.sequence);
        buf.put_u8(self.count);
    }

    /// Decode the header of a chunked GELF datagram, returning it along with the chunk's payload.
    ///
    /// Returns `None` if `datagram` is too short or doesn't begin with [`GELF_MAGIC`].
    pub fn parse(datagram: &[u8]) -> Option<(ChunkHeader, &[u8])> {
        if datagram.len() < CHUNK_HEADER_LEN || datagram[0..2] != GELF_MAGIC {
            return None;
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&datagram[2..10]);
        Some((
            ChunkHeader {
                id: MessageId(id),
                sequence: datagram[10],
                count: datagram[11],
            },
            &datagram[CHUNK_HEADER_LEN..],
        ))
    }
}
