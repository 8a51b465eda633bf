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

//! gzip compression for GELF payloads.
//!
//! Graylog accepts zlib or gzip compressed GELF; this crate always speaks gzip. Two things live
//! here:
//!
//! - [`CompressionLevel`]: the caller-configurable level, validated against the usual gzip range
//!   (zero through nine) plus a "default" sentinel of -1
//! - [`GzipStream`]: a gzip encoder that can be reset & reused for message after message, so that
//!   pooled message assemblers don't re-allocate deflate state on every write

use crate::error::{Error, Result};

use backtrace::Backtrace;
use bytes::BufMut;
use flate2::{Compress, Crc, FlushCompress, Status};

type StdResult<T, E> = std::result::Result<T, E>;

/// A validated gzip compression level.
///
/// Legal values are [`NO_COMPRESSION`](CompressionLevel::NO_COMPRESSION),
/// [`DEFAULT`](CompressionLevel::DEFAULT), and anything from
/// [`BEST_SPEED`](CompressionLevel::BEST_SPEED) to
/// [`BEST_COMPRESSION`](CompressionLevel::BEST_COMPRESSION) inclusive.
///
/// ```rust
/// use gelf_udp::compression::CompressionLevel;
/// assert!(CompressionLevel::try_from(5).is_ok());
/// assert!(CompressionLevel::try_from(-2).is_err());
/// assert!(CompressionLevel::try_from(10).is_err());
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    /// Store the payload without compressing it (the stream is still framed as gzip)
    pub const NO_COMPRESSION: CompressionLevel = CompressionLevel(0);
    pub const BEST_SPEED: CompressionLevel = CompressionLevel(1);
    pub const BEST_COMPRESSION: CompressionLevel = CompressionLevel(9);
    /// Let the compressor choose (level six, in practice)
    pub const DEFAULT: CompressionLevel = CompressionLevel(-1);

    pub fn new(level: i32) -> Result<CompressionLevel> {
        if level == Self::NO_COMPRESSION.0
            || level == Self::DEFAULT.0
            || (Self::BEST_SPEED.0..=Self::BEST_COMPRESSION.0).contains(&level)
        {
            Ok(CompressionLevel(level))
        } else {
            Err(Error::BadCompressionLevel {
                level,
                back: Backtrace::new(),
            })
        }
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    fn to_flate2(self) -> flate2::Compression {
        if self == Self::DEFAULT {
            flate2::Compression::default()
        } else {
            flate2::Compression::new(self.0 as u32)
        }
    }

    // The gzip "extra flags" byte: 2 advertises maximum compression, 4 the fastest algorithm.
    fn xfl(self) -> u8 {
        if self == Self::BEST_COMPRESSION {
            2
        } else if self == Self::BEST_SPEED {
            4
        } else {
            0
        }
    }
}

impl std::default::Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::DEFAULT
    }
}

impl std::convert::TryFrom<i32> for CompressionLevel {
    type Error = Error;
    fn try_from(x: i32) -> StdResult<Self, Self::Error> {
        CompressionLevel::new(x)
    }
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        match *self {
            CompressionLevel::NO_COMPRESSION => write!(f, "no compression"),
            CompressionLevel::BEST_SPEED => write!(f, "best speed"),
            CompressionLevel::BEST_COMPRESSION => write!(f, "best compression"),
            CompressionLevel::DEFAULT => write!(f, "default compression"),
            CompressionLevel(n) => write!(f, "compression level {}", n),
        }
    }
}

const GZIP_ID: [u8; 2] = [0x1f, 0x8b];
const GZIP_CM_DEFLATE: u8 = 8;
const GZIP_OS_UNKNOWN: u8 = 255;
// Grow the output by at least this much whenever the compressor runs low on room.
const OUTPUT_RESERVE: usize = 1024;

/// A resettable gzip encoder.
///
/// [`flate2`]'s own `GzEncoder` owns its writer & can't be rewound, so this type drives a raw
/// deflate [`Compress`] directly, framing its output with the RFC [1952] header & trailer itself.
/// Each call to [`compress`](GzipStream::compress) produces one complete gzip member; call
/// [`reset`](GzipStream::reset) before the next one.
///
/// [`flate2`]: https://docs.rs/flate2
/// [1952]: https://datatracker.ietf.org/doc/html/rfc1952
pub struct GzipStream {
    level: CompressionLevel,
    deflate: Compress,
    crc: Crc,
}

impl GzipStream {
    pub fn new(level: CompressionLevel) -> GzipStream {
        GzipStream {
            level,
            deflate: Compress::new(level.to_flate2(), false),
            crc: Crc::new(),
        }
    }

    /// Compress all of `input`, appending a complete gzip member to `out`.
    ///
    /// Returns the number of bytes of `input` consumed, which on success is always
    /// `input.len()`.
    pub fn compress(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        out.reserve(10 + input.len() / 2 + OUTPUT_RESERVE);
        out.put_slice(&GZIP_ID);
        out.put_u8(GZIP_CM_DEFLATE);
        out.put_u8(0); // FLG: no name, comment, extra field or header CRC
        out.put_u32_le(0); // MTIME: not available
        out.put_u8(self.level.xfl());
        out.put_u8(GZIP_OS_UNKNOWN);

        let start = self.deflate.total_in();
        loop {
            if out.capacity() - out.len() < OUTPUT_RESERVE {
                out.reserve(OUTPUT_RESERVE);
            }
            let consumed = (self.deflate.total_in() - start) as usize;
            let status = self
                .deflate
                .compress_vec(&input[consumed..], out, FlushCompress::Finish)
                .map_err(|err| Error::Compression {
                    source: Box::new(err),
                    back: Backtrace::new(),
                })?;
            if status == Status::StreamEnd {
                break;
            }
        }
        let consumed = (self.deflate.total_in() - start) as usize;

        self.crc.update(&input[..consumed]);
        out.put_u32_le(self.crc.sum());
        out.put_u32_le(self.crc.amount());

        Ok(consumed)
    }

    /// Discard all compressor & checksum state, readying the stream for a new member.
    pub fn reset(&mut self) {
        self.deflate.reset();
        self.crc.reset();
    }
}
