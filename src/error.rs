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

//! [gelf-udp](crate) errors

use backtrace::Backtrace;

/// [gelf-udp](crate) error type
///
/// Like its sibling crates, [gelf-udp](crate) eschews libraries like [thiserror], [anyhow] &
/// [Snafu] in favor of a straightforward enumeration with a few match arms chosen on the basis of
/// what the caller will need to respond. Broadly, the variants fall into three classes:
///
/// - configuration errors, returned from [`Client::new`] (the client is not created)
/// - usage errors, returned from [`Client::write`] before any datagram has been sent
/// - transport errors, returned from [`Client::write`] after zero or more chunks of the message
///   have already gone out on the wire
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
/// [`Client::new`]: crate::client::Client::new
/// [`Client::write`]: crate::client::Client::write
#[non_exhaustive]
pub enum Error {
    /// A [`Client`](crate::client::Client) was configured without a packet connection
    NoConnection { back: Backtrace },
    /// The requested gzip compression level is out of range
    BadCompressionLevel { level: i32, back: Backtrace },
    /// Failed to obtain the per-client instance identifier from the OS random source
    NoRandomness {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// A non-empty write did not end in a newline
    MissingNewline { back: Backtrace },
    /// The compressed message would need more than the maximum number of chunks
    MessageTooLarge {
        length: usize,
        max: usize,
        back: Backtrace,
    },
    /// The compressor failed
    Compression {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl Error {
    /// True if this error was produced while constructing a client
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NoConnection { .. }
                | Error::BadCompressionLevel { .. }
                | Error::NoRandomness { .. }
        )
    }
    /// True if this error was produced by a write that never reached the network
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::MissingNewline { .. } | Error::MessageTooLarge { .. }
        )
    }
    /// True if the underlying packet connection failed; some chunks may already have been sent
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoConnection { .. } => {
                write!(f, "Cannot create a GELF client without a packet connection")
            }
            Error::BadCompressionLevel { level, .. } => {
                write!(f, "Compression level of {} is not a valid gzip level", level)
            }
            Error::NoRandomness { source, .. } => {
                write!(f, "While creating the client instance ID, got {}", source)
            }
            Error::MissingNewline { .. } => write!(f, "Missing newline terminating write"),
            Error::MessageTooLarge { length, max, .. } => write!(
                f,
                "Compressed message exceeds maximum size, {} > {}",
                length, max
            ),
            Error::Compression { source, .. } => write!(f, "Compression error: {}", source),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other gelf-udp error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoConnection { back } => write!(f, "{}\n{:?}", self, back),
            Error::BadCompressionLevel { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::NoRandomness { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::MissingNewline { back } => write!(f, "{}\n{:?}", self, back),
            Error::MessageTooLarge { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Compression { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "gelf-udp error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    #[allow(unreachable_patterns)]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoRandomness { source, .. }
            | Error::Compression { source, .. }
            | Error::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Errors surface through [`std::io::Write`] as [`std::io::Error`]s; usage errors map to
/// [`InvalidInput`](std::io::ErrorKind::InvalidInput) & transport errors keep the kind of the
/// underlying I/O failure where there is one.
impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::MissingNewline { .. } | Error::MessageTooLarge { .. } => {
                std::io::ErrorKind::InvalidInput
            }
            Error::Transport { source, .. } => source
                .downcast_ref::<std::io::Error>()
                .map(|io| io.kind())
                .unwrap_or(std::io::ErrorKind::Other),
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
