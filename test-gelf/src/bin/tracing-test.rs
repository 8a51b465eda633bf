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

//! Send tracing events, formatted as JSON, to a GELF input on port 12201 of the local host.

use gelf_udp::{
    client::{Client, Config},
    transport::local_udp_socket,
};

use tracing::{debug, error, info, trace, warn};

use std::sync::Arc;

pub fn main() {
    let client = Arc::new(
        Client::new(
            Config::builder()
                .connection(local_udp_socket().unwrap())
                .build(),
        )
        .unwrap(),
    );

    // `tracing-subscriber` writes each formatted event, newline & all, in a single call-- just
    // what the client wants.
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(client)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!(short_message = "Hello, 世界!", "structured");
    warn!("Hello, 世界!");
    error!("Hello, 世界!");
}
