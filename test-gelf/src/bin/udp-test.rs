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

//! Send a few GELF messages over UDP to a receiver on the loopback interface, then reassemble &
//! print what arrived.

use gelf_udp::{
    chunk::{ChunkHeader, MessageId, MTU_SIZE},
    client::{Client, Config},
    compression::CompressionLevel,
};

use std::{collections::HashMap, io::Read, net::UdpSocket, time::Duration};

pub fn main() {
    // A stand-in for a Graylog GELF UDP input...
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    server
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();

    // and a client sending to it.
    let client = Client::new(
        Config::builder()
            .connection(UdpSocket::bind("127.0.0.1:0").unwrap())
            .server_addr(server.local_addr().unwrap())
            .compression_level(CompressionLevel::NO_COMPRESSION.as_i32())
            .build(),
    )
    .unwrap();

    let messages = [
        "{\"version\":\"1.1\",\"host\":\"localhost\",\"short_message\":\"Hello, 世界!\"}\n".to_owned(),
        format!(
            "{{\"version\":\"1.1\",\"host\":\"localhost\",\"short_message\":\"long\",\"full_message\":\"{}\"}}\n",
            "pop ".repeat(2000)
        ),
    ];
    for msg in &messages {
        let n = client.write(msg.as_bytes()).unwrap();
        println!("wrote {} bytes", n);
    }

    // Reassemble by message id.
    let mut partial: HashMap<MessageId, Vec<Option<Vec<u8>>>> = HashMap::new();
    let mut buf = [0u8; MTU_SIZE];
    while let Ok(n) = server.recv(&mut buf) {
        let (hdr, chunk) = ChunkHeader::parse(&buf[..n]).expect("not a chunked GELF datagram");
        let chunks = partial
            .entry(hdr.id)
            .or_insert_with(|| vec![None; hdr.count as usize]);
        chunks[hdr.sequence as usize] = Some(chunk.to_vec());
        if chunks.iter().all(Option::is_some) {
            let compressed: Vec<u8> = chunks.iter().flatten().flatten().copied().collect();
            let mut text = String::new();
            flate2::read::GzDecoder::new(&compressed[..])
                .read_to_string(&mut text)
                .unwrap();
            println!(
                "message {} ({} chunks): {}...",
                hdr.id,
                hdr.count,
                text.chars().take(72).collect::<String>()
            );
        }
    }
}
