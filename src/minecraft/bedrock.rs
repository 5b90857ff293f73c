use crate::error::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Unconnected ping: packet ID, zeroed time field, then the offline-message
/// magic.
pub const UNCONNECTED_PING: [u8; 25] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe,
    0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

pub const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

const UNCONNECTED_PONG_ID: u8 = 0x1c;
// id (1) + time (8) + server GUID (8) + magic (16) + string length (2)
const PONG_HEADER_LEN: usize = 35;
const MIN_FIELDS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct BedrockReply {
    pub server_id: String,
    pub motd: String,
    pub protocol: i32,
    pub version: String,
    pub players_online: i32,
    pub players_max: i32,
    pub map: Option<String>,
    pub gamemode: Option<String>,
    pub latency_ms: u64,
}

/// Sends one unconnected ping and waits for the first reply datagram.
pub async fn ping(host: &str, port: u16, timeout: Duration) -> Result<BedrockReply> {
    let deadline = Instant::now() + timeout;
    timeout_at(deadline, exchange(host, port))
        .await
        .map_err(|_| Error::ProbeTimeout(timeout))?
}

async fn exchange(host: &str, port: u16) -> Result<BedrockReply> {
    let target = lookup_host((host, port))
        .await
        .map_err(|e| Error::Connection(format!("could not resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| Error::Connection(format!("no addresses found for {}", host)))?;

    let local: SocketAddr = if target.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| Error::Connection(format!("failed to bind socket: {}", e)))?;
    socket
        .connect(target)
        .await
        .map_err(|e| Error::Connection(format!("{}: {}", target, e)))?;

    let start = Instant::now();
    socket
        .send(&UNCONNECTED_PING)
        .await
        .map_err(|e| Error::from_io("send ping", e))?;

    let mut buffer = [0u8; 2048];
    let size = socket
        .recv(&mut buffer)
        .await
        .map_err(|e| Error::from_io("receive pong", e))?;
    let latency = start.elapsed().as_millis() as u64;

    let mut reply = parse_reply(&buffer[..size])?;
    reply.latency_ms = latency;
    debug!("Bedrock pong from {} ({}) in {}ms", target, reply.server_id, latency);

    Ok(reply)
}

/// Strips the RakNet pong framing when present; otherwise the whole datagram
/// is treated as the server info string.
fn server_info(datagram: &[u8]) -> &[u8] {
    let framed = datagram.len() >= PONG_HEADER_LEN
        && datagram[0] == UNCONNECTED_PONG_ID
        && datagram[17..33] == OFFLINE_MAGIC;

    if !framed {
        return datagram;
    }

    let declared = u16::from_be_bytes([datagram[33], datagram[34]]) as usize;
    let end = (PONG_HEADER_LEN + declared).min(datagram.len());
    &datagram[PONG_HEADER_LEN..end]
}

pub fn parse_reply(datagram: &[u8]) -> Result<BedrockReply> {
    let text = String::from_utf8_lossy(server_info(datagram));
    let fields: Vec<&str> = text.split(';').collect();

    if fields.len() < MIN_FIELDS {
        return Err(Error::ProtocolParse(format!(
            "Bedrock reply has {} fields, expected at least {}",
            fields.len(),
            MIN_FIELDS
        )));
    }

    let optional = |index: usize| {
        fields
            .get(index)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let number = |index: usize| fields[index].trim().parse::<i32>().unwrap_or(0);

    Ok(BedrockReply {
        server_id: fields[0].to_string(),
        motd: fields[1].to_string(),
        protocol: number(2),
        version: fields[3].to_string(),
        players_online: number(4),
        players_max: number(5),
        map: optional(7),
        gamemode: optional(8),
        latency_ms: 0,
    })
}
