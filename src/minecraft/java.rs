use crate::error::{Error, Result};
use crate::minecraft::common::*;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

/// Largest frame accepted from a server. Status payloads of heavily modded
/// servers can run well past 64 KiB once the favicon and mod list are in.
const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

/// How long to wait for the pong after the status response has arrived.
const PONG_GRACE: Duration = Duration::from_millis(500);

const HANDSHAKE_PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const STATUS_PACKET_ID: i32 = 0x00;
const PING_PACKET_ID: i32 = 0x01;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    version: StatusVersion,
    #[serde(default)]
    players: StatusPlayers,
    description: Option<Description>,
    favicon: Option<String>,
    modinfo: Option<serde_json::Value>,
    #[serde(rename = "forgeData")]
    forge_data: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusVersion {
    #[serde(default)]
    name: String,
    #[serde(default)]
    protocol: i32,
}

#[derive(Debug, Default, Deserialize)]
struct StatusPlayers {
    #[serde(default)]
    max: i32,
    #[serde(default)]
    online: i32,
    sample: Option<Vec<PlayerSample>>,
}

#[derive(Debug, Deserialize)]
struct PlayerSample {
    name: String,
}

/// MOTD as sent by the server: a bare string, a chat component, or a list of
/// components.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Description {
    Plain(String),
    Component(TextComponent),
    List(Vec<Description>),
}

#[derive(Debug, Deserialize)]
struct TextComponent {
    text: Option<String>,
    translate: Option<String>,
    #[serde(default)]
    extra: Vec<Description>,
}

impl Description {
    fn flatten_into(&self, out: &mut String) {
        match self {
            Description::Plain(s) => out.push_str(s),
            Description::Component(component) => {
                match (&component.text, &component.translate) {
                    (Some(text), _) if !text.is_empty() => out.push_str(text),
                    (_, Some(key)) => out.push_str(key),
                    (Some(text), None) => out.push_str(text),
                    (None, None) => {}
                }
                for part in &component.extra {
                    part.flatten_into(out);
                }
            }
            Description::List(parts) => {
                for part in parts {
                    part.flatten_into(out);
                }
            }
        }
    }

    fn to_plain(&self) -> String {
        let mut out = String::new();
        self.flatten_into(&mut out);
        out
    }
}

/// What a Java server reported, before normalization.
#[derive(Debug, Clone)]
pub struct JavaReply {
    pub version: String,
    pub protocol: i32,
    pub players_online: i32,
    pub players_max: i32,
    pub sample: Option<Vec<String>>,
    pub motd: String,
    pub favicon: Option<String>,
    pub mod_info: Option<serde_json::Value>,
    pub latency_ms: u64,
}

/// Runs the handshake, status request and ping exchange against `host:port`.
/// Every step shares one deadline; when it fires the connection is dropped.
pub async fn ping(host: &str, port: u16, timeout: Duration) -> Result<JavaReply> {
    let deadline = Instant::now() + timeout;

    let mut stream = timeout_at(deadline, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::ProbeTimeout(timeout))?
        .map_err(|e| Error::Connection(format!("{}:{}: {}", host, port, e)))?;

    let (payload, status_latency) = timeout_at(deadline, request_status(&mut stream, host, port))
        .await
        .map_err(|_| Error::ProbeTimeout(timeout))??;

    let mut reply = parse_status(&payload)?;

    // The server-measured round trip wins when the server answers the ping.
    let pong_deadline = deadline.min(Instant::now() + PONG_GRACE);
    reply.latency_ms = match timeout_at(pong_deadline, ping_pong(&mut stream)).await {
        Ok(Ok(rtt)) => rtt,
        _ => status_latency,
    };

    Ok(reply)
}

async fn request_status(stream: &mut TcpStream, host: &str, port: u16) -> Result<(Vec<u8>, u64)> {
    let mut handshake = write_varint(0x00);
    handshake.extend(write_varint(HANDSHAKE_PROTOCOL_VERSION));
    handshake.extend(write_string(host));
    handshake.extend_from_slice(&port.to_be_bytes());
    handshake.extend(write_varint(NEXT_STATE_STATUS));

    send_packet(stream, &handshake).await?;

    let start = Instant::now();
    send_packet(stream, &write_varint(STATUS_PACKET_ID)).await?;
    let response = read_packet(stream).await?;
    let latency = start.elapsed().as_millis() as u64;

    Ok((response, latency))
}

async fn ping_pong(stream: &mut TcpStream) -> Result<u64> {
    let token = chrono::Utc::now().timestamp_millis();
    let mut packet = write_varint(PING_PACKET_ID);
    packet.extend_from_slice(&token.to_be_bytes());

    let start = Instant::now();
    send_packet(stream, &packet).await?;
    let response = read_packet(stream).await?;
    let rtt = start.elapsed().as_millis() as u64;

    let mut offset = 0;
    let packet_id = read_varint(&response, &mut offset)?;
    let echoed = response
        .get(offset..offset + 8)
        .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
        .map(i64::from_be_bytes);

    if packet_id != PING_PACKET_ID || echoed != Some(token) {
        return Err(Error::ProtocolParse("pong does not echo the ping payload".to_string()));
    }

    Ok(rtt)
}

fn parse_status(data: &[u8]) -> Result<JavaReply> {
    let mut offset = 0;
    let packet_id = read_varint(data, &mut offset)?;

    if packet_id != STATUS_PACKET_ID {
        return Err(Error::ProtocolParse(format!(
            "unexpected packet ID: 0x{:02x}",
            packet_id
        )));
    }

    let json_str = read_string(data, &mut offset)?;
    let status: StatusResponse = serde_json::from_str(&json_str)
        .map_err(|e| Error::ProtocolParse(format!("status JSON: {}", e)))?;

    let sample = status
        .players
        .sample
        .map(|sample| sample.into_iter().map(|p| p.name).collect());

    Ok(JavaReply {
        version: status.version.name,
        protocol: status.version.protocol,
        players_online: status.players.online,
        players_max: status.players.max,
        sample,
        motd: status
            .description
            .as_ref()
            .map(Description::to_plain)
            .unwrap_or_default(),
        favicon: status.favicon,
        mod_info: status.modinfo.or(status.forge_data),
        latency_ms: 0,
    })
}

pub(crate) async fn send_packet<S: AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) -> Result<()> {
    let mut frame = write_varint(data.len() as i32);
    frame.extend_from_slice(data);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| Error::from_io("send", e))?;
    stream.flush().await.map_err(|e| Error::from_io("send", e))?;
    Ok(())
}

pub(crate) async fn read_packet<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let mut length_bytes = Vec::with_capacity(5);

    loop {
        let byte = stream
            .read_u8()
            .await
            .map_err(|e| Error::from_io("read length", e))?;
        length_bytes.push(byte);

        if (byte & 0x80) == 0 {
            break;
        }
        if length_bytes.len() == 5 {
            return Err(Error::ProtocolParse("packet length VarInt is too big".to_string()));
        }
    }

    let mut offset = 0;
    let length = read_varint(&length_bytes, &mut offset)?;

    if length <= 0 || length as usize > MAX_PACKET_LEN {
        return Err(Error::ProtocolParse(format!("bad packet length: {}", length)));
    }

    let mut data = vec![0u8; length as usize];
    stream
        .read_exact(&mut data)
        .await
        .map_err(|e| Error::from_io("read packet", e))?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::minecraft::testing;
    use serde_json::json;
    use tokio::net::TcpListener;

    fn status_frame(json: &str) -> Vec<u8> {
        let mut data = write_varint(0x00);
        data.extend(write_string(json));
        data
    }

    #[test]
    fn parses_full_status_payload() {
        let body = json!({
            "version": { "name": "Paper 1.21.1", "protocol": 767 },
            "players": {
                "max": 100,
                "online": 2,
                "sample": [
                    { "name": "alex", "id": "4566e69f-c907-48ee-8d71-d7ba5aa00d20" },
                    { "name": "steve", "id": "8667ba71-b85a-4004-af54-457a9734eed7" }
                ]
            },
            "description": { "text": "Hello ", "extra": [{ "text": "world" }] },
            "favicon": "data:image/png;base64,AAAA"
        });

        let reply = parse_status(&status_frame(&body.to_string())).unwrap();
        assert_eq!(reply.version, "Paper 1.21.1");
        assert_eq!(reply.protocol, 767);
        assert_eq!(reply.players_online, 2);
        assert_eq!(reply.players_max, 100);
        assert_eq!(reply.sample, Some(vec!["alex".to_string(), "steve".to_string()]));
        assert_eq!(reply.motd, "Hello world");
        assert_eq!(reply.favicon.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn plain_string_description() {
        let body = json!({ "version": { "name": "1.8", "protocol": 47 }, "description": "A server" });
        let reply = parse_status(&status_frame(&body.to_string())).unwrap();
        assert_eq!(reply.motd, "A server");
        assert_eq!(reply.players_max, 0);
    }

    #[test]
    fn translate_description_is_unwrapped() {
        let body = json!({ "description": { "translate": "multiplayer.status.motd" } });
        let reply = parse_status(&status_frame(&body.to_string())).unwrap();
        assert_eq!(reply.motd, "multiplayer.status.motd");
    }

    #[test]
    fn forge_mod_info_is_passed_through() {
        let body = json!({ "modinfo": { "type": "FML", "modList": [] } });
        let reply = parse_status(&status_frame(&body.to_string())).unwrap();
        assert_eq!(reply.mod_info, Some(json!({ "type": "FML", "modList": [] })));
    }

    #[test]
    fn wrong_packet_id_is_rejected() {
        let mut data = write_varint(0x05);
        data.extend(write_string("{}"));
        let err = parse_status(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolParse);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = parse_status(&status_frame("not json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolParse);
    }

    #[tokio::test]
    async fn pings_a_live_server() {
        let body = json!({
            "version": { "name": "1.20.4", "protocol": 765 },
            "players": { "max": 20, "online": 5 },
            "description": { "text": "lobby" }
        });
        let addr = testing::spawn_java(body.to_string()).await;

        let reply = ping("127.0.0.1", addr.port(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply.version, "1.20.4");
        assert_eq!(reply.players_online, 5);
        assert_eq!(reply.motd, "lobby");
        assert!(reply.latency_ms < 2000);
    }

    #[tokio::test]
    async fn ignored_ping_falls_back_to_status_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_packet(&mut socket).await.unwrap();
            read_packet(&mut socket).await.unwrap();

            let body = json!({ "description": { "text": "", "translate": "k" } });
            let mut response = write_varint(0x00);
            response.extend(write_string(&body.to_string()));
            send_packet(&mut socket, &response).await.unwrap();

            let _ping = read_packet(&mut socket).await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let started = std::time::Instant::now();
        let reply = ping("127.0.0.1", port, Duration::from_secs(3)).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(reply.motd, "k");
        assert!(reply.latency_ms < PONG_GRACE.as_millis() as u64);
        assert!(elapsed >= PONG_GRACE);
        assert!(elapsed < PONG_GRACE + Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn closed_connection_before_reply_is_a_parse_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_packet(&mut socket).await;
            drop(socket);
        });

        let err = ping("127.0.0.1", port, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ProtocolParse | ErrorKind::Connection));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = ping("127.0.0.1", port, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let started = std::time::Instant::now();
        let err = ping("127.0.0.1", port, Duration::from_millis(300)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProbeTimeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
