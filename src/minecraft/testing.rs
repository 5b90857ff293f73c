//! Loopback fakes of Java and Bedrock servers for tests.

use crate::minecraft::bedrock::{OFFLINE_MAGIC, UNCONNECTED_PING};
use crate::minecraft::common::{write_string, write_varint};
use crate::minecraft::java::{read_packet, send_packet};
use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};

/// Wraps `info` in an unconnected-pong frame.
pub fn bedrock_pong(info: &str) -> Vec<u8> {
    let mut frame = vec![0x1c];
    frame.extend_from_slice(&0u64.to_be_bytes());
    frame.extend_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
    frame.extend_from_slice(&OFFLINE_MAGIC);
    frame.extend_from_slice(&(info.len() as u16).to_be_bytes());
    frame.extend_from_slice(info.as_bytes());
    frame
}

/// Answers every well-formed unconnected ping with `reply`.
pub async fn spawn_bedrock(reply: Vec<u8>) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buffer = [0u8; 64];
        while let Ok((size, peer)) = socket.recv_from(&mut buffer).await {
            if buffer[..size] == UNCONNECTED_PING {
                let _ = socket.send_to(&reply, peer).await;
            }
        }
    });

    addr
}

/// A bound socket that never answers. Keep it alive for the test's duration
/// so the kernel doesn't reply with port-unreachable.
pub async fn silent_udp() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

/// Serves the status exchange with `json` and echoes ping packets.
pub async fn spawn_java(json: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let json = json.clone();
            tokio::spawn(async move {
                let _handshake = read_packet(&mut socket).await?;
                let _request = read_packet(&mut socket).await?;

                let mut response = write_varint(0x00);
                response.extend(write_string(&json));
                send_packet(&mut socket, &response).await?;

                let ping = read_packet(&mut socket).await?;
                send_packet(&mut socket, &ping).await
            });
        }
    });

    addr
}
