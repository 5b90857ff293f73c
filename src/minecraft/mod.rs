pub mod bedrock;
pub mod common;
pub mod java;

#[cfg(test)]
pub(crate) mod testing;

use crate::address::ResolvedEndpoint;
use crate::error::Result;
use crate::minecraft::bedrock::BedrockReply;
use crate::minecraft::common::*;
use crate::minecraft::java::JavaReply;
use std::time::Duration;

const UNKNOWN_VERSION: &str = "Unknown";
const EMPTY_MOTD: &str = "No MOTD";

/// Raw answer from whichever prober ran.
#[derive(Debug, Clone)]
pub enum ProbeReply {
    Java(JavaReply),
    Bedrock(BedrockReply),
}

/// Probes `endpoint` with the wire protocol named by `protocol`. Prober
/// failures come back untouched.
pub async fn probe(
    endpoint: &ResolvedEndpoint,
    protocol: ProtocolType,
    timeout: Duration,
) -> Result<ServerStatus> {
    let reply = match protocol {
        ProtocolType::Java => {
            ProbeReply::Java(java::ping(&endpoint.host, endpoint.port, timeout).await?)
        }
        ProtocolType::Bedrock => {
            ProbeReply::Bedrock(bedrock::ping(&endpoint.host, endpoint.port, timeout).await?)
        }
    };

    Ok(normalize(reply))
}

pub fn normalize(reply: ProbeReply) -> ServerStatus {
    match reply {
        ProbeReply::Java(java) => ServerStatus {
            protocol: ProtocolType::Java,
            version: or_placeholder(java.version, UNKNOWN_VERSION),
            protocol_version: java.protocol,
            players: PlayersInfo {
                online: java.players_online,
                max: java.players_max,
                sample: java.sample,
            },
            latency_ms: java.latency_ms,
            motd: or_placeholder(java.motd, EMPTY_MOTD),
            favicon: java.favicon,
            gamemode: None,
            map: None,
            mod_info: java.mod_info,
        },
        ProbeReply::Bedrock(bedrock) => ServerStatus {
            protocol: ProtocolType::Bedrock,
            version: or_placeholder(bedrock.version, UNKNOWN_VERSION),
            protocol_version: bedrock.protocol,
            players: PlayersInfo {
                online: bedrock.players_online,
                max: bedrock.players_max,
                sample: None,
            },
            latency_ms: bedrock.latency_ms,
            motd: or_placeholder(bedrock.motd, EMPTY_MOTD),
            favicon: None,
            gamemode: bedrock.gamemode,
            map: bedrock.map,
            mod_info: None,
        },
    }
}

fn or_placeholder(value: String, placeholder: &str) -> String {
    if value.trim().is_empty() {
        placeholder.to_string()
    } else {
        value
    }
}
