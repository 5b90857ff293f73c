use crate::error::{Error, ErrorKind, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_JAVA_PORT: u16 = 25565;
pub const DEFAULT_BEDROCK_PORT: u16 = 19132;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    Java,
    Bedrock,
}

impl ProtocolType {
    pub fn default_port(self) -> u16 {
        match self {
            ProtocolType::Java => DEFAULT_JAVA_PORT,
            ProtocolType::Bedrock => DEFAULT_BEDROCK_PORT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolType::Java => "java",
            ProtocolType::Bedrock => "bedrock",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "java" => Ok(ProtocolType::Java),
            "bedrock" => Ok(ProtocolType::Bedrock),
            other => Err(Error::ConfigParse(format!(
                "unknown server type '{}', expected java or bedrock",
                other
            ))),
        }
    }
}

/// The normalized view of a server that answered its probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    #[serde(rename = "type")]
    pub protocol: ProtocolType,
    pub version: String,
    pub protocol_version: i32,
    pub players: PlayersInfo,
    pub latency_ms: u64,
    pub motd: String,
    pub favicon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamemode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayersInfo {
    pub online: i32,
    pub max: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeFailure {
    pub error_kind: ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Online(ServerStatus),
    Offline(ProbeFailure),
}

/// Result of one probe. Records are never mutated; a refresh builds a new one.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    name: String,
    address: String,
    port: u16,
    online: bool,
    #[serde(flatten)]
    outcome: Outcome,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl StatusRecord {
    pub fn online(name: String, address: String, port: u16, status: ServerStatus) -> Self {
        Self {
            name,
            address,
            port,
            online: true,
            outcome: Outcome::Online(status),
            timestamp: Utc::now(),
        }
    }

    pub fn offline(name: String, address: String, port: u16, error: &Error) -> Self {
        Self {
            name,
            address,
            port,
            online: false,
            outcome: Outcome::Offline(ProbeFailure {
                error_kind: error.kind(),
                error: error.to_string(),
            }),
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn status(&self) -> Option<&ServerStatus> {
        match &self.outcome {
            Outcome::Online(status) => Some(status),
            Outcome::Offline(_) => None,
        }
    }

    #[cfg(test)]
    pub fn failure(&self) -> Option<&ProbeFailure> {
        match &self.outcome {
            Outcome::Online(_) => None,
            Outcome::Offline(failure) => Some(failure),
        }
    }

    #[cfg(test)]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// VarInt encoding/decoding for the Java protocol
pub fn write_varint(value: i32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    let mut val = value as u32;

    loop {
        if (val & !0x7F) == 0 {
            bytes.push(val as u8);
            break;
        }
        bytes.push((val & 0x7F | 0x80) as u8);
        val >>= 7;
    }

    bytes
}

pub fn read_varint(data: &[u8], offset: &mut usize) -> Result<i32> {
    let mut value: u32 = 0;
    let mut position = 0;

    loop {
        let byte = *data
            .get(*offset)
            .ok_or_else(|| Error::ProtocolParse("VarInt exceeds data length".to_string()))?;
        *offset += 1;

        value |= ((byte & 0x7F) as u32) << position;

        if (byte & 0x80) == 0 {
            break;
        }

        position += 7;

        if position >= 35 {
            return Err(Error::ProtocolParse("VarInt is too big".to_string()));
        }
    }

    Ok(value as i32)
}

pub fn write_string(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut result = write_varint(bytes.len() as i32);
    result.extend_from_slice(bytes);
    result
}

pub fn read_string(data: &[u8], offset: &mut usize) -> Result<String> {
    let length = read_varint(data, offset)?;
    if length < 0 {
        return Err(Error::ProtocolParse(format!("negative string length {}", length)));
    }
    let length = length as usize;

    let end = offset
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| Error::ProtocolParse("string length exceeds data".to_string()))?;

    let string_bytes = &data[*offset..end];
    *offset = end;

    String::from_utf8(string_bytes.to_vec())
        .map_err(|_| Error::ProtocolParse("invalid UTF-8 in string".to_string()))
}
