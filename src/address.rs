//! Target descriptors: parsing roster entries and ad-hoc `host:port[:type]`
//! strings, and following SRV records to a concrete endpoint.

use crate::error::{Error, Result};
use crate::minecraft::common::ProtocolType;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Where and how to probe one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub address: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub protocol: ProtocolType,
    #[serde(rename = "isSrv")]
    pub use_srv: bool,
}

/// The concrete host and port a probe connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub host: String,
    pub port: u16,
}

impl EndpointDescriptor {
    /// Parses a roster value of the form `address[:port[:type[:isSrv]]]`.
    /// A missing port falls back to the edition's default.
    pub fn parse_named(config: &str) -> Result<Self> {
        let parts: Vec<&str> = config.trim().split(':').map(str::trim).collect();

        let address = parts[0];
        if address.is_empty() {
            return Err(Error::ConfigParse(format!("missing address in '{}'", config)));
        }

        let protocol = match parts.get(2) {
            Some(kind) if !kind.is_empty() => kind.parse()?,
            _ => ProtocolType::Java,
        };

        let port = match parts.get(1) {
            Some(port) if !port.is_empty() => parse_port(port, Error::ConfigParse)?,
            _ => protocol.default_port(),
        };

        let use_srv = parts.get(3).is_some_and(|flag| *flag == "true");

        Ok(Self {
            address: address.to_string(),
            port,
            protocol,
            use_srv,
        })
    }

    /// Parses `host:port`, `host:port:type` or `[ipv6]:port[:type]`.
    ///
    /// The last segment is taken as the type only when it is literally `java`
    /// or `bedrock`; everything before the port segment is the host, so bare
    /// IPv6 literals survive the split.
    pub fn parse_ad_hoc(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let parts: Vec<&str> = spec.split(':').collect();

        if parts.len() < 2 {
            return Err(Error::InvalidAddress(format!("missing port in '{}'", spec)));
        }

        let last = parts.len() - 1;
        let (host_parts, port_segment, protocol) = match parts[last] {
            "java" => (&parts[..last - 1], parts[last - 1], ProtocolType::Java),
            "bedrock" => (&parts[..last - 1], parts[last - 1], ProtocolType::Bedrock),
            port => (&parts[..last], port, ProtocolType::Java),
        };

        let port = parse_port(port_segment, Error::InvalidAddress)?;

        let joined = host_parts.join(":");
        let host = joined.strip_prefix('[').unwrap_or(&joined);
        let host = host.strip_suffix(']').unwrap_or(host).trim();

        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("missing host in '{}'", spec)));
        }

        Ok(Self {
            address: host.to_string(),
            port,
            protocol,
            use_srv: false,
        })
    }

    /// Cache slot for ad-hoc queries, kept apart from roster names.
    pub fn direct_cache_key(&self) -> String {
        format!("direct:{}:{}:{}", self.address, self.port, self.protocol)
    }
}

fn parse_port(segment: &str, err: fn(String) -> Error) -> Result<u16> {
    let value: i64 = segment
        .trim()
        .parse()
        .map_err(|_| err(format!("invalid port '{}'", segment)))?;

    if !(1..=65535).contains(&value) {
        return Err(err(format!("port {} out of range 1-65535", value)));
    }

    Ok(value as u16)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

/// DNS SRV lookups, behind a trait so the service can run without a network.
#[async_trait]
pub trait SrvLookup: Send + Sync {
    async fn lookup_srv(&self, name: &str) -> std::result::Result<Vec<SrvTarget>, String>;
}

pub struct DnsSrvLookup {
    resolver: TokioAsyncResolver,
}

impl DnsSrvLookup {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.num_concurrent_reqs = 200;
        opts.cache_size = 4096;
        opts.use_hosts_file = false;
        opts.positive_min_ttl = Some(Duration::from_secs(300));
        opts.negative_min_ttl = Some(Duration::from_secs(30));
        opts.timeout = timeout;

        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }
}

#[async_trait]
impl SrvLookup for DnsSrvLookup {
    async fn lookup_srv(&self, name: &str) -> std::result::Result<Vec<SrvTarget>, String> {
        let lookup = self.resolver.srv_lookup(name).await.map_err(|e| e.to_string())?;

        Ok(lookup
            .iter()
            .map(|srv| SrvTarget {
                priority: srv.priority(),
                weight: srv.weight(),
                port: srv.port(),
                target: srv.target().to_string().trim_end_matches('.').to_string(),
            })
            .collect())
    }
}

/// Lowest priority wins; among equals the first record returned is kept.
pub fn select_srv(records: &[SrvTarget]) -> Option<&SrvTarget> {
    records.iter().min_by_key(|record| record.priority)
}

/// Turns a descriptor into the endpoint to probe, following SRV when asked.
pub async fn resolve(
    descriptor: &EndpointDescriptor,
    srv: &dyn SrvLookup,
    timeout: Duration,
) -> Result<ResolvedEndpoint> {
    if !descriptor.use_srv {
        return Ok(ResolvedEndpoint {
            host: descriptor.address.clone(),
            port: descriptor.port,
        });
    }

    let records = tokio::time::timeout(timeout, srv.lookup_srv(&descriptor.address))
        .await
        .map_err(|_| {
            Error::SrvResolution(format!(
                "lookup of {} timed out after {}ms",
                descriptor.address,
                timeout.as_millis()
            ))
        })?
        .map_err(|e| Error::SrvResolution(format!("{}: {}", descriptor.address, e)))?;

    let record = select_srv(&records).ok_or_else(|| {
        Error::SrvResolution(format!("no SRV records found for {}", descriptor.address))
    })?;

    debug!(
        "SRV {} -> {}:{} (priority {}, weight {})",
        descriptor.address, record.target, record.port, record.priority, record.weight
    );

    Ok(ResolvedEndpoint {
        host: record.target.clone(),
        port: record.port,
    })
}
