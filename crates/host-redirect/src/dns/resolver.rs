//! Recursive lookups for names the proxy does not override.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};

/// Resolves a hostname to addresses. Injected so the DNS front can be
/// exercised without touching the network.
#[async_trait]
pub trait RecursiveResolver: Send + Sync {
    /// `name` carries no trailing root dot.
    async fn lookup_ip(&self, name: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system's resolver (getaddrinfo via tokio's blocking pool).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl RecursiveResolver for SystemResolver {
    async fn lookup_ip(&self, name: &str) -> io::Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((name, 0)).await? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

/// Turn resolver output into answer records of the queried type only.
/// Types other than A and AAAA get no records.
pub fn answers_for(name: &Name, qtype: RecordType, ips: &[IpAddr], ttl: u32) -> Vec<Record> {
    ips.iter()
        .filter_map(|ip| match (qtype, ip) {
            (RecordType::A, IpAddr::V4(v4)) => Some(RData::A(A(*v4))),
            (RecordType::AAAA, IpAddr::V6(v6)) => Some(RData::AAAA(AAAA(*v6))),
            _ => None,
        })
        .map(|rdata| Record::from_rdata(name.clone(), ttl, rdata))
        .collect()
}
