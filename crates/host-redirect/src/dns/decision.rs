//! Per-question routing decision, kept free of I/O.

use std::net::Ipv4Addr;

use hickory_proto::rr::{Name, RecordType};

use crate::table::RoutingTable;

/// What to answer for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsDecision {
    /// The name is routed and an A record was asked for: answer with the
    /// proxy's own address. The route's real target is never resolved here.
    Override(Ipv4Addr),
    /// Ask the recursive resolver and answer with what it returns.
    Forward,
}

impl DnsDecision {
    pub fn label(&self) -> &'static str {
        match self {
            DnsDecision::Override(_) => "override",
            DnsDecision::Forward => "forward",
        }
    }
}

pub fn decide(
    table: &RoutingTable,
    name: &Name,
    qtype: RecordType,
    local_ip: Ipv4Addr,
) -> DnsDecision {
    if qtype == RecordType::A && table.contains(&name.to_ascii()) {
        DnsDecision::Override(local_ip)
    } else {
        DnsDecision::Forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RouteEntry;
    use std::str::FromStr;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn table() -> RoutingTable {
        let table = RoutingTable::new();
        table.load([RouteEntry::new("api.local", "https://upstream.example")]);
        table
    }

    #[test]
    fn test_routed_a_query_is_overridden() {
        let name = Name::from_str("api.local.").unwrap();
        assert_eq!(
            decide(&table(), &name, RecordType::A, LOCAL),
            DnsDecision::Override(LOCAL)
        );
    }

    #[test]
    fn test_match_ignores_case_and_root_dot() {
        let table = table();
        for raw in ["API.Local.", "api.local", "Api.LOCAL"] {
            let name = Name::from_str(raw).unwrap();
            assert_eq!(
                decide(&table, &name, RecordType::A, LOCAL),
                DnsDecision::Override(LOCAL),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_routed_name_with_other_type_is_forwarded() {
        let name = Name::from_str("api.local.").unwrap();
        for qtype in [RecordType::AAAA, RecordType::MX, RecordType::TXT] {
            assert_eq!(decide(&table(), &name, qtype, LOCAL), DnsDecision::Forward);
        }
    }

    #[test]
    fn test_unrouted_name_is_forwarded() {
        let name = Name::from_str("unknown.example.").unwrap();
        assert_eq!(
            decide(&table(), &name, RecordType::A, LOCAL),
            DnsDecision::Forward
        );
    }
}
