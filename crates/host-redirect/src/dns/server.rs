//! UDP DNS front.
//!
//! Each datagram is handled in its own task. Replies carry the request's
//! transaction id and question, so reordering or retransmission on the wire
//! cannot pair a reply with the wrong query. Lookup failures become empty
//! answers; the exchange itself never fails.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use hickory_proto::op::{Edns, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::net::UdpSocket;
use tracing::Instrument;

use super::decision::{decide, DnsDecision};
use super::resolver::{answers_for, RecursiveResolver};
use crate::stats::{Counter, RedirectStats};
use crate::table::RoutingTable;

const MAX_DNS_PACKET_SIZE: usize = 4096;
const PLAIN_DNS_PACKET_SIZE: usize = 512;

pub struct DnsFront {
    table: Arc<RoutingTable>,
    local_ip: Ipv4Addr,
    resolver: Arc<dyn RecursiveResolver>,
    ttl: u32,
    verbose: bool,
    stats: RedirectStats,
}

impl DnsFront {
    pub fn new(
        table: Arc<RoutingTable>,
        local_ip: Ipv4Addr,
        resolver: Arc<dyn RecursiveResolver>,
        ttl: u32,
        stats: RedirectStats,
    ) -> Self {
        Self {
            table,
            local_ip,
            resolver,
            ttl,
            verbose: false,
            stats,
        }
    }

    /// Log misses at info instead of debug.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Receive datagrams forever, answering each one from its own task.
    pub async fn serve(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

        loop {
            let (len, src) = match socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "DNS recv error");
                    continue;
                }
            };

            let packet = buf[..len].to_vec();
            let front = self.clone();
            let socket = socket.clone();

            tokio::spawn(async move {
                let Some(reply) = front.handle_packet(&packet, src).await else {
                    return;
                };
                if let Err(e) = socket.send_to(&reply, src).await {
                    tracing::warn!(error = %e, client = %src, "DNS send error");
                }
            });
        }
    }

    /// Decode one datagram and encode the reply. `None` means drop it.
    pub async fn handle_packet(&self, packet: &[u8], src: SocketAddr) -> Option<Vec<u8>> {
        let request = match Message::from_vec(packet) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, client = %src, len = packet.len(), "Dropping undecodable DNS datagram");
                self.stats.inc(Counter::DnsDropped);
                return None;
            }
        };

        if request.message_type() == MessageType::Response {
            tracing::debug!(client = %src, id = request.id(), "Dropping DNS response sent to server");
            self.stats.inc(Counter::DnsDropped);
            return None;
        }

        let mut response = self.respond(&request).await;
        let limit = reply_size_limit(&request);
        let mut encoded = encode(&response)?;

        if encoded.len() > limit {
            tracing::debug!(
                id = request.id(),
                size = encoded.len(),
                limit,
                "DNS reply too large, answering truncated"
            );
            response.take_answers();
            response.set_truncated(true);
            encoded = encode(&response)?;
        }
        Some(encoded)
    }

    /// Build the reply for a decoded query.
    pub async fn respond(&self, request: &Message) -> Message {
        let mut response = reply_to(request);

        let Some(query) = request.queries().first() else {
            return response;
        };
        if request.op_code() != OpCode::Query {
            return response;
        }

        let name = query.name();
        let qtype = query.query_type();
        let span = redirect_tracing::dns_query_span!(request.id(), name, qtype);

        async {
            let decision = decide(&self.table, name, qtype, self.local_ip);
            tracing::Span::current().record("decision", decision.label());

            let answers = match decision {
                DnsDecision::Override(ip) => {
                    self.stats.inc(Counter::DnsOverride);
                    tracing::info!(name = %name, ip = %ip, "DNS match, answering with interface address");
                    vec![Record::from_rdata(name.clone(), self.ttl, RData::A(A(ip)))]
                }
                DnsDecision::Forward => {
                    self.stats.inc(Counter::DnsForward);
                    if self.verbose {
                        tracing::info!(name = %name, qtype = %qtype, "DNS miss, using system lookup");
                    } else {
                        tracing::debug!(name = %name, qtype = %qtype, "DNS miss, using system lookup");
                    }
                    self.forward(name, qtype).await
                }
            };

            tracing::Span::current().record("answers", answers.len());
            response.add_answers(answers);
        }
        .instrument(span)
        .await;

        response
    }

    async fn forward(&self, name: &Name, qtype: RecordType) -> Vec<Record> {
        if !matches!(qtype, RecordType::A | RecordType::AAAA) {
            return Vec::new();
        }

        let ascii = name.to_ascii();
        let host = ascii.strip_suffix('.').unwrap_or(&ascii);
        match self.resolver.lookup_ip(host).await {
            Ok(ips) => answers_for(name, qtype, &ips, self.ttl),
            Err(e) => {
                tracing::warn!(name = %host, error = %e, "Recursive lookup failed, answering empty");
                Vec::new()
            }
        }
    }
}

fn encode(response: &Message) -> Option<Vec<u8>> {
    match response.to_vec() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!(error = %e, id = response.id(), "Failed to encode DNS reply");
            None
        }
    }
}

/// Largest reply the client accepts over UDP: 512 bytes, or the EDNS payload
/// size it advertised, capped at what this server advertises back.
fn reply_size_limit(request: &Message) -> usize {
    match request.extensions() {
        Some(edns) => usize::from(edns.max_payload()).clamp(PLAIN_DNS_PACKET_SIZE, MAX_DNS_PACKET_SIZE),
        None => PLAIN_DNS_PACKET_SIZE,
    }
}

/// Reply skeleton: same id and opcode, RD echoed, NOERROR, OPT echoed when the
/// query carried one.
///
/// Only the first question is copied and answered; any others are ignored.
fn reply_to(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    if let Some(query) = request.queries().first() {
        response.add_query(query.clone());
    }
    if request.extensions().is_some() {
        let mut edns = Edns::new();
        edns.set_max_payload(MAX_DNS_PACKET_SIZE as u16);
        response.set_edns(edns);
    }
    response
}
