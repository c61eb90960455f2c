// The pluggable handler chain a zone is backed by (§4.7): a `Handler`
// answers one question against the whole request packet, or declines by
// returning `None` so the next handler in a `chain` gets a turn. Built-in
// compositions mirror the reference server's own handler hierarchy:
// `chain` (first answer wins), `forwarder` (proxy to an upstream server),
// `recurser` (delegate to a resolver), and `addrfilter` (route by source
// address prefix).

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use log::{trace, warn};

use crate::dns::packet::DnsPacket;
use crate::dns::question::DnsQuestion;
use crate::dns::resolver::RecursiveResolver;
use crate::dns::wire;
use crate::dns::zone::AuthoritativeZone;

/// Answers (or declines to answer) one question against a request packet.
/// Implementors are zone-scoped: unlike the reference server's `origin`
/// parameter (needed there because a handler instance could be shared
/// across zones), each `Handler` here already belongs to exactly one zone,
/// so there's nothing to thread through.
pub trait Handler: Send + Sync {
    fn handle(&self, question: &DnsQuestion, pkt: &DnsPacket) -> Option<DnsPacket>;
}

/// Answers straight from a zone's store, with no NXDOMAIN synthesis,
/// CNAME chasing, or NS/glue attachment -- those live in
/// `AuthoritativeZone::authzone`, which wraps a whole query packet rather
/// than a single question. This adapter lets a bare store lookup also
/// compose inside a `chain`/`addrfilter` alongside a `forwarder` or
/// `recurser`.
pub struct ZoneStoreHandler(pub Arc<AuthoritativeZone>);

impl Handler for ZoneStoreHandler {
    fn handle(&self, question: &DnsQuestion, pkt: &DnsPacket) -> Option<DnsPacket> {
        let rrs = self.0.handle(question)?;
        let mut resp = DnsPacket::response_for(pkt, crate::dns::rcode::DnsRCode::NoError);
        for rr in rrs {
            resp.add_answer(rr);
        }
        Some(resp)
    }
}

/// Tries each contained handler in order, returning the first non-`None`
/// answer.
pub struct ChainHandler {
    chain: Vec<Box<dyn Handler>>,
}

impl ChainHandler {
    pub fn new(chain: Vec<Box<dyn Handler>>) -> ChainHandler {
        ChainHandler { chain }
    }

    pub fn add(&mut self, handler: Box<dyn Handler>) {
        self.chain.push(handler);
    }
}

impl Handler for ChainHandler {
    fn handle(&self, question: &DnsQuestion, pkt: &DnsPacket) -> Option<DnsPacket> {
        for handler in &self.chain {
            if let Some(resp) = handler.handle(question, pkt) {
                return Some(resp);
            }
        }
        None
    }
}

/// Proxies the whole request packet verbatim to an upstream nameserver and
/// returns its decoded reply, retrying up to `retries` times within
/// `timeout_ms` each.
pub struct ForwarderHandler {
    nameserver: SocketAddr,
    timeout_ms: u64,
    retries: u32,
}

impl ForwarderHandler {
    pub fn new(nameserver: SocketAddr, timeout_ms: u64, retries: u32) -> ForwarderHandler {
        ForwarderHandler {
            nameserver,
            timeout_ms,
            retries,
        }
    }
}

impl Handler for ForwarderHandler {
    fn handle(&self, _question: &DnsQuestion, pkt: &DnsPacket) -> Option<DnsPacket> {
        let bind_addr = if self.nameserver.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = match UdpSocket::bind(bind_addr) {
            Ok(s) => s,
            Err(e) => {
                warn!("forwarder couldn't open a socket: {}", e);
                return None;
            }
        };
        if socket
            .set_read_timeout(Some(Duration::from_millis(self.timeout_ms)))
            .is_err()
        {
            return None;
        }
        let wire_bytes = wire::encode(pkt);
        let mut buf = [0u8; 65536];
        for attempt in 0..=self.retries {
            if socket.send_to(&wire_bytes, self.nameserver).is_err() {
                continue;
            }
            match socket.recv_from(&mut buf) {
                Ok((len, _src)) => match wire::decode(&buf[..len]) {
                    Ok(resp) => return Some(resp),
                    Err(e) => trace!("forwarder got a malformed reply: {}", e),
                },
                Err(e) => trace!("forwarder attempt {} timed out: {}", attempt, e),
            }
        }
        None
    }
}

/// Delegates to a recursive resolver. The resolver's own cache-driven flow
/// never raises -- upstream failures already collapse to a SERVFAIL
/// response -- so this always answers with `Some`.
pub struct RecurserHandler {
    resolver: Arc<RecursiveResolver>,
}

impl RecurserHandler {
    pub fn new(resolver: Arc<RecursiveResolver>) -> RecurserHandler {
        RecurserHandler { resolver }
    }
}

impl Handler for RecurserHandler {
    fn handle(&self, _question: &DnsQuestion, pkt: &DnsPacket) -> Option<DnsPacket> {
        Some(self.resolver.resolve_query(pkt))
    }
}

/// One `(family, prefix, preflen, handler)` routing rule.
pub struct AddrRule {
    pub prefix: IpAddr,
    pub preflen: u8,
    pub handler: Box<dyn Handler>,
}

fn prefix_matches(addr: IpAddr, prefix: IpAddr, preflen: u8) -> bool {
    let (addr_bytes, prefix_bytes): (Vec<u8>, Vec<u8>) = match (addr, prefix) {
        (IpAddr::V4(a), IpAddr::V4(p)) => (a.octets().to_vec(), p.octets().to_vec()),
        (IpAddr::V6(a), IpAddr::V6(p)) => (a.octets().to_vec(), p.octets().to_vec()),
        _ => return false,
    };
    let full_bytes = (preflen / 8) as usize;
    let rem_bits = preflen % 8;
    if full_bytes > addr_bytes.len() {
        return false;
    }
    if addr_bytes[..full_bytes] != prefix_bytes[..full_bytes] {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rem_bits);
    (addr_bytes[full_bytes] & mask) == (prefix_bytes[full_bytes] & mask)
}

/// Dispatches by longest-prefix match of the request's source address
/// against configured rules, falling back to `default` (if any) when
/// nothing matches or the packet carries no source address (e.g. an
/// internally-synthesized lookup).
pub struct AddrFilterHandler {
    rules: Vec<AddrRule>,
    default: Option<Box<dyn Handler>>,
}

impl AddrFilterHandler {
    pub fn new(rules: Vec<AddrRule>, default: Option<Box<dyn Handler>>) -> AddrFilterHandler {
        AddrFilterHandler { rules, default }
    }
}

impl Handler for AddrFilterHandler {
    fn handle(&self, question: &DnsQuestion, pkt: &DnsPacket) -> Option<DnsPacket> {
        let src = match pkt.addr {
            Some(addr) => addr.ip,
            None => return self.default.as_ref()?.handle(question, pkt),
        };

        let mut best: Option<(&AddrRule, u8)> = None;
        for rule in &self.rules {
            if prefix_matches(src, rule.prefix, rule.preflen) {
                if best.is_none() || rule.preflen > best.unwrap().1 {
                    best = Some((rule, rule.preflen));
                }
            }
        }

        match best {
            Some((rule, _)) => rule.handler.handle(question, pkt),
            None => self.default.as_ref()?.handle(question, pkt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_respects_partial_byte() {
        let a: IpAddr = "192.168.1.5".parse().unwrap();
        let p: IpAddr = "192.168.0.0".parse().unwrap();
        assert!(prefix_matches(a, p, 16));
        assert!(!prefix_matches(a, p, 24));
    }

    #[test]
    fn chain_tries_handlers_in_order() {
        struct Declines;
        impl Handler for Declines {
            fn handle(&self, _q: &DnsQuestion, _p: &DnsPacket) -> Option<DnsPacket> {
                None
            }
        }
        struct Answers;
        impl Handler for Answers {
            fn handle(&self, _q: &DnsQuestion, p: &DnsPacket) -> Option<DnsPacket> {
                Some(DnsPacket::response_for(p, crate::dns::rcode::DnsRCode::NoError))
            }
        }

        let chain = ChainHandler::new(vec![Box::new(Declines), Box::new(Answers)]);
        let question = DnsQuestion::new(
            crate::dns::names::DomainName::from_str("example.com.").unwrap(),
            crate::dns::rrtype::DnsRRType::A,
            crate::dns::class::DnsClass::IN,
        );
        let query = DnsPacket::query(1, question.clone());
        assert!(chain.handle(&question, &query).is_some());
    }

    #[test]
    fn addrfilter_falls_back_to_default_with_no_match() {
        struct Answers;
        impl Handler for Answers {
            fn handle(&self, _q: &DnsQuestion, p: &DnsPacket) -> Option<DnsPacket> {
                Some(DnsPacket::response_for(p, crate::dns::rcode::DnsRCode::NoError))
            }
        }
        let filter = AddrFilterHandler::new(vec![], Some(Box::new(Answers)));
        let question = DnsQuestion::new(
            crate::dns::names::DomainName::from_str("example.com.").unwrap(),
            crate::dns::rrtype::DnsRRType::A,
            crate::dns::class::DnsClass::IN,
        );
        let mut query = DnsPacket::query(1, question.clone());
        query.addr = Some(crate::dns::packet::PacketAddr::new(
            "10.0.0.1".parse().unwrap(),
            5353,
        ));
        assert!(filter.handle(&question, &query).is_some());
    }
}
