// Single-query iterative walk: send to one nameserver, and if it hands back
// a delegation rather than an answer, follow NS referrals (using glue where
// present, otherwise an auxiliary lookup) until an answer or an authoritative
// response turns up, or the hop limit is reached.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::{debug, trace, warn};

use crate::dns::errors::ResolveError;
use crate::dns::flags::PacketFlags;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::rcode::DnsRCode;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rrtype::DnsRRType;
use crate::dns::wire;

const MAX_HOPS: u32 = 30;
const RECV_BUF_SIZE: usize = 65536;

/// Sends `query` to `nameserver`, retrying up to `retries` times with a
/// `timeout_ms` read deadline each attempt, and decodes the first reply that
/// parses successfully.
pub(crate) fn send_query(
    query: &DnsPacket,
    nameserver: SocketAddr,
    retries: u32,
    timeout_ms: u64,
) -> Result<DnsPacket, ResolveError> {
    let bind_addr: SocketAddr = if nameserver.is_ipv4() {
        "0.0.0.0:0".parse().unwrap()
    } else {
        "[::]:0".parse().unwrap()
    };
    let socket = UdpSocket::bind(bind_addr)?;
    socket.set_read_timeout(Some(Duration::from_millis(timeout_ms)))?;
    let wire_bytes = wire::encode(query);

    let mut last_err: Option<ResolveError> = None;
    for attempt in 0..=retries {
        socket.send_to(&wire_bytes, nameserver)?;
        let mut buf = [0u8; RECV_BUF_SIZE];
        match socket.recv_from(&mut buf) {
            Ok((len, _src)) => match wire::decode(&buf[..len]) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_err = Some(ResolveError::Protocol(e.to_string()));
                }
            },
            Err(e) => {
                trace!("attempt {} to {} timed out/failed: {}", attempt, nameserver, e);
                last_err = Some(ResolveError::from(e));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ResolveError::Unreachable(nameserver.to_string())))
}

fn glue_addresses(response: &DnsPacket, ns_name: &DomainName) -> Vec<IpAddr> {
    response
        .adlist
        .iter()
        .filter(|rr| &rr.head.name == ns_name)
        .filter_map(|rr| match &rr.data {
            Some(DnsRecordData::A(ip)) => Some(IpAddr::V4(*ip)),
            Some(DnsRecordData::Aaaa(ip)) => Some(IpAddr::V6(*ip)),
            _ => None,
        })
        .collect()
}

/// Entry point for one iterative resolve walk. `lookup_ns` resolves an NS
/// target's address when the response carries no glue for it (the caller
/// supplies this, typically backed by the system resolver).
pub fn resolve(
    query: &DnsPacket,
    nameserver: SocketAddr,
    recurse: bool,
    retries: u32,
    timeout_ms: u64,
    hops: u32,
    visited: &mut HashSet<SocketAddr>,
    lookup_ns: &mut dyn FnMut(&DomainName) -> Vec<IpAddr>,
) -> Result<DnsPacket, ResolveError> {
    visited.insert(nameserver);
    let response = send_query(query, nameserver, retries, timeout_ms)?;

    if response.qid != query.qid {
        return Err(ResolveError::Protocol(format!(
            "qid mismatch: sent {}, got {}",
            query.qid, response.qid
        )));
    }
    if !response.flags.contains(PacketFlags::RESP) {
        return Err(ResolveError::Protocol("response missing RESP flag".to_string()));
    }
    match response.rescode {
        DnsRCode::ServFail => return Err(ResolveError::ServFail),
        DnsRCode::NXDomain => return Ok(response),
        DnsRCode::NoError => {}
        other => {
            return Err(ResolveError::Protocol(format!(
                "unexpected rescode from {}: {:?}",
                nameserver, other
            )))
        }
    }

    if !recurse || response.has_answers() || response.flags.contains(PacketFlags::AUTH) {
        return Ok(response);
    }
    if hops >= MAX_HOPS {
        warn!("hop limit reached resolving {:?}", query.qlist);
        return Ok(response);
    }

    for ns_rr in response
        .aulist
        .iter()
        .filter(|rr| rr.head.rtype == DnsRRType::NS)
    {
        let ns_name = match &ns_rr.data {
            Some(DnsRecordData::Ns(name)) => name.clone(),
            _ => continue,
        };

        let mut addrs = glue_addresses(&response, &ns_name);
        if addrs.is_empty() {
            addrs = lookup_ns(&ns_name);
        }

        for ip in addrs {
            let addr = SocketAddr::new(ip, 53);
            if visited.contains(&addr) {
                continue;
            }
            debug!("delegating {:?} to {}", query.qlist, addr);
            match resolve(
                query,
                addr,
                recurse,
                retries,
                timeout_ms,
                hops + 1,
                visited,
                lookup_ns,
            ) {
                Ok(r) if r.has_answers() || r.flags.contains(PacketFlags::AUTH) => return Ok(r),
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glue_addresses_extracts_matching_a_records() {
        use crate::dns::question::DnsQuestion;
        use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
        use crate::dns::class::DnsClass;
        use std::net::Ipv4Addr;

        let question = DnsQuestion::new(
            DomainName::from_str("example.com.").unwrap(),
            DnsRRType::A,
            DnsClass::IN,
        );
        let mut packet = DnsPacket::query(1, question);
        let ns_name = DomainName::from_str("ns1.example.com.").unwrap();
        packet.add_additional(DnsResourceRecord::new(
            DnsRRHead::new(ns_name.clone(), DnsRRType::A),
            3600,
            Some(DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 1))),
        ));

        let addrs = glue_addresses(&packet, &ns_name);
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))]);
    }

    #[test]
    fn follows_a_delegation_to_the_glue_address() {
        use crate::dns::class::DnsClass;
        use crate::dns::question::DnsQuestion;
        use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
        use std::net::Ipv4Addr;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // Stands in for a root server: delegates example.com. to ns1 with
        // glue, then a second socket stands in for ns1 and answers directly.
        let leaf = UdpSocket::bind("127.0.0.1:0").unwrap();
        let leaf_addr = leaf.local_addr().unwrap();
        let leaf_hits = Arc::new(AtomicUsize::new(0));
        let leaf_hits_thread = leaf_hits.clone();
        let leaf_handle = std::thread::spawn(move || {
            let mut buf = [0u8; 512];
            let (len, src) = leaf.recv_from(&mut buf).unwrap();
            leaf_hits_thread.fetch_add(1, Ordering::SeqCst);
            let query = wire::decode(&buf[..len]).unwrap();
            let mut response = DnsPacket::response_for(&query, DnsRCode::NoError);
            response.flags |= PacketFlags::AUTH;
            response.add_answer(DnsResourceRecord::new(
                DnsRRHead::with_class(
                    DomainName::from_str("a.example.com.").unwrap(),
                    DnsRRType::A,
                    DnsClass::IN,
                ),
                60,
                Some(DnsRecordData::A(Ipv4Addr::new(203, 0, 113, 9))),
            ));
            leaf.send_to(&wire::encode(&response), src).unwrap();
        });

        let root = UdpSocket::bind("127.0.0.1:0").unwrap();
        let root_addr = root.local_addr().unwrap();
        let root_handle = std::thread::spawn(move || {
            let mut buf = [0u8; 512];
            let (len, src) = root.recv_from(&mut buf).unwrap();
            let query = wire::decode(&buf[..len]).unwrap();
            let mut response = DnsPacket::response_for(&query, DnsRCode::NoError);
            let ns_name = DomainName::from_str("ns1.example.com.").unwrap();
            response.add_authority(DnsResourceRecord::new(
                DnsRRHead::with_class(
                    DomainName::from_str("example.com.").unwrap(),
                    DnsRRType::NS,
                    DnsClass::IN,
                ),
                3600,
                Some(DnsRecordData::Ns(ns_name.clone())),
            ));
            response.add_additional(DnsResourceRecord::new(
                DnsRRHead::with_class(ns_name, DnsRRType::A, DnsClass::IN),
                3600,
                Some(DnsRecordData::A(match leaf_addr.ip() {
                    IpAddr::V4(v4) => v4,
                    IpAddr::V6(_) => unreachable!("loopback bind is v4"),
                })),
            ));
            root.send_to(&wire::encode(&response), src).unwrap();
        });

        let question = DnsQuestion::new(
            DomainName::from_str("a.example.com.").unwrap(),
            DnsRRType::A,
            DnsClass::IN,
        );
        let query = DnsPacket::query(42, question);
        let mut visited = HashSet::new();
        let mut lookup_ns = |_: &DomainName| Vec::new();
        let result = resolve(&query, root_addr, true, 1, 500, 0, &mut visited, &mut lookup_ns)
            .expect("walk should follow the delegation and succeed");

        root_handle.join().unwrap();
        leaf_handle.join().unwrap();

        assert_eq!(leaf_hits.load(Ordering::SeqCst), 1);
        assert!(result.has_answers());
        assert_eq!(
            result.anlist[0].data,
            Some(DnsRecordData::A(Ipv4Addr::new(203, 0, 113, 9)))
        );
    }
}
