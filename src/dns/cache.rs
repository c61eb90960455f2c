// Response cache: per-name positive record lists and NXDOMAIN negative
// marks, both TTL-indexed, guarded by one mutex held across each
// read-modify-write sequence (§4.4/§5 -- "acceptable at low-to-moderate QPS").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};

use crate::dns::class::DnsClass;
use crate::dns::errors::ResolveError;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::question::DnsQuestion;
use crate::dns::rcode::DnsRCode;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
use crate::dns::rrtype::DnsRRType;

const DEFAULT_NEGATIVE_TTL: u32 = 300;

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_secs()
}

#[derive(Clone, Debug)]
struct PositiveEntry {
    expiry: u64,
    rtype: DnsRRType,
    data: DnsRecordData,
    auth_ns: Vec<DnsResourceRecord>,
}

#[derive(Clone, Debug)]
enum CacheEntry {
    Positive(Vec<PositiveEntry>),
    Negative {
        expiry: u64,
        authority: Vec<DnsResourceRecord>,
    },
}

/// What a raw cache lookup found for one `(name, rtype)` pair.
pub enum CacheLookup {
    Empty,
    Negative(Vec<DnsResourceRecord>),
    Records(Vec<(DnsResourceRecord, Vec<DnsResourceRecord>)>),
}

pub struct ResponseCache {
    entries: Mutex<HashMap<DomainName, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> ResponseCache {
        ResponseCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up `name` for `rtype` (or every rtype, if `rtype.is_any()`).
    pub fn lookup(&self, name: &DomainName, rtype: &DnsRRType, now: u64) -> CacheLookup {
        let mut guard = self.entries.lock().unwrap();
        let entry = match guard.get(name) {
            Some(e) => e,
            None => return CacheLookup::Empty,
        };

        match entry {
            CacheEntry::Negative { expiry, authority } => {
                if now > *expiry {
                    guard.remove(name);
                    CacheLookup::Empty
                } else {
                    CacheLookup::Negative(authority.clone())
                }
            }
            CacheEntry::Positive(records) => {
                let live: Vec<PositiveEntry> = records
                    .iter()
                    .filter(|r| r.expiry > now)
                    .cloned()
                    .collect();
                let matched: Vec<(DnsResourceRecord, Vec<DnsResourceRecord>)> = live
                    .iter()
                    .filter(|r| rtype.is_any() || &r.rtype == rtype)
                    .map(|r| {
                        let remaining_ttl = (r.expiry - now) as u32;
                        let head = DnsRRHead::with_class(name.clone(), r.rtype, DnsClass::IN);
                        let rr = DnsResourceRecord::new(head, remaining_ttl, Some(r.data.clone()));
                        (rr, r.auth_ns.clone())
                    })
                    .collect();

                if live.len() != records.len() {
                    if live.is_empty() {
                        guard.remove(name);
                    } else {
                        guard.insert(name.clone(), CacheEntry::Positive(live));
                    }
                }

                if matched.is_empty() {
                    CacheLookup::Empty
                } else {
                    CacheLookup::Records(matched)
                }
            }
        }
    }

    /// Stores a negative (NXDOMAIN) mark for `name`, expiring at
    /// `now + minttl` (or the default negative TTL if `minttl` is absent).
    pub fn store_negative(
        &self,
        name: &DomainName,
        minttl: Option<u32>,
        authority: Vec<DnsResourceRecord>,
        now: u64,
    ) {
        let ttl = minttl.unwrap_or(DEFAULT_NEGATIVE_TTL) as u64;
        trace!("caching negative mark for {} (ttl {}s)", name, ttl);
        let mut guard = self.entries.lock().unwrap();
        guard.insert(
            name.clone(),
            CacheEntry::Negative {
                expiry: now + ttl,
                authority,
            },
        );
    }

    /// Stores a batch of RRs sharing the same owner name, invalidating any
    /// existing cached tuples of the rtypes this batch now provides fresh
    /// data for (they're superseded) before inserting.
    pub fn store_positive(
        &self,
        name: &DomainName,
        rrs: &[(DnsRRType, DnsRecordData, u32)],
        auth_ns: &[DnsResourceRecord],
        now: u64,
    ) {
        if rrs.is_empty() {
            return;
        }
        let mut guard = self.entries.lock().unwrap();
        let fresh_rtypes: Vec<DnsRRType> = rrs.iter().map(|(t, _, _)| *t).collect();

        let mut kept: Vec<PositiveEntry> = match guard.remove(name) {
            Some(CacheEntry::Positive(records)) => records
                .into_iter()
                .filter(|r| r.expiry > now && !fresh_rtypes.contains(&r.rtype))
                .collect(),
            _ => Vec::new(),
        };

        for (rtype, data, ttl) in rrs {
            kept.push(PositiveEntry {
                expiry: now + *ttl as u64,
                rtype: *rtype,
                data: data.clone(),
                auth_ns: auth_ns.to_vec(),
            });
        }
        debug!("cached {} record(s) for {}", rrs.len(), name);
        guard.insert(name.clone(), CacheEntry::Positive(kept));
    }
}

/// Drives the cache-then-upstream resolve flow for a whole query packet
/// (§4.4 "Resolve flow"). `dolookup` issues a single-question upstream
/// lookup when the cache can't answer outright.
pub fn resolve_with_cache<F>(
    cache: &ResponseCache,
    query: &DnsPacket,
    mut dolookup: F,
) -> DnsPacket
where
    F: FnMut(&DnsQuestion) -> Result<DnsPacket, ResolveError>,
{
    let now = unix_now();
    let single_question = query.qlist.len() == 1;
    let mut response = DnsPacket::response_for(query, DnsRCode::NoError);

    for question in &query.qlist {
        let mut current_name = question.qname.clone();
        let mut satisfied_from_cache = false;

        loop {
            match cache.lookup(&current_name, &question.qtype, now) {
                CacheLookup::Negative(authority) => {
                    if single_question {
                        response.rescode = DnsRCode::NXDomain;
                        for rr in authority {
                            response.add_authority(rr);
                        }
                        return response;
                    }
                    satisfied_from_cache = true;
                    break;
                }
                CacheLookup::Records(records) => {
                    for (rr, ns_list) in records {
                        response.add_answer(rr);
                        for ns in ns_list {
                            if let Some(DnsRecordData::Ns(target)) = &ns.data {
                                for glue in cached_glue(cache, target, now) {
                                    response.add_additional(glue);
                                }
                            }
                            response.add_authority(ns);
                        }
                    }
                    satisfied_from_cache = true;
                    break;
                }
                CacheLookup::Empty => {
                    let cname_lookup = cache.lookup(&current_name, &DnsRRType::CNAME, now);
                    if let CacheLookup::Records(records) = cname_lookup {
                        if let Some((rr, _)) = records.into_iter().next() {
                            if let Some(DnsRecordData::Cname(target)) = &rr.data {
                                let next_name = target.clone();
                                response.add_answer(rr);
                                current_name = next_name;
                                continue;
                            }
                        }
                    }
                    break;
                }
            }
        }

        if satisfied_from_cache {
            continue;
        }

        let upstream_question = DnsQuestion::new(current_name, question.qtype, question.qclass);
        match dolookup(&upstream_question) {
            Ok(upstream) if upstream.rescode == DnsRCode::NoError => {
                store_upstream_response(cache, &upstream_question, &upstream, now);
                response.merge(upstream);
            }
            Ok(upstream) if upstream.rescode == DnsRCode::NXDomain => {
                let minttl = find_soa_minttl(&upstream);
                cache.store_negative(
                    &upstream_question.qname,
                    minttl,
                    upstream.aulist.clone(),
                    now,
                );
                if single_question {
                    response.rescode = DnsRCode::NXDomain;
                    for rr in upstream.aulist {
                        response.add_authority(rr);
                    }
                    return response;
                }
            }
            Ok(upstream) => {
                if single_question {
                    response.rescode = upstream.rescode;
                    return response;
                }
            }
            Err(ResolveError::ServFail) | Err(ResolveError::Unreachable(_)) => {
                if single_question {
                    response.rescode = DnsRCode::ServFail;
                    return response;
                }
            }
            Err(ResolveError::Protocol(detail)) => {
                debug!("resolver protocol error for {}: {}", upstream_question.qname, detail);
                if single_question {
                    response.rescode = DnsRCode::ServFail;
                    return response;
                }
            }
        }
    }

    response
}

/// Glue A/AAAA for a cached NS target, mirroring what
/// `AuthoritativeZone::authzone`'s `glue_for` does against the zone store --
/// here against the cache instead (§4.4 "If got a cached result, attach the
/// RRs plus each NS RR and glue A/AAAA").
fn cached_glue(cache: &ResponseCache, ns_target: &DomainName, now: u64) -> Vec<DnsResourceRecord> {
    let mut glue = Vec::new();
    for rtype in [DnsRRType::A, DnsRRType::AAAA] {
        if let CacheLookup::Records(records) = cache.lookup(ns_target, &rtype, now) {
            glue.extend(records.into_iter().map(|(rr, _)| rr));
        }
    }
    glue
}

fn find_soa_minttl(packet: &DnsPacket) -> Option<u32> {
    packet.aulist.iter().find_map(|rr| match &rr.data {
        Some(DnsRecordData::Soa(soa)) => Some(soa.minttl),
        _ => None,
    })
}

fn store_upstream_response(
    cache: &ResponseCache,
    question: &DnsQuestion,
    upstream: &DnsPacket,
    now: u64,
) {
    let mut by_name: HashMap<DomainName, Vec<(DnsRRType, DnsRecordData, u32)>> = HashMap::new();
    for rr in &upstream.anlist {
        if let Some(data) = &rr.data {
            by_name
                .entry(rr.head.name.clone())
                .or_insert_with(Vec::new)
                .push((rr.head.rtype, data.clone(), rr.ttl));
        }
    }
    if by_name.is_empty() {
        return;
    }
    let _ = question;
    for (name, rrs) in by_name {
        cache.store_positive(&name, &rrs, &upstream.aulist, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn name(s: &str) -> DomainName {
        DomainName::from_str(s).unwrap()
    }

    #[test]
    fn positive_entry_expires_after_ttl() {
        let cache = ResponseCache::new();
        let n = name("host.example.com.");
        cache.store_positive(
            &n,
            &[(DnsRRType::A, DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4)), 10)],
            &[],
            1000,
        );

        match cache.lookup(&n, &DnsRRType::A, 1005) {
            CacheLookup::Records(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].0.ttl, 5);
            }
            _ => panic!("expected a live record"),
        }

        match cache.lookup(&n, &DnsRRType::A, 1010) {
            CacheLookup::Empty => {}
            _ => panic!("expected expiry"),
        }
    }

    #[test]
    fn negative_mark_expires() {
        let cache = ResponseCache::new();
        let n = name("nx.example.com.");
        cache.store_negative(&n, Some(60), vec![], 1000);

        match cache.lookup(&n, &DnsRRType::A, 1059) {
            CacheLookup::Negative(_) => {}
            _ => panic!("expected negative mark still live"),
        }
        match cache.lookup(&n, &DnsRRType::A, 1061) {
            CacheLookup::Empty => {}
            _ => panic!("expected expired negative mark"),
        }
    }

    #[test]
    fn storing_fresh_data_supersedes_same_rtype() {
        let cache = ResponseCache::new();
        let n = name("host.example.com.");
        cache.store_positive(
            &n,
            &[(DnsRRType::A, DnsRecordData::A(Ipv4Addr::new(1, 1, 1, 1)), 60)],
            &[],
            1000,
        );
        cache.store_positive(
            &n,
            &[(DnsRRType::A, DnsRecordData::A(Ipv4Addr::new(2, 2, 2, 2)), 60)],
            &[],
            1010,
        );
        match cache.lookup(&n, &DnsRRType::A, 1010) {
            CacheLookup::Records(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].0.data, Some(DnsRecordData::A(Ipv4Addr::new(2, 2, 2, 2))));
            }
            _ => panic!("expected exactly one superseding record"),
        }
    }

    #[test]
    fn resolve_with_cache_attaches_ns_glue_from_cache() {
        let cache = ResponseCache::new();
        let qname = name("a.example.com.");
        let ns_name = name("ns1.example.com.");
        let now = unix_now();

        let ns_rr = DnsResourceRecord::new(
            DnsRRHead::with_class(name("example.com."), DnsRRType::NS, DnsClass::IN),
            60,
            Some(DnsRecordData::Ns(ns_name.clone())),
        );
        cache.store_positive(
            &qname,
            &[(DnsRRType::A, DnsRecordData::A(Ipv4Addr::new(10, 0, 0, 1)), 60)],
            std::slice::from_ref(&ns_rr),
            now,
        );
        cache.store_positive(
            &ns_name,
            &[(DnsRRType::A, DnsRecordData::A(Ipv4Addr::new(10, 0, 0, 53)), 60)],
            &[],
            now,
        );

        let question = DnsQuestion::new(qname.clone(), DnsRRType::A, DnsClass::IN);
        let query = DnsPacket::query(1, question);
        let response = resolve_with_cache(&cache, &query, |_q| {
            panic!("cache should have answered without going upstream")
        });

        assert_eq!(response.anlist.len(), 1);
        assert_eq!(response.aulist.len(), 1);
        assert_eq!(response.adlist.len(), 1);
        assert_eq!(
            response.adlist[0].data,
            Some(DnsRecordData::A(Ipv4Addr::new(10, 0, 0, 53)))
        );
    }
}
