// Recursive resolution: an iterative delegation walk, a weighted pick among
// configured upstream peers, a resolv-style system resolver for glueless NS
// lookups, and the static root hints table tying it together behind the
// shared response cache.

pub mod iterative;
pub mod multi;
pub mod roothints;
pub mod system;

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use rand::Rng;

use crate::dns::cache::{resolve_with_cache, ResponseCache};
use crate::dns::errors::ResolveError;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::question::DnsQuestion;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rrtype::DnsRRType;
use multi::MultiResolver;
use system::SystemResolver;

/// Ties the cache, the iterative walk, an optional configured peer set, and
/// the system resolver (used to look up NS targets with no glue) into one
/// recursive-resolution entry point.
pub struct RecursiveResolver {
    cache: ResponseCache,
    upstream: Option<MultiResolver>,
    system: SystemResolver,
    retries: u32,
    timeout_ms: u64,
}

impl RecursiveResolver {
    pub fn new(upstream_peers: Vec<SocketAddr>, system: SystemResolver) -> RecursiveResolver {
        RecursiveResolver {
            cache: ResponseCache::new(),
            upstream: if upstream_peers.is_empty() {
                None
            } else {
                Some(MultiResolver::new(upstream_peers))
            },
            system,
            retries: 2,
            timeout_ms: 2000,
        }
    }

    /// Resolves a whole query packet through the cache, falling back to an
    /// upstream walk per-question on cache miss.
    pub fn resolve_query(&self, query: &DnsPacket) -> DnsPacket {
        resolve_with_cache(&self.cache, query, |question| self.dolookup(question))
    }

    fn lookup_ns_addresses(&self, name: &DomainName) -> Vec<IpAddr> {
        match self.system.squery(name, DnsRRType::A) {
            Ok(response) => response
                .anlist
                .iter()
                .filter_map(|rr| match &rr.data {
                    Some(DnsRecordData::A(ip)) => Some(IpAddr::V4(*ip)),
                    Some(DnsRecordData::Aaaa(ip)) => Some(IpAddr::V6(*ip)),
                    _ => None,
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn dolookup(&self, question: &DnsQuestion) -> Result<DnsPacket, ResolveError> {
        let qid: u16 = rand::thread_rng().gen();
        let query = DnsPacket::query(qid, question.clone());
        let mut lookup_ns = |name: &DomainName| self.lookup_ns_addresses(name);

        if let Some(multi) = &self.upstream {
            multi.resolve(&query, true, self.retries, self.timeout_ms, &mut lookup_ns)
        } else {
            let roots = roothints::addresses();
            let pick = roots[rand::thread_rng().gen_range(0..roots.len())];
            let mut visited = HashSet::new();
            iterative::resolve(
                &query,
                SocketAddr::new(IpAddr::V4(pick), 53),
                true,
                self.retries,
                self.timeout_ms,
                0,
                &mut visited,
                &mut lookup_ns,
            )
        }
    }
}
