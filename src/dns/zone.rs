// Authoritative zone handling: the `ZoneStore` trait plus an in-memory
// reference implementation, and the zone handler that answers from a
// store, rootifying stored (possibly-relative) records against the zone's
// origin, chasing CNAMEs, and attaching NS/glue on the way out.

use std::collections::HashMap;
use std::sync::Mutex;

use log::trace;

use crate::dns::flags::PacketFlags;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::question::DnsQuestion;
use crate::dns::rcode::DnsRCode;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rr::DnsResourceRecord;
use crate::dns::rrtype::DnsRRType;

/// The storage operations the server core and DDNS handler need from a zone
/// back end. Implementers beyond `MemoryZoneStore` are expected to provide
/// their own persistence behind this same trait.
pub trait ZoneStore: Send + Sync {
    fn lookup(&self, name: &DomainName) -> Option<Vec<DnsResourceRecord>>;
    fn set(&self, name: &DomainName, rrset: Vec<DnsResourceRecord>);
    fn has(&self, name: &DomainName) -> bool;
    fn remove(&self, name: &DomainName) -> bool;
    fn remove_rtype(&self, name: &DomainName, rtype: &DnsRRType) -> bool;
    fn add_rr(&self, name: &DomainName, rr: DnsResourceRecord);
    fn list_names(&self) -> Vec<DomainName>;
}

pub struct MemoryZoneStore {
    records: Mutex<HashMap<DomainName, Vec<DnsResourceRecord>>>,
}

impl MemoryZoneStore {
    pub fn new() -> MemoryZoneStore {
        MemoryZoneStore {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl ZoneStore for MemoryZoneStore {
    fn lookup(&self, name: &DomainName) -> Option<Vec<DnsResourceRecord>> {
        self.records.lock().unwrap().get(name).cloned()
    }

    fn set(&self, name: &DomainName, rrset: Vec<DnsResourceRecord>) {
        self.records.lock().unwrap().insert(name.clone(), rrset);
    }

    fn has(&self, name: &DomainName) -> bool {
        self.records.lock().unwrap().contains_key(name)
    }

    fn remove(&self, name: &DomainName) -> bool {
        self.records.lock().unwrap().remove(name).is_some()
    }

    fn remove_rtype(&self, name: &DomainName, rtype: &DnsRRType) -> bool {
        let mut guard = self.records.lock().unwrap();
        match guard.get_mut(name) {
            Some(rrset) => {
                let before = rrset.len();
                rrset.retain(|rr| &rr.head.rtype != rtype);
                let removed = rrset.len() != before;
                if rrset.is_empty() {
                    guard.remove(name);
                }
                removed
            }
            None => false,
        }
    }

    fn add_rr(&self, name: &DomainName, rr: DnsResourceRecord) {
        let mut guard = self.records.lock().unwrap();
        let rrset = guard.entry(name.clone()).or_insert_with(Vec::new);
        if !rrset.iter().any(|existing| existing.same_key(&rr)) {
            rrset.push(rr);
        }
    }

    fn list_names(&self) -> Vec<DomainName> {
        self.records.lock().unwrap().keys().cloned().collect()
    }
}

/// An authoritative zone: a store plus the origin name records in it are
/// relative to (or, for fully rooted records, already absolute).
pub struct AuthoritativeZone {
    pub origin: DomainName,
    pub store: Box<dyn ZoneStore>,
}

impl AuthoritativeZone {
    pub fn new(origin: DomainName, store: Box<dyn ZoneStore>) -> AuthoritativeZone {
        AuthoritativeZone { origin, store }
    }

    fn records_at(&self, relative: &DomainName) -> Vec<DnsResourceRecord> {
        self.store
            .lookup(relative)
            .unwrap_or_default()
            .into_iter()
            .map(|rr| rr.rootify(&self.origin))
            .collect()
    }

    /// Answers one question against the store, rootifying and filtering to
    /// RRs matching the requested rtype (or CNAME, for chasing). Returns
    /// `None` if the store has nothing for the name.
    pub fn handle(&self, question: &DnsQuestion) -> Option<Vec<DnsResourceRecord>> {
        let mut rrset = self.store.lookup(&question.qname);
        if rrset.is_none() && question.qname.is_within(&self.origin) {
            if let Ok(relative) = question.qname.sub(&self.origin) {
                rrset = self.store.lookup(&relative);
            }
        }
        let rrset = rrset?;

        let rootified: Vec<DnsResourceRecord> =
            rrset.into_iter().map(|rr| rr.rootify(&self.origin)).collect();
        let filtered: Vec<DnsResourceRecord> = rootified
            .into_iter()
            .filter(|rr| {
                question.qtype.is_any()
                    || rr.head.rtype == question.qtype
                    || rr.head.rtype == DnsRRType::CNAME
            })
            .collect();

        if filtered.is_empty() {
            None
        } else {
            Some(filtered)
        }
    }

    fn glue_for(&self, target: &DomainName) -> Vec<DnsResourceRecord> {
        if !target.is_within(&self.origin) {
            return Vec::new();
        }
        let relative = match target.sub(&self.origin) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        self.records_at(&relative)
            .into_iter()
            .filter(|rr| rr.head.rtype == DnsRRType::A || rr.head.rtype == DnsRRType::AAAA)
            .collect()
    }

    fn soa_record(&self) -> Option<DnsResourceRecord> {
        self.records_at(&DomainName::empty())
            .into_iter()
            .find(|rr| rr.head.rtype == DnsRRType::SOA)
    }

    fn ns_records(&self) -> Vec<DnsResourceRecord> {
        self.records_at(&DomainName::empty())
            .into_iter()
            .filter(|rr| rr.head.rtype == DnsRRType::NS)
            .collect()
    }

    /// Wraps `handle` for a whole query packet: synthesizes NXDOMAIN with
    /// the zone's SOA on a total miss (unless `query` is an internal
    /// packet, in which case a bare `None` passes through), otherwise
    /// chases CNAMEs through `resolve_aux` and attaches NS + glue.
    pub fn authzone(
        &self,
        query: &DnsPacket,
        resolve_aux: &mut dyn FnMut(&DnsQuestion) -> Option<Vec<DnsResourceRecord>>,
    ) -> Option<DnsPacket> {
        let internal = query.flags.contains(PacketFlags::INTERNAL);
        let mut response = DnsPacket::response_for(query, DnsRCode::NoError);
        response.flags |= PacketFlags::AUTH;
        let mut got_any = false;

        for question in &query.qlist {
            if let Some(rrs) = self.handle(question) {
                got_any = true;
                for rr in rrs {
                    if rr.head.rtype == DnsRRType::CNAME && !question.qtype.is_any()
                        && question.qtype != DnsRRType::CNAME
                    {
                        if let Some(DnsRecordData::Cname(target)) = rr.data.clone() {
                            response.add_answer(rr);
                            let follow_up =
                                DnsQuestion::new(target, question.qtype, question.qclass);
                            if let Some(chased) = resolve_aux(&follow_up) {
                                for chased_rr in chased {
                                    response.add_answer(chased_rr);
                                }
                            }
                            continue;
                        }
                    }
                    response.add_answer(rr);
                }
            }
        }

        if !got_any {
            if internal {
                trace!("internal lookup miss for {:?}, passing None through", query.qlist);
                return None;
            }
            response.rescode = DnsRCode::NXDomain;
            if let Some(soa) = self.soa_record() {
                response.add_authority(soa);
            }
            return Some(response);
        }

        for ns in self.ns_records() {
            if let Some(DnsRecordData::Ns(target)) = ns.data.clone() {
                for glue in self.glue_for(&target) {
                    response.add_additional(glue);
                }
            }
            response.add_authority(ns);
        }

        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::class::DnsClass;
    use crate::dns::rr::DnsRRHead;
    use std::net::Ipv4Addr;

    fn dn(s: &str) -> DomainName {
        DomainName::from_str(s).unwrap()
    }

    fn zone_with_host() -> AuthoritativeZone {
        let store = MemoryZoneStore::new();
        store.set(
            &dn("host"),
            vec![DnsResourceRecord::new(
                DnsRRHead::new(dn("host"), DnsRRType::A),
                60,
                Some(DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4))),
            )],
        );
        AuthoritativeZone::new(dn("example.com."), Box::new(store))
    }

    #[test]
    fn handle_rootifies_relative_storage() {
        let zone = zone_with_host();
        let question = DnsQuestion::new(dn("host.example.com."), DnsRRType::A, DnsClass::IN);
        let rrs = zone.handle(&question).unwrap();
        assert_eq!(rrs[0].head.name, dn("host.example.com."));
    }

    #[test]
    fn handle_returns_none_for_unknown_name() {
        let zone = zone_with_host();
        let question = DnsQuestion::new(dn("nope.example.com."), DnsRRType::A, DnsClass::IN);
        assert!(zone.handle(&question).is_none());
    }

    #[test]
    fn authzone_synthesizes_nxdomain_with_soa() {
        let store = MemoryZoneStore::new();
        store.set(
            &DomainName::empty(),
            vec![DnsResourceRecord::new(
                DnsRRHead::new(DomainName::empty(), DnsRRType::SOA),
                3600,
                Some(DnsRecordData::Soa(crate::dns::rdata::SoaData {
                    priserv: dn("ns1"),
                    mailbox: dn("hostmaster"),
                    serial: 1,
                    refresh: 3600,
                    retry: 600,
                    expire: 1209600,
                    minttl: 60,
                })),
            )],
        );
        let zone = AuthoritativeZone::new(dn("example.com."), Box::new(store));
        let question = DnsQuestion::new(dn("nope.example.com."), DnsRRType::A, DnsClass::IN);
        let query = DnsPacket::query(1, question);

        let response = zone.authzone(&query, &mut |_| None).unwrap();
        assert_eq!(response.rescode, DnsRCode::NXDomain);
        assert_eq!(response.aulist.len(), 1);
    }

    #[test]
    fn authzone_passes_none_through_for_internal_packets() {
        let zone = zone_with_host();
        let question = DnsQuestion::new(dn("nope.example.com."), DnsRRType::A, DnsClass::IN);
        let mut query = DnsPacket::query(1, question);
        query.flags |= PacketFlags::INTERNAL;

        assert!(zone.authzone(&query, &mut |_| None).is_none());
    }
}
