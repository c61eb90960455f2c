// RFC 2136 dynamic update handling: prerequisite validation, a three-valued
// authorization policy, update precheck, and ordered apply -- all under one
// zone-wide lock spanning the whole prerequisite-check-then-apply sequence.

use std::sync::Mutex;

use log::{info, warn};

use crate::dns::class::DnsClass;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::rcode::DnsRCode;
use crate::dns::rr::DnsResourceRecord;
use crate::dns::rrtype::DnsRRType;
use crate::dns::zone::AuthoritativeZone;

/// Per-zone DDNS authorization. `Disabled` refuses every update regardless
/// of TSIG; `Open` authorizes any update whose prerequisites pass; an
/// `AllowList` requires a verified TSIG context naming one of the listed
/// keys. Replaces the ambiguous "authkeys is None" check in the system this
/// is modeled on with an explicit third state.
#[derive(Clone, Debug)]
pub enum DdnsPolicy {
    Disabled,
    Open,
    AllowList(Vec<DomainName>),
}

pub struct DdnsHandler {
    policy: DdnsPolicy,
    lock: Mutex<()>,
}

impl DdnsHandler {
    pub fn new(policy: DdnsPolicy) -> DdnsHandler {
        DdnsHandler {
            policy,
            lock: Mutex::new(()),
        }
    }

    fn reply(query: &DnsPacket, rescode: DnsRCode) -> DnsPacket {
        DnsPacket::response_for(query, rescode)
    }

    /// Handles one UPDATE packet against `zone`, holding the zone-wide
    /// update lock across prerequisite checks and apply so a concurrent
    /// UPDATE can't interleave between them.
    pub fn handle_update(&self, zone: &AuthoritativeZone, query: &DnsPacket) -> DnsPacket {
        let _guard = self.lock.lock().unwrap();

        if query.qlist.len() != 1 {
            return Self::reply(query, DnsRCode::FormError);
        }
        let question = &query.qlist[0];
        if question.qtype != DnsRRType::SOA {
            return Self::reply(query, DnsRCode::FormError);
        }
        if question.qname != zone.origin {
            return Self::reply(query, DnsRCode::NotAuth);
        }

        if let Err(rescode) = self.check_prerequisites(zone, query) {
            return Self::reply(query, rescode);
        }

        if let Err(rescode) = self.authorize(query) {
            return Self::reply(query, rescode);
        }

        if let Err(rescode) = Self::check_update_fields(zone, query) {
            return Self::reply(query, rescode);
        }

        self.apply_updates(zone, query);
        info!("applied DDNS update for {}", zone.origin);
        Self::reply(query, DnsRCode::NoError)
    }

    fn check_prerequisites(&self, zone: &AuthoritativeZone, query: &DnsPacket) -> Result<(), DnsRCode> {
        for rr in &query.anlist {
            if rr.ttl != 0 {
                return Err(DnsRCode::FormError);
            }
            if !rr.head.name.is_within(&zone.origin) {
                return Err(DnsRCode::NotZone);
            }
            let myname = rr
                .head
                .name
                .sub(&zone.origin)
                .map_err(|_| DnsRCode::NotZone)?;

            match (rr.head.rclass, &rr.data) {
                (DnsClass::ANY, None) => {
                    if rr.head.rtype.is_any() {
                        if !zone.store.has(&myname) {
                            return Err(DnsRCode::NXDomain);
                        }
                    } else if !rtype_exists(zone, &myname, &rr.head.rtype) {
                        return Err(DnsRCode::NXRRSet);
                    }
                }
                (DnsClass::NONE, None) => {
                    if rr.head.rtype.is_any() {
                        if zone.store.has(&myname) {
                            return Err(DnsRCode::YXDomain);
                        }
                    } else if rtype_exists(zone, &myname, &rr.head.rtype) {
                        return Err(DnsRCode::YXRRSet);
                    }
                }
                (DnsClass::IN, Some(data)) => {
                    let exact = zone
                        .store
                        .lookup(&myname)
                        .map(|set| {
                            set.iter()
                                .any(|existing| existing.head.rtype == rr.head.rtype && existing.data.as_ref() == Some(data))
                        })
                        .unwrap_or(false);
                    if !exact {
                        return Err(DnsRCode::NXRRSet);
                    }
                }
                _ => return Err(DnsRCode::FormError),
            }
        }
        Ok(())
    }

    fn authorize(&self, query: &DnsPacket) -> Result<(), DnsRCode> {
        match &self.policy {
            DdnsPolicy::Disabled => Err(DnsRCode::Refused),
            DdnsPolicy::Open => Ok(()),
            DdnsPolicy::AllowList(keys) => match &query.tsigctx {
                None => {
                    warn!("DDNS update rejected: no TSIG context on an allow-listed zone");
                    Err(DnsRCode::Refused)
                }
                Some(ctx) => {
                    if ctx.error_code != 0 {
                        Err(DnsRCode::NotAuth)
                    } else if keys.iter().any(|k| k == &ctx.key.name) {
                        Ok(())
                    } else {
                        Err(DnsRCode::Refused)
                    }
                }
            },
        }
    }

    fn check_update_fields(zone: &AuthoritativeZone, query: &DnsPacket) -> Result<(), DnsRCode> {
        for rr in &query.aulist {
            if !rr.head.name.is_within(&zone.origin) {
                return Err(DnsRCode::NotZone);
            }
            match rr.head.rclass {
                DnsClass::IN => {
                    if rr.head.rtype.is_any() || rr.data.is_none() {
                        return Err(DnsRCode::FormError);
                    }
                }
                DnsClass::ANY => {
                    if rr.data.is_some() {
                        return Err(DnsRCode::FormError);
                    }
                }
                DnsClass::NONE => {
                    if rr.head.rtype.is_any() || rr.ttl != 0 || rr.data.is_none() {
                        return Err(DnsRCode::FormError);
                    }
                }
                _ => return Err(DnsRCode::FormError),
            }
        }
        Ok(())
    }

    fn apply_updates(&self, zone: &AuthoritativeZone, query: &DnsPacket) {
        for rr in &query.aulist {
            let myname = match rr.head.name.sub(&zone.origin) {
                Ok(n) => n,
                Err(_) => continue,
            };
            match rr.head.rclass {
                DnsClass::IN => {
                    zone.store.add_rr(&myname, relative_copy(rr, &myname));
                }
                DnsClass::ANY if rr.head.rtype.is_any() => {
                    zone.store.remove(&myname);
                }
                DnsClass::ANY => {
                    zone.store.remove_rtype(&myname, &rr.head.rtype);
                }
                DnsClass::NONE => {
                    delete_exact(zone, &myname, rr);
                }
                _ => {}
            }
        }
    }
}

fn rtype_exists(zone: &AuthoritativeZone, name: &DomainName, rtype: &DnsRRType) -> bool {
    zone.store
        .lookup(name)
        .map(|set| set.iter().any(|rr| &rr.head.rtype == rtype))
        .unwrap_or(false)
}

/// Stored records are named relative to the zone origin; `rr` arrives with
/// its fully-rooted wire name, so re-head it onto the relative name before
/// adding it to the store.
fn relative_copy(rr: &DnsResourceRecord, relative_name: &DomainName) -> DnsResourceRecord {
    let mut copy = rr.clone();
    copy.head.name = relative_name.clone();
    copy
}

fn delete_exact(zone: &AuthoritativeZone, name: &DomainName, rr: &DnsResourceRecord) {
    if let Some(mut set) = zone.store.lookup(name) {
        let before = set.len();
        set.retain(|existing| !(existing.head.rtype == rr.head.rtype && existing.data == rr.data));
        if set.len() != before {
            zone.store.set(name, set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::question::DnsQuestion;
    use crate::dns::rdata::DnsRecordData;
    use crate::dns::rr::DnsRRHead;
    use crate::dns::zone::MemoryZoneStore;
    use std::net::Ipv4Addr;

    fn dn(s: &str) -> DomainName {
        DomainName::from_str(s).unwrap()
    }

    fn zone_with(ips: Vec<Ipv4Addr>) -> AuthoritativeZone {
        let store = MemoryZoneStore::new();
        let rrs = ips
            .into_iter()
            .map(|ip| {
                DnsResourceRecord::new(
                    DnsRRHead::new(dn("host"), DnsRRType::A),
                    60,
                    Some(DnsRecordData::A(ip)),
                )
            })
            .collect();
        store.set(&dn("host"), rrs);
        AuthoritativeZone::new(dn("example.com."), Box::new(store))
    }

    fn update_query(
        origin: &DomainName,
        prereqs: Vec<DnsResourceRecord>,
        updates: Vec<DnsResourceRecord>,
    ) -> DnsPacket {
        let question = DnsQuestion::new(origin.clone(), DnsRRType::SOA, DnsClass::IN);
        let mut packet = DnsPacket::query(1, question);
        packet.opcode = crate::dns::opcode::DnsOpcode::Update;
        for rr in prereqs {
            packet.anlist.push(rr);
        }
        for rr in updates {
            packet.aulist.push(rr);
        }
        packet
    }

    #[test]
    fn update_without_auth_is_refused() {
        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4)]);
        let origin = dn("example.com.");
        let prereq = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("host.example.com."), DnsRRType::A, DnsClass::IN),
            0,
            Some(DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4))),
        );
        let update = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("host.example.com."), DnsRRType::A, DnsClass::IN),
            60,
            Some(DnsRecordData::A(Ipv4Addr::new(9, 9, 9, 9))),
        );
        let query = update_query(&origin, vec![prereq], vec![update]);

        let handler = DdnsHandler::new(DdnsPolicy::AllowList(vec![dn("update-key.")]));
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::Refused);
    }

    #[test]
    fn delete_specific_record_removes_only_that_one() {
        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(5, 6, 7, 8)]);
        let origin = dn("example.com.");
        let update = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("host.example.com."), DnsRRType::A, DnsClass::NONE),
            0,
            Some(DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4))),
        );
        let query = update_query(&origin, vec![], vec![update]);

        let handler = DdnsHandler::new(DdnsPolicy::Open);
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::NoError);

        let remaining = zone.store.lookup(&dn("host")).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].data, Some(DnsRecordData::A(Ipv4Addr::new(5, 6, 7, 8))));
    }

    #[test]
    fn disabled_policy_always_refuses() {
        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4)]);
        let origin = dn("example.com.");
        let query = update_query(&origin, vec![], vec![]);
        let handler = DdnsHandler::new(DdnsPolicy::Disabled);
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::Refused);
    }

    #[test]
    fn rrset_must_exist_prereq_fails_when_absent() {
        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4)]);
        let origin = dn("example.com.");
        let prereq = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("missing.example.com."), DnsRRType::A, DnsClass::ANY),
            0,
            None,
        );
        let query = update_query(&origin, vec![prereq], vec![]);
        let handler = DdnsHandler::new(DdnsPolicy::Open);
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::NXRRSet);
    }

    #[test]
    fn rrset_must_not_exist_prereq_fails_when_present() {
        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4)]);
        let origin = dn("example.com.");
        let prereq = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("host.example.com."), DnsRRType::A, DnsClass::NONE),
            0,
            None,
        );
        let query = update_query(&origin, vec![prereq], vec![]);
        let handler = DdnsHandler::new(DdnsPolicy::Open);
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::YXRRSet);
    }

    #[test]
    fn name_must_exist_prereq_fails_on_nxdomain() {
        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4)]);
        let origin = dn("example.com.");
        let prereq = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("ghost.example.com."), DnsRRType::ANY, DnsClass::ANY),
            0,
            None,
        );
        let query = update_query(&origin, vec![prereq], vec![]);
        let handler = DdnsHandler::new(DdnsPolicy::Open);
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::NXDomain);
    }

    #[test]
    fn allow_list_authorizes_a_matching_tsig_key() {
        use crate::dns::tsig::{TsigContext, TsigKey};

        let zone = zone_with(vec![Ipv4Addr::new(1, 2, 3, 4)]);
        let origin = dn("example.com.");
        let update = DnsResourceRecord::new(
            DnsRRHead::with_class(dn("host.example.com."), DnsRRType::A, DnsClass::IN),
            60,
            Some(DnsRecordData::A(Ipv4Addr::new(9, 9, 9, 9))),
        );
        let mut query = update_query(&origin, vec![], vec![update]);
        query.tsigctx = Some(TsigContext {
            key: TsigKey::new_hmac_md5(dn("update-key."), b"secret".to_vec()),
            prev_mac: Vec::new(),
            error_code: 0,
        });

        let handler = DdnsHandler::new(DdnsPolicy::AllowList(vec![dn("update-key.")]));
        let response = handler.handle_update(&zone, &query);
        assert_eq!(response.rescode, DnsRCode::NoError);
    }
}
