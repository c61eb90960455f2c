use std::collections::HashSet;
use std::net::IpAddr;

use crate::dns::flags::PacketFlags;
use crate::dns::names::DomainName;
use crate::dns::opcode::DnsOpcode;
use crate::dns::question::DnsQuestion;
use crate::dns::rcode::DnsRCode;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rr::DnsResourceRecord;
use crate::dns::rrtype::DnsRRType;
use crate::dns::tsig::TsigContext;

/// Source/destination address for a server-side packet: `(family, ip, port)`
/// collapsed into the address itself, since `IpAddr` already encodes family.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PacketAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl PacketAddr {
    pub fn new(ip: IpAddr, port: u16) -> PacketAddr {
        PacketAddr { ip, port }
    }
}

/// `(qid, flags, opcode, rescode, qlist, anlist, aulist, adlist, addr,
/// signed, tsigctx)` from §3. `opcode`/`rescode` are pulled out of the
/// boolean flag set since they're small enumerations, not single bits.
#[derive(Clone, Debug)]
pub struct DnsPacket {
    pub qid: u16,
    pub flags: PacketFlags,
    pub opcode: DnsOpcode,
    pub rescode: DnsRCode,
    pub qlist: Vec<DnsQuestion>,
    pub anlist: Vec<DnsResourceRecord>,
    pub aulist: Vec<DnsResourceRecord>,
    pub adlist: Vec<DnsResourceRecord>,
    pub addr: Option<PacketAddr>,
    pub signed: bool,
    pub tsigctx: Option<TsigContext>,
}

impl DnsPacket {
    pub fn new(qid: u16, opcode: DnsOpcode) -> DnsPacket {
        DnsPacket {
            qid,
            flags: PacketFlags::empty(),
            opcode,
            rescode: DnsRCode::NoError,
            qlist: Vec::new(),
            anlist: Vec::new(),
            aulist: Vec::new(),
            adlist: Vec::new(),
            addr: None,
            signed: false,
            tsigctx: None,
        }
    }

    pub fn query(qid: u16, question: DnsQuestion) -> DnsPacket {
        let mut packet = DnsPacket::new(qid, DnsOpcode::Query);
        packet.qlist.push(question);
        packet
    }

    /// Builds a reply echoing `query`'s qid, opcode, question list, and
    /// TSIG context, with `RESP` set and `RECURSE` carried over so the
    /// client can tell its request was understood.
    pub fn response_for(query: &DnsPacket, rescode: DnsRCode) -> DnsPacket {
        let mut flags = PacketFlags::RESP;
        if query.flags.contains(PacketFlags::RECURSE) {
            flags |= PacketFlags::RECURSE;
        }
        if query.flags.contains(PacketFlags::INTERNAL) {
            flags |= PacketFlags::INTERNAL;
        }
        DnsPacket {
            qid: query.qid,
            flags,
            opcode: query.opcode,
            rescode,
            qlist: query.qlist.clone(),
            anlist: Vec::new(),
            aulist: Vec::new(),
            adlist: Vec::new(),
            addr: query.addr,
            signed: false,
            tsigctx: query.tsigctx.clone(),
        }
    }

    pub fn add_question(&mut self, question: DnsQuestion) {
        if !self.qlist.contains(&question) {
            self.qlist.push(question);
        }
    }

    pub fn add_answer(&mut self, rr: DnsResourceRecord) {
        Self::dedup_push(&mut self.anlist, rr);
    }

    pub fn add_authority(&mut self, rr: DnsResourceRecord) {
        Self::dedup_push(&mut self.aulist, rr);
    }

    pub fn add_additional(&mut self, rr: DnsResourceRecord) {
        Self::dedup_push(&mut self.adlist, rr);
    }

    fn dedup_push(list: &mut Vec<DnsResourceRecord>, rr: DnsResourceRecord) {
        if !list.iter().any(|existing| existing.same_key(&rr)) {
            list.push(rr);
        }
    }

    /// The concatenation of answer + authority + additional, in that order.
    pub fn all_rrs(&self) -> Vec<&DnsResourceRecord> {
        self.anlist
            .iter()
            .chain(self.aulist.iter())
            .chain(self.adlist.iter())
            .collect()
    }

    /// Dedup-appends `other`'s answer/authority/additional sections into
    /// this packet. Questions are not merged; a merge combines responses to
    /// the same query, which already shares a question list.
    pub fn merge(&mut self, other: DnsPacket) {
        for rr in other.anlist {
            self.add_answer(rr);
        }
        for rr in other.aulist {
            self.add_authority(rr);
        }
        for rr in other.adlist {
            self.add_additional(rr);
        }
    }

    pub fn get_answer(&self, name: &DomainName, rtype: &DnsRRType) -> Option<&DnsResourceRecord> {
        self.anlist
            .iter()
            .find(|rr| &rr.head.name == name && &rr.head.rtype == rtype)
    }

    /// True iff every question is satisfied: either a matching-rtype answer
    /// exists for its qname, or a CNAME RR for that qname exists whose
    /// target itself resolves within this same packet's answer section.
    pub fn has_answers(&self) -> bool {
        self.qlist
            .iter()
            .all(|q| self.question_satisfied(&q.qname, &q.qtype, &mut HashSet::new()))
    }

    fn question_satisfied(
        &self,
        name: &DomainName,
        rtype: &DnsRRType,
        visited: &mut HashSet<DomainName>,
    ) -> bool {
        if !visited.insert(name.clone()) {
            return false;
        }
        let direct = self
            .anlist
            .iter()
            .any(|rr| &rr.head.name == name && (rtype.is_any() || &rr.head.rtype == rtype));
        if direct {
            return true;
        }
        if let Some(cname_rr) = self
            .anlist
            .iter()
            .find(|rr| &rr.head.name == name && rr.head.rtype == DnsRRType::CNAME)
        {
            if let Some(DnsRecordData::Cname(target)) = &cname_rr.data {
                return self.question_satisfied(target, rtype, visited);
            }
        }
        false
    }
}
