// Message-level wire codec: the 12-byte header, each section, and
// pointer-based name compression (§4.1). `Encoder`/`Decoder` are the two
// halves of this; `encode`/`decode` drive them over a whole `DnsPacket`.

use std::collections::{HashMap, HashSet};

use crate::dns::bigendians;
use crate::dns::class::DnsClass;
use crate::dns::errors::DnsFormatError;
use crate::dns::flags::PacketFlags;
use crate::dns::names::DomainName;
use crate::dns::opcode::DnsOpcode;
use crate::dns::packet::DnsPacket;
use crate::dns::question::DnsQuestion;
use crate::dns::rcode::DnsRCode;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
use crate::dns::rrtype::DnsRRType;

/// A pointer offset beyond this point can't be represented in the 14-bit
/// pointer field, so names first seen at or past it are never recorded for
/// future compression (but are still written out in full).
const MAX_COMPRESSION_OFFSET: usize = 16384;

/// Bounds how many times name decoding may follow a compression pointer
/// before giving up. Combined with the visited-offset set below, this
/// rejects both self-loops and long pointer chains an attacker could use to
/// waste CPU.
const MAX_POINTER_HOPS: usize = 128;

pub struct Encoder {
    buf: Vec<u8>,
    name_offsets: HashMap<DomainName, usize>,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder {
            buf: Vec::new(),
            name_offsets: HashMap::new(),
        }
    }

    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&bigendians::from_u16(val));
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&bigendians::from_u32(val));
    }

    pub fn write_u48(&mut self, val: u64) {
        self.buf.extend_from_slice(&bigendians::from_u48(val));
    }

    pub fn write_lstr(&mut self, data: &[u8]) {
        self.buf.push(data.len() as u8);
        self.buf.extend_from_slice(data);
    }

    pub fn write_llstr(&mut self, data: &[u8]) {
        self.write_u16(data.len() as u16);
        self.buf.extend_from_slice(data);
    }

    /// Writes a (possibly compressed) domain name, recording each suffix
    /// seen so later names can point back to it.
    pub fn write_name(&mut self, name: &DomainName) {
        let mut remaining = name.clone();
        loop {
            if remaining.is_empty() {
                self.buf.push(0);
                return;
            }
            if let Some(&offset) = self.name_offsets.get(&remaining) {
                let pointer = 0xc000u16 | (offset as u16);
                self.write_u16(pointer);
                return;
            }
            let offset = self.buf.len();
            if offset < MAX_COMPRESSION_OFFSET {
                self.name_offsets.insert(remaining.clone(), offset);
            }
            let label = &remaining.labels()[0];
            self.buf.push(label.len() as u8);
            self.buf.extend_from_slice(label);
            remaining = remaining.suffix(remaining.len() - 1);
        }
    }
}

pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Decoder<'a> {
        Decoder { bytes, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn take_raw(&mut self, len: usize) -> Result<&'a [u8], DnsFormatError> {
        if self.pos + len > self.bytes.len() {
            return Err(DnsFormatError::make_error(format!(
                "unexpected end of packet reading {} bytes at offset {}",
                len, self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> Result<u16, DnsFormatError> {
        Ok(bigendians::to_u16(self.take_raw(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DnsFormatError> {
        Ok(bigendians::to_u32(self.take_raw(4)?))
    }

    pub fn read_u48(&mut self) -> Result<u64, DnsFormatError> {
        Ok(bigendians::to_u48(self.take_raw(6)?))
    }

    pub fn read_lstr(&mut self) -> Result<Vec<u8>, DnsFormatError> {
        let len = self.take_raw(1)?[0] as usize;
        Ok(self.take_raw(len)?.to_vec())
    }

    pub fn read_llstr(&mut self) -> Result<Vec<u8>, DnsFormatError> {
        let len = self.read_u16()? as usize;
        Ok(self.take_raw(len)?.to_vec())
    }

    /// Reads a domain name starting at the current position, following any
    /// compression pointers, and advances the position past the name (or
    /// past the 2-byte pointer that terminates it).
    pub fn read_name(&mut self) -> Result<DomainName, DnsFormatError> {
        let mut visited = HashSet::new();
        let (labels, end_pos) = self.read_name_at(self.pos, &mut visited, 0)?;
        self.pos = end_pos;
        DomainName::from_labels(labels, true)
            .map_err(|e| DnsFormatError::make_error(format!("invalid name in packet: {}", e)))
    }

    fn read_name_at(
        &self,
        start: usize,
        visited: &mut HashSet<usize>,
        hops: usize,
    ) -> Result<(Vec<Vec<u8>>, usize), DnsFormatError> {
        if hops > MAX_POINTER_HOPS {
            return Err(DnsFormatError::make_error(
                "name decoding exceeded maximum pointer hops".to_string(),
            ));
        }
        let mut labels = Vec::new();
        let mut pos = start;
        loop {
            if pos >= self.bytes.len() {
                return Err(DnsFormatError::make_error(format!(
                    "reached end of packet parsing label at offset {}",
                    pos
                )));
            }
            let len_byte = self.bytes[pos];
            match (len_byte >> 6) & 0b11 {
                0b11 => {
                    if pos + 1 >= self.bytes.len() {
                        return Err(DnsFormatError::make_error(
                            "truncated compression pointer".to_string(),
                        ));
                    }
                    let pointer =
                        (((len_byte & 0x3f) as usize) << 8) | (self.bytes[pos + 1] as usize);
                    if !visited.insert(pointer) {
                        return Err(DnsFormatError::make_error(format!(
                            "compression pointer loop at offset {}",
                            pointer
                        )));
                    }
                    let (mut rest, _) = self.read_name_at(pointer, visited, hops + 1)?;
                    labels.append(&mut rest);
                    pos += 2;
                    return Ok((labels, pos));
                }
                0b00 => {
                    let length = len_byte as usize;
                    pos += 1;
                    if length == 0 {
                        return Ok((labels, pos));
                    }
                    if pos + length > self.bytes.len() {
                        return Err(DnsFormatError::make_error(
                            "label length overruns packet".to_string(),
                        ));
                    }
                    labels.push(self.bytes[pos..pos + length].to_vec());
                    pos += length;
                }
                _ => {
                    return Err(DnsFormatError::make_error(
                        "unsupported label length encoding".to_string(),
                    ))
                }
            }
        }
    }
}

fn encode_flags(packet: &DnsPacket) -> [u8; 2] {
    let mut byte0 = 0u8;
    if packet.flags.contains(PacketFlags::RESP) {
        byte0 |= 0b1000_0000;
    }
    byte0 |= ((packet.opcode.to_u16() as u8) & 0x0f) << 3;
    if packet.flags.contains(PacketFlags::AUTH) {
        byte0 |= 0b0000_0100;
    }
    if packet.flags.contains(PacketFlags::TRUNC) {
        byte0 |= 0b0000_0010;
    }
    if packet.flags.contains(PacketFlags::RECURSE) {
        byte0 |= 0b0000_0001;
    }

    let mut byte1 = 0u8;
    if packet.flags.contains(PacketFlags::RECURSED) {
        byte1 |= 0b1000_0000;
    }
    if packet.flags.contains(PacketFlags::ISAUTHEN) {
        byte1 |= 0b0010_0000;
    }
    if packet.flags.contains(PacketFlags::AUTHOK) {
        byte1 |= 0b0001_0000;
    }
    byte1 |= packet.rescode.to_header_bits() & 0x0f;

    [byte0, byte1]
}

fn decode_flags(bytes: [u8; 2]) -> Result<(PacketFlags, DnsOpcode, DnsRCode), DnsFormatError> {
    let mut flags = PacketFlags::empty();
    if (bytes[0] >> 7) & 1 == 1 {
        flags |= PacketFlags::RESP;
    }
    if (bytes[0] >> 2) & 1 == 1 {
        flags |= PacketFlags::AUTH;
    }
    if (bytes[0] >> 1) & 1 == 1 {
        flags |= PacketFlags::TRUNC;
    }
    if bytes[0] & 1 == 1 {
        flags |= PacketFlags::RECURSE;
    }
    if (bytes[1] >> 7) & 1 == 1 {
        flags |= PacketFlags::RECURSED;
    }
    if (bytes[1] >> 5) & 1 == 1 {
        flags |= PacketFlags::ISAUTHEN;
    }
    if (bytes[1] >> 4) & 1 == 1 {
        flags |= PacketFlags::AUTHOK;
    }

    let opcode_val = (bytes[0] >> 3) & 0x0f;
    let opcode = DnsOpcode::from_u16(opcode_val as u16).ok_or_else(|| {
        DnsFormatError::make_error(format!("invalid opcode value {:#x}", opcode_val))
    })?;
    let rcode_val = bytes[1] & 0x0f;
    let rescode = DnsRCode::from_u16(rcode_val as u16).ok_or_else(|| {
        DnsFormatError::make_error(format!("invalid rcode value {:#x}", rcode_val))
    })?;

    Ok((flags, opcode, rescode))
}

fn encode_question(encoder: &mut Encoder, question: &DnsQuestion) {
    encoder.write_name(&question.qname);
    encoder.write_u16(question.qtype.to_u16());
    encoder.write_u16(question.qclass.to_u16());
}

fn decode_question(decoder: &mut Decoder) -> Result<DnsQuestion, DnsFormatError> {
    let qname = decoder.read_name()?;
    let qtype = DnsRRType::from_u16(decoder.read_u16()?);
    let qclass_val = decoder.read_u16()?;
    let qclass = DnsClass::from_u16(qclass_val).ok_or_else(|| {
        DnsFormatError::make_error(format!("invalid question class {:#x}", qclass_val))
    })?;
    Ok(DnsQuestion::new(qname, qtype, qclass))
}

fn encode_rr(encoder: &mut Encoder, rr: &DnsResourceRecord) {
    encoder.write_name(&rr.head.name);
    encoder.write_u16(rr.head.rtype.to_u16());
    encoder.write_u16(rr.head.rclass.to_u16());
    encoder.write_u32(rr.ttl);

    // rdlength is only known once the data is encoded, so reserve its slot,
    // encode into a scratch buffer sharing this encoder's compression
    // table, then splice the result and patch the length back in.
    let rdlen_pos = encoder.pos();
    encoder.write_u16(0);
    let rdata_start = encoder.pos();
    if let Some(data) = &rr.data {
        data.encode(encoder);
    }
    let rdlen = (encoder.pos() - rdata_start) as u16;
    let patched = bigendians::from_u16(rdlen);
    encoder.buf[rdlen_pos] = patched[0];
    encoder.buf[rdlen_pos + 1] = patched[1];
}

fn decode_rr(decoder: &mut Decoder) -> Result<DnsResourceRecord, DnsFormatError> {
    let name = decoder.read_name()?;
    let rtype = DnsRRType::from_u16(decoder.read_u16()?);
    let rclass_val = decoder.read_u16()?;
    let rclass = DnsClass::from_u16(rclass_val).ok_or_else(|| {
        DnsFormatError::make_error(format!("invalid rr class {:#x}", rclass_val))
    })?;
    let ttl = decoder.read_u32()?;
    let rdlength = decoder.read_u16()?;
    let data = if rdlength == 0 {
        None
    } else {
        Some(DnsRecordData::decode(decoder, &rtype, rdlength)?)
    };
    let head = DnsRRHead::with_class(name, rtype, rclass);
    Ok(DnsResourceRecord::new(head, ttl, data))
}

/// Encodes a packet. Re-encoding a decoded packet need not be byte-identical
/// to the original (compression layout may legitimately differ) but must
/// decode back to an equal packet.
pub fn encode(packet: &DnsPacket) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_u16(packet.qid);
    encoder.write_raw(&encode_flags(packet));
    encoder.write_u16(packet.qlist.len() as u16);
    encoder.write_u16(packet.anlist.len() as u16);
    encoder.write_u16(packet.aulist.len() as u16);
    encoder.write_u16(packet.adlist.len() as u16);

    for question in &packet.qlist {
        encode_question(&mut encoder, question);
    }
    for rr in &packet.anlist {
        encode_rr(&mut encoder, rr);
    }
    for rr in &packet.aulist {
        encode_rr(&mut encoder, rr);
    }
    for rr in &packet.adlist {
        encode_rr(&mut encoder, rr);
    }

    encoder.into_bytes()
}

/// Decodes a packet, failing with `malformed-packet` semantics (qid attached
/// when the header was readable) on any header, label, or rdata-length
/// inconsistency.
pub fn decode(bytes: &[u8]) -> Result<DnsPacket, DnsFormatError> {
    if bytes.len() < 12 {
        return Err(DnsFormatError::make_error(format!(
            "packet shorter than header: {} bytes",
            bytes.len()
        )));
    }

    let mut decoder = Decoder::new(bytes);
    let qid = decoder.read_u16().map_err(|e| e)?;
    let flag_bytes = decoder.take_raw(2)?;
    let (flags, opcode, rescode) = decode_flags([flag_bytes[0], flag_bytes[1]])
        .map_err(|e| DnsFormatError::make_error(e.message().to_string()).with_qid(qid))?;
    let qdcount = decoder.read_u16().map_err(|e| attach_qid(e, qid))?;
    let ancount = decoder.read_u16().map_err(|e| attach_qid(e, qid))?;
    let nscount = decoder.read_u16().map_err(|e| attach_qid(e, qid))?;
    let arcount = decoder.read_u16().map_err(|e| attach_qid(e, qid))?;

    let mut qlist = Vec::with_capacity(qdcount as usize);
    for _ in 0..qdcount {
        qlist.push(decode_question(&mut decoder).map_err(|e| attach_qid(e, qid))?);
    }
    let mut anlist = Vec::with_capacity(ancount as usize);
    for _ in 0..ancount {
        anlist.push(decode_rr(&mut decoder).map_err(|e| attach_qid(e, qid))?);
    }
    let mut aulist = Vec::with_capacity(nscount as usize);
    for _ in 0..nscount {
        aulist.push(decode_rr(&mut decoder).map_err(|e| attach_qid(e, qid))?);
    }
    let mut adlist = Vec::with_capacity(arcount as usize);
    for _ in 0..arcount {
        adlist.push(decode_rr(&mut decoder).map_err(|e| attach_qid(e, qid))?);
    }

    Ok(DnsPacket {
        qid,
        flags,
        opcode,
        rescode,
        qlist,
        anlist,
        aulist,
        adlist,
        addr: None,
        signed: false,
        tsigctx: None,
    })
}

fn attach_qid(err: DnsFormatError, qid: u16) -> DnsFormatError {
    DnsFormatError::make_error(err.message().to_string()).with_qid(qid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::class::DnsClass;

    fn query(qid: u16, name: &str) -> DnsPacket {
        let question = DnsQuestion::new(DomainName::from_str(name).unwrap(), DnsRRType::A, DnsClass::IN);
        DnsPacket::query(qid, question)
    }

    #[test]
    fn header_matches_scenario_1() {
        let packet = query(0x1234, "example.com.");
        let bytes = encode(&packet);
        assert_eq!(
            &bytes[0..12],
            &[0x12, 0x34, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn decode_of_encode_reproduces_query() {
        let packet = query(0x1234, "example.com.");
        let bytes = encode(&packet);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.qid, packet.qid);
        assert_eq!(decoded.qlist, packet.qlist);
        assert_eq!(decoded.anlist.len(), 0);
    }

    #[test]
    fn repeated_name_compresses() {
        use crate::dns::rdata::DnsRecordData;
        use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
        use std::net::Ipv4Addr;

        let mut packet = query(1, "www.example.com.");
        packet.add_answer(DnsResourceRecord::new(
            DnsRRHead::new(DomainName::from_str("www.example.com.").unwrap(), DnsRRType::A),
            60,
            Some(DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4))),
        ));
        packet.add_answer(DnsResourceRecord::new(
            DnsRRHead::new(DomainName::from_str("www.example.com.").unwrap(), DnsRRType::A),
            60,
            Some(DnsRecordData::A(Ipv4Addr::new(5, 6, 7, 8))),
        ));
        let bytes = encode(&packet);

        let mut uncompressed_estimate = 0;
        uncompressed_estimate += "www.example.com.".len() + 1; // labels+terminator, rough
        assert!(bytes.len() < 2 * (uncompressed_estimate + 32));

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.anlist.len(), 2);
        assert_eq!(decoded.anlist[0].head.name, decoded.anlist[1].head.name);
    }

    #[test]
    fn malformed_header_length_fails() {
        let bytes = [0u8; 4];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn pointer_loop_is_rejected() {
        // A header claiming one answer whose name is a pointer to itself.
        let mut bytes = vec![0u8; 12];
        bytes[7] = 1; // ancount = 1
        let rr_start = bytes.len();
        // Pointer pointing at rr_start itself: 0xc0 | high bits, low byte = offset
        let offset = rr_start as u16;
        bytes.push(0xc0 | ((offset >> 8) as u8));
        bytes.push((offset & 0xff) as u8);
        bytes.extend_from_slice(&[0, 1]); // type A
        bytes.extend_from_slice(&[0, 1]); // class IN
        bytes.extend_from_slice(&[0, 0, 0, 60]); // ttl
        bytes.extend_from_slice(&[0, 4]); // rdlength
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        assert!(decode(&bytes).is_err());
    }
}
