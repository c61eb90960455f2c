// TSIG (RFC 2845): keyed-hash message authentication for DDNS updates.
// Only HMAC-MD5 is implemented, matching the one algorithm the reference
// server this spec distills from supports.

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::dns::class::DnsClass;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::rcode::DnsRCode;
use crate::dns::rdata::{DnsRecordData, TsigData};
use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
use crate::dns::rrtype::DnsRRType;
use crate::dns::wire;

type HmacMd5 = Hmac<Md5>;

/// HMAC-MD5's canonical wire name, the only algorithm on offer here.
pub fn hmac_md5_algorithm_name() -> DomainName {
    DomainName::from_str("hmac-md5.sig-alg.reg.int.").expect("literal algorithm name parses")
}

/// `(name, algo, secret)`.
#[derive(Clone, Debug)]
pub struct TsigKey {
    pub name: DomainName,
    pub algorithm: DomainName,
    pub secret: Vec<u8>,
}

impl TsigKey {
    pub fn new_hmac_md5(name: DomainName, secret: Vec<u8>) -> TsigKey {
        TsigKey {
            name,
            algorithm: hmac_md5_algorithm_name(),
            secret,
        }
    }
}

/// Per-conversation state: the key used, the previous MAC (for chaining a
/// response's signature to the request that provoked it), and the last
/// verification error code (0 on success).
#[derive(Clone, Debug)]
pub struct TsigContext {
    pub key: TsigKey,
    pub prev_mac: Vec<u8>,
    pub error_code: u16,
}

#[derive(Debug, PartialEq)]
pub enum TsigError {
    Missing,
    BadKey,
    BadSig,
    BadTime,
}

impl TsigError {
    pub fn to_rcode(&self) -> DnsRCode {
        match self {
            TsigError::Missing => DnsRCode::FormError,
            TsigError::BadKey => DnsRCode::NotAuth,
            TsigError::BadSig => DnsRCode::NotAuth,
            TsigError::BadTime => DnsRCode::NotAuth,
        }
    }

    /// The extended RFC 2845 error code carried in the TSIG RR's own error
    /// field, distinct from the 4-bit header rcode.
    pub fn extended_code(&self) -> u16 {
        match self {
            TsigError::Missing => 0,
            TsigError::BadKey => 17,
            TsigError::BadSig => 16,
            TsigError::BadTime => 18,
        }
    }
}

/// Appends an unsigned TSIG RR reporting `err` (RFC 2845 §4.5 "TSIG on
/// Answers": a verification failure still gets the TSIG RR echoed back,
/// with an empty MAC and the extended error code set, so the client can
/// tell BADSIG from BADKEY from BADTIME instead of just seeing NOTAUTH).
fn push_error_tsig_rr(
    packet: &mut DnsPacket,
    key_name: &DomainName,
    algorithm: &DomainName,
    orgid: u16,
    err: &TsigError,
    now: u64,
) {
    let tsig_data = DnsRecordData::Tsig(TsigData {
        algo: algorithm.clone(),
        stime: now,
        fudge: 300,
        mac: Vec::new(),
        orgid,
        err: err.extended_code(),
        other: Vec::new(),
    });
    let head = DnsRRHead::with_class(key_name.clone(), DnsRRType::TSIG, DnsClass::ANY);
    packet.adlist.push(DnsResourceRecord::new(head, 0, Some(tsig_data)));
}

fn mac_input(
    packet_without_tsig: &[u8],
    prev_mac: Option<&[u8]>,
    key_name: &DomainName,
    algo: &DomainName,
    stime: u64,
    fudge: u16,
    error: u16,
    other: &[u8],
) -> Vec<u8> {
    let mut input = Vec::new();
    if let Some(mac) = prev_mac {
        input.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        input.extend_from_slice(mac);
    }
    input.extend_from_slice(packet_without_tsig);
    input.extend_from_slice(&key_name.canonical_wire());
    input.extend_from_slice(&DnsClass::ANY.to_u16().to_be_bytes());
    input.extend_from_slice(&0u32.to_be_bytes());
    input.extend_from_slice(&algo.canonical_wire());
    input.extend_from_slice(&crate::dns::bigendians::from_u48(stime));
    input.extend_from_slice(&fudge.to_be_bytes());
    input.extend_from_slice(&error.to_be_bytes());
    input.extend_from_slice(&(other.len() as u16).to_be_bytes());
    input.extend_from_slice(other);
    input
}

fn compute_mac(secret: &[u8], input: &[u8]) -> Vec<u8> {
    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(input);
    mac.finalize().into_bytes().to_vec()
}

/// Compares two MACs without branching on the position of the first
/// mismatch, closing the timing side-channel a plain `==` would open on an
/// authentication tag.
fn mac_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Signs `packet`, appending a synthesized TSIG RR to its additional section
/// and marking it `signed`. `prev_mac` chains a response's signature to the
/// request that provoked it; pass `None` for an unsolicited / initial sign.
pub fn sign(
    packet: &mut DnsPacket,
    key: &TsigKey,
    stime: u64,
    fudge: u16,
    prev_mac: Option<&[u8]>,
) {
    let wire_bytes = wire::encode(packet);
    let input = mac_input(
        &wire_bytes,
        prev_mac,
        &key.name,
        &key.algorithm,
        stime,
        fudge,
        0,
        &[],
    );
    let mac = compute_mac(&key.secret, &input);

    let tsig_data = DnsRecordData::Tsig(TsigData {
        algo: key.algorithm.clone(),
        stime,
        fudge,
        mac,
        orgid: packet.qid,
        err: 0,
        other: Vec::new(),
    });
    let head = DnsRRHead::with_class(key.name.clone(), DnsRRType::TSIG, DnsClass::ANY);
    packet.adlist.push(DnsResourceRecord::new(head, 0, Some(tsig_data)));
    packet.signed = true;
}

/// Verifies a TSIG RR popped from the end of `packet`'s additional section,
/// looking the key up by name in `keys`. On success, returns the MAC and
/// attaches a `TsigContext` to the packet for response chaining. `now`, if
/// nonzero, is checked against the signing time within the RR's fudge.
pub fn verify(
    packet: &mut DnsPacket,
    keys: &[TsigKey],
    now: u64,
) -> Result<Vec<u8>, TsigError> {
    let last = packet.adlist.last().ok_or(TsigError::Missing)?;
    if last.head.rtype != DnsRRType::TSIG || last.head.rclass != DnsClass::ANY {
        return Err(TsigError::Missing);
    }
    let tsig_rr = packet.adlist.pop().unwrap();
    let tsig_name = tsig_rr.head.name.clone();
    let tsig = match &tsig_rr.data {
        Some(DnsRecordData::Tsig(data)) => data.clone(),
        _ => return Err(TsigError::Missing),
    };

    let key = match keys.iter().find(|k| k.name == tsig_name) {
        Some(k) => k,
        None => {
            let err = TsigError::BadKey;
            push_error_tsig_rr(packet, &tsig_name, &tsig.algo, tsig.orgid, &err, now);
            return Err(err);
        }
    };
    if tsig.algo != key.algorithm {
        let err = TsigError::BadKey;
        push_error_tsig_rr(packet, &tsig_name, &tsig.algo, tsig.orgid, &err, now);
        return Err(err);
    }

    let wire_bytes = wire::encode(packet);
    let input = mac_input(
        &wire_bytes,
        None,
        &key.name,
        &key.algorithm,
        tsig.stime,
        tsig.fudge,
        tsig.err,
        &tsig.other,
    );
    let expected_mac = compute_mac(&key.secret, &input);

    if !mac_eq(&expected_mac, &tsig.mac) {
        let err = TsigError::BadSig;
        push_error_tsig_rr(packet, &key.name, &key.algorithm, tsig.orgid, &err, now);
        return Err(err);
    }

    if now != 0 {
        let delta = if now > tsig.stime {
            now - tsig.stime
        } else {
            tsig.stime - now
        };
        if delta > tsig.fudge as u64 {
            let err = TsigError::BadTime;
            push_error_tsig_rr(packet, &key.name, &key.algorithm, tsig.orgid, &err, now);
            return Err(err);
        }
    }

    packet.signed = true;
    packet.tsigctx = Some(TsigContext {
        key: key.clone(),
        prev_mac: tsig.mac.clone(),
        error_code: 0,
    });
    Ok(tsig.mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::question::DnsQuestion;

    fn key() -> TsigKey {
        TsigKey::new_hmac_md5(
            DomainName::from_str("update-key.").unwrap(),
            b"super-secret-shared-key".to_vec(),
        )
    }

    fn query() -> DnsPacket {
        let question = DnsQuestion::new(
            DomainName::from_str("example.com.").unwrap(),
            DnsRRType::A,
            DnsClass::IN,
        );
        DnsPacket::query(1, question)
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let k = key();
        let mut packet = query();
        sign(&mut packet, &k, 1_700_000_000, 300, None);
        assert!(packet.signed);

        let result = verify(&mut packet, &[k], 1_700_000_000);
        assert!(result.is_ok());
        assert!(packet.tsigctx.is_some());
        assert!(packet.adlist.is_empty());
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let signing_key = key();
        let mut packet = query();
        sign(&mut packet, &signing_key, 1_700_000_000, 300, None);

        let other_key = TsigKey::new_hmac_md5(
            DomainName::from_str("update-key.").unwrap(),
            b"a-completely-different-secret".to_vec(),
        );
        let result = verify(&mut packet, &[other_key], 1_700_000_000);
        assert_eq!(result, Err(TsigError::BadSig));

        let error_rr = packet.adlist.last().expect("error TSIG RR attached");
        assert_eq!(error_rr.head.rtype, DnsRRType::TSIG);
        match &error_rr.data {
            Some(DnsRecordData::Tsig(data)) => {
                assert_eq!(data.err, TsigError::BadSig.extended_code());
                assert!(data.mac.is_empty());
            }
            other => panic!("expected TSIG rdata, got {:?}", other),
        }
    }

    #[test]
    fn verify_fails_with_unknown_key_name() {
        let signing_key = key();
        let mut packet = query();
        sign(&mut packet, &signing_key, 1_700_000_000, 300, None);

        let unrelated = TsigKey::new_hmac_md5(
            DomainName::from_str("other-key.").unwrap(),
            b"whatever".to_vec(),
        );
        let result = verify(&mut packet, &[unrelated], 1_700_000_000);
        assert_eq!(result, Err(TsigError::BadKey));
    }

    #[test]
    fn verify_fails_when_outside_fudge_window() {
        let k = key();
        let mut packet = query();
        sign(&mut packet, &k, 1_700_000_000, 5, None);

        let result = verify(&mut packet, &[k], 1_700_001_000);
        assert_eq!(result, Err(TsigError::BadTime));
    }

    #[test]
    fn missing_tsig_rr_is_reported() {
        let mut packet = query();
        let result = verify(&mut packet, &[key()], 0);
        assert_eq!(result, Err(TsigError::Missing));
    }
}
