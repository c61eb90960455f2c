// RR type registry. Most of the IANA-assigned numbers are listed here even
// though only a handful have a field schema in `rdata.rs`; everything else
// round-trips as an opaque blob (see `DnsRecordData::Other`), matching the
// "unknown rtype decodes as opaque bytes" rule.
// See: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml

#[allow(dead_code)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DnsRRType {
    A,
    NS,
    MD,
    MF,
    CNAME,
    SOA,
    MB,
    MG,
    MR,
    NULL,
    WKS,
    PTR,
    HINFO,
    MINFO,
    MX,
    TXT,
    RP,
    AFSDB,
    X25,
    ISDN,
    RT,
    NSAP,
    NSAPPTR,
    SIG,
    KEY,
    PX,
    GPOS,
    AAAA,
    LOC,
    NXT,
    EID,
    NIMLOC,
    SRV,
    ATMA,
    NAPTR,
    KX,
    CERT,
    A6,
    DNAME,
    SINK,
    OPT,
    APL,
    DS,
    SSHFP,
    IPSECKEY,
    RRSIG,
    NSEC,
    DNSKEY,
    DHCID,
    NSEC3,
    NSEC3PARAM,
    TLSA,
    SMIMEA,
    HIP,
    NINFO,
    RKEY,
    TALINK,
    CDS,
    CDNSKEY,
    OPENPGPKEY,
    CSYNC,
    ZONEMD,
    SPF,
    UINFO,
    UID,
    GID,
    UNSPEC,
    NID,
    L32,
    L64,
    LP,
    EUI48,
    EUI64,
    TKEY,
    TSIG,
    IXFR,
    AXFR,
    MAILB,
    MAILA,
    /// QTANY (255): the wildcard "all types" used in queries and DDNS
    /// prerequisites, never valid on a stored RR.
    ANY,
    URI,
    CAA,
    AVC,
    DOA,
    AMTRELAY,
    TA,
    DLV,
    /// Any rtype not enumerated above. Carries the raw code so it can still
    /// be re-encoded verbatim.
    Unknown(u16),
}

impl DnsRRType {
    pub fn to_u16(&self) -> u16 {
        match self {
            DnsRRType::A => 1,
            DnsRRType::NS => 2,
            DnsRRType::MD => 3,
            DnsRRType::MF => 4,
            DnsRRType::CNAME => 5,
            DnsRRType::SOA => 6,
            DnsRRType::MB => 7,
            DnsRRType::MG => 8,
            DnsRRType::MR => 9,
            DnsRRType::NULL => 10,
            DnsRRType::WKS => 11,
            DnsRRType::PTR => 12,
            DnsRRType::HINFO => 13,
            DnsRRType::MINFO => 14,
            DnsRRType::MX => 15,
            DnsRRType::TXT => 16,
            DnsRRType::RP => 17,
            DnsRRType::AFSDB => 18,
            DnsRRType::X25 => 19,
            DnsRRType::ISDN => 20,
            DnsRRType::RT => 21,
            DnsRRType::NSAP => 22,
            DnsRRType::NSAPPTR => 23,
            DnsRRType::SIG => 24,
            DnsRRType::KEY => 25,
            DnsRRType::PX => 26,
            DnsRRType::GPOS => 27,
            DnsRRType::AAAA => 28,
            DnsRRType::LOC => 29,
            DnsRRType::NXT => 30,
            DnsRRType::EID => 31,
            DnsRRType::NIMLOC => 32,
            DnsRRType::SRV => 33,
            DnsRRType::ATMA => 34,
            DnsRRType::NAPTR => 35,
            DnsRRType::KX => 36,
            DnsRRType::CERT => 37,
            DnsRRType::A6 => 38,
            DnsRRType::DNAME => 39,
            DnsRRType::SINK => 40,
            DnsRRType::OPT => 41,
            DnsRRType::APL => 42,
            DnsRRType::DS => 43,
            DnsRRType::SSHFP => 44,
            DnsRRType::IPSECKEY => 45,
            DnsRRType::RRSIG => 46,
            DnsRRType::NSEC => 47,
            DnsRRType::DNSKEY => 48,
            DnsRRType::DHCID => 49,
            DnsRRType::NSEC3 => 50,
            DnsRRType::NSEC3PARAM => 51,
            DnsRRType::TLSA => 52,
            DnsRRType::SMIMEA => 53,
            DnsRRType::HIP => 55,
            DnsRRType::NINFO => 56,
            DnsRRType::RKEY => 57,
            DnsRRType::TALINK => 58,
            DnsRRType::CDS => 59,
            DnsRRType::CDNSKEY => 60,
            DnsRRType::OPENPGPKEY => 61,
            DnsRRType::CSYNC => 62,
            DnsRRType::ZONEMD => 63,
            DnsRRType::SPF => 99,
            DnsRRType::UINFO => 100,
            DnsRRType::UID => 101,
            DnsRRType::GID => 102,
            DnsRRType::UNSPEC => 103,
            DnsRRType::NID => 104,
            DnsRRType::L32 => 105,
            DnsRRType::L64 => 106,
            DnsRRType::LP => 107,
            DnsRRType::EUI48 => 108,
            DnsRRType::EUI64 => 109,
            DnsRRType::TKEY => 249,
            DnsRRType::TSIG => 250,
            DnsRRType::IXFR => 251,
            DnsRRType::AXFR => 252,
            DnsRRType::MAILB => 253,
            DnsRRType::MAILA => 254,
            DnsRRType::ANY => 255,
            DnsRRType::URI => 256,
            DnsRRType::CAA => 257,
            DnsRRType::AVC => 258,
            DnsRRType::DOA => 259,
            DnsRRType::AMTRELAY => 260,
            DnsRRType::TA => 32768,
            DnsRRType::DLV => 32769,
            DnsRRType::Unknown(val) => *val,
        }
    }

    pub fn from_u16(val: u16) -> DnsRRType {
        match val {
            1 => DnsRRType::A,
            2 => DnsRRType::NS,
            3 => DnsRRType::MD,
            4 => DnsRRType::MF,
            5 => DnsRRType::CNAME,
            6 => DnsRRType::SOA,
            7 => DnsRRType::MB,
            8 => DnsRRType::MG,
            9 => DnsRRType::MR,
            10 => DnsRRType::NULL,
            11 => DnsRRType::WKS,
            12 => DnsRRType::PTR,
            13 => DnsRRType::HINFO,
            14 => DnsRRType::MINFO,
            15 => DnsRRType::MX,
            16 => DnsRRType::TXT,
            17 => DnsRRType::RP,
            18 => DnsRRType::AFSDB,
            19 => DnsRRType::X25,
            20 => DnsRRType::ISDN,
            21 => DnsRRType::RT,
            22 => DnsRRType::NSAP,
            23 => DnsRRType::NSAPPTR,
            24 => DnsRRType::SIG,
            25 => DnsRRType::KEY,
            26 => DnsRRType::PX,
            27 => DnsRRType::GPOS,
            28 => DnsRRType::AAAA,
            29 => DnsRRType::LOC,
            30 => DnsRRType::NXT,
            31 => DnsRRType::EID,
            32 => DnsRRType::NIMLOC,
            33 => DnsRRType::SRV,
            34 => DnsRRType::ATMA,
            35 => DnsRRType::NAPTR,
            36 => DnsRRType::KX,
            37 => DnsRRType::CERT,
            38 => DnsRRType::A6,
            39 => DnsRRType::DNAME,
            40 => DnsRRType::SINK,
            41 => DnsRRType::OPT,
            42 => DnsRRType::APL,
            43 => DnsRRType::DS,
            44 => DnsRRType::SSHFP,
            45 => DnsRRType::IPSECKEY,
            46 => DnsRRType::RRSIG,
            47 => DnsRRType::NSEC,
            48 => DnsRRType::DNSKEY,
            49 => DnsRRType::DHCID,
            50 => DnsRRType::NSEC3,
            51 => DnsRRType::NSEC3PARAM,
            52 => DnsRRType::TLSA,
            53 => DnsRRType::SMIMEA,
            55 => DnsRRType::HIP,
            56 => DnsRRType::NINFO,
            57 => DnsRRType::RKEY,
            58 => DnsRRType::TALINK,
            59 => DnsRRType::CDS,
            60 => DnsRRType::CDNSKEY,
            61 => DnsRRType::OPENPGPKEY,
            62 => DnsRRType::CSYNC,
            63 => DnsRRType::ZONEMD,
            99 => DnsRRType::SPF,
            100 => DnsRRType::UINFO,
            101 => DnsRRType::UID,
            102 => DnsRRType::GID,
            103 => DnsRRType::UNSPEC,
            104 => DnsRRType::NID,
            105 => DnsRRType::L32,
            106 => DnsRRType::L64,
            107 => DnsRRType::LP,
            108 => DnsRRType::EUI48,
            109 => DnsRRType::EUI64,
            249 => DnsRRType::TKEY,
            250 => DnsRRType::TSIG,
            251 => DnsRRType::IXFR,
            252 => DnsRRType::AXFR,
            253 => DnsRRType::MAILB,
            254 => DnsRRType::MAILA,
            255 => DnsRRType::ANY,
            256 => DnsRRType::URI,
            257 => DnsRRType::CAA,
            258 => DnsRRType::AVC,
            259 => DnsRRType::DOA,
            260 => DnsRRType::AMTRELAY,
            32768 => DnsRRType::TA,
            32769 => DnsRRType::DLV,
            other => DnsRRType::Unknown(other),
        }
    }

    /// True for QTANY (255), the wildcard meaning "all types".
    pub fn is_any(&self) -> bool {
        matches!(self, DnsRRType::ANY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_known_values() {
        assert_eq!(DnsRRType::from_u16(1), DnsRRType::A);
        assert_eq!(DnsRRType::from_u16(250), DnsRRType::TSIG);
        assert_eq!(DnsRRType::A.to_u16(), 1);
        assert_eq!(DnsRRType::TSIG.to_u16(), 250);
    }

    #[test]
    fn unknown_codes_round_trip_through_unknown_variant() {
        let rtype = DnsRRType::from_u16(0xfeed);
        assert_eq!(rtype, DnsRRType::Unknown(0xfeed));
        assert_eq!(rtype.to_u16(), 0xfeed);
    }

    #[test]
    fn any_is_the_wildcard() {
        assert!(DnsRRType::ANY.is_any());
        assert!(!DnsRRType::A.is_any());
    }
}
