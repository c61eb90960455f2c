use num_derive::{FromPrimitive, ToPrimitive};

#[allow(dead_code)]
#[derive(FromPrimitive, ToPrimitive, Copy, Clone, PartialEq, Eq, Debug)]
pub enum DnsRCode {
    // 0: No error
    NoError = 0,
    // 1: Format error - NS couldn't interpret query
    FormError = 1,
    // 2: Server failure - NS couldn't process query
    ServFail = 2,
    // 3: Name error - The domain does not exist
    NXDomain = 3,
    // 4: Not Implemented - The requested operation can't be done by this NS
    NotImp = 4,
    // 5: Refused - Namserver refused operation for an unspecified reason
    Refused = 5,
    // 6: Name exists when it should not (RFC 2136 prerequisites)
    YXDomain = 6,
    // 7: RR set exists when it should not
    YXRRSet = 7,
    // 8: RR set that should exist does not
    NXRRSet = 8,
    // 9: Server not authoritative for the zone / not authorized (TSIG)
    NotAuth = 9,
    // 10: Name not contained in the zone specified
    NotZone = 10,
    // 11: DSO-Type Not Implemented (RFC 8490)
    DSOTypeNI = 11,
    // 12-15 are reserved
    // 16-18: extended RCodes, carried in a TSIG RR's error field rather than
    // the 4-bit header RCode (RFC 2845).
    BadSig = 16,
    BadKey = 17,
    BadTime = 18,
}

impl DnsRCode {
    pub fn to_u16(&self) -> u16 {
        num_traits::ToPrimitive::to_u16(self).expect("DnsRCode always fits in u16")
    }

    pub fn from_u16(val: u16) -> Option<DnsRCode> {
        num_traits::FromPrimitive::from_u16(val)
    }

    /// The low 4 bits stored in the header RCode field. Extended codes
    /// (16-18) can't be represented there; callers needing them use the
    /// TSIG RR's error field instead and leave the header RCode as NoError.
    pub fn to_header_bits(&self) -> u8 {
        (self.to_u16() & 0xf) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_known_values() {
        assert_eq!(DnsRCode::from_u16(0), Some(DnsRCode::NoError));
        assert_eq!(DnsRCode::from_u16(3), Some(DnsRCode::NXDomain));
        assert_eq!(DnsRCode::from_u16(16), Some(DnsRCode::BadSig));
        assert_eq!(DnsRCode::BadTime.to_u16(), 18);
    }

    #[test]
    fn rejects_reserved_values() {
        assert_eq!(DnsRCode::from_u16(12), None);
    }

    #[test]
    fn header_bits_truncate_extended_codes() {
        assert_eq!(DnsRCode::BadSig.to_header_bits(), 0);
        assert_eq!(DnsRCode::NXDomain.to_header_bits(), 3);
    }
}
