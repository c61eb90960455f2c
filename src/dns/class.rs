use num_derive::{FromPrimitive, ToPrimitive};

#[allow(dead_code)]
#[derive(FromPrimitive, ToPrimitive, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DnsClass {
    // 0: Reserved (RFC 6895)
    // 1: INternet - Basically the only actually used DNS Class
    IN = 1,
    // 2: CSnet - Obsolete when the DNS standard was published and not even
    //    listed by IANA.
    CS = 2,
    // 3: CHaos - IANA has this listed, but they cite a paper, not an RFC.
    CH = 3,
    // 4: HeSiod - Same deal as CHaos.
    HS = 4,
    // 254: NONE - Used to differentiate nonexistant RRsets from empty
    //      (zero-length) ones in Update operations. (RFC 2136)
    NONE = 254,
    // 255: ANY - Only valid in queries, means that the client is asking for any
    //      DNS records regardless of class.
    ANY = 255,
}

impl DnsClass {
    pub fn to_u16(&self) -> u16 {
        self.to_u16_checked().expect("DnsClass always fits in u16")
    }

    fn to_u16_checked(&self) -> Option<u16> {
        num_traits::ToPrimitive::to_u16(self)
    }

    pub fn from_u16(val: u16) -> Option<DnsClass> {
        num_traits::FromPrimitive::from_u16(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_known_values() {
        assert_eq!(DnsClass::from_u16(1), Some(DnsClass::IN));
        assert_eq!(DnsClass::from_u16(254), Some(DnsClass::NONE));
        assert_eq!(DnsClass::from_u16(255), Some(DnsClass::ANY));
        assert_eq!(DnsClass::IN.to_u16(), 1);
    }

    #[test]
    fn rejects_unknown_values() {
        assert_eq!(DnsClass::from_u16(0), None);
        assert_eq!(DnsClass::from_u16(5), None);
    }
}
