use num_derive::{FromPrimitive, ToPrimitive};

#[allow(dead_code)]
#[derive(FromPrimitive, ToPrimitive, Copy, Clone, PartialEq, Eq, Debug)]
pub enum DnsOpcode {
    // Opcode 0: standard query
    Query = 0,
    // Opcode 1: inverse query (obsoleted by RFC 3425)
    IQuery = 1,
    // Opcode 2: server status request
    Status = 2,
    // 3 reserved for future use
    // Opcode 4: notify of zone change (RFC 1996)
    Zone = 4,
    // Opcode 5: dynamic update to DNS records (RFC 2136)
    Update = 5,
    // Opcode 6: DNS Stateful Operations (RFC 8490)
    DSO = 6,
    // 7-15 reserved for future use
}

impl DnsOpcode {
    pub fn to_u16(&self) -> u16 {
        num_traits::ToPrimitive::to_u16(self).expect("DnsOpcode always fits in u16")
    }

    pub fn from_u16(val: u16) -> Option<DnsOpcode> {
        num_traits::FromPrimitive::from_u16(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_known_values() {
        assert_eq!(DnsOpcode::from_u16(0), Some(DnsOpcode::Query));
        assert_eq!(DnsOpcode::from_u16(5), Some(DnsOpcode::Update));
        assert_eq!(DnsOpcode::Update.to_u16(), 5);
    }

    #[test]
    fn rejects_reserved_values() {
        assert_eq!(DnsOpcode::from_u16(3), None);
    }
}
