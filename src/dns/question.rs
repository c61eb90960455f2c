use crate::dns::class::DnsClass;
use crate::dns::names::DomainName;
use crate::dns::rrtype::DnsRRType;

/// A single entry in a packet's question section.
#[derive(Clone, PartialEq, Debug)]
pub struct DnsQuestion {
    pub qname: DomainName,
    pub qtype: DnsRRType,
    pub qclass: DnsClass,
}

impl DnsQuestion {
    pub fn new(qname: DomainName, qtype: DnsRRType, qclass: DnsClass) -> DnsQuestion {
        DnsQuestion {
            qname,
            qtype,
            qclass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_follows_domain_name_case_insensitivity() {
        let a = DnsQuestion::new(
            DomainName::from_str("Example.com.").unwrap(),
            DnsRRType::A,
            DnsClass::IN,
        );
        let b = DnsQuestion::new(
            DomainName::from_str("example.com.").unwrap(),
            DnsRRType::A,
            DnsClass::IN,
        );
        assert_eq!(a, b);
    }
}
