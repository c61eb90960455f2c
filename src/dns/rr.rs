use std::collections::HashSet;

use crate::dns::class::DnsClass;
use crate::dns::names::DomainName;
use crate::dns::rdata::DnsRecordData;
use crate::dns::rrtype::DnsRRType;

/// `(name, rtype, rclass)` -- identifies an RRset. `rclass` defaults to `IN`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DnsRRHead {
    pub name: DomainName,
    pub rtype: DnsRRType,
    pub rclass: DnsClass,
}

impl DnsRRHead {
    pub fn new(name: DomainName, rtype: DnsRRType) -> DnsRRHead {
        DnsRRHead {
            name,
            rtype,
            rclass: DnsClass::IN,
        }
    }

    pub fn with_class(name: DomainName, rtype: DnsRRType, rclass: DnsClass) -> DnsRRHead {
        DnsRRHead {
            name,
            rtype,
            rclass,
        }
    }
}

/// `(head, ttl, data, flags)`. `flags` is a free-form annotation set carried
/// for storage bookkeeping (e.g. marking a record as dynamically added by
/// DDNS) and never appears on the wire.
#[derive(Clone, Debug)]
pub struct DnsResourceRecord {
    pub head: DnsRRHead,
    pub ttl: u32,
    pub data: Option<DnsRecordData>,
    pub flags: HashSet<String>,
}

impl DnsResourceRecord {
    pub fn new(head: DnsRRHead, ttl: u32, data: Option<DnsRecordData>) -> DnsResourceRecord {
        DnsResourceRecord {
            head,
            ttl,
            data,
            flags: HashSet::new(),
        }
    }

    /// `(head, data)` equality -- the key used by the spec's "de-dup by
    /// (head, data)" merge rule. Deliberately ignores `ttl` and `flags`, so
    /// two copies of the same answer with different remaining TTLs are
    /// still considered duplicates.
    pub fn same_key(&self, other: &DnsResourceRecord) -> bool {
        self.head == other.head && self.data == other.data
    }

    pub fn rootify(self, origin: &DomainName) -> DnsResourceRecord {
        let name = if self.head.name.is_rooted() {
            self.head.name
        } else {
            self.head
                .name
                .concat(origin)
                .unwrap_or_else(|_| DomainName::root())
        };
        let data = self.data.map(|d| d.rootify(origin));
        DnsResourceRecord {
            head: DnsRRHead {
                name,
                rtype: self.head.rtype,
                rclass: self.head.rclass,
            },
            ttl: self.ttl,
            data,
            flags: self.flags,
        }
    }
}
