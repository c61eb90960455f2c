// Domain name algebra: labels, containment, concatenation/subtraction, and
// canonical wire form. Wire-level compression lives in `wire.rs`; this module
// is purely about the in-memory representation and its operators.

use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug)]
pub enum DomainNameError {
    EmptyLabel,
    IllegalChar(u8),
    LabelTooLong(usize),
    NotWithin,
    AppendToRooted,
}

impl fmt::Display for DomainNameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DomainNameError::EmptyLabel => write!(f, "empty label in domain name"),
            DomainNameError::IllegalChar(c) => {
                write!(f, "illegal character {:#04x} in domain name", c)
            }
            DomainNameError::LabelTooLong(len) => {
                write!(f, "label is {} bytes, maximum is 63", len)
            }
            DomainNameError::NotWithin => write!(f, "name is not within the given suffix"),
            DomainNameError::AppendToRooted => {
                write!(f, "cannot append a name to a rooted domain name")
            }
        }
    }
}

impl Error for DomainNameError {}

/// A hierarchical sequence of labels plus a `rooted` flag indicating whether
/// the name is absolute (carries a trailing dot). Case is preserved for
/// storage and display but ignored for equality, hashing and compression
/// matching.
#[derive(Clone, Debug, Eq)]
pub struct DomainName {
    labels: Vec<Vec<u8>>,
    rooted: bool,
}

impl DomainName {
    pub fn root() -> DomainName {
        DomainName {
            labels: Vec::new(),
            rooted: true,
        }
    }

    pub fn empty() -> DomainName {
        DomainName {
            labels: Vec::new(),
            rooted: false,
        }
    }

    pub fn from_labels(labels: Vec<Vec<u8>>, rooted: bool) -> Result<DomainName, DomainNameError> {
        for label in &labels {
            if label.is_empty() {
                return Err(DomainNameError::EmptyLabel);
            }
            if label.len() > 63 {
                return Err(DomainNameError::LabelTooLong(label.len()));
            }
        }
        Ok(DomainName { labels, rooted })
    }

    /// Parses the dotted textual representation used in zone files and
    /// configuration. An empty component or a byte below `!` (0x21) is
    /// illegal; a trailing dot marks the name rooted.
    pub fn from_str(name: &str) -> Result<DomainName, DomainNameError> {
        if name == "." {
            return Ok(DomainName::root());
        }
        if name.is_empty() {
            return Ok(DomainName::empty());
        }
        let bytes = name.as_bytes();
        let rooted = bytes[bytes.len() - 1] == b'.';
        let body = if rooted { &bytes[..bytes.len() - 1] } else { bytes };
        let mut labels = Vec::new();
        for part in body.split(|b| *b == b'.') {
            if part.is_empty() {
                return Err(DomainNameError::EmptyLabel);
            }
            for c in part {
                if *c < 33 {
                    return Err(DomainNameError::IllegalChar(*c));
                }
            }
            if part.len() > 63 {
                return Err(DomainNameError::LabelTooLong(part.len()));
            }
            labels.push(part.to_vec());
        }
        Ok(DomainName { labels, rooted })
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the trailing `n` labels as their own name, inheriting this
    /// name's rootedness (since the tail always reaches this name's end).
    pub fn suffix(&self, n: usize) -> DomainName {
        let start = self.labels.len() - n;
        DomainName {
            labels: self.labels[start..].to_vec(),
            rooted: self.rooted,
        }
    }

    /// Returns the leading `n` labels, always unrooted (it's a partial name).
    pub fn prefix(&self, n: usize) -> DomainName {
        DomainName {
            labels: self.labels[..n].to_vec(),
            rooted: false,
        }
    }

    /// True iff `origin` is a (label-wise, case-insensitive) suffix of
    /// `self` -- i.e. `self` is a name within the zone `origin`.
    pub fn is_within(&self, origin: &DomainName) -> bool {
        if origin.labels.len() > self.labels.len() {
            return false;
        }
        if origin.labels.is_empty() {
            return origin.rooted == self.rooted;
        }
        self.suffix(origin.labels.len()).label_eq(origin)
    }

    /// Subtracts `origin` from `self`, requiring `self.is_within(origin)`,
    /// and returns the unrooted prefix labels.
    pub fn sub(&self, origin: &DomainName) -> Result<DomainName, DomainNameError> {
        if !self.is_within(origin) {
            return Err(DomainNameError::NotWithin);
        }
        Ok(self.prefix(self.labels.len() - origin.labels.len()))
    }

    /// Concatenates `self` and `other`, requiring `!self.rooted`. The result
    /// inherits `other`'s rooted flag.
    pub fn concat(&self, other: &DomainName) -> Result<DomainName, DomainNameError> {
        if self.rooted {
            return Err(DomainNameError::AppendToRooted);
        }
        let mut labels = self.labels.clone();
        labels.extend(other.labels.iter().cloned());
        Ok(DomainName {
            labels,
            rooted: other.rooted,
        })
    }

    /// Canonical wire form: length-prefixed, ASCII-lowercased labels,
    /// terminated with a zero octet. Used as TSIG/MAC input, never for
    /// message encoding (which additionally compresses).
    pub fn canonical_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for label in &self.labels {
            out.push(label.len() as u8);
            out.extend(label.iter().map(|b| b.to_ascii_lowercase()));
        }
        out.push(0);
        out
    }

    fn label_eq(&self, other: &DomainName) -> bool {
        if self.rooted != other.rooted {
            return false;
        }
        if self.labels.len() != other.labels.len() {
            return false;
        }
        self.labels
            .iter()
            .zip(other.labels.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.label_eq(other)
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rooted.hash(state);
        self.labels.len().hash(state);
        for label in &self.labels {
            for b in label {
                b.to_ascii_lowercase().hash(state);
            }
            0xffu8.hash(state); // label separator so "ab"+"c" != "a"+"bc"
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        let mut first = true;
        for label in &self.labels {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", String::from_utf8_lossy(label))?;
            first = false;
        }
        if self.rooted {
            write!(f, ".")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> DomainName {
        DomainName::from_str(s).unwrap()
    }

    #[test]
    fn parses_rooted_and_unrooted() {
        let rooted = dn("example.com.");
        assert!(rooted.is_rooted());
        assert_eq!(rooted.len(), 2);

        let unrooted = dn("example.com");
        assert!(!unrooted.is_rooted());
        assert_eq!(unrooted.len(), 2);
    }

    #[test]
    fn equality_is_case_insensitive() {
        assert_eq!(dn("Example.COM."), dn("example.com."));
        assert_ne!(dn("example.com."), dn("example.com"));
    }

    #[test]
    fn containment_checks_suffix() {
        let name = dn("www.example.com.");
        let origin = dn("example.com.");
        assert!(name.is_within(&origin));
        assert!(!origin.is_within(&name));
        assert!(!dn("www.other.com.").is_within(&origin));
    }

    #[test]
    fn subtraction_and_concat_roundtrip() {
        let a = dn("www");
        let b = dn("example.com.");
        let joined = a.concat(&b).unwrap();
        assert_eq!(joined, dn("www.example.com."));
        let back = joined.sub(&b).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn concat_requires_unrooted_lhs() {
        let a = dn("www.");
        let b = dn("example.com.");
        assert!(a.concat(&b).is_err());
    }

    #[test]
    fn canonical_wire_is_lowercased_and_terminated() {
        let name = dn("WWW.Example.com.");
        let wire = name.canonical_wire();
        assert_eq!(wire[0], 3);
        assert_eq!(&wire[1..4], b"www");
        assert_eq!(*wire.last().unwrap(), 0);
    }

    #[test]
    fn root_is_within_root_only() {
        let root = DomainName::root();
        assert!(dn("example.com.").is_within(&root));
        assert!(root.is_within(&root));
    }

    #[test]
    fn display_renders_dots() {
        assert_eq!(dn("www.example.com.").to_string(), "www.example.com.");
        assert_eq!(dn("www.example.com").to_string(), "www.example.com");
        assert_eq!(DomainName::root().to_string(), ".");
    }
}
