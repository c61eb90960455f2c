use std::error::Error;
use std::fmt;

/// A wire-decode failure. Carries the transaction id when the 12-byte header
/// was read successfully, so the server can still reply FORMERR with a
/// correlatable qid (see `get_error_response` call sites in `server::core`).
#[derive(Debug)]
pub struct DnsFormatError {
    message: String,
    qid: Option<u16>,
}

impl DnsFormatError {
    pub fn make_error(message: String) -> DnsFormatError {
        DnsFormatError { message, qid: None }
    }

    pub fn with_qid(mut self, qid: u16) -> DnsFormatError {
        self.qid = Some(qid);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn qid(&self) -> Option<u16> {
        self.qid
    }
}

impl fmt::Display for DnsFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DNS packet had format error: {}", self.message)
    }
}

impl Error for DnsFormatError {}

/// Errors raised by the iterative resolver walk (§4.3). `ServFail` and
/// `Unreachable` are the two variants the response cache specifically
/// catches and swallows into an empty result; `Protocol` covers everything
/// else a misbehaving peer can do (bad qid, missing resp bit, unexpected
/// rescode).
#[derive(Debug)]
pub enum ResolveError {
    ServFail,
    Unreachable(String),
    Protocol(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::ServFail => write!(f, "upstream nameserver returned SERVFAIL"),
            ResolveError::Unreachable(detail) => write!(f, "nameserver unreachable: {}", detail),
            ResolveError::Protocol(detail) => write!(f, "resolver protocol error: {}", detail),
        }
    }
}

impl Error for ResolveError {}

impl From<DnsFormatError> for ResolveError {
    fn from(err: DnsFormatError) -> ResolveError {
        ResolveError::Protocol(err.message().to_string())
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> ResolveError {
        ResolveError::Unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_carries_qid_when_attached() {
        let err = DnsFormatError::make_error("bad label".to_string()).with_qid(0x1234);
        assert_eq!(err.qid(), Some(0x1234));
        assert_eq!(err.message(), "bad label");
    }

    #[test]
    fn format_error_has_no_qid_by_default() {
        let err = DnsFormatError::make_error("truncated header".to_string());
        assert_eq!(err.qid(), None);
    }
}
