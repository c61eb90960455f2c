// Parses a resolv.conf-style configuration (`nameserver`/`domain`/`search`
// lines) and implements the short-query helper that tries each configured
// search suffix before falling back to the bare rooted name.

use std::net::IpAddr;

use rand::Rng;

use crate::dns::class::DnsClass;
use crate::dns::errors::ResolveError;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::question::DnsQuestion;
use crate::dns::rcode::DnsRCode;
use crate::dns::resolver::iterative::send_query;
use crate::dns::rrtype::DnsRRType;

#[derive(Clone, Debug, Default)]
pub struct SystemResolverConfig {
    pub nameservers: Vec<IpAddr>,
    pub search: Vec<DomainName>,
}

impl SystemResolverConfig {
    /// Parses `nameserver <ip>` and `domain`/`search <suffix...>` lines.
    /// Unrecognized lines and malformed entries are skipped rather than
    /// failing the whole file.
    pub fn parse(text: &str) -> SystemResolverConfig {
        let mut nameservers = Vec::new();
        let mut search = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("nameserver") => {
                    if let Some(addr) = parts.next().and_then(|s| s.parse::<IpAddr>().ok()) {
                        nameservers.push(addr);
                    }
                }
                Some("domain") | Some("search") => {
                    for suffix in parts {
                        if let Ok(name) = DomainName::from_str(&ensure_trailing_dot(suffix)) {
                            search.push(name);
                        }
                    }
                }
                _ => {}
            }
        }

        SystemResolverConfig { nameservers, search }
    }
}

fn ensure_trailing_dot(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

pub struct SystemResolver {
    pub config: SystemResolverConfig,
    pub retries: u32,
    pub timeout_ms: u64,
}

impl SystemResolver {
    pub fn new(config: SystemResolverConfig) -> SystemResolver {
        SystemResolver {
            config,
            retries: 2,
            timeout_ms: 2000,
        }
    }

    /// Tries `name + suffix` for each configured search suffix, finally
    /// `name + root`, against each configured nameserver in turn. Returns
    /// the first response with rescode 0, or the last response/error tried.
    pub fn squery(&self, name: &DomainName, rtype: DnsRRType) -> Result<DnsPacket, ResolveError> {
        if self.config.nameservers.is_empty() {
            return Err(ResolveError::Unreachable(
                "no nameservers configured".to_string(),
            ));
        }

        let mut suffixes: Vec<DomainName> = self.config.search.clone();
        suffixes.push(DomainName::root());

        let mut last_result: Option<Result<DnsPacket, ResolveError>> = None;
        for suffix in &suffixes {
            let qname = match name.concat(suffix) {
                Ok(n) => n,
                Err(_) => continue,
            };
            let question = DnsQuestion::new(qname, rtype, DnsClass::IN);
            let qid = rand::thread_rng().gen();
            let query = DnsPacket::query(qid, question);

            for ns in &self.config.nameservers {
                let addr = std::net::SocketAddr::new(*ns, 53);
                let result = send_query(&query, addr, self.retries, self.timeout_ms);
                let is_success = matches!(&result, Ok(r) if r.rescode == DnsRCode::NoError);
                last_result = Some(result);
                if is_success {
                    return last_result.unwrap();
                }
            }
        }

        last_result.unwrap_or_else(|| Err(ResolveError::Unreachable("no suffixes tried".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nameserver_and_search_lines() {
        let text = "nameserver 8.8.8.8\nsearch example.com corp.internal\n";
        let config = SystemResolverConfig::parse(text);
        assert_eq!(config.nameservers, vec!["8.8.8.8".parse::<IpAddr>().unwrap()]);
        assert_eq!(config.search.len(), 2);
        assert_eq!(config.search[0], DomainName::from_str("example.com.").unwrap());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "# comment\n\nnameserver 1.1.1.1\n";
        let config = SystemResolverConfig::parse(text);
        assert_eq!(config.nameservers.len(), 1);
    }

    #[test]
    fn squery_without_nameservers_fails_fast() {
        let resolver = SystemResolver::new(SystemResolverConfig::default());
        let result = resolver.squery(&DomainName::from_str("example.com").unwrap(), DnsRRType::A);
        assert!(result.is_err());
    }
}
