// Hand-written line parsers for the two file formats the command line
// takes: TSIG key files and zone files. Neither reaches for a config crate
// (toml/serde) -- these formats are simple enough, and name/record parsing
// already lives in `names`/`rdata`, that a line-oriented parser is a better
// fit than a schema-driven one.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use crate::dns::names::DomainName;
use crate::dns::rdata::{DnsRecordData, MxData, SoaData, SrvData};
use crate::dns::rr::{DnsRRHead, DnsResourceRecord};
use crate::dns::rrtype::DnsRRType;
use crate::dns::tsig::TsigKey;

#[derive(Debug)]
pub struct ConfigError {
    path: String,
    line: usize,
    message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path, self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn err(path: &str, line: usize, message: impl Into<String>) -> ConfigError {
    ConfigError {
        path: path.to_string(),
        line,
        message: message.into(),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parses a TSIG key file: one `<name> <algorithm> <base64-secret>` per
/// line. Only `hmac-md5.sig-alg.reg.int.` is accepted as an algorithm,
/// matching the one HMAC this implementation supports.
pub fn load_tsig_keys(path: &Path) -> Result<Vec<TsigKey>, ConfigError> {
    let path_str = path.display().to_string();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| err(&path_str, 0, format!("couldn't read key file: {}", e)))?;

    let mut keys = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(err(
                &path_str,
                lineno + 1,
                "expected `<name> <algorithm> <base64 secret>`",
            ));
        }
        let name = DomainName::from_str(fields[0])
            .map_err(|e| err(&path_str, lineno + 1, format!("bad key name: {}", e)))?;
        let algo = DomainName::from_str(fields[1])
            .map_err(|e| err(&path_str, lineno + 1, format!("bad algorithm name: {}", e)))?;
        if algo != crate::dns::tsig::hmac_md5_algorithm_name() {
            return Err(err(
                &path_str,
                lineno + 1,
                format!("unsupported TSIG algorithm {}", fields[1]),
            ));
        }
        let secret = base64::decode(fields[2])
            .map_err(|e| err(&path_str, lineno + 1, format!("bad base64 secret: {}", e)))?;
        keys.push(TsigKey::new_hmac_md5(name, secret));
    }
    Ok(keys)
}

/// One parsed zone file: the origin it declares, and the initial RR set
/// keyed by name relative to that origin (as `AuthoritativeZone`/`ZoneStore`
/// expect).
pub struct ParsedZone {
    pub origin: DomainName,
    pub records: Vec<(DomainName, DnsResourceRecord)>,
}

/// Parses a zone file: a leading `$ORIGIN <name>` directive, then one
/// `<name> <ttl> <TYPE> <rdata...>` record per line. `<name>` may be `@`
/// for the origin itself, or end in `.` for a fully rooted name; anything
/// else is relative to the origin. Blank lines and `#` comments are
/// ignored.
pub fn load_zone_file(path: &Path) -> Result<ParsedZone, ConfigError> {
    let path_str = path.display().to_string();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| err(&path_str, 0, format!("couldn't read zone file: {}", e)))?;

    let mut origin: Option<DomainName> = None;
    let mut records = Vec::new();

    for (lineno, raw) in contents.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let lineno = lineno + 1;

        if let Some(rest) = line.strip_prefix("$ORIGIN") {
            let name = rest.trim();
            origin = Some(
                DomainName::from_str(name)
                    .map_err(|e| err(&path_str, lineno, format!("bad $ORIGIN: {}", e)))?,
            );
            continue;
        }

        let zone_origin = origin
            .clone()
            .ok_or_else(|| err(&path_str, lineno, "record appears before $ORIGIN directive"))?;

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(err(
                &path_str,
                lineno,
                "expected `<name> <ttl> <TYPE> <rdata...>`",
            ));
        }

        let raw_name = fields[0];
        let name = if raw_name == "@" {
            DomainName::empty()
        } else {
            let parsed = DomainName::from_str(raw_name)
                .map_err(|e| err(&path_str, lineno, format!("bad name: {}", e)))?;
            if parsed.is_rooted() {
                parsed
                    .sub(&zone_origin)
                    .map_err(|_| err(&path_str, lineno, "name is not within $ORIGIN"))?
            } else {
                parsed
            }
        };

        let ttl: u32 = fields[1]
            .parse()
            .map_err(|_| err(&path_str, lineno, format!("bad ttl: {}", fields[1])))?;

        let rtype = parse_rtype(fields[2])
            .ok_or_else(|| err(&path_str, lineno, format!("unsupported type: {}", fields[2])))?;

        let data = parse_rdata(&path_str, lineno, &rtype, &fields[3..])?;

        let rr = DnsResourceRecord::new(DnsRRHead::new(name.clone(), rtype), ttl, Some(data));
        records.push((name, rr));
    }

    let origin = origin.ok_or_else(|| err(&path_str, 0, "zone file has no $ORIGIN directive"))?;
    Ok(ParsedZone { origin, records })
}

fn parse_rtype(s: &str) -> Option<DnsRRType> {
    Some(match s.to_ascii_uppercase().as_str() {
        "A" => DnsRRType::A,
        "AAAA" => DnsRRType::AAAA,
        "NS" => DnsRRType::NS,
        "CNAME" => DnsRRType::CNAME,
        "SOA" => DnsRRType::SOA,
        "PTR" => DnsRRType::PTR,
        "MX" => DnsRRType::MX,
        "TXT" => DnsRRType::TXT,
        "SRV" => DnsRRType::SRV,
        _ => return None,
    })
}

fn parse_name_field(path: &str, lineno: usize, s: &str) -> Result<DomainName, ConfigError> {
    DomainName::from_str(s).map_err(|e| err(path, lineno, format!("bad name {}: {}", s, e)))
}

fn parse_rdata(
    path: &str,
    lineno: usize,
    rtype: &DnsRRType,
    rest: &[&str],
) -> Result<DnsRecordData, ConfigError> {
    match rtype {
        DnsRRType::A => {
            let addr: Ipv4Addr = rest
                .first()
                .ok_or_else(|| err(path, lineno, "A record requires an address"))?
                .parse()
                .map_err(|_| err(path, lineno, "bad IPv4 address"))?;
            Ok(DnsRecordData::A(addr))
        }
        DnsRRType::AAAA => {
            let addr: Ipv6Addr = rest
                .first()
                .ok_or_else(|| err(path, lineno, "AAAA record requires an address"))?
                .parse()
                .map_err(|_| err(path, lineno, "bad IPv6 address"))?;
            Ok(DnsRecordData::Aaaa(addr))
        }
        DnsRRType::NS => Ok(DnsRecordData::Ns(parse_name_field(
            path,
            lineno,
            rest.first().ok_or_else(|| err(path, lineno, "NS record requires a target"))?,
        )?)),
        DnsRRType::CNAME => Ok(DnsRecordData::Cname(parse_name_field(
            path,
            lineno,
            rest.first().ok_or_else(|| err(path, lineno, "CNAME record requires a target"))?,
        )?)),
        DnsRRType::PTR => Ok(DnsRecordData::Ptr(parse_name_field(
            path,
            lineno,
            rest.first().ok_or_else(|| err(path, lineno, "PTR record requires a target"))?,
        )?)),
        DnsRRType::SOA => {
            if rest.len() < 7 {
                return Err(err(
                    path,
                    lineno,
                    "SOA record requires priserv mailbox serial refresh retry expire minttl",
                ));
            }
            Ok(DnsRecordData::Soa(SoaData {
                priserv: parse_name_field(path, lineno, rest[0])?,
                mailbox: parse_name_field(path, lineno, rest[1])?,
                serial: rest[2].parse().map_err(|_| err(path, lineno, "bad serial"))?,
                refresh: rest[3].parse().map_err(|_| err(path, lineno, "bad refresh"))?,
                retry: rest[4].parse().map_err(|_| err(path, lineno, "bad retry"))?,
                expire: rest[5].parse().map_err(|_| err(path, lineno, "bad expire"))?,
                minttl: rest[6].parse().map_err(|_| err(path, lineno, "bad minttl"))?,
            }))
        }
        DnsRRType::MX => {
            if rest.len() < 2 {
                return Err(err(path, lineno, "MX record requires priority and target"));
            }
            Ok(DnsRecordData::Mx(MxData {
                prio: rest[0].parse().map_err(|_| err(path, lineno, "bad MX priority"))?,
                target: parse_name_field(path, lineno, rest[1])?,
            }))
        }
        DnsRRType::TXT => {
            let text = rest.join(" ");
            let text = text.trim_matches('"');
            Ok(DnsRecordData::Txt(text.as_bytes().to_vec()))
        }
        DnsRRType::SRV => {
            if rest.len() < 4 {
                return Err(err(path, lineno, "SRV record requires priority weight port target"));
            }
            Ok(DnsRecordData::Srv(SrvData {
                prio: rest[0].parse().map_err(|_| err(path, lineno, "bad SRV priority"))?,
                weight: rest[1].parse().map_err(|_| err(path, lineno, "bad SRV weight"))?,
                port: rest[2].parse().map_err(|_| err(path, lineno, "bad SRV port"))?,
                target: parse_name_field(path, lineno, rest[3])?,
            }))
        }
        other => Err(err(path, lineno, format!("unsupported type: {:?}", other))),
    }
}

pub fn parse_allowlist(names: &[&str]) -> Result<Vec<DomainName>, ConfigError> {
    names
        .iter()
        .map(|n| {
            DomainName::from_str(n)
                .map_err(|e| err("<allowlist>", 0, format!("bad key name {}: {}", n, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tmp_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_a_simple_zone_file() {
        let f = tmp_file(
            "$ORIGIN example.com.\n\
             @ 3600 SOA ns1 hostmaster 1 3600 600 1209600 60\n\
             @ 3600 NS ns1\n\
             ns1 3600 A 192.0.2.1\n\
             www 300 CNAME @\n",
        );
        let parsed = load_zone_file(f.path()).unwrap();
        assert_eq!(parsed.origin, DomainName::from_str("example.com.").unwrap());
        assert_eq!(parsed.records.len(), 4);
        let www = parsed
            .records
            .iter()
            .find(|(name, _)| name == &DomainName::from_str("www").unwrap())
            .unwrap();
        assert!(matches!(www.1.data, Some(DnsRecordData::Cname(_))));
    }

    #[test]
    fn rejects_record_before_origin() {
        let f = tmp_file("ns1 3600 A 192.0.2.1\n");
        assert!(load_zone_file(f.path()).is_err());
    }

    #[test]
    fn parses_tsig_key_file() {
        let secret = base64::encode(b"shhh");
        let f = tmp_file(&format!(
            "update-key. hmac-md5.sig-alg.reg.int. {}\n",
            secret
        ));
        let keys = load_tsig_keys(f.path()).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, DomainName::from_str("update-key.").unwrap());
        assert_eq!(keys[0].secret, b"shhh".to_vec());
    }

    #[test]
    fn rejects_unsupported_tsig_algorithm() {
        let f = tmp_file("update-key. hmac-sha256. AAAA\n");
        assert!(load_tsig_keys(f.path()).is_err());
    }
}
