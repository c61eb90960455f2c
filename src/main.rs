use std::error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{App, Arg};
use log::info;

mod dns;

use dns::ddns::{DdnsHandler, DdnsPolicy};
use dns::resolver::system::{SystemResolver, SystemResolverConfig};
use dns::resolver::RecursiveResolver;
use dns::server::core::{bind_udp, ManagedZone, Server, ServerConfig, ServerCore};
use dns::tsig::TsigKey;
use dns::zone::{AuthoritativeZone, MemoryZoneStore};

// Make Result<T> an alias for a result with a boxed error in it. This lets
// us write methods that return multiple different types of errors more easily,
// but has the drawback that we can't statically determine what is in the box.
type Result<T> = std::result::Result<T, Box<dyn error::Error>>;

fn build_cli() -> App<'static> {
    App::new("ldnsd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A compact authoritative/recursive DNS server with TSIG-guarded dynamic updates")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .takes_value(true)
                .default_value("127.0.0.1:5300")
                .long_help("Address:port to bind the UDP listener to"),
        )
        .arg(
            Arg::new("zone")
                .short('z')
                .long("zone")
                .takes_value(true)
                .multiple_occurrences(true)
                .long_help("Path to a zone file to serve authoritatively; may be given more than once"),
        )
        .arg(
            Arg::new("tsig-keys")
                .short('k')
                .long("tsig-keys")
                .takes_value(true)
                .long_help("Path to a TSIG key file"),
        )
        .arg(
            Arg::new("ddns")
                .long("ddns")
                .takes_value(true)
                .possible_values(&["disabled", "open", "allow"])
                .default_value("disabled")
                .long_help("Dynamic update policy for served zones"),
        )
        .arg(
            Arg::new("ddns-allow")
                .long("ddns-allow")
                .takes_value(true)
                .multiple_occurrences(true)
                .long_help("A TSIG key name authorized to submit updates (with --ddns=allow)"),
        )
        .arg(
            Arg::new("upstream")
                .short('u')
                .long("upstream")
                .takes_value(true)
                .multiple_occurrences(true)
                .long_help("Upstream resolver address:port; may be given more than once. Without one, iterative resolution from the root hints is used"),
        )
        .arg(
            Arg::new("resolv-conf")
                .long("resolv-conf")
                .takes_value(true)
                .default_value("/etc/resolv.conf")
                .long_help("resolv.conf-style file used for glueless NS lookups during recursion"),
        )
        .arg(
            Arg::new("max-extra-dispatchers")
                .long("max-extra-dispatchers")
                .takes_value(true)
                .default_value("64")
                .long_help("Upper bound on dispatcher threads the queue monitor may spawn beyond the initial pool"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .long_help("Increase log verbosity; repeat for more (-v info, -vv debug, -vvv trace)"),
        )
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_zones(
    paths: Vec<&str>,
    tsig_keys: &[TsigKey],
    ddns_policy: DdnsPolicy,
) -> Result<Vec<ManagedZone>> {
    let mut zones = Vec::new();
    for path in paths {
        let parsed = dns::config::load_zone_file(&PathBuf::from(path))?;
        let store = MemoryZoneStore::new();
        for (name, rr) in parsed.records {
            store.add_rr(&name, rr);
        }
        let zone = AuthoritativeZone::new(parsed.origin.clone(), Box::new(store));
        let ddns = match &ddns_policy {
            DdnsPolicy::Disabled => None,
            other => Some(DdnsHandler::new(other.clone())),
        };
        info!(
            "loaded zone {} ({} TSIG keys configured)",
            parsed.origin,
            tsig_keys.len()
        );
        zones.push(ManagedZone::authoritative(zone, ddns));
    }
    Ok(zones)
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    init_logging(matches.occurrences_of("verbose"));

    let bind_addr: SocketAddr = matches
        .value_of("bind")
        .unwrap()
        .parse()
        .map_err(|e| format!("invalid --bind address: {}", e))?;

    let tsig_keys = match matches.value_of("tsig-keys") {
        Some(path) => dns::config::load_tsig_keys(&PathBuf::from(path))?,
        None => Vec::new(),
    };

    let ddns_policy = match matches.value_of("ddns").unwrap() {
        "disabled" => DdnsPolicy::Disabled,
        "open" => DdnsPolicy::Open,
        "allow" => {
            let names: Vec<&str> = matches
                .values_of("ddns-allow")
                .map(|v| v.collect())
                .unwrap_or_default();
            DdnsPolicy::AllowList(dns::config::parse_allowlist(&names)?)
        }
        other => return Err(format!("unrecognized --ddns value: {}", other).into()),
    };

    let zone_paths: Vec<&str> = matches.values_of("zone").map(|v| v.collect()).unwrap_or_default();
    let zones = load_zones(zone_paths, &tsig_keys, ddns_policy)?;
    if zones.is_empty() {
        info!("no zone files given; serving as a pure recursive/forwarding resolver");
    }

    let upstream_peers: Vec<SocketAddr> = matches
        .values_of("upstream")
        .map(|v| {
            v.filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default();

    let resolv_conf = matches.value_of("resolv-conf").unwrap();
    let system_config = std::fs::read_to_string(resolv_conf)
        .map(|text| SystemResolverConfig::parse(&text))
        .unwrap_or_default();
    let system_resolver = SystemResolver::new(system_config);
    let aux_resolver = Arc::new(RecursiveResolver::new(upstream_peers, system_resolver));

    let max_extra_dispatchers: usize = matches
        .value_of("max-extra-dispatchers")
        .unwrap()
        .parse()
        .map_err(|e| format!("invalid --max-extra-dispatchers: {}", e))?;

    let core = ServerCore::new(zones, tsig_keys, Some(aux_resolver));
    let config = ServerConfig {
        max_extra_dispatchers,
    };

    let socket = bind_udp(bind_addr)?;
    let mut server = Server::new(vec![socket], core, config);
    server.start()?;

    info!("ldnsd listening on {}", bind_addr);

    // Block forever; the process is expected to be stopped externally
    // (signal, container shutdown). There's no in-band shutdown request in
    // this protocol, matching the reference server's own run-until-killed
    // model.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
