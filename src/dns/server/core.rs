// The concurrency machinery behind the server core (§4.7/§5): a bounded
// FIFO work queue guarded by a mutex + condvar, a listener thread that
// polls every bound socket and decodes incoming packets, a pool of
// dispatcher threads (ten at startup, elastically grown up to a
// configurable cap), and a queue monitor that grows the pool when the
// queue head has been waiting too long. `ServerCore::handle` is the
// dispatch pipeline itself: TSIG verification, zone selection by
// longest-origin-suffix match, handler invocation, and response chain-
// signing.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use rand::Rng;

use crate::dns::cache::unix_now;
use crate::dns::ddns::DdnsHandler;
use crate::dns::errors::DnsFormatError;
use crate::dns::flags::PacketFlags;
use crate::dns::handler::Handler;
use crate::dns::names::DomainName;
use crate::dns::opcode::DnsOpcode;
use crate::dns::packet::{DnsPacket, PacketAddr};
use crate::dns::question::DnsQuestion;
use crate::dns::rcode::DnsRCode;
use crate::dns::resolver::RecursiveResolver;
use crate::dns::rr::DnsResourceRecord;
use crate::dns::tsig::{self, TsigKey};
use crate::dns::wire;
use crate::dns::zone::AuthoritativeZone;

const RECV_BUF_SIZE: usize = 65536;
const INITIAL_DISPATCHERS: usize = 10;
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STALE_HEAD_THRESHOLD: Duration = Duration::from_secs(1);

/// How an individual zone answers: either the persistent store-backed
/// authoritative path (§4.5/§4.6, optionally with DDNS enabled), or an
/// arbitrary handler chain (§4.7) for forwarding/recursing/filtering zones.
pub enum ZoneHandling {
    Authoritative(Arc<AuthoritativeZone>, Option<Arc<DdnsHandler>>),
    Delegated(Box<dyn Handler>),
}

pub struct ManagedZone {
    pub origin: DomainName,
    pub handling: ZoneHandling,
}

impl ManagedZone {
    pub fn authoritative(zone: AuthoritativeZone, ddns: Option<DdnsHandler>) -> ManagedZone {
        let origin = zone.origin.clone();
        ManagedZone {
            origin,
            handling: ZoneHandling::Authoritative(Arc::new(zone), ddns.map(Arc::new)),
        }
    }

    pub fn delegated(origin: DomainName, handler: Box<dyn Handler>) -> ManagedZone {
        ManagedZone {
            origin,
            handling: ZoneHandling::Delegated(handler),
        }
    }
}

/// Produces a FORMERR reply carrying the qid recovered from a decode
/// failure (zero if even the 12-byte header couldn't be read). Named to
/// match the `get_error_response` call sites documented on
/// `DnsFormatError`.
pub fn get_error_response(err: &DnsFormatError) -> DnsPacket {
    let qid = err.qid().unwrap_or(0);
    let mut resp = DnsPacket::new(qid, DnsOpcode::Query);
    resp.flags |= PacketFlags::RESP;
    resp.rescode = DnsRCode::FormError;
    resp
}

/// The shared, thread-safe dispatch state: zones, TSIG keys, and the
/// optional auxiliary resolver used for CNAME chasing and NS glue lookups
/// during authoritative zone answering. Immutable after construction --
/// all of the actual concurrency lives in the queue/thread machinery in
/// `Server`, not here.
pub struct ServerCore {
    zones: Vec<ManagedZone>,
    tsig_keys: Vec<TsigKey>,
    aux_resolver: Option<Arc<RecursiveResolver>>,
}

impl ServerCore {
    pub fn new(
        zones: Vec<ManagedZone>,
        tsig_keys: Vec<TsigKey>,
        aux_resolver: Option<Arc<RecursiveResolver>>,
    ) -> ServerCore {
        ServerCore {
            zones,
            tsig_keys,
            aux_resolver,
        }
    }

    /// An internal entry point for in-process callers (the recursive
    /// resolver's own auxiliary lookups against locally-served zones):
    /// submits a packet directly to `handle`, flagged `internal` so
    /// `authzone` passes a bare `None` through on a miss rather than
    /// synthesizing a wire-facing NXDOMAIN.
    pub fn handle_internal(&self, mut query: DnsPacket) -> Option<DnsPacket> {
        query.flags |= PacketFlags::INTERNAL;
        self.handle(&query)
    }

    /// The handling pipeline (§4.7): verify TSIG if any keys are
    /// configured, dispatch each question to the zone whose origin
    /// contains it (longest origin wins ties), merge per-zone answers,
    /// and chain-sign the result if it carries a TSIG context. Returns
    /// `None` if any question has no matching zone, or if the matching
    /// zone's handler declines outright -- the caller (the dispatcher
    /// thread) replies SERVFAIL in that case.
    pub fn handle(&self, pkt: &DnsPacket) -> Option<DnsPacket> {
        let mut pkt = pkt.clone();

        if !self.tsig_keys.is_empty() {
            if let Err(e) = tsig::verify(&mut pkt, &self.tsig_keys, unix_now()) {
                warn!("TSIG verification failed: {:?}", e);
                // `verify` leaves an extended-error TSIG RR (BADSIG/BADKEY/
                // BADTIME) on `pkt.adlist` when it popped one off; carry it
                // into the rejection response so the client can tell the
                // failures apart instead of just seeing the header rcode.
                let mut resp = DnsPacket::response_for(&pkt, e.to_rcode());
                resp.adlist = pkt.adlist.clone();
                return Some(resp);
            }
        }

        let response = if pkt.opcode == DnsOpcode::Update {
            self.handle_update(&pkt)
        } else {
            self.handle_query(&pkt)
        }?;

        Some(self.maybe_sign(response))
    }

    fn handle_update(&self, pkt: &DnsPacket) -> Option<DnsPacket> {
        let question = pkt.qlist.first()?.clone();
        let zone = self.select_zone(&question.qname)?;
        Some(match &zone.handling {
            ZoneHandling::Authoritative(az, Some(ddns)) => ddns.handle_update(az, pkt),
            ZoneHandling::Authoritative(_, None) => {
                debug!("UPDATE rejected: DDNS disabled for {}", zone.origin);
                DnsPacket::response_for(pkt, DnsRCode::Refused)
            }
            ZoneHandling::Delegated(h) => h.handle(&question, pkt)?,
        })
    }

    fn handle_query(&self, pkt: &DnsPacket) -> Option<DnsPacket> {
        let mut order: Vec<DomainName> = Vec::new();
        let mut groups: HashMap<DomainName, Vec<DnsQuestion>> = HashMap::new();
        for question in &pkt.qlist {
            let zone = self.select_zone(&question.qname)?;
            groups
                .entry(zone.origin.clone())
                .or_insert_with(|| {
                    order.push(zone.origin.clone());
                    Vec::new()
                })
                .push(question.clone());
        }

        let mut response: Option<DnsPacket> = None;
        for origin in order {
            let questions = groups.remove(&origin).unwrap_or_default();
            let zone = self.zones.iter().find(|z| z.origin == origin)?;
            let curresp = self.handle_zone_questions(zone, pkt, questions)?;
            match &mut response {
                None => response = Some(curresp),
                Some(r) => r.merge(curresp),
            }
        }
        response
    }

    fn handle_zone_questions(
        &self,
        zone: &ManagedZone,
        pkt: &DnsPacket,
        questions: Vec<DnsQuestion>,
    ) -> Option<DnsPacket> {
        match &zone.handling {
            ZoneHandling::Authoritative(az, _) => {
                let mut subquery = pkt.clone();
                subquery.qlist = questions;
                let mut aux = |q: &DnsQuestion| self.resolve_aux(q);
                az.authzone(&subquery, &mut aux)
            }
            ZoneHandling::Delegated(handler) => {
                let mut merged: Option<DnsPacket> = None;
                for q in &questions {
                    let r = handler.handle(q, pkt)?;
                    match &mut merged {
                        None => merged = Some(r),
                        Some(m) => m.merge(r),
                    }
                }
                merged
            }
        }
    }

    fn select_zone(&self, name: &DomainName) -> Option<&ManagedZone> {
        let mut best: Option<&ManagedZone> = None;
        for zone in &self.zones {
            if name.is_within(&zone.origin) {
                best = match best {
                    Some(b) if b.origin.len() >= zone.origin.len() => Some(b),
                    _ => Some(zone),
                };
            }
        }
        best
    }

    /// Looks a CNAME target or NS glue name up through the configured
    /// auxiliary resolver (the server's own recursive resolver, if one is
    /// configured). Returns `None` -- rather than erroring -- when no
    /// resolver is configured or the lookup comes up empty, since this is
    /// a best-effort glue/chase attempt, not a required one.
    fn resolve_aux(&self, question: &DnsQuestion) -> Option<Vec<DnsResourceRecord>> {
        let resolver = self.aux_resolver.as_ref()?;
        let qid: u16 = rand::thread_rng().gen();
        let mut query = DnsPacket::query(qid, question.clone());
        query.flags |= PacketFlags::RECURSE;
        let resp = resolver.resolve_query(&query);
        if resp.rescode == DnsRCode::NoError && !resp.anlist.is_empty() {
            Some(resp.anlist)
        } else {
            None
        }
    }

    fn maybe_sign(&self, mut resp: DnsPacket) -> DnsPacket {
        if resp.signed {
            return resp;
        }
        if let Some(ctx) = resp.tsigctx.clone() {
            let prev_mac = ctx.prev_mac.clone();
            tsig::sign(&mut resp, &ctx.key, unix_now(), 300, Some(&prev_mac));
        }
        resp
    }
}

struct QueueEntry {
    arrived: Instant,
    packet: DnsPacket,
    reply_socket: Arc<UdpSocket>,
    reply_addr: SocketAddr,
}

/// A bounded(-by-convention) FIFO guarded by a mutex and condvar (§5):
/// enqueue signals, dequeue blocks while empty.
struct Queue {
    entries: Mutex<VecDeque<QueueEntry>>,
    condvar: Condvar,
}

impl Queue {
    fn new() -> Queue {
        Queue {
            entries: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        }
    }

    fn enqueue(&self, entry: QueueEntry) {
        let mut guard = self.entries.lock().unwrap();
        guard.push_back(entry);
        trace!("queue length+: {}", guard.len());
        self.condvar.notify_one();
    }

    /// Blocks (with a short periodic wakeup so shutdown is noticed
    /// promptly) until an entry is available, then pops it FIFO.
    fn dequeue(&self, alive: &AtomicBool) -> Option<QueueEntry> {
        let mut guard = self.entries.lock().unwrap();
        loop {
            if let Some(entry) = guard.pop_front() {
                trace!("queue length-: {}", guard.len());
                return Some(entry);
            }
            if !alive.load(Ordering::SeqCst) {
                return None;
            }
            let (next_guard, _timeout) = self
                .condvar
                .wait_timeout(guard, Duration::from_millis(250))
                .unwrap();
            guard = next_guard;
        }
    }

    /// How long the queue head has been waiting, if the queue is
    /// non-empty. Drives the queue monitor's elastic dispatcher growth.
    fn head_age(&self) -> Option<Duration> {
        let guard = self.entries.lock().unwrap();
        guard.front().map(|e| e.arrived.elapsed())
    }

    fn notify_all(&self) {
        self.condvar.notify_all();
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    /// Caps how many *additional* dispatchers the queue monitor may spawn
    /// beyond the initial ten (§9 "Queue monitor dispatcher cap" -- the
    /// source spawns without bound, a hardening this implementation
    /// requires rather than treats as optional).
    pub max_extra_dispatchers: usize,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            max_extra_dispatchers: 64,
        }
    }
}

/// Binds a UDP socket with `SO_REUSEADDR`/`SO_REUSEPORT` set, matching the
/// multi-socket listener model (§4.7 "one or more bound UDP sockets").
pub fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    use socket2::{Domain, Protocol, SockAddr, Socket, Type};

    let domain = if addr.is_ipv4() { Domain::ipv4() } else { Domain::ipv6() };
    let socket = Socket::new(domain, Type::dgram(), Some(Protocol::udp()))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SockAddr::from(addr))?;
    Ok(socket.into_udp_socket())
}

/// The UDP listener/dispatcher/queue-monitor trio, wired to a shared
/// `ServerCore`. Owns the bound sockets and the threads; `start`/`stop`
/// bracket the server's running lifetime.
pub struct Server {
    core: Arc<ServerCore>,
    sockets: Vec<Arc<UdpSocket>>,
    queue: Arc<Queue>,
    alive: Arc<AtomicBool>,
    extra_dispatchers_spawned: Arc<AtomicUsize>,
    config: ServerConfig,
    listener: Option<JoinHandle<()>>,
    dispatchers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    monitor: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(sockets: Vec<UdpSocket>, core: ServerCore, config: ServerConfig) -> Server {
        Server {
            core: Arc::new(core),
            sockets: sockets.into_iter().map(Arc::new).collect(),
            queue: Arc::new(Queue::new()),
            alive: Arc::new(AtomicBool::new(false)),
            extra_dispatchers_spawned: Arc::new(AtomicUsize::new(0)),
            config,
            listener: None,
            dispatchers: Arc::new(Mutex::new(Vec::new())),
            monitor: None,
        }
    }

    pub fn core(&self) -> Arc<ServerCore> {
        self.core.clone()
    }

    pub fn start(&mut self) -> io::Result<()> {
        if self.alive.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "server already running"));
        }

        for socket in &self.sockets {
            socket.set_read_timeout(Some(listener_poll_slice(self.sockets.len())))?;
        }

        let listener = {
            let sockets = self.sockets.clone();
            let queue = self.queue.clone();
            let alive = self.alive.clone();
            thread::spawn(move || listener_loop(sockets, queue, alive))
        };
        self.listener = Some(listener);

        {
            let mut dispatchers = self.dispatchers.lock().unwrap();
            for _ in 0..INITIAL_DISPATCHERS {
                dispatchers.push(self.spawn_dispatcher());
            }
        }

        let monitor = {
            let queue = self.queue.clone();
            let alive = self.alive.clone();
            let dispatchers = self.dispatchers.clone();
            let extra_spawned = self.extra_dispatchers_spawned.clone();
            let cap = self.config.max_extra_dispatchers;
            let core = self.core.clone();
            let sockets = self.sockets.clone();
            thread::spawn(move || {
                queue_monitor_loop(queue, alive, dispatchers, extra_spawned, cap, core, sockets)
            })
        };
        self.monitor = Some(monitor);

        Ok(())
    }

    fn spawn_dispatcher(&self) -> JoinHandle<()> {
        spawn_dispatcher_thread(self.queue.clone(), self.alive.clone(), self.core.clone())
    }

    pub fn stop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
        self.queue.notify_all();
        let handles: Vec<JoinHandle<()>> = {
            let mut dispatchers = self.dispatchers.lock().unwrap();
            dispatchers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.join();
        }
    }
}

/// Splits the nominal 1-second poll timeout across however many sockets
/// the listener round-robins over, so one sweep of all sockets takes
/// about a second even though each `recv_from` call only has its own
/// short per-socket read timeout to work with.
fn listener_poll_slice(socket_count: usize) -> Duration {
    let count = socket_count.max(1) as u64;
    Duration::from_millis((1000 / count).max(50))
}

fn listener_loop(sockets: Vec<Arc<UdpSocket>>, queue: Arc<Queue>, alive: Arc<AtomicBool>) {
    let mut buf = [0u8; RECV_BUF_SIZE];
    while alive.load(Ordering::SeqCst) {
        for socket in &sockets {
            if !alive.load(Ordering::SeqCst) {
                break;
            }
            match socket.recv_from(&mut buf) {
                Ok((len, src)) => handle_datagram(socket, &buf[..len], src, &queue),
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock && e.kind() != io::ErrorKind::TimedOut {
                        trace!("listener recv error: {}", e);
                    }
                }
            }
        }
    }
}

fn handle_datagram(socket: &Arc<UdpSocket>, bytes: &[u8], src: SocketAddr, queue: &Arc<Queue>) {
    match wire::decode(bytes) {
        Ok(mut packet) => {
            debug!("got request ({:04x}) from {}", packet.qid, src);
            packet.addr = Some(PacketAddr::new(src.ip(), src.port()));
            queue.enqueue(QueueEntry {
                arrived: Instant::now(),
                packet,
                reply_socket: socket.clone(),
                reply_addr: src,
            });
        }
        Err(e) => {
            warn!("dropping malformed request from {}: {}", src, e);
            let resp = get_error_response(&e);
            send_reply(socket, &resp, src);
        }
    }
}

fn send_reply(socket: &UdpSocket, packet: &DnsPacket, addr: SocketAddr) {
    let bytes = wire::encode(packet);
    if let Err(e) = socket.send_to(&bytes, addr) {
        warn!("failed to send reply to {}: {}", addr, e);
    } else {
        trace!("sending response to {:04x}", packet.qid);
    }
}

fn spawn_dispatcher_thread(
    queue: Arc<Queue>,
    alive: Arc<AtomicBool>,
    core: Arc<ServerCore>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Some(entry) = queue.dequeue(&alive) {
            let qid = entry.packet.qid;
            let resp = core.handle(&entry.packet).unwrap_or_else(|| {
                debug!("no handler answered query {:04x}; replying SERVFAIL", qid);
                DnsPacket::response_for(&entry.packet, DnsRCode::ServFail)
            });
            send_reply(&entry.reply_socket, &resp, entry.reply_addr);
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn queue_monitor_loop(
    queue: Arc<Queue>,
    alive: Arc<AtomicBool>,
    dispatchers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    extra_spawned: Arc<AtomicUsize>,
    cap: usize,
    core: Arc<ServerCore>,
    _sockets: Vec<Arc<UdpSocket>>,
) {
    while alive.load(Ordering::SeqCst) {
        thread::sleep(QUEUE_POLL_INTERVAL);
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        if let Some(age) = queue.head_age() {
            if age > STALE_HEAD_THRESHOLD {
                let spawned = extra_spawned.fetch_add(1, Ordering::SeqCst);
                if spawned >= cap {
                    extra_spawned.fetch_sub(1, Ordering::SeqCst);
                    warn!(
                        "queue head has waited {:?} but the dispatcher cap ({}) is reached",
                        age, cap
                    );
                    continue;
                }
                let handle = spawn_dispatcher_thread(queue.clone(), alive.clone(), core.clone());
                let mut guard = dispatchers.lock().unwrap();
                guard.push(handle);
                debug!("starting new dispatcher, there are now {}", guard.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::class::DnsClass;
    use crate::dns::question::DnsQuestion;
    use crate::dns::rdata::DnsRecordData;
    use crate::dns::rr::DnsRRHead;
    use crate::dns::rrtype::DnsRRType;
    use crate::dns::zone::MemoryZoneStore;
    use std::net::Ipv4Addr;

    fn dn(s: &str) -> DomainName {
        DomainName::from_str(s).unwrap()
    }

    fn zone_with_host() -> ManagedZone {
        let store = MemoryZoneStore::new();
        store.set(
            &dn("host"),
            vec![DnsResourceRecord::new(
                DnsRRHead::new(dn("host"), DnsRRType::A),
                60,
                Some(DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4))),
            )],
        );
        let zone = AuthoritativeZone::new(dn("example.com."), Box::new(store));
        ManagedZone::authoritative(zone, None)
    }

    #[test]
    fn dispatches_to_the_longest_matching_origin() {
        let inner = zone_with_host();
        let outer = ManagedZone::authoritative(
            AuthoritativeZone::new(dn("com."), Box::new(MemoryZoneStore::new())),
            None,
        );
        let core = ServerCore::new(vec![outer, inner], vec![], None);

        let question = DnsQuestion::new(dn("host.example.com."), DnsRRType::A, DnsClass::IN);
        let query = DnsPacket::query(1, question);
        let resp = core.handle(&query).unwrap();
        assert_eq!(resp.anlist.len(), 1);
    }

    #[test]
    fn missing_zone_yields_no_answer() {
        let core = ServerCore::new(vec![zone_with_host()], vec![], None);
        let question = DnsQuestion::new(dn("elsewhere.net."), DnsRRType::A, DnsClass::IN);
        let query = DnsPacket::query(1, question);
        assert!(core.handle(&query).is_none());
    }

    #[test]
    fn update_without_ddns_configured_is_refused() {
        let core = ServerCore::new(vec![zone_with_host()], vec![], None);
        let question = DnsQuestion::new(dn("example.com."), DnsRRType::SOA, DnsClass::IN);
        let mut query = DnsPacket::query(1, question);
        query.opcode = DnsOpcode::Update;
        let resp = core.handle(&query).unwrap();
        assert_eq!(resp.rescode, DnsRCode::Refused);
    }

    #[test]
    fn error_response_carries_recovered_qid() {
        let err = DnsFormatError::make_error("bad label".to_string()).with_qid(0x55aa);
        let resp = get_error_response(&err);
        assert_eq!(resp.qid, 0x55aa);
        assert_eq!(resp.rescode, DnsRCode::FormError);
        assert!(resp.flags.contains(PacketFlags::RESP));
    }
}
