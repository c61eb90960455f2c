// Weighted peer selection among a set of upstream resolvers, scored by a
// rolling window of recent success/failure outcomes.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;

use log::trace;
use rand::Rng;

use crate::dns::cache::unix_now;
use crate::dns::errors::ResolveError;
use crate::dns::names::DomainName;
use crate::dns::packet::DnsPacket;
use crate::dns::resolver::iterative;

const WINDOW_SIZE: usize = 10;
const WINDOW_AGE_SECS: u64 = 1800;
const PRUNE_INTERVAL_SECS: u64 = 60;

struct PeerWindow {
    outcomes: VecDeque<(u64, u8)>,
}

impl PeerWindow {
    fn new() -> PeerWindow {
        PeerWindow {
            outcomes: VecDeque::new(),
        }
    }

    fn record(&mut self, outcome: u8, now: u64) {
        self.outcomes.push_back((now, outcome));
        while self.outcomes.len() > WINDOW_SIZE {
            self.outcomes.pop_front();
        }
    }

    fn prune(&mut self, now: u64) {
        while let Some((ts, _)) = self.outcomes.front() {
            if now.saturating_sub(*ts) > WINDOW_AGE_SECS {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn score(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let sum: u32 = self.outcomes.iter().map(|(_, o)| *o as u32).sum();
        sum as f64 / self.outcomes.len() as f64
    }
}

/// Maintains a scoreboard across a fixed set of upstream peers and drives
/// the iterative resolver against a weighted-random pick each call.
pub struct MultiResolver {
    peers: Mutex<HashMap<SocketAddr, PeerWindow>>,
    last_prune: Mutex<u64>,
}

impl MultiResolver {
    pub fn new(peers: Vec<SocketAddr>) -> MultiResolver {
        let mut map = HashMap::new();
        for peer in peers {
            map.insert(peer, PeerWindow::new());
        }
        MultiResolver {
            peers: Mutex::new(map),
            last_prune: Mutex::new(0),
        }
    }

    fn maybe_prune(&self, now: u64) {
        let mut last = self.last_prune.lock().unwrap();
        if now.saturating_sub(*last) < PRUNE_INTERVAL_SECS {
            return;
        }
        *last = now;
        let mut peers = self.peers.lock().unwrap();
        for window in peers.values_mut() {
            window.prune(now);
        }
    }

    /// Picks one peer, weighted by its current score, among all configured
    /// peers. Panics only if the peer set is empty, which is a
    /// configuration error the caller should have rejected earlier.
    fn pick_peer(&self) -> SocketAddr {
        let peers = self.peers.lock().unwrap();
        let scored: Vec<(SocketAddr, f64)> =
            peers.iter().map(|(addr, w)| (*addr, w.score())).collect();
        let total: f64 = scored.iter().map(|(_, s)| s).sum();

        if total <= 0.0 {
            return scored[0].0;
        }
        let mut roll = rand::thread_rng().gen_range(0.0..total);
        for (addr, score) in &scored {
            if roll < *score {
                return *addr;
            }
            roll -= score;
        }
        scored.last().expect("peer set is non-empty").0
    }

    fn record(&self, peer: SocketAddr, outcome: u8, now: u64) {
        let mut peers = self.peers.lock().unwrap();
        peers
            .entry(peer)
            .or_insert_with(PeerWindow::new)
            .record(outcome, now);
    }

    /// Picks a peer, resolves through it, and records the outcome. Any
    /// error from the walk is recorded as a failure and re-raised.
    pub fn resolve(
        &self,
        query: &DnsPacket,
        recurse: bool,
        retries: u32,
        timeout_ms: u64,
        lookup_ns: &mut dyn FnMut(&DomainName) -> Vec<IpAddr>,
    ) -> Result<DnsPacket, ResolveError> {
        let now = unix_now();
        self.maybe_prune(now);
        let peer = self.pick_peer();
        trace!("multi-resolver picked peer {}", peer);

        let mut visited = std::collections::HashSet::new();
        let result = iterative::resolve(
            query, peer, recurse, retries, timeout_ms, 0, &mut visited, lookup_ns,
        );
        match &result {
            Ok(_) => self.record(peer, 1, now),
            Err(_) => self.record(peer, 0, now),
        }
        result
    }
}
