use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use protocol::Command;
use settings::NodeSettings;

/// Composite rate-limit key: `currency::Command`, or the bare plugin
/// name for custom calls.
pub(crate) fn rate_key(command: Command, currency: &str) -> String {
    if command == Command::CustomCall {
        currency.to_string()
    } else {
        format!("{currency}::{command}")
    }
}

#[derive(Default)]
struct PeerRecord {
    settings: Option<Arc<NodeSettings>>,
    last_config_fetch: Option<Instant>,
    last_sent: HashMap<String, Instant>,
    last_received: HashMap<String, Instant>,
    score: i64,
}

/// Live view of connected peers: advertised settings, config
/// freshness, per-key traffic stamps in both directions, and score.
///
/// A record exists exactly while the transport reports the peer as
/// connected; everything about a peer dies with its record.
#[derive(Default)]
pub struct PeerDirectory {
    peers: Mutex<HashMap<String, PeerRecord>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(&self, addr: &str) {
        self.peers.lock().entry(addr.to_string()).or_default();
    }

    pub fn disconnected(&self, addr: &str) {
        self.peers.lock().remove(addr);
    }

    pub fn is_connected(&self, addr: &str) -> bool {
        self.peers.lock().contains_key(addr)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.peers.lock().keys().cloned().collect()
    }

    pub fn settings_of(&self, addr: &str) -> Option<Arc<NodeSettings>> {
        self.peers.lock().get(addr)?.settings.clone()
    }

    pub fn store_settings(&self, addr: &str, settings: Arc<NodeSettings>) {
        if let Some(record) = self.peers.lock().get_mut(addr) {
            record.settings = Some(settings);
        }
    }

    /// Peers whose advertised config is absent or stale and which have
    /// not been asked within the refresh window.
    pub fn peers_needing_config(&self, window: Duration) -> Vec<String> {
        let peers = self.peers.lock();
        peers
            .iter()
            .filter(|(_, record)| {
                record
                    .last_config_fetch
                    .map_or(true, |at| at.elapsed() >= window)
            })
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    pub fn mark_config_requested(&self, addr: &str) {
        if let Some(record) = self.peers.lock().get_mut(addr) {
            record.last_config_fetch = Some(Instant::now());
        }
    }

    /// Peers eligible to serve `command` for `currency`, best first.
    ///
    /// A peer qualifies when its advertised settings are known, enable
    /// the wallet and the command, and the outbound window for this key
    /// has elapsed. Peers whose config has not been fetched yet are
    /// skipped; a config refresh will pick them up for the next call.
    /// Ordering is deterministic: score descending, address ascending.
    pub fn select_for_command(&self, command: Command, currency: &str) -> Vec<String> {
        let key = rate_key(command, currency);
        let peers = self.peers.lock();
        let mut eligible: Vec<(i64, &String)> = peers
            .iter()
            .filter(|(_, record)| {
                let Some(settings) = &record.settings else {
                    return false;
                };
                if !settings.wallet_enabled(currency)
                    || !settings.is_available_command(command, currency)
                {
                    return false;
                }
                let window = settings.command_timeout(command, currency);
                Self::window_elapsed(record.last_sent.get(&key), window)
            })
            .map(|(addr, record)| (record.score, addr))
            .collect();
        eligible.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        eligible.into_iter().map(|(_, addr)| addr.clone()).collect()
    }

    /// Best peer advertising plugin `name`, honoring its declared
    /// throttle window. Same ordering discipline as commands.
    pub fn select_for_plugin(&self, name: &str) -> Option<String> {
        let peers = self.peers.lock();
        let mut eligible: Vec<(i64, &String)> = peers
            .iter()
            .filter(|(_, record)| {
                let Some(settings) = &record.settings else {
                    return false;
                };
                let Some(plugin) = settings.plugin_settings(name) else {
                    return false;
                };
                Self::window_elapsed(record.last_sent.get(name), plugin.timeout())
            })
            .map(|(addr, record)| (record.score, addr))
            .collect();
        eligible.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        eligible.first().map(|(_, addr)| (*addr).clone())
    }

    fn window_elapsed(last: Option<&Instant>, window_secs: f64) -> bool {
        if window_secs <= 0.0 {
            return true;
        }
        match last {
            Some(at) => at.elapsed() >= Duration::from_secs_f64(window_secs),
            None => true,
        }
    }

    pub fn mark_sent(&self, addr: &str, key: &str) {
        if let Some(record) = self.peers.lock().get_mut(addr) {
            record.last_sent.insert(key.to_string(), Instant::now());
        }
    }

    /// Inbound admission for one `peer × key`: allowed when the window
    /// has elapsed since the last served request, in which case the
    /// stamp advances. A denied request leaves the stamp untouched, so
    /// the window is measured from the last request actually served.
    pub fn check_receive(&self, addr: &str, key: &str, window: Duration) -> bool {
        let mut peers = self.peers.lock();
        let Some(record) = peers.get_mut(addr) else {
            return false;
        };
        if let Some(at) = record.last_received.get(key) {
            if !window.is_zero() && at.elapsed() < window {
                return false;
            }
        }
        record.last_received.insert(key.to_string(), Instant::now());
        true
    }

    /// Hook for a future scoring policy; nothing in the engine adjusts
    /// scores on its own.
    pub fn adjust_score(&self, addr: &str, delta: i64) {
        if let Some(record) = self.peers.lock().get_mut(addr) {
            record.score += delta;
        }
    }

    /// Every connected peer with known settings, for status reporting.
    pub fn known_configs(&self) -> Vec<(String, Arc<NodeSettings>)> {
        let peers = self.peers.lock();
        let mut known: Vec<_> = peers
            .iter()
            .filter_map(|(addr, record)| Some((addr.clone(), record.settings.clone()?)))
            .collect();
        known.sort_by(|a, b| a.0.cmp(&b.0));
        known
    }
}
