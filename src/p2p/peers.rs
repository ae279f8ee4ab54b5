use crate::config::Settings;
use log::{debug, info};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, TcpStream, UdpSocket};
use std::sync::RwLock;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Knows which peers exist: the statically configured set plus whatever the
/// best-effort subnet probe finds. Discovery results are cached so that the
/// miner can broadcast without rescanning between sync ticks.
pub struct PeerRegistry {
    static_peers: Vec<String>,
    subnets: Vec<String>,
    probe_port: u16,
    discovered: RwLock<Vec<String>>,
}

impl PeerRegistry {
    pub fn from_settings(settings: &Settings) -> PeerRegistry {
        let static_peers = settings
            .static_peers
            .iter()
            .map(|peer| normalize(peer))
            .collect();

        PeerRegistry {
            static_peers,
            subnets: settings.subnet_whitelist.clone(),
            probe_port: settings.probe_port,
            discovered: RwLock::new(vec![]),
        }
    }

    /// Static peers plus the last discovery result, deduplicated.
    pub fn known(&self) -> Vec<String> {
        let discovered = match self.discovered.read() {
            Ok(discovered) => discovered.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on discovered peers");
                vec![]
            }
        };

        let mut seen = HashSet::new();
        self.static_peers
            .iter()
            .cloned()
            .chain(discovered)
            .filter(|peer| seen.insert(peer.clone()))
            .collect()
    }

    /// Probe the configured subnets and refresh the cache, then return the
    /// full known set. Unreachable addresses are simply excluded; discovery
    /// never fails.
    pub fn discover(&self) -> Vec<String> {
        let self_ip = local_ip();
        let mut found = vec![];
        for subnet in &self.subnets {
            found.extend(scan_subnet(subnet, self.probe_port, self_ip));
        }

        if !found.is_empty() {
            info!("Discovered {} peers by subnet probe", found.len());
        }
        match self.discovered.write() {
            Ok(mut discovered) => *discovered = found,
            Err(_) => log::error!("Failed to acquire write lock on discovered peers"),
        }

        self.known()
    }
}

fn normalize(peer: &str) -> String {
    if peer.starts_with("http://") || peer.starts_with("rpc://") {
        peer.to_string()
    } else {
        format!("http://{peer}")
    }
}

/// Probe every host of a `a.b.c.` prefix on `port` with a short connect
/// timeout. Probed ports speak the binary RPC protocol.
fn scan_subnet(subnet: &str, port: u16, self_ip: Option<IpAddr>) -> Vec<String> {
    let mut peers = vec![];
    for host in 1..=254u8 {
        let ip = format!("{subnet}{host}");
        if let Some(self_ip) = self_ip {
            if ip == self_ip.to_string() {
                continue;
            }
        }

        let Ok(addr) = format!("{ip}:{port}").parse::<SocketAddr>() else {
            continue;
        };
        if TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok() {
            debug!("Probe reached {addr}");
            peers.push(format!("rpc://{addr}"));
        }
    }
    peers
}

/// The address this host routes external traffic from. No packets are sent;
/// connecting a UDP socket just resolves the local endpoint.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip())
}
