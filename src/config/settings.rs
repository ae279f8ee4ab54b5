use crate::error::{LedgerError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

const DEFAULT_NODE_ADDR: &str = "127.0.0.1:3002";
const DEFAULT_RPC_ADDR: &str = "127.0.0.1:3003";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_SUBNET: &str = "172.24.4.";
const DEFAULT_PROBE_PORT: u16 = 3003;
const DEFAULT_DIFFICULTY: usize = 4;
const DEFAULT_MINER_INTERVAL_SECS: u64 = 10;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15;

/// Node settings. The TOML file is optional; every field has a default and
/// every field can be overridden from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind address of the HTTP surface
    pub node_addr: String,
    /// Bind address of the binary RPC surface
    pub rpc_addr: String,
    /// Directory holding encrypted ledger state and key files
    pub data_dir: String,
    /// Statically configured peer addresses (host:port of the HTTP surface)
    pub static_peers: Vec<String>,
    /// Subnet prefixes probed during discovery, e.g. "172.24.4."
    pub subnet_whitelist: Vec<String>,
    /// Port probed on each subnet host
    pub probe_port: u16,
    /// Required leading zero hex characters in a sealed block hash
    pub difficulty: usize,
    pub miner_interval_secs: u64,
    pub sync_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_addr: DEFAULT_NODE_ADDR.to_string(),
            rpc_addr: DEFAULT_RPC_ADDR.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            static_peers: vec![],
            subnet_whitelist: vec![DEFAULT_SUBNET.to_string()],
            probe_port: DEFAULT_PROBE_PORT,
            difficulty: DEFAULT_DIFFICULTY,
            miner_interval_secs: DEFAULT_MINER_INTERVAL_SECS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

impl Settings {
    /// Parse a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("Failed to read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| LedgerError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Apply environment overrides on top of whatever was loaded.
    fn apply_env(&mut self) {
        if let Ok(addr) = env::var("NODE_ADDRESS") {
            self.node_addr = addr;
        }
        if let Ok(addr) = env::var("RPC_ADDRESS") {
            self.rpc_addr = addr;
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            self.data_dir = dir;
        }
        if let Ok(peers) = env::var("STATIC_PEERS") {
            self.static_peers = split_list(&peers);
        }
        if let Ok(subnets) = env::var("SUBNET_WHITELIST") {
            self.subnet_whitelist = split_list(&subnets);
        }
        if let Ok(port) = env::var("PORT_WHITELIST") {
            if let Ok(port) = port.parse() {
                self.probe_port = port;
            }
        }
        if let Ok(difficulty) = env::var("DIFFICULTY") {
            if let Ok(difficulty) = difficulty.parse() {
                self.difficulty = difficulty;
            }
        }
        if let Ok(secs) = env::var("MINER_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.miner_interval_secs = secs;
            }
        }
        if let Ok(secs) = env::var("SYNC_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.sync_interval_secs = secs;
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub struct Config {
    inner: RwLock<Settings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    /// Defaults plus environment overrides. Used by the global instance.
    pub fn from_env() -> Config {
        let mut settings = Settings::default();
        settings.apply_env();
        Config {
            inner: RwLock::new(settings),
        }
    }

    /// Load a TOML file, then apply environment overrides on top of it.
    pub fn load(path: &Path) -> Result<Config> {
        let mut settings = Settings::from_file(path)?;
        settings.apply_env();
        Ok(Config {
            inner: RwLock::new(settings),
        })
    }

    pub fn settings(&self) -> Settings {
        self.inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen")
            .clone()
    }

    pub fn replace(&self, settings: Settings) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        *inner = settings;
    }

    pub fn node_addr(&self) -> String {
        self.settings().node_addr
    }

    pub fn rpc_addr(&self) -> String {
        self.settings().rpc_addr
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(self.settings().data_dir)
    }

    pub fn difficulty(&self) -> usize {
        self.settings().difficulty
    }
}
