//! Peer-to-peer networking
//!
//! Peer discovery plus two interchangeable transports for the same logical
//! operations: an HTTP JSON surface and a binary RPC surface. A peer
//! address carries its scheme (`http://host:port` or `rpc://host:port`);
//! the dispatch functions here route each call to the right client.
//!
//! Pull calls swallow transport failures into empty results; pushes are
//! fire-and-forget, one thread per peer, never blocking each other.

pub mod http;
pub mod peers;
pub mod rpc;

pub use peers::PeerRegistry;

use crate::core::{Block, Tracker};
use crate::error::Result;
use crate::node::Node;
use log::{info, warn};
use std::sync::Arc;
use std::thread;

const RPC_SCHEME: &str = "rpc://";
const HTTP_SCHEME: &str = "http://";

fn split_scheme(peer: &str) -> (bool, &str) {
    if let Some(addr) = peer.strip_prefix(RPC_SCHEME) {
        (true, addr)
    } else if let Some(addr) = peer.strip_prefix(HTTP_SCHEME) {
        (false, addr)
    } else {
        (false, peer)
    }
}

/// Pull a peer's latest block. A transport error is "peer unavailable" and
/// yields `None`, never a propagated failure.
pub fn fetch_latest_block(peer: &str) -> Option<Block> {
    let (is_rpc, addr) = split_scheme(peer);
    let result = if is_rpc {
        rpc::fetch_latest_block(addr)
    } else {
        http::fetch_latest_block(addr)
    };

    match result {
        Ok(block) => Some(block),
        Err(e) => {
            warn!("Failed to fetch latest block from {peer}: {e}");
            None
        }
    }
}

/// Pull a peer's full chain; empty on failure.
pub fn fetch_chain(peer: &str) -> Vec<Block> {
    let (is_rpc, addr) = split_scheme(peer);
    let result = if is_rpc {
        rpc::fetch_chain(addr)
    } else {
        http::fetch_chain(addr)
    };

    match result {
        Ok(blocks) => blocks,
        Err(e) => {
            warn!("Failed to fetch chain from {peer}: {e}");
            Vec::new()
        }
    }
}

/// Pull a peer's pending-pool snapshot; empty on failure.
pub fn fetch_pool(peer: &str) -> Vec<Tracker> {
    let (is_rpc, addr) = split_scheme(peer);
    let result = if is_rpc {
        rpc::fetch_pool(addr)
    } else {
        http::fetch_pool(addr)
    };

    match result {
        Ok(pool) => pool,
        Err(e) => {
            warn!("Failed to fetch pool from {peer}: {e}");
            Vec::new()
        }
    }
}

pub fn push_block(peer: &str, block: &Block) -> Result<()> {
    let (is_rpc, addr) = split_scheme(peer);
    if is_rpc {
        rpc::push_block(addr, block)
    } else {
        http::push_block(addr, block)
    }
}

pub fn push_transaction(peer: &str, tx: &Tracker) -> Result<()> {
    let (is_rpc, addr) = split_scheme(peer);
    if is_rpc {
        rpc::push_transaction(addr, tx)
    } else {
        http::push_transaction(addr, tx)
    }
}

/// Fire-and-forget block push to every known peer: one thread per peer, no
/// retry, no acknowledgment wait. A failed send is logged and never blocks
/// or fails the sends to other peers.
pub fn broadcast_block(peers: &[String], block: &Block) {
    for peer in peers {
        let peer = peer.clone();
        let block = block.clone();
        thread::spawn(move || match push_block(&peer, &block) {
            Ok(()) => info!("Sent block #{} to {peer}", block.get_index()),
            Err(e) => warn!("Failed to send block to {peer}: {e}"),
        });
    }
}

/// Fire-and-forget transaction push to every known peer.
pub fn broadcast_transaction(peers: &[String], tx: &Tracker) {
    for peer in peers {
        let peer = peer.clone();
        let tx = tx.clone();
        thread::spawn(move || match push_transaction(&peer, &tx) {
            Ok(()) => info!("Sent tracker {} to {peer}", tx.id),
            Err(e) => warn!("Failed to send tracker to {peer}: {e}"),
        });
    }
}

/// Start the binary RPC server in a background thread.
pub fn start_rpc_server(node: Arc<Node>, addr: String) {
    thread::spawn(move || {
        if let Err(e) = rpc::serve(node, &addr) {
            log::error!("RPC server terminated: {e}");
        }
    });
}
