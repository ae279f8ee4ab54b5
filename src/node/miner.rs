use crate::node::Node;
use log::warn;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Start the periodic miner loop. Runs for the process lifetime; a failed
/// tick (for instance a tip moved by a concurrent peer block, invalidating
/// the candidate's linkage) is logged and retried on the next tick.
pub fn start_miner_worker(node: Arc<Node>, interval: Duration) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("miner".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            if let Err(e) = node.mine_once() {
                warn!("Miner tick failed, retrying next tick: {e}");
            }
        })
        .expect("Failed to spawn miner worker thread")
}
