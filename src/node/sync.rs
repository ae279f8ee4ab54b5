use crate::node::Node;
use log::debug;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Start the periodic peer-reconciliation loop. Each tick rediscovers
/// peers, pulls their latest block and pool snapshot, and merges them; an
/// unreachable peer only loses its own iteration.
pub fn start_sync_worker(node: Arc<Node>, interval: Duration) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("sync".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            let synced = node.sync_once();
            debug!("Sync tick reconciled {synced} peers");
        })
        .expect("Failed to spawn sync worker thread")
}
