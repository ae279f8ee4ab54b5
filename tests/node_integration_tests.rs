//! Node integration tests
//!
//! Exercises the ledger across component boundaries: mining ticks against
//! the pool, longest-valid-chain reconciliation between two real nodes,
//! restart persistence from the encrypted files, and transport loopbacks.

use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;
use tracker_chain::{p2p, CheckpointCompletion, Node, Settings};

fn test_settings(dir: &Path) -> Settings {
    Settings {
        data_dir: dir.to_string_lossy().to_string(),
        subnet_whitelist: vec![],
        difficulty: 1,
        ..Settings::default()
    }
}

/// Create a tracker with a single checkpoint, complete it, and return its id.
fn add_completed_tracker(node: &Node, email: &str) -> String {
    let tracker = node
        .create_tracker(tracker_chain::TrackerDraft {
            kind: "document".to_string(),
            privacy: "private".to_string(),
            creator: "creator@example.org".to_string(),
            checkpoints: vec![tracker_chain::CheckpointDraft {
                email: email.to_string(),
                kind: "internal".to_string(),
                company: String::new(),
                role: "signer".to_string(),
                is_viewable: false,
                note: String::new(),
            }],
        })
        .unwrap();

    node.complete_checkpoint(CheckpointCompletion {
        tracker_id: tracker.id.clone(),
        email: email.to_string(),
        note: String::new(),
        evidence_hash: format!("hash-{email}"),
        evidence_path: format!("evidence/{email}"),
    })
    .unwrap();

    tracker.id
}

fn mine_blocks(node: &Node, count: usize) {
    for i in 0..count {
        add_completed_tracker(node, &format!("miner-{i}@example.org"));
        node.mine_once().unwrap().expect("a block should be mined");
    }
}

fn hashes(node: &Node) -> Vec<String> {
    node.chain()
        .get_all()
        .iter()
        .map(|b| b.get_hash().to_string())
        .collect()
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn wait_for_port(port: u16) {
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("server on port {port} never came up");
}

#[test]
fn test_miner_tick_end_to_end() {
    let dir = tempdir().unwrap();
    let node = Node::bootstrap(&test_settings(dir.path())).unwrap();

    let ids: Vec<String> = (0..3)
        .map(|i| add_completed_tracker(&node, &format!("p{i}@example.org")))
        .collect();

    let block = node.mine_once().unwrap().expect("a block should be mined");

    assert_eq!(node.chain().len(), 2);
    assert_eq!(block.get_transactions().len(), 3);
    for id in &ids {
        assert!(block.contains_tracker(id));
        assert!(node.chain().contains_tracker(id));
    }
    assert!(node.mempool().is_empty());
}

#[test]
fn test_longest_valid_chain_wins_between_nodes() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let node_a = Node::bootstrap(&test_settings(dir_a.path())).unwrap();
    let node_b = Node::bootstrap(&test_settings(dir_b.path())).unwrap();

    mine_blocks(&node_a, 2); // length 3
    mine_blocks(&node_b, 4); // length 5

    let a_before = hashes(&node_a);

    // B's chain wins; A's previously-unique blocks are discarded.
    assert!(node_a
        .chain()
        .replace_chain(node_b.chain().get_all())
        .unwrap());
    assert_eq!(hashes(&node_a), hashes(&node_b));
    for old in &a_before[1..] {
        assert!(!hashes(&node_a).contains(old));
    }

    // The shorter direction never replaces.
    assert!(!node_b.chain().replace_chain(node_a.chain().get_all()[..3].to_vec()).unwrap());
}

#[test]
fn test_state_survives_restart_from_encrypted_files() {
    let dir = tempdir().unwrap();
    let (chain_hashes, pending_id) = {
        let node = Node::bootstrap(&test_settings(dir.path())).unwrap();
        mine_blocks(&node, 2);
        let pending = add_completed_tracker(&node, "still-pending@example.org");
        (hashes(&node), pending)
    };

    let reopened = Node::bootstrap(&test_settings(dir.path())).unwrap();
    assert_eq!(hashes(&reopened), chain_hashes);
    assert!(reopened.mempool().contains(&pending_id));

    // The pending tracker gets mined after the restart, not re-created.
    reopened.mine_once().unwrap().expect("a block should be mined");
    assert!(reopened.chain().contains_tracker(&pending_id));
    assert!(reopened.mempool().is_empty());
}

#[test]
fn test_http_sync_pulls_a_longer_peer_chain() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();

    let node_b = Node::bootstrap(&test_settings(dir_b.path())).unwrap();
    mine_blocks(&node_b, 2);
    let pool_id = add_completed_tracker(&node_b, "pooled@example.org");

    let port = free_port();
    let server_node = Arc::clone(&node_b);
    thread::spawn(move || {
        let _ = p2p::http::serve(server_node, &format!("127.0.0.1:{port}"));
    });
    wait_for_port(port);

    let mut settings_a = test_settings(dir_a.path());
    settings_a.static_peers = vec![format!("http://127.0.0.1:{port}")];
    let node_a = Node::bootstrap(&settings_a).unwrap();

    assert_eq!(node_a.sync_once(), 1);

    // A adopted B's chain wholesale and merged B's pending pool.
    assert_eq!(hashes(&node_a), hashes(&node_b));
    assert!(node_a.mempool().contains(&pool_id));

    // A second tick is idempotent.
    assert_eq!(node_a.sync_once(), 1);
    assert_eq!(hashes(&node_a), hashes(&node_b));
}

#[test]
fn test_rpc_transport_matches_http_semantics() {
    let dir = tempdir().unwrap();
    let node = Node::bootstrap(&test_settings(dir.path())).unwrap();
    mine_blocks(&node, 1);

    let port = free_port();
    let server_node = Arc::clone(&node);
    thread::spawn(move || {
        let _ = p2p::rpc::serve(server_node, &format!("127.0.0.1:{port}"));
    });
    wait_for_port(port);
    let peer = format!("rpc://127.0.0.1:{port}");

    // Pulls see the same ledger the engine holds.
    let latest = p2p::fetch_latest_block(&peer).expect("latest block over RPC");
    assert_eq!(latest.get_hash(), node.chain().last_block().get_hash());
    let chain = p2p::fetch_chain(&peer);
    assert_eq!(chain.len(), node.chain().len());

    // A pushed pool entry lands exactly once.
    let tracker = node.chain().all_trackers().pop().unwrap();
    p2p::push_transaction(&peer, &tracker).unwrap();
    p2p::push_transaction(&peer, &tracker).unwrap();
    assert_eq!(node.mempool().len(), 1);

    // An unreachable peer yields empty results, not failures.
    let dead = format!("rpc://127.0.0.1:{}", free_port());
    assert!(p2p::fetch_latest_block(&dead).is_none());
    assert!(p2p::fetch_chain(&dead).is_empty());
}
