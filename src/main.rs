use clap::Parser;
use log::{error, LevelFilter};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracker_chain::storage::{BlockStore, Mempool, StorageCipher};
use tracker_chain::{
    p2p, Chain, Command, Config, NodeKeyPair, Opt, Node, start_miner_worker, start_sync_worker,
    GLOBAL_CONFIG,
};

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Start { config } => {
            if let Some(path) = config {
                GLOBAL_CONFIG.replace(Config::load(&path)?.settings());
            }
            let settings = GLOBAL_CONFIG.settings();

            let node = Node::bootstrap(&settings)?;
            start_miner_worker(
                Arc::clone(&node),
                Duration::from_secs(settings.miner_interval_secs),
            );
            start_sync_worker(
                Arc::clone(&node),
                Duration::from_secs(settings.sync_interval_secs),
            );
            p2p::start_rpc_server(Arc::clone(&node), settings.rpc_addr.clone());

            // The HTTP surface runs on this thread for the process lifetime.
            p2p::http::serve(node, &settings.node_addr)?;
        }
        Command::PrintChain => {
            let chain = open_chain()?;
            for block in chain.get_all() {
                println!(
                    "Block #{} | Hash: {} | Encrypted: {} | Transactions: {}",
                    block.get_index(),
                    block.get_hash(),
                    block.is_encrypted(),
                    block.get_transactions().len()
                );
                println!("Timestamp: {}", block.get_timestamp());
                println!("Previous Hash: {}", block.get_prev_hash());
                for tx in block.get_transactions() {
                    println!(
                        "  - ID: {} | Type: {} | Status: {}",
                        tx.id,
                        tx.kind,
                        tx.status.as_str()
                    );
                }
                println!("--------------------------------------------------");
            }
        }
        Command::Pool => {
            let cipher = open_cipher()?;
            let pool = Mempool::open(&GLOBAL_CONFIG.data_dir(), cipher)?;
            for tx in pool.get_all() {
                println!(
                    "Tracker {} | Status: {} | Checkpoints: {}",
                    tx.id,
                    tx.status.as_str(),
                    tx.checkpoints.len()
                );
            }
            println!("{} pending trackers", pool.len());
        }
        Command::Keygen => {
            let keys = NodeKeyPair::load_or_create(&GLOBAL_CONFIG.data_dir())?;
            println!("Node public key: {}", hex::encode(keys.public_key()));
        }
    }
    Ok(())
}

fn open_cipher() -> Result<Arc<StorageCipher>, Box<dyn std::error::Error>> {
    let keys = NodeKeyPair::load_or_create(&GLOBAL_CONFIG.data_dir())?;
    Ok(Arc::new(StorageCipher::new(&keys.storage_key()?)?))
}

fn open_chain() -> Result<Chain, Box<dyn std::error::Error>> {
    let store = BlockStore::open(&GLOBAL_CONFIG.data_dir(), open_cipher()?)?;
    Ok(Chain::open(store, GLOBAL_CONFIG.difficulty())?)
}
