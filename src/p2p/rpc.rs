use crate::core::{Block, Tracker};
use crate::error::{LedgerError, Result};
use crate::node::Node;
use crate::utils::{deserialize, serialize};
use log::{error, info, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const IO_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on a single frame; a full chain fetch stays well under this.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Binary RPC requests, bincode-encoded in length-prefixed frames. One
/// request per connection. Semantically equivalent to the HTTP surface.
#[derive(Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub enum RpcRequest {
    PushBlock(Block),
    PushTransaction(Tracker),
    GetLatestBlock,
    GetChain,
    GetPool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub enum RpcResponse {
    Ack { applied: bool },
    LatestBlock(Block),
    Chain(Vec<Block>),
    Pool(Vec<Tracker>),
    Error(String),
}

/// Run the RPC listener, one handler thread per inbound connection.
pub fn serve(node: Arc<Node>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| LedgerError::Io(format!("Failed to bind RPC listener on {addr}: {e}")))?;
    info!("RPC server listening on {addr}");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let node = Arc::clone(&node);
                thread::spawn(move || {
                    if let Err(e) = handle_connection(&node, stream) {
                        warn!("RPC connection failed: {e}");
                    }
                });
            }
            Err(e) => error!("Error accepting RPC connection: {e}"),
        }
    }

    Ok(())
}

fn handle_connection(node: &Node, mut stream: TcpStream) -> Result<()> {
    stream
        .set_read_timeout(Some(IO_TIMEOUT))
        .map_err(|e| LedgerError::Io(format!("Failed to set read timeout: {e}")))?;
    stream
        .set_write_timeout(Some(IO_TIMEOUT))
        .map_err(|e| LedgerError::Io(format!("Failed to set write timeout: {e}")))?;

    let request: RpcRequest = read_frame(&mut stream)?;
    let response = dispatch(node, request);
    write_frame(&mut stream, &response)
}

fn dispatch(node: &Node, request: RpcRequest) -> RpcResponse {
    match request {
        RpcRequest::PushBlock(block) => match node.receive_block(&block) {
            Ok(applied) => RpcResponse::Ack { applied },
            Err(e) => RpcResponse::Error(e.to_string()),
        },
        RpcRequest::PushTransaction(tx) => match node.mempool().add_if_not_exists(tx) {
            Ok(applied) => RpcResponse::Ack { applied },
            Err(e) => RpcResponse::Error(e.to_string()),
        },
        RpcRequest::GetLatestBlock => RpcResponse::LatestBlock(node.chain().last_block()),
        RpcRequest::GetChain => RpcResponse::Chain(node.chain().get_all()),
        RpcRequest::GetPool => RpcResponse::Pool(node.mempool().get_all()),
    }
}

/// One round trip: connect, send the request frame, read the response frame.
fn call(addr: &str, request: &RpcRequest) -> Result<RpcResponse> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| LedgerError::PeerUnavailable(format!("Invalid RPC address {addr}: {e}")))?;

    let mut stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_read_timeout(Some(IO_TIMEOUT))
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to set timeout: {e}")))?;
    stream
        .set_write_timeout(Some(IO_TIMEOUT))
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to set timeout: {e}")))?;

    write_frame(&mut stream, request)?;
    read_frame(&mut stream)
}

pub fn push_block(addr: &str, block: &Block) -> Result<()> {
    match call(addr, &RpcRequest::PushBlock(block.clone()))? {
        RpcResponse::Ack { .. } => Ok(()),
        RpcResponse::Error(msg) => Err(LedgerError::RejectedBlock(msg)),
        other => Err(unexpected(other)),
    }
}

pub fn push_transaction(addr: &str, tx: &Tracker) -> Result<()> {
    match call(addr, &RpcRequest::PushTransaction(tx.clone()))? {
        RpcResponse::Ack { .. } => Ok(()),
        RpcResponse::Error(msg) => Err(LedgerError::Validation(msg)),
        other => Err(unexpected(other)),
    }
}

pub fn fetch_latest_block(addr: &str) -> Result<Block> {
    match call(addr, &RpcRequest::GetLatestBlock)? {
        RpcResponse::LatestBlock(block) => Ok(block),
        RpcResponse::Error(msg) => Err(LedgerError::PeerUnavailable(msg)),
        other => Err(unexpected(other)),
    }
}

pub fn fetch_chain(addr: &str) -> Result<Vec<Block>> {
    match call(addr, &RpcRequest::GetChain)? {
        RpcResponse::Chain(blocks) => Ok(blocks),
        RpcResponse::Error(msg) => Err(LedgerError::PeerUnavailable(msg)),
        other => Err(unexpected(other)),
    }
}

pub fn fetch_pool(addr: &str) -> Result<Vec<Tracker>> {
    match call(addr, &RpcRequest::GetPool)? {
        RpcResponse::Pool(pool) => Ok(pool),
        RpcResponse::Error(msg) => Err(LedgerError::PeerUnavailable(msg)),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: RpcResponse) -> LedgerError {
    LedgerError::PeerUnavailable(format!("Unexpected RPC response: {response:?}"))
}

fn write_frame<T: bincode::Encode + serde::Serialize>(
    stream: &mut TcpStream,
    payload: &T,
) -> Result<()> {
    let bytes = serialize(payload)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| LedgerError::Serialization("RPC frame too large".to_string()))?;

    stream
        .write_all(&len.to_be_bytes())
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to write frame: {e}")))?;
    stream
        .write_all(&bytes)
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to write frame: {e}")))?;
    stream
        .flush()
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to flush frame: {e}")))?;
    Ok(())
}

fn read_frame<T>(stream: &mut TcpStream) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de> + bincode::Decode<()>,
{
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to read frame length: {e}")))?;

    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(LedgerError::Serialization(format!(
            "RPC frame of {len} bytes exceeds limit"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    stream
        .read_exact(&mut payload)
        .map_err(|e| LedgerError::PeerUnavailable(format!("Failed to read frame body: {e}")))?;
    deserialize(&payload)
}
