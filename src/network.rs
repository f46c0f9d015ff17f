//! Peer messaging boundary
//!
//! Only the envelope, the peer registry and the dispatch of incoming messages live
//! here. Sockets and framing belong to whatever transport owns the outbound channels
//! handed out by [`PeerRegistry::connect`].

use crate::blockchain::{Block, Blockchain};
use crate::consensus::ConsensusPolicy;
use crate::error::{LedgerError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    NewBlock,
    ConsensusResult,
    BlockCreationConfirmation,
}

/// Wire envelope: `{"type": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub consensus_reached: bool,
    pub details: String,
}

impl Message {
    fn with_block(kind: MessageType, block: &Block) -> Result<Self> {
        Ok(Message {
            kind,
            content: STANDARD.encode(block.serialize()?),
        })
    }

    pub fn new_block(block: &Block) -> Result<Self> {
        Self::with_block(MessageType::NewBlock, block)
    }

    pub fn block_creation_confirmation(block: &Block) -> Result<Self> {
        Self::with_block(MessageType::BlockCreationConfirmation, block)
    }

    pub fn consensus_result(result: &ConsensusResult) -> Result<Self> {
        let content = serde_json::to_string(result)
            .map_err(|e| LedgerError::Network(format!("Failed to encode consensus result: {}", e)))?;
        Ok(Message {
            kind: MessageType::ConsensusResult,
            content,
        })
    }

    /// Decode the block carried by a `newBlock` or `blockCreationConfirmation` message.
    pub fn decode_block(&self) -> Result<Block> {
        let bytes = STANDARD
            .decode(&self.content)
            .map_err(|e| LedgerError::Network(format!("Invalid base64 block content: {}", e)))?;
        Block::deserialize(&bytes)
    }

    pub fn decode_consensus_result(&self) -> Result<ConsensusResult> {
        serde_json::from_str(&self.content)
            .map_err(|e| LedgerError::Network(format!("Invalid consensus result: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LedgerError::Network(format!("Failed to encode message: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| LedgerError::Network(format!("Invalid message: {}", e)))
    }
}

pub type PeerId = u64;

/// Open peer connections, owned by the server and shared by handle.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, mpsc::UnboundedSender<Message>>>,
    next_id: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. The transport drains the returned receiver onto the connection.
    pub async fn connect(&self) -> (PeerId, mpsc::UnboundedReceiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.write().await.insert(id, tx);
        debug!(peer = id, "peer connected");
        (id, rx)
    }

    pub async fn disconnect(&self, id: PeerId) -> bool {
        let removed = self.peers.write().await.remove(&id).is_some();
        if removed {
            debug!(peer = id, "peer disconnected");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    pub async fn send_to(&self, id: PeerId, message: Message) -> Result<()> {
        let mut peers = self.peers.write().await;
        let sender = peers
            .get(&id)
            .ok_or_else(|| LedgerError::Network(format!("Unknown peer {}", id)))?;
        if sender.send(message).is_err() {
            peers.remove(&id);
            return Err(LedgerError::Network(format!("Peer {} has gone away", id)));
        }
        Ok(())
    }

    /// Send to every peer, dropping those whose channel has closed. Returns the
    /// number of peers reached.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let mut peers = self.peers.write().await;
        let before = peers.len();
        peers.retain(|id, sender| {
            let delivered = sender.send(message.clone()).is_ok();
            if !delivered {
                warn!(peer = *id, "dropping peer with closed channel");
            }
            delivered
        });
        if peers.len() < before {
            debug!(dropped = before - peers.len(), "pruned peers during broadcast");
        }
        peers.len()
    }
}

/// Dispatches incoming messages against the local chain.
pub struct MessageHandler {
    chain: Arc<Blockchain>,
    peers: Arc<PeerRegistry>,
    policy: Box<dyn ConsensusPolicy>,
}

impl MessageHandler {
    pub fn new(
        chain: Arc<Blockchain>,
        peers: Arc<PeerRegistry>,
        policy: Box<dyn ConsensusPolicy>,
    ) -> Self {
        Self {
            chain,
            peers,
            policy,
        }
    }

    /// Offer a locally appended block to every peer for a vote.
    pub async fn announce(&self, block: &Block) -> Result<usize> {
        Ok(self.peers.broadcast(&Message::new_block(block)?).await)
    }

    /// Tell every peer to adopt `block` as its tip.
    pub async fn confirm(&self, block: &Block) -> Result<usize> {
        Ok(self
            .peers
            .broadcast(&Message::block_creation_confirmation(block)?)
            .await)
    }

    pub async fn handle(&self, from: PeerId, message: Message) -> Result<()> {
        match message.kind {
            MessageType::NewBlock => {
                let block = message.decode_block().map_err(|e| {
                    warn!(peer = from, error = %e, "Dropping undecodable newBlock");
                    e
                })?;
                let vote = self.policy.vote(&block);
                let reply = Message::consensus_result(&ConsensusResult {
                    consensus_reached: vote.accepted,
                    details: vote.details,
                })?;
                self.peers.send_to(from, reply).await
            }
            MessageType::ConsensusResult => {
                let result = message.decode_consensus_result().map_err(|e| {
                    warn!(peer = from, error = %e, "Dropping undecodable consensusResult");
                    e
                })?;
                if result.consensus_reached {
                    info!(peer = from, details = %result.details, "Consensus reached");
                } else {
                    warn!(peer = from, details = %result.details, "Consensus not reached");
                }
                Ok(())
            }
            MessageType::BlockCreationConfirmation => {
                let block = message.decode_block().map_err(|e| {
                    warn!(peer = from, error = %e, "Dropping undecodable blockCreationConfirmation");
                    e
                })?;
                let chain = self.chain.clone();
                // Store access is blocking.
                tokio::task::spawn_blocking(move || chain.accept_block(&block))
                    .await
                    .map_err(|e| LedgerError::Network(format!("accept task failed: {}", e)))?
                    .map_err(|e| {
                        warn!(peer = from, error = %e, "Rejected confirmed block");
                        e
                    })
            }
        }
    }
}
