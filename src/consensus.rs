//! Acceptance vote for blocks proposed by peers.
//!
//! There is no agreement protocol here. [`PlaceholderVote`] accepts every well-formed
//! block so the message flow can be exercised end to end; a real policy would replace it.

use crate::blockchain::Block;

/// Verdict on a proposed block, sent back to the proposer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub accepted: bool,
    pub details: String,
}

pub trait ConsensusPolicy: Send + Sync {
    fn vote(&self, block: &Block) -> Vote;
}

/// Always accepts. Not Byzantine-fault-tolerant and not agreement of any kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderVote;

impl ConsensusPolicy for PlaceholderVote {
    fn vote(&self, block: &Block) -> Vote {
        Vote {
            accepted: true,
            details: format!(
                "Block {} accepted by placeholder vote",
                hex::encode(block.hash())
            ),
        }
    }
}
