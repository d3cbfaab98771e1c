//! Ancestor lookups for header validation.
//!
//! Unfinalized blocks are ambiguous by height, so the validator walks a
//! fork slice collected by the engine (parent first, checkpoint last).
//! Below the checkpoint the chain is linear and resolved through the
//! store's height index.

use crate::chain_store::ChainStore;
use crate::types::{Hash256, LightBlock};

/// A block reachable from the header being validated.
#[derive(Clone, Copy)]
pub enum AncestorView<'a> {
    /// `chain[index]` of a fork slice ordered from parent to checkpoint.
    Fork {
        chain: &'a [LightBlock],
        index: usize,
        store: &'a dyn ChainStore,
    },
    /// A finalized block found through the height index.
    Finalized {
        block: LightBlock,
        store: &'a dyn ChainStore,
    },
}

impl<'a> AncestorView<'a> {
    /// View of the first block of a fork slice. `None` if `chain` is empty.
    pub fn from_fork(chain: &'a [LightBlock], store: &'a dyn ChainStore) -> Option<Self> {
        if chain.is_empty() {
            return None;
        }
        Some(Self::Fork { chain, index: 0, store })
    }

    /// View of a finalized block.
    pub fn finalized(block: LightBlock, store: &'a dyn ChainStore) -> Self {
        Self::Finalized { block, store }
    }

    pub fn block(&self) -> LightBlock {
        match self {
            Self::Fork { chain, index, .. } => chain[*index],
            Self::Finalized { block, .. } => *block,
        }
    }

    pub fn height(&self) -> u64 {
        self.block().height
    }

    pub fn bits(&self) -> u32 {
        self.block().header.bits
    }

    pub fn timestamp(&self) -> u32 {
        self.block().header.timestamp
    }

    pub fn hash(&self) -> Hash256 {
        self.block().hash()
    }

    fn store(&self) -> &'a dyn ChainStore {
        match self {
            Self::Fork { store, .. } | Self::Finalized { store, .. } => *store,
        }
    }

    /// The parent block, or `None` when it is not retained.
    pub fn parent(&self) -> Option<Self> {
        if let Self::Fork { chain, index, store } = *self {
            if index + 1 < chain.len() {
                return Some(Self::Fork { chain, index: index + 1, store });
            }
        }
        let block = self.block();
        let height = block.height.checked_sub(1)?;
        let store = self.store();
        store
            .light_block_at_height(height)
            .filter(|p| p.hash() == block.prev_block())
            .map(|p| Self::finalized(p, store))
    }

    /// The ancestor at `height`, or `None` when above this block or not retained.
    pub fn ancestor(&self, height: u64) -> Option<Self> {
        let own = self.height();
        if height > own {
            return None;
        }
        if height == own {
            return Some(*self);
        }
        if let Self::Fork { chain, index, store } = *self {
            let offset = (own - height) as usize;
            if index + offset < chain.len() {
                return Some(Self::Fork { chain, index: index + offset, store });
            }
        }
        let store = self.store();
        store
            .light_block_at_height(height)
            .map(|lb| Self::finalized(lb, store))
    }
}
