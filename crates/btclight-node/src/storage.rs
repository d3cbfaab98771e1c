//! RocksDB-backed persistence for the light client's chain store.
//!
//! The engine runs over an in-memory [`MemoryChainStore`]; this module
//! mirrors it on disk so a restarted node resumes where it stopped. Column
//! families hold retained blocks, the finalized height index, and the
//! checkpoint/fork metadata. Every write is a single atomic [`WriteBatch`].

use std::path::Path;

use primitive_types::U256;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};

use btclight_consensus::ChangeSet;
use btclight_core::chain_store::{ChainStore, MemoryChainStore, StoreSnapshot};
use btclight_core::error::BtcLightError;
use btclight_core::types::{Hash256, LightBlock};

// --- Column family names ---

const CF_BLOCKS: &str = "blocks";
const CF_HEIGHTS: &str = "heights";
const CF_META: &str = "meta";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_BLOCKS, CF_HEIGHTS, CF_META];

// --- Metadata keys ---

const META_CHECKPOINT: &[u8] = b"latest_checkpoint";
const META_BEST_FORK: &[u8] = b"best_fork";
const META_FORK_HEADS: &[u8] = b"fork_heads";

/// On-disk record in the `blocks` column family.
#[derive(bincode::Encode, bincode::Decode)]
struct StoredBlock {
    block: LightBlock,
    /// Cumulative work, big-endian.
    work: [u8; 32],
}

impl StoredBlock {
    fn new(block: LightBlock, work: U256) -> Self {
        let mut bytes = [0u8; 32];
        work.to_big_endian(&mut bytes);
        Self { block, work: bytes }
    }

    fn work(&self) -> U256 {
        U256::from_big_endian(&self.work)
    }
}

fn storage_err(e: impl std::fmt::Display) -> BtcLightError {
    BtcLightError::Storage(e.to_string())
}

/// RocksDB mirror of a [`MemoryChainStore`].
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates the directory and all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BtcLightError> {
        std::fs::create_dir_all(path.as_ref()).map_err(storage_err)?;
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;
        Ok(Self { db })
    }

    /// Whether the database has never been seeded.
    pub fn is_empty(&self) -> Result<bool, BtcLightError> {
        Ok(self.checkpoint_hash()?.is_none())
    }

    /// Write the full contents of `snapshot`, replacing the metadata.
    ///
    /// Used once when a fresh database is seeded from bootstrap headers.
    pub fn persist_snapshot(&self, snapshot: &StoreSnapshot) -> Result<(), BtcLightError> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_heights = self.cf_handle(CF_HEIGHTS)?;
        let mut batch = WriteBatch::default();

        for (lb, work) in &snapshot.blocks {
            batch.put_cf(cf_blocks, lb.hash().as_bytes(), encode_block(*lb, *work)?);
        }
        for (height, hash) in &snapshot.finalized {
            batch.put_cf(cf_heights, Self::height_key(*height), hash.as_bytes());
        }
        self.put_meta(&mut batch, snapshot.checkpoint, snapshot.best_fork, &snapshot.fork_heads)?;

        self.db.write(batch).map_err(storage_err)
    }

    /// Write one batch worth of engine changes.
    ///
    /// Blocks in `changes.inserted` that `store` no longer holds were pruned
    /// later in the same batch and are skipped. Fork heads and the best fork
    /// are copied from `store` as they stand after the batch.
    pub fn persist(&self, changes: &ChangeSet, store: &dyn ChainStore) -> Result<(), BtcLightError> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_heights = self.cf_handle(CF_HEIGHTS)?;
        let mut batch = WriteBatch::default();

        for lb in &changes.inserted {
            let hash = lb.hash();
            if let Some(work) = store.total_work(&hash) {
                batch.put_cf(cf_blocks, hash.as_bytes(), encode_block(*lb, work)?);
            }
        }
        for lb in &changes.finalized {
            batch.put_cf(cf_heights, Self::height_key(lb.height), lb.hash().as_bytes());
        }
        for hash in &changes.pruned {
            batch.delete_cf(cf_blocks, hash.as_bytes());
        }

        let checkpoint = match changes.checkpoint {
            Some(lb) => Some(lb.hash()),
            None => store.checkpoint().map(|lb| lb.hash()),
        };
        self.put_meta(
            &mut batch,
            checkpoint,
            store.best_fork().map(|lb| lb.hash()),
            &store.fork_head_hashes(),
        )?;

        self.db.write(batch).map_err(storage_err)
    }

    /// Read the whole database back as a snapshot.
    pub fn load_snapshot(&self) -> Result<StoreSnapshot, BtcLightError> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_heights = self.cf_handle(CF_HEIGHTS)?;

        let mut blocks = Vec::new();
        for item in self.db.iterator_cf(cf_blocks, IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            let stored = decode_block(&value)?;
            blocks.push((stored.block, stored.work()));
        }

        let mut finalized = Vec::new();
        for item in self.db.iterator_cf(cf_heights, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            let key: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| storage_err("invalid height key length"))?;
            finalized.push((u64::from_be_bytes(key), hash_from_slice(&value)?));
        }

        let fork_heads = match self.get_meta(META_FORK_HEADS)? {
            Some(bytes) => {
                let (heads, _): (Vec<Hash256>, _) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(storage_err)?;
                heads
            }
            None => Vec::new(),
        };

        Ok(StoreSnapshot {
            blocks,
            finalized,
            fork_heads,
            checkpoint: self.checkpoint_hash()?,
            best_fork: self.get_meta_hash(META_BEST_FORK)?,
        })
    }

    /// Rebuild the in-memory store from disk.
    pub fn load(&self) -> Result<MemoryChainStore, BtcLightError> {
        Ok(MemoryChainStore::from_snapshot(self.load_snapshot()?))
    }

    /// Hash of the persisted checkpoint.
    pub fn checkpoint_hash(&self) -> Result<Option<Hash256>, BtcLightError> {
        self.get_meta_hash(META_CHECKPOINT)
    }

    /// A stored block and its cumulative work.
    pub fn get_block(&self, hash: &Hash256) -> Result<Option<(LightBlock, U256)>, BtcLightError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        match self.db.get_cf(cf, hash.as_bytes()).map_err(storage_err)? {
            Some(data) => {
                let stored = decode_block(&data)?;
                Ok(Some((stored.block, stored.work())))
            }
            None => Ok(None),
        }
    }

    /// Hash of the finalized block at `height`.
    pub fn get_block_hash(&self, height: u64) -> Result<Option<Hash256>, BtcLightError> {
        let cf = self.cf_handle(CF_HEIGHTS)?;
        match self.db.get_cf(cf, Self::height_key(height)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(hash_from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), BtcLightError> {
        self.db.flush().map_err(storage_err)
    }

    /// Drop the `blocks` column family so later writes fail.
    #[cfg(test)]
    pub(crate) fn drop_blocks_family(&mut self) -> Result<(), BtcLightError> {
        self.db.drop_cf(CF_BLOCKS).map_err(storage_err)
    }

    // --- Internal helpers ---

    fn put_meta(
        &self,
        batch: &mut WriteBatch,
        checkpoint: Option<Hash256>,
        best_fork: Option<Hash256>,
        fork_heads: &[Hash256],
    ) -> Result<(), BtcLightError> {
        let cf = self.cf_handle(CF_META)?;
        match checkpoint {
            Some(hash) => batch.put_cf(cf, META_CHECKPOINT, hash.as_bytes()),
            None => batch.delete_cf(cf, META_CHECKPOINT),
        }
        match best_fork {
            Some(hash) => batch.put_cf(cf, META_BEST_FORK, hash.as_bytes()),
            None => batch.delete_cf(cf, META_BEST_FORK),
        }
        let heads = bincode::encode_to_vec(fork_heads, bincode::config::standard())
            .map_err(storage_err)?;
        batch.put_cf(cf, META_FORK_HEADS, heads);
        Ok(())
    }

    fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BtcLightError> {
        let cf = self.cf_handle(CF_META)?;
        self.db.get_cf(cf, key).map_err(storage_err)
    }

    fn get_meta_hash(&self, key: &[u8]) -> Result<Option<Hash256>, BtcLightError> {
        self.get_meta(key)?.map(|bytes| hash_from_slice(&bytes)).transpose()
    }

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, BtcLightError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BtcLightError::Storage(format!("missing column family: {name}")))
    }

    /// Encode a height as big-endian bytes for ordered iteration.
    fn height_key(height: u64) -> [u8; 8] {
        height.to_be_bytes()
    }
}

fn encode_block(block: LightBlock, work: U256) -> Result<Vec<u8>, BtcLightError> {
    bincode::encode_to_vec(StoredBlock::new(block, work), bincode::config::standard())
        .map_err(storage_err)
}

fn decode_block(bytes: &[u8]) -> Result<StoredBlock, BtcLightError> {
    let (stored, _): (StoredBlock, _) =
        bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(storage_err)?;
    Ok(stored)
}

fn hash_from_slice(bytes: &[u8]) -> Result<Hash256, BtcLightError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| storage_err("invalid hash length"))?;
    Ok(Hash256(arr))
}
