//! Storage round trips through a real light client, outside the node wrapper.

use btclight_consensus::{ChangeSet, LightClient, checkpoint};
use btclight_core::chain_store::{ChainStore, MemoryChainStore};
use btclight_core::constants::Network;
use btclight_core::types::{BlockHeader, Hash256};
use btclight_core::work::{compact_to_target, hash_meets_target};
use btclight_node_lib::storage::RocksStore;

const REGTEST_BITS: u32 = 0x207fffff;
const AGE: u64 = 4;
const T0: u32 = 1_700_000_000;

fn mine(mut header: BlockHeader) -> BlockHeader {
    let (target, _, _) = compact_to_target(header.bits);
    while !hash_meets_target(&header.hash(), target) {
        header.nonce += 1;
    }
    header
}

fn child(parent: &BlockHeader, tag: u8) -> BlockHeader {
    mine(BlockHeader {
        version: 4,
        prev_block: parent.hash(),
        merkle_root: Hash256([tag; 32]),
        timestamp: parent.timestamp + 600,
        bits: REGTEST_BITS,
        nonce: 0,
    })
}

fn chain(len: usize) -> Vec<BlockHeader> {
    let mut headers = vec![mine(BlockHeader {
        version: 4,
        prev_block: Hash256::ZERO,
        merkle_root: Hash256::ZERO,
        timestamp: T0,
        bits: REGTEST_BITS,
        nonce: 0,
    })];
    for i in 1..len {
        let next = child(&headers[i - 1], i as u8);
        headers.push(next);
    }
    headers
}

fn client(store: MemoryChainStore) -> LightClient<MemoryChainStore> {
    LightClient::with_clock(Network::Regressionnet.params(), store, AGE, || u64::from(T0) + 1_000_000)
        .unwrap()
}

#[test]
fn incremental_writes_match_in_memory_state() {
    let dir = tempfile::tempdir().unwrap();
    let rocks = RocksStore::open(dir.path().join("chaindata")).unwrap();

    let headers = chain(8);
    let mut store = MemoryChainStore::new();
    checkpoint::seed(&mut store, 0, &headers, AGE).unwrap();
    rocks.persist_snapshot(&store.snapshot()).unwrap();
    let mut lc = client(store);

    // A side branch that gets pruned, then a main chain that outgrows it.
    let side = child(&headers[5], 0xF0);
    let mut main = Vec::new();
    let mut parent = headers[7];
    for tag in 0..4u8 {
        parent = child(&parent, 0xA0 + tag);
        main.push(parent);
    }

    for batch in [vec![side], main[..2].to_vec(), main[2..].to_vec()] {
        let mut changes = ChangeSet::default();
        lc.insert_and_finalize(&batch, &mut changes).unwrap();
        rocks.persist(&changes, lc.store()).unwrap();
    }

    assert!(!lc.contains_block(&side.hash()));
    assert!(rocks.get_block(&side.hash()).unwrap().is_none());

    let mut expected = lc.store().snapshot();
    let mut loaded = rocks.load_snapshot().unwrap();
    expected.blocks.sort_by_key(|(lb, _)| lb.hash());
    loaded.blocks.sort_by_key(|(lb, _)| lb.hash());
    assert_eq!(loaded, expected);

    let restored = rocks.load().unwrap();
    assert_eq!(restored.checkpoint(), lc.checkpoint());
    assert_eq!(restored.best_fork(), lc.best_fork());
    assert_eq!(restored.finalized_count(), lc.store().finalized_count());
}

#[test]
fn restored_store_accepts_new_headers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chaindata");
    let headers = chain(8);

    {
        let rocks = RocksStore::open(&path).unwrap();
        let mut store = MemoryChainStore::new();
        checkpoint::seed(&mut store, 0, &headers, AGE).unwrap();
        rocks.persist_snapshot(&store.snapshot()).unwrap();
    }

    let rocks = RocksStore::open(&path).unwrap();
    let mut lc = client(rocks.load().unwrap());
    let next = child(&headers[7], 0xC0);
    let mut changes = ChangeSet::default();
    lc.insert_and_finalize(&[next], &mut changes).unwrap();
    rocks.persist(&changes, lc.store()).unwrap();

    assert_eq!(lc.checkpoint().unwrap().height, 5);
    assert_eq!(rocks.get_block_hash(5).unwrap(), Some(headers[5].hash()));
}
