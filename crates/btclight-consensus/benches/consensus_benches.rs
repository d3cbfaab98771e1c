//! Criterion benchmarks for btclight-consensus critical operations.
//!
//! Covers: header insertion, finalization, and SPV verification against a
//! seeded regtest chain.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use btclight_consensus::LightClient;
use btclight_consensus::checkpoint;
use btclight_core::chain_store::MemoryChainStore;
use btclight_core::constants::Network;
use btclight_core::merkle::PartialMerkleTree;
use btclight_core::spv::SpvProof;
use btclight_core::types::{BlockHeader, Hash256};
use btclight_core::work::{compact_to_target, hash_meets_target};

const REGTEST_BITS: u32 = 0x207fffff;
const MAX_FORK_AGE: u64 = 8;
const T0: u32 = 1_700_000_000;

fn mine(mut header: BlockHeader) -> BlockHeader {
    let (target, _, _) = compact_to_target(header.bits);
    while !hash_meets_target(&header.hash(), target) {
        header.nonce += 1;
    }
    header
}

fn next(parent: &BlockHeader, merkle_root: Hash256) -> BlockHeader {
    mine(BlockHeader {
        version: 4,
        prev_block: parent.hash(),
        merkle_root,
        timestamp: parent.timestamp + 600,
        bits: REGTEST_BITS,
        nonce: 0,
    })
}

fn regtest_chain(len: usize) -> Vec<BlockHeader> {
    let mut headers = vec![mine(BlockHeader {
        version: 4,
        prev_block: Hash256::ZERO,
        merkle_root: Hash256::ZERO,
        timestamp: T0,
        bits: REGTEST_BITS,
        nonce: 0,
    })];
    for i in 1..len {
        let header = next(&headers[i - 1], Hash256::double_sha256(&(i as u64).to_le_bytes()));
        headers.push(header);
    }
    headers
}

fn seeded_store(headers: &[BlockHeader]) -> MemoryChainStore {
    let mut store = MemoryChainStore::new();
    checkpoint::seed(&mut store, 0, headers, MAX_FORK_AGE).expect("seed failed");
    store
}

fn client(store: MemoryChainStore) -> LightClient<MemoryChainStore> {
    LightClient::with_clock(Network::Regressionnet.params(), store, MAX_FORK_AGE, || {
        u64::from(T0) + 10_000_000
    })
    .expect("client")
}

fn bench_insert_header(c: &mut Criterion) {
    let headers = regtest_chain(32);
    let store = seeded_store(&headers);
    let tip = next(&headers[31], Hash256([0xAB; 32]));

    c.bench_function("insert_header_on_tip", |b| {
        b.iter_batched(
            || client(store.clone()),
            |mut lc| lc.insert_header(black_box(tip)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_finalize(c: &mut Criterion) {
    let headers = regtest_chain(32);
    let mut lc = client(seeded_store(&headers));
    lc.insert_header(next(&headers[31], Hash256([0xCD; 32])))
        .expect("insert failed");
    let store = lc.store().clone();

    c.bench_function("finalize_one_step", |b| {
        b.iter_batched(
            || client(store.clone()),
            |mut lc| lc.finalize(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_verify_spv(c: &mut Criterion) {
    let txids: Vec<Hash256> = (0..2780u64)
        .map(|i| Hash256::double_sha256(&i.to_le_bytes()))
        .collect();
    let mut matches = vec![false; txids.len()];
    matches[1234] = true;
    let tree = PartialMerkleTree::build(&txids, &matches).expect("build failed");

    let mut headers = regtest_chain(16);
    let block = next(&headers[15], tree.root());
    headers.push(block);
    let lc = client(seeded_store(&headers));

    let proof = SpvProof::from_tx_out_proof(
        &format!("{}{}", block.to_hex(), hex::encode(tree.encode())),
        &txids[1234],
    )
    .expect("proof");

    c.bench_function("verify_spv_2780_txids", |b| {
        b.iter(|| lc.verify_spv(black_box(&proof)))
    });
}

criterion_group!(benches, bench_insert_header, bench_finalize, bench_verify_spv);
criterion_main!(benches);
