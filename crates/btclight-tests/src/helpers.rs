//! Shared fixtures and builders for the integration tests.

use btclight_consensus::{LightClient, checkpoint};
use btclight_core::bootstrap::Bootstrap;
use btclight_core::chain_store::MemoryChainStore;
use btclight_core::constants::{MAX_FORK_AGE_DEFAULT, Network};
use btclight_core::types::{BlockHeader, Hash256};
use btclight_core::work::{compact_to_target, hash_meets_target};

/// Clock reading a few minutes after the newest fixture header.
pub const FIXTURE_NOW: u64 = 1_732_100_000;

/// Checkpoint after seeding [`REGTEST_HEADERS`] with the default fork age.
pub const SEEDED_CHECKPOINT: &str = "7a47c3a083add37394061eba8dbfb1fe2026d3fed6bd3d428b043b515bcb269e";

/// Checkpoint once [`APPEND_HEADER`] is inserted and finalized.
pub const APPENDED_CHECKPOINT: &str = "6393fcb4ba7189f914c2f74fad2bd0ef7743c867b4a81db458f9f9e506458fe7";

/// Regtest chain, heights 0 through 17.
pub const REGTEST_HEADERS: [&str; 18] = [
    "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4adae5494dffff7f2002000000",
    "0000002006226e46111a0b59caaf126043eb5bbf28c34f3a5e332a1fc7b2b73cf188910f2fe76e709f3031b5ed684f098b5cd35a09633943d141a6d0525f34a1643dcf44e0b23c67ffff7f2002000000",
    "000000205dcd36bceabfc1816ab17503f753e8de66be7ceddee2b8b806b85e61cf9fdc68ce1efdd1cb457e408bc2984151f5ba8e7efcf8a64c2ca9f23de07a3e718a7e9de1b23c67ffff7f2001000000",
    "00000020866a367051ccd8849186173fe851392406fc1ac4b444776466260a34b58820351ab2820d880bf70bfe937525e3e7cdd48142186d7fefbef16c42f235f923aa70e1b23c67ffff7f2000000000",
    "00000020849665c354e016f4ada91e1bb4d77cfe85e8c40b466641455bd3df70d1e80d363862bfea99b4b68243fcc88e8166a89ace00f5a10a8720e9603684bed07a6278e2b23c67ffff7f2002000000",
    "000000203b05a05cb26319f421e41c1391ce11d94d7648396c74096560951c4bf412d7174339e31618fee9e9d0acad931c64d6a0785b66cea24a3ef630962f3bd272530be2b23c67ffff7f2000000000",
    "000000202cbb8366b0051b44757d626cb859631994adc82399ad37ce0b04edf01e829924ac2b58bde3db81c8aea571e4c90d4f638164ab8debd192c44767575bfc28edbbe2b23c67ffff7f2000000000",
    "00000020f8557187addf502f0bbf3fa3a7baa9c5021166315c5b62c7c5ab63f69726ce646e4393f90540542998e3934f0181df08d07afb0daa8e0bedb23e603523739aaae2b23c67ffff7f2004000000",
    "000000203890e056da2ec78018dc491b61cfbb3134c88ee0f76e838db758b7ce7a237327f97921cc0471669591969f0eb960a67d72ff58d19496a58c9bf48c477fb80242e3b23c67ffff7f2000000000",
    "000000204716da4899c77d5c64a0f17ff69c568f31d5c5429939ade626c6ef58cf972437ad21b69fc615dee7c8c940526a690bb81205b634ab0992ec465e7a2fb39df4a2e3b23c67ffff7f2001000000",
    "000000207b58138803dfe75a1a035a8519489acefde0768e1b3295fb988ea93dd8199926f6a63660b9a502ed33eacf7130b980208e73c63c623ca27cb6f4185550d0a262e3b23c67ffff7f2000000000",
    "000000209e26cb5b513b048b423dbdd6fed32620feb1bf8dba1e069473d3ad83a0c3477ae4e0efa71fc24467985b923badf291bb5cd62b81bfa4aeec335b86e091f964bae3b23c67ffff7f2001000000",
    "00000020e78f4506e5f9f958b41da8b467c84377efd02bad4ff7c214f98971bab4fc936399c8a0513e6e0f2c9f804d1644a779789f0b0a9b47c0b1e26f08ae08e5ff967ae3b23c67ffff7f2000000000",
    "00000020b084bde47ad161583492f9d397d6cfc87950bef4d80b5720684fe952fe189327d60d5179f5512c82cd32a46176260dee781e0c30f499f81ce7e2fcda8a50bfa9e3b23c67ffff7f2003000000",
    "0000002054775e67825f7a4caf14b3fabe95af99a4204f5c3960b935aa429966e1e143498af4ff5bc198b3ab10e9d542be5e0c0e0e8d249e7d4bfa19eb2517c978f06737e4b23c67ffff7f2007000000",
    "00000020f972e238a280d6a3f0eb7560deae346c29fdd0203722510e0a82f792f1020933a5f456f5967ce558ac2da01200814edd3b045f9f7f1a6f8235086260d3ea4a80e4b23c67ffff7f2000000000",
    "00000020b27998bce45300e48a19d64f57fb219c82e7edc283da74b73eeb4125db49d51bee3a55f8afeef128522c5a0ef633840e098d5288d077eb9c1bd6a1e01bf333b1e4b23c67ffff7f2001000000",
    "0000002018c821aeb4f94b3847dccc7946ff82a4d022a9e87162bc0601992b7dbaf12b432237b251c5f3473a3ece242cb340c6c7d69ec9db9579d57c38069341dfabcf98bdb43c67ffff7f2000000000",
];

/// Extends the tip at height 17.
pub const APPEND_HEADER: &str =
    "000000201dc5f8e7cdb2dda12a307615bd0b9847c60f813baff61a591cb15c44f6a242205abc34309a00ac2983bb4cf1bc76ebc8800ec9965d423508fba603eb763b9215bdb43c67ffff7f2002000000";

/// Second child of height 16.
pub const CREATE_FORK_HEADER: &str =
    "0000002018c821aeb4f94b3847dccc7946ff82a4d022a9e87162bc0601992b7dbaf12b43b275a58e2107b29a5735d8c6bd63d674ef01d4596c78961f338e5a364693b03502b53c67ffff7f2000000000";

/// Child of the genesis block, far below the checkpoint.
pub const FORK_TOO_OLD_HEADER: &str =
    "0000002006226e46111a0b59caaf126043eb5bbf28c34f3a5e332a1fc7b2b73cf188910f91bf7fc009e51a44f6c7b063e64d80b36af5cb8bc9879b9dadc7eebec779a70b437f3c67ffff7f2001000000";

/// [`CREATE_FORK_HEADER`] with a corrupted parent hash.
pub const UNKNOWN_PARENT_HEADER: &str =
    "0000002018c8213eb4f94b3847dccc7946ff82a4d022a9e87162bc0601992b7dbaf12b43b275a58e2107b29a5735d8c6bd63d674ef01d4596c78961f338e5a364693b03502b53c67ffff7f2000000000";

/// Seven headers extending [`APPEND_HEADER`], heights 19 through 25.
pub const APPEND_CHAIN: [&str; 7] = [
    "000000201bb3e1c443436f66b4cd58bad75748ceddd9d5737cf8c28bfffe3be786e21f6df83b5f5af28fbbac9795e543e2ef0f97bf9137305483e6c2fe59771a59303d89e1bd3d67ffff7f2002000000",
    "0000002029539cf7f719b9ab72fccace6bdf9429fa9e5b3a34338f674e82c697822ee0724dbbfdc4c44cccd0a450db68a4223e47c8ecd859c00759e98b7fd227d6ad7e21e1bd3d67ffff7f2000000000",
    "0000002008f3a2e5297fc16ac46bb17ff9f39d1f631836f9d83de21ed6cbecdf26334f15341daa558da062aa4af3020410d94df326a7e674a85b4201a8524e9098a5bdfbe1bd3d67ffff7f2000000000",
    "000000202d71344e38568cc35604fec0421107143482fafc945b3291eaab4758bcb4db11c0d28e3d5b868addec8bd15b6feaa883b867f672062f5099b720f6390565df3de1bd3d67ffff7f2005000000",
    "00000020f004fcfd82e23c77592bb920a817a9fc3c93854203b906ca728d240f986e6d4d9266200adb7bdef93d07e9c050a7b3e2d33f0d8324389999b21405d3e2ec77b7e1bd3d67ffff7f2000000000",
    "00000020f07faecc9a8a61cee690a7756f8112df5f5bfb94e5c64f39a3e61e4f8b8db35bbd276e146642e535fccf8bee242895bbdfefe92f2efcb5069e339366bf2c59e5e1bd3d67ffff7f200a000000",
    "000000203325626e050e9f17884eb04c08f89d4c689879e86bae5518ba0e77535de63976e9413b0e69182999433ea49fc52e8bb29c8d3ff7ff69c58da5f3d7978e23ea5fe2bd3d67ffff7f2000000000",
];

/// `gettxoutproof` output for the first transaction of a 2780-transaction
/// mainnet block.
pub const MAINNET_TXOUTPROOF: &str = "00e0002000471175ec71a72541c100f21bb79f9da0e5ca98259a000000000000000000004769eae15b51056127304c5dec6d94c7840f8f922c0b65bc32177cb46ce05de9b8c10866d36203175dae051fdc0a00000d625aa7b5510f7c003624338259d21544e61ccb3666792dde9734b7621d2cf80bb81ffa45657310bdc47ad3b3f5e5346c150d4fc1b98a5446cc560c6f38f7156138761aab058be861e51fe52ea7cf7b4914a1e1b159ecebe46b51db0ec5cfd4c2324ae9c132169d1f133981632895c216a8e3c3d3a9cea545fade4c0ab8b626a2791862728b657abbdb06dedcc3faabee9d72ce6b8252b45fc99d6fe0f79cec401e1a431774d8830b962e5dee97fc96f4f85f84a6e50b986a37b35318537a81f3f8c604554e5b4f5ca4b4437caa3b0723896396532c1985d52f42f915084534c6bedb4ded1238781d23be0173b94ca25d7faff2832ac99fa16b2f9b219ff276062f100d4b7ce774ba405fbad36b65165e2e5aece3e0b9718886d7b24708be5ae72d10911e9301811b19fcb218ce7dfee31729f4ef56a3d8f31670865a039b3678b34fcb47f12bd157a064339c3e91a960c5a14b9e8da9c8ce211a02bb94e7165a1668d8a17663e95adcdacdbc8e8ab793e8796fda9b270ca957e67aa33dc95cff158cb2ff6882064942ef545612a8eceb3c60415d677d170f4351ede1f7a8807504ff1f0000";

/// Transaction covered by [`MAINNET_TXOUTPROOF`].
pub const MAINNET_TXID: &str = "0bf82c1d62b73497de2d796636cb1ce64415d25982332436007c0f51b5a75a62";

/// Height the proof block is seeded at; the proof itself carries none.
pub const MAINNET_PROOF_HEIGHT: u64 = 836_000;

/// `gettxoutproof` output for one transaction of a 971-transaction
/// mainnet block; the proven transaction is [`MAINNET_BALANCE_TX`].
pub const MAINNET_BALANCE_TXOUTPROOF: &str = "000000202834abd71bdd0d3298542af4506918ea168ce002936b040000000000000000001da8757e4d756e848245cacf3e103c1b9f6ed2405c6d818a73172c8ec72856d4db3864606fdf0c17dcc1000ccb0300000cb86343fc64abcdab51e530303a4ee2b420fa6b5a12b435c9c76fe953ca5471ca074a0bfaf4462cef0a5665b89fd7fd5e4f8536630cde6824d09b20400b2f65eed9f744b2dc695b0ea0c4afd06310a21b93ddd7270a781acd0ada1afdd23b5750aa59aac6bcb5a037cbc56b9efbfc159a36142a07d23e81c4b89d3dbbc31be1cefe0bb7b0369ffc3b1d530e234987543a2613bbb8b06c86f993a930dee7b9d87f661ef556adc0174c7f180aa28006ee93ce2291302801ecd045c234c00b186ea35ff1e77eac3f113492e2eb12f38b9df452f5831f55c861865ac8f3c7dd06be2377f859ba1d12dea2ec44987796a27d42d5727250c1e0181d6a251f8272f21b9a2034069a2471de43de655619904d43b4665f6ce38741320998dc97838c32c79f1ada066ddf7a441357d55cc42a8906970bff2d5342be694002476733ff593af26f320c10df7ba9a76355438f462c040b598868dfb67c5e88d6d9a426ec8cdd74337d42df6b29e9fb319410848f3ff7228d00dc539e2962d185348ab9663a112a03ff6e00";

/// Segwit transaction paying a P2SH and a P2WSH output.
pub const MAINNET_BALANCE_TX: &str = "010000000001019dcfb29f9a915612fc334232f5bc2b03d710feb85ad4a39e08dc817a426712750100000000ffffffff0270c286000000000017a914a9c923dfcc27c61c114f2170492ccf1155a4484487487b850000000000220020701a8d401c84fb13e6baf169d59684e17abd9fa216c8cc5b9fc63d622ff8c58d040047304402202d211d83acb7cb9dc3c45f86960e39fb195aee33f53d9f2bb7a591b0b328acdc02207734781019fa0821773472e886fc4b73255b989ab3ea3c0c5561af7d7855e301014730440220205f9f2da387e2de609e2f7aeeab106930113cf273993bfe09f392255b8ddecd02203fbc7c7ba2ed262868783528a8e76784ac2a930eb54469a028316791c62d6240016952210375e00eb72e29da82b89367947f29ef34afb75e8654f6ea368e0acdfd92976b7c2103a1b26313f430c4b15bb1fdce663207659d8cac749a0e53d70eff01874496feff2103c96d495bfdd5ba4145e3e046fee45e84a8a48ad05bd8dbb395c011a32cf9f88053ae00000000";

/// Txid of [`MAINNET_BALANCE_TX`].
pub const MAINNET_BALANCE_TXID: &str = "ee652f0b40209bd02468de0c6336854f5efdd79fb865560aef2c46f4fa0b4a07";

/// P2SH address of the first output of [`MAINNET_BALANCE_TX`].
pub const MAINNET_BALANCE_ADDRESS: &str = "3HAm5RaZPeMWXH3qoAdF5oidXMrg2XCWow";

/// Value of that output in satoshis.
pub const MAINNET_BALANCE_SATS: u64 = 8_831_600;

/// Height the balance block is seeded at.
pub const MAINNET_BALANCE_HEIGHT: u64 = 1_000;

/// Decode one fixture header.
pub fn header(hex: &str) -> BlockHeader {
    BlockHeader::from_hex(hex).expect("fixture header")
}

/// Decode a run of fixture headers.
pub fn headers(hexes: &[&str]) -> Vec<BlockHeader> {
    hexes.iter().map(|h| header(h)).collect()
}

/// The fixture chain as a bootstrap document.
pub fn regtest_bootstrap() -> Bootstrap {
    Bootstrap {
        network: Network::Regressionnet,
        start_height: 0,
        headers: headers(&REGTEST_HEADERS),
    }
}

/// Light client seeded with [`REGTEST_HEADERS`] at the default fork age,
/// reading [`FIXTURE_NOW`] as the current time.
pub fn regtest_client() -> LightClient<MemoryChainStore> {
    regtest_client_with_age(MAX_FORK_AGE_DEFAULT)
}

pub fn regtest_client_with_age(max_fork_age: u64) -> LightClient<MemoryChainStore> {
    let mut store = MemoryChainStore::new();
    checkpoint::seed(&mut store, 0, &headers(&REGTEST_HEADERS), max_fork_age).expect("seed fixture chain");
    LightClient::with_clock(Network::Regressionnet.params(), store, max_fork_age, || FIXTURE_NOW)
        .expect("fixture client")
}

/// Light client holding only the block of [`MAINNET_TXOUTPROOF`].
pub fn mainnet_proof_client() -> LightClient<MemoryChainStore> {
    mainnet_client_for(MAINNET_TXOUTPROOF, MAINNET_PROOF_HEIGHT)
}

/// Mainnet light client whose checkpoint is the block heading `proof_hex`.
pub fn mainnet_client_for(proof_hex: &str, height: u64) -> LightClient<MemoryChainStore> {
    let block = header(&proof_hex[..160]);
    let mut store = MemoryChainStore::new();
    checkpoint::seed(&mut store, height, &[block], MAX_FORK_AGE_DEFAULT).expect("seed mainnet block");
    LightClient::with_clock(Network::Mainnet.params(), store, MAX_FORK_AGE_DEFAULT, || FIXTURE_NOW)
        .expect("mainnet client")
}

/// Bump the nonce until the header meets its own target.
pub fn mine(mut header: BlockHeader) -> BlockHeader {
    let (target, _, _) = compact_to_target(header.bits);
    while !hash_meets_target(&header.hash(), target) {
        header.nonce += 1;
    }
    header
}

/// Mined regtest child of `parent` committing to `merkle_root`.
pub fn child(parent: &BlockHeader, merkle_root: Hash256) -> BlockHeader {
    mine(BlockHeader {
        version: 0x2000_0000,
        prev_block: parent.hash(),
        merkle_root,
        timestamp: parent.timestamp + 1,
        bits: parent.bits,
        nonce: 0,
    })
}

/// Mined chain of `len` children on top of `parent`; `tag` keeps chains
/// built on the same parent apart.
pub fn extend(parent: &BlockHeader, len: usize, tag: u8) -> Vec<BlockHeader> {
    let mut chain: Vec<BlockHeader> = Vec::with_capacity(len);
    for i in 0..len {
        let prev = chain.last().copied().unwrap_or(*parent);
        let mut root = [tag; 32];
        root[..8].copy_from_slice(&(i as u64).to_le_bytes());
        chain.push(child(&prev, Hash256(root)));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_chain_is_linked() {
        let chain = headers(&REGTEST_HEADERS);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].prev_block, pair[0].hash());
        }
        assert_eq!(header(APPEND_HEADER).prev_block, chain[17].hash());
        assert_eq!(header(CREATE_FORK_HEADER).prev_block, chain[16].hash());
        assert_eq!(header(FORK_TOO_OLD_HEADER).prev_block, chain[0].hash());
        assert_eq!(header(APPEND_CHAIN[0]).prev_block, header(APPEND_HEADER).hash());
    }

    #[test]
    fn extend_builds_valid_links() {
        let tip = header(REGTEST_HEADERS[17]);
        let chain = extend(&tip, 3, 0xAB);
        assert_eq!(chain[0].prev_block, tip.hash());
        assert_eq!(chain[2].prev_block, chain[1].hash());
        let other = extend(&tip, 1, 0xCD);
        assert_ne!(other[0].hash(), chain[0].hash());
    }
}
