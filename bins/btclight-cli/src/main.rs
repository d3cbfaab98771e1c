//! btclight-cli: command-line client for the btclight node's JSON-RPC API.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::Value;
use tracing::debug;

use btclight_core::balance;
use btclight_core::bootstrap;
use btclight_core::constants::DEFAULT_RPC_PORT;
use btclight_core::spv::SpvProof;
use btclight_core::types::BlockHeader;

/// Command-line client for a btclight node.
#[derive(Parser)]
#[command(name = "btclight-cli")]
#[command(version, about = "Query and feed a btclight header light client")]
struct Cli {
    /// RPC endpoint URL.
    #[arg(short, long, global = true, default_value_t = format!("http://127.0.0.1:{DEFAULT_RPC_PORT}"))]
    rpc_endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the node answers.
    Ping {
        #[arg(default_value_t = 1)]
        n: u64,
    },
    /// Submit headers from the command line or a bootstrap-format file.
    InsertHeaders(InsertArgs),
    /// Show the latest finalized block.
    Tip,
    /// Show the fork head with the most work.
    BestFork,
    /// Check whether a block hash is retained.
    Contains { hash: String },
    /// Print the finalized header at a height.
    Header {
        height: u64,
        /// Decode the header fields instead of printing hex.
        #[arg(long)]
        decode: bool,
    },
    /// Verify an SPV proof given as JSON (file path or inline).
    VerifySpv { proof: String },
    /// Verify a JSON array of SPV proofs (file path or inline).
    VerifySpvBatch { proofs: String },
    /// Verify `gettxoutproof` output for a transaction.
    VerifyTxOutProof { proof: String, txid: String },
    /// Show what a finalized transaction pays to an address, in satoshis.
    VerifyBalance(BalanceArgs),
}

#[derive(Args)]
struct BalanceArgs {
    /// Raw transaction hex.
    tx: String,
    /// Address whose outputs are summed.
    address: String,
    /// SPV proof JSON (file path or inline).
    proof: String,
    /// Treat `proof` as `gettxoutproof` hex for the transaction instead.
    #[arg(long)]
    tx_out_proof: bool,
}

#[derive(Args)]
struct InsertArgs {
    /// Hex-encoded 80-byte headers.
    headers: Vec<String>,

    /// Read headers from the `blockheaders` list of a bootstrap JSON file.
    #[arg(long, conflicts_with = "headers")]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = HttpClientBuilder::default()
        .build(&cli.rpc_endpoint)
        .context("Failed to connect to RPC")?;

    match cli.command {
        Commands::Ping { n } => {
            let reply: u64 = call(&client, "ping", params(&[Value::from(n)])?).await?;
            println!("pong {reply}");
        }
        Commands::InsertHeaders(args) => insert_headers(&client, args).await?,
        Commands::Tip => {
            let tip: Value = call(&client, "get_btc_header_chain_tip", ArrayParams::new()).await?;
            println!("{}", serde_json::to_string_pretty(&tip)?);
        }
        Commands::BestFork => {
            let best: Value = call(&client, "get_best_fork", ArrayParams::new()).await?;
            println!("{}", serde_json::to_string_pretty(&best)?);
        }
        Commands::Contains { hash } => {
            let found: bool = call(&client, "contains_btc_block", params(&[Value::from(hash)])?).await?;
            println!("{found}");
        }
        Commands::Header { height, decode } => {
            let hex: String = call(&client, "get_header", params(&[Value::from(height)])?).await?;
            if decode {
                print_header(height, &BlockHeader::from_hex(&hex)?);
            } else {
                println!("{hex}");
            }
        }
        Commands::VerifySpv { proof } => {
            let proof = read_proof(&proof)?;
            let status: Value =
                call(&client, "verify_spv", params(&[serde_json::to_value(&proof)?])?).await?;
            println!("{status}");
        }
        Commands::VerifySpvBatch { proofs } => {
            let proofs: Vec<SpvProof> =
                serde_json::from_str(&read_json(&proofs)?).context("Malformed SPV proof list")?;
            let statuses: Value =
                call(&client, "verify_spv_batch", params(&[serde_json::to_value(&proofs)?])?).await?;
            println!("{statuses}");
        }
        Commands::VerifyTxOutProof { proof, txid } => {
            let status: Value = call(
                &client,
                "verify_tx_out_proof",
                params(&[Value::from(proof), Value::from(txid)])?,
            )
            .await?;
            println!("{status}");
        }
        Commands::VerifyBalance(args) => verify_balance(&client, args).await?,
    }
    Ok(())
}

async fn verify_balance(client: &HttpClient, args: BalanceArgs) -> Result<()> {
    let proof = if args.tx_out_proof {
        let tx = balance::decode_transaction(&args.tx)?;
        SpvProof::from_tx_out_proof(args.proof.trim(), &balance::transaction_id(&tx))?
    } else {
        read_proof(&args.proof)?
    };
    debug!(txid = %proof.tx_id, block = %proof.block_hash, "checking balance");

    let sats: u64 = call(
        client,
        "verify_balance",
        params(&[Value::from(args.tx), Value::from(args.address), serde_json::to_value(&proof)?])?,
    )
    .await?;
    println!("{sats}");
    Ok(())
}

async fn insert_headers(client: &HttpClient, args: InsertArgs) -> Result<()> {
    let headers = match args.file {
        Some(path) => bootstrap::BootstrapData::read(&path)?.blockheaders,
        None => args.headers,
    };
    if headers.is_empty() {
        bail!("no headers given");
    }
    for (index, hex) in headers.iter().enumerate() {
        BlockHeader::from_hex(hex).with_context(|| format!("header {index} is malformed"))?;
    }
    debug!(count = headers.len(), "submitting headers");

    let reply: Value = call(client, "insert_headers", params(&[Value::from(headers)])?).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

/// Inline JSON is passed through; anything else is read as a file path.
fn read_json(arg: &str) -> Result<String> {
    let trimmed = arg.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        Ok(arg.to_string())
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read {arg}"))
    }
}

fn read_proof(arg: &str) -> Result<SpvProof> {
    serde_json::from_str(&read_json(arg)?).context("Malformed SPV proof JSON")
}

fn print_header(height: u64, header: &BlockHeader) {
    let time = chrono::DateTime::from_timestamp(i64::from(header.timestamp), 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| header.timestamp.to_string());
    println!("height:      {height}");
    println!("hash:        {}", header.hash());
    println!("version:     {:#010x}", header.version);
    println!("prev_block:  {}", header.prev_block);
    println!("merkle_root: {}", header.merkle_root);
    println!("time:        {time}");
    println!("bits:        {:#010x}", header.bits);
    println!("nonce:       {}", header.nonce);
}

fn params(values: &[Value]) -> Result<ArrayParams> {
    let mut params = ArrayParams::new();
    for value in values {
        params.insert(value).context("Failed to encode RPC params")?;
    }
    Ok(params)
}

async fn call<R: serde::de::DeserializeOwned>(
    client: &HttpClient,
    method: &str,
    params: ArrayParams,
) -> Result<R> {
    client
        .request(method, params)
        .await
        .with_context(|| format!("RPC {method} failed"))
}
