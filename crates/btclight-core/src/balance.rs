//! Raw transaction helpers.
//!
//! Decoding and script-to-address matching are delegated to the `bitcoin`
//! crate. Nothing here touches the header chain: the light client first
//! checks the proof, then asks this module what the proven transaction pays.

use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::{Address, ScriptBuf, Transaction};

use crate::constants::Network;
use crate::error::BalanceError;
use crate::types::Hash256;

/// Decode a hex-encoded transaction in consensus serialization.
///
/// Both legacy and segwit encodings are accepted. Trailing bytes are an error.
pub fn decode_transaction(tx_hex: &str) -> Result<Transaction, BalanceError> {
    let bytes = hex::decode(tx_hex.trim()).map_err(|e| BalanceError::InvalidTransaction(e.to_string()))?;
    bitcoin::consensus::deserialize(&bytes).map_err(|e| BalanceError::InvalidTransaction(e.to_string()))
}

/// Txid of `tx` (witness data excluded) in internal byte order.
pub fn transaction_id(tx: &Transaction) -> Hash256 {
    Hash256(tx.compute_txid().to_byte_array())
}

/// Address encoding used on `network`.
///
/// Simnet has its own address prefixes that the `bitcoin` crate does not
/// know, so it has no mapping.
pub fn address_network(network: Network) -> Result<bitcoin::Network, BalanceError> {
    match network {
        Network::Mainnet => Ok(bitcoin::Network::Bitcoin),
        Network::Testnet3 => Ok(bitcoin::Network::Testnet),
        Network::Signet => Ok(bitcoin::Network::Signet),
        Network::Regressionnet => Ok(bitcoin::Network::Regtest),
        Network::Simnet => Err(BalanceError::UnsupportedNetwork(network.name().to_string())),
    }
}

/// Output script an address pays to, checked against `network`.
pub fn address_script(address: &str, network: Network) -> Result<ScriptBuf, BalanceError> {
    let target = address_network(network)?;
    let unchecked = Address::<NetworkUnchecked>::from_str(address.trim())
        .map_err(|e| BalanceError::InvalidAddress(format!("{address}: {e}")))?;
    let checked = unchecked
        .require_network(target)
        .map_err(|e| BalanceError::InvalidAddress(format!("{address}: {e}")))?;
    Ok(checked.script_pubkey())
}

/// Total value, in satoshis, of the outputs of `tx` paying `address`.
///
/// Every matching output counts, wherever it sits in the output list. A
/// transaction that pays the address nothing yields zero.
pub fn address_balance(tx: &Transaction, address: &str, network: Network) -> Result<u64, BalanceError> {
    let script = address_script(address, network)?;
    tx.output
        .iter()
        .filter(|out| out.script_pubkey == script)
        .try_fold(0u64, |total, out| total.checked_add(out.value.to_sat()))
        .ok_or(BalanceError::AmountOverflow)
}
