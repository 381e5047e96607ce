//! Transaction validation.
//!
//! Two levels of validation:
//!
//! - **Structural** ([`validate_transaction_structure`]): context-free checks
//!   on format and internal consistency. No external state required.
//! - **Contextual** ([`validate_transaction`]): coin-aware checks including
//!   signature verification, maturity, finality, and value conservation.
//!
//! Coinbase and coinstake transactions are only structurally validated here.
//! Their payouts depend on the containing block (subsidy plus fees), which is
//! enforced during block connection.

use std::collections::HashSet;

use crate::crypto;
use crate::error::TxError;
use crate::params::{ChainParams, MAX_COINBASE_DATA, MAX_INPUTS, MAX_OUTPUTS, MAX_TX_SIZE};
use crate::types::{Coin, OutPoint, Transaction};

/// Summary of a successfully validated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransaction {
    /// Total value of all spent inputs in sparks.
    pub total_input: u64,
    /// Total value of all created outputs in sparks.
    pub total_output: u64,
    /// Transaction fee in sparks. Zero for coinstakes, whose surplus is the
    /// stake reward rather than a fee.
    pub fee: u64,
}

/// Validate transaction structure (context-free).
///
/// Common checks:
/// - Input and output counts within limits
/// - All output values are non-zero
/// - Total output value does not overflow
/// - Serialized size within [`MAX_TX_SIZE`]
///
/// Coinbase: exactly one null-outpoint input, coinbase data within limit.
/// Outputs may be empty (the proof-of-stake form pays through the coinstake).
///
/// Coinstake: first outpoint non-null, signed inputs, non-empty outputs.
///
/// Regular: non-empty inputs and outputs, no null or duplicate outpoints,
/// 64-byte signature and 32-byte public key on each input.
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), TxError> {
    if tx.inputs.len() > MAX_INPUTS || tx.outputs.len() > MAX_OUTPUTS {
        return Err(TxError::TooManyInputsOrOutputs);
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value == 0 {
            return Err(TxError::ZeroValueOutput(i));
        }
    }

    if tx.total_output_value().is_none() {
        return Err(TxError::ValueOverflow);
    }

    let encoded = bincode::encode_to_vec(tx, bincode::config::standard())
        .map_err(|e| TxError::Serialization(e.to_string()))?;
    if encoded.len() > MAX_TX_SIZE {
        return Err(TxError::OversizedTransaction {
            size: encoded.len(),
            max: MAX_TX_SIZE,
        });
    }

    if tx.is_coinbase() {
        validate_coinbase_structure(tx)
    } else if tx.is_coinstake() {
        validate_coinstake_structure(tx)
    } else {
        validate_regular_structure(tx)
    }
}

fn validate_coinbase_structure(tx: &Transaction) -> Result<(), TxError> {
    if tx.inputs.len() != 1 {
        return Err(TxError::InvalidCoinbase("must have exactly one input".into()));
    }

    if !tx.inputs[0].previous_output.is_null() {
        return Err(TxError::InvalidCoinbase("input must be null outpoint".into()));
    }

    if tx.inputs[0].signature.len() > MAX_COINBASE_DATA {
        return Err(TxError::InvalidCoinbase(format!(
            "data too large: {} > {MAX_COINBASE_DATA}",
            tx.inputs[0].signature.len(),
        )));
    }

    Ok(())
}

fn validate_coinstake_structure(tx: &Transaction) -> Result<(), TxError> {
    if tx.outputs.is_empty() {
        return Err(TxError::InvalidCoinstake("must pay at least one output".into()));
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        if input.previous_output.is_null() {
            return Err(TxError::InvalidCoinstake(format!("null outpoint at input {i}")));
        }
        if !seen.insert(&input.previous_output) {
            return Err(TxError::DuplicateInput(input.previous_output.to_string()));
        }
        if input.signature.len() != 64 || input.public_key.len() != 32 {
            return Err(TxError::BadSignatureEncoding { index: i });
        }
    }

    Ok(())
}

fn validate_regular_structure(tx: &Transaction) -> Result<(), TxError> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TxError::EmptyInputsOrOutputs);
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        if input.previous_output.is_null() {
            return Err(TxError::NullOutpointInRegularTx(i));
        }

        if !seen.insert(&input.previous_output) {
            return Err(TxError::DuplicateInput(input.previous_output.to_string()));
        }

        if input.signature.len() != 64 || input.public_key.len() != 32 {
            return Err(TxError::BadSignatureEncoding { index: i });
        }
    }

    Ok(())
}

/// Check a transaction's inputs against the coin set without verifying
/// signatures.
///
/// Used on the block-connect path, where signature checks are batched and
/// run in parallel after the cheap checks pass. Verifies existence, maturity,
/// and value conservation. Coinstakes are exempt from the conservation check;
/// their surplus is the stake reward, bounded at the block level.
///
/// The `get_coin` function looks a coin up by outpoint, allowing the caller
/// to provide any source (cache layer, in-memory map).
pub fn check_tx_inputs<F>(
    tx: &Transaction,
    get_coin: F,
    spend_height: u64,
    params: &ChainParams,
) -> Result<ValidatedTransaction, TxError>
where
    F: Fn(&OutPoint) -> Option<Coin>,
{
    let mut total_input: u64 = 0;

    for (i, input) in tx.inputs.iter().enumerate() {
        let coin = get_coin(&input.previous_output)
            .ok_or_else(|| TxError::UnknownCoin(input.previous_output.to_string()))?;

        if !coin.is_mature(spend_height, params.coinbase_maturity) {
            return Err(TxError::ImmatureCoin {
                index: i,
                confirmations: coin.confirmations(spend_height),
                required: params.coinbase_maturity,
            });
        }

        total_input = total_input
            .checked_add(coin.output.value)
            .ok_or(TxError::ValueOverflow)?;
    }

    let total_output = tx.total_output_value().ok_or(TxError::ValueOverflow)?;

    if tx.is_coinstake() {
        return Ok(ValidatedTransaction { total_input, total_output, fee: 0 });
    }

    if total_input < total_output {
        return Err(TxError::InsufficientFunds {
            have: total_input,
            need: total_output,
        });
    }

    Ok(ValidatedTransaction {
        total_input,
        total_output,
        fee: total_input - total_output,
    })
}

/// Validate a regular transaction against the coin set (contextual).
///
/// Full validation for mempool admission: structure, finality at the next
/// block, input existence and maturity, inline Ed25519 signature checks, and
/// value conservation. Coinbase and coinstake transactions are rejected;
/// they only make sense inside a block.
pub fn validate_transaction<F>(
    tx: &Transaction,
    get_coin: F,
    next_height: u64,
    next_time: u64,
    params: &ChainParams,
) -> Result<ValidatedTransaction, TxError>
where
    F: Fn(&OutPoint) -> Option<Coin>,
{
    if tx.is_coinbase() {
        return Err(TxError::InvalidCoinbase(
            "coinbase cannot be validated standalone".into(),
        ));
    }
    if tx.is_coinstake() {
        return Err(TxError::InvalidCoinstake(
            "coinstake cannot be validated standalone".into(),
        ));
    }

    validate_transaction_structure(tx)?;

    if !tx.is_final(next_height, next_time) {
        return Err(TxError::NotFinal { height: next_height });
    }

    let result = check_tx_inputs(tx, &get_coin, next_height, params)?;

    for (i, input) in tx.inputs.iter().enumerate() {
        // Lookup succeeded in check_tx_inputs, so unwrap-free re-fetch.
        let Some(coin) = get_coin(&input.previous_output) else {
            return Err(TxError::UnknownCoin(input.previous_output.to_string()));
        };
        crypto::verify_transaction_input(tx, i, &coin.output.pubkey_hash)
            .map_err(|_| TxError::InvalidSignature { index: i })?;
    }

    Ok(result)
}
