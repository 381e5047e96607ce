//! Per-block undo data.
//!
//! Connecting a block consumes coins; disconnecting it must restore them
//! byte-for-byte. [`BlockUndo`] records every coin a block spent, in input
//! order, so a reorganization can walk back without consulting anything else.
//!
//! Early deployments serialized spent coins without their creation metadata
//! (height and origin). [`SpentCoin`] therefore carries those fields as
//! options, and [`SpentCoin::restore`] backfills missing metadata from a
//! sibling output of the same transaction when one survives in the coin set.
//! When no sibling exists the undo record is unusable and the store is
//! considered corrupt.

use serde::{Deserialize, Serialize};

use ember_core::error::ChainError;
use ember_core::types::{Coin, CoinOrigin, Hash256, TxOutput};

/// A coin consumed by a connected block, as recorded for disconnect.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SpentCoin {
    /// The output that was spent.
    pub output: TxOutput,
    /// Creation height, absent in legacy records.
    pub height: Option<u64>,
    /// Creation origin, absent in legacy records.
    pub origin: Option<CoinOrigin>,
}

impl SpentCoin {
    /// Record a freshly spent coin with full metadata.
    pub fn from_coin(coin: Coin) -> Self {
        Self {
            output: coin.output,
            height: Some(coin.height),
            origin: Some(coin.origin),
        }
    }

    /// Rebuild the [`Coin`] this record stands for.
    ///
    /// When metadata is missing, `sibling` supplies the creation height and
    /// origin; all outputs of one transaction share both. Returns
    /// [`ChainError::CorruptUndo`] when neither the record nor a sibling can
    /// provide them.
    pub fn restore(&self, block_hash: &Hash256, sibling: Option<&Coin>) -> Result<Coin, ChainError> {
        let (height, origin) = match (self.height, self.origin) {
            (Some(h), Some(o)) => (h, o),
            _ => match sibling {
                Some(s) => (s.height, s.origin),
                None => {
                    return Err(ChainError::CorruptUndo {
                        hash: block_hash.to_string(),
                        detail: "spent coin lacks metadata and no sibling survives".into(),
                    });
                }
            },
        };
        Ok(Coin {
            output: self.output.clone(),
            height,
            origin,
        })
    }
}

/// Undo data for one connected block.
///
/// `spent[i]` holds the coins consumed by transaction `i + 1` of the block
/// (the coinbase spends nothing), each in input order.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockUndo {
    /// Spent coins grouped per non-coinbase transaction.
    pub spent: Vec<Vec<SpentCoin>>,
}

impl BlockUndo {
    /// Total number of spent-coin records.
    pub fn coin_count(&self) -> usize {
        self.spent.iter().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(value: u64, height: u64, origin: CoinOrigin) -> Coin {
        Coin {
            output: TxOutput { value, pubkey_hash: Hash256([0xAB; 32]) },
            height,
            origin,
        }
    }

    #[test]
    fn full_record_restores_without_sibling() {
        let original = coin(500, 42, CoinOrigin::Coinbase);
        let record = SpentCoin::from_coin(original.clone());
        let restored = record.restore(&Hash256::ZERO, None).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn legacy_record_backfills_from_sibling() {
        let record = SpentCoin {
            output: TxOutput { value: 500, pubkey_hash: Hash256([0xAB; 32]) },
            height: None,
            origin: None,
        };
        let sibling = coin(900, 42, CoinOrigin::Coinstake);
        let restored = record.restore(&Hash256::ZERO, Some(&sibling)).unwrap();
        assert_eq!(restored.height, 42);
        assert_eq!(restored.origin, CoinOrigin::Coinstake);
        assert_eq!(restored.output.value, 500);
    }

    #[test]
    fn legacy_record_without_sibling_is_corrupt() {
        let record = SpentCoin {
            output: TxOutput { value: 1, pubkey_hash: Hash256::ZERO },
            height: None,
            origin: None,
        };
        let err = record.restore(&Hash256([0x01; 32]), None).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ChainError::CorruptUndo { .. }));
    }

    #[test]
    fn coin_count_sums_across_transactions() {
        let record = SpentCoin::from_coin(coin(1, 0, CoinOrigin::Transfer));
        let undo = BlockUndo {
            spent: vec![vec![record.clone(), record.clone()], vec![record]],
        };
        assert_eq!(undo.coin_count(), 3);
    }

    #[test]
    fn bincode_round_trip() {
        let undo = BlockUndo {
            spent: vec![vec![
                SpentCoin::from_coin(coin(7, 3, CoinOrigin::Coinbase)),
                SpentCoin { output: TxOutput { value: 9, pubkey_hash: Hash256::ZERO }, height: None, origin: None },
            ]],
        };
        let encoded = bincode::encode_to_vec(&undo, bincode::config::standard()).unwrap();
        let (decoded, _): (BlockUndo, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(undo, decoded);
    }
}
