use thiserror::Error;

/// Every fatal condition the core can raise, from the lowest-level byte
/// reader up through block/undo reconciliation.
///
/// Non-fatal signals (warnings, `unknown` classifications, a Merkle
/// mismatch) are never represented here — they are plain fields on the
/// success path.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("read past end: need {need} bytes at offset {offset}, have {len}")]
    ReadPastEnd {
        offset: usize,
        need: usize,
        len: usize,
    },

    #[error("varint overflow")]
    VarintOverflow,

    #[error("amount overflow during decompression")]
    AmountOverflow,

    #[error("bad block magic at offset {offset}")]
    BadMagic { offset: usize },

    #[error("duplicate prevout: txid={txid} vout={vout}")]
    DuplicatePrevout { txid: String, vout: u32 },

    #[error("missing prevout for input: txid={txid} vout={vout}")]
    MissingPrevout { txid: String, vout: u32 },

    #[error("prevout does not correspond to any input: txid={txid} vout={vout}")]
    UnusedPrevout { txid: String, vout: u32 },

    #[error("no undo record matches block {block_index} ({non_coinbase_txs} non-coinbase txs)")]
    BlockUndoMismatch {
        block_index: usize,
        non_coinbase_txs: u64,
    },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
