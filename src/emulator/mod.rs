pub mod block;
pub mod receipt;

pub use block::{block_by_number, fee_history, parse_block_number, EvmBlock, HeadCache};
pub use receipt::{
    transaction_by_hash, transaction_receipt, EvmLog, EvmReceipt, EvmTransaction,
};
