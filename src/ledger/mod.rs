pub mod account;
pub mod client;
pub mod types;

pub use account::LocalAccount;
pub use client::{LedgerApi, MoveRestClient};
pub use types::*;
