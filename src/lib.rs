//! Client-side coordination layer for the HorseRace FHEVM contract.
//!
//! The wallet context (active chain, active account) can change at any
//! moment, so every asynchronous operation snapshots its
//! [`context::ExecutionContext`] before suspending and silently discards its
//! result if the live context moved on. Operations are single-flight per
//! named slot, and decryption credentials are cached so the user signs one
//! EIP-712 authorization per (account, contracts) pair instead of one per
//! decryption.

pub mod client;
pub mod context;
pub mod contract;
pub mod credential;
pub mod deployment;
pub mod error;
pub mod fhevm;
pub mod storage;
pub mod test_helpers;
pub mod types;

pub use client::{
    ClientSnapshot,
    InFlight,
    Operation,
    RaceController,
};
pub use context::{
    ContextSource,
    ExecutionContext,
};
pub use credential::DecryptionCredential;
pub use deployment::AddressBook;
pub use error::{
    ClientError,
    Result,
};
pub use types::{
    AccountId,
    ChainId,
    CiphertextHandle,
    ClearValue,
    ContractAddress,
    DecryptedValue,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
