use crate::{
    error::Result,
    fhevm::EncryptedInput,
    types::{
        AccountId,
        CiphertextHandle,
        ContractAddress,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RaceStatus {
    Pending,
    Open,
    Locked,
    Finished,
}

impl RaceStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Open),
            2 => Some(Self::Locked),
            3 => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Open => "Open",
            Self::Locked => "Locked",
            Self::Finished => "Finished",
        };
        f.write_str(label)
    }
}

/// Raw per-race state as read from the contract.
#[derive(Clone, Debug)]
pub struct RaceRecord {
    pub status: RaceStatus,
    pub horses: u8,
    pub total_pool_wei: u128,
    pub winner_horse_id: u8,
}

/// Raw per-account bet as read from the contract. A zero amount means no
/// bet is placed.
#[derive(Clone, Copy, Debug, Default)]
pub struct BetRecord {
    pub horse_id: u8,
    pub amount_wei: u128,
}

/// Settled transaction outcome.
#[derive(Clone, Debug)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub success: bool,
}

/// The caller's bet on one race, as shown to the UI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BetInfo {
    pub horse_id: u8,
    pub amount_wei: u128,
}

/// Per-race derived view produced by the listing operation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub race_id: u64,
    pub status: RaceStatus,
    pub status_label: String,
    pub horses: u8,
    /// Only `Open` races accept bets.
    pub locked: bool,
    pub total_pool_wei: u128,
    pub winner_horse_id: Option<u8>,
    pub my_bet: Option<BetInfo>,
}

/// Chain read/write capability for the race contract. Every method is a
/// suspension point; write methods submit a transaction and await its
/// receipt, with no automatic retry on failure.
pub trait RaceContractClient {
    fn wins_handle(
        &self,
        contract: &ContractAddress,
        caller: &AccountId,
    ) -> impl Future<Output = Result<CiphertextHandle>>;

    fn next_race_id(
        &self,
        contract: &ContractAddress,
    ) -> impl Future<Output = Result<u64>>;

    fn race(
        &self,
        contract: &ContractAddress,
        race_id: u64,
    ) -> impl Future<Output = Result<RaceRecord>>;

    fn bet(
        &self,
        contract: &ContractAddress,
        race_id: u64,
        account: &AccountId,
    ) -> impl Future<Output = Result<BetRecord>>;

    fn increase_wins(
        &self,
        contract: &ContractAddress,
        input: &EncryptedInput,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn decrease_wins(
        &self,
        contract: &ContractAddress,
        input: &EncryptedInput,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn place_bet(
        &self,
        contract: &ContractAddress,
        race_id: u64,
        horse_id: u8,
        amount_wei: u128,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn cancel_bet(
        &self,
        contract: &ContractAddress,
        race_id: u64,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn payout(
        &self,
        contract: &ContractAddress,
        race_id: u64,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn create_race(
        &self,
        contract: &ContractAddress,
        horses: u8,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn lock_race(
        &self,
        contract: &ContractAddress,
        race_id: u64,
    ) -> impl Future<Output = Result<TxReceipt>>;

    fn finish_race(
        &self,
        contract: &ContractAddress,
        race_id: u64,
        winner_horse_id: u8,
    ) -> impl Future<Output = Result<TxReceipt>>;
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn from_code__maps_the_contract_status_codes() {
        assert_eq!(RaceStatus::from_code(0), Some(RaceStatus::Pending));
        assert_eq!(RaceStatus::from_code(1), Some(RaceStatus::Open));
        assert_eq!(RaceStatus::from_code(2), Some(RaceStatus::Locked));
        assert_eq!(RaceStatus::from_code(3), Some(RaceStatus::Finished));
        assert_eq!(RaceStatus::from_code(4), None);
    }

    #[test]
    fn display__matches_the_ui_labels() {
        assert_eq!(RaceStatus::Open.to_string(), "Open");
        assert_eq!(RaceStatus::Finished.to_string(), "Finished");
    }
}
