use crate::{
    context::{
        ContextSource,
        ExecutionContext,
        ReadContext,
    },
    contract::{
        BetInfo,
        RaceContractClient,
        RaceRecord,
        RaceSnapshot,
        RaceStatus,
    },
    credential,
    deployment::AddressBook,
    error::ClientError,
    fhevm::{
        DecryptRequest,
        EncryptedInputBuilder,
        Eip712Signer,
        FheInstance,
    },
    storage::StringStorage,
    types::{
        ChainId,
        CiphertextHandle,
        ClearValue,
        ContractAddress,
        DecryptedValue,
    },
};
use futures::future::join_all;
use std::sync::{
    Arc,
    Mutex,
};
use tracing::info;

/// Named operation slots. At most one execution per slot is in flight at a
/// time; duplicate triggers return without starting work. All
/// value-changing transactions share the `Call` slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Refresh,
    Decrypt,
    Call,
    LoadRaces,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InFlight {
    pub refreshing: bool,
    pub decrypting: bool,
    pub calling: bool,
    pub loading_races: bool,
}

impl InFlight {
    fn get(&self, op: Operation) -> bool {
        match op {
            Operation::Refresh => self.refreshing,
            Operation::Decrypt => self.decrypting,
            Operation::Call => self.calling,
            Operation::LoadRaces => self.loading_races,
        }
    }

    fn set(&mut self, op: Operation, value: bool) {
        match op {
            Operation::Refresh => self.refreshing = value,
            Operation::Decrypt => self.decrypting = value,
            Operation::Call => self.calling = value,
            Operation::LoadRaces => self.loading_races = value,
        }
    }
}

#[derive(Default)]
struct ControllerState {
    wins_handle: Option<CiphertextHandle>,
    clear_wins: Option<DecryptedValue>,
    races: Option<Vec<RaceSnapshot>>,
    message: String,
    in_flight: InFlight,
}

/// Clears its operation flag when dropped, so the slot is released on every
/// exit path of an operation body.
struct FlightGuard {
    state: Arc<Mutex<ControllerState>>,
    op: Operation,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.state.lock().unwrap().in_flight.set(self.op, false);
    }
}

/// Observable state handed to the UI layer. Affordances (`can_*`) are
/// derived from the same preconditions and in-flight flags the operations
/// themselves consult, so a disabled control is always explainable.
#[derive(Clone, Debug)]
pub struct ClientSnapshot {
    pub chain_id: Option<ChainId>,
    pub contract_address: Option<ContractAddress>,
    pub is_deployed: bool,
    pub wins_handle: Option<CiphertextHandle>,
    pub clear_wins: Option<DecryptedValue>,
    pub is_decrypted: bool,
    pub in_flight: InFlight,
    pub can_refresh: bool,
    pub can_decrypt: bool,
    pub can_update: bool,
    pub message: String,
    pub races: Option<Vec<RaceSnapshot>>,
}

/// Coordinates asynchronous operations against the chain and the FHE
/// coprocessor with single-flight exclusivity and staleness-guarded result
/// application.
///
/// Failures never propagate out of the trigger methods: every failure is
/// converted to a human-readable line on the message channel. There is no
/// automatic retry; re-triggering an operation is the retry mechanism.
pub struct RaceController<X, C, F, G, S> {
    context: X,
    chain: C,
    fhe: F,
    signer: G,
    storage: S,
    addresses: AddressBook,
    state: Arc<Mutex<ControllerState>>,
}

impl<X, C, F, G, S> RaceController<X, C, F, G, S>
where
    X: ContextSource,
    C: RaceContractClient,
    F: FheInstance,
    G: Eip712Signer,
    S: StringStorage,
{
    pub fn new(
        context: X,
        chain: C,
        fhe: F,
        signer: G,
        storage: S,
        addresses: AddressBook,
    ) -> Self {
        Self {
            context,
            chain,
            fhe,
            signer,
            storage,
            addresses,
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Claims the slot for `op`. Returns `None` when the slot or any of the
    /// `blocked_by` slots is busy; duplicate triggers are normal
    /// de-duplication, not an error.
    fn begin(&self, op: Operation, blocked_by: &[Operation]) -> Option<FlightGuard> {
        let mut state = self.state.lock().unwrap();
        if state.in_flight.get(op) {
            return None;
        }
        if blocked_by.iter().any(|other| state.in_flight.get(*other)) {
            return None;
        }
        state.in_flight.set(op, true);
        Some(FlightGuard {
            state: Arc::clone(&self.state),
            op,
        })
    }

    fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.state.lock().unwrap().message = message;
    }

    /// When the live chain is known but carries no deployment, tell the
    /// user; every other missing precondition is silent.
    fn report_not_ready(&self) {
        if let Some(chain_id) = self.context.chain_id()
            && !self.addresses.is_deployed(chain_id)
        {
            let err = ClientError::NotReady(format!(
                "HorseRace not deployed for chain id {chain_id}"
            ));
            self.set_message(err.to_string());
        }
    }

    pub fn last_message(&self) -> String {
        self.state.lock().unwrap().message.clone()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        let chain_id = self.context.chain_id();
        let contract_address = chain_id.and_then(|id| self.addresses.resolve(id));
        let has_account = self.context.account().is_some();
        let state = self.state.lock().unwrap();
        let is_deployed = contract_address.is_some();
        let is_decrypted = matches!(
            (state.wins_handle, &state.clear_wins),
            (Some(handle), Some(clear)) if handle == clear.handle
        );
        let decryptable_handle = state
            .wins_handle
            .is_some_and(|handle| !handle.is_zero())
            && !is_decrypted;
        ClientSnapshot {
            chain_id,
            contract_address,
            is_deployed,
            wins_handle: state.wins_handle,
            clear_wins: state.clear_wins,
            is_decrypted,
            in_flight: state.in_flight,
            can_refresh: is_deployed && has_account && !state.in_flight.refreshing,
            can_decrypt: is_deployed
                && has_account
                && !state.in_flight.refreshing
                && !state.in_flight.decrypting
                && decryptable_handle,
            can_update: is_deployed
                && has_account
                && !state.in_flight.refreshing
                && !state.in_flight.calling,
            message: state.message.clone(),
            races: state.races.clone(),
        }
    }

    fn is_current(&self, ctx: &ExecutionContext) -> bool {
        ctx.is_current(&self.context, &self.addresses)
    }

    /// Reads the caller's encrypted wins handle and publishes it, unless the
    /// context moved on while the read was in flight.
    pub async fn refresh_wins_handle(&self) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            self.state.lock().unwrap().wins_handle = None;
            return;
        };
        let Some(_guard) = self.begin(Operation::Refresh, &[]) else {
            return;
        };

        match self.chain.wins_handle(&ctx.contract, &ctx.account).await {
            Ok(handle) => {
                if self.is_current(&ctx) {
                    self.state.lock().unwrap().wins_handle = Some(handle);
                }
            }
            Err(err) => {
                self.set_message(format!("wins handle refresh failed: {err}"));
            }
        }
    }

    /// Decrypts the current wins handle.
    ///
    /// Skips all work when the handle is already decrypted; reveals the
    /// all-zero sentinel as zero without any external call; otherwise runs
    /// credential acquisition and `userDecrypt` with a staleness re-check
    /// after each suspension point.
    pub async fn decrypt_wins(&self) {
        let handle = {
            let mut state = self.state.lock().unwrap();
            if state.in_flight.refreshing || state.in_flight.decrypting {
                return;
            }
            let Some(handle) = state.wins_handle else {
                state.clear_wins = None;
                return;
            };
            if state
                .clear_wins
                .is_some_and(|clear| clear.handle == handle)
            {
                // already decrypted; nothing to do
                return;
            }
            if handle.is_zero() {
                state.clear_wins = Some(DecryptedValue {
                    handle,
                    clear: ClearValue::ZERO,
                });
                return;
            }
            handle
        };

        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Decrypt, &[Operation::Refresh])
        else {
            return;
        };
        self.set_message("Start decrypt");

        let contracts = std::slice::from_ref(&ctx.contract);
        let credential = match credential::load_or_sign(
            &self.fhe,
            &self.signer,
            &self.storage,
            &ctx.account,
            contracts,
        )
        .await
        {
            Ok(credential) => credential,
            Err(err) => {
                self.set_message(format!("decryption credential unavailable: {err}"));
                return;
            }
        };
        if !self.is_current(&ctx) {
            self.set_message("Ignore decryption");
            return;
        }

        self.set_message("Call FHEVM userDecrypt...");
        let requests = [DecryptRequest {
            handle,
            contract: ctx.contract.clone(),
        }];
        let results = match self.fhe.user_decrypt(&requests, &credential).await {
            Ok(results) => results,
            Err(err) => {
                self.set_message(format!("userDecrypt failed: {err}"));
                return;
            }
        };
        self.set_message("FHEVM userDecrypt completed!");
        if !self.is_current(&ctx) {
            self.set_message("Ignore decryption");
            return;
        }

        match results.get(&handle) {
            Some(clear) => {
                self.state.lock().unwrap().clear_wins = Some(DecryptedValue {
                    handle,
                    clear: *clear,
                });
            }
            None => {
                self.set_message("userDecrypt returned no value for the wins handle");
            }
        }
    }

    /// Submits an encrypted increase/decrease of the caller's wins counter
    /// and, once settled in a still-current context, re-reads the handle.
    pub async fn update_wins(&self, delta: i32) {
        if delta == 0 {
            return;
        }
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[Operation::Refresh]) else {
            return;
        };
        let op_label = if delta > 0 {
            format!("increase_wins({})", delta)
        } else {
            format!("decrease_wins({})", delta.unsigned_abs())
        };
        self.set_message(format!("Start {op_label}..."));

        let mut builder = self.fhe.create_encrypted_input(&ctx.contract, &ctx.account);
        builder.add_u32(delta.unsigned_abs());
        let input = match builder.encrypt().await {
            Ok(input) => input,
            Err(err) => {
                self.set_message(format!("{op_label} failed: {err}"));
                return;
            }
        };
        if !self.is_current(&ctx) {
            self.set_message(format!("Ignore {op_label}"));
            return;
        }

        self.set_message(format!("Call {op_label}..."));
        let submitted = if delta > 0 {
            self.chain.increase_wins(&ctx.contract, &input).await
        } else {
            self.chain.decrease_wins(&ctx.contract, &input).await
        };
        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(err) => {
                self.set_message(format!("{op_label} failed: {err}"));
                return;
            }
        };
        self.set_message(format!(
            "{op_label} completed, tx {} success={}",
            receipt.tx_hash, receipt.success
        ));
        if !self.is_current(&ctx) {
            self.set_message(format!("Ignore {op_label}"));
            return;
        }

        self.refresh_wins_handle().await;
    }

    /// Enumerates all races and merges in the caller's bet per race. A
    /// failed per-race bet lookup degrades to "no bet" for that race
    /// instead of aborting the listing.
    pub async fn refresh_races(&self) {
        let Some(_guard) = self.begin(Operation::LoadRaces, &[]) else {
            return;
        };
        let Some(ctx) = ReadContext::capture(&self.context, &self.addresses) else {
            self.state.lock().unwrap().races = None;
            return;
        };

        let count = match self.chain.next_race_id(&ctx.contract).await {
            Ok(count) => count,
            Err(err) => {
                self.set_message(format!("race listing failed: {err}"));
                self.state.lock().unwrap().races = None;
                return;
            }
        };

        let fetches = (0..count).map(|race_id| {
            let contract = ctx.contract.clone();
            let account = ctx.account.clone();
            async move {
                let record = self.chain.race(&contract, race_id).await?;
                let my_bet = match &account {
                    Some(account) => {
                        match self.chain.bet(&contract, race_id, account).await {
                            Ok(bet) if bet.amount_wei > 0 => Some(BetInfo {
                                horse_id: bet.horse_id,
                                amount_wei: bet.amount_wei,
                            }),
                            // no bet recorded, or the lookup failed:
                            // either way this race shows no bet
                            _ => None,
                        }
                    }
                    None => None,
                };
                Ok::<_, ClientError>(build_race_snapshot(race_id, record, my_bet))
            }
        });
        let fetched: Result<Vec<RaceSnapshot>, ClientError> =
            join_all(fetches).await.into_iter().collect();
        let races = match fetched {
            Ok(races) => races,
            Err(err) => {
                self.set_message(format!("race listing failed: {err}"));
                self.state.lock().unwrap().races = None;
                return;
            }
        };

        if ctx.is_current(&self.context, &self.addresses) {
            self.state.lock().unwrap().races = Some(races);
        }
    }

    pub async fn place_bet(&self, race_id: u64, horse_id: u8, amount_wei: u128) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[]) else {
            return;
        };
        self.set_message(format!(
            "Placing bet on horse {horse_id} in race {race_id}..."
        ));

        match self
            .chain
            .place_bet(&ctx.contract, race_id, horse_id, amount_wei)
            .await
        {
            Ok(receipt) => {
                self.set_message(format!("placeBet settled, tx {}", receipt.tx_hash));
                if self.is_current(&ctx) {
                    self.refresh_wins_handle().await;
                }
            }
            Err(err) => {
                self.set_message(format!("placeBet failed: {err}"));
            }
        }
    }

    pub async fn cancel_bet(&self, race_id: u64) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[]) else {
            return;
        };
        self.set_message(format!("Cancelling bet in race {race_id}..."));

        match self.chain.cancel_bet(&ctx.contract, race_id).await {
            Ok(receipt) => {
                self.set_message(format!("cancelBet settled, tx {}", receipt.tx_hash));
            }
            Err(err) => {
                self.set_message(format!("cancelBet failed: {err}"));
            }
        }
    }

    pub async fn payout(&self, race_id: u64) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[]) else {
            return;
        };
        self.set_message(format!("Claiming payout for race {race_id}..."));

        match self.chain.payout(&ctx.contract, race_id).await {
            Ok(receipt) => {
                self.set_message(format!("payout settled, tx {}", receipt.tx_hash));
                if self.is_current(&ctx) {
                    self.refresh_wins_handle().await;
                }
            }
            Err(err) => {
                self.set_message(format!("payout failed: {err}"));
            }
        }
    }

    pub async fn create_race(&self, horses: u8) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[]) else {
            return;
        };
        self.set_message(format!("Creating race with {horses} horses..."));

        match self.chain.create_race(&ctx.contract, horses).await {
            Ok(receipt) => {
                self.set_message(format!("createRace settled, tx {}", receipt.tx_hash));
            }
            Err(err) => {
                self.set_message(format!("createRace failed: {err}"));
            }
        }
    }

    pub async fn lock_race(&self, race_id: u64) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[]) else {
            return;
        };
        self.set_message(format!("Locking race {race_id}..."));

        match self.chain.lock_race(&ctx.contract, race_id).await {
            Ok(receipt) => {
                self.set_message(format!("lockRace settled, tx {}", receipt.tx_hash));
            }
            Err(err) => {
                self.set_message(format!("lockRace failed: {err}"));
            }
        }
    }

    pub async fn finish_race(&self, race_id: u64, winner_horse_id: u8) {
        let Some(ctx) = ExecutionContext::capture(&self.context, &self.addresses)
        else {
            self.report_not_ready();
            return;
        };
        let Some(_guard) = self.begin(Operation::Call, &[]) else {
            return;
        };
        self.set_message(format!(
            "Finishing race {race_id} with winner {winner_horse_id}..."
        ));

        match self
            .chain
            .finish_race(&ctx.contract, race_id, winner_horse_id)
            .await
        {
            Ok(receipt) => {
                self.set_message(format!("finishRace settled, tx {}", receipt.tx_hash));
            }
            Err(err) => {
                self.set_message(format!("finishRace failed: {err}"));
            }
        }
    }
}

fn build_race_snapshot(
    race_id: u64,
    record: RaceRecord,
    my_bet: Option<BetInfo>,
) -> RaceSnapshot {
    let winner_horse_id = match record.status {
        RaceStatus::Finished => Some(record.winner_horse_id),
        _ => None,
    };
    RaceSnapshot {
        race_id,
        status: record.status,
        status_label: record.status.to_string(),
        horses: record.horses,
        locked: record.status != RaceStatus::Open,
        total_pool_wei: record.total_pool_wei,
        winner_horse_id,
        my_bet,
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::contract::BetRecord;

    fn record(status: RaceStatus) -> RaceRecord {
        RaceRecord {
            status,
            horses: 5,
            total_pool_wei: 1_000,
            winner_horse_id: 2,
        }
    }

    #[test]
    fn build_race_snapshot__only_finished_races_expose_a_winner() {
        // given / when
        let open = build_race_snapshot(0, record(RaceStatus::Open), None);
        let finished = build_race_snapshot(1, record(RaceStatus::Finished), None);

        // then
        assert_eq!(open.winner_horse_id, None);
        assert_eq!(finished.winner_horse_id, Some(2));
    }

    #[test]
    fn build_race_snapshot__only_open_races_are_unlocked() {
        let open = build_race_snapshot(0, record(RaceStatus::Open), None);
        let pending = build_race_snapshot(1, record(RaceStatus::Pending), None);
        let locked = build_race_snapshot(2, record(RaceStatus::Locked), None);

        assert!(!open.locked);
        assert!(pending.locked);
        assert!(locked.locked);
    }

    #[test]
    fn build_race_snapshot__keeps_the_merged_bet() {
        let bet = BetRecord {
            horse_id: 3,
            amount_wei: 42,
        };
        let snapshot = build_race_snapshot(
            0,
            record(RaceStatus::Open),
            Some(BetInfo {
                horse_id: bet.horse_id,
                amount_wei: bet.amount_wei,
            }),
        );

        assert_eq!(
            snapshot.my_bet,
            Some(BetInfo {
                horse_id: 3,
                amount_wei: 42
            })
        );
    }
}
