//! Deterministic fakes for every external capability. Each fake records
//! call counts, can be scripted to fail, and can run a hook in the middle
//! of a call so tests can switch the live context while an operation is
//! suspended.

use crate::{
    client::RaceController,
    context::ContextSource,
    contract::{
        BetRecord,
        RaceContractClient,
        RaceRecord,
        RaceStatus,
        TxReceipt,
    },
    credential::DecryptionCredential,
    deployment::AddressBook,
    error::{
        ClientError,
        Result,
    },
    fhevm::{
        DecryptRequest,
        EncryptedInput,
        EncryptedInputBuilder,
        Eip712Domain,
        Eip712Field,
        Eip712Message,
        Eip712Signer,
        FheInstance,
        Keypair,
    },
    storage::{
        InMemoryStorage,
        StringStorage,
    },
    types::{
        AccountId,
        ChainId,
        CiphertextHandle,
        ClearValue,
        ContractAddress,
    },
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
};

type Hook = Box<dyn Fn() + Send + Sync>;

pub fn handle(byte: u8) -> CiphertextHandle {
    CiphertextHandle([byte; 32])
}

#[derive(Clone, Default)]
pub struct FakeContextSource {
    inner: Arc<Mutex<(Option<ChainId>, Option<AccountId>)>>,
}

impl FakeContextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(chain_id: ChainId, account: AccountId) -> Self {
        let source = Self::new();
        source.set_chain_id(Some(chain_id));
        source.set_account(Some(account));
        source
    }

    pub fn set_chain_id(&self, chain_id: Option<ChainId>) {
        self.inner.lock().unwrap().0 = chain_id;
    }

    pub fn set_account(&self, account: Option<AccountId>) {
        self.inner.lock().unwrap().1 = account;
    }
}

impl ContextSource for FakeContextSource {
    fn chain_id(&self) -> Option<ChainId> {
        self.inner.lock().unwrap().0
    }

    fn account(&self) -> Option<AccountId> {
        self.inner.lock().unwrap().1.clone()
    }
}

#[derive(Default)]
struct ChainData {
    wins_handle: CiphertextHandle,
    races: Vec<RaceRecord>,
    bets: HashMap<(u64, AccountId), BetRecord>,
    failing_bet_races: HashSet<u64>,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
    next_tx: u64,
}

/// Scripted in-memory stand-in for the race contract. Transactions apply
/// their effects immediately; increase/decrease rotate the wins handle so
/// dependent refreshes observe a changed ciphertext.
#[derive(Clone, Default)]
pub struct FakeChain {
    data: Arc<Mutex<ChainData>>,
    hooks: Arc<Mutex<HashMap<&'static str, Hook>>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_wins_handle(&self, handle: CiphertextHandle) {
        self.data.lock().unwrap().wins_handle = handle;
    }

    pub fn push_race(&self, record: RaceRecord) {
        self.data.lock().unwrap().races.push(record);
    }

    pub fn set_bet(&self, race_id: u64, account: AccountId, bet: BetRecord) {
        self.data.lock().unwrap().bets.insert((race_id, account), bet);
    }

    /// Makes the per-account bet lookup fail for one race; the listing is
    /// expected to degrade that race to "no bet".
    pub fn fail_bet_lookup(&self, race_id: u64) {
        self.data.lock().unwrap().failing_bet_races.insert(race_id);
    }

    pub fn fail_method(&self, name: &'static str) {
        self.data.lock().unwrap().failing.insert(name);
    }

    pub fn calls(&self, name: &'static str) -> usize {
        self.data.lock().unwrap().calls.get(name).copied().unwrap_or(0)
    }

    /// Runs `hook` inside every call of `name`, after the suspension point
    /// and before the response is produced.
    pub fn set_hook(&self, name: &'static str, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().unwrap().insert(name, Box::new(hook));
    }

    async fn enter(&self, name: &'static str) -> Result<()> {
        tokio::task::yield_now().await;
        {
            let mut data = self.data.lock().unwrap();
            *data.calls.entry(name).or_insert(0) += 1;
        }
        if let Some(hook) = self.hooks.lock().unwrap().get(name) {
            hook();
        }
        if self.data.lock().unwrap().failing.contains(name) {
            return Err(ClientError::ExternalCallFailed(format!(
                "{name} scripted to fail"
            )));
        }
        Ok(())
    }

    fn receipt(&self) -> TxReceipt {
        let mut data = self.data.lock().unwrap();
        data.next_tx += 1;
        TxReceipt {
            tx_hash: format!("0x{:064x}", data.next_tx),
            success: true,
        }
    }

    fn rotate_wins_handle(&self) {
        let mut data = self.data.lock().unwrap();
        let next = data.next_tx as u8;
        data.wins_handle = CiphertextHandle([next; 32]);
    }
}

impl RaceContractClient for FakeChain {
    async fn wins_handle(
        &self,
        _contract: &ContractAddress,
        _caller: &AccountId,
    ) -> Result<CiphertextHandle> {
        self.enter("wins_handle").await?;
        Ok(self.data.lock().unwrap().wins_handle)
    }

    async fn next_race_id(&self, _contract: &ContractAddress) -> Result<u64> {
        self.enter("next_race_id").await?;
        Ok(self.data.lock().unwrap().races.len() as u64)
    }

    async fn race(&self, _contract: &ContractAddress, race_id: u64) -> Result<RaceRecord> {
        self.enter("race").await?;
        let data = self.data.lock().unwrap();
        data.races
            .get(race_id as usize)
            .cloned()
            .ok_or_else(|| ClientError::ExternalCallFailed(format!("no race {race_id}")))
    }

    async fn bet(
        &self,
        _contract: &ContractAddress,
        race_id: u64,
        account: &AccountId,
    ) -> Result<BetRecord> {
        self.enter("bet").await?;
        let data = self.data.lock().unwrap();
        if data.failing_bet_races.contains(&race_id) {
            return Err(ClientError::ExternalCallFailed(format!(
                "bet lookup for race {race_id} scripted to fail"
            )));
        }
        Ok(data
            .bets
            .get(&(race_id, account.clone()))
            .copied()
            .unwrap_or_default())
    }

    async fn increase_wins(
        &self,
        _contract: &ContractAddress,
        _input: &EncryptedInput,
    ) -> Result<TxReceipt> {
        self.enter("increase_wins").await?;
        let receipt = self.receipt();
        self.rotate_wins_handle();
        Ok(receipt)
    }

    async fn decrease_wins(
        &self,
        _contract: &ContractAddress,
        _input: &EncryptedInput,
    ) -> Result<TxReceipt> {
        self.enter("decrease_wins").await?;
        let receipt = self.receipt();
        self.rotate_wins_handle();
        Ok(receipt)
    }

    async fn place_bet(
        &self,
        _contract: &ContractAddress,
        race_id: u64,
        _horse_id: u8,
        amount_wei: u128,
    ) -> Result<TxReceipt> {
        self.enter("place_bet").await?;
        {
            let mut data = self.data.lock().unwrap();
            if let Some(race) = data.races.get_mut(race_id as usize) {
                race.total_pool_wei += amount_wei;
            }
        }
        Ok(self.receipt())
    }

    async fn cancel_bet(
        &self,
        _contract: &ContractAddress,
        _race_id: u64,
    ) -> Result<TxReceipt> {
        self.enter("cancel_bet").await?;
        Ok(self.receipt())
    }

    async fn payout(&self, _contract: &ContractAddress, _race_id: u64) -> Result<TxReceipt> {
        self.enter("payout").await?;
        Ok(self.receipt())
    }

    async fn create_race(&self, _contract: &ContractAddress, horses: u8) -> Result<TxReceipt> {
        self.enter("create_race").await?;
        self.data.lock().unwrap().races.push(RaceRecord {
            status: RaceStatus::Open,
            horses,
            total_pool_wei: 0,
            winner_horse_id: 0,
        });
        Ok(self.receipt())
    }

    async fn lock_race(&self, _contract: &ContractAddress, race_id: u64) -> Result<TxReceipt> {
        self.enter("lock_race").await?;
        if let Some(race) = self.data.lock().unwrap().races.get_mut(race_id as usize) {
            race.status = RaceStatus::Locked;
        }
        Ok(self.receipt())
    }

    async fn finish_race(
        &self,
        _contract: &ContractAddress,
        race_id: u64,
        winner_horse_id: u8,
    ) -> Result<TxReceipt> {
        self.enter("finish_race").await?;
        if let Some(race) = self.data.lock().unwrap().races.get_mut(race_id as usize) {
            race.status = RaceStatus::Finished;
            race.winner_horse_id = winner_horse_id;
        }
        Ok(self.receipt())
    }
}

#[derive(Default)]
struct FheData {
    keypair_calls: usize,
    fail_keygen: bool,
    encrypt_calls: usize,
    decrypt_calls: usize,
    fail_decrypt: bool,
    plaintexts: HashMap<CiphertextHandle, ClearValue>,
}

/// Scripted FHE coprocessor: deterministic keypairs, encrypted inputs, and
/// a configurable handle → plaintext mapping.
#[derive(Clone, Default)]
pub struct FakeFhe {
    data: Arc<Mutex<FheData>>,
    decrypt_hook: Arc<Mutex<Option<Hook>>>,
    encrypt_hook: Arc<Mutex<Option<Hook>>>,
}

impl FakeFhe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plaintext(&self, handle: CiphertextHandle, clear: ClearValue) {
        self.data.lock().unwrap().plaintexts.insert(handle, clear);
    }

    pub fn fail_keygen(&self) {
        self.data.lock().unwrap().fail_keygen = true;
    }

    pub fn fail_decrypt(&self) {
        self.data.lock().unwrap().fail_decrypt = true;
    }

    pub fn keypair_calls(&self) -> usize {
        self.data.lock().unwrap().keypair_calls
    }

    pub fn encrypt_calls(&self) -> usize {
        self.data.lock().unwrap().encrypt_calls
    }

    pub fn decrypt_calls(&self) -> usize {
        self.data.lock().unwrap().decrypt_calls
    }

    pub fn set_decrypt_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.decrypt_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn set_encrypt_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.encrypt_hook.lock().unwrap() = Some(Box::new(hook));
    }
}

pub struct FakeInputBuilder {
    fhe: FakeFhe,
    values: Vec<u32>,
}

impl EncryptedInputBuilder for FakeInputBuilder {
    fn add_u32(&mut self, value: u32) {
        self.values.push(value);
    }

    async fn encrypt(self) -> Result<EncryptedInput> {
        tokio::task::yield_now().await;
        if let Some(hook) = &*self.fhe.encrypt_hook.lock().unwrap() {
            hook();
        }
        let serial = {
            let mut data = self.fhe.data.lock().unwrap();
            data.encrypt_calls += 1;
            data.encrypt_calls as u8
        };
        let handles = self
            .values
            .iter()
            .enumerate()
            .map(|(index, _)| {
                let mut bytes = [0u8; 32];
                bytes[0] = 0xe0;
                bytes[1] = serial;
                bytes[2] = index as u8;
                CiphertextHandle(bytes)
            })
            .collect();
        Ok(EncryptedInput {
            handles,
            proof: vec![0xaa, 0xbb, serial],
        })
    }
}

impl FheInstance for FakeFhe {
    type InputBuilder = FakeInputBuilder;

    fn generate_keypair(&self) -> Result<Keypair> {
        let mut data = self.data.lock().unwrap();
        if data.fail_keygen {
            return Err(ClientError::KeyGenerationFailed(
                "keygen scripted to fail".to_string(),
            ));
        }
        data.keypair_calls += 1;
        Ok(Keypair {
            public_key: format!("pub-{}", data.keypair_calls),
            private_key: format!("priv-{}", data.keypair_calls),
        })
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[ContractAddress],
        issued_at: i64,
        duration_days: u64,
    ) -> Eip712Message {
        let fields = vec![
            Eip712Field {
                name: "publicKey".to_string(),
                ty: "bytes".to_string(),
            },
            Eip712Field {
                name: "contractAddresses".to_string(),
                ty: "address[]".to_string(),
            },
            Eip712Field {
                name: "startTimestamp".to_string(),
                ty: "uint256".to_string(),
            },
            Eip712Field {
                name: "durationDays".to_string(),
                ty: "uint256".to_string(),
            },
        ];
        let mut types = HashMap::new();
        types.insert("UserDecryptRequestVerification".to_string(), fields);
        Eip712Message {
            domain: Eip712Domain {
                name: "FHEVM".to_string(),
                version: "1".to_string(),
                chain_id: 0,
                verifying_contract: ContractAddress::zero().to_string(),
            },
            types,
            primary_type: "UserDecryptRequestVerification".to_string(),
            message: serde_json::json!({
                "publicKey": public_key,
                "contractAddresses": contracts
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>(),
                "startTimestamp": issued_at,
                "durationDays": duration_days,
            }),
        }
    }

    fn create_encrypted_input(
        &self,
        _contract: &ContractAddress,
        _account: &AccountId,
    ) -> Self::InputBuilder {
        FakeInputBuilder {
            fhe: self.clone(),
            values: Vec::new(),
        }
    }

    async fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        _credential: &DecryptionCredential,
    ) -> Result<HashMap<CiphertextHandle, ClearValue>> {
        tokio::task::yield_now().await;
        if let Some(hook) = &*self.decrypt_hook.lock().unwrap() {
            hook();
        }
        let mut data = self.data.lock().unwrap();
        data.decrypt_calls += 1;
        if data.fail_decrypt {
            return Err(ClientError::ExternalCallFailed(
                "userDecrypt scripted to fail".to_string(),
            ));
        }
        Ok(requests
            .iter()
            .map(|request| {
                let clear = data
                    .plaintexts
                    .get(&request.handle)
                    .copied()
                    .unwrap_or(ClearValue::U64(0));
                (request.handle, clear)
            })
            .collect())
    }
}

#[derive(Default)]
struct SignerData {
    sign_calls: usize,
    reject: bool,
}

#[derive(Clone)]
pub struct FakeSigner {
    account: AccountId,
    data: Arc<Mutex<SignerData>>,
}

impl FakeSigner {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            data: Arc::new(Mutex::new(SignerData::default())),
        }
    }

    pub fn reject_signatures(&self) {
        self.data.lock().unwrap().reject = true;
    }

    pub fn sign_calls(&self) -> usize {
        self.data.lock().unwrap().sign_calls
    }
}

impl Eip712Signer for FakeSigner {
    fn account(&self) -> AccountId {
        self.account.clone()
    }

    async fn sign_typed_data(&self, _message: &Eip712Message) -> Result<String> {
        tokio::task::yield_now().await;
        let mut data = self.data.lock().unwrap();
        if data.reject {
            return Err(ClientError::SigningRejected(
                "user rejected the signature request".to_string(),
            ));
        }
        data.sign_calls += 1;
        Ok(format!("0xsignature{}", data.sign_calls))
    }
}

/// In-memory storage whose reads or writes can be scripted to fail, for
/// exercising the cache-miss and warn-and-continue persistence paths.
#[derive(Clone, Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    fail_reads: Arc<Mutex<bool>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self) {
        *self.fail_reads.lock().unwrap() = true;
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl StringStorage for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        if *self.fail_reads.lock().unwrap() {
            return Err("storage read scripted to fail".to_string());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        if *self.fail_writes.lock().unwrap() {
            return Err("storage write scripted to fail".to_string());
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        self.inner.remove(key).await
    }
}

pub const TEST_CHAIN: ChainId = ChainId(31337);
pub const OTHER_CHAIN: ChainId = ChainId(1);

/// Pre-wired fixture: a deployed contract on [`TEST_CHAIN`], a connected
/// wallet, and fresh fakes. Tests mutate the fakes and then drive a
/// controller built from clones of them.
pub struct TestContext {
    pub source: FakeContextSource,
    pub chain: FakeChain,
    pub fhe: FakeFhe,
    pub signer: FakeSigner,
    pub storage: InMemoryStorage,
    pub contract: ContractAddress,
    pub book: AddressBook,
}

impl TestContext {
    pub fn new() -> Self {
        let contract =
            ContractAddress::new("0x00000000000000000000000000000000000000aa");
        let mut book = AddressBook::new();
        book.insert(TEST_CHAIN, contract.clone());
        Self {
            source: FakeContextSource::connected(TEST_CHAIN, Self::alice()),
            chain: FakeChain::new(),
            fhe: FakeFhe::new(),
            signer: FakeSigner::new(Self::alice()),
            storage: InMemoryStorage::new(),
            contract,
            book,
        }
    }

    pub fn alice() -> AccountId {
        AccountId::new("0x00000000000000000000000000000000000a11ce")
    }

    pub fn bob() -> AccountId {
        AccountId::new("0x0000000000000000000000000000000000000b0b")
    }

    pub fn controller(
        &self,
    ) -> RaceController<FakeContextSource, FakeChain, FakeFhe, FakeSigner, InMemoryStorage>
    {
        RaceController::new(
            self.source.clone(),
            self.chain.clone(),
            self.fhe.clone(),
            self.signer.clone(),
            self.storage.clone(),
            self.book.clone(),
        )
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
