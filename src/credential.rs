use crate::{
    error::{
        ClientError,
        Result,
    },
    fhevm::{
        Eip712Signer,
        FheInstance,
    },
    storage::StringStorage,
    types::{
        AccountId,
        ContractAddress,
    },
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::fmt;
use tracing::warn;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Duration requested for freshly signed credentials.
pub const DEFAULT_CREDENTIAL_DURATION_DAYS: u64 = 365;

/// Namespace prefix so credential entries cannot collide with anything else
/// sharing the storage backend.
const CACHE_KEY_NAMESPACE: &str = "fhevm.decryption-credential";

/// A signed, time-bounded authorization letting one account decrypt
/// ciphertexts for a set of contracts. Never mutated after creation;
/// expired entries are only ever replaced by overwrite, never garbage
/// collected (expiry is checked lazily at lookup time).
#[derive(Clone, Serialize, Deserialize)]
pub struct DecryptionCredential {
    pub public_key: String,
    pub private_key: String,
    pub signature: String,
    /// Unix seconds at signing time.
    pub issued_at: i64,
    pub valid_duration_days: u64,
    /// Sorted and deduplicated; must be a superset of the contracts in any
    /// request this credential serves.
    pub authorized_contracts: Vec<ContractAddress>,
    pub owner: AccountId,
}

// The private key must not leak through logs.
impl fmt::Debug for DecryptionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionCredential")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("signature", &self.signature)
            .field("issued_at", &self.issued_at)
            .field("valid_duration_days", &self.valid_duration_days)
            .field("authorized_contracts", &self.authorized_contracts)
            .field("owner", &self.owner)
            .finish()
    }
}

impl DecryptionCredential {
    /// First instant at which the credential no longer works. Validity is
    /// exclusive at the boundary: the credential is usable strictly while
    /// `now < expires_at()`.
    pub fn expires_at(&self) -> i64 {
        self.issued_at + self.valid_duration_days as i64 * SECONDS_PER_DAY
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at()
    }

    /// Right owner, authorized for every requested contract, not expired.
    pub fn is_valid_for(
        &self,
        owner: &AccountId,
        contracts: &[ContractAddress],
        now: i64,
    ) -> bool {
        self.owner == *owner
            && contracts
                .iter()
                .all(|c| self.authorized_contracts.contains(c))
            && !self.is_expired(now)
    }
}

/// Deduplicates and sorts so that request order never affects matching or
/// cache keys.
pub fn normalize_contracts(contracts: &[ContractAddress]) -> Vec<ContractAddress> {
    let mut normalized = contracts.to_vec();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Storage key for the credential serving `(owner, contracts)`.
pub fn cache_key(owner: &AccountId, contracts: &[ContractAddress]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_str().as_bytes());
    for contract in normalize_contracts(contracts) {
        hasher.update(b"\x00");
        hasher.update(contract.as_str().as_bytes());
    }
    format!("{}:{}", CACHE_KEY_NAMESPACE, hex::encode(hasher.finalize()))
}

/// Looks up a cached credential and returns it only if it satisfies the
/// validity invariant for the request. Corrupt entries count as a miss.
pub async fn find_cached<S: StringStorage>(
    storage: &S,
    owner: &AccountId,
    contracts: &[ContractAddress],
    now: i64,
) -> Option<DecryptionCredential> {
    let key = cache_key(owner, contracts);
    let raw = match storage.get(&key).await {
        Ok(raw) => raw?,
        Err(err) => {
            warn!(%err, "credential cache lookup failed");
            return None;
        }
    };
    let credential: DecryptionCredential = match serde_json::from_str(&raw) {
        Ok(credential) => credential,
        Err(err) => {
            warn!(%err, "discarding corrupt cached credential");
            return None;
        }
    };
    credential
        .is_valid_for(owner, contracts, now)
        .then_some(credential)
}

/// Returns a credential valid for `(owner, contracts)`, reusing a cached
/// one when possible and otherwise performing the keypair → EIP-712 →
/// signature sequence against the external collaborators. Refuses with
/// [`ClientError::SigningRejected`] when the signer is bound to a
/// different account than `owner`: such a signature could never yield a
/// credential the owner can use.
///
/// The fresh credential is persisted before it is returned so concurrent
/// and subsequent callers observe it; a persistence failure is logged at
/// warning level and does not fail the call. Never issues a chain
/// transaction.
pub async fn load_or_sign<F, G, S>(
    fhe: &F,
    signer: &G,
    storage: &S,
    owner: &AccountId,
    contracts: &[ContractAddress],
) -> Result<DecryptionCredential>
where
    F: FheInstance,
    G: Eip712Signer,
    S: StringStorage,
{
    let now = Utc::now().timestamp();
    if let Some(cached) = find_cached(storage, owner, contracts, now).await {
        return Ok(cached);
    }

    let signer_account = signer.account();
    if signer_account != *owner {
        return Err(ClientError::SigningRejected(format!(
            "signer is bound to {signer_account}, not to {owner}"
        )));
    }

    let authorized_contracts = normalize_contracts(contracts);
    let keypair = fhe.generate_keypair()?;
    let message = fhe.create_eip712(
        &keypair.public_key,
        &authorized_contracts,
        now,
        DEFAULT_CREDENTIAL_DURATION_DAYS,
    );
    let signature = signer.sign_typed_data(&message).await?;

    let credential = DecryptionCredential {
        public_key: keypair.public_key,
        private_key: keypair.private_key,
        signature,
        issued_at: now,
        valid_duration_days: DEFAULT_CREDENTIAL_DURATION_DAYS,
        authorized_contracts,
        owner: owner.clone(),
    };

    // Non-fatal from here on: the in-memory credential still serves this
    // call even when it cannot be cached.
    let key = cache_key(owner, contracts);
    match serde_json::to_string(&credential) {
        Ok(serialized) => {
            if let Err(e) = storage.set(&key, &serialized).await {
                let err = ClientError::StoragePersistFailure(e);
                warn!(%err, "continuing without cached credential");
            }
        }
        Err(e) => {
            let err = ClientError::StoragePersistFailure(e.to_string());
            warn!(%err, "continuing without cached credential");
        }
    }

    Ok(credential)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    fn address(byte: u8) -> ContractAddress {
        ContractAddress::new(format!("0x{}", hex::encode([byte; 20])))
    }

    fn credential_for(
        owner: &AccountId,
        contracts: &[ContractAddress],
        issued_at: i64,
        days: u64,
    ) -> DecryptionCredential {
        DecryptionCredential {
            public_key: "pk".to_string(),
            private_key: "sk".to_string(),
            signature: "sig".to_string(),
            issued_at,
            valid_duration_days: days,
            authorized_contracts: normalize_contracts(contracts),
            owner: owner.clone(),
        }
    }

    #[test]
    fn is_valid_for__accepts_matching_owner_and_contract_subset() {
        // given
        let owner = AccountId::new("0xalice");
        let credential =
            credential_for(&owner, &[address(1), address(2)], 1_000, 10);

        // then
        assert!(credential.is_valid_for(&owner, &[address(1)], 2_000));
        assert!(credential.is_valid_for(&owner, &[address(2), address(1)], 2_000));
    }

    #[test]
    fn is_valid_for__rejects_a_different_owner() {
        let owner = AccountId::new("0xalice");
        let credential = credential_for(&owner, &[address(1)], 1_000, 10);

        assert!(!credential.is_valid_for(&AccountId::new("0xbob"), &[address(1)], 2_000));
    }

    #[test]
    fn is_valid_for__rejects_contracts_outside_the_authorized_set() {
        let owner = AccountId::new("0xalice");
        let credential = credential_for(&owner, &[address(1)], 1_000, 10);

        assert!(!credential.is_valid_for(&owner, &[address(1), address(3)], 2_000));
    }

    #[test]
    fn expiry__is_exclusive_at_the_boundary() {
        // given issued at T with D days of validity
        let owner = AccountId::new("0xalice");
        let issued_at = 50_000;
        let days = 3;
        let credential = credential_for(&owner, &[address(1)], issued_at, days);
        let boundary = issued_at + days as i64 * SECONDS_PER_DAY;

        // then: valid one second before, expired at and after the boundary
        assert!(credential.is_valid_for(&owner, &[address(1)], boundary - 1));
        assert!(!credential.is_valid_for(&owner, &[address(1)], boundary));
        assert!(!credential.is_valid_for(&owner, &[address(1)], boundary + 1));
    }

    #[test]
    fn cache_key__ignores_contract_order_and_duplicates() {
        // given
        let owner = AccountId::new("0xalice");

        // when
        let forward = cache_key(&owner, &[address(1), address(2)]);
        let reversed = cache_key(&owner, &[address(2), address(1)]);
        let duplicated = cache_key(&owner, &[address(1), address(2), address(1)]);

        // then
        assert_eq!(forward, reversed);
        assert_eq!(forward, duplicated);
    }

    #[test]
    fn cache_key__differs_per_owner_and_per_contract_set() {
        let alice = AccountId::new("0xalice");
        let bob = AccountId::new("0xbob");

        assert_ne!(
            cache_key(&alice, &[address(1)]),
            cache_key(&bob, &[address(1)])
        );
        assert_ne!(
            cache_key(&alice, &[address(1)]),
            cache_key(&alice, &[address(2)])
        );
    }

    #[test]
    fn debug__redacts_the_private_key() {
        let owner = AccountId::new("0xalice");
        let credential = credential_for(&owner, &[address(1)], 1_000, 10);

        let rendered = format!("{:?}", credential);

        assert!(!rendered.contains("sk"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn serde__round_trips_a_persisted_credential() {
        let owner = AccountId::new("0xalice");
        let credential = credential_for(&owner, &[address(1), address(2)], 1_000, 10);

        let raw = serde_json::to_string(&credential).unwrap();
        let restored: DecryptionCredential = serde_json::from_str(&raw).unwrap();

        assert!(restored.is_valid_for(&owner, &[address(1), address(2)], 2_000));
        assert_eq!(restored.signature, credential.signature);
    }

    proptest! {
        #[test]
        fn cache_key__is_invariant_under_permutation(
            bytes in proptest::collection::vec(0u8..=255, 1..6),
            seed in 0usize..720,
        ) {
            let owner = AccountId::new("0xalice");
            let contracts: Vec<ContractAddress> =
                bytes.iter().map(|b| address(*b)).collect();
            let mut shuffled = contracts.clone();
            // cheap deterministic permutation
            if shuffled.len() > 1 {
                let pivot = seed % shuffled.len();
                shuffled.rotate_left(pivot);
            }
            prop_assert_eq!(
                cache_key(&owner, &contracts),
                cache_key(&owner, &shuffled)
            );
        }

        #[test]
        fn validity__holds_exactly_until_the_expiry_boundary(
            issued_at in 0i64..1_000_000,
            days in 1u64..400,
            offset in 0i64..1_000_000,
        ) {
            let owner = AccountId::new("0xalice");
            let credential = credential_for(&owner, &[address(1)], issued_at, days);
            let now = issued_at + offset;
            let expected = offset < days as i64 * SECONDS_PER_DAY;
            prop_assert_eq!(
                credential.is_valid_for(&owner, &[address(1)], now),
                expected
            );
        }
    }
}
