use crate::{
    credential::DecryptionCredential,
    error::Result,
    types::{
        AccountId,
        CiphertextHandle,
        ClearValue,
        ContractAddress,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;

/// Keypair used to receive re-encrypted plaintexts. The private key lives
/// only inside a cached [`DecryptionCredential`].
#[derive(Clone)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Eip712Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// Typed message a wallet is asked to sign when authorizing decryption.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Message {
    pub domain: Eip712Domain,
    pub types: HashMap<String, Vec<Eip712Field>>,
    pub primary_type: String,
    pub message: serde_json::Value,
}

/// Client-built bundle of encrypted operands plus a validity proof,
/// submitted alongside a transaction so the contract can operate on the
/// values without seeing their plaintext.
#[derive(Clone, Debug)]
pub struct EncryptedInput {
    pub handles: Vec<CiphertextHandle>,
    pub proof: Vec<u8>,
}

/// One handle to reveal, paired with the contract it belongs to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptRequest {
    pub handle: CiphertextHandle,
    pub contract: ContractAddress,
}

/// Staged encrypted input under construction. Operands are added in order;
/// `encrypt` finalizes the bundle and is a suspension point.
pub trait EncryptedInputBuilder {
    fn add_u32(&mut self, value: u32);
    fn encrypt(self) -> impl Future<Output = Result<EncryptedInput>>;
}

/// The FHE coprocessor capability. All methods returning futures are
/// suspension points for the purposes of staleness checking.
pub trait FheInstance {
    type InputBuilder: EncryptedInputBuilder;

    fn generate_keypair(&self) -> Result<Keypair>;

    fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[ContractAddress],
        issued_at: i64,
        duration_days: u64,
    ) -> Eip712Message;

    fn create_encrypted_input(
        &self,
        contract: &ContractAddress,
        account: &AccountId,
    ) -> Self::InputBuilder;

    fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        credential: &DecryptionCredential,
    ) -> impl Future<Output = Result<HashMap<CiphertextHandle, ClearValue>>>;
}

/// Wallet-side signer for typed decryption authorizations.
pub trait Eip712Signer {
    fn account(&self) -> AccountId;

    /// Requests a signature over the typed message. Rejection by the user
    /// surfaces as [`crate::ClientError::SigningRejected`].
    fn sign_typed_data(
        &self,
        message: &Eip712Message,
    ) -> impl Future<Output = Result<String>>;
}
