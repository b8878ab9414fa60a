use crate::types::{
    ChainId,
    ContractAddress,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    fs,
    io,
    path::Path,
};

/// One recorded deployment of the race contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEntry {
    pub address: ContractAddress,
    pub chain_id: u64,
    #[serde(default)]
    pub chain_name: Option<String>,
}

/// Per-chain registry of deployed contract addresses, the source of truth
/// for resolving the target contract of the active chain. A missing entry
/// and a zero-address entry both mean "not deployed here".
#[derive(Clone, Debug, Default)]
pub struct AddressBook {
    entries: HashMap<ChainId, DeploymentEntry>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: ChainId, address: ContractAddress) {
        self.entries.insert(
            chain_id,
            DeploymentEntry {
                address,
                chain_id: chain_id.0,
                chain_name: None,
            },
        );
    }

    pub fn insert_entry(&mut self, entry: DeploymentEntry) {
        self.entries.insert(ChainId(entry.chain_id), entry);
    }

    /// The deployed contract for `chain_id`, if any. Zero-address entries
    /// count as undeployed.
    pub fn resolve(&self, chain_id: ChainId) -> Option<ContractAddress> {
        let entry = self.entries.get(&chain_id)?;
        if entry.address.is_zero() {
            return None;
        }
        Some(entry.address.clone())
    }

    pub fn chain_name(&self, chain_id: ChainId) -> Option<&str> {
        self.entries
            .get(&chain_id)
            .and_then(|entry| entry.chain_name.as_deref())
    }

    pub fn is_deployed(&self, chain_id: ChainId) -> bool {
        self.resolve(chain_id).is_some()
    }

    /// Parses the exported registry format: a map from chain id (as a
    /// string key) to a deployment entry.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let dto: HashMap<String, DeploymentEntry> = serde_json::from_str(raw)?;
        let mut book = Self::new();
        for entry in dto.into_values() {
            book.insert_entry(entry);
        }
        Ok(book)
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
