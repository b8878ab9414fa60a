use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// Identifier of the active chain. Opaque to the client beyond equality.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the active signing account, normalized to lowercase hex.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a deployed contract instance, normalized to lowercase hex.
///
/// The all-zero address means "not deployed"; registries treat it the same
/// as a missing entry.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ContractAddress(String);

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

impl ContractAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().to_lowercase())
    }

    pub fn zero() -> Self {
        Self(ZERO_ADDRESS.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque 32-byte reference to an encrypted on-chain value. Meaningless
/// without the contract it belongs to; compared by exact equality only.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    /// Sentinel for "no ciphertext stored yet".
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn from_hex(raw: &str) -> Result<Self, hex::FromHexError> {
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(stripped)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl Default for CiphertextHandle {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({})", self.to_hex())
    }
}

/// Revealed plaintext of a decrypted handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClearValue {
    U64(u64),
    Bool(bool),
}

impl ClearValue {
    pub const ZERO: Self = Self::U64(0);
}

/// A handle together with its revealed plaintext. Only trusted while the
/// handle still equals the latest one observed on-chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecryptedValue {
    pub handle: CiphertextHandle,
    pub clear: ClearValue,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn from_hex__round_trips_with_to_hex() {
        // given
        let handle = CiphertextHandle([7u8; 32]);

        // when
        let parsed = CiphertextHandle::from_hex(&handle.to_hex()).unwrap();

        // then
        assert_eq!(parsed, handle);
    }

    #[test]
    fn from_hex__rejects_short_input() {
        let err = CiphertextHandle::from_hex("0xabcd");
        assert!(err.is_err());
    }

    #[test]
    fn zero_handle__is_the_all_zero_sentinel() {
        let parsed = CiphertextHandle::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert!(parsed.is_zero());
        assert_eq!(parsed, CiphertextHandle::ZERO);
    }

    #[test]
    fn contract_address__normalizes_case_and_detects_zero() {
        // given
        let mixed = ContractAddress::new("0xAbCd000000000000000000000000000000000001");

        // then
        assert_eq!(mixed.as_str(), "0xabcd000000000000000000000000000000000001");
        assert!(!mixed.is_zero());
        assert!(ContractAddress::zero().is_zero());
    }
}
