use crate::{
    deployment::AddressBook,
    types::{
        AccountId,
        ChainId,
        ContractAddress,
    },
};

/// Live view of the volatile wallet state. Implementations are expected to
/// change underneath the client at any time (the user can switch network or
/// account mid-flight), so the client only ever reads it at well-defined
/// points and never caches it beyond an [`ExecutionContext`] snapshot.
pub trait ContextSource {
    fn chain_id(&self) -> Option<ChainId>;
    fn account(&self) -> Option<AccountId>;
}

/// Immutable snapshot of the execution context taken when an operation
/// starts. An operation result is only applied while the snapshot still
/// matches the live source; comparison against the live source is the only
/// valid staleness test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionContext {
    pub chain_id: ChainId,
    pub account: AccountId,
    pub contract: ContractAddress,
}

impl ExecutionContext {
    /// Captures the live context, resolving the target contract for the
    /// active chain. Returns `None` when no chain or account is active or
    /// when no contract is deployed on the active chain.
    ///
    /// Must be called synchronously, before the first suspension point of
    /// the operation it guards.
    pub fn capture(source: &impl ContextSource, book: &AddressBook) -> Option<Self> {
        let chain_id = source.chain_id()?;
        let account = source.account()?;
        let contract = book.resolve(chain_id)?;
        Some(Self {
            chain_id,
            account,
            contract,
        })
    }

    /// Re-reads the live source and reports whether this snapshot is still
    /// the current context. Any single differing field makes it stale; there
    /// are no partial matches.
    pub fn is_current(&self, source: &impl ContextSource, book: &AddressBook) -> bool {
        source.chain_id() == Some(self.chain_id)
            && source.account().as_ref() == Some(&self.account)
            && book.resolve(self.chain_id).as_ref() == Some(&self.contract)
    }
}

/// Context snapshot for read-only listings, which work without a signing
/// account. An active account is still part of the snapshot when present:
/// switching accounts mid-listing makes the merged per-account data stale.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadContext {
    pub chain_id: ChainId,
    pub contract: ContractAddress,
    pub account: Option<AccountId>,
}

impl ReadContext {
    pub fn capture(source: &impl ContextSource, book: &AddressBook) -> Option<Self> {
        let chain_id = source.chain_id()?;
        let contract = book.resolve(chain_id)?;
        Some(Self {
            chain_id,
            contract,
            account: source.account(),
        })
    }

    pub fn is_current(&self, source: &impl ContextSource, book: &AddressBook) -> bool {
        source.chain_id() == Some(self.chain_id)
            && book.resolve(self.chain_id).as_ref() == Some(&self.contract)
            && source.account() == self.account
    }
}
