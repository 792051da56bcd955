// crates/bridge/src/account.rs
//! Account resolution seam.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::error::{BridgeError, Result};

/// Reference to an account as handed over by the sync framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountRef {
    pub name: String,
    pub account_type: String,
}

impl AccountRef {
    pub fn new(name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_type: account_type.into(),
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_type, self.name)
    }
}

/// Per-account sync settings relevant to gating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSettings {
    /// Only sync while connected to Wi-Fi.
    pub wifi_only: bool,
    /// When non-empty, only sync on these SSIDs (requires `wifi_only`).
    pub allowed_ssids: Vec<String>,
}

/// A resolved, still-existing account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub account: AccountRef,
    pub settings: AccountSettings,
}

/// Resolves an account reference into its settings.
pub trait AccountResolver: Send + Sync {
    /// Fails with [`BridgeError::AccountNotFound`] if the account is gone.
    fn resolve(&self, account: &AccountRef) -> Result<AccountContext>;
}

/// Account table kept in memory.
#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: RwLock<HashMap<AccountRef, AccountSettings>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: AccountRef, settings: AccountSettings) {
        match self.accounts.write() {
            Ok(mut accounts) => {
                accounts.insert(account, settings);
            }
            Err(e) => tracing::error!("RwLock poisoned writing accounts: {e}"),
        }
    }

    #[cfg(test)]
    pub(crate) fn remove(&self, account: &AccountRef) -> bool {
        match self.accounts.write() {
            Ok(mut accounts) => accounts.remove(account).is_some(),
            Err(e) => {
                tracing::error!("RwLock poisoned writing accounts: {e}");
                false
            }
        }
    }
}

impl AccountResolver for InMemoryAccounts {
    fn resolve(&self, account: &AccountRef) -> Result<AccountContext> {
        let settings = match self.accounts.read() {
            Ok(accounts) => accounts.get(account).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading accounts: {e}");
                None
            }
        };
        settings
            .map(|settings| AccountContext {
                account: account.clone(),
                settings,
            })
            .ok_or_else(|| BridgeError::AccountNotFound(account.to_string()))
    }
}
