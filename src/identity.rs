//! Identity and tipping collaborators.
//!
//! The engine only needs a typed capability that yields the session's wallet
//! public key (the stroke owner) and an optional display name. No key means
//! no session, and drawing is disabled.

#[cfg(test)]
#[path = "identity_test.rs"]
mod identity_test;

use std::sync::{Mutex, PoisonError};

/// Capability that exposes the wallet public key of the signed-in user.
pub trait WalletCapability: Send + Sync {
    fn wallet_public_key(&self) -> Option<String>;
}

/// Identity collaborator: the wallet capability plus an optional label.
pub trait IdentityProvider: WalletCapability {
    fn display_name(&self) -> Option<String> {
        None
    }
}

/// Receives the owner a user chose to reward. Payment happens elsewhere.
pub trait TipHandler: Send + Sync {
    fn tip_requested(&self, owner: &str);
}

/// Identity backed by fixed values, switchable at runtime (sign in / out).
#[derive(Debug, Default)]
pub struct StaticIdentity {
    inner: Mutex<StaticIdentityInner>,
}

#[derive(Debug, Default, Clone)]
struct StaticIdentityInner {
    wallet: Option<String>,
    display_name: Option<String>,
}

impl StaticIdentity {
    #[must_use]
    pub fn new(wallet: impl Into<String>, display_name: Option<&str>) -> Self {
        Self {
            inner: Mutex::new(StaticIdentityInner {
                wallet: Some(wallet.into()),
                display_name: display_name.map(str::to_owned),
            }),
        }
    }

    /// No signed-in user.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, wallet: impl Into<String>, display_name: Option<&str>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.wallet = Some(wallet.into());
        inner.display_name = display_name.map(str::to_owned);
    }

    pub fn sign_out(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.wallet = None;
        inner.display_name = None;
    }

    fn snapshot(&self) -> StaticIdentityInner {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl WalletCapability for StaticIdentity {
    fn wallet_public_key(&self) -> Option<String> {
        self.snapshot().wallet.filter(|w| !w.is_empty())
    }
}

impl IdentityProvider for StaticIdentity {
    fn display_name(&self) -> Option<String> {
        self.snapshot().display_name
    }
}
