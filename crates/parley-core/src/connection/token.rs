//! Bearer token source for gateway authentication.
//!
//! The supervisor asks its [`TokenProvider`] for a token on every connect
//! attempt, including scheduled reconnects, so a retry always carries the
//! current credentials. [`TokenCell`] is the provider used by the chat
//! transport: `ChatTransport::connect(token)` stores into it.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use parley_types::error::TransportError;
use secrecy::{ExposeSecret, SecretString};

/// Boxed future returned by [`TokenProvider::token`].
pub type TokenFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SecretString, TransportError>> + Send + 'a>>;

/// Supplies the bearer token used in the namespace auth frame.
///
/// Object-safe (boxed future) so the supervisor can hold an
/// `Arc<dyn TokenProvider>` supplied by the caller.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> TokenFuture<'_>;
}

/// Replaceable in-memory token.
#[derive(Default)]
pub struct TokenCell {
    inner: RwLock<Option<SecretString>>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SecretString) -> Self {
        Self {
            inner: RwLock::new(Some(token)),
        }
    }

    pub fn set(&self, token: SecretString) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token);
    }

    fn current(&self) -> Option<SecretString> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_owned()))
    }
}

impl TokenProvider for TokenCell {
    fn token(&self) -> TokenFuture<'_> {
        let current = self.current();
        Box::pin(async move { current.ok_or(TransportError::TokenUnavailable) })
    }
}

// TokenCell intentionally does NOT derive Debug: the token must never be
// printed, even in redacted form, by accident.
