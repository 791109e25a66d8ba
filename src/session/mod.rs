//! Session / auth gate.
//!
//! The account system lives outside this crate. The dashboard only needs to know
//! who is signed in and which bearer token to attach to store writes, so that is
//! all `SessionGate` exposes.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// The signed-in account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for greetings, falling back to "User".
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("User")
    }
}

/// Bearer token for the reading store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Source of the current user and credential.
///
/// Reads are synchronous; implementations refresh their state on their own.
pub trait SessionGate: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;

    fn credential(&self) -> Option<Credential>;

    /// End the session. After this, both accessors return `None`.
    fn logout(&self);
}

/// In-memory session, for the CLI and tests.
#[derive(Default)]
pub struct StaticSession {
    state: RwLock<Option<(UserIdentity, Credential)>>,
}

impl StaticSession {
    pub fn signed_in(user: UserIdentity, credential: Credential) -> Self {
        Self {
            state: RwLock::new(Some((user, credential))),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replace the token, e.g. after a refresh.
    pub fn refresh_credential(&self, credential: Credential) {
        if let Ok(mut state) = self.state.write() {
            if let Some((_, current)) = state.as_mut() {
                *current = credential;
            }
        }
    }
}

impl SessionGate for StaticSession {
    fn current_user(&self) -> Option<UserIdentity> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|(user, _)| user.clone()))
    }

    fn credential(&self) -> Option<Credential> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|(_, cred)| cred.clone()))
    }

    fn logout(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = None;
        }
    }
}
