#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use super::store::{KeyValueStore, StoreError};
use crate::net::types::{AuthTokens, Role};

pub const TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_ID_KEY: &str = "userId";
pub const USERNAME_KEY: &str = "username";
pub const USER_ROLE_KEY: &str = "userRole";

const ALL_KEYS: [&str; 5] = [TOKEN_KEY, REFRESH_TOKEN_KEY, USER_ID_KEY, USERNAME_KEY, USER_ROLE_KEY];

/// Signed-in state persisted between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub role: Option<Role>,
}

impl AuthSession {
    /// Build from a signin response. The typed-in username is used when the
    /// service does not echo a user record.
    #[must_use]
    pub fn from_signin(tokens: AuthTokens, username: &str) -> Self {
        let user = tokens.user;
        Self {
            access_token: tokens.access_token,
            refresh_token: Some(tokens.refresh_token).filter(|t| !t.is_empty()),
            user_id: user.as_ref().map(|u| u.id),
            username: Some(user.as_ref().map_or_else(|| username.to_owned(), |u| u.username.clone())),
            role: user.and_then(|u| u.role),
        }
    }

    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.write(TOKEN_KEY, &self.access_token)?;
        put(store, REFRESH_TOKEN_KEY, self.refresh_token.as_deref())?;
        put(store, USER_ID_KEY, self.user_id.map(|id| id.to_string()).as_deref())?;
        put(store, USERNAME_KEY, self.username.as_deref())?;
        put(store, USER_ROLE_KEY, self.role.map(Role::as_str))?;
        Ok(())
    }

    /// `Ok(None)` when no token is stored.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, StoreError> {
        let Some(access_token) = store.read(TOKEN_KEY)?.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let user_id = store.read(USER_ID_KEY)?.and_then(|raw| match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring unparsable stored user id");
                None
            }
        });
        let role = store.read(USER_ROLE_KEY)?.and_then(|raw| raw.parse().ok());
        Ok(Some(Self {
            access_token,
            refresh_token: store.read(REFRESH_TOKEN_KEY)?,
            user_id,
            username: store.read(USERNAME_KEY)?,
            role,
        }))
    }

    /// Log out: remove every session key.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn clear(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        for key in ALL_KEYS {
            store.remove(key)?;
        }
        Ok(())
    }
}

fn put(store: &dyn KeyValueStore, key: &str, value: Option<&str>) -> Result<(), StoreError> {
    match value {
        Some(value) => store.write(key, value),
        None => store.remove(key),
    }
}
