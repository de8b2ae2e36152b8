use super::*;
use crate::net::types::User;
use crate::state::store::MemoryStore;

fn tokens(user: Option<User>) -> AuthTokens {
    AuthTokens { access_token: "acc".to_owned(), refresh_token: "ref".to_owned(), user }
}

// =============================================================
// from_signin
// =============================================================

#[test]
fn from_signin_prefers_service_user_record() {
    let user = User { id: 7, username: "Alice".to_owned(), role: Some(Role::Admin) };
    let session = AuthSession::from_signin(tokens(Some(user)), "alice");
    assert_eq!(session.user_id, Some(7));
    assert_eq!(session.username.as_deref(), Some("Alice"));
    assert_eq!(session.role, Some(Role::Admin));
}

#[test]
fn from_signin_falls_back_to_typed_username() {
    let session = AuthSession::from_signin(tokens(None), "alice");
    assert_eq!(session.access_token, "acc");
    assert_eq!(session.refresh_token.as_deref(), Some("ref"));
    assert_eq!(session.user_id, None);
    assert_eq!(session.username.as_deref(), Some("alice"));
}

// =============================================================
// save / load / clear
// =============================================================

#[test]
fn save_then_load_uses_well_known_keys() {
    let store = MemoryStore::new();
    let session = AuthSession {
        access_token: "acc".to_owned(),
        refresh_token: Some("ref".to_owned()),
        user_id: Some(3),
        username: Some("bob".to_owned()),
        role: Some(Role::User),
    };
    session.save(&store).unwrap();

    assert_eq!(store.read("token").unwrap().as_deref(), Some("acc"));
    assert_eq!(store.read("refreshToken").unwrap().as_deref(), Some("ref"));
    assert_eq!(store.read("userId").unwrap().as_deref(), Some("3"));
    assert_eq!(store.read("userRole").unwrap().as_deref(), Some("user"));
    assert_eq!(AuthSession::load(&store).unwrap(), Some(session));
}

#[test]
fn saving_without_optional_fields_removes_stale_values() {
    let store = MemoryStore::new();
    store.write("userRole", "admin").unwrap();
    AuthSession { access_token: "acc".to_owned(), ..AuthSession::default() }.save(&store).unwrap();
    assert_eq!(store.read("userRole").unwrap(), None);
}

#[test]
fn load_without_token_is_none() {
    let store = MemoryStore::new();
    store.write("username", "bob").unwrap();
    assert_eq!(AuthSession::load(&store).unwrap(), None);
    store.write("token", "").unwrap();
    assert_eq!(AuthSession::load(&store).unwrap(), None);
}

#[test]
fn load_tolerates_garbage_id_and_role() {
    let store = MemoryStore::new();
    store.write("token", "acc").unwrap();
    store.write("userId", "not-a-number").unwrap();
    store.write("userRole", "superuser").unwrap();
    let session = AuthSession::load(&store).unwrap().unwrap();
    assert_eq!(session.user_id, None);
    assert_eq!(session.role, None);
}

#[test]
fn clear_logs_out() {
    let store = MemoryStore::new();
    AuthSession::from_signin(tokens(None), "alice").save(&store).unwrap();
    AuthSession::clear(&store).unwrap();
    assert_eq!(AuthSession::load(&store).unwrap(), None);
    assert_eq!(store.read("username").unwrap(), None);
}
