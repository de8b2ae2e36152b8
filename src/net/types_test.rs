use super::*;

// =============================================================
// ChatMessage
// =============================================================

#[test]
fn chat_message_reads_history_spelling() {
    let msg: ChatMessage = serde_json::from_value(serde_json::json!({
        "id": 1,
        "author_id": 7,
        "author_name": "alice",
        "message": "hello",
        "timestamp": "2024-05-01T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(msg.id, WireId::Number(1));
    assert_eq!(msg.author_id, Some(WireId::Number(7)));
    assert_eq!(msg.author_name.as_deref(), Some("alice"));
    assert_eq!(msg.message, "hello");
    assert_eq!(msg.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
}

#[test]
fn chat_message_reads_socket_spelling() {
    let msg: ChatMessage = serde_json::from_str(r#"{"id":5,"user_id":3,"username":"bob","message":"yo"}"#).unwrap();
    assert_eq!(msg.author_id, Some(WireId::Number(3)));
    assert_eq!(msg.author_name.as_deref(), Some("bob"));
    assert!(msg.timestamp.is_none());
}

#[test]
fn chat_message_accepts_content_alias() {
    let msg: ChatMessage = serde_json::from_str(r#"{"id":"m-1","content":"via content"}"#).unwrap();
    assert_eq!(msg.id, WireId::Text("m-1".to_owned()));
    assert_eq!(msg.message, "via content");
}

#[test]
fn chat_message_without_id_gets_temporary_id() {
    let msg: ChatMessage = serde_json::from_str(r#"{"message":"no id"}"#).unwrap();
    assert!(matches!(&msg.id, WireId::Text(id) if id.starts_with("tmp-")), "{:?}", msg.id);
    let other: ChatMessage = serde_json::from_str(r#"{"message":"no id"}"#).unwrap();
    assert_ne!(msg.id, other.id);
}

#[test]
fn chat_message_requires_body() {
    assert!(serde_json::from_str::<ChatMessage>(r#"{"id":1,"username":"x"}"#).is_err());
    assert!(serde_json::from_str::<ChatMessage>("not json").is_err());
}

#[test]
fn display_author_falls_back_to_id_then_anonymous() {
    let mut msg: ChatMessage = serde_json::from_str(r#"{"id":1,"user_id":9,"message":"m"}"#).unwrap();
    assert_eq!(msg.display_author(), "User #9");
    msg.author_name = Some("carol".to_owned());
    assert_eq!(msg.display_author(), "carol");
    msg.author_name = None;
    msg.author_id = None;
    assert_eq!(msg.display_author(), "anonymous");
}

// =============================================================
// Outbound
// =============================================================

#[test]
fn outbound_message_flattens_draft_and_adds_timestamp() {
    let out = OutboundMessage::stamp(ChatDraft::text("hi"));
    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value["message"], "hi");
    assert_eq!(value["type"], "message");
    assert!(value.get("username").is_none());
    let ts = value["timestamp"].as_str().unwrap();
    assert!(ts.contains('T'), "expected RFC 3339 timestamp, got {ts}");
}

#[test]
fn wire_id_display() {
    assert_eq!(WireId::Number(42).to_string(), "42");
    assert_eq!(WireId::Text("abc".to_owned()).to_string(), "abc");
}

// =============================================================
// Auth / forum
// =============================================================

#[test]
fn credentials_omit_role_when_absent() {
    let creds = Credentials { username: "u".to_owned(), password: "p".to_owned(), role: None };
    assert_eq!(serde_json::to_value(&creds).unwrap(), serde_json::json!({"username":"u","password":"p"}));

    let creds = Credentials { role: Some(Role::Admin), ..creds };
    assert_eq!(serde_json::to_value(&creds).unwrap()["role"], "admin");
}

#[test]
fn role_parses_from_str() {
    assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
    assert_eq!("user".parse::<Role>(), Ok(Role::User));
    assert!("root".parse::<Role>().is_err());
}

#[test]
fn auth_tokens_user_is_optional() {
    let tokens: AuthTokens = serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
    assert_eq!(tokens.access_token, "a");
    assert!(tokens.user.is_none());
}

#[test]
fn collection_unwraps_every_envelope() {
    let bare: Collection<i64> = serde_json::from_str("[1,2]").unwrap();
    assert_eq!(bare.into_vec(), vec![1, 2]);
    let data: Collection<i64> = serde_json::from_str(r#"{"data":[3]}"#).unwrap();
    assert_eq!(data.into_vec(), vec![3]);
    let comments: Collection<i64> = serde_json::from_str(r#"{"comments":[4,5]}"#).unwrap();
    assert_eq!(comments.into_vec(), vec![4, 5]);
}

#[test]
fn comment_defaults_like_fields() {
    let comment: Comment =
        serde_json::from_str(r#"{"id":1,"author_id":2,"post_id":3,"content":"c","author_name":"dan"}"#).unwrap();
    assert_eq!(comment.likes, 0);
    assert!(!comment.is_liked);
    assert!(comment.parent_id.is_none());
}
