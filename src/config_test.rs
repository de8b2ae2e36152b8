use super::*;

const VARS: &[&str] = &[
    "FORUM_AUTH_URL",
    "FORUM_API_URL",
    "FORUM_CHAT_URL",
    "FORUM_CHAT_WS_URL",
    "FORUM_RECONNECT_BASE_MS",
    "FORUM_RECONNECT_MAX_MS",
    "FORUM_OUTBOUND_QUEUE_LIMIT",
    "FORUM_HTTP_TIMEOUT_SECS",
    "FORUM_SESSION_FILE",
];

/// Env vars are process-global, so every scenario runs inside one test.
///
/// # Safety
/// No other test in this crate touches `FORUM_*` variables.
unsafe fn clear_forum_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
fn from_env_scenarios() {
    unsafe { clear_forum_env() };
    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.endpoints, Endpoints::default());
    assert_eq!(cfg.session, SessionSettings::default());
    assert_eq!(cfg.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
    assert_eq!(cfg.session_file, PathBuf::from(DEFAULT_SESSION_FILE));

    unsafe {
        std::env::set_var("FORUM_CHAT_URL", "https://chat.example.test/api/v1/");
        std::env::set_var("FORUM_CHAT_WS_URL", " wss://chat.example.test/ws ");
        std::env::set_var("FORUM_RECONNECT_BASE_MS", "250");
        std::env::set_var("FORUM_RECONNECT_MAX_MS", "100");
        std::env::set_var("FORUM_OUTBOUND_QUEUE_LIMIT", "8");
        std::env::set_var("FORUM_SESSION_FILE", "/tmp/s.json");
    }
    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.endpoints.chat, "https://chat.example.test/api/v1");
    assert_eq!(cfg.endpoints.chat_ws, "wss://chat.example.test/ws");
    assert_eq!(cfg.endpoints.history_url(), "https://chat.example.test/api/v1/messages");
    assert_eq!(cfg.session.reconnect_base, Duration::from_millis(250));
    assert_eq!(cfg.session.reconnect_max, Duration::from_millis(250), "ceiling clamps up to base");
    assert_eq!(cfg.session.queue_limit, 8);
    assert_eq!(cfg.session_file, PathBuf::from("/tmp/s.json"));

    unsafe { std::env::set_var("FORUM_RECONNECT_BASE_MS", "soon") };
    assert_eq!(
        ClientConfig::from_env(),
        Err(ConfigError::InvalidNumber { var: "FORUM_RECONNECT_BASE_MS", value: "soon".to_owned() })
    );

    unsafe { std::env::set_var("FORUM_RECONNECT_BASE_MS", "0") };
    assert_eq!(ClientConfig::from_env(), Err(ConfigError::Zero { var: "FORUM_RECONNECT_BASE_MS" }));

    unsafe {
        std::env::set_var("FORUM_RECONNECT_BASE_MS", "250");
        std::env::set_var("FORUM_HTTP_TIMEOUT_SECS", "0");
    }
    assert_eq!(ClientConfig::from_env(), Err(ConfigError::Zero { var: "FORUM_HTTP_TIMEOUT_SECS" }));

    unsafe { std::env::set_var("FORUM_HTTP_TIMEOUT_SECS", "3") };
    assert_eq!(ClientConfig::from_env().unwrap().http_timeout, Duration::from_secs(3));

    unsafe { clear_forum_env() };
}

#[test]
fn default_history_url_points_at_messages() {
    assert_eq!(Endpoints::default().history_url(), "http://localhost:8082/api/v1/messages");
}
