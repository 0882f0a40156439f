use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use crosstalk_config::AppConfig;
use crosstalk_gateway::build_router;
use crosstalk_runtime::RelayServices;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

struct TestApp {
    address: String,
    router: Router,
}

impl TestApp {
    async fn start() -> Self {
        Self::start_with(AppConfig::default()).await
    }

    async fn start_with(config: AppConfig) -> Self {
        let services = RelayServices::initialise(&config);
        let router = build_router(services.state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let address = listener.local_addr().expect("listener address").to_string();

        let app = router.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });

        Self { address, router }
    }

    async fn connect(&self) -> WsClient {
        let (socket, _) = connect_async(format!("ws://{}/ws", self.address))
            .await
            .expect("open relay websocket");
        WsClient { socket }
    }
}

struct WsClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    async fn send_json(&mut self, frame: Value) {
        self.send_text(&frame.to_string()).await;
    }

    async fn send_text(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_string()))
            .await
            .expect("send frame");
    }

    async fn recv_json(&mut self) -> Value {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.socket.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed while waiting for a frame")
                .expect("websocket error while waiting for a frame");

            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text).expect("frame should be JSON")
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    async fn expect_silence(&mut self) {
        match timeout(SILENCE_WINDOW, self.socket.next()).await {
            Err(_) => {}
            Ok(frame) => panic!("expected no frame, got {frame:?}"),
        }
    }

    async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

async fn signup(app: &TestApp, username: &str, invite_code: Option<&str>) -> (WsClient, Value) {
    let mut client = app.connect().await;
    let mut frame = json!({
        "type": "signup",
        "username": username,
        "password": "secret",
    });
    if let Some(code) = invite_code {
        frame["invite_code"] = json!(code);
    }
    client.send_json(frame).await;

    let reply = client.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "signup rejected: {reply}");
    assert_eq!(reply["message"], "Account created successfully");

    let history = client.recv_json().await;
    assert_eq!(history["type"], "history", "expected history replay: {history}");
    (client, history)
}

async fn login(app: &TestApp, username: &str, password: &str) -> (WsClient, Value) {
    let mut client = app.connect().await;
    client
        .send_json(json!({
            "type": "login",
            "username": username,
            "password": password,
        }))
        .await;

    let reply = client.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "login rejected: {reply}");
    assert_eq!(reply["message"], "Login successful");

    let history = client.recv_json().await;
    assert_eq!(history["type"], "history", "expected history replay: {history}");
    (client, history)
}

async fn generate_invite(client: &mut WsClient) -> String {
    client.send_json(json!({ "type": "generate_invite" })).await;

    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "invite_code", "unexpected frame: {frame}");
    let code = frame
        .get("code")
        .and_then(Value::as_str)
        .expect("invite code payload")
        .to_string();
    assert_eq!(
        frame.get("message").and_then(Value::as_str),
        Some(format!("Invite code generated: {code}").as_str())
    );
    code
}

async fn send_chat(client: &mut WsClient, content: &str) {
    client
        .send_json(json!({ "type": "message", "content": content }))
        .await;
}

async fn expect_chat(client: &mut WsClient, username: &str, content: &str) -> Value {
    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "message", "unexpected frame: {frame}");
    assert_eq!(frame["username"], username);
    assert_eq!(frame["content"], content);
    assert!(
        frame["timestamp"].is_string(),
        "chat frames carry a timestamp"
    );
    frame
}

async fn expect_system(client: &mut WsClient, content: &str) {
    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "system", "unexpected frame: {frame}");
    assert_eq!(frame["content"], content);
}

async fn expect_auth_error(client: &mut WsClient, message: &str) {
    let frame = client.recv_json().await;
    assert_eq!(frame["type"], "auth_error", "unexpected frame: {frame}");
    assert_eq!(frame["message"], message);
}

/// First account signed up, second joined through an invite, with the join
/// notice already consumed on the first session.
async fn join_pair(app: &TestApp) -> (WsClient, WsClient) {
    let (mut root, _) = signup(app, "root", None).await;
    let code = generate_invite(&mut root).await;
    let (guest, _) = signup(app, "guest", Some(&code)).await;
    expect_system(&mut root, "guest joined the chat").await;
    (root, guest)
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_returns_ok() {
    let app = TestApp::start().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("dispatch request");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect response body")
        .to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("health body should be JSON");
    assert_eq!(body.get("status").and_then(Value::as_str), Some("ok"));
    assert!(
        body.get("timestamp").and_then(Value::as_str).is_some(),
        "health response should include timestamp"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn first_signup_needs_no_invite_and_sees_empty_history() {
    let app = TestApp::start().await;

    let (_root, history) = signup(&app, "root", None).await;

    assert_eq!(history["messages"], json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn second_signup_requires_a_valid_invite() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;

    let mut guest = app.connect().await;
    guest
        .send_json(json!({ "type": "signup", "username": "guest", "password": "secret" }))
        .await;
    expect_auth_error(&mut guest, "Valid invite code required").await;

    guest
        .send_json(json!({
            "type": "signup",
            "username": "guest",
            "password": "secret",
            "invite_code": "WRONG123",
        }))
        .await;
    expect_auth_error(&mut guest, "Valid invite code required").await;

    // Rejections leave the connection open for another attempt.
    let code = generate_invite(&mut root).await;
    guest
        .send_json(json!({
            "type": "signup",
            "username": "guest",
            "password": "secret",
            "invite_code": code,
        }))
        .await;
    let reply = guest.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "signup rejected: {reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn invite_codes_are_single_use_even_across_connections() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;

    let code = generate_invite(&mut root).await;
    let (_guest, _) = signup(&app, "guest", Some(&code)).await;
    expect_system(&mut root, "guest joined the chat").await;

    let mut third = app.connect().await;
    third
        .send_json(json!({
            "type": "signup",
            "username": "third",
            "password": "secret",
            "invite_code": code,
        }))
        .await;
    expect_auth_error(&mut third, "Valid invite code required").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn simultaneous_signups_with_one_code_admit_exactly_one() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;
    let code = generate_invite(&mut root).await;

    let mut alpha = app.connect().await;
    let mut beta = app.connect().await;
    let claim = |username: &str| {
        json!({
            "type": "signup",
            "username": username,
            "password": "secret",
            "invite_code": code,
        })
    };
    tokio::join!(alpha.send_json(claim("alpha")), beta.send_json(claim("beta")));

    let (first, second) = tokio::join!(alpha.recv_json(), beta.recv_json());
    let successes = [&first, &second]
        .into_iter()
        .filter(|reply| reply["type"] == "auth_success")
        .count();
    assert_eq!(
        successes, 1,
        "exactly one signup may spend the code: {first} vs {second}"
    );
    for reply in [&first, &second] {
        if reply["type"] == "auth_error" {
            assert_eq!(reply["message"], "Valid invite code required");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn signup_requires_username_and_password() {
    let app = TestApp::start().await;

    let mut client = app.connect().await;
    client
        .send_json(json!({ "type": "signup", "username": "", "password": "secret" }))
        .await;
    expect_auth_error(&mut client, "Username and password are required").await;

    client
        .send_json(json!({ "type": "signup", "username": "   ", "password": "secret" }))
        .await;
    expect_auth_error(&mut client, "Username and password are required").await;

    client
        .send_json(json!({ "type": "signup", "username": "root", "password": "" }))
        .await;
    expect_auth_error(&mut client, "Username and password are required").await;

    client
        .send_json(json!({ "type": "signup", "username": "root", "password": "secret" }))
        .await;
    let reply = client.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "signup rejected: {reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_usernames_are_rejected_without_burning_the_invite() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;
    let code = generate_invite(&mut root).await;

    let mut client = app.connect().await;
    client
        .send_json(json!({
            "type": "signup",
            "username": "root",
            "password": "secret",
            "invite_code": code,
        }))
        .await;
    expect_auth_error(&mut client, "Username already exists").await;

    // The duplicate was rejected before the code was consumed.
    client
        .send_json(json!({
            "type": "signup",
            "username": "other",
            "password": "secret",
            "invite_code": code,
        }))
        .await;
    let reply = client.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "signup rejected: {reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn login_succeeds_for_existing_accounts() {
    let app = TestApp::start().await;
    let (root, _) = signup(&app, "root", None).await;
    root.close().await;

    let (_client, history) = login(&app, "root", "secret").await;
    assert_eq!(history["messages"], json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn login_failures_are_indistinguishable() {
    let app = TestApp::start().await;
    let (root, _) = signup(&app, "root", None).await;
    root.close().await;

    let mut client = app.connect().await;
    client
        .send_json(json!({ "type": "login", "username": "root", "password": "wrong" }))
        .await;
    expect_auth_error(&mut client, "Invalid username or password").await;

    client
        .send_json(json!({ "type": "login", "username": "ghost", "password": "secret" }))
        .await;
    expect_auth_error(&mut client, "Invalid username or password").await;

    client
        .send_json(json!({ "type": "login", "username": "root", "password": "secret" }))
        .await;
    let reply = client.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "login rejected: {reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_is_broadcast_to_everyone_including_the_sender() {
    let app = TestApp::start().await;
    let (mut root, mut guest) = join_pair(&app).await;

    send_chat(&mut root, "hello everyone").await;

    expect_chat(&mut root, "root", "hello everyone").await;
    expect_chat(&mut guest, "root", "hello everyone").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn message_key_is_echoed_verbatim_to_every_recipient() {
    let app = TestApp::start().await;
    let (mut root, mut guest) = join_pair(&app).await;

    root.send_json(json!({
        "type": "message",
        "content": "keyed",
        "messageKey": "local-7",
    }))
    .await;

    let own_copy = expect_chat(&mut root, "root", "keyed").await;
    assert_eq!(own_copy["messageKey"], "local-7");
    let guest_copy = expect_chat(&mut guest, "root", "keyed").await;
    assert_eq!(guest_copy["messageKey"], "local-7");

    send_chat(&mut root, "plain").await;
    let own_plain = expect_chat(&mut root, "root", "plain").await;
    assert!(
        own_plain.get("messageKey").is_none(),
        "absent key must be omitted, not null"
    );
    let guest_plain = expect_chat(&mut guest, "root", "plain").await;
    assert!(guest_plain.get("messageKey").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn history_replay_skips_keys_and_notices() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;

    root.send_json(json!({
        "type": "message",
        "content": "keyed",
        "messageKey": "secret-key",
    }))
    .await;
    expect_chat(&mut root, "root", "keyed").await;
    send_chat(&mut root, "plain").await;
    expect_chat(&mut root, "root", "plain").await;

    let code = generate_invite(&mut root).await;
    let (_guest, history) = signup(&app, "guest", Some(&code)).await;

    let messages = history["messages"].as_array().expect("history array");
    assert_eq!(messages.len(), 2, "only chat messages are replayed");
    assert_eq!(messages[0]["content"], "keyed");
    assert!(
        messages[0].get("messageKey").is_none(),
        "history must not retain correlation keys"
    );
    assert_eq!(messages[1]["content"], "plain");
}

#[tokio::test(flavor = "multi_thread")]
async fn history_is_bounded_by_the_configured_capacity() {
    let mut config = AppConfig::default();
    config.relay.history_capacity = 3;
    let app = TestApp::start_with(config).await;

    let (mut root, _) = signup(&app, "root", None).await;
    for index in 0..5 {
        let content = format!("msg-{index}");
        send_chat(&mut root, &content).await;
        expect_chat(&mut root, "root", &content).await;
    }
    root.close().await;

    let (_client, history) = login(&app, "root", "secret").await;
    let messages = history["messages"].as_array().expect("history array");
    let contents: Vec<&str> = messages
        .iter()
        .map(|message| message["content"].as_str().expect("content"))
        .collect();
    assert_eq!(contents, ["msg-2", "msg-3", "msg-4"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn join_notice_reaches_the_room_but_not_the_newcomer() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;
    let code = generate_invite(&mut root).await;

    let (mut guest, _) = signup(&app, "guest", Some(&code)).await;

    expect_system(&mut root, "guest joined the chat").await;
    guest.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn leave_notice_is_broadcast_once_on_disconnect() {
    let app = TestApp::start().await;
    let (mut root, guest) = join_pair(&app).await;

    guest.close().await;

    expect_system(&mut root, "guest left the chat").await;
    root.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn abandoning_the_socket_before_auth_leaves_no_trace() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;

    let pre_auth = app.connect().await;
    pre_auth.close().await;

    root.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invite_replies_go_only_to_the_requester() {
    let app = TestApp::start().await;
    let (mut root, mut guest) = join_pair(&app).await;

    let code = generate_invite(&mut root).await;
    assert_eq!(code.len(), 8);

    guest.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_auth_frames_get_a_generic_error() {
    let app = TestApp::start().await;

    let mut client = app.connect().await;
    client
        .send_json(json!({ "type": "message", "content": "too early" }))
        .await;
    expect_auth_error(&mut client, "Invalid authentication request").await;

    client.send_text("definitely not json").await;
    expect_auth_error(&mut client, "Invalid authentication request").await;

    client
        .send_json(json!({ "type": "signup", "username": "root", "password": "secret" }))
        .await;
    let reply = client.recv_json().await;
    assert_eq!(reply["type"], "auth_success", "signup rejected: {reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_chat_frames_are_dropped_without_killing_the_session() {
    let app = TestApp::start().await;
    let (mut root, _) = signup(&app, "root", None).await;

    root.send_text("br0ken{{").await;
    root.send_json(json!({ "type": "login", "username": "root", "password": "secret" }))
        .await;
    root.expect_silence().await;

    send_chat(&mut root, "still here").await;
    expect_chat(&mut root, "root", "still here").await;
}
