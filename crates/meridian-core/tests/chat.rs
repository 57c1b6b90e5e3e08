//! Chat pipeline integration tests.

use meridian_config::{MeridianConfig, OversizeAction};
use meridian_core::{ChatService, ProviderClient, ProviderError, SendMessageRequest, TokenUsage};
use meridian_protocol::{CancelToken, ErrorCode, Role};
use meridian_test_utils::{
    EchoProvider, FailingProvider, FixedProvider, FlakyProvider, RecordingProvider, SlowProvider,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn service(config: &MeridianConfig, provider: Arc<dyn ProviderClient>) -> ChatService {
    ChatService::builder(config, provider)
        .build()
        .expect("build chat service")
}

fn echo_service() -> ChatService {
    service(&MeridianConfig::default(), Arc::new(EchoProvider))
}

/// Injection payloads are cleaned, flagged and still answered.
#[tokio::test]
async fn injection_payloads_are_filtered_and_answered() {
    let chat = echo_service();
    let payloads = [
        ("<script>alert('xss')</script>", "<script"),
        ("'; DROP TABLE users; --", "DROP TABLE"),
        ("; rm -rf /", "rm -rf"),
    ];
    for (idx, (payload, forbidden)) in payloads.iter().enumerate() {
        let envelope = chat
            .send_message(SendMessageRequest::new(format!("payload-{idx}"), *payload))
            .await;
        assert!(envelope.success, "payload {payload:?} failed: {:?}", envelope.error);
        assert_eq!(envelope.metadata.content_filtered, Some(true));
        let reply = envelope.data.expect("reply");
        assert!(!reply.message.content.contains(forbidden));
        assert!(!reply.response.content.contains(forbidden));
    }
}

#[tokio::test]
async fn plain_messages_are_not_flagged() {
    let chat = echo_service();
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert!(envelope.success);
    assert_eq!(envelope.metadata.content_filtered, Some(false));
    let reply = envelope.data.expect("reply");
    assert_eq!(reply.response.role, Role::Assistant);
    assert_eq!(reply.response.content, "You said: Hello");
    assert_eq!(reply.session.messages.len(), 2);
    assert_eq!(reply.session.metadata.message_count, 2);
}

#[tokio::test]
async fn empty_message_is_a_validation_error() {
    let chat = echo_service();
    let envelope = chat.send_message(SendMessageRequest::new("s1", "")).await;
    assert!(!envelope.success);
    assert_eq!(envelope.error_code(), Some(ErrorCode::Validation));

    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert!(envelope.success);
    assert_eq!(
        envelope.data.expect("reply").response.role,
        Role::Assistant
    );
}

#[tokio::test]
async fn rate_limit_rejects_the_21st_call_per_user() {
    let chat = echo_service();
    for idx in 0..20 {
        let envelope = chat
            .send_message(SendMessageRequest::new("s1", format!("message {idx}")).with_user("u1"))
            .await;
        assert!(envelope.success, "call {idx} failed: {:?}", envelope.error);
    }

    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "one more").with_user("u1"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::RateLimit));
    let error = envelope.error.expect("error");
    assert!(error.reset.is_some());

    let other = chat
        .send_message(SendMessageRequest::new("s2", "hi").with_user("u2"))
        .await;
    assert!(other.success);
}

#[tokio::test]
async fn rate_limited_calls_do_not_create_sessions() {
    let chat = echo_service();
    for idx in 0..20 {
        let envelope = chat
            .send_message(SendMessageRequest::new("s1", format!("message {idx}")).with_user("u1"))
            .await;
        assert!(envelope.success, "call {idx} failed: {:?}", envelope.error);
    }
    let before = chat.sessions().list().expect("list").len();

    for idx in 0..10 {
        let envelope = chat
            .send_message(SendMessageRequest::new(format!("x{idx}"), "hello").with_user("u1"))
            .await;
        assert_eq!(envelope.error_code(), Some(ErrorCode::RateLimit));
    }
    assert_eq!(chat.sessions().list().expect("list").len(), before);
    assert_eq!(
        chat.get_session("x0").error_code(),
        Some(ErrorCode::NotFound)
    );
}

/// Stripping a character must not splice a payload back together.
#[tokio::test]
async fn obfuscated_payloads_stay_filtered_both_ways() {
    let payloads = ["rm` -rf /", "DROP` TABLE users", "rm\u{1} -rf /"];
    for (idx, payload) in payloads.iter().enumerate() {
        let chat = service(
            &MeridianConfig::default(),
            Arc::new(FixedProvider::new("fixed", *payload)),
        );
        let envelope = chat
            .send_message(SendMessageRequest::new(format!("obf-{idx}"), *payload))
            .await;
        assert!(envelope.success, "payload {payload:?} failed: {:?}", envelope.error);
        assert_eq!(envelope.metadata.content_filtered, Some(true));
        let reply = envelope.data.expect("reply");
        for content in [&reply.message.content, &reply.response.content] {
            assert!(!content.contains("rm -rf"), "{content:?}");
            assert!(!content.contains("DROP TABLE"), "{content:?}");
        }
    }
}

#[tokio::test]
async fn created_sessions_round_trip() {
    let chat = echo_service();
    let created = chat
        .create_session(Default::default())
        .data
        .expect("session");
    let fetched = chat.get_session(&created.id).data.expect("session");
    assert_eq!(fetched.id, created.id);
    assert!(fetched.messages.is_empty());

    let missing = chat.get_session("missing");
    assert_eq!(missing.error_code(), Some(ErrorCode::NotFound));
    let blank = chat.get_session("  ");
    assert_eq!(blank.error_code(), Some(ErrorCode::Validation));
}

/// Concurrent sends on one session are applied in call order.
#[tokio::test(start_paused = true)]
async fn concurrent_sends_keep_call_order() {
    let (provider, seen) = RecordingProvider::new();
    let provider = provider.with_delay(Duration::from_millis(50));
    let chat = service(&MeridianConfig::default(), Arc::new(provider));

    let (first, second) = tokio::join!(
        chat.send_message(SendMessageRequest::new("s1", "A")),
        chat.send_message(SendMessageRequest::new("s1", "B")),
    );
    assert!(first.success);
    assert!(second.success);

    let session = chat.get_session("s1").data.expect("session");
    let contents: Vec<&str> = session
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(contents, vec!["A", "reply to A", "B", "reply to B"]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_exponentially() {
    let provider = Arc::new(FlakyProvider::new(2, "third time lucky"));
    let chat = service(&MeridianConfig::default(), provider.clone());

    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert!(envelope.success, "send failed: {:?}", envelope.error);
    assert_eq!(envelope.metadata.fallback_used, None);
    assert_eq!(
        envelope.data.expect("reply").response.content,
        "third time lucky"
    );

    let gaps = provider.gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= Duration::from_millis(100) && gaps[0] < Duration::from_millis(110));
    assert!(gaps[1] >= Duration::from_millis(200) && gaps[1] < Duration::from_millis(210));
}

#[tokio::test(start_paused = true)]
async fn exhausted_provider_is_service_unavailable() {
    let primary = Arc::new(FailingProvider::new(
        "primary",
        ProviderError::Unavailable("down".to_string()),
    ));
    let chat = service(&MeridianConfig::default(), primary.clone());
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::ServiceUnavailable));
    assert_eq!(primary.calls(), 3);
    let error = envelope.error.expect("error");
    assert!(!error.message.contains("down"));
}

#[tokio::test(start_paused = true)]
async fn fallback_provider_is_reported_in_metadata() {
    let mut config = MeridianConfig::default();
    config.chat.allow_fallback = true;
    let primary = Arc::new(FailingProvider::new(
        "primary",
        ProviderError::Unavailable("down".to_string()),
    ));
    let chat = ChatService::builder(&config, primary.clone())
        .fallback(Arc::new(FixedProvider::new("backup", "from backup")))
        .build()
        .expect("build");

    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert!(envelope.success);
    assert_eq!(envelope.metadata.fallback_used, Some(true));
    assert_eq!(envelope.metadata.original_provider.as_deref(), Some("primary"));
    assert_eq!(envelope.metadata.actual_provider.as_deref(), Some("backup"));
    assert_eq!(primary.calls(), 3);

    let no_fallback = chat
        .send_message(SendMessageRequest::new("s2", "Hello").with_fallback(false))
        .await;
    assert_eq!(no_fallback.error_code(), Some(ErrorCode::ServiceUnavailable));
}

#[tokio::test]
async fn invalid_responses_are_not_retried() {
    let primary = Arc::new(FailingProvider::new(
        "primary",
        ProviderError::InvalidResponse("garbled".to_string()),
    ));
    let chat = service(&MeridianConfig::default(), primary.clone());
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::InvalidResponse));
    assert_eq!(primary.calls(), 1);

    let blank = service(
        &MeridianConfig::default(),
        Arc::new(FixedProvider::new("blank", "   ")),
    );
    let envelope = blank
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::InvalidResponse));
    let session = blank.get_session("s1").data.expect("session");
    assert!(session.messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out() {
    let chat = service(
        &MeridianConfig::default(),
        Arc::new(SlowProvider::new(Duration::from_secs(5), "late")),
    );
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::Timeout));
}

#[tokio::test(start_paused = true)]
async fn cancelled_requests_report_timeout() {
    let chat = service(
        &MeridianConfig::default(),
        Arc::new(SlowProvider::new(Duration::from_secs(1), "late")),
    );
    let cancel = CancelToken::new();
    let (envelope, ()) = tokio::join!(
        chat.send_message(SendMessageRequest::new("s1", "Hello").with_cancel(cancel.clone())),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        },
    );
    assert_eq!(envelope.error_code(), Some(ErrorCode::Timeout));
    let session = chat.get_session("s1").data.expect("session");
    assert!(session.messages.is_empty());
}

#[tokio::test]
async fn closed_sessions_reject_messages() {
    let chat = echo_service();
    let session = chat
        .create_session(Default::default())
        .data
        .expect("session");
    let closed = chat.close_session(&session.id).data.expect("closed");
    assert!(closed.is_closed());

    let envelope = chat
        .send_message(SendMessageRequest::new(session.id.clone(), "Hello"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::Validation));
}

#[tokio::test]
async fn unknown_sessions_fail_without_auto_create() {
    let mut config = MeridianConfig::default();
    config.chat.auto_create_sessions = false;
    let chat = service(&config, Arc::new(EchoProvider));
    let envelope = chat
        .send_message(SendMessageRequest::new("ghost", "Hello"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::NotFound));

    let invalid = chat
        .send_message(SendMessageRequest::new("../escape", "Hello"))
        .await;
    assert_eq!(invalid.error_code(), Some(ErrorCode::Validation));
}

#[tokio::test]
async fn oversized_messages_follow_the_configured_action() {
    let mut config = MeridianConfig::default();
    config.chat.max_message_chars = 10;
    let chat = service(&config, Arc::new(EchoProvider));
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "abcdefghijk"))
        .await;
    assert_eq!(envelope.error_code(), Some(ErrorCode::Validation));

    config.chat.oversize_action = OversizeAction::Truncate;
    let chat = service(&config, Arc::new(EchoProvider));
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "abcdefghijk"))
        .await;
    let reply = envelope.data.expect("reply");
    assert_eq!(reply.message.content, "abcdefghij");
}

#[tokio::test]
async fn provider_usage_drives_token_counts() {
    let provider = FixedProvider::new("fixed", "hello there").with_usage(TokenUsage {
        prompt_tokens: 12,
        completion_tokens: 7,
    });
    let chat = service(&MeridianConfig::default(), Arc::new(provider));
    let envelope = chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert_eq!(envelope.metadata.tokens_used, Some(19));
    let reply = envelope.data.expect("reply");
    assert_eq!(reply.response.token_count, 7);
    assert_eq!(reply.message.token_count, 2);
}

#[tokio::test]
async fn history_window_limits_provider_context() {
    let mut config = MeridianConfig::default();
    config.chat.history_window = 2;
    let (provider, seen) = RecordingProvider::new();
    let chat = service(&config, Arc::new(provider));
    for message in ["one", "two", "three"] {
        let envelope = chat
            .send_message(SendMessageRequest::new("s1", message))
            .await;
        assert!(envelope.success);
    }
    let seen = seen.lock();
    let history: Vec<&str> = seen[2]
        .history
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(history, vec!["two", "reply to two"]);
    assert_eq!(seen[2].message, "three");
}
