//! # 令牌刷新流程测试
//!
//! 通过 wiremock 模拟后端，验证完整客户端的刷新行为：
//! 单飞刷新、失败登出、至多一次重放、刷新端点不递归、传输超时

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use api_auth_client::auth::{
    Credential, FnTeardown, InMemoryCredentialStore, LogoutReason, RefreshCoordinator,
    RefreshExecutor, SessionEvent,
};
use api_auth_client::error::{RefreshError, RefreshResult};
use api_auth_client::{ApiRequest, AuthClient, ClientConfig, ClientError};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use rstest::rstest;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH_PATH: &str = "/api/auth/refresh";

fn config_for(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::with_base_url(server.uri());
    config.api.request_timeout_seconds = 2;
    config.auth.refresh_timeout_seconds = 2;
    config
}

async fn mount_refresh(server: &MockServer, status: u16, body: serde_json::Value, delay: Duration) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// 只接受 `Bearer {token}` 的受保护资源，其余返回 401
async fn mount_protected(server: &MockServer, resource: &str, token: &str) {
    Mock::given(method("GET"))
        .and(path(resource))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "message": "ok",
            "data": { "resource": resource }
        })))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(resource))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 401,
            "message": "Access token expired"
        })))
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, target: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == target)
        .count()
}

async fn authorizations_for(server: &MockServer, target: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == target)
        .filter_map(|r| r.headers.get("authorization"))
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_five_concurrent_expired_requests_trigger_one_refresh() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        200,
        json!({ "code": 200, "message": "ok", "data": { "accessToken": "tok2" } }),
        Duration::from_millis(300),
    )
    .await;
    for i in 0..5 {
        mount_protected(&server, &format!("/api/items/{i}"), "tok2").await;
    }

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");

    let requests = (0..5)
        .map(|i| ApiRequest::get(format!("/api/items/{i}")))
        .collect();
    let results = client.issue_all(requests).await;

    for (i, result) in results.into_iter().enumerate() {
        let data: serde_json::Value = result.unwrap().into_data().unwrap();
        assert_eq!(data["resource"], format!("/api/items/{i}"));
    }
    assert_eq!(count_requests(&server, REFRESH_PATH).await, 1);
    assert_eq!(client.credential().unwrap().token(), "tok2");

    for i in 0..5 {
        let target = format!("/api/items/{i}");
        assert_eq!(
            authorizations_for(&server, &target).await,
            vec!["Bearer tok1".to_string(), "Bearer tok2".to_string()]
        );
    }

    let stats = client.stats();
    assert_eq!(stats.episodes_started, 1);
    assert_eq!(stats.waiters_served, 5);
}

#[tokio::test]
async fn test_refresh_failure_fails_all_waiters_and_logs_out_once() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        401,
        json!({ "code": 401, "message": "Refresh token expired" }),
        Duration::from_millis(300),
    )
    .await;
    for i in 0..3 {
        mount_protected(&server, &format!("/api/items/{i}"), "tok2").await;
    }

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");
    let mut events = client.subscribe();

    let requests = (0..3)
        .map(|i| ApiRequest::get(format!("/api/items/{i}")))
        .collect();
    let results = client.issue_all(requests).await;

    let expected = RefreshError::rejected(401, "Refresh token expired");
    for result in results {
        match result {
            Err(ClientError::Refresh(e)) => assert_eq!(e, expected),
            other => panic!("expected refresh failure, got {other:?}"),
        }
    }
    assert_eq!(count_requests(&server, REFRESH_PATH).await, 1);
    assert!(!client.is_authenticated());

    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshFailed(expected)
        }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_requests_after_forced_logout_are_unauthenticated() {
    let server = MockServer::start().await;
    mount_refresh(&server, 500, json!({ "code": 500, "message": "boom" }), Duration::ZERO).await;
    mount_protected(&server, "/api/users/me", "tok2").await;
    Mock::given(method("GET"))
        .and(path("/api/public/notice"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");
    assert!(client.get("/api/users/me").await.is_err());

    client.issue(ApiRequest::get("/api/public/notice")).await.unwrap();
    assert!(authorizations_for(&server, "/api/public/notice").await.is_empty());
}

#[tokio::test]
async fn test_retried_request_is_not_refreshed_twice() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        200,
        json!({ "code": 200, "data": { "accessToken": "tok2" } }),
        Duration::ZERO,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");

    let err = client.get("/api/users/me").await.unwrap_err();
    assert!(matches!(err, ClientError::CredentialExpired { ref target } if target == "/api/users/me"));
    assert_eq!(count_requests(&server, REFRESH_PATH).await, 1);
    assert_eq!(count_requests(&server, "/api/users/me").await, 2);
}

#[tokio::test]
async fn test_request_to_refresh_endpoint_never_triggers_refresh() {
    let server = MockServer::start().await;
    mount_refresh(&server, 401, json!({ "code": 401, "message": "nope" }), Duration::ZERO).await;

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");

    let response = client.issue(ApiRequest::post(REFRESH_PATH)).await.unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(count_requests(&server, REFRESH_PATH).await, 1);
    assert_eq!(client.stats().episodes_started, 0);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_send_timeout_is_reported_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");

    let err = client
        .issue(ApiRequest::get("/api/slow").timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();
    match err {
        ClientError::Transport(e) => assert!(e.is_timeout()),
        other => panic!("expected transport timeout, got {other:?}"),
    }
    assert_eq!(client.stats().episodes_started, 0);
    assert_eq!(client.credential().unwrap().token(), "tok1");
}

#[rstest]
#[case(400)]
#[case(403)]
#[case(404)]
#[case(500)]
#[case(503)]
#[tokio::test]
async fn test_non_expiry_statuses_pass_through(#[case] status: u16) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;

    let client = AuthClient::new(config_for(&server)).unwrap();
    client.login("tok1");

    let response = client.get("/api/orders").await.unwrap();
    assert_eq!(response.status.as_u16(), status);
    assert_eq!(count_requests(&server, REFRESH_PATH).await, 0);
    assert_eq!(count_requests(&server, "/api/orders").await, 1);
}

#[tokio::test]
async fn test_refresh_timeout_ends_session() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        200,
        json!({ "code": 200, "data": { "accessToken": "tok2" } }),
        Duration::from_secs(3),
    )
    .await;
    mount_protected(&server, "/api/users/me", "tok2").await;

    let mut config = config_for(&server);
    config.auth.refresh_timeout_seconds = 1;
    let client = AuthClient::new(config).unwrap();
    client.login("tok1");

    let err = client.get("/api/users/me").await.unwrap_err();
    assert!(err.is_session_ended());
    assert!(!client.is_authenticated());
}

/// 计数并在首次调用时等待的刷新执行器
struct SlowExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl RefreshExecutor for SlowExecutor {
    async fn refresh(&self) -> RefreshResult<Credential> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(Credential::new(format!("tok{}", n + 1)))
    }
}

#[tokio::test]
async fn test_coordinator_with_custom_executor_and_teardown() {
    let executor = Arc::new(SlowExecutor {
        calls: AtomicUsize::new(0),
    });
    let teardowns = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&teardowns);
    let store = Arc::new(InMemoryCredentialStore::new());
    let coordinator = RefreshCoordinator::new(
        executor.clone(),
        store.clone(),
        Arc::new(FnTeardown(move |_: &RefreshError| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        Duration::from_secs(1),
    );

    let first = futures::future::join_all((0..10).map(|i| {
        let coordinator = coordinator.clone();
        async move { coordinator.ensure_fresh_credential(&format!("a-{i}")).await }
    }))
    .await;
    assert!(first.iter().all(|r| r.as_ref().unwrap().token() == "tok2"));

    let second = coordinator.ensure_fresh_credential("b").await.unwrap();
    assert_eq!(second.token(), "tok3");
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(teardowns.load(Ordering::SeqCst), 0);
}
