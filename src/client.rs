//! # 客户端门面
//!
//! `AuthClient` 把凭证存储、会话管理、刷新协调器和请求管道组装在一起，
//! 供应用以 `issue` 或便捷方法发出请求。

use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

use crate::auth::{
    CoordinatorStats, Credential, CredentialStore, HttpRefreshExecutor, InMemoryCredentialStore,
    RefreshCoordinator, RefreshExecutor, RequestAuthenticator, SessionEvent, SessionManager,
};
use crate::config::{ClientConfig, ConfigManager};
use crate::error::prelude::*;
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::pipeline::{ApiRequest, ApiResponse, ReqwestTransport, RequestPipeline, Transport};

/// 客户端构建器
#[derive(Default)]
pub struct AuthClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn CredentialStore>>,
    transport: Option<Arc<dyn Transport>>,
    executor: Option<Arc<dyn RefreshExecutor>>,
    session_cookie: Option<String>,
}

impl AuthClientBuilder {
    /// 以配置创建构建器
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// 注入凭证存储
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 注入传输层
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 注入刷新执行器
    #[must_use]
    pub fn refresh_executor(mut self, executor: Arc<dyn RefreshExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 预置会话 Cookie 的值（Cookie 名取自 `auth.session_cookie_name`）
    #[must_use]
    pub fn session_cookie(mut self, value: impl Into<String>) -> Self {
        self.session_cookie = Some(value.into());
        self
    }

    /// 构建客户端
    pub fn build(self) -> Result<AuthClient> {
        let config = self.config;
        config.validate()?;

        let http_client = Self::http_client(&config, self.session_cookie.as_deref())?;
        let store: Arc<dyn CredentialStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryCredentialStore::new()),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_client(
                http_client.clone(),
                &config.api,
            )?),
        };
        let executor: Arc<dyn RefreshExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpRefreshExecutor::new(
                http_client,
                &config.api,
                &config.auth,
            )?),
        };

        let session = SessionManager::new(Arc::clone(&store));
        let coordinator = RefreshCoordinator::new(
            executor,
            Arc::clone(&store),
            Arc::new(session.clone()),
            config.auth.refresh_timeout(),
        );
        let authenticator = RequestAuthenticator::new(
            Arc::clone(&store),
            &config.auth.header_name,
            config.auth.scheme.clone(),
        )?;
        let pipeline = RequestPipeline::new(
            authenticator,
            transport,
            coordinator,
            Arc::clone(&store),
            config.auth.clone(),
        )?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Client,
            "client_ready",
            &format!(
                "客户端就绪: base_url={}, refresh={}",
                config.api.base_url, config.auth.refresh_path
            )
        );

        Ok(AuthClient {
            config,
            session,
            pipeline,
        })
    }

    /// 共享 Cookie 存储的 HTTP 客户端，传输层与刷新执行器共用
    fn http_client(config: &ClientConfig, session_cookie: Option<&str>) -> Result<reqwest::Client> {
        let jar = reqwest::cookie::Jar::default();
        if let Some(value) = session_cookie {
            let url = Url::parse(&config.api.base_url)
                .map_err(|e| config_error!("无效的 base_url: {e}"))?;
            jar.add_cookie_str(
                &format!("{}={value}; Path=/", config.auth.session_cookie_name),
                &url,
            );
        }

        reqwest::Client::builder()
            .user_agent(config.api.user_agent.clone())
            .cookie_provider(Arc::new(jar))
            .build()
            .map_err(|e| ClientError::internal_with_source("创建HTTP客户端失败", e))
    }
}

/// 带自动令牌刷新的 API 客户端
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: ClientConfig,
    session: SessionManager,
    pipeline: RequestPipeline,
}

impl AuthClient {
    /// 以默认组件创建客户端
    pub fn new(config: ClientConfig) -> Result<Self> {
        AuthClientBuilder::new(config).build()
    }

    /// 构建器
    #[must_use]
    pub fn builder(config: ClientConfig) -> AuthClientBuilder {
        AuthClientBuilder::new(config)
    }

    /// 从配置管理器创建客户端
    pub async fn from_config_manager(manager: &ConfigManager) -> Result<Self> {
        Self::new(manager.get_config().await)
    }

    /// 当前配置
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 发出请求
    pub async fn issue(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.pipeline.issue(request).await
    }

    /// 并发发出多个请求，结果与输入顺序一致
    pub async fn issue_all(&self, requests: Vec<ApiRequest>) -> Vec<Result<ApiResponse>> {
        join_all(requests.into_iter().map(|r| self.issue(r))).await
    }

    /// GET
    pub async fn get(&self, target: &str) -> Result<ApiResponse> {
        self.issue(ApiRequest::get(target)).await
    }

    /// POST JSON
    pub async fn post<B: Serialize + ?Sized>(&self, target: &str, body: &B) -> Result<ApiResponse> {
        self.issue(ApiRequest::post(target).json(body)?).await
    }

    /// PUT JSON
    pub async fn put<B: Serialize + ?Sized>(&self, target: &str, body: &B) -> Result<ApiResponse> {
        self.issue(ApiRequest::put(target).json(body)?).await
    }

    /// PATCH JSON
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
    ) -> Result<ApiResponse> {
        self.issue(ApiRequest::patch(target).json(body)?).await
    }

    /// DELETE
    pub async fn delete(&self, target: &str) -> Result<ApiResponse> {
        self.issue(ApiRequest::delete(target)).await
    }

    /// GET 并解码信封中的 `data`
    pub async fn get_data<T: DeserializeOwned>(&self, target: &str) -> Result<T> {
        self.get(target).await?.into_data()
    }

    /// POST 并解码信封中的 `data`
    pub async fn post_data<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
    ) -> Result<T> {
        self.post(target, body).await?.into_data()
    }

    /// 登录：写入访问令牌
    pub fn login(&self, access_token: impl Into<String>) {
        self.session.login(Credential::new(access_token));
    }

    /// 主动登出
    pub fn logout(&self) {
        self.session.logout();
    }

    /// 订阅会话事件
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// 当前是否持有凭证
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// 当前凭证
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.session.credential()
    }

    /// 刷新协调器统计
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.pipeline.coordinator().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LogoutReason;
    use crate::error::RefreshError;
    use crate::testing::{
        data_envelope, init_test_env, mount_refresh_failure, mount_refresh_success,
        refresh_calls, test_config,
    };
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Profile {
        #[serde(rename = "userId")]
        user_id: String,
    }

    async fn mount_profile(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(data_envelope(json!({ "userId": "u-1" }))),
            )
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_data_refreshes_with_session_cookie() {
        init_test_env();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(header("cookie", "RefreshToken=r1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(crate::testing::refresh_envelope("tok2")),
            )
            .mount(&server)
            .await;
        mount_profile(&server, "tok2").await;

        let client = AuthClient::builder(test_config(&server.uri()))
            .session_cookie("r1")
            .build()
            .unwrap();
        client.login("tok1");

        let profile: Profile = client.get_data("/api/users/me").await.unwrap();
        assert_eq!(profile.user_id, "u-1");
        assert_eq!(client.credential().unwrap().token(), "tok2");
        assert_eq!(refresh_calls(&server).await, 1);
        assert_eq!(client.stats().episodes_succeeded, 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out() {
        init_test_env();
        let server = MockServer::start().await;
        mount_refresh_failure(&server, 401, Duration::ZERO).await;
        mount_profile(&server, "tok2").await;

        let client = AuthClient::new(test_config(&server.uri())).unwrap();
        client.login("tok1");
        let mut events = client.subscribe();

        let err = client.get("/api/users/me").await.unwrap_err();
        assert!(err.is_session_ended());
        assert!(!client.is_authenticated());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut {
                reason: LogoutReason::RefreshFailed(RefreshError::rejected(
                    401,
                    "Refresh token expired"
                ))
            }
        );
    }

    #[tokio::test]
    async fn test_issue_all_shares_one_refresh() {
        init_test_env();
        let server = MockServer::start().await;
        mount_refresh_success(&server, "tok2", Duration::from_millis(200)).await;
        mount_profile(&server, "tok2").await;

        let client = AuthClient::new(test_config(&server.uri())).unwrap();
        client.login("tok1");

        let results = client
            .issue_all((0..5).map(|_| ApiRequest::get("/api/users/me")).collect())
            .await;
        for result in results {
            assert_eq!(result.unwrap().status, reqwest::StatusCode::OK);
        }
        assert_eq!(refresh_calls(&server).await, 1);
    }

    #[tokio::test]
    async fn test_post_data_failure_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 400,
                "message": "invalid market"
            })))
            .mount(&server)
            .await;

        let client = AuthClient::new(test_config(&server.uri())).unwrap();
        client.login("tok1");
        let err = client
            .post_data::<serde_json::Value, _>("/api/orders", &json!({ "market": "X" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_put_sends_json_body_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/users/me"))
            .and(header("authorization", "Bearer tok1"))
            .and(body_json(json!({ "nickname": "kim" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(data_envelope(json!(null))))
            .mount(&server)
            .await;

        let client = AuthClient::new(test_config(&server.uri())).unwrap();
        client.login("tok1");
        let response = client
            .put("/api/users/me", &json!({ "nickname": "kim" }))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(refresh_calls(&server).await, 0);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = AuthClient::new(ClientConfig::with_base_url("not a url")).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
