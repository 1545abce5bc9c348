//! # 测试 Mock 对象
//!
//! 基于 mockall 的传输层与刷新执行器 mock

use async_trait::async_trait;
use mockall::mock;

use crate::auth::{AuthorizedRequest, Credential, RefreshExecutor};
use crate::error::{RefreshResult, TransportResult};
use crate::pipeline::{ApiResponse, Transport};

mock! {
    /// Mock 传输层
    pub Transport {}

    #[async_trait]
    impl Transport for Transport {
        async fn send(&self, request: AuthorizedRequest) -> TransportResult<ApiResponse>;
    }
}

mock! {
    /// Mock 刷新执行器
    pub RefreshExecutor {}

    #[async_trait]
    impl RefreshExecutor for RefreshExecutor {
        async fn refresh(&self) -> RefreshResult<Credential>;
    }
}
