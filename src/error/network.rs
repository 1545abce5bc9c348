use thiserror::Error;

/// 单次请求发送失败（瞬时错误），不会被本库重试
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network request failed: {0}")]
    Reqwest(#[source] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid request target: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// 是否为超时
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Reqwest(err)
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
