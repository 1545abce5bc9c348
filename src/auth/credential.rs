//! # 凭证与凭证存储
//!
//! `Credential` 是不透明的访问令牌加可选过期时间；
//! `CredentialStore` 是进程内唯一的可变共享资源，只在登录或刷新成功时写入。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use super::jwt;

/// 访问凭证
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// 创建凭证；若令牌是 JWT 则从 `exp` 声明推导过期时间
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = jwt::decode_expiry(&token);
        Self { token, expires_at }
    }

    /// 创建带显式过期时间的凭证
    #[must_use]
    pub fn with_expiry(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// 令牌原文
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// 过期时间（不透明令牌为 None）
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// 在给定时刻是否已过期
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// 在给定时刻之后的 `window` 内是否会过期
    #[must_use]
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now + window)
    }

    /// 用于日志的脱敏形式
    #[must_use]
    pub fn masked(&self) -> String {
        let prefix: String = self.token.chars().take(6).collect();
        format!("{prefix}***")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.masked())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 凭证存储
///
/// 所有操作同步、不阻塞；`set`/`clear` 对之后的 `get` 立即可见。
pub trait CredentialStore: Send + Sync {
    /// 读取当前凭证
    fn get(&self) -> Option<Credential>;

    /// 写入新凭证
    fn set(&self, credential: Credential);

    /// 清除凭证
    fn clear(&self);
}

/// 进程内凭证存储：单写多读
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    current: RwLock<Option<Credential>>,
    generation: AtomicU64,
}

impl InMemoryCredentialStore {
    /// 创建空存储
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入次数（`set` 与 `clear` 都会递增）
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, credential: Credential) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn clear(&self) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_get_clear_visible_immediately() {
        let store = InMemoryCredentialStore::new();
        assert!(store.get().is_none());

        store.set(Credential::new("tok1"));
        assert_eq!(store.get().unwrap().token(), "tok1");

        store.set(Credential::new("tok2"));
        assert_eq!(store.get().unwrap().token(), "tok2");

        store.clear();
        assert!(store.get().is_none());
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn test_opaque_token_has_no_expiry() {
        let credential = Credential::new("opaque-token");
        assert!(credential.expires_at().is_none());
        assert!(!credential.is_expired_at(Utc::now()));
        assert!(!credential.expires_within(Duration::days(365), Utc::now()));
    }

    #[test]
    fn test_expiry_checks() {
        let now = Utc::now();
        let credential = Credential::with_expiry("tok", Some(now + Duration::seconds(20)));
        assert!(!credential.is_expired_at(now));
        assert!(credential.expires_within(Duration::seconds(30), now));
        assert!(!credential.expires_within(Duration::seconds(10), now));
        assert!(credential.is_expired_at(now + Duration::seconds(20)));
    }

    #[test]
    fn test_debug_masks_token() {
        let credential = Credential::new("supersecretvalue");
        let debug = format!("{credential:?}");
        assert!(debug.contains("supers***"));
        assert!(!debug.contains("supersecretvalue"));
    }

    #[test]
    fn test_concurrent_readers_see_a_whole_credential() {
        let store = Arc::new(InMemoryCredentialStore::new());
        store.set(Credential::new("tok1"));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..200 {
                    store.set(Credential::new(format!("tok{i}")));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let token = store.get().unwrap();
                        assert!(token.token().starts_with("tok"));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get().unwrap().token(), "tok199");
    }
}
