//! # 测试数据 Fixtures
//!
//! 令牌与响应信封的预设数据

use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};

/// 测试用签名密钥（签名不会被校验）
const TEST_SIGNING_KEY: &[u8] = b"test-signing-key";

/// 生成 `exp` 在 `seconds` 秒之后的 JWT（可为负数，表示已过期）
#[must_use]
pub fn jwt_expiring_in(subject: &str, seconds: i64) -> String {
    let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
    let claims = json!({ "sub": subject, "exp": exp });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SIGNING_KEY),
    )
    .unwrap_or_default()
}

/// 刷新成功的响应信封
#[must_use]
pub fn refresh_envelope(access_token: &str) -> Value {
    json!({
        "code": 200,
        "message": "토큰이 갱신되었습니다.",
        "data": {
            "accessToken": access_token,
            "refreshToken": "rotated-refresh-token"
        }
    })
}

/// 失败的响应信封
#[must_use]
pub fn failure_envelope(code: i64, message: &str) -> Value {
    json!({ "code": code, "message": message, "data": null })
}

/// 成功的数据信封
#[must_use]
pub fn data_envelope(data: Value) -> Value {
    json!({ "code": 200, "message": "ok", "data": data })
}
