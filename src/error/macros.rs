//! # 错误处理宏

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:literal) => {
        $crate::error::ClientError::config(format!($msg))
    };
    ($msg:expr) => {
        $crate::error::ClientError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ClientError::config(format!($fmt, $($arg)*))
    };
}

/// 快速创建内部错误的宏
#[macro_export]
macro_rules! internal_error {
    ($msg:literal) => {
        $crate::error::ClientError::internal(format!($msg))
    };
    ($msg:expr) => {
        $crate::error::ClientError::internal($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ClientError::internal(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置校验错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::ConfigError::invalid($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::error::ConfigError::invalid(format!($fmt, $($arg)*)));
        }
    };
}
