//! autoconf-errors - 统一错误处理
//!
//! 所有装配步骤共用的错误类型

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("MongoDB error: {0}")]
    Mongo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::Kafka(msg.into())
    }

    pub fn mongo(msg: impl Into<String>) -> Self {
        Self::Mongo(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为配置前置条件错误（启动时应立即失败）
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

/// 状态断言，条件不满足时返回 `IllegalState`
pub fn ensure_state(condition: bool, msg: impl Into<String>) -> AppResult<()> {
    if condition {
        Ok(())
    } else {
        Err(AppError::illegal_state(msg))
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
