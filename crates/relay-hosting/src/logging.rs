//! 全局日志订阅器的安装入口。
//!
//! # 教案式说明
//! - **意图（Why）**：中继把终端文本写到标准输出，诊断日志因此固定写往标准错误，两者互不干扰；
//! - **逻辑（How）**：以 `tracing-subscriber` 组装 `fmt + EnvFilter`，过滤规则优先取 `RUST_LOG`，缺省为 `info`；
//! - **契约（What）**：进程内只能安装一次，外部已设置全局订阅器时返回 [`LoggingError::SubscriberAlreadySet`]。

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;

/// 日志安装失败的原因。
#[derive(Debug, Error)]
pub enum LoggingError {
    /// 全局订阅器已存在，无法覆盖。
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,

    /// 过滤规则无法解析。
    #[error("invalid log filter `{directives}`: {reason}")]
    InvalidFilter { directives: String, reason: String },

    /// 设置全局订阅器的底层错误。
    #[error(transparent)]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 按 `RUST_LOG`（缺省 `info`）安装全局订阅器。
pub fn init() -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter)
}

/// 以显式的过滤规则安装全局订阅器，例如 `relay::stream=debug`。
pub fn init_with_filter(directives: &str) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_new(directives).map_err(|err| LoggingError::InvalidFilter {
            directives: directives.to_owned(),
            reason: err.to_string(),
        })?;
    install(filter)
}

fn install(filter: EnvFilter) -> Result<(), LoggingError> {
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
