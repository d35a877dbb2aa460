//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为中继核心暴露的错误语义提供集中定义：配置、传输、协议层与编排器生命周期各占一类；
//! - `TransportError::WouldBlock` 不是故障，而是“当前无数据”的哨兵，仅由
//!   [`StreamRelay::recv_all`](crate::relay::StreamRelay::recv_all) 吞掉。
//!
//! ## 设计要求（What）
//! - 所有错误类型均派生 `thiserror::Error`，可跨线程传播（`Send + Sync + 'static`）；
//! - 编排器不做重试或重连，除 `WouldBlock` 外的错误一律原样向调用方传播。

use std::io;

use thiserror::Error;

/// 中继核心的统一返回别名。
pub type Result<T, E = RelayError> = core::result::Result<T, E>;

/// 协议栈描述串或配置文件不合法。
///
/// 启动期致命错误，不会被重试。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 描述串为空，无法构造非空的协议层链。
    #[error("stack specification is empty")]
    EmptySpecification,

    /// 某个逗号分隔的描述符为空，例如 `zmq=*:1,,term`。
    #[error("stack specification contains an empty descriptor at position {position}")]
    EmptyDescriptor { position: usize },

    /// 首个描述符指向的传输类型未注册。
    #[error("unknown transport `{name}`")]
    UnknownTransport { name: String },

    /// 协议层名称未注册。
    #[error("unknown layer `{name}`")]
    UnknownLayer { name: String },

    /// 缺少必需的子参数，例如 `zmq` 缺少端口。
    #[error("`{descriptor}` is missing required argument `{argument}`")]
    MissingArgument {
        descriptor: String,
        argument: &'static str,
    },

    /// 子参数存在但无法解析。
    #[error("`{descriptor}` has invalid argument `{value}`: {reason}")]
    InvalidArgument {
        descriptor: String,
        value: String,
        reason: String,
    },

    /// TOML 配置解析失败。
    #[error("relay configuration is not valid TOML: {0}")]
    Toml(String),
}

/// 传输端点的失败分类。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 非阻塞接收时暂无数据。
    #[error("transport would block")]
    WouldBlock,

    /// 端点已关闭。
    #[error("transport endpoint is closed")]
    Closed,

    /// 底层 IO 错误。
    #[error("transport io failure: {0}")]
    Io(#[from] io::Error),

    /// 消息队列后端报告的协议或状态错误。
    #[error("transport backend failure during `{operation}`: {detail}")]
    Backend {
        operation: &'static str,
        detail: String,
    },
}

impl TransportError {
    /// 是否为“暂无数据”的哨兵信号。
    pub fn is_would_block(&self) -> bool {
        match self {
            TransportError::WouldBlock => true,
            TransportError::Io(err) => err.kind() == io::ErrorKind::WouldBlock,
            _ => false,
        }
    }
}

/// 协议层在编码/解码/超时处理中报告的错误。
///
/// 处理策略由协议层自身决定，编排器只负责转发。
#[derive(Debug, Error)]
pub enum LayerError {
    /// 链路尽头的传输端点发送失败。
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 终端文本写入输出槽失败。
    #[error("terminal output failed: {0}")]
    Output(#[from] io::Error),
}

/// 编排器对外暴露的错误域。
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    /// 输出缓冲安装或拆除失败。
    #[error("terminal output setup failed: {0}")]
    Output(#[source] io::Error),

    /// 编排器已进入 `Closed` 终态。
    #[error("stream relay is closed")]
    Closed,
}
