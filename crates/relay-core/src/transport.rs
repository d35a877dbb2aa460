//! 传输端点契约。
//!
//! 传输端点是协议层链的最外层：它从远端消息队列客户端非阻塞地收取帧，
//! 跟踪最近一次活动时间，并为事件循环提供带超时的就绪等待。
//! 具体的套接字语义属于实现方（如 `relay-transport-zmq`），核心只依赖本模块的 trait。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::TransportError;

/// 非阻塞接收能力，[`StreamRelay::recv_all`](crate::relay::StreamRelay::recv_all) 以此排空端点。
pub trait TryRecv {
    /// 尝试接收一帧；暂无数据时返回 [`TransportError::WouldBlock`]。
    fn try_recv(&mut self) -> Result<Bytes, TransportError>;
}

/// 消息队列传输端点。
///
/// # 契约说明（What）
/// - `poll`：至多等待 `timeout`，返回就绪报告；超时无事件时返回空报告而非错误；
/// - `is_waiting`：端点是否有尚未完成的交换（例如已收到请求、等待应答）；
/// - `last_activity`：最近一次成功接收的时间点；
/// - `send`：编码方向的终点，把字节交给远端；
/// - `register_stream`：登记外部字节流参与就绪多路复用，所有权仍归调用方。
pub trait Transport: TryRecv + Send + 'static {
    /// 传输类型名。
    fn name(&self) -> &'static str;

    /// 等待就绪，至多阻塞 `timeout`。
    fn poll(&mut self, timeout: Duration) -> Result<Readiness, TransportError>;

    /// 是否存在尚未完成的交换。
    fn is_waiting(&self) -> bool;

    /// 最近一次成功接收的时间点。
    fn last_activity(&self) -> Instant;

    /// 向远端发送一帧。
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// 空闲超时信号。
    fn timeout(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// 登记外部字节流，返回端点分配的令牌。
    fn register_stream(
        &mut self,
        stream: Arc<dyn PollableStream>,
        enabled: bool,
    ) -> Result<StreamToken, TransportError>;

    /// 注销外部字节流；令牌未知时返回 `false`。
    fn unregister_stream(&mut self, token: StreamToken) -> bool;

    /// 释放端点。重复调用必须是空操作。
    fn close(&mut self) -> Result<(), TransportError>;
}

/// 可参与就绪多路复用的外部字节流。
pub trait PollableStream: Send + Sync {
    /// 当前是否有可读数据，不得阻塞。
    fn is_readable(&self) -> bool;
}

/// 端点为登记的外部字节流分配的令牌。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamToken(u64);

impl StreamToken {
    /// 以原始编号构造令牌，供端点实现分配使用。
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 令牌的原始编号。
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// 一次 `poll` 的就绪报告。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    socket: bool,
    streams: Vec<StreamToken>,
}

impl Readiness {
    /// 空报告：等待期间没有任何事件。
    pub fn idle() -> Self {
        Self::default()
    }

    /// 仅消息队列套接字就绪。
    pub fn socket() -> Self {
        Self {
            socket: true,
            streams: Vec::new(),
        }
    }

    /// 标记套接字就绪。
    pub fn with_socket(mut self, ready: bool) -> Self {
        self.socket = ready;
        self
    }

    /// 追加一个就绪的外部字节流。
    pub fn with_stream(mut self, token: StreamToken) -> Self {
        self.streams.push(token);
        self
    }

    /// 套接字是否就绪。
    pub fn socket_ready(&self) -> bool {
        self.socket
    }

    /// 就绪的外部字节流。
    pub fn ready_streams(&self) -> &[StreamToken] {
        &self.streams
    }

    /// 就绪对象总数。
    pub fn count(&self) -> usize {
        usize::from(self.socket) + self.streams.len()
    }

    /// 是否没有任何就绪对象。
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
