#![deny(unsafe_code)]
//! relay-transport-zmq：默认协议栈最外层的 ZeroMQ REP 传输端点。
//!
//! # 模块概览（Why）
//! - 为 `relay-core` 的 [`Transport`](relay_core::Transport) 契约提供真实的消息队列实现，
//!   使 `zmq=<listen>:<port>,...` 形式的描述串可以直接构建；
//! - 套接字由纯 Rust 的 `zeromq` crate 驱动，运行在端点私有的单线程 Tokio 运行时上。
//!
//! # 契约（What）
//! - 描述串参数为 `listen:port`，`*` 表示所有接口，默认端口见 [`DEFAULT_PORT`]；
//! - 套接字错误以 [`ZmqTransportError`] 表达，并在 trait 边界映射为
//!   [`TransportError`](relay_core::TransportError)。

mod endpoint;
mod error;

pub use endpoint::ZmqEndpoint;
pub use error::ZmqTransportError;
pub use relay_core::DEFAULT_PORT;

use relay_core::StackRegistry;

/// 描述串中的传输名称。
pub const NAME: &str = "zmq";

/// 向注册表登记 `zmq` 传输端点。
pub fn register(registry: &mut StackRegistry) -> &mut StackRegistry {
    registry.register_transport(NAME, ZmqEndpoint::from_descriptor)
}
