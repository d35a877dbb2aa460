use std::io;

use relay_core::TransportError;
use thiserror::Error;
use zeromq::ZmqError;

/// 描述一次套接字操作的稳定名称。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub name: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind { name: "zmq bind" };
pub(crate) const RECV: OperationKind = OperationKind { name: "zmq recv" };
pub(crate) const SEND: OperationKind = OperationKind { name: "zmq send" };
pub(crate) const CLOSE: OperationKind = OperationKind { name: "zmq close" };

/// ZeroMQ 端点自身的错误，边界处映射为 [`TransportError`]。
#[derive(Debug, Error)]
pub enum ZmqTransportError {
    /// 私有运行时创建失败。
    #[error("failed to start zmq runtime: {0}")]
    Runtime(#[source] io::Error),

    /// 绑定监听地址失败。
    #[error("failed to bind `{endpoint}`: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: ZmqError,
    },

    /// 收发过程中的套接字错误。
    #[error("{operation} failed: {source}")]
    Socket {
        operation: &'static str,
        #[source]
        source: ZmqError,
    },

    /// 端点已关闭。
    #[error("zmq endpoint is closed")]
    Closed,
}

impl ZmqTransportError {
    pub(crate) fn socket(kind: OperationKind, source: ZmqError) -> Self {
        Self::Socket {
            operation: kind.name,
            source,
        }
    }
}

impl From<ZmqTransportError> for TransportError {
    fn from(err: ZmqTransportError) -> Self {
        let detail = err.to_string();
        match err {
            ZmqTransportError::Runtime(io) => TransportError::Io(io),
            ZmqTransportError::Closed => TransportError::Closed,
            ZmqTransportError::Bind { .. } => TransportError::Backend {
                operation: BIND.name,
                detail,
            },
            ZmqTransportError::Socket { operation, .. } => {
                TransportError::Backend { operation, detail }
            }
        }
    }
}
