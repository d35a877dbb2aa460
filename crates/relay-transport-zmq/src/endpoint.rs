use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use relay_core::{
    BindAddress, BuildContext, ConfigError, Descriptor, PollableStream, Readiness, SharedClock,
    StreamToken, Transport, TransportError, TryRecv,
};
use tokio::runtime::Runtime;
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::error::{self, ZmqTransportError};

/// 登记了外部字节流时，`poll` 以此粒度轮流检查套接字与字节流。
const STREAM_POLL_SLICE: Duration = Duration::from_millis(10);

struct Registration {
    stream: Arc<dyn PollableStream>,
    enabled: bool,
}

struct Bound {
    runtime: Runtime,
    socket: RepSocket,
    local: String,
}

/// ZeroMQ REP 端点。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 远端调试工具以请求-应答方式取帧：每个请求对应中继的一次应答，空闲超时时以空应答释放对端；
/// - 编排器是单线程同步事件循环，端点因此把异步套接字封装在私有的单线程运行时里。
///
/// ## 逻辑 (How)
/// - 首次使用时才创建运行时并绑定 `tcp://<listen>:<port>`（`*` 表示所有接口），构造本身不启动任何后台活动；
/// - 套接字的后台任务只在 `poll`、`try_recv`、`send` 驱动运行时期间推进；
/// - `poll` 收到的请求先进入收件箱，随后由 `try_recv` 逐帧取出；
///   未应答期间不再接收下一个请求，与 REP 套接字的收发交替约束一致。
///
/// ## 契约 (What)
/// - 收到请求即进入等待并刷新最近活动时间；`send` 发出应答并结束等待；
/// - 没有未完成请求时的 `send` 被丢弃，REP 套接字不允许主动发送；
/// - `close` 幂等，关闭后的收发返回 [`TransportError::Closed`]。
pub struct ZmqEndpoint {
    address: BindAddress,
    clock: SharedClock,
    bound: Option<Bound>,
    closed: bool,
    inbox: VecDeque<Bytes>,
    waiting: bool,
    last_activity: Instant,
    streams: BTreeMap<StreamToken, Registration>,
    next_token: u64,
}

impl ZmqEndpoint {
    pub fn new(address: BindAddress, clock: SharedClock) -> Self {
        let last_activity = clock.now();
        Self {
            address,
            clock,
            bound: None,
            closed: false,
            inbox: VecDeque::new(),
            waiting: false,
            last_activity,
            streams: BTreeMap::new(),
            next_token: 1,
        }
    }

    /// 注册表使用的构造函数：解析 `listen:port` 子参数。
    pub fn from_descriptor(
        descriptor: &Descriptor,
        ctx: &BuildContext,
    ) -> Result<Box<dyn Transport>, ConfigError> {
        let address = BindAddress::from_descriptor(descriptor)?;
        Ok(Box::new(Self::new(address, Arc::clone(ctx.clock()))))
    }

    /// 配置中的绑定目标，例如 `tcp://0.0.0.0:19026`。
    pub fn endpoint(&self) -> String {
        let host = match self.address.listen() {
            "*" => "0.0.0.0",
            other => other,
        };
        format!("tcp://{host}:{}", self.address.port())
    }

    /// 立即绑定并返回实际监听的端点；已绑定时直接返回。
    pub fn bind(&mut self) -> Result<&str, ZmqTransportError> {
        Ok(self.socket()?.local.as_str())
    }

    /// 实际监听的端点；尚未绑定时为 `None`。
    pub fn local_endpoint(&self) -> Option<&str> {
        self.bound.as_ref().map(|bound| bound.local.as_str())
    }

    fn open(&self) -> Result<Bound, ZmqTransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ZmqTransportError::Runtime)?;
        let endpoint = self.endpoint();
        let (socket, local) = runtime
            .block_on(async {
                let mut socket = RepSocket::new();
                let local = socket.bind(&endpoint).await?;
                Ok::<_, zeromq::ZmqError>((socket, local.to_string()))
            })
            .map_err(|source| ZmqTransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        tracing::info!(
            target: "relay::zmq",
            %endpoint,
            %local,
            operation = error::BIND.name,
            "listening"
        );
        Ok(Bound {
            runtime,
            socket,
            local,
        })
    }

    fn socket(&mut self) -> Result<&mut Bound, ZmqTransportError> {
        if self.closed {
            return Err(ZmqTransportError::Closed);
        }
        if self.bound.is_none() {
            self.bound = Some(self.open()?);
        }
        self.bound.as_mut().ok_or(ZmqTransportError::Closed)
    }

    /// 至多等待 `wait` 接收一个请求放入收件箱；返回是否收到。
    ///
    /// 未应答的请求存在时不再接收，只驱动运行时等待 `wait`。
    fn fetch(&mut self, wait: Duration) -> Result<bool, ZmqTransportError> {
        if self.waiting {
            let Bound { runtime, .. } = self.socket()?;
            runtime.block_on(async { tokio::time::sleep(wait).await });
            return Ok(false);
        }
        let Bound {
            runtime, socket, ..
        } = self.socket()?;
        let outcome =
            runtime.block_on(async { tokio::time::timeout(wait, socket.recv()).await });
        match outcome {
            Ok(Ok(message)) => {
                let frame = into_frame(message);
                tracing::trace!(target: "relay::zmq", len = frame.len(), "request received");
                self.inbox.push_back(frame);
                self.waiting = true;
                self.last_activity = self.clock.now();
                Ok(true)
            }
            Ok(Err(source)) => Err(ZmqTransportError::socket(error::RECV, source)),
            Err(_elapsed) => Ok(false),
        }
    }

    fn reply(&mut self, data: Bytes) -> Result<(), ZmqTransportError> {
        let Bound {
            runtime, socket, ..
        } = self.socket()?;
        runtime
            .block_on(socket.send(ZmqMessage::from(data)))
            .map_err(|source| ZmqTransportError::socket(error::SEND, source))?;
        self.waiting = false;
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        let mut readiness = Readiness::idle().with_socket(!self.inbox.is_empty());
        for (token, registration) in &self.streams {
            if registration.enabled && registration.stream.is_readable() {
                readiness = readiness.with_stream(*token);
            }
        }
        readiness
    }

    fn has_enabled_streams(&self) -> bool {
        self.streams.values().any(|registration| registration.enabled)
    }
}

fn into_frame(message: ZmqMessage) -> Bytes {
    let mut parts = message.into_vec();
    if parts.len() == 1 {
        parts.pop().unwrap_or_default()
    } else {
        Bytes::from(parts.concat())
    }
}

impl TryRecv for ZmqEndpoint {
    fn try_recv(&mut self) -> Result<Bytes, TransportError> {
        if let Some(frame) = self.inbox.pop_front() {
            return Ok(frame);
        }
        if self.fetch(Duration::ZERO)? {
            return self.inbox.pop_front().ok_or(TransportError::WouldBlock);
        }
        Err(TransportError::WouldBlock)
    }
}

impl Transport for ZmqEndpoint {
    fn name(&self) -> &'static str {
        "zmq"
    }

    fn poll(&mut self, timeout: Duration) -> Result<Readiness, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        // 超出 `Instant` 表示范围的等待视为没有截止时间。
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            let slice = if self.has_enabled_streams() {
                remaining.min(STREAM_POLL_SLICE)
            } else {
                remaining
            };
            if self.inbox.is_empty() {
                self.fetch(slice)?;
            }

            let readiness = self.readiness();
            if !readiness.is_empty() || slice >= remaining {
                return Ok(readiness);
            }
        }
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.waiting {
            tracing::debug!(
                target: "relay::zmq",
                len = data.len(),
                "no pending request, reply dropped"
            );
            return Ok(());
        }
        self.reply(Bytes::copy_from_slice(data))?;
        Ok(())
    }

    fn timeout(&mut self) -> Result<(), TransportError> {
        if self.waiting && !self.closed {
            tracing::debug!(target: "relay::zmq", "idle request released with an empty reply");
            self.reply(Bytes::new())?;
        }
        Ok(())
    }

    fn register_stream(
        &mut self,
        stream: Arc<dyn PollableStream>,
        enabled: bool,
    ) -> Result<StreamToken, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let token = StreamToken::new(self.next_token);
        self.next_token += 1;
        self.streams.insert(token, Registration { stream, enabled });
        Ok(token)
    }

    fn unregister_stream(&mut self, token: StreamToken) -> bool {
        self.streams.remove(&token).is_some()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.waiting = false;
        self.inbox.clear();
        self.streams.clear();
        if let Some(Bound {
            runtime,
            socket,
            local,
        }) = self.bound.take()
        {
            for err in runtime.block_on(socket.close()) {
                tracing::warn!(
                    target: "relay::zmq",
                    error = %err,
                    operation = error::CLOSE.name,
                    "socket close reported an error"
                );
            }
            tracing::info!(target: "relay::zmq", %local, "closed");
        }
        Ok(())
    }
}

impl Drop for ZmqEndpoint {
    fn drop(&mut self) {
        let _ = Transport::close(self);
    }
}

impl fmt::Debug for ZmqEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqEndpoint")
            .field("endpoint", &self.endpoint())
            .field("local", &self.local_endpoint())
            .field("waiting", &self.waiting)
            .field("pending", &self.inbox.len())
            .field("streams", &self.streams.len())
            .field("closed", &self.closed)
            .finish()
    }
}
