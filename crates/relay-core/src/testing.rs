//! 测试替身：脚本化传输端点、记录型协议层与输出捕获器。
//!
//! # 教案式说明
//! - **意图 (Why)**：编排器的契约（排空顺序、空闲超时、重建语义）与具体消息队列无关，
//!   测试需要一个完全由脚本驱动、可观察内部交互的传输端点；
//! - **逻辑 (How)**：[`ScriptHandle`] 与其构造出的每个 [`ScriptedTransport`] 共享同一份脚本状态，
//!   测试在一侧压入帧、注入错误，在另一侧读取发送记录与事件日志；
//! - **契约 (What)**：脚本化端点模仿请求-应答语义：收到一帧即进入等待，`send` 或 `timeout` 结束等待；
//!   `poll` 在无事可报时推进绑定的 [`MockClock`]，以模拟真实的阻塞等待。

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{ConfigError, LayerError, TransportError};
use crate::layer::{Inbound, Layer, Outbound};
use crate::output::OutputSlot;
use crate::registry::BuildContext;
use crate::stack::Descriptor;
use crate::time::{MockClock, SharedClock};
use crate::transport::{PollableStream, Readiness, StreamToken, Transport, TryRecv};

/// 传输端点与协议层共用的事件日志，记录跨阶段的调用顺序。
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// 取出并清空已记录的事件。
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

struct Script {
    inbound: VecDeque<Bytes>,
    failures: VecDeque<TransportError>,
    waiting: bool,
    last_activity: Option<Instant>,
    sent: Vec<Bytes>,
    polls: Vec<Duration>,
    descriptors: Vec<String>,
    streams: BTreeMap<StreamToken, (Arc<dyn PollableStream>, bool)>,
    next_token: u64,
    timeouts: usize,
    closes: usize,
}

/// 测试侧的脚本句柄。
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
    log: EventLog,
    clock: Option<MockClock>,
}

impl ScriptHandle {
    /// 不绑定虚拟时钟的脚本；`poll` 不推进时间。
    pub fn new(log: EventLog) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                inbound: VecDeque::new(),
                failures: VecDeque::new(),
                waiting: false,
                last_activity: None,
                sent: Vec::new(),
                polls: Vec::new(),
                descriptors: Vec::new(),
                streams: BTreeMap::new(),
                next_token: 1,
                timeouts: 0,
                closes: 0,
            })),
            log,
            clock: None,
        }
    }

    /// 绑定虚拟时钟：空闲的 `poll` 会把时钟推进所请求的等待时长。
    pub fn with_clock(mut self, clock: MockClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 压入一帧待接收的数据。
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        self.script.lock().inbound.push_back(frame.into());
    }

    /// 下一次 `try_recv` 返回给定错误。
    pub fn fail_next(&self, err: TransportError) {
        self.script.lock().failures.push_back(err);
    }

    pub fn set_waiting(&self, waiting: bool) {
        self.script.lock().waiting = waiting;
    }

    pub fn is_waiting(&self) -> bool {
        self.script.lock().waiting
    }

    /// 已发送的帧。
    pub fn sent(&self) -> Vec<Bytes> {
        self.script.lock().sent.clone()
    }

    /// 每次 `poll` 请求的等待时长。
    pub fn polls(&self) -> Vec<Duration> {
        self.script.lock().polls.clone()
    }

    /// 传输端点收到的超时信号次数。
    pub fn timeouts(&self) -> usize {
        self.script.lock().timeouts
    }

    /// 传输端点被关闭的次数。
    pub fn closes(&self) -> usize {
        self.script.lock().closes
    }

    /// 每次构造端点时的描述符。
    pub fn descriptors(&self) -> Vec<String> {
        self.script.lock().descriptors.clone()
    }

    pub fn registered_streams(&self) -> usize {
        self.script.lock().streams.len()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// 构造共享本脚本的端点。
    pub fn transport(&self, clock: SharedClock) -> ScriptedTransport {
        let mut script = self.script.lock();
        script.last_activity = Some(clock.now());
        script.waiting = false;
        script.streams.clear();
        drop(script);
        ScriptedTransport {
            handle: self.clone(),
            clock,
            closed: false,
        }
    }

    /// 注册表可用的传输端点构造函数。
    pub fn factory(
        &self,
    ) -> impl Fn(&Descriptor, &BuildContext) -> Result<Box<dyn Transport>, ConfigError>
    + Send
    + Sync
    + 'static {
        let handle = self.clone();
        move |descriptor, ctx| {
            handle
                .script
                .lock()
                .descriptors
                .push(descriptor.to_string());
            Ok(Box::new(handle.transport(Arc::clone(ctx.clock()))) as Box<dyn Transport>)
        }
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = self.script.lock();
        f.debug_struct("ScriptHandle")
            .field("pending", &script.inbound.len())
            .field("waiting", &script.waiting)
            .field("sent", &script.sent.len())
            .finish()
    }
}

/// 完全由 [`ScriptHandle`] 驱动的传输端点。
pub struct ScriptedTransport {
    handle: ScriptHandle,
    clock: SharedClock,
    closed: bool,
}

impl TryRecv for ScriptedTransport {
    fn try_recv(&mut self) -> Result<Bytes, TransportError> {
        let mut script = self.handle.script.lock();
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        match script.inbound.pop_front() {
            Some(frame) => {
                script.waiting = true;
                script.last_activity = Some(self.clock.now());
                drop(script);
                self.handle.log.record("scripted.recv");
                Ok(frame)
            }
            None => Err(TransportError::WouldBlock),
        }
    }
}

impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn poll(&mut self, timeout: Duration) -> Result<Readiness, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut script = self.handle.script.lock();
        script.polls.push(timeout);
        let mut readiness = Readiness::idle()
            .with_socket(!script.inbound.is_empty() || !script.failures.is_empty());
        for (token, (stream, enabled)) in &script.streams {
            if *enabled && stream.is_readable() {
                readiness = readiness.with_stream(*token);
            }
        }
        drop(script);
        if readiness.is_empty()
            && let Some(clock) = &self.handle.clock
        {
            clock.advance(timeout);
        }
        Ok(readiness)
    }

    fn is_waiting(&self) -> bool {
        self.handle.is_waiting()
    }

    fn last_activity(&self) -> Instant {
        self.handle
            .script
            .lock()
            .last_activity
            .unwrap_or_else(|| self.clock.now())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut script = self.handle.script.lock();
        script.sent.push(Bytes::copy_from_slice(data));
        script.waiting = false;
        drop(script);
        self.handle.log.record("scripted.send");
        Ok(())
    }

    fn timeout(&mut self) -> Result<(), TransportError> {
        let mut script = self.handle.script.lock();
        script.timeouts += 1;
        if script.waiting {
            script.sent.push(Bytes::new());
            script.waiting = false;
        }
        drop(script);
        self.handle.log.record("scripted.timeout");
        Ok(())
    }

    fn register_stream(
        &mut self,
        stream: Arc<dyn PollableStream>,
        enabled: bool,
    ) -> Result<StreamToken, TransportError> {
        let mut script = self.handle.script.lock();
        let token = StreamToken::new(script.next_token);
        script.next_token += 1;
        script.streams.insert(token, (stream, enabled));
        Ok(token)
    }

    fn unregister_stream(&mut self, token: StreamToken) -> bool {
        self.handle.script.lock().streams.remove(&token).is_some()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.handle.script.lock().closes += 1;
            self.handle.log.record("scripted.close");
        }
        Ok(())
    }
}

/// 原样透传并记录调用的协议层。
pub struct RecordingLayer {
    name: &'static str,
    log: EventLog,
}

impl RecordingLayer {
    pub fn new(name: &'static str, log: EventLog) -> Self {
        Self { name, log }
    }

    /// 注册表可用的协议层构造函数。
    pub fn factory(
        name: &'static str,
        log: EventLog,
    ) -> impl Fn(&Descriptor) -> Result<Box<dyn Layer>, ConfigError> + Send + Sync + 'static {
        move |_| Ok(Box::new(RecordingLayer::new(name, log.clone())) as Box<dyn Layer>)
    }
}

impl Layer for RecordingLayer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode(&mut self, ctx: &mut Inbound<'_>, data: &[u8]) -> Result<(), LayerError> {
        self.log.record(format!("{}.decode", self.name));
        ctx.forward(data)
    }

    fn encode(&mut self, ctx: &mut Outbound<'_>, data: &[u8]) -> Result<(), LayerError> {
        self.log.record(format!("{}.encode", self.name));
        ctx.forward(data)
    }

    fn timeout(&mut self, _ctx: &mut Inbound<'_>) -> Result<(), LayerError> {
        self.log.record(format!("{}.timeout", self.name));
        Ok(())
    }
}

/// 可切换可读状态的外部字节流。
#[derive(Debug, Default)]
pub struct FlagStream {
    readable: AtomicBool,
}

impl FlagStream {
    pub fn set_readable(&self, readable: bool) {
        self.readable.store(readable, Ordering::SeqCst);
    }
}

impl PollableStream for FlagStream {
    fn is_readable(&self) -> bool {
        self.readable.load(Ordering::SeqCst)
    }
}

/// 写入共享内存缓冲区的捕获器，用于断言终端输出。
#[derive(Clone, Debug, Default)]
pub struct CapturedOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以本捕获器为写入端的输出槽。
    pub fn slot(&self) -> OutputSlot {
        OutputSlot::new(self.clone())
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// 按 UTF-8 有损解码后的文本。
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
