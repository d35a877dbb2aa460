//! 流中继编排器。
//!
//! # 教案式说明
//! - **意图 (Why)**：把“协议层链 + 非阻塞传输 + 异步输出”三者编排成单线程事件循环：
//!   解码热路径永不阻塞在输出上，停滞的对端由空闲超时强制收尾，终端文本在拆除时不丢失；
//! - **逻辑 (How)**：`poll` 是唯一允许阻塞的操作，等待时长由空闲超时推导；`pump` 排空传输端点并逐帧解码；
//!   终端文本经 [`OutputSlot`] 交给后台写线程；
//! - **契约 (What)**：状态机 `Ready →(reset)→ Ready →(close)→ Closed`；`Closed` 为终态，
//!   之后除再次 `close`（空操作）外的调用都返回 [`RelayError::Closed`]。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::chain::{self, Chain};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::output::{OutputSlot, TerminalSink};
use crate::registry::{BuildContext, StackRegistry};
use crate::stack::StackSpec;
use crate::time::{SharedClock, SystemClock};
use crate::transport::{PollableStream, Readiness, StreamToken, TryRecv};

/// 编排器生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    Ready,
    Closed,
}

/// [`StreamRelay`] 的构建器。
pub struct StreamRelayBuilder {
    config: RelayConfig,
    registry: StackRegistry,
    output: Option<OutputSlot>,
    clock: SharedClock,
}

impl StreamRelayBuilder {
    fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: StackRegistry::new(),
            output: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// 用于解析描述串的注册表。
    pub fn registry(mut self, registry: StackRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 终端文本的输出槽，缺省为标准输出。
    pub fn output(mut self, output: OutputSlot) -> Self {
        self.output = Some(output);
        self
    }

    /// 编排器与传输端点共用的时钟。
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// 校验配置、安装输出缓冲并完成首次 `reset`。
    pub fn build(self) -> Result<StreamRelay> {
        let spec = self.config.stack_spec()?;
        let idle_timeout = self.config.idle_timeout()?;
        let poll_interval = self.config.poll_interval()?;
        let output = self.output.unwrap_or_else(OutputSlot::stdout);
        output.install_buffer().map_err(RelayError::Output)?;

        let mut relay = StreamRelay {
            config: self.config,
            spec,
            idle_timeout,
            poll_interval,
            registry: self.registry,
            ctx: BuildContext::new(self.clock),
            output,
            chain: None,
            state: RelayState::Ready,
        };
        relay.reset()?;
        tracing::info!(
            target: "relay::stream",
            stack = %relay.spec,
            idle_timeout = ?relay.idle_timeout,
            "stream relay ready"
        );
        Ok(relay)
    }
}

/// 带外调试帧中继的编排器。
pub struct StreamRelay {
    config: RelayConfig,
    spec: StackSpec,
    idle_timeout: Duration,
    poll_interval: Duration,
    registry: StackRegistry,
    ctx: BuildContext,
    output: OutputSlot,
    chain: Option<Chain>,
    state: RelayState,
}

impl StreamRelay {
    /// 以配置开始构建编排器。
    pub fn builder(config: RelayConfig) -> StreamRelayBuilder {
        StreamRelayBuilder::new(config)
    }

    /// 按存储的描述串重建整条链，并向所有终端类协议层重新注入输出句柄。
    ///
    /// 幂等：每次调用都得到与全新启动等价的干净链；旧链的传输端点随之释放。
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_ready()?;
        let mut chain = self.registry.build(&self.spec, &self.ctx)?;
        let installed = chain.install_output(&TerminalSink::for_slot(self.output.clone()));

        if let Some(mut previous) = self.chain.replace(chain)
            && let Err(err) = previous.close()
        {
            tracing::warn!(target: "relay::stream", error = %err, "failed to release previous transport");
        }
        tracing::debug!(target: "relay::stream", terminals = installed, "stack reset");
        Ok(())
    }

    /// 自应用侧注入出站字节，逐层编码后由传输端点发送。
    pub fn encode(&mut self, data: &[u8]) -> Result<()> {
        self.chain_mut()?.encode(data)?;
        Ok(())
    }

    /// 自传输侧注入入站字节，逐层解码。
    pub fn decode(&mut self, data: &[u8]) -> Result<()> {
        self.chain_mut()?.decode(data)?;
        Ok(())
    }

    /// 自传输侧起向每个阶段发送超时信号。
    pub fn timeout(&mut self) -> Result<()> {
        tracing::debug!(target: "relay::stream", "timeout");
        self.chain_mut()?.timeout()
    }

    /// 传输端点是否存在未完成的交换。
    pub fn is_waiting(&self) -> Result<bool> {
        Ok(self.chain()?.transport().is_waiting())
    }

    /// 事件循环原语：按空闲超时策略等待传输端点就绪。
    ///
    /// - 无未完成交换：至多等待 `timeout`（缺省为配置的轮询间隔）；
    /// - 有未完成交换：`remaining = 最近活动 + 空闲超时 − 当前时间`；`remaining` 耗尽时立即触发
    ///   [`timeout`](Self::timeout) 并照常轮询，否则至多等待 `min(timeout, remaining)`。
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Readiness> {
        tracing::trace!(target: "relay::stream", "poll");
        let mut wait = timeout.unwrap_or(self.poll_interval);

        if self.is_waiting()? {
            if timeout.is_none() {
                wait = self.idle_timeout;
            }
            // 截止时间溢出时视为永不超时，只按 `wait` 等待。
            let last_activity = self.chain()?.transport().last_activity();
            if let Some(deadline) = last_activity.checked_add(self.idle_timeout) {
                match deadline.checked_duration_since(self.ctx.clock().now()) {
                    Some(remaining) if !remaining.is_zero() => wait = wait.min(remaining),
                    _ => {
                        tracing::debug!(target: "relay::stream", "idle timeout expired");
                        self.timeout()?;
                    }
                }
            }
        }

        Ok(self.chain_mut()?.transport_mut().poll(wait)?)
    }

    /// 排空 `source`：反复非阻塞接收并交给 `handler`，直到 `WouldBlock`；返回接收的帧数。
    pub fn recv_all<R, F>(source: &mut R, handler: F) -> Result<usize>
    where
        R: TryRecv + ?Sized,
        F: FnMut(Bytes) -> Result<()>,
    {
        chain::drain(source, handler)
    }

    /// 排空传输端点并逐帧解码。
    pub fn pump(&mut self) -> Result<usize> {
        self.chain_mut()?.pump()
    }

    /// `poll` 之后若套接字就绪则 `pump`。
    pub fn step(&mut self, timeout: Option<Duration>) -> Result<Readiness> {
        let readiness = self.poll(timeout)?;
        if readiness.socket_ready() {
            self.pump()?;
        }
        Ok(readiness)
    }

    /// 取走已抵达应用侧末端的带外帧。
    pub fn take_frames(&mut self) -> Result<Vec<Bytes>> {
        Ok(self.chain_mut()?.take_delivered())
    }

    /// 把外部字节流登记到传输端点参与多路复用。
    pub fn register_stream(
        &mut self,
        stream: Arc<dyn PollableStream>,
        enabled: bool,
    ) -> Result<StreamToken> {
        Ok(self
            .chain_mut()?
            .transport_mut()
            .register_stream(stream, enabled)?)
    }

    /// 注销外部字节流。
    pub fn unregister_stream(&mut self, token: StreamToken) -> Result<bool> {
        Ok(self.chain_mut()?.transport_mut().unregister_stream(token))
    }

    /// 释放传输端点并进入终态；不拆除输出缓冲。
    pub fn close(&mut self) -> Result<()> {
        if self.state == RelayState::Closed {
            return Ok(());
        }
        self.state = RelayState::Closed;
        if let Some(mut chain) = self.chain.take() {
            chain.close()?;
        }
        tracing::info!(target: "relay::stream", "stream relay closed");
        Ok(())
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// 当前链的阶段名称，自传输侧到应用侧。
    pub fn stages(&self) -> Result<Vec<&'static str>> {
        Ok(self.chain()?.stages())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn stack(&self) -> &StackSpec {
        &self.spec
    }

    /// 终端文本所用的输出槽。
    pub fn output(&self) -> &OutputSlot {
        &self.output
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            RelayState::Ready => Ok(()),
            RelayState::Closed => Err(RelayError::Closed),
        }
    }

    fn chain(&self) -> Result<&Chain> {
        self.chain.as_ref().ok_or(RelayError::Closed)
    }

    fn chain_mut(&mut self) -> Result<&mut Chain> {
        self.chain.as_mut().ok_or(RelayError::Closed)
    }
}

impl std::fmt::Debug for StreamRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRelay")
            .field("stack", &self.spec.to_string())
            .field("state", &self.state)
            .field("chain", &self.chain)
            .finish()
    }
}
