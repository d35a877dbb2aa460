//! 协议层契约与方向上下文。
//!
//! # 设计背景（Why）
//! - 协议层链中每个环节都是双向变换：解码自传输侧向应用侧（入站），编码自应用侧向传输侧（出站）；
//! - 层只“引用”邻居而不拥有邻居：链持有全部层，调用时把剩余的邻居切片借给当前层。
//!
//! # 契约说明（What）
//! - [`Inbound::forward`] 将解码结果交给内侧邻居；没有内侧邻居时，结果进入应用侧收件箱；
//! - [`Outbound::forward`] 将编码结果交给外侧邻居；没有外侧邻居时，结果交给传输端点发送；
//! - `timeout` 在主线程两次 `poll` 之间调用，绝不与编码/解码并发。

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::error::LayerError;
use crate::output::TerminalSink;
use crate::transport::Transport;

/// 协议层能力集合 `{encode, decode, timeout}`。
pub trait Layer: Send + 'static {
    /// 层类型名，用于诊断与 [`Chain::stages`](crate::chain::Chain::stages)。
    fn name(&self) -> &'static str;

    /// 处理入站字节，通过 `ctx` 向内侧转发零个或多个结果。
    fn decode(&mut self, ctx: &mut Inbound<'_>, data: &[u8]) -> Result<(), LayerError>;

    /// 处理出站字节，通过 `ctx` 向外侧转发零个或多个结果。
    fn encode(&mut self, ctx: &mut Outbound<'_>, data: &[u8]) -> Result<(), LayerError>;

    /// 空闲超时信号：用于解决悬而未决的半截帧。
    fn timeout(&mut self, ctx: &mut Inbound<'_>) -> Result<(), LayerError> {
        let _ = ctx;
        Ok(())
    }

    /// 产出终端文本的层返回自身的输出注入口。
    fn terminal_output(&mut self) -> Option<&mut dyn TerminalOutput> {
        None
    }
}

/// 可注入输出句柄的终端类协议层。
pub trait TerminalOutput {
    /// 替换终端文本的写入目的地。
    fn set_output(&mut self, sink: TerminalSink);
}

/// 入站（解码方向）上下文：持有内侧邻居切片与应用侧收件箱。
pub struct Inbound<'a> {
    inner: &'a mut [Box<dyn Layer>],
    delivered: &'a mut VecDeque<Bytes>,
}

impl<'a> Inbound<'a> {
    pub(crate) fn new(
        inner: &'a mut [Box<dyn Layer>],
        delivered: &'a mut VecDeque<Bytes>,
    ) -> Self {
        Self { inner, delivered }
    }

    /// 将解码结果交给内侧邻居。
    pub fn forward(&mut self, data: &[u8]) -> Result<(), LayerError> {
        match self.inner.split_first_mut() {
            Some((next, rest)) => {
                let mut ctx = Inbound::new(rest, &mut *self.delivered);
                next.decode(&mut ctx, data)
            }
            None => {
                self.delivered.push_back(Bytes::copy_from_slice(data));
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Inbound<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("remaining", &self.inner.len())
            .finish()
    }
}

/// 出站（编码方向）上下文：持有外侧邻居切片与链尽头的传输端点。
pub struct Outbound<'a> {
    outer: &'a mut [Box<dyn Layer>],
    egress: &'a mut dyn Transport,
}

impl<'a> Outbound<'a> {
    pub(crate) fn new(outer: &'a mut [Box<dyn Layer>], egress: &'a mut dyn Transport) -> Self {
        Self { outer, egress }
    }

    /// 将编码结果交给外侧邻居；越过最外层后由传输端点发送。
    pub fn forward(&mut self, data: &[u8]) -> Result<(), LayerError> {
        match self.outer.split_last_mut() {
            Some((previous, rest)) => {
                let mut ctx = Outbound::new(rest, &mut *self.egress);
                previous.encode(&mut ctx, data)
            }
            None => self.egress.send(data).map_err(LayerError::from),
        }
    }
}

impl fmt::Debug for Outbound<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("remaining", &self.outer.len())
            .field("egress", &self.egress.name())
            .finish()
    }
}
