use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::error::{LayerError, RelayError, TransportError};
use crate::layer::{Inbound, Layer, Outbound};
use crate::output::TerminalSink;
use crate::transport::{Transport, TryRecv};

/// 有序、非空的协议层链：下标 0 为传输端点，末尾为应用侧。
///
/// # 契约说明（What）
/// - 链独占所有层与传输端点，层之间只以借出的邻居切片相互引用；
/// - `decode` 自传输侧进入、逐层向内；`encode` 自应用侧进入、逐层向外，最终由传输端点发送；
/// - 越过应用侧末端的解码结果进入收件箱，由 [`Chain::take_delivered`] 取走；
/// - 链只会被整体替换，不做局部修改。
pub struct Chain {
    transport: Box<dyn Transport>,
    layers: Vec<Box<dyn Layer>>,
    inbox: VecDeque<Bytes>,
}

impl Chain {
    /// 以传输端点与按“传输侧 → 应用侧”排列的协议层构造链。
    pub fn new(transport: Box<dyn Transport>, layers: Vec<Box<dyn Layer>>) -> Self {
        Self {
            transport,
            layers,
            inbox: VecDeque::new(),
        }
    }

    /// 阶段数（含传输端点），恒不小于 1。
    pub fn len(&self) -> usize {
        self.layers.len() + 1
    }

    /// 链恒非空，保留该方法以配合 `len`。
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 各阶段名称，自传输侧到应用侧。
    pub fn stages(&self) -> Vec<&'static str> {
        std::iter::once(self.transport.name())
            .chain(self.layers.iter().map(|layer| layer.name()))
            .collect()
    }

    pub fn transport(&self) -> &dyn Transport {
        &*self.transport
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        &mut *self.transport
    }

    /// 把输出句柄注入所有产出终端文本的层，返回注入数量。
    pub fn install_output(&mut self, sink: &TerminalSink) -> usize {
        let mut installed = 0;
        for layer in &mut self.layers {
            if let Some(terminal) = layer.terminal_output() {
                terminal.set_output(sink.clone());
                installed += 1;
            }
        }
        installed
    }

    /// 自传输侧注入入站字节。
    pub fn decode(&mut self, data: &[u8]) -> Result<(), LayerError> {
        tracing::debug!(target: "relay::stream", payload = %data.escape_ascii(), "decode");
        Inbound::new(self.layers.as_mut_slice(), &mut self.inbox).forward(data)
    }

    /// 自应用侧注入出站字节。
    pub fn encode(&mut self, data: &[u8]) -> Result<(), LayerError> {
        tracing::debug!(target: "relay::stream", payload = %data.escape_ascii(), "encode");
        Outbound::new(self.layers.as_mut_slice(), &mut *self.transport).forward(data)
    }

    /// 自传输侧起逐个阶段发送超时信号。
    pub fn timeout(&mut self) -> Result<(), RelayError> {
        self.transport.timeout()?;
        for index in 0..self.layers.len() {
            let (head, inner) = self.layers.split_at_mut(index + 1);
            let mut ctx = Inbound::new(inner, &mut self.inbox);
            head[index].timeout(&mut ctx)?;
        }
        Ok(())
    }

    /// 排空传输端点，逐帧解码；返回收到的帧数。
    pub fn pump(&mut self) -> Result<usize, RelayError> {
        let Self {
            transport,
            layers,
            inbox,
        } = self;
        drain(&mut **transport, |frame| {
            tracing::debug!(target: "relay::stream", payload = %frame.escape_ascii(), "decode");
            Inbound::new(layers.as_mut_slice(), &mut *inbox)
                .forward(&frame)
                .map_err(RelayError::from)
        })
    }

    /// 取走已抵达应用侧末端的帧。
    pub fn take_delivered(&mut self) -> Vec<Bytes> {
        self.inbox.drain(..).collect()
    }

    /// 关闭传输端点。
    pub fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stages())
            .field("pending", &self.inbox.len())
            .finish()
    }
}

/// 反复非阻塞接收并交给 `handler`，直到端点报告 `WouldBlock`。
///
/// 除 `WouldBlock` 外的传输错误与 `handler` 的错误都会原样传播。
pub fn drain<R, F>(source: &mut R, mut handler: F) -> Result<usize, RelayError>
where
    R: TryRecv + ?Sized,
    F: FnMut(Bytes) -> Result<(), RelayError>,
{
    let mut received = 0;
    loop {
        match source.try_recv() {
            Ok(frame) => {
                received += 1;
                handler(frame)?;
            }
            Err(err) if err.is_would_block() => return Ok(received),
            Err(err) => return Err(err.into()),
        }
    }
}
