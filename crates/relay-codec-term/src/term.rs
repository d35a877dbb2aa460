use bytes::{Bytes, BytesMut};
use relay_core::{
    ConfigError, Descriptor, Inbound, Layer, LayerError, Outbound, TerminalOutput, TerminalSink,
};

/// 默认起始标记：APC（`ESC _`）。
pub const DEFAULT_START: &[u8] = b"\x1b_";

/// 默认结束标记：ST（`ESC \`）。
pub const DEFAULT_END: &[u8] = b"\x1b\\";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Text,
    Frame,
}

/// 终端分帧层：把入站字节流拆成终端文本与带外帧。
///
/// # 设计动机（Why）
/// - 调试帧嵌在普通终端输出中传输，终端用户应只看到文本，远端工具应只看到帧体；
///
/// # 行为概览（How）
/// - 文本状态下查找起始标记：标记之前的字节写入输出句柄，之后进入帧状态；
/// - 帧状态下累积帧体直到遇见结束标记，帧体向内转发，随后回到文本状态；
/// - 标记可能被两次 `decode` 拆开：文本末尾与起始标记前缀重合的部分暂存到下一次调用；
/// - `timeout` 把尚未闭合的半截帧（连同起始标记）或暂存的标记前缀当作终端文本写出。
///
/// # 契约说明（What）
/// - 输出句柄由编排器通过 [`TerminalOutput`] 注入，未注入时文本被丢弃；
/// - `encode` 以起始、结束标记包裹负载后向外转发。
#[derive(Debug)]
pub struct TerminalLayer {
    start: Bytes,
    end: Bytes,
    state: State,
    carry: BytesMut,
    output: TerminalSink,
}

impl TerminalLayer {
    /// 使用 APC 标记的终端层。
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_START, DEFAULT_END)
    }

    /// 自定义起始与结束标记，例如 `\x01` / `\x02`。
    ///
    /// 空标记会退化为默认标记。
    pub fn with_markers(start: &[u8], end: &[u8]) -> Self {
        let pick = |marker: &[u8], fallback: &'static [u8]| {
            if marker.is_empty() {
                Bytes::from_static(fallback)
            } else {
                Bytes::copy_from_slice(marker)
            }
        };
        Self {
            start: pick(start, DEFAULT_START),
            end: pick(end, DEFAULT_END),
            state: State::Text,
            carry: BytesMut::new(),
            output: TerminalSink::discard(),
        }
    }

    /// 注册表使用的构造函数。
    ///
    /// 无子参数时使用 APC 标记；`term=<起始>:<结束>` 以十六进制给出自定义标记，
    /// 例如 `term=01:02` 对应 `\x01` / `\x02`。
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Box<dyn Layer>, ConfigError> {
        let Some(argument) = descriptor.argument() else {
            return Ok(Box::new(Self::new()));
        };
        let invalid = |reason: &str| ConfigError::InvalidArgument {
            descriptor: descriptor.to_string(),
            value: argument.to_owned(),
            reason: reason.to_owned(),
        };
        let (start, end) = argument
            .split_once(':')
            .ok_or_else(|| invalid("expected <start hex>:<end hex>"))?;
        let start = parse_marker(start).map_err(invalid)?;
        let end = parse_marker(end).map_err(invalid)?;
        Ok(Box::new(Self::with_markers(&start, &end)))
    }

    fn emit_text(&self, text: &[u8]) -> Result<(), LayerError> {
        self.output.write(text)?;
        Ok(())
    }
}

impl Default for TerminalLayer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_marker(hex: &str) -> Result<Vec<u8>, &'static str> {
    let hex = hex.trim();
    if hex.is_empty() {
        return Err("marker must not be empty");
    }
    if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err("marker must be hex digits");
    }
    if hex.len() % 2 != 0 {
        return Err("marker must be an even number of hex digits");
    }
    (0..hex.len())
        .step_by(2)
        .map(|at| u8::from_str_radix(&hex[at..at + 2], 16).map_err(|_| "marker must be hex digits"))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// `haystack` 末尾与 `marker` 前缀重合的最长长度（不含完整标记）。
fn partial_suffix(haystack: &[u8], marker: &[u8]) -> usize {
    let longest = marker.len().saturating_sub(1).min(haystack.len());
    (1..=longest)
        .rev()
        .find(|&len| haystack.ends_with(&marker[..len]))
        .unwrap_or(0)
}

impl Layer for TerminalLayer {
    fn name(&self) -> &'static str {
        "term"
    }

    fn decode(&mut self, ctx: &mut Inbound<'_>, data: &[u8]) -> Result<(), LayerError> {
        let mut work = std::mem::take(&mut self.carry);
        work.extend_from_slice(data);

        loop {
            match self.state {
                State::Text => match find(&work, &self.start) {
                    Some(at) => {
                        self.emit_text(&work[..at])?;
                        let _ = work.split_to(at + self.start.len());
                        self.state = State::Frame;
                    }
                    None => {
                        let keep = partial_suffix(&work, &self.start);
                        let text = work.split_to(work.len() - keep);
                        self.emit_text(&text)?;
                        self.carry = work;
                        return Ok(());
                    }
                },
                State::Frame => match find(&work, &self.end) {
                    Some(at) => {
                        let payload = work.split_to(at).freeze();
                        let _ = work.split_to(self.end.len());
                        self.state = State::Text;
                        ctx.forward(&payload)?;
                    }
                    None => {
                        self.carry = work;
                        return Ok(());
                    }
                },
            }
        }
    }

    fn encode(&mut self, ctx: &mut Outbound<'_>, data: &[u8]) -> Result<(), LayerError> {
        let mut framed = BytesMut::with_capacity(self.start.len() + data.len() + self.end.len());
        framed.extend_from_slice(&self.start);
        framed.extend_from_slice(data);
        framed.extend_from_slice(&self.end);
        ctx.forward(&framed)
    }

    fn timeout(&mut self, _ctx: &mut Inbound<'_>) -> Result<(), LayerError> {
        let pending = std::mem::take(&mut self.carry);
        match self.state {
            State::Frame => {
                tracing::debug!(
                    target: "relay::codec",
                    len = pending.len(),
                    "flushing unterminated frame as terminal text"
                );
                self.state = State::Text;
                self.emit_text(&self.start)?;
                self.emit_text(&pending)
            }
            State::Text => self.emit_text(&pending),
        }
    }

    fn terminal_output(&mut self) -> Option<&mut dyn TerminalOutput> {
        Some(self)
    }
}

impl TerminalOutput for TerminalLayer {
    fn set_output(&mut self, sink: TerminalSink) {
        self.output = sink;
    }
}
