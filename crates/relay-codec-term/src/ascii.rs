use bytes::BytesMut;
use relay_core::{ConfigError, Descriptor, Inbound, Layer, LayerError, Outbound};

/// 转义前导字节。
pub const ESCAPE: u8 = 0x7f;

/// ASCII 转义层：让任意字节安全地穿过只允许可打印字符的终端通道。
///
/// # 设计动机（Why）
/// - 带外帧与终端文本共用同一条字节流，帧体中的控制字节若不转义，会被终端或内层的分帧层误判；
///
/// # 行为概览（How）
/// - `encode`：`b < 0x20` 写成 `0x7f, b | 0x40`，`0x7f` 写成 `0x7f, 0x7f`，其余字节原样保留；
/// - `decode`：遇到 `0x7f` 时把下一个字节还原，其余字节（包括未转义的控制字节）原样透传；
/// - 转义对被两次 `decode` 调用拆开时，前导字节跨调用保留；`timeout` 丢弃悬空的前导字节。
///
/// # 契约说明（What）
/// - 每次 `decode`/`encode` 至多向邻居转发一次，空结果不转发；
/// - 无法识别的转义对（`0x7f` 之后既非 `0x40..=0x5f` 也非 `0x7f`）按原字节透传。
#[derive(Debug, Default)]
pub struct AsciiEscapeLayer {
    pending_escape: bool,
    scratch: BytesMut,
}

impl AsciiEscapeLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册表使用的构造函数；`ascii` 不接受子参数。
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Box<dyn Layer>, ConfigError> {
        if let Some(argument) = descriptor.argument() {
            return Err(ConfigError::InvalidArgument {
                descriptor: descriptor.to_string(),
                value: argument.to_owned(),
                reason: "ascii takes no arguments".to_owned(),
            });
        }
        Ok(Box::new(Self::new()))
    }
}

fn unescape(byte: u8) -> u8 {
    match byte {
        ESCAPE => ESCAPE,
        0x40..=0x5f => byte & 0x1f,
        other => other,
    }
}

impl Layer for AsciiEscapeLayer {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn decode(&mut self, ctx: &mut Inbound<'_>, data: &[u8]) -> Result<(), LayerError> {
        self.scratch.clear();
        self.scratch.reserve(data.len());
        for &byte in data {
            if self.pending_escape {
                self.pending_escape = false;
                self.scratch.extend_from_slice(&[unescape(byte)]);
            } else if byte == ESCAPE {
                self.pending_escape = true;
            } else {
                self.scratch.extend_from_slice(&[byte]);
            }
        }
        if self.scratch.is_empty() {
            return Ok(());
        }
        let decoded = self.scratch.split().freeze();
        ctx.forward(&decoded)
    }

    fn encode(&mut self, ctx: &mut Outbound<'_>, data: &[u8]) -> Result<(), LayerError> {
        let mut encoded = BytesMut::with_capacity(data.len() + data.len() / 4);
        for &byte in data {
            match byte {
                ESCAPE => encoded.extend_from_slice(&[ESCAPE, ESCAPE]),
                b if b < 0x20 => encoded.extend_from_slice(&[ESCAPE, b | 0x40]),
                b => encoded.extend_from_slice(&[b]),
            }
        }
        if encoded.is_empty() {
            return Ok(());
        }
        ctx.forward(&encoded)
    }

    fn timeout(&mut self, _ctx: &mut Inbound<'_>) -> Result<(), LayerError> {
        if self.pending_escape {
            tracing::debug!(target: "relay::codec", "dropping dangling escape byte");
            self.pending_escape = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use relay_core::testing::ScriptHandle;
    use relay_core::{Chain, SystemClock};
    use std::sync::Arc;

    fn chain() -> (Chain, ScriptHandle) {
        let script = ScriptHandle::new(Default::default());
        let transport = script.transport(Arc::new(SystemClock));
        (
            Chain::new(Box::new(transport), vec![Box::new(AsciiEscapeLayer::new())]),
            script,
        )
    }

    #[test]
    fn encode_escapes_control_bytes_and_the_escape_itself() {
        let (mut chain, script) = chain();

        chain.encode(b"a\x01\x7fz\n").expect("encode");

        assert_eq!(
            script.sent(),
            [Bytes::from_static(b"a\x7f\x41\x7f\x7fz\x7f\x4a")]
        );
    }

    #[test]
    fn decode_passes_unescaped_control_bytes_through() {
        let (mut chain, _script) = chain();

        chain.decode(b"hello\x01FRAME\x02world").expect("decode");

        assert_eq!(
            chain.take_delivered(),
            [Bytes::from_static(b"hello\x01FRAME\x02world")]
        );
    }

    #[test]
    fn escape_split_across_calls_is_carried_over() {
        let (mut chain, _script) = chain();

        chain.decode(b"ab\x7f").expect("first half");
        chain.decode(b"\x41cd").expect("second half");

        assert_eq!(
            chain.take_delivered(),
            [Bytes::from_static(b"ab"), Bytes::from_static(b"\x01cd")]
        );
    }

    #[test]
    fn timeout_drops_a_dangling_escape() {
        let (mut chain, _script) = chain();

        chain.decode(b"x\x7f").expect("decode");
        chain.timeout().expect("timeout");
        chain.decode(b"\x41").expect("decode");

        assert_eq!(
            chain.take_delivered(),
            [Bytes::from_static(b"x"), Bytes::from_static(b"\x41")]
        );
    }

    proptest! {
        /// 任意字节经编码后，无论在何处被拆成两次解码，都还原为原始字节。
        #[test]
        fn decoding_survives_arbitrary_splits(payload in prop::collection::vec(any::<u8>(), 0..64), cut in any::<prop::sample::Index>()) {
            let (mut chain, script) = chain();
            chain.encode(&payload).expect("encode");
            let wire = script.sent().concat();

            let split = cut.index(wire.len() + 1);
            chain.decode(&wire[..split]).expect("decode head");
            chain.decode(&wire[split..]).expect("decode tail");

            prop_assert_eq!(chain.take_delivered().concat(), payload);
        }
    }
}
