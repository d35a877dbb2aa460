#![deny(unsafe_code)]
#![doc = "relay-codec-term: 默认协议栈 `ascii,term` 的两个协议层。"]
#![doc = ""]
#![doc = "- [`AsciiEscapeLayer`]：以 `0x7f` 为前导的控制字节转义；"]
#![doc = "- [`TerminalLayer`]：按起止标记把字节流拆成终端文本与带外帧。"]

mod ascii;
mod term;

pub use ascii::{AsciiEscapeLayer, ESCAPE};
pub use term::{DEFAULT_END, DEFAULT_START, TerminalLayer};

use relay_core::StackRegistry;

/// 向注册表登记 `ascii` 与 `term`。
pub fn register(registry: &mut StackRegistry) -> &mut StackRegistry {
    registry
        .register_layer("ascii", AsciiEscapeLayer::from_descriptor)
        .register_layer("term", TerminalLayer::from_descriptor)
}
