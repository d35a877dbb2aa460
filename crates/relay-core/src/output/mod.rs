//! 终端文本输出路径。
//!
//! - [`OutputBuffer`]：无界队列 + 单一后台写线程，保证解码热路径永不阻塞在输出上；
//! - [`OutputSlot`]：显式传递的输出槽，负责缓冲的幂等安装与拆除后的路由恢复；
//! - [`TerminalSink`]：注入到终端类协议层的写函数句柄。

mod buffer;
mod slot;

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

pub use buffer::{OutputBuffer, SharedWriter, shared_writer};
pub use slot::OutputSlot;

type WriteFn = dyn Fn(&[u8]) -> io::Result<()> + Send + Sync;

/// 终端文本的写函数句柄。
///
/// 协议层只看到“写入一段被判定为普通终端文本的原始字节”这一能力，
/// 不关心其背后是输出槽、测试捕获器还是别的目的地。
#[derive(Clone)]
pub struct TerminalSink {
    write: Arc<WriteFn>,
}

impl TerminalSink {
    /// 以任意写函数构造句柄。
    pub fn new<F>(write: F) -> Self
    where
        F: Fn(&[u8]) -> io::Result<()> + Send + Sync + 'static,
    {
        Self {
            write: Arc::new(write),
        }
    }

    /// 写向输出槽的句柄；文本按 UTF-8 解码，非法序列替换为 `U+FFFD`。
    ///
    /// 末尾不完整的多字节序列暂存到下一次写入，被两个传输帧拆开的字符因此能完整还原。
    pub fn for_slot(slot: OutputSlot) -> Self {
        let carry = Mutex::new(Vec::new());
        Self::new(move |data| {
            let text = decode_utf8(&mut carry.lock(), data);
            if text.is_empty() {
                return Ok(());
            }
            slot.write(text.as_bytes())
        })
    }

    /// 丢弃所有文本的句柄，协议层在未注入输出时使用。
    pub fn discard() -> Self {
        Self::new(|_| Ok(()))
    }

    /// 写入一段终端文本。
    pub fn write(&self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        (self.write)(data)
    }
}

/// 把 `carry` 与 `data` 拼接后按 UTF-8 解码；末尾不完整的序列留在 `carry` 中。
fn decode_utf8(carry: &mut Vec<u8>, data: &[u8]) -> String {
    carry.extend_from_slice(data);
    let mut text = String::with_capacity(carry.len());
    let mut rest = &carry[..];
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match err.error_len() {
                    Some(invalid) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[invalid..];
                    }
                    None => break,
                }
            }
        }
    }
    let held = rest.to_vec();
    *carry = held;
    text
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for TerminalSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TerminalSink")
    }
}
