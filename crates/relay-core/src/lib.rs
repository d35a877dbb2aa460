#![deny(unsafe_code)]
#![doc = "relay-core: 带外调试帧中继的协议层链、输出缓冲与事件循环编排核心。"]
#![doc = ""]
#![doc = "== 结构概览 =="]
#![doc = "1. `stack` / `registry`：把 `\"zmq=*:19026,ascii,term\"` 这样的描述串解析并构造成协议层链；"]
#![doc = "2. `chain` / `layer` / `transport`：双向协议层链，解码自传输侧向内，编码自应用侧向外；"]
#![doc = "3. `output`：无界队列 + 单一写线程的终端输出缓冲，以及可恢复路由的输出槽；"]
#![doc = "4. `relay`：单线程事件循环编排器，负责空闲超时、排空与重建。"]

pub mod chain;
pub mod config;
pub mod error;
pub mod layer;
pub mod output;
pub mod registry;
pub mod relay;
pub mod stack;
pub mod time;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chain::Chain;
pub use config::{DEFAULT_PORT, DEFAULT_STACK, DEFAULT_TRANSPORT, RelayConfig};
pub use error::{ConfigError, LayerError, RelayError, Result, TransportError};
pub use layer::{Inbound, Layer, Outbound, TerminalOutput};
pub use output::{OutputBuffer, OutputSlot, SharedWriter, TerminalSink, shared_writer};
pub use registry::{BuildContext, LayerFactory, StackRegistry, TransportFactory};
pub use relay::{RelayState, StreamRelay, StreamRelayBuilder};
pub use stack::{BindAddress, Descriptor, StackSpec};
pub use time::{Clock, MockClock, SharedClock, SystemClock};
pub use transport::{PollableStream, Readiness, StreamToken, Transport, TryRecv};
