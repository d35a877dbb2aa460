//! 编排器集成测试。
//!
//! # 教案级导览
//!
//! - **Why**：`StreamRelay` 的契约横跨协议层链、传输端点与时钟，只有把三者装配在一起才能验证
//!   链的连接顺序、空闲超时与重建语义；
//! - **How**：以 `testing` 模块中的脚本化传输端点替代真实消息队列，以 `MockClock` 驱动时间，
//!   以共享事件日志观察跨阶段的调用顺序；
//! - **What**：`wiring` 覆盖链的方向性，`idle` 覆盖 `poll` 的超时推导，`lifecycle` 覆盖重建与关闭。

mod idle;
mod lifecycle;
mod wiring;

use std::sync::Arc;
use std::time::Duration;

use relay_core::testing::{CapturedOutput, EventLog, RecordingLayer, ScriptHandle};
use relay_core::{MockClock, RelayConfig, StackRegistry, StreamRelay};

/// 一次装配产出的全部观察点。
pub(crate) struct Fixture {
    pub relay: StreamRelay,
    pub script: ScriptHandle,
    pub clock: MockClock,
    pub log: EventLog,
    pub output: CapturedOutput,
}

/// 以 `scripted` 传输端点与记录型协议层 `a`、`b`、`c` 装配编排器，空闲超时为 1 秒。
pub(crate) fn fixture(stack: &str) -> Fixture {
    fixture_with_idle_timeout(stack, Duration::from_secs(1))
}

pub(crate) fn fixture_with_idle_timeout(stack: &str, idle_timeout: Duration) -> Fixture {
    let clock = MockClock::new();
    let log = EventLog::new();
    let script = ScriptHandle::new(log.clone()).with_clock(clock.clone());
    let output = CapturedOutput::new();

    let mut registry = StackRegistry::new();
    registry
        .register_transport("scripted", script.factory())
        .register_layer("a", RecordingLayer::factory("a", log.clone()))
        .register_layer("b", RecordingLayer::factory("b", log.clone()))
        .register_layer("c", RecordingLayer::factory("c", log.clone()));

    let config = RelayConfig::default()
        .with_transport("scripted")
        .with_stack(stack)
        .with_idle_timeout(idle_timeout)
        .with_poll_interval(Duration::from_millis(500));

    let relay = StreamRelay::builder(config)
        .registry(registry)
        .output(output.slot())
        .clock(Arc::new(clock.clone()))
        .build()
        .expect("装配脚本化协议栈");
    log.take();

    Fixture {
        relay,
        script,
        clock,
        log,
        output,
    }
}
