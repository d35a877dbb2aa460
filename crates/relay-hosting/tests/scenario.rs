//! 默认协议栈的端到端场景。
//!
//! # 教案级导览
//!
//! - **Why**：单独验证各协议层无法证明它们按描述串的顺序正确拼接，也无法证明终端文本真正经过输出缓冲；
//! - **How**：以默认注册表解析 `zmq=*:5555,ascii,term=01:02`（`term` 的标记为 `\x01` / `\x02`），
//!   仅把 `zmq` 替换为脚本化端点以避免占用网络端口；
//! - **What**：普通文本抵达输出槽，带外帧抵达应用侧末端，应答经 `term`、`ascii` 编码后由传输端点发送。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use relay_core::testing::{CapturedOutput, EventLog, ScriptHandle};
use relay_core::{MockClock, RelayConfig, StreamRelay};
use relay_hosting::default_registry;

struct Scenario {
    relay: StreamRelay,
    script: ScriptHandle,
    output: CapturedOutput,
}

fn scenario() -> anyhow::Result<Scenario> {
    let clock = MockClock::new();
    let script = ScriptHandle::new(EventLog::new()).with_clock(clock.clone());
    let output = CapturedOutput::new();

    let mut registry = default_registry();
    registry.register_transport("zmq", script.factory());

    let config = RelayConfig::default()
        .with_port(5555)
        .with_stack("ascii,term=01:02");
    assert_eq!(config.stack_definition(), "zmq=*:5555,ascii,term=01:02");

    let relay = StreamRelay::builder(config)
        .registry(registry)
        .output(output.slot())
        .clock(Arc::new(clock))
        .build()?;
    Ok(Scenario {
        relay,
        script,
        output,
    })
}

#[test]
fn terminal_text_and_frames_are_separated() -> anyhow::Result<()> {
    let mut s = scenario()?;
    assert_eq!(s.relay.stages()?, ["scripted", "ascii", "term"]);
    assert_eq!(s.script.descriptors(), ["zmq=*:5555"]);

    s.relay.decode(b"hello\x01FRAME\x02world")?;
    s.relay.output().flush()?;

    assert_eq!(s.output.text(), "helloworld");
    assert_eq!(s.relay.take_frames()?, [Bytes::from_static(b"FRAME")]);
    Ok(())
}

#[test]
fn frames_arrive_through_the_event_loop() -> anyhow::Result<()> {
    let mut s = scenario()?;
    s.script.push_frame(&b"boot \x01OB"[..]);
    s.script.push_frame(&b"F\x02ok\n"[..]);

    let readiness = s.relay.step(Some(Duration::from_millis(100)))?;
    assert!(readiness.socket_ready());
    s.relay.output().flush()?;

    assert_eq!(s.output.text(), "boot ok\n");
    assert_eq!(s.relay.take_frames()?, [Bytes::from_static(b"OBF")]);
    Ok(())
}

#[test]
fn replies_are_framed_then_escaped() -> anyhow::Result<()> {
    let mut s = scenario()?;
    s.script.push_frame(&b"\x01?\x02"[..]);
    s.relay.pump()?;
    assert!(s.relay.is_waiting()?);

    s.relay.encode(b"v\n")?;

    // term 包裹标记，ascii 再转义标记与换行。
    assert_eq!(
        s.script.sent(),
        [Bytes::from_static(b"\x7f\x41v\x7f\x4a\x7f\x42")]
    );
    assert!(!s.relay.is_waiting()?);
    Ok(())
}

/// 半截帧在空闲超时后作为终端文本写出，不会永久滞留。
#[test]
fn stalled_frame_is_flushed_as_text_on_idle_timeout() -> anyhow::Result<()> {
    let mut s = scenario()?;
    s.script.push_frame(&b"log \x01trunc"[..]);
    s.relay.pump()?;

    // 第一次轮询空转满空闲超时，第二次轮询触发超时。
    s.relay.poll(None)?;
    s.relay.poll(Some(Duration::ZERO))?;
    s.relay.output().flush()?;

    assert_eq!(s.script.timeouts(), 1);
    assert_eq!(s.output.contents(), b"log \x01trunc");
    assert_eq!(s.script.sent(), [Bytes::new()]);
    Ok(())
}

/// 默认配置可以直接构建，构建本身不绑定套接字。
#[test]
fn default_configuration_builds_the_reference_stack() -> anyhow::Result<()> {
    let mut relay = relay_hosting::bind_with_output(
        RelayConfig::default(),
        CapturedOutput::new().slot(),
    )?;
    assert_eq!(relay.stages()?, ["zmq", "ascii", "term"]);
    assert!(!relay.is_waiting()?);
    relay.close()?;
    Ok(())
}

#[test]
fn toml_configuration_is_validated() {
    let err = relay_hosting::bind_toml("stack = \"ascii,term=01\"").expect_err("bad markers");
    assert!(err.to_string().contains("term=01"), "{err}");

    let err = relay_hosting::bind_toml("stack = \"ascii,,term\"").expect_err("empty descriptor");
    assert!(err.to_string().contains("empty descriptor"));
}
