use std::sync::Arc;

use bytes::Bytes;
use relay_core::testing::{FlagStream, ScriptHandle};
use relay_core::{RelayError, RelayState, StreamRelay, TransportError};
use tracing_test::traced_test;

use super::fixture;

/// `reset` 以同一描述串重建整条链，旧的传输端点随之释放。
#[test]
fn reset_rebuilds_a_clean_chain() {
    let mut fx = fixture("a,b");
    fx.relay.decode(b"stale").expect("解码");

    fx.relay.reset().expect("第一次重建");
    fx.relay.reset().expect("第二次重建");

    assert_eq!(fx.script.closes(), 2, "每次重建释放一个旧端点");
    assert_eq!(fx.script.descriptors().len(), 3);
    assert_eq!(fx.relay.stages().expect("阶段"), ["scripted", "a", "b"]);
    assert!(
        fx.relay.take_frames().expect("取帧").is_empty(),
        "重建后收件箱应为空"
    );
    assert_eq!(fx.relay.state(), RelayState::Ready);
}

#[test]
fn building_installs_the_output_buffer() {
    let fx = fixture("a");
    assert!(fx.relay.output().is_buffered());

    fx.relay.output().write(b"text").expect("写入");
    fx.relay.output().flush().expect("排空");
    assert_eq!(fx.output.contents(), b"text");
}

/// `close` 幂等，关闭后除再次关闭外的操作都返回 `Closed`。
#[test]
fn close_is_terminal_and_idempotent() {
    let mut fx = fixture("a");

    fx.relay.close().expect("第一次关闭");
    fx.relay.close().expect("第二次关闭");

    assert_eq!(fx.relay.state(), RelayState::Closed);
    assert_eq!(fx.script.closes(), 1);
    assert!(matches!(fx.relay.decode(b"x"), Err(RelayError::Closed)));
    assert!(matches!(fx.relay.poll(None), Err(RelayError::Closed)));
    assert!(matches!(fx.relay.reset(), Err(RelayError::Closed)));
    assert!(matches!(fx.relay.take_frames(), Err(RelayError::Closed)));
}

/// 外部字节流的登记委托给传输端点，就绪时出现在 `poll` 的报告中。
#[test]
fn registered_streams_join_the_readiness_report() {
    let mut fx = fixture("a");
    let stream = Arc::new(FlagStream::default());

    let token = fx
        .relay
        .register_stream(stream.clone(), true)
        .expect("登记");
    assert_eq!(fx.script.registered_streams(), 1);

    stream.set_readable(true);
    let readiness = fx.relay.poll(Some(std::time::Duration::ZERO)).expect("轮询");
    assert_eq!(readiness.ready_streams(), [token]);
    assert!(!readiness.socket_ready());

    assert!(fx.relay.unregister_stream(token).expect("注销"));
    assert!(!fx.relay.unregister_stream(token).expect("重复注销"));
}

/// 暂停状态的字节流不参与就绪报告。
#[test]
fn disabled_streams_are_not_reported() {
    let mut fx = fixture("a");
    let stream = Arc::new(FlagStream::default());
    stream.set_readable(true);

    fx.relay.register_stream(stream, false).expect("登记");
    let readiness = fx.relay.poll(Some(std::time::Duration::ZERO)).expect("轮询");

    assert!(readiness.is_empty());
}

/// `recv_all` 在端点报告 `WouldBlock` 前逐帧调用处理函数。
#[test]
fn recv_all_stops_at_would_block() {
    let script = ScriptHandle::new(Default::default());
    let mut transport = script.transport(Arc::new(relay_core::SystemClock));
    script.push_frame(&b"first"[..]);
    script.push_frame(&b"second"[..]);

    let mut seen = Vec::new();
    let received = StreamRelay::recv_all(&mut transport, |frame| {
        seen.push(frame);
        Ok(())
    })
    .expect("排空");

    assert_eq!(received, 2);
    assert_eq!(
        seen,
        [Bytes::from_static(b"first"), Bytes::from_static(b"second")]
    );
}

/// 除 `WouldBlock` 外的传输错误原样传播。
#[test]
fn recv_all_propagates_transport_failures() {
    let script = ScriptHandle::new(Default::default());
    let mut transport = script.transport(Arc::new(relay_core::SystemClock));
    script.push_frame(&b"first"[..]);
    script.fail_next(TransportError::Backend {
        operation: "recv",
        detail: "socket state".into(),
    });

    let mut calls = 0;
    let result = StreamRelay::recv_all(&mut transport, |_| {
        calls += 1;
        Ok(())
    });

    assert!(matches!(
        result,
        Err(RelayError::Transport(TransportError::Backend { .. }))
    ));
    assert_eq!(calls, 0, "错误在第一帧之前注入");
}

/// 处理函数的错误终止排空并原样返回。
#[test]
fn recv_all_propagates_handler_errors() {
    let script = ScriptHandle::new(Default::default());
    let mut transport = script.transport(Arc::new(relay_core::SystemClock));
    script.push_frame(&b"first"[..]);
    script.push_frame(&b"second"[..]);

    let result = StreamRelay::recv_all(&mut transport, |_| Err(RelayError::Closed));

    assert!(matches!(result, Err(RelayError::Closed)));
    assert_eq!(script.sent(), Vec::<Bytes>::new());
}

#[test]
#[traced_test]
fn lifecycle_is_traced() {
    let mut fx = fixture("a");
    fx.relay.reset().expect("重建");
    fx.relay.close().expect("关闭");

    assert!(logs_contain("stream relay ready"));
    assert!(logs_contain("stack reset"));
    assert!(logs_contain("stream relay closed"));
}
