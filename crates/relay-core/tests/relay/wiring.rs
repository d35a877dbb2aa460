use std::sync::Arc;

use bytes::Bytes;
use relay_core::testing::ScriptHandle;
use relay_core::{ConfigError, RelayConfig, RelayError, StackRegistry, StreamRelay, SystemClock};

use super::fixture;

/// 解码自传输侧逐层向内，越过应用侧末端的帧进入收件箱。
#[test]
fn decode_flows_from_transport_to_application() {
    let mut fx = fixture("a,b,c");

    fx.relay.decode(b"ping").expect("解码");

    assert_eq!(fx.log.take(), ["a.decode", "b.decode", "c.decode"]);
    assert_eq!(
        fx.relay.take_frames().expect("取帧"),
        [Bytes::from_static(b"ping")]
    );
    assert!(fx.relay.take_frames().expect("再次取帧").is_empty());
}

/// 编码自应用侧逐层向外，最终由传输端点发送。
#[test]
fn encode_flows_from_application_to_transport() {
    let mut fx = fixture("a,b,c");

    fx.relay.encode(b"pong").expect("编码");

    assert_eq!(
        fx.log.take(),
        ["c.encode", "b.encode", "a.encode", "scripted.send"]
    );
    assert_eq!(fx.script.sent(), [Bytes::from_static(b"pong")]);
}

#[test]
fn stages_list_the_transport_first() {
    let fx = fixture("a,b,c");
    assert_eq!(
        fx.relay.stages().expect("阶段"),
        ["scripted", "a", "b", "c"]
    );
    assert_eq!(fx.script.descriptors(), ["scripted=*:19026"]);
}

/// 传输端点单独成链时，解码结果直接抵达应用侧。
#[test]
fn transport_only_stack_delivers_directly() {
    let mut fx = fixture("");

    fx.relay.decode(b"raw").expect("解码");
    fx.relay.encode(b"reply").expect("编码");

    assert_eq!(
        fx.relay.take_frames().expect("取帧"),
        [Bytes::from_static(b"raw")]
    );
    assert_eq!(fx.script.sent(), [Bytes::from_static(b"reply")]);
}

/// `pump` 排空传输端点并逐帧解码，顺序与接收顺序一致。
#[test]
fn pump_decodes_every_pending_frame_in_order() {
    let mut fx = fixture("a");
    fx.script.push_frame(&b"one"[..]);
    fx.script.push_frame(&b"two"[..]);

    assert_eq!(fx.relay.pump().expect("排空"), 2);
    assert_eq!(
        fx.log.take(),
        ["scripted.recv", "a.decode", "scripted.recv", "a.decode"]
    );
    assert_eq!(
        fx.relay.take_frames().expect("取帧"),
        [Bytes::from_static(b"one"), Bytes::from_static(b"two")]
    );
}

/// 未注册的名称在构建期即报错。
#[test]
fn unknown_names_fail_at_build_time() {
    let script = ScriptHandle::new(Default::default());
    let mut registry = StackRegistry::new();
    registry.register_transport("scripted", script.factory());

    let unknown_layer = StreamRelay::builder(
        RelayConfig::default()
            .with_transport("scripted")
            .with_stack("ascii"),
    )
    .registry(registry.clone())
    .clock(Arc::new(SystemClock))
    .build();
    assert!(matches!(
        unknown_layer,
        Err(RelayError::Config(ConfigError::UnknownLayer { ref name })) if name == "ascii"
    ));

    let unknown_transport =
        StreamRelay::builder(RelayConfig::default().with_transport("udp").with_stack(""))
            .registry(registry)
            .build();
    assert!(matches!(
        unknown_transport,
        Err(RelayError::Config(ConfigError::UnknownTransport { ref name })) if name == "udp"
    ));
}
