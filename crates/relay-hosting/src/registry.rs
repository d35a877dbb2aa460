use relay_core::StackRegistry;

/// 登记了全部参考实现的注册表：`zmq` 传输端点与 `ascii`、`term` 协议层。
///
/// 调用方可在返回值上继续注册，同名注册会覆盖默认实现。
pub fn default_registry() -> StackRegistry {
    let mut registry = StackRegistry::new();
    relay_transport_zmq::register(&mut registry);
    relay_codec_term::register(&mut registry);
    registry
}
