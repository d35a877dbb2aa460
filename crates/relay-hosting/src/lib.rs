#![deny(unsafe_code)]
#![doc = "relay-hosting: 流中继的宿主装配工具。"]
#![doc = ""]
#![doc = "把核心编排器与参考实现（ZeroMQ 传输、ASCII 转义层、终端分帧层）装配起来，"]
#![doc = "并提供日志初始化与 TOML 配置加载的便捷入口。"]

pub mod logging;
mod registry;

pub use registry::default_registry;

use relay_core::{OutputSlot, RelayConfig, Result, StreamRelay};

/// 以默认注册表与标准输出构建编排器。
///
/// 构建只解析并连接协议栈、安装输出缓冲；ZeroMQ 套接字在首次 `poll` 时才绑定。
pub fn bind(config: RelayConfig) -> Result<StreamRelay> {
    StreamRelay::builder(config)
        .registry(default_registry())
        .build()
}

/// 以默认注册表与指定输出槽构建编排器。
pub fn bind_with_output(config: RelayConfig, output: OutputSlot) -> Result<StreamRelay> {
    StreamRelay::builder(config)
        .registry(default_registry())
        .output(output)
        .build()
}

/// 从 TOML 文本加载配置并构建编排器。
pub fn bind_toml(source: &str) -> Result<StreamRelay> {
    bind(RelayConfig::from_toml_str(source)?)
}
