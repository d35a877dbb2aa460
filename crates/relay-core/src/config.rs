//! 中继配置。
//!
//! 配置既可在代码中以构建器方式组装，也可从 TOML 文本加载：
//!
//! ```toml
//! stack = "ascii,term"
//! listen = "*"
//! port = 19026
//! idle_timeout_s = 1.0
//! poll_interval_s = 1.0
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stack::StackSpec;

/// 参考传输的默认监听端口。
pub const DEFAULT_PORT: u16 = 19026;

/// 默认协议层（不含传输端点）。
pub const DEFAULT_STACK: &str = "ascii,term";

/// 参考传输在描述串中的名称。
pub const DEFAULT_TRANSPORT: &str = "zmq";

/// 中继编排器的配置。
///
/// - `stack`：传输端点之后的协议层，按传输侧到应用侧排列；
/// - `idle_timeout_s`：存在未完成交换时，自最近活动起允许的最长空闲时间；
/// - `poll_interval_s`：调用方未指定时 `poll` 的默认等待上限。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub transport: String,
    pub stack: String,
    pub listen: String,
    pub port: u16,
    pub idle_timeout_s: f64,
    pub poll_interval_s: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: DEFAULT_TRANSPORT.to_owned(),
            stack: DEFAULT_STACK.to_owned(),
            listen: "*".to_owned(),
            port: DEFAULT_PORT,
            idle_timeout_s: 1.0,
            poll_interval_s: 1.0,
        }
    }
}

impl RelayConfig {
    /// 从 TOML 文本加载并校验配置，缺省字段取默认值。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|err| ConfigError::Toml(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_s = timeout.as_secs_f64();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_s = interval.as_secs_f64();
        self
    }

    /// 完整的协议栈描述串：`<transport>=<listen>:<port>,<stack>`。
    pub fn stack_definition(&self) -> String {
        let transport = format!("{}={}:{}", self.transport, self.listen, self.port);
        if self.stack.trim().is_empty() {
            transport
        } else {
            format!("{transport},{}", self.stack)
        }
    }

    /// 解析后的协议栈描述。
    pub fn stack_spec(&self) -> Result<StackSpec, ConfigError> {
        StackSpec::parse(&self.stack_definition())
    }

    /// 空闲超时。
    pub fn idle_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("idle_timeout_s", self.idle_timeout_s)
    }

    /// 默认轮询间隔。
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        seconds("poll_interval_s", self.poll_interval_s)
    }

    /// 校验时长字段与协议栈描述串。
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.idle_timeout()?;
        self.poll_interval()?;
        self.stack_spec()?;
        Ok(())
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|err| ConfigError::InvalidArgument {
        descriptor: field.to_owned(),
        value: value.to_string(),
        reason: err.to_string(),
    })
}
