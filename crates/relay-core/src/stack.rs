//! 协议栈描述串解析。
//!
//! 描述串格式为 `"<transport>=<bind-args>,<layer1>,...,<layerN>"`，例如 `zmq=*:1234,ascii,term`：
//! 首个描述符恒为传输端点，其余按“传输侧 → 应用侧”的顺序列出协议层；
//! 每个描述符都可以携带 `name=argument` 形式的子参数。

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// 单个描述符：名称与可选子参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    name: String,
    argument: Option<String>,
}

impl Descriptor {
    /// 构造描述符。
    pub fn new(name: impl Into<String>, argument: Option<String>) -> Self {
        Self {
            name: name.into(),
            argument,
        }
    }

    fn parse(raw: &str, position: usize) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::EmptyDescriptor { position });
        }
        let (name, argument) = match raw.split_once('=') {
            Some((name, argument)) => (name.trim(), Some(argument.trim().to_owned())),
            None => (raw, None),
        };
        if name.is_empty() {
            return Err(ConfigError::EmptyDescriptor { position });
        }
        Ok(Self::new(name, argument))
    }

    /// 描述符名称，用于在注册表中查找构造函数。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `=` 之后的原始子参数。
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(argument) => write!(f, "{}={}", self.name, argument),
            None => f.write_str(&self.name),
        }
    }
}

/// 解析后的协议栈描述。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSpec {
    transport: Descriptor,
    layers: Vec<Descriptor>,
}

impl StackSpec {
    /// 解析描述串。
    pub fn parse(definition: &str) -> Result<Self, ConfigError> {
        if definition.trim().is_empty() {
            return Err(ConfigError::EmptySpecification);
        }
        let mut descriptors = definition
            .split(',')
            .enumerate()
            .map(|(position, raw)| Descriptor::parse(raw, position));

        let transport = match descriptors.next() {
            Some(descriptor) => descriptor?,
            None => return Err(ConfigError::EmptySpecification),
        };
        let layers = descriptors.collect::<Result<Vec<_>, _>>()?;
        Ok(Self { transport, layers })
    }

    /// 传输端点描述符。
    pub fn transport(&self) -> &Descriptor {
        &self.transport
    }

    /// 协议层描述符，按传输侧到应用侧排列。
    pub fn layers(&self) -> &[Descriptor] {
        &self.layers
    }
}

impl FromStr for StackSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StackSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transport)?;
        for layer in &self.layers {
            write!(f, ",{layer}")?;
        }
        Ok(())
    }
}

/// 传输描述符的 `listen:port` 子参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindAddress {
    listen: String,
    port: u16,
}

impl BindAddress {
    /// 构造绑定地址。
    pub fn new(listen: impl Into<String>, port: u16) -> Self {
        Self {
            listen: listen.into(),
            port,
        }
    }

    /// 从传输描述符中解析 `listen:port`，两部分均为必需参数。
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, ConfigError> {
        let missing = |argument| ConfigError::MissingArgument {
            descriptor: descriptor.to_string(),
            argument,
        };
        let argument = descriptor.argument().ok_or_else(|| missing("listen:port"))?;
        let (listen, port) = argument.rsplit_once(':').ok_or_else(|| missing("port"))?;
        let listen = listen.trim();
        let port = port.trim();
        if listen.is_empty() {
            return Err(missing("listen"));
        }
        if port.is_empty() {
            return Err(missing("port"));
        }
        let port = port.parse::<u16>().map_err(|err| ConfigError::InvalidArgument {
            descriptor: descriptor.to_string(),
            value: port.to_owned(),
            reason: err.to_string(),
        })?;
        Ok(Self::new(listen, port))
    }

    /// 监听地址，`*` 表示所有接口。
    pub fn listen(&self) -> &str {
        &self.listen
    }

    /// 端口号。
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.listen, self.port)
    }
}
