//! 协议层构造函数注册表（Stack Builder）。
//!
//! # 设计背景（Why）
//! - 描述串中的名称在启动时解析为注册过的构造函数，未知名称在构建期即报错，
//!   而不是在运行期按名字动态查找类型；
//! - 测试与嵌入方可以注册自己的传输或协议层，复用同一套构建逻辑。
//!
//! # 契约说明（What）
//! - [`StackRegistry::build`] 只构造并连接链，不启动任何后台活动；
//! - 构建失败时返回 [`ConfigError`]，已构造的部分随之释放。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::chain::Chain;
use crate::error::ConfigError;
use crate::layer::Layer;
use crate::stack::{Descriptor, StackSpec};
use crate::time::{SharedClock, SystemClock};
use crate::transport::Transport;

/// 构造传输端点的函数。
pub type TransportFactory =
    Arc<dyn Fn(&Descriptor, &BuildContext) -> Result<Box<dyn Transport>, ConfigError> + Send + Sync>;

/// 构造协议层的函数。
pub type LayerFactory = Arc<dyn Fn(&Descriptor) -> Result<Box<dyn Layer>, ConfigError> + Send + Sync>;

/// 构建期共享给传输端点的环境。
#[derive(Clone)]
pub struct BuildContext {
    clock: SharedClock,
}

impl BuildContext {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// 传输端点记录活动时间所用的时钟。
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext").finish_non_exhaustive()
    }
}

/// 名称到构造函数的映射。
#[derive(Clone, Default)]
pub struct StackRegistry {
    transports: BTreeMap<String, TransportFactory>,
    layers: BTreeMap<String, LayerFactory>,
}

impl StackRegistry {
    /// 空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册传输端点构造函数；同名注册会覆盖旧值。
    pub fn register_transport<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Descriptor, &BuildContext) -> Result<Box<dyn Transport>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.transports.insert(name.into(), Arc::new(factory));
        self
    }

    /// 注册协议层构造函数；同名注册会覆盖旧值。
    pub fn register_layer<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Descriptor) -> Result<Box<dyn Layer>, ConfigError> + Send + Sync + 'static,
    {
        self.layers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn has_transport(&self, name: &str) -> bool {
        self.transports.contains_key(name)
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// 按描述构造并连接一条完整的链。
    pub fn build(&self, spec: &StackSpec, ctx: &BuildContext) -> Result<Chain, ConfigError> {
        let descriptor = spec.transport();
        let factory =
            self.transports
                .get(descriptor.name())
                .ok_or_else(|| ConfigError::UnknownTransport {
                    name: descriptor.name().to_owned(),
                })?;
        let transport = factory(descriptor, ctx)?;

        let layers = spec
            .layers()
            .iter()
            .map(|descriptor| {
                let factory =
                    self.layers
                        .get(descriptor.name())
                        .ok_or_else(|| ConfigError::UnknownLayer {
                            name: descriptor.name().to_owned(),
                        })?;
                factory(descriptor)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let chain = Chain::new(transport, layers);
        tracing::debug!(target: "relay::stack", stack = %spec, stages = ?chain.stages(), "stack built");
        Ok(chain)
    }

    /// 解析描述串并构造链。
    pub fn build_str(&self, definition: &str, ctx: &BuildContext) -> Result<Chain, ConfigError> {
        self.build(&StackSpec::parse(definition)?, ctx)
    }
}

impl fmt::Debug for StackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackRegistry")
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .field("layers", &self.layers.keys().collect::<Vec<_>>())
            .finish()
    }
}
