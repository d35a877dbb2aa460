//! 可注入的单调时钟。
//!
//! 空闲超时依赖“最近一次活动时间 + 超时 − 当前时间”的计算；若直接读取系统时钟，
//! 超时相关的测试将无法复现。编排器与传输端点因此统一通过 [`Clock`] 读取时间。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 抽象可注入的时钟。
///
/// # 接口约束（What）
/// - `now` 返回单调递增的时间点；
/// - 推荐以 [`SharedClock`] (`Arc<dyn Clock>`) 在编排器与传输之间共享同一实例。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 共享时钟句柄。
pub type SharedClock = Arc<dyn Clock>;

/// 直接委托给 [`Instant::now`] 的系统时钟。
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 虚拟时钟：只在调用 [`MockClock::advance`] 时前进。
///
/// - 以构造时刻的 [`Instant`] 为基准，内部只记录累计偏移量；
/// - 克隆体共享同一偏移量，便于测试在一处推进、多处观察。
#[derive(Clone)]
pub struct MockClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// 创建起始时间为当前系统时间的虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定起始时间构造虚拟时钟。
    pub fn with_start(origin: Instant) -> Self {
        Self {
            origin,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// 推进虚拟时间。
    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed += delta;
    }

    /// 自基准起累计推进的时长。
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
