use std::io::{self, Write};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::buffer::{OutputBuffer, SharedWriter, shared_writer};

enum Route {
    Direct(SharedWriter),
    Buffered(Arc<OutputBuffer>),
}

/// 输出缓冲的安装凭据：释放时关闭缓冲，并由缓冲的清理回调恢复直写路由。
struct BufferInstallation {
    buffer: Option<Arc<OutputBuffer>>,
}

impl BufferInstallation {
    fn release(mut self) -> io::Result<()> {
        match self.buffer.take() {
            Some(buffer) => buffer.close(),
            None => Ok(()),
        }
    }
}

impl Drop for BufferInstallation {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take()
            && let Err(err) = buffer.close()
        {
            tracing::warn!(target: "relay::output", error = %err, "output teardown failed");
        }
    }
}

struct SlotInner {
    direct: SharedWriter,
    route: Arc<ArcSwap<Route>>,
    installation: Mutex<Option<BufferInstallation>>,
}

/// 显式传递的输出槽，替代进程级的“当前标准输出”。
///
/// # 契约说明（What）
/// - 写入按当前路由分派：直写底层写入端，或经由已安装的 [`OutputBuffer`]；
/// - [`install_buffer`](Self::install_buffer) 幂等：已有缓冲包裹写入端时不会重复创建；
/// - [`teardown`](Self::teardown) 排空缓冲、停止后台线程并恢复直写；最后一个句柄释放时自动执行。
#[derive(Clone)]
pub struct OutputSlot {
    inner: Arc<SlotInner>,
}

impl OutputSlot {
    /// 以任意写入端构造输出槽，初始为直写路由。
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::from_shared(shared_writer(writer))
    }

    /// 以标准输出构造输出槽。
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// 以已共享的写入端构造输出槽。
    pub fn from_shared(direct: SharedWriter) -> Self {
        let route = Route::Direct(Arc::clone(&direct));
        Self {
            inner: Arc::new(SlotInner {
                direct,
                route: Arc::new(ArcSwap::from_pointee(route)),
                installation: Mutex::new(None),
            }),
        }
    }

    /// 安装输出缓冲；已安装时返回 `Ok(false)`。
    pub fn install_buffer(&self) -> io::Result<bool> {
        let mut installation = self.inner.installation.lock();
        if installation.is_some() {
            return Ok(false);
        }

        self.inner.direct.lock().flush()?;
        let route = Arc::clone(&self.inner.route);
        let previous = Arc::clone(&self.inner.direct);
        let restore: Box<dyn FnOnce() + Send> =
            Box::new(move || route.store(Arc::new(Route::Direct(previous))));
        let buffer = Arc::new(OutputBuffer::with_cleanup(
            Arc::clone(&self.inner.direct),
            Some(restore),
        )?);

        self.inner
            .route
            .store(Arc::new(Route::Buffered(Arc::clone(&buffer))));
        *installation = Some(BufferInstallation {
            buffer: Some(buffer),
        });
        tracing::debug!(target: "relay::output", "output buffer installed");
        Ok(true)
    }

    /// 当前是否经由输出缓冲写出。
    pub fn is_buffered(&self) -> bool {
        matches!(**self.inner.route.load(), Route::Buffered(_))
    }

    /// 按当前路由写入一个块。
    pub fn write(&self, chunk: &[u8]) -> io::Result<()> {
        match &**self.inner.route.load() {
            Route::Direct(writer) => writer.lock().write_all(chunk),
            Route::Buffered(buffer) => buffer.write(chunk),
        }
    }

    /// 等待已写入的块全部落到底层写入端。
    pub fn flush(&self) -> io::Result<()> {
        match &**self.inner.route.load() {
            Route::Direct(writer) => writer.lock().flush(),
            Route::Buffered(buffer) => buffer.flush(),
        }
    }

    /// 拆除输出缓冲并恢复直写；未安装时为空操作。
    pub fn teardown(&self) -> io::Result<()> {
        let installation = self.inner.installation.lock().take();
        match installation {
            Some(installation) => installation.release(),
            None => Ok(()),
        }
    }
}
