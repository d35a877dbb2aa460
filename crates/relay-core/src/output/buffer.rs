use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

/// 被输出缓冲与直写路径共享的底层写入端。
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// 将任意写入端包装为 [`SharedWriter`]。
pub fn shared_writer<W>(writer: W) -> SharedWriter
where
    W: Write + Send + 'static,
{
    Arc::new(Mutex::new(Box::new(writer)))
}

type Cleanup = Box<dyn FnOnce() + Send>;

enum Message {
    Chunk(Bytes),
    /// 排空屏障：在它之前入队的块全部写出后应答。
    Flush(Sender<()>),
    /// 关闭哨兵，保证空闲的消费者也能醒来。
    Wakeup,
}

struct Shared {
    sink: SharedWriter,
    closed: RwLock<bool>,
}

impl Shared {
    fn write_direct(&self, chunk: &[u8]) -> io::Result<()> {
        self.sink.lock().write_all(chunk)
    }
}

struct Lifecycle {
    worker: Option<JoinHandle<()>>,
    cleanup: Option<Cleanup>,
}

/// 无界输出缓冲：调用方入队即返回，由唯一的后台线程执行可能阻塞的写入。
///
/// # 契约说明（What）
/// - `write`：打开状态下只入队；一旦进入关闭流程则改为同步直写，关闭竞争中不丢数据；
/// - `flush`：阻塞到调用前入队的所有块都已写出；
/// - `close`：依次排空、标记关闭、投递唤醒哨兵、等待线程退出、冲刷底层写入端、执行清理回调；
///   重复调用为空操作，`Drop` 时同样调用一次。
///
/// # 并发模型（How）
/// - 任意数量的生产者经 `crossbeam-channel` 入队，单一消费者按 FIFO 顺序写出；
/// - 入队与“标记关闭”之间以读写锁互斥：关闭标记写入后不会再有块排在哨兵之后。
pub struct OutputBuffer {
    shared: Arc<Shared>,
    sender: Sender<Message>,
    lifecycle: Mutex<Lifecycle>,
}

impl OutputBuffer {
    /// 创建输出缓冲并启动后台写线程。
    pub fn new(sink: SharedWriter) -> io::Result<Self> {
        Self::with_cleanup(sink, None)
    }

    /// 创建输出缓冲，并在 `close` 的最后一步执行 `cleanup`。
    pub fn with_cleanup(sink: SharedWriter, cleanup: Option<Cleanup>) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            sink,
            closed: RwLock::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("relay-output".into())
            .spawn(move || run_worker(&worker_shared, &receiver))?;

        Ok(Self {
            shared,
            sender,
            lifecycle: Mutex::new(Lifecycle {
                worker: Some(worker),
                cleanup,
            }),
        })
    }

    /// 写入一个输出块。
    pub fn write(&self, chunk: &[u8]) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let closed = self.shared.closed.read();
        if *closed {
            drop(closed);
            return self.shared.write_direct(chunk);
        }
        match self.sender.send(Message::Chunk(Bytes::copy_from_slice(chunk))) {
            Ok(()) => Ok(()),
            Err(err) => {
                drop(closed);
                match err.into_inner() {
                    Message::Chunk(chunk) => self.shared.write_direct(&chunk),
                    _ => Ok(()),
                }
            }
        }
    }

    /// 等待此前入队的所有块写出。
    pub fn flush(&self) -> io::Result<()> {
        let closed = self.shared.closed.read();
        if *closed {
            drop(closed);
            return self.shared.sink.lock().flush();
        }
        let (ack, done) = crossbeam_channel::bounded(1);
        let queued = self.sender.send(Message::Flush(ack)).is_ok();
        drop(closed);
        if queued {
            // 消费者已退出时 `recv` 立即返回错误，视为无待写数据。
            let _ = done.recv();
        }
        Ok(())
    }

    /// 是否已进入关闭流程。
    pub fn is_closed(&self) -> bool {
        *self.shared.closed.read()
    }

    /// 排空并停止后台线程，随后执行清理回调。
    pub fn close(&self) -> io::Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.worker.is_none() {
            return Ok(());
        }

        self.flush()?;
        *self.shared.closed.write() = true;
        let _ = self.sender.send(Message::Wakeup);
        if let Some(worker) = lifecycle.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!(target: "relay::output", "output worker panicked before shutdown");
        }

        let flushed = self.shared.sink.lock().flush();
        if let Some(cleanup) = lifecycle.cleanup.take() {
            cleanup();
        }
        tracing::debug!(target: "relay::output", "output buffer closed");
        flushed
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(target: "relay::output", error = %err, "failed to flush output on drop");
        }
    }
}

fn run_worker(shared: &Shared, receiver: &Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Chunk(chunk) => {
                if let Err(err) = shared.write_direct(&chunk) {
                    tracing::warn!(
                        target: "relay::output",
                        error = %err,
                        len = chunk.len(),
                        "dropping terminal output chunk"
                    );
                }
            }
            Message::Flush(ack) => {
                if let Err(err) = shared.sink.lock().flush() {
                    tracing::warn!(target: "relay::output", error = %err, "output flush failed");
                }
                let _ = ack.send(());
            }
            Message::Wakeup => {
                if *shared.closed.read() {
                    break;
                }
            }
        }
    }
}
