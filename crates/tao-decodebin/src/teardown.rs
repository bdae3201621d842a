//! 后台销毁队列.
//!
//! 销毁解析器, 解码器与通道可能阻塞, 且调用方往往正是需要继续推送数据的流线程,
//! 因此这些工作统一交给专门的销毁线程执行.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, warn};
use parking_lot::Mutex;
use tao_core::TaoResult;

/// 销毁任务
pub type TeardownJob = Box<dyn FnOnce() + Send>;

enum Command {
    Run(&'static str, TeardownJob),
    Sync(Sender<()>),
    Shutdown,
}

/// 后台销毁队列
pub struct TeardownQueue {
    sender: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl TeardownQueue {
    /// 启动销毁线程
    pub fn new() -> TaoResult<Self> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let worker = thread::Builder::new()
            .name("tao-teardown".into())
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        Command::Run(label, job) => {
                            debug!("执行销毁任务: {label}");
                            job();
                        }
                        Command::Sync(done) => {
                            let _ = done.send(());
                        }
                        Command::Shutdown => break,
                    }
                }
            })?;
        let worker_id = worker.thread().id();
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    /// 提交任务; 队列已关闭时在当前线程直接执行
    pub fn submit(&self, label: &'static str, job: TeardownJob) {
        let rejected = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(Command::Run(label, job)).err(),
            None => Some(mpsc::SendError(Command::Run(label, job))),
        };
        if let Some(mpsc::SendError(Command::Run(label, job))) = rejected {
            warn!("销毁队列已关闭, 直接执行: {label}");
            job();
        }
    }

    /// 等待此前提交的任务全部完成
    pub fn sync(&self) {
        if thread::current().id() == self.worker_id {
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        let sent = self
            .sender
            .lock()
            .as_ref()
            .is_some_and(|sender| sender.send(Command::Sync(done_tx)).is_ok());
        if sent {
            let _ = done_rx.recv();
        }
    }

    /// 执行完剩余任务后停止销毁线程
    pub fn shutdown(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Command::Shutdown);
        }
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("销毁线程异常退出");
            }
        }
    }
}

impl Drop for TeardownQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
