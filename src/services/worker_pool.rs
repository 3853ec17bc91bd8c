use crate::config::Config;
use crate::errors::{CrawlerError, Result};
use crate::models::task::{FetchResult, QueueMessage, WorkItem};
use crate::scrapers::base::StockScraper;
use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug)]
struct PendingTask {
    item: WorkItem,
    attempts: u32,
}

/// 所有worker共享的任务队列，失败重试的任务放回队尾
#[derive(Clone, Default)]
pub struct WorkQueue {
    inner: Arc<Mutex<VecDeque<PendingTask>>>,
}

impl WorkQueue {
    pub fn from_items(items: Vec<WorkItem>) -> Self {
        let tasks = items
            .into_iter()
            .map(|item| PendingTask { item, attempts: 0 })
            .collect();
        Self { inner: Arc::new(Mutex::new(tasks)) }
    }

    fn pop(&self) -> Option<PendingTask> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    fn push_back(&self, task: PendingTask) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).push_back(task);
    }
}

/// 一个worker退出时的汇总
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub sent: usize,
    pub retried: usize,
}

/// 抓取线程池：N个worker从 WorkQueue 取任务，结果写入结果队列
pub struct WorkerPool {
    num_workers: usize,
    max_retry: u32,
    scraper: Arc<dyn StockScraper + Send + Sync>,
}

impl WorkerPool {
    pub fn new(config: &Config, scraper: Arc<dyn StockScraper + Send + Sync>) -> Self {
        Self {
            num_workers: config.num_crawler.max(1),
            max_retry: config.max_retry.max(1),
            scraper,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// 启动所有worker，`tx` 在所有worker退出后才会被全部释放
    pub fn spawn(
        &self,
        queue: WorkQueue,
        tx: mpsc::Sender<QueueMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<Result<WorkerReport>>> {
        (0..self.num_workers)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    max_retry: self.max_retry,
                    scraper: Arc::clone(&self.scraper),
                    queue: queue.clone(),
                    tx: tx.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect()
    }
}

struct Worker {
    worker_id: usize,
    max_retry: u32,
    scraper: Arc<dyn StockScraper + Send + Sync>,
    queue: WorkQueue,
    tx: mpsc::Sender<QueueMessage>,
    shutdown: watch::Receiver<bool>,
}

/// 等待关闭信号；发送端已释放时永不返回
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl Worker {
    async fn send(&self, message: QueueMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| CrawlerError::QueueClosed(format!("worker {} cannot deliver results", self.worker_id)))
    }

    async fn run(self) -> Result<WorkerReport> {
        info!("Crawler worker {} starts...", self.worker_id);
        let mut report = WorkerReport { worker_id: self.worker_id, ..WorkerReport::default() };

        loop {
            let stopping = *self.shutdown.borrow();
            if stopping {
                report.sent += self.drain_cancelled().await?;
                break;
            }

            let Some(mut task) = self.queue.pop() else {
                break;
            };
            task.attempts += 1;

            let fetched = {
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    fetched = self.scraper.fetch_daily(&task.item) => Some(fetched),
                    _ = wait_for_shutdown(&mut shutdown) => None,
                }
            };

            let result = match fetched {
                Some(Ok(daily)) => FetchResult::success(task.item, task.attempts, daily),
                Some(Err(e)) if task.attempts < self.max_retry => {
                    warn!(
                        "{} fails {} times: {}. Continue retrying...",
                        task.item, task.attempts, e
                    );
                    report.retried += 1;
                    self.queue.push_back(task);
                    continue;
                }
                Some(Err(e)) => {
                    error!("{} fails {} times: {}. Stop retrying!", task.item, task.attempts, e);
                    FetchResult::failure(task.item, task.attempts, e.to_string())
                }
                None => {
                    warn!("{} cancelled during fetch", task.item);
                    FetchResult::cancelled(task.item, task.attempts)
                }
            };

            self.send(QueueMessage::Result(result)).await?;
            report.sent += 1;
        }

        self.send(QueueMessage::Sentinel { worker_id: self.worker_id }).await?;
        info!(
            "Crawler worker {} stopped after {} results ({} retries).",
            self.worker_id, report.sent, report.retried
        );
        Ok(report)
    }

    /// 关闭时把剩余任务全部记为取消，保证每个任务都有结果
    async fn drain_cancelled(&self) -> Result<usize> {
        let mut drained = 0;
        while let Some(task) = self.queue.pop() {
            self.send(QueueMessage::Result(FetchResult::cancelled(task.item, task.attempts))).await?;
            drained += 1;
        }
        if drained > 0 {
            warn!("Crawler worker {} cancelled {} pending work items", self.worker_id, drained);
        }
        Ok(drained)
    }
}
