use crate::config::Config;
use crate::errors::{CrawlerError, Result};
use crate::models::task::DateRange;
use crate::scrapers::base::StockScraper;
use crate::services::task_generator::TaskGenerator;
use crate::services::worker_pool::{WorkQueue, WorkerPool};
use crate::services::writer::{self, ResultSink, Writer};
use crate::stats::CrawlStats;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

/// 抓取服务：生成任务，启动抓取线程池和写入线程，等待全部完成
pub struct CrawlService {
    config: Config,
    scraper: Arc<dyn StockScraper + Send + Sync>,
}

impl CrawlService {
    pub fn new(config: Config, scraper: Arc<dyn StockScraper + Send + Sync>) -> Self {
        Self { config, scraper }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 配置中指定了股票则直接使用，否则分页获取全部股票
    pub async fn resolve_symbols(&self) -> Result<Vec<String>> {
        if !self.config.symbols.is_empty() {
            info!("Using {} symbols from config", self.config.symbols.len());
            return Ok(self.config.symbols.clone());
        }

        info!("Retrieving symbol list from {}", self.scraper.provider_code());
        let mut symbols = Vec::new();
        let mut page = 1;

        loop {
            let mut attempts = 0;
            let page_symbols = loop {
                attempts += 1;
                match self.scraper.fetch_symbol_page(page).await {
                    Ok(list) => break list,
                    Err(e) if attempts < self.config.max_retry => {
                        warn!("Symbol page {} fails {} times: {}. Continue retrying...", page, attempts, e);
                    }
                    Err(e) => {
                        error!("Symbol page {} fails {} times. Stop retrying!", page, attempts);
                        return Err(e);
                    }
                }
            };

            // 空页表示列表结束
            if page_symbols.is_empty() {
                break;
            }
            symbols.extend(page_symbols);
            page += 1;
        }

        info!("Retrieved {} symbols in {} pages", symbols.len(), page - 1);
        Ok(symbols)
    }

    /// 抓取区间内全部股票并写入 `save_fp`
    pub async fn run(&self, range: DateRange, shutdown: watch::Receiver<bool>) -> Result<CrawlStats> {
        info!("Retrieving data of stocks in {}", range);

        let symbols = self.resolve_symbols().await?;
        let sink = writer::open_sink(&self.config.save_fp)?;
        self.run_with_sink(&symbols, range, sink, shutdown).await
    }

    pub async fn run_with_sink(
        &self,
        symbols: &[String],
        range: DateRange,
        sink: Box<dyn ResultSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CrawlStats> {
        let started = Instant::now();
        let items = TaskGenerator::new(&self.config).generate(symbols, &range);
        let expected = items.len();

        let pool = WorkerPool::new(&self.config, Arc::clone(&self.scraper));
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let output = sink
            .location()
            .map_or_else(|| "in-memory output".to_string(), |p| p.display().to_string());
        let writer = Writer::new(sink, pool.num_workers(), expected, self.config.write_batch_size);

        info!("Thread pool starts {} crawler workers and 1 writer...", pool.num_workers());
        let writer_handle = tokio::task::spawn_blocking(move || writer.run(rx));
        let worker_handles = pool.spawn(WorkQueue::from_items(items), tx, shutdown);

        let writer_result = writer_handle.await?;

        let mut worker_error = None;
        for handle in worker_handles {
            match handle.await? {
                Ok(report) => info!(
                    "Worker {} delivered {} results with {} retries",
                    report.worker_id, report.sent, report.retried
                ),
                Err(e) => {
                    warn!("Crawler worker stopped early: {}", e);
                    if worker_error.is_none() {
                        worker_error = Some(e);
                    }
                }
            }
        }

        // writer出错时以writer的错误为准，worker只会看到队列已关闭
        let mut stats = writer_result.map_err(|e| {
            error!(
                "Writer failed, {} is incomplete and has to be deleted before crawling the range again: {}",
                output, e
            );
            e
        })?;
        if let Some(e) = worker_error {
            return Err(e);
        }

        stats.elapsed = started.elapsed();
        if stats.received != expected {
            return Err(CrawlerError::DataError(format!(
                "Expected {} results but the writer recorded {}", expected, stats.received
            )));
        }

        stats.log_summary();
        Ok(stats)
    }
}
