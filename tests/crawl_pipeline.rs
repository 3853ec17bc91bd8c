use ashare_crawler::errors::{CrawlerError, Result};
use ashare_crawler::models::stock::DailyData;
use ashare_crawler::models::task::{DateRange, FetchResult, WorkItem};
use ashare_crawler::scrapers::base::StockScraper;
use ashare_crawler::services::crawl_service::CrawlService;
use ashare_crawler::services::writer::{MemorySink, ResultSink};
use ashare_crawler::util::{self, arrow_utils};
use ashare_crawler::Config;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// 按股票代码预设延迟和失败的假数据源
#[derive(Default)]
struct ScriptedScraper {
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    pages: Vec<Vec<String>>,
    calls: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl ScriptedScraper {
    fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    fn with_pages(mut self, pages: &[&[&str]]) -> Self {
        self.pages = pages
            .iter()
            .map(|p| p.iter().map(|s| s.to_string()).collect())
            .collect();
        self
    }
}

#[async_trait]
impl StockScraper for ScriptedScraper {
    fn provider_code(&self) -> &'static str {
        "SCRIPTED"
    }

    async fn fetch_symbol_page(&self, page: u32) -> Result<Vec<String>> {
        Ok(self.pages.get(page as usize - 1).cloned().unwrap_or_default())
    }

    async fn fetch_daily(&self, item: &WorkItem) -> Result<Vec<DailyData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&item.symbol) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.lock().unwrap().push(item.symbol.clone());

        if self.failing.contains(&item.symbol) {
            return Err(CrawlerError::DataError(format!("simulated failure for {}", item.symbol)));
        }

        Ok(vec![DailyData {
            date: util::naive_date_to_int(item.start),
            open: 10.0,
            high: 10.5,
            low: 9.5,
            close: 10.2,
            volume: 1_000,
            amount: 10_200,
        }])
    }
}

fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("1.{:06}", 600000 + i)).collect()
}

fn never_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // 发送端释放后 worker 不会再收到关闭信号
    drop(tx);
    rx
}

async fn run(config: Config, scraper: Arc<ScriptedScraper>, symbols: &[String], range: DateRange) -> (Result<ashare_crawler::CrawlStats>, Vec<FetchResult>) {
    let sink = MemorySink::new();
    let service = CrawlService::new(config, scraper);
    let stats = service
        .run_with_sink(symbols, range, Box::new(sink.clone()), never_shutdown())
        .await;
    (stats, sink.records())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_work_item_yields_exactly_one_result() {
    let range = DateRange::parse("20230101", "20230111").unwrap();
    let symbols = symbols(7);

    for workers in [1, 3, 16] {
        let scraper = Arc::new(ScriptedScraper::default());
        let config = Config::new().with_num_crawler(workers).with_queue_capacity(4).with_write_batch_size(5);
        let (stats, records) = run(config, scraper.clone(), &symbols, range).await;

        let stats = stats.unwrap();
        assert_eq!(stats.expected, 70);
        assert_eq!(stats.received, 70);
        assert_eq!(records.len(), 70);
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 70);

        let unique: HashSet<_> = records.iter().map(|r| r.item.clone()).collect();
        assert_eq!(unique.len(), 70, "duplicate results with {} workers", workers);
        assert!(records.iter().all(|r| r.is_success()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn output_follows_arrival_order_not_submission_order() {
    let range = DateRange::parse("20230103", "20230104").unwrap();
    let list = vec!["slow".to_string(), "fast".to_string()];
    let scraper = Arc::new(
        ScriptedScraper::default().with_delay("slow", Duration::from_millis(300)),
    );

    let config = Config::new().with_num_crawler(2).with_write_batch_size(1);
    let (stats, records) = run(config, scraper.clone(), &list, range).await;

    stats.unwrap();
    let written: Vec<_> = records.iter().map(|r| r.item.symbol.clone()).collect();
    assert_eq!(written, vec!["fast", "slow"]);
    assert_eq!(*scraper.completed.lock().unwrap(), written);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_item_does_not_stop_the_run() {
    let range = DateRange::parse("20230103", "20230105").unwrap();
    let list = symbols(4);
    let scraper = Arc::new(ScriptedScraper::default().with_failure("1.600002"));

    let config = Config::new().with_num_crawler(3).with_max_retry(2);
    let (stats, records) = run(config, scraper.clone(), &list, range).await;

    let stats = stats.unwrap();
    assert_eq!(stats.received, 8);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 6);
    // 失败的两个任务各尝试两次
    assert_eq!(scraper.calls.load(Ordering::SeqCst), 6 + 2 * 2);

    for record in &records {
        if record.item.symbol == "1.600002" {
            assert_eq!(record.status(), "failed");
            assert_eq!(record.attempts, 2);
            assert!(record.error().unwrap().contains("simulated failure"));
        } else {
            assert_eq!(record.status(), "ok");
            assert_eq!(record.daily()[0].date, util::naive_date_to_int(record.item.start));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_pending_items_but_accounts_for_all() {
    let range = DateRange::parse("20230101", "20230201").unwrap();
    let list = symbols(3);
    let scraper = Arc::new(ScriptedScraper::default());
    let (tx, rx) = watch::channel(true);

    let sink = MemorySink::new();
    let service = CrawlService::new(Config::new().with_num_crawler(2), scraper.clone());
    let stats = service
        .run_with_sink(&list, range, Box::new(sink.clone()), rx)
        .await
        .unwrap();
    drop(tx);

    assert_eq!(stats.received, 93);
    assert_eq!(stats.failed, 93);
    assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
    assert!(sink.records().iter().all(|r| r.error() == Some("cancelled")));
    assert!(sink.is_finished());
}

#[tokio::test]
async fn empty_symbol_list_terminates_immediately() {
    let range = DateRange::parse("20230101", "20230103").unwrap();
    let scraper = Arc::new(ScriptedScraper::default());
    let (stats, records) = run(Config::new().with_num_crawler(4), scraper, &[], range).await;

    assert_eq!(stats.unwrap().received, 0);
    assert!(records.is_empty());
}

struct FailingSink;

impl ResultSink for FailingSink {
    fn append(&mut self, _results: &[FetchResult]) -> Result<()> {
        Err(CrawlerError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device")))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writer_failure_is_fatal() {
    let range = DateRange::parse("20230101", "20230111").unwrap();
    let scraper = Arc::new(ScriptedScraper::default());
    let service = CrawlService::new(
        Config::new().with_num_crawler(2).with_queue_capacity(1).with_write_batch_size(1),
        scraper,
    );

    let err = service
        .run_with_sink(&symbols(5), range, Box::new(FailingSink), never_shutdown())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlerError::IoError(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_pages_symbols_and_writes_arrow_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("ashare.arrow");
    let scraper = Arc::new(
        ScriptedScraper::default()
            .with_pages(&[&["1.600000", "0.000001"], &["0.300750"]])
            .with_failure("0.000001"),
    );

    let config = Config::new()
        .with_num_crawler(2)
        .with_max_retry(1)
        .with_save_fp(path.to_str().unwrap());
    let service = CrawlService::new(config, scraper);

    let resolved = service.resolve_symbols().await.unwrap();
    assert_eq!(resolved, vec!["1.600000", "0.000001", "0.300750"]);

    let range = DateRange::parse("20230103", "20230105").unwrap();
    let stats = service.run(range, never_shutdown()).await.unwrap();
    assert_eq!(stats.received, 6);

    let written = arrow_utils::read_fetch_results_from_arrow(&path).unwrap();
    assert_eq!(written.len(), 6);
    let failed: Vec<_> = written.iter().filter(|r| r.status() == "failed").collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|r| r.item.symbol == "0.000001" && r.daily().is_empty()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_symbols_skip_the_list_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ashare.jsonl");
    let scraper = Arc::new(ScriptedScraper::default().with_pages(&[&["1.600000", "0.000001"]]));

    let config = Config::new()
        .with_num_crawler(2)
        .with_symbols(vec!["0.300750".to_string()])
        .with_save_fp(path.to_str().unwrap());
    let service = CrawlService::new(config, scraper);

    assert_eq!(service.resolve_symbols().await.unwrap(), vec!["0.300750"]);

    let range = DateRange::parse("20230103", "20230105").unwrap();
    let stats = service.run(range, never_shutdown()).await.unwrap();
    assert_eq!(stats.received, 2);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().all(|l| l.contains("\"symbol\":\"0.300750\"")));
}
