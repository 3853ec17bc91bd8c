use crate::errors::Result;
use crate::models::task::{FetchResult, QueueMessage};
use crate::stats::CrawlStats;
use crate::util::arrow_utils;
use arrow_ipc::writer::FileWriter;
use arrow_json::LineDelimitedWriter;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const PROGRESS_EVERY: usize = 100;

/// 结果的落盘目标，只由writer线程访问
pub trait ResultSink: Send {
    /// 按顺序追加一批结果
    fn append(&mut self, results: &[FetchResult]) -> Result<()>;

    /// 刷新并关闭
    fn finish(self: Box<Self>) -> Result<()>;

    /// 输出文件的位置，内存中的sink没有
    fn location(&self) -> Option<&Path> {
        None
    }
}

fn create_output_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Arrow IPC 文件，关闭时写入footer
pub struct ArrowFileSink {
    path: PathBuf,
    writer: FileWriter<BufWriter<File>>,
}

impl ArrowFileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = create_output_file(&path)?;
        let writer = FileWriter::try_new(file, &arrow_utils::fetch_result_schema())?;
        Ok(Self { path, writer })
    }
}

impl ResultSink for ArrowFileSink {
    fn append(&mut self, results: &[FetchResult]) -> Result<()> {
        let batch = arrow_utils::fetch_results_to_record_batch(results)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut writer = self.writer;
        writer.finish()?;
        writer.into_inner()?.flush()?;
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// 每行一个JSON对象
pub struct JsonLinesSink {
    path: PathBuf,
    writer: LineDelimitedWriter<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = create_output_file(&path)?;
        Ok(Self { path, writer: LineDelimitedWriter::new(file) })
    }
}

impl ResultSink for JsonLinesSink {
    fn append(&mut self, results: &[FetchResult]) -> Result<()> {
        let batch = arrow_utils::fetch_results_to_record_batch(results)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut writer = self.writer;
        writer.finish()?;
        writer.into_inner().flush()?;
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// 内存中的结果，主要用于测试和嵌入调用
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FetchResult>>>,
    finished: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FetchResult> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, results: &[FetchResult]) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(results);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }
}

/// 根据扩展名选择输出格式：.jsonl/.json 为JSON行，其余为Arrow IPC
pub fn open_sink<P: AsRef<Path>>(path: P) -> Result<Box<dyn ResultSink>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    info!("Saving results to {}", path.display());
    match extension.as_deref() {
        Some("jsonl") | Some("json") => Ok(Box::new(JsonLinesSink::create(path)?)),
        _ => Ok(Box::new(ArrowFileSink::create(path)?)),
    }
}

/// 单线程写入器：按到达顺序把结果队列中的内容写入 ResultSink
pub struct Writer {
    sink: Box<dyn ResultSink>,
    num_producers: usize,
    expected: usize,
    batch_size: usize,
}

impl Writer {
    pub fn new(sink: Box<dyn ResultSink>, num_producers: usize, expected: usize, batch_size: usize) -> Self {
        Self {
            sink,
            num_producers,
            expected,
            batch_size: batch_size.max(1),
        }
    }

    /// 阻塞运行，直到收到所有worker的sentinel、收到 Shutdown 或所有发送端关闭
    pub fn run(mut self, mut rx: mpsc::Receiver<QueueMessage>) -> Result<CrawlStats> {
        info!("Writer starts, expecting {} results from {} workers", self.expected, self.num_producers);

        let mut stats = CrawlStats::new(self.expected);
        let mut buffer = Vec::with_capacity(self.batch_size);
        let mut sentinels = 0;

        while let Some(message) = rx.blocking_recv() {
            match message {
                QueueMessage::Result(result) => {
                    if let Some(cause) = result.error() {
                        warn!("Recording failed item {}: {}", result.item, cause);
                    }
                    stats.record(&result);
                    buffer.push(result);

                    if buffer.len() >= self.batch_size {
                        self.sink.append(&buffer)?;
                        buffer.clear();
                    }
                    if stats.received % PROGRESS_EVERY == 0 {
                        info!("Saving: {}/{} work items", stats.received, self.expected);
                    }
                }
                QueueMessage::Sentinel { worker_id } => {
                    sentinels += 1;
                    debug!("Worker {} finished ({}/{})", worker_id, sentinels, self.num_producers);
                    if sentinels >= self.num_producers {
                        break;
                    }
                }
                QueueMessage::Shutdown => {
                    info!("Writer received shutdown signal");
                    break;
                }
            }
        }

        if !buffer.is_empty() {
            self.sink.append(&buffer)?;
        }
        self.sink.finish()?;

        if !stats.is_complete() {
            warn!("Writer stopped with {}/{} results", stats.received, self.expected);
        }
        info!("Writer stopped after {} results", stats.received);
        Ok(stats)
    }
}
