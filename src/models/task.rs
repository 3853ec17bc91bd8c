use crate::errors::{CrawlerError, Result};
use crate::models::stock::DailyData;
use crate::util;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt;

/// 左闭右开的日期区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(CrawlerError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// 从 YYYYMMDD 格式的字符串解析
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(util::parse_compact_date(start)?, util::parse_compact_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 按 days_per_chunk 天切分区间，最后一段可能更短
    pub fn chunks(&self, days_per_chunk: u32) -> Vec<DateRange> {
        let step = Days::new(u64::from(days_per_chunk.max(1)));
        let mut chunks = Vec::new();
        let mut cursor = self.start;

        while cursor < self.end {
            let next = cursor
                .checked_add_days(step)
                .map_or(self.end, |d| d.min(self.end));
            chunks.push(DateRange { start: cursor, end: next });
            cursor = next;
        }

        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// 一个抓取单元：一只股票加一个日期区间
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkItem {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WorkItem {
    pub fn new(symbol: &str, range: DateRange) -> Self {
        Self {
            symbol: symbol.to_string(),
            start: range.start(),
            end: range.end(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@[{}, {})", self.symbol, self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FetchOutcome {
    Success(Vec<DailyData>),
    Failure(String),
}

/// 一个 WorkItem 的处理结果，每个 WorkItem 恰好产生一个
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub item: WorkItem,
    pub attempts: u32,
    pub outcome: FetchOutcome,
}

pub const CANCELLED_CAUSE: &str = "cancelled";

impl FetchResult {
    pub fn success(item: WorkItem, attempts: u32, daily: Vec<DailyData>) -> Self {
        Self { item, attempts, outcome: FetchOutcome::Success(daily) }
    }

    pub fn failure(item: WorkItem, attempts: u32, cause: impl Into<String>) -> Self {
        Self { item, attempts, outcome: FetchOutcome::Failure(cause.into()) }
    }

    pub fn cancelled(item: WorkItem, attempts: u32) -> Self {
        Self::failure(item, attempts, CANCELLED_CAUSE)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Success(_))
    }

    pub fn daily(&self) -> &[DailyData] {
        match &self.outcome {
            FetchOutcome::Success(daily) => daily,
            FetchOutcome::Failure(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Failure(cause) => Some(cause),
        }
    }

    /// 写入文件的状态列：ok / empty / failed
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            FetchOutcome::Success(daily) if daily.is_empty() => "empty",
            FetchOutcome::Success(_) => "ok",
            FetchOutcome::Failure(_) => "failed",
        }
    }
}

/// 结果队列中传递的消息
#[derive(Debug)]
pub enum QueueMessage {
    Result(FetchResult),
    /// 某个 worker 已经没有更多任务
    Sentinel { worker_id: usize },
    /// 要求 writer 立即收尾退出
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        util::parse_compact_date(s).unwrap()
    }

    #[test]
    fn rejects_empty_and_reversed_ranges() {
        assert!(matches!(
            DateRange::parse("20230103", "20230103"),
            Err(CrawlerError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            DateRange::parse("20230105", "20230101"),
            Err(CrawlerError::InvalidDateRange { .. })
        ));
        assert!(DateRange::parse("2023-01-01", "20230105").is_err());
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        let range = DateRange::parse("20230130", "20230206").unwrap();

        let chunks = range.chunks(3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start(), date("20230130"));
        assert_eq!(chunks[0].end(), date("20230202"));
        assert_eq!(chunks[1].start(), date("20230202"));
        assert_eq!(chunks[2].start(), date("20230205"));
        assert_eq!(chunks[2].end(), date("20230206"));

        assert_eq!(range.chunks(1).len(), 7);
        assert_eq!(range.chunks(0).len(), 7);
        assert_eq!(range.chunks(100), vec![range]);
    }

    #[test]
    fn result_status_reflects_outcome() {
        let item = WorkItem::new("1.600000", DateRange::parse("20230101", "20230102").unwrap());
        let bar = DailyData { date: 20230101, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1, amount: 1 };

        assert_eq!(FetchResult::success(item.clone(), 1, vec![bar]).status(), "ok");
        assert_eq!(FetchResult::success(item.clone(), 1, vec![]).status(), "empty");

        let failed = FetchResult::cancelled(item, 0);
        assert_eq!(failed.status(), "failed");
        assert_eq!(failed.error(), Some(CANCELLED_CAUSE));
        assert!(failed.daily().is_empty());
    }

    #[test]
    fn work_item_bounds_are_half_open() {
        let item = WorkItem::new("0.000001", DateRange::parse("20230101", "20230103").unwrap());
        assert!(item.contains(date("20230101")));
        assert!(item.contains(date("20230102")));
        assert!(!item.contains(date("20230103")));
        assert_eq!(item.to_string(), "0.000001@[2023-01-01, 2023-01-03)");
    }
}
