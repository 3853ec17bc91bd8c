//! 抓取统计

use crate::models::task::FetchResult;
use log::info;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    /// 生成的 WorkItem 数量
    pub expected: usize,
    /// writer 收到的结果数量
    pub received: usize,
    pub succeeded: usize,
    /// 成功但区间内没有数据（停牌、节假日）
    pub empty: usize,
    pub failed: usize,
    pub total_klines: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CrawlStats {
    pub fn new(expected: usize) -> Self {
        Self { expected, ..Self::default() }
    }

    pub fn record(&mut self, result: &FetchResult) {
        self.received += 1;
        match result.status() {
            "ok" => {
                self.succeeded += 1;
                self.total_klines += result.daily().len();
            }
            "empty" => self.empty += 1,
            _ => self.failed += 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    pub fn success_rate(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            (self.succeeded + self.empty) as f64 / self.received as f64 * 100.0
        }
    }

    pub fn log_summary(&self) {
        info!(
            "{}/{} work items retrieved: {} with data, {} empty, {} failed, {} klines, success rate {:.1}%, elapsed {:.1}s",
            self.received,
            self.expected,
            self.succeeded,
            self.empty,
            self.failed,
            self.total_klines,
            self.success_rate(),
            self.elapsed.as_secs_f64()
        );
    }
}
