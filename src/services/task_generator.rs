use crate::config::Config;
use crate::models::task::{DateRange, WorkItem};
use log::{debug, info};
use std::collections::HashSet;

/// 根据股票列表和日期区间生成抓取任务
pub struct TaskGenerator {
    days_per_item: u32,
}

impl TaskGenerator {
    pub fn new(config: &Config) -> Self {
        Self { days_per_item: config.days_per_item.max(1) }
    }

    /// 每只股票按 days_per_item 切分日期区间，重复的股票代码只保留一次
    pub fn generate(&self, symbols: &[String], range: &DateRange) -> Vec<WorkItem> {
        let chunks = range.chunks(self.days_per_item);
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(symbols.len() * chunks.len());

        for symbol in symbols {
            let symbol = symbol.trim();
            if symbol.is_empty() || !seen.insert(symbol) {
                debug!("Skipping blank or duplicate symbol {:?}", symbol);
                continue;
            }
            items.extend(chunks.iter().map(|chunk| WorkItem::new(symbol, *chunk)));
        }

        info!(
            "Generated {} work items for {} symbols in {}",
            items.len(),
            seen.len(),
            range
        );
        items
    }
}
