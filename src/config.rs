use crate::errors::{CrawlerError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// K线中必须能按名称找到的列
pub const REQUIRED_STOCK_COLS: [&str; 7] = ["date", "open", "close", "high", "low", "volume", "amount"];

/// 数据源相关设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub stock_url: String,
    pub list_url: String,
    pub stock_params: BTreeMap<String, String>,
    pub list_params: BTreeMap<String, String>,
    /// K线每一列的名称，按响应中的顺序
    pub stock_cols: Vec<String>,
    pub request_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let stock_params = [
            ("fields1", "f1,f2,f3,f4,f5,f6"),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61"),
            ("klt", "101"),
            ("fqt", "1"),
        ];
        let list_params = [
            ("pz", "500"),
            ("po", "1"),
            ("np", "1"),
            ("fltt", "2"),
            ("fid", "f12"),
            ("fs", "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23"),
            ("fields", "f12,f13"),
        ];

        Self {
            stock_url: "https://push2his.eastmoney.com/api/qt/stock/kline/get".to_string(),
            list_url: "https://push2.eastmoney.com/api/qt/clist/get".to_string(),
            stock_params: stock_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            list_params: list_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            stock_cols: [
                "date", "open", "close", "high", "low", "volume", "amount",
                "amplitude", "change_pct", "change", "turnover",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            request_interval_ms: 200,
            timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 爬虫运行配置，启动时加载一次，之后以值的形式传入各组件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub num_crawler: usize,
    pub save_fp: String,
    pub max_retry: u32,
    pub queue_capacity: usize,
    pub write_batch_size: usize,
    pub days_per_item: u32,
    /// 为空时从列表接口分页获取全部股票
    pub symbols: Vec<String>,
    pub log_level: String,
    pub provider: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            num_crawler: 4,
            save_fp: "data/ashare.arrow".to_string(),
            max_retry: 3,
            queue_capacity: 1024,
            write_batch_size: 32,
            days_per_item: 1,
            symbols: Vec::new(),
            log_level: "info".to_string(),
            provider: ProviderConfig::default(),
        }
    }

    /// 从TOML配置文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_crawler == 0 {
            return Err(CrawlerError::ConfigError("num_crawler must be at least 1".to_string()));
        }
        if self.save_fp.trim().is_empty() {
            return Err(CrawlerError::ConfigError("save_fp must not be empty".to_string()));
        }
        if self.max_retry == 0 {
            return Err(CrawlerError::ConfigError("max_retry must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(CrawlerError::ConfigError("queue_capacity must be at least 1".to_string()));
        }
        if self.write_batch_size == 0 {
            return Err(CrawlerError::ConfigError("write_batch_size must be at least 1".to_string()));
        }
        if self.days_per_item == 0 {
            return Err(CrawlerError::ConfigError("days_per_item must be at least 1".to_string()));
        }
        if let Some(missing) = REQUIRED_STOCK_COLS
            .iter()
            .find(|name| !self.provider.stock_cols.iter().any(|c| c.as_str() == **name))
        {
            return Err(CrawlerError::ConfigError(format!(
                "provider.stock_cols must contain a \"{}\" column", missing
            )));
        }
        Ok(())
    }

    pub fn with_num_crawler(mut self, num_crawler: usize) -> Self {
        self.num_crawler = num_crawler;
        self
    }

    pub fn with_save_fp(mut self, save_fp: &str) -> Self {
        self.save_fp = save_fp.to_string();
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size;
        self
    }

    pub fn with_days_per_item(mut self, days: u32) -> Self {
        self.days_per_item = days;
        self
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }
}
