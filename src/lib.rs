// 公开导出的模块，供外部使用
pub mod models;
pub mod errors;
pub mod config;
pub mod services;
pub mod scrapers;
pub mod stats;

#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use models::stock::DailyData;
pub use models::task::{DateRange, FetchOutcome, FetchResult, QueueMessage, WorkItem};
pub use config::{Config, ProviderConfig};
pub use errors::{Result, CrawlerError};
pub use services::CrawlService;
pub use stats::CrawlStats;
