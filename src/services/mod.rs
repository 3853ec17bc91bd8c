pub mod task_generator;
pub mod worker_pool;
pub mod writer;
pub mod crawl_service;

pub use crawl_service::CrawlService;
