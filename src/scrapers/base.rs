use crate::models::stock::DailyData;
use crate::models::task::WorkItem;
use crate::errors::Result;
use async_trait::async_trait;

/// Base trait for stock data scrapers
#[async_trait]
pub trait StockScraper {
    /// Get the provider code this scraper is for
    fn provider_code(&self) -> &'static str;

    /// Fetch one page of the symbol universe, an empty page marks the end
    async fn fetch_symbol_page(&self, page: u32) -> Result<Vec<String>>;

    /// Fetch daily data of `item.symbol` within `[item.start, item.end)`
    async fn fetch_daily(&self, item: &WorkItem) -> Result<Vec<DailyData>>;
}
