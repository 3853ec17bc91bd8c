pub mod base;
pub mod eastmoney;

pub use base::StockScraper;
pub use eastmoney::EastMoneyScraper;
