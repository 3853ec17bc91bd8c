use ashare_crawler::config::Config;
use ashare_crawler::models::task::DateRange;
use ashare_crawler::scrapers::base::StockScraper;
use ashare_crawler::scrapers::eastmoney::EastMoneyScraper;
use ashare_crawler::services::crawl_service::CrawlService;

use anyhow::Context;
use clap::{App, Arg};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = App::new("start_crawler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download stocks' data in the given range")
        .arg(
            Arg::with_name("start")
                .short('s')
                .long("start")
                .value_name("START")
                .help("Start date (include) in format YYYYMMDD")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("end")
                .short('e')
                .long("end")
                .value_name("END")
                .help("End date (exclude) in format YYYYMMDD")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short('c')
                .long("config")
                .value_name("CONFIG")
                .help("Path of the TOML config file")
                .takes_value(true)
                .default_value("./config/main.toml"),
        )
        .get_matches();

    // 日期区间在读取配置之前校验
    let start = matches.value_of("start").unwrap_or_default();
    let end = matches.value_of("end").unwrap_or_default();
    let range = DateRange::parse(start, end)
        .with_context(|| format!("invalid date range {} - {}", start, end))?;

    let config_path = matches.value_of("config").unwrap_or("./config/main.toml");
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path))?;

    // RUST_LOG 优先于配置文件中的日志级别
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    let scraper: Arc<dyn StockScraper + Send + Sync> = Arc::new(EastMoneyScraper::new(config.provider.clone())?);
    let service = CrawlService::new(config, scraper);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling pending work items...");
            let _ = shutdown_tx.send(true);
        }
    });

    let stats = service
        .run(range, shutdown_rx)
        .await
        .with_context(|| format!("crawl of {} failed", range))?;

    info!(
        "{}/{} work items saved to {}",
        stats.received - stats.failed,
        stats.expected,
        service.config().save_fp
    );
    Ok(())
}
