use crate::config::ProviderConfig;
use crate::errors::{CrawlerError, Result};
use crate::models::stock::DailyData;
use crate::models::task::WorkItem;
use crate::scrapers::base::StockScraper;
use crate::util;
use async_trait::async_trait;
use chrono::{Days, Utc};
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Instant;

/// 东方财富行情数据抓取器
pub struct EastMoneyScraper {
    client: Client,
    settings: ProviderConfig,
    last_request: Mutex<Option<Instant>>,
}

impl EastMoneyScraper {
    pub fn new(settings: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(CrawlerError::RequestError)?;

        Ok(Self {
            client,
            settings,
            last_request: Mutex::new(None),
        })
    }

    /// 等待请求频率限制，多个worker共享同一个抓取器时依次排队
    async fn wait_for_rate_limit(&self) {
        let min_interval = self.settings.request_interval();

        let should_wait = {
            let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            // 预约下一个可用的请求时刻
            let slot = match *last {
                Some(prev) if prev + min_interval > now => prev + min_interval,
                _ => now,
            };
            *last = Some(slot);
            slot.checked_duration_since(now).filter(|d| !d.is_zero())
        };

        if let Some(wait_time) = should_wait {
            debug!("等待 {:?} 以遵守频率限制", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    async fn get_json(&self, url: &str, params: Vec<(String, String)>) -> Result<Value> {
        self.wait_for_rate_limit().await;

        let response = self.client
            .get(url)
            .query(&params)
            .header("Referer", "https://quote.eastmoney.com/")
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn cache_buster() -> (String, String) {
    ("_".to_string(), Utc::now().timestamp_millis().to_string())
}

/// 解析股票列表接口的响应，`data` 为 null 表示已经没有更多页
pub fn parse_list_response(json: &Value) -> Result<Vec<String>> {
    let data = match json.get("data") {
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(data) => data,
    };

    let entries: Vec<&Value> = match data.get("diff") {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(CrawlerError::DataError(format!("Unexpected diff field: {}", other)));
        }
    };

    entries
        .into_iter()
        .map(|entry| -> Result<String> {
            let market = entry
                .get("f13")
                .and_then(Value::as_i64)
                .ok_or_else(|| CrawlerError::DataError(format!("Missing market id in {}", entry)))?;
            let code = match entry.get("f12") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => format!("{:06}", n.as_u64().unwrap_or_default()),
                _ => return Err(CrawlerError::DataError(format!("Missing stock code in {}", entry))),
            };
            Ok(format!("{}.{}", market, code))
        })
        .collect()
}

fn column_value<'a>(fields: &[&'a str], cols: &[String], name: &str) -> Result<&'a str> {
    let idx = cols
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| CrawlerError::DataError(format!("Column {} is not in stock_cols", name)))?;
    let value = fields
        .get(idx)
        .copied()
        .map(str::trim)
        .unwrap_or_default();
    // 空值或 "-" 不能当作0写入
    if value.is_empty() || value == "-" {
        return Err(CrawlerError::DataError(format!("Column {} has no value", name)));
    }
    Ok(value)
}

fn parse_price(fields: &[&str], cols: &[String], name: &str) -> Result<f32> {
    Ok(column_value(fields, cols, name)?.parse::<f32>()?)
}

fn parse_quantity(fields: &[&str], cols: &[String], name: &str) -> Result<f64> {
    Ok(column_value(fields, cols, name)?.parse::<f64>()?)
}

/// 解析K线接口的响应，只保留 WorkItem 区间内的记录，按日期降序
pub fn parse_kline_response(json: &Value, cols: &[String], item: &WorkItem) -> Result<Vec<DailyData>> {
    let data = match json.get("data") {
        Some(Value::Null) | None => {
            return Err(CrawlerError::DataError(format!("No data returned for {}", item.symbol)));
        }
        Some(data) => data,
    };

    let klines = match data.get("klines") {
        Some(Value::Array(klines)) => klines,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(CrawlerError::DataError(format!("Unexpected klines field: {}", other)));
        }
    };

    let mut daily_data = Vec::new();
    for line in klines {
        let line = line
            .as_str()
            .ok_or_else(|| CrawlerError::DataError(format!("Kline row is not a string: {}", line)))?;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < cols.len() {
            return Err(CrawlerError::DataError(format!(
                "Kline row has {} columns, expected {}: {}", fields.len(), cols.len(), line
            )));
        }

        let date_str = column_value(&fields, cols, "date")?;
        let date = util::date_string_to_int(&date_str.replace('-', ""))?;
        if !item.contains(util::int_to_naive_date(date)?) {
            continue;
        }

        daily_data.push(DailyData {
            date,
            open: parse_price(&fields, cols, "open")?,
            high: parse_price(&fields, cols, "high")?,
            low: parse_price(&fields, cols, "low")?,
            close: parse_price(&fields, cols, "close")?,
            // 接口返回的成交量单位为手
            volume: (parse_quantity(&fields, cols, "volume")? * 100.0).round() as i64,
            amount: parse_quantity(&fields, cols, "amount")?.round() as i64,
        });
    }

    // 按日期降序排序
    daily_data.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(daily_data)
}

#[async_trait]
impl StockScraper for EastMoneyScraper {
    fn provider_code(&self) -> &'static str {
        "EASTMONEY"
    }

    async fn fetch_symbol_page(&self, page: u32) -> Result<Vec<String>> {
        let mut params: Vec<(String, String)> = self.settings.list_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.push(("pn".to_string(), page.to_string()));
        params.push(cache_buster());

        let json = self.get_json(&self.settings.list_url, params).await?;
        let symbols = parse_list_response(&json)?;

        info!("股票列表第 {} 页获取到 {} 支股票", page, symbols.len());
        Ok(symbols)
    }

    async fn fetch_daily(&self, item: &WorkItem) -> Result<Vec<DailyData>> {
        debug!("获取股票 {} 的日K线数据", item);

        // 接口的 end 参数是闭区间
        let last_day = item
            .end
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| CrawlerError::DataError(format!("Invalid end date in {}", item)))?;

        let mut params: Vec<(String, String)> = self.settings.stock_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.push(("secid".to_string(), item.symbol.clone()));
        params.push(("beg".to_string(), item.start.format("%Y%m%d").to_string()));
        params.push(("end".to_string(), last_day.format("%Y%m%d").to_string()));
        params.push(cache_buster());

        let json = self.get_json(&self.settings.stock_url, params).await?;
        let daily_data = parse_kline_response(&json, &self.settings.stock_cols, item)?;

        debug!("{} 获取到 {} 条K线记录", item.symbol, daily_data.len());
        Ok(daily_data)
    }
}
