use chrono::{Datelike, NaiveDate};
use crate::errors::{CrawlerError, Result};

// 日期转换工具
pub fn date_string_to_int(date_str: &str) -> Result<i32> {
    date_str.parse::<i32>().map_err(|e| CrawlerError::DataError(e.to_string()))
}

pub fn naive_date_to_int(date: NaiveDate) -> i32 {
    date.year() * 10000 + date.month() as i32 * 100 + date.day() as i32
}

pub fn int_to_naive_date(date_int: i32) -> Result<NaiveDate> {
    let date_str = date_int.to_string();
    if date_str.len() != 8 {
        return Err(CrawlerError::DataError(format!("Invalid date format: {}", date_str)));
    }

    let year = date_str[0..4].parse::<i32>()
        .map_err(|e| CrawlerError::DataError(e.to_string()))?;
    let month = date_str[4..6].parse::<u32>()
        .map_err(|e| CrawlerError::DataError(e.to_string()))?;
    let day = date_str[6..8].parse::<u32>()
        .map_err(|e| CrawlerError::DataError(e.to_string()))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| CrawlerError::DataError(format!("Invalid date: {}-{}-{}", year, month, day)))
}

/// 解析命令行中 YYYYMMDD 格式的日期
pub fn parse_compact_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y%m%d")?)
}

// Arrow数据转换工具
pub mod arrow_utils {
    use super::*;
    use crate::models::stock::DailyData;
    use crate::models::task::{FetchOutcome, FetchResult, WorkItem};
    use arrow::array::{ArrayRef, StringBuilder};
    use arrow::buffer::{NullBuffer, OffsetBuffer, ScalarBuffer};
    use arrow::ipc::reader::FileReader;
    use arrow::record_batch::RecordBatch;
    use arrow_array::{Array, Float32Array, Int32Array, Int64Array, ListArray, StringArray, StructArray, UInt32Array};
    use arrow_schema::{DataType, Field, Fields, Schema, SchemaRef};
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    fn daily_fields() -> Fields {
        Fields::from(vec![
            Field::new("date", DataType::Int32, false),
            Field::new("open", DataType::Float32, false),
            Field::new("high", DataType::Float32, false),
            Field::new("low", DataType::Float32, false),
            Field::new("close", DataType::Float32, false),
            Field::new("volume", DataType::Int64, false),
            Field::new("amount", DataType::Int64, false),
        ])
    }

    fn daily_item_field() -> Arc<Field> {
        Arc::new(Field::new("item", DataType::Struct(daily_fields()), false))
    }

    /// 输出文件的Schema，每行对应一个 FetchResult
    pub fn fetch_result_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("symbol", DataType::Utf8, false),
            Field::new("start", DataType::Int32, false),
            Field::new("end", DataType::Int32, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("error", DataType::Utf8, true),
            Field::new("attempts", DataType::UInt32, false),
            Field::new("daily", DataType::List(daily_item_field()), true),
        ]))
    }

    // 将抓取结果转换为Arrow记录批次，行顺序与输入一致
    pub fn fetch_results_to_record_batch(results: &[FetchResult]) -> Result<RecordBatch> {
        let mut symbol_builder = StringBuilder::new();
        let mut status_builder = StringBuilder::new();
        let mut error_builder = StringBuilder::new();
        let mut start_values = Vec::with_capacity(results.len());
        let mut end_values = Vec::with_capacity(results.len());
        let mut attempt_values = Vec::with_capacity(results.len());

        let mut date_values = Vec::new();
        let mut open_values = Vec::new();
        let mut high_values = Vec::new();
        let mut low_values = Vec::new();
        let mut close_values = Vec::new();
        let mut volume_values = Vec::new();
        let mut amount_values = Vec::new();
        let mut offsets = vec![0i32];
        let mut validity = Vec::with_capacity(results.len());

        for result in results {
            symbol_builder.append_value(&result.item.symbol);
            start_values.push(naive_date_to_int(result.item.start));
            end_values.push(naive_date_to_int(result.item.end));
            status_builder.append_value(result.status());
            error_builder.append_option(result.error());
            attempt_values.push(result.attempts);

            for daily in result.daily() {
                date_values.push(daily.date);
                open_values.push(daily.open);
                high_values.push(daily.high);
                low_values.push(daily.low);
                close_values.push(daily.close);
                volume_values.push(daily.volume);
                amount_values.push(daily.amount);
            }

            let last = offsets.last().copied().unwrap_or_default();
            offsets.push(last + result.daily().len() as i32);
            // 失败记录的daily列为null，与“成功但无数据”区分开
            validity.push(result.is_success());
        }

        let struct_array = StructArray::try_new(
            daily_fields(),
            vec![
                Arc::new(Int32Array::from(date_values)),
                Arc::new(Float32Array::from(open_values)),
                Arc::new(Float32Array::from(high_values)),
                Arc::new(Float32Array::from(low_values)),
                Arc::new(Float32Array::from(close_values)),
                Arc::new(Int64Array::from(volume_values)),
                Arc::new(Int64Array::from(amount_values)),
            ],
            None,
        )?;

        let list_array = ListArray::try_new(
            daily_item_field(),
            OffsetBuffer::new(ScalarBuffer::from(offsets)),
            Arc::new(struct_array),
            Some(NullBuffer::from(validity)),
        )?;

        let columns: Vec<ArrayRef> = vec![
            Arc::new(symbol_builder.finish()),
            Arc::new(Int32Array::from(start_values)),
            Arc::new(Int32Array::from(end_values)),
            Arc::new(status_builder.finish()),
            Arc::new(error_builder.finish()),
            Arc::new(UInt32Array::from(attempt_values)),
            Arc::new(list_array),
        ];

        Ok(RecordBatch::try_new(fetch_result_schema(), columns)?)
    }

    fn downcast_column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
            .ok_or_else(|| CrawlerError::ArrowError(format!("Failed to downcast {} column", name)))
    }

    fn read_daily(list: &ListArray, row: usize) -> Result<Vec<DailyData>> {
        let values = list.value(row);
        let daily_struct = values
            .as_any()
            .downcast_ref::<StructArray>()
            .ok_or_else(|| CrawlerError::ArrowError("Failed to downcast daily struct".to_string()))?;

        let column = |name: &str| {
            daily_struct
                .column_by_name(name)
                .ok_or_else(|| CrawlerError::ArrowError(format!("Missing daily column {}", name)))
        };
        let date = column("date")?.as_any().downcast_ref::<Int32Array>();
        let open = column("open")?.as_any().downcast_ref::<Float32Array>();
        let high = column("high")?.as_any().downcast_ref::<Float32Array>();
        let low = column("low")?.as_any().downcast_ref::<Float32Array>();
        let close = column("close")?.as_any().downcast_ref::<Float32Array>();
        let volume = column("volume")?.as_any().downcast_ref::<Int64Array>();
        let amount = column("amount")?.as_any().downcast_ref::<Int64Array>();

        let (Some(date), Some(open), Some(high), Some(low), Some(close), Some(volume), Some(amount)) =
            (date, open, high, low, close, volume, amount)
        else {
            return Err(CrawlerError::ArrowError("Unexpected daily column types".to_string()));
        };

        Ok((0..daily_struct.len())
            .map(|j| DailyData {
                date: date.value(j),
                open: open.value(j),
                high: high.value(j),
                low: low.value(j),
                close: close.value(j),
                volume: volume.value(j),
                amount: amount.value(j),
            })
            .collect())
    }

    /// 将记录批次还原为抓取结果
    pub fn record_batch_to_fetch_results(batch: &RecordBatch) -> Result<Vec<FetchResult>> {
        let symbol = downcast_column::<StringArray>(batch, "symbol")?;
        let start = downcast_column::<Int32Array>(batch, "start")?;
        let end = downcast_column::<Int32Array>(batch, "end")?;
        let status = downcast_column::<StringArray>(batch, "status")?;
        let error = downcast_column::<StringArray>(batch, "error")?;
        let attempts = downcast_column::<UInt32Array>(batch, "attempts")?;
        let daily = downcast_column::<ListArray>(batch, "daily")?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let item = WorkItem {
                symbol: symbol.value(i).to_string(),
                start: int_to_naive_date(start.value(i))?,
                end: int_to_naive_date(end.value(i))?,
            };

            let outcome = if status.value(i) == "failed" {
                let cause = if error.is_null(i) { "" } else { error.value(i) };
                FetchOutcome::Failure(cause.to_string())
            } else if daily.is_null(i) {
                FetchOutcome::Success(Vec::new())
            } else {
                FetchOutcome::Success(read_daily(daily, i)?)
            };

            results.push(FetchResult { item, attempts: attempts.value(i), outcome });
        }

        Ok(results)
    }

    // 从Arrow文件读取抓取结果
    pub fn read_fetch_results_from_arrow<P: AsRef<Path>>(path: P) -> Result<Vec<FetchResult>> {
        let file = File::open(path.as_ref())?;
        let reader = FileReader::try_new(file, None)?;

        let mut results = Vec::new();
        for batch in reader {
            results.extend(record_batch_to_fetch_results(&batch?)?);
        }
        Ok(results)
    }
}
