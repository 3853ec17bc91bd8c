use serde::Serialize;

/// 日线数据结构
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyData {
    pub date: i32,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    /// 成交量（股）
    pub volume: i64,
    /// 成交额（元）
    pub amount: i64,
}
