pub mod stock;
pub mod task;
