pub mod batches;
pub mod uploads;
