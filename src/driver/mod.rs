#[cfg(feature = "live")]
pub mod live;
pub mod offline;
