pub mod relay;
pub mod storage;
