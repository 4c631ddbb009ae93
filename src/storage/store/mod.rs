pub mod account;
pub mod engine;
pub mod migrations;
pub mod storage_cache;
pub mod stores;

#[cfg(test)]
pub mod test_helper;

#[cfg(test)]
mod engine_tests;
