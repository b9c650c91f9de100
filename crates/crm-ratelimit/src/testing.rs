//! Counter stores that fail, for exercising failure policies

use crate::store::{CounterOutcome, CounterStore, CounterStoreError, WindowOutcome, WindowSnapshot};
use async_trait::async_trait;
use std::time::Duration;

fn refused() -> CounterStoreError {
    CounterStoreError::Unavailable("connection refused".into())
}

/// Every call errors
pub(crate) struct BrokenStore;

#[async_trait]
impl CounterStore for BrokenStore {
    async fn check_and_record(&self, _: &str, _: i64, _: u64, _: u32) -> Result<WindowOutcome, CounterStoreError> {
        Err(refused())
    }

    async fn count(&self, _: &str, _: i64, _: u64) -> Result<WindowSnapshot, CounterStoreError> {
        Err(refused())
    }

    async fn clear(&self, _: &str) -> Result<(), CounterStoreError> {
        Err(refused())
    }

    async fn increment_below(&self, _: &str, _: i64, _: u32, _: i64) -> Result<CounterOutcome, CounterStoreError> {
        Err(refused())
    }

    async fn counter(&self, _: &str, _: i64) -> Result<u32, CounterStoreError> {
        Err(refused())
    }
}

/// Reads and writes never answer in time
pub(crate) struct HangingStore;

#[async_trait]
impl CounterStore for HangingStore {
    async fn check_and_record(&self, _: &str, _: i64, _: u64, _: u32) -> Result<WindowOutcome, CounterStoreError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(WindowOutcome { count: 0, admitted: true, oldest_ms: None })
    }

    async fn count(&self, _: &str, _: i64, _: u64) -> Result<WindowSnapshot, CounterStoreError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(WindowSnapshot::default())
    }

    async fn clear(&self, _: &str) -> Result<(), CounterStoreError> {
        Ok(())
    }

    async fn increment_below(&self, _: &str, _: i64, _: u32, _: i64) -> Result<CounterOutcome, CounterStoreError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(CounterOutcome { count: 1, admitted: true })
    }

    async fn counter(&self, _: &str, _: i64) -> Result<u32, CounterStoreError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(0)
    }
}
