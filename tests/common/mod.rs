#![allow(dead_code)]

use chunk_batch::{
    core::{
        item::{ItemProcessor, ItemProcessorResult, ItemWriter, ItemWriterResult},
        job::{JobExecution, JobExecutionListener},
        page::KeyedRecord,
    },
    BatchError,
};
use mockall::mock;

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: u64,
    pub amount: u32,
}

impl KeyedRecord for Order {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn orders(count: u64) -> Vec<Order> {
    (1..=count).map(|id| Order { id, amount: 100 }).collect()
}

pub fn ids(orders: &[Order]) -> Vec<u64> {
    orders.iter().map(|order| order.id).collect()
}

/// Adds 20% to the amount of every order, failing on one id if asked to.
#[derive(Default)]
pub struct TaxProcessor {
    pub failing_id: Option<u64>,
}

impl ItemProcessor<Order, Order> for TaxProcessor {
    fn process(&self, item: &Order) -> ItemProcessorResult<Order> {
        if self.failing_id == Some(item.id) {
            return Err(BatchError::ItemProcessor(format!("order {} rejected", item.id)));
        }
        Ok(Order {
            id: item.id,
            amount: item.amount * 120 / 100,
        })
    }
}

mock! {
    pub Writer {}
    impl ItemWriter<Order> for Writer {
        fn write(&self, items: &[Order]) -> ItemWriterResult;
    }
}

mock! {
    pub Listener {}
    impl JobExecutionListener for Listener {
        fn before_job(&self, job_execution: &JobExecution);
        fn after_job(&self, job_execution: &JobExecution);
    }
}
