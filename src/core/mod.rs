use std::{future::Future, sync::OnceLock};

use rand::distr::{Alphanumeric, SampleString};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::error::BatchError;

pub mod chunk;

pub mod executor;

pub mod item;

pub mod job;

pub mod page;

pub mod step;

pub mod transaction;

/// Generates a random name consisting of alphanumeric characters.
///
/// # Returns
///
/// A `String` containing the generated random name.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}

static FALLBACK_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Runs a future to completion from synchronous batch code.
///
/// Inside a multi-threaded tokio runtime the current worker is handed over
/// with `block_in_place` and the future runs on that runtime. Outside of any
/// runtime a shared multi-threaded runtime is started on first use.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, BatchError> {
    match Handle::try_current() {
        Ok(handle) => {
            if matches!(handle.runtime_flavor(), RuntimeFlavor::CurrentThread) {
                return Err(BatchError::Configuration(
                    "batch steps must run on a multi-threaded tokio runtime".to_string(),
                ));
            }
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Err(_) => Ok(fallback_runtime()?.block_on(future)),
    }
}

fn fallback_runtime() -> Result<&'static Runtime, BatchError> {
    if let Some(runtime) = FALLBACK_RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = Builder::new_multi_thread()
        .thread_name("batch-worker")
        .enable_all()
        .build()
        .map_err(|err| BatchError::Configuration(format!("cannot start runtime: {}", err)))?;

    Ok(FALLBACK_RUNTIME.get_or_init(|| runtime))
}
