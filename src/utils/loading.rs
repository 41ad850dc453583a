//! Bounded model loading.
//!
//! Artifact loads run on a dedicated thread so a hung decoder or a slow
//! network filesystem cannot stall the caller past the configured deadline.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::{AdvisorError, Result};

/// Run `load` on a worker thread and wait at most `timeout` for its result.
///
/// On timeout the worker is left to finish in the background and its result
/// is discarded. A panic inside `load` is reported as a load error.
pub fn load_with_timeout<T, F>(what: &str, timeout: Duration, load: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let started = Instant::now();

    thread::Builder::new()
        .name(format!("load-{}", what))
        .spawn(move || {
            let _ = tx.send(load());
        })
        .map_err(AdvisorError::Io)?;

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            debug!("{} load finished in {:.1?}", what, started.elapsed());
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("{} load exceeded {:?}; abandoning it", what, timeout);
            Err(AdvisorError::LoadTimeout {
                what: what.to_string(),
                seconds: timeout.as_secs(),
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(AdvisorError::Inference(format!(
            "{} loader thread exited without a result",
            what
        ))),
    }
}
