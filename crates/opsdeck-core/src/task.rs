//! Background dispatch of long-running gateway work.
//!
//! Script execution, backup transfers and recovery steps are all blocking
//! round trips to the backing store. They run in spawned tasks bounded by a
//! deadline and a caller-supplied [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

use crate::error::{Error, GatewayError};

/// Run a gateway future in a background task.
///
/// The task is aborted when `deadline` elapses or `cancel` fires. A
/// cancellation requested before the call starts returns immediately
/// without spawning anything.
pub async fn dispatch<T, F>(work: F, deadline: Duration, cancel: &CancellationToken) -> Result<T, Error>
where
    F: Future<Output = Result<T, GatewayError>> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let handle = tokio::spawn(work);
    let abort = handle.abort_handle();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            abort.abort();
            Err(Error::Cancelled)
        }
        joined = tokio::time::timeout(deadline, handle) => match joined {
            Err(_) => {
                abort.abort();
                Err(GatewayError::Timeout(deadline).into())
            }
            Ok(Err(join_err)) => Err(GatewayError::Task(join_err.to_string()).into()),
            Ok(Ok(result)) => result.map_err(Error::from),
        }
    }
}
