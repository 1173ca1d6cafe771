//! Request-scoped deadlines.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use weather_common::{WeatherError, WeatherResult};

/// Run `work` on its own task and wait at most `timeout` for it.
///
/// On expiry the caller gets [`WeatherError::Timeout`] while the task keeps
/// running: store calls already issued are left to finish.
pub async fn with_deadline<T, F>(timeout: Duration, work: F) -> WeatherResult<T>
where
    T: Send + 'static,
    F: Future<Output = WeatherResult<T>> + Send + 'static,
{
    let task = tokio::spawn(work);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!(error = %e, "Request task failed");
            Err(WeatherError::Internal(format!("request task failed: {}", e)))
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Request deadline exceeded");
            Err(WeatherError::Timeout)
        }
    }
}
