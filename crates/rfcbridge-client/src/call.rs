//! Call orchestration: describe, fill, invoke, unwrap.
//!
//! A call runs these steps on one connection:
//!
//! 1. Resolve the function description (memoized per connection)
//! 2. Create an invocation container, destroyed on every exit path
//! 3. Fill the caller's parameters into it; unknown names fail before
//!    anything is sent
//! 4. Invoke the remote procedure
//! 5. Unwrap the results, leaving out Import parameters unless the
//!    connection returns them
//!
//! [`Connection::call_with_timeout`] runs the same steps on the blocking pool
//! and races them against a deadline. When the deadline passes first the
//! call in flight is cancelled and the connection is reopened.

use std::sync::Arc;
use std::time::Duration;

use rfcbridge_common::marshal::{fill_parameters, unwrap_parameters};
use rfcbridge_common::protocol::{
    Direction, FunctionDescription, ParameterDescription, Record, Result, RfcError, Value,
};
use rfcbridge_common::transport::{DataContainer, RemoteSession};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionInner, ConnectionOptions};

/// An invocation container that is handed back to the session on drop.
struct Invocation<'s> {
    session: &'s dyn RemoteSession,
    container: Option<Box<dyn DataContainer>>,
}

impl<'s> Invocation<'s> {
    fn create(session: &'s dyn RemoteSession, description: &FunctionDescription) -> Result<Self> {
        let container = session
            .create_invocation(description)
            .map_err(|info| RfcError::remote("Could not create function", info))?;
        Ok(Self {
            session,
            container: Some(container),
        })
    }

    fn container(&mut self) -> Result<&mut (dyn DataContainer + 'static)> {
        match self.container.as_deref_mut() {
            Some(container) => Ok(container),
            None => Err(RfcError::Internal("invocation already destroyed".to_string())),
        }
    }
}

impl Drop for Invocation<'_> {
    fn drop(&mut self) {
        if let Some(container) = self.container.take() {
            self.session.destroy_invocation(container);
        }
    }
}

fn execute(
    inner: &ConnectionInner,
    options: ConnectionOptions,
    name: &str,
    params: &Value,
) -> Result<Record> {
    let handle = inner.handle_for_call()?;
    let description = inner.describe(handle, name, options.cache_metadata)?;

    let mut invocation = Invocation::create(inner.session.as_ref(), &description)?;
    let container = invocation.container()?;
    fill_parameters(&description, container, params)?;

    debug!("Invoking '{}' on handle {}", name, handle.0);
    inner
        .session
        .invoke(handle, container)
        .map_err(|info| RfcError::remote(format!("Could not invoke function \"{}\"", name), info))?;

    let include = |p: &ParameterDescription| {
        options.return_import_params || p.direction != Direction::Import
    };
    unwrap_parameters(&description, &*container, options.strip, include)
}

/// Whole milliseconds of `timeout`, saturating at `u64::MAX`.
fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl Connection {
    /// Calls the remote procedure `name` and returns its results.
    ///
    /// `params` is a structure or field set keyed by parameter name, or
    /// `Value::Null` for no parameters. Every name is checked against the
    /// function description before the procedure is invoked.
    ///
    /// The call blocks the current thread for the whole remote round trip.
    ///
    /// # Errors
    ///
    /// - `RfcError::ConnectionClosed` after [`close`](Connection::close)
    /// - `RfcError::Marshal` for unknown parameter names or values that do
    ///   not fit their fields
    /// - `RfcError::Remote` for anything the remote side reports
    pub fn call(&self, name: &str, params: Value) -> Result<Record> {
        execute(&self.inner, self.options, name, &params)
    }

    /// Calls the remote procedure `name`, giving up after `timeout`.
    ///
    /// When the deadline passes first, the call in flight is cancelled, the
    /// connection is reopened, and `RfcError::DeadlineExceeded` is returned
    /// carrying any cancel or reopen failure. The connection is usable
    /// afterwards unless the reopen failed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use rfcbridge_client::{Connection, ConnectionParameters, Value};
    /// use rfcbridge_common::protocol::FunctionDescription;
    /// use rfcbridge_common::transport::MemorySession;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let session = Arc::new(
    ///     MemorySession::new().with_function(FunctionDescription::new("RFC_PING"), |_, _| Ok(())),
    /// );
    /// let conn = Connection::open_with(session, ConnectionParameters::new().with("ashost", "h"))?;
    /// let result = conn
    ///     .call_with_timeout("RFC_PING", Value::Null, Duration::from_secs(5))
    ///     .await?;
    /// assert!(result.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call_with_timeout(
        &self,
        name: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Record> {
        let inner = Arc::clone(&self.inner);
        let options = self.options;
        let function = name.to_string();
        let body = tokio::task::spawn_blocking(move || execute(&inner, options, &function, &params));

        match tokio::time::timeout(timeout, body).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RfcError::Internal(format!(
                "call to '{}' panicked: {}",
                name, join_error
            ))),
            Err(_) => {
                warn!("Call to '{}' exceeded {:?}, cancelling", name, timeout);
                // A body still queued on the blocking pool now fails with
                // ConnectionClosed instead of invoking on the old handle.
                let abandoned = self.inner.abandon();
                let inner = Arc::clone(&self.inner);
                let (cancel, reopen) =
                    tokio::task::spawn_blocking(move || inner.cancel_and_reopen(abandoned))
                        .await
                        .map_err(|e| RfcError::Internal(format!("cancel task failed: {}", e)))?;
                Err(RfcError::DeadlineExceeded {
                    function: name.to_string(),
                    timeout_ms: millis(timeout),
                    cancel: cancel.map(Box::new),
                    reopen: reopen.map(Box::new),
                })
            }
        }
    }
}
