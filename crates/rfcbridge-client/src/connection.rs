use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rfcbridge_common::protocol::{
    ConnectionAttributes, ConnectionParameters, FunctionDescription, Result, RfcError,
};
use rfcbridge_common::transport::{RemoteSession, SessionHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::schema::{self, SchemaCache};

/// Call-shaping options of a [`Connection`].
///
/// # Default Configuration
///
/// - `strip`: true (trailing spaces and NULs removed from text results)
/// - `return_import_params`: false (results hold Export, Changing and Tables
///   parameters only)
/// - `cache_metadata`: true (function descriptions memoized per session)
///
/// # Example
///
/// ```rust
/// use rfcbridge_client::ConnectionOptions;
///
/// let options: ConnectionOptions = serde_json::from_str(r#"{"strip": false}"#).unwrap();
/// assert!(!options.strip);
/// assert!(options.cache_metadata);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub strip: bool,
    pub return_import_params: bool,
    pub cache_metadata: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            strip: true,
            return_import_params: false,
            cache_metadata: true,
        }
    }
}

/// Parameters and options of a connection, loadable from JSON.
///
/// ```rust
/// use rfcbridge_client::ConnectionConfig;
///
/// let config = ConnectionConfig::from_json(r#"{
///     "parameters": {"dest": "QI3", "user": "demo", "passwd": "secret"},
///     "options": {"return_import_params": true}
/// }"#).unwrap();
/// assert_eq!(config.parameters.get("dest"), Some("QI3"));
/// assert!(config.options.return_import_params);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub parameters: ConnectionParameters,
    #[serde(default)]
    pub options: ConnectionOptions,
}

impl ConnectionConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RfcError::Config(e.to_string()))
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// Built but never opened; calls open it on demand.
    Fresh,
    Open(SessionHandle),
    /// Closed explicitly or after a cancelled call.
    Closed,
}

pub(crate) struct ConnectionInner {
    pub(crate) session: Arc<dyn RemoteSession>,
    params: ConnectionParameters,
    state: Mutex<Lifecycle>,
    pub(crate) schemas: SchemaCache,
}

impl ConnectionInner {
    fn state(&self) -> MutexGuard<'_, Lifecycle> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        *self.state()
    }

    fn open_locked(&self, state: &mut Lifecycle) -> Result<SessionHandle> {
        if let Lifecycle::Open(handle) = *state {
            return Ok(handle);
        }
        let handle = self
            .session
            .open(&self.params)
            .map_err(|info| RfcError::remote("Connection could not be opened", info))?;
        *state = Lifecycle::Open(handle);
        self.schemas.clear();
        info!("Connection opened (handle {})", handle.0);
        Ok(handle)
    }

    fn close_locked(&self, state: &mut Lifecycle) -> Result<()> {
        let handle = match *state {
            Lifecycle::Open(handle) => handle,
            Lifecycle::Fresh | Lifecycle::Closed => return Ok(()),
        };
        *state = Lifecycle::Closed;
        self.schemas.clear();
        self.session
            .close(handle)
            .map_err(|info| RfcError::remote("Connection could not be closed", info))?;
        info!("Connection closed (handle {})", handle.0);
        Ok(())
    }

    /// Handle for operations that reopen a connection that is not alive.
    pub(crate) fn ensure_open(&self) -> Result<SessionHandle> {
        let mut state = self.state();
        self.open_locked(&mut state)
    }

    /// Handle for a call: opens a fresh connection, refuses a closed one.
    pub(crate) fn handle_for_call(&self) -> Result<SessionHandle> {
        let mut state = self.state();
        let current = *state;
        match current {
            Lifecycle::Open(handle) => Ok(handle),
            Lifecycle::Fresh => self.open_locked(&mut state),
            Lifecycle::Closed => Err(RfcError::ConnectionClosed(
                "call requires an open connection".to_string(),
            )),
        }
    }

    fn reopen(&self) -> Result<SessionHandle> {
        let mut state = self.state();
        if let Err(e) = self.close_locked(&mut state) {
            warn!("Ignoring close failure on reopen: {}", e);
        }
        self.open_locked(&mut state)
    }

    /// Resolves a function description, through the cache when enabled.
    pub(crate) fn describe(
        &self,
        handle: SessionHandle,
        name: &str,
        use_cache: bool,
    ) -> Result<Arc<FunctionDescription>> {
        if use_cache {
            if let Some(cached) = self.schemas.get(name) {
                return Ok(cached);
            }
        }
        let description = Arc::new(schema::describe_function(self.session.as_ref(), handle, name)?);
        if use_cache {
            self.schemas.insert(Arc::clone(&description));
        }
        Ok(description)
    }

    /// Marks the connection not alive and hands back the handle a call in
    /// flight is still using. Makes no remote round trip.
    pub(crate) fn abandon(&self) -> Option<SessionHandle> {
        let mut state = self.state();
        let old = match *state {
            Lifecycle::Open(handle) => Some(handle),
            _ => None,
        };
        *state = Lifecycle::Closed;
        self.schemas.clear();
        old
    }

    /// Cancels the call in flight on an abandoned handle and opens a new
    /// session in its place.
    ///
    /// Returns the cancel and reopen failures, if any.
    pub(crate) fn cancel_and_reopen(
        &self,
        abandoned: Option<SessionHandle>,
    ) -> (Option<RfcError>, Option<RfcError>) {
        let cancel = abandoned.and_then(|handle| {
            self.session
                .cancel(handle)
                .map_err(|info| RfcError::remote("Call could not be cancelled", info))
                .err()
        });
        if let Some(e) = &cancel {
            warn!("{}", e);
        }

        let reopen = self.ensure_open().err();
        if let Some(e) = &reopen {
            warn!("Connection could not be reopened after cancel: {}", e);
        }
        (cancel, reopen)
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Open(handle) = state {
            match self.session.close(handle) {
                Ok(()) => debug!("Connection closed on drop (handle {})", handle.0),
                Err(info) => warn!("Failed to close connection on drop: {}", info),
            }
        }
    }
}

/// A connection to a remote endpoint.
///
/// A connection owns at most one remote session handle at a time. It starts
/// out not open; [`call`](Self::call) opens it on first use, while
/// [`ping`](Self::ping), [`attributes`](Self::attributes) and
/// [`function_description`](Self::function_description) reopen it whenever
/// it is not alive. After [`close`](Self::close) calls fail with
/// `RfcError::ConnectionClosed` until the connection is reopened.
///
/// The handle is closed when the connection is dropped.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use rfcbridge_client::{Connection, ConnectionParameters};
/// use rfcbridge_common::transport::MemorySession;
///
/// let session = Arc::new(MemorySession::new());
/// let conn = Connection::open_with(session, ConnectionParameters::new().with("ashost", "10.0.0.1")).unwrap();
/// assert!(conn.alive());
/// conn.close().unwrap();
/// assert!(!conn.alive());
/// ```
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
    pub(crate) options: ConnectionOptions,
}

impl Connection {
    /// Creates a connection that is not yet open.
    pub fn new(session: Arc<dyn RemoteSession>, params: ConnectionParameters) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                session,
                params,
                state: Mutex::new(Lifecycle::Fresh),
                schemas: SchemaCache::new(),
            }),
            options: ConnectionOptions::default(),
        }
    }

    /// Creates a connection and opens it.
    pub fn open_with(session: Arc<dyn RemoteSession>, params: ConnectionParameters) -> Result<Self> {
        let conn = Self::new(session, params);
        conn.open()?;
        Ok(conn)
    }

    /// Creates a connection from a loaded configuration, not yet open.
    pub fn from_config(session: Arc<dyn RemoteSession>, config: ConnectionConfig) -> Self {
        Self::new(session, config.parameters).with_options(config.options)
    }

    pub fn with_strip(mut self, strip: bool) -> Self {
        self.options.strip = strip;
        self
    }

    pub fn with_return_import_params(mut self, return_import_params: bool) -> Self {
        self.options.return_import_params = return_import_params;
        self
    }

    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ConnectionOptions {
        self.options
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        &self.inner.params
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.inner.schemas
    }

    /// True while the connection holds an open session handle.
    pub fn alive(&self) -> bool {
        matches!(self.inner.lifecycle(), Lifecycle::Open(_))
    }

    /// Opens the session; a no-op on an alive connection.
    pub fn open(&self) -> Result<()> {
        self.inner.ensure_open().map(|_| ())
    }

    /// Closes the session; a no-op on a connection that is not alive.
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.state();
        self.inner.close_locked(&mut state)
    }

    /// Closes and opens the session. A failing close is logged and ignored.
    pub fn reopen(&self) -> Result<()> {
        self.inner.reopen().map(|_| ())
    }

    pub fn ping(&self) -> Result<()> {
        let handle = self.inner.ensure_open()?;
        self.inner
            .session
            .ping(handle)
            .map_err(|info| RfcError::remote("Server could not be pinged", info))
    }

    /// Snapshot of the remote session metadata, decoded with the
    /// connection's strip option.
    pub fn attributes(&self) -> Result<ConnectionAttributes> {
        let handle = self.inner.ensure_open()?;
        let raw = self
            .inner
            .session
            .attributes(handle)
            .map_err(|info| RfcError::remote("Could not get connection attributes", info))?;
        Ok(ConnectionAttributes::from_raw(&raw, self.options.strip)?)
    }

    pub fn function_description(&self, name: &str) -> Result<Arc<FunctionDescription>> {
        let handle = self.inner.ensure_open()?;
        self.inner.describe(handle, name, self.options.cache_metadata)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.inner.params)
            .field("state", &self.inner.lifecycle())
            .field("options", &self.options)
            .finish()
    }
}
