//! Server-direction procedure registry.
//!
//! A [`HandlerRegistry`] maps procedure names to a function description and a
//! handler closure. Dispatching a request:
//!
//! 1. Looks up the handler by procedure name
//! 2. Unwraps every non-Export parameter from the request container
//! 3. Calls the handler with the caller's connection attributes and those
//!    parameters
//! 4. Fills the handler's result (Export, Changing and Tables parameters)
//!    back into the container
//!
//! Registries are plain owned values; share one through `Arc` to serve it
//! from several sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rfcbridge_common::marshal::{fill_parameters, unwrap_parameters};
use rfcbridge_common::protocol::{
    ConnectionAttributes, Direction, ErrorInfo, FunctionDescription, Record, Value,
};
use rfcbridge_common::transport::{CallContext, DataContainer, FunctionHandler, MemorySession};
use tracing::{debug, warn};

use crate::error::{Result, ServerError};

/// Implementation of a server-side procedure.
///
/// Receives the caller's connection attributes and the request parameters,
/// and returns the response parameters as a structure or field set
/// (`Value::Null` for none). An `Err` is handed back to the caller verbatim.
pub type ServerFunction =
    Arc<dyn Fn(&ConnectionAttributes, Record) -> std::result::Result<Value, ErrorInfo> + Send + Sync>;

/// Call counters of one registered procedure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub calls: u64,
    pub failures: u64,
}

struct Entry {
    description: Arc<FunctionDescription>,
    handler: ServerFunction,
    calls: AtomicU64,
    failures: AtomicU64,
}

/// Registered server procedures, keyed by name.
///
/// # Example
///
/// ```rust
/// use rfcbridge_common::protocol::{Direction, FunctionDescription, ParameterDescription, RfcType, Value};
/// use rfcbridge_server::HandlerRegistry;
///
/// let desc = FunctionDescription::new("Z_HELLO")
///     .parameter(ParameterDescription::new("EV_TEXT", RfcType::String, Direction::Export, 0));
///
/// let registry = HandlerRegistry::new();
/// registry.register(desc, |_attrs, _params| {
///     Ok(Value::structure([("EV_TEXT", Value::from("hello"))]))
/// });
/// assert!(registry.contains("Z_HELLO"));
/// ```
pub struct HandlerRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    strip: bool,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry. Request text is handed to handlers
    /// unstripped, padding included.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            strip: false,
        }
    }

    /// Strips trailing spaces and NULs from request text before it reaches
    /// the handlers.
    pub fn with_strip(mut self, strip: bool) -> Self {
        self.strip = strip;
        self
    }

    /// Registers `handler` under the description's name, replacing any
    /// previous registration.
    pub fn register<F>(&self, description: FunctionDescription, handler: F)
    where
        F: Fn(&ConnectionAttributes, Record) -> std::result::Result<Value, ErrorInfo> + Send + Sync + 'static,
    {
        self.register_function(description, Arc::new(handler));
    }

    pub fn register_function(&self, description: FunctionDescription, handler: ServerFunction) {
        let name = description.name.clone();
        let entry = Entry {
            description: Arc::new(description),
            handler,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        };
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), entry);
        if previous.is_some() {
            warn!("Replaced server handler for '{}'", name);
        } else {
            debug!("Registered server handler for '{}'", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered procedure names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn description(&self, name: &str) -> Option<Arc<FunctionDescription>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| Arc::clone(&entry.description))
    }

    pub fn stats(&self, name: &str) -> Option<DispatchStats> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| DispatchStats {
                calls: entry.calls.load(Ordering::Relaxed),
                failures: entry.failures.load(Ordering::Relaxed),
            })
    }

    /// Serves one request for `name` out of `container`.
    ///
    /// # Errors
    ///
    /// - `ServerError::HandlerNotFound` if `name` is not registered
    /// - `ServerError::Marshal` if the request cannot be read or the
    ///   response does not fit the description
    /// - `ServerError::Handler` with the handler's own diagnostic
    pub fn dispatch(
        &self,
        name: &str,
        attributes: &ConnectionAttributes,
        container: &mut dyn DataContainer,
    ) -> Result<()> {
        let (description, handler) = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let entry = entries
                .get(name)
                .ok_or_else(|| ServerError::HandlerNotFound(name.to_string()))?;
            entry.calls.fetch_add(1, Ordering::Relaxed);
            (Arc::clone(&entry.description), Arc::clone(&entry.handler))
        };

        let result = self.serve(name, &description, &handler, attributes, container);
        if result.is_err() {
            if let Some(entry) = self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
            {
                entry.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn serve(
        &self,
        name: &str,
        description: &FunctionDescription,
        handler: &ServerFunction,
        attributes: &ConnectionAttributes,
        container: &mut dyn DataContainer,
    ) -> Result<()> {
        let marshal = |source| ServerError::Marshal {
            function: name.to_string(),
            source,
        };

        let request = unwrap_parameters(description, &*container, self.strip, |p| {
            p.direction != Direction::Export
        })
        .map_err(marshal)?;

        debug!("Dispatching '{}' with {} parameters", name, request.len());
        let response = handler(attributes, request).map_err(|info| ServerError::Handler {
            function: name.to_string(),
            info,
        })?;

        fill_parameters(description, container, &response).map_err(marshal)
    }

    /// Registers every procedure of `registry` with `session`, served by
    /// [`handler_for`].
    pub fn install(registry: &Arc<Self>, session: &MemorySession) {
        let descriptions: Vec<FunctionDescription> = registry
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.description.as_ref().clone())
            .collect();
        for description in descriptions {
            session.register(description, handler_for(Arc::clone(registry)));
        }
    }
}

/// Adapts `registry` into a [`MemorySession`] procedure handler.
///
/// The handler dispatches on the name of the function being served and
/// reports dispatch failures through [`ServerError::to_error_info`].
pub fn handler_for(registry: Arc<HandlerRegistry>) -> FunctionHandler {
    Arc::new(move |ctx: &CallContext, container: &mut dyn DataContainer| {
        let name = ctx.function().name.clone();
        registry
            .dispatch(&name, ctx.attributes(), container)
            .map_err(|e| {
                warn!("{}", e);
                e.to_error_info()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfcbridge_common::protocol::{ParameterDescription, ReturnCode, RfcType};
    use rfcbridge_common::transport::MemoryContainer;

    fn greet_description() -> FunctionDescription {
        FunctionDescription::new("Z_GREET")
            .parameter(ParameterDescription::new("IV_NAME", RfcType::Char, Direction::Import, 10))
            .parameter(ParameterDescription::new("CV_COUNT", RfcType::Int, Direction::Changing, 4))
            .parameter(ParameterDescription::new("EV_GREETING", RfcType::String, Direction::Export, 0))
    }

    fn greet(_attrs: &ConnectionAttributes, params: Record) -> std::result::Result<Value, ErrorInfo> {
        let name = params.get("IV_NAME").and_then(Value::as_str).unwrap_or_default();
        let count = params.get("CV_COUNT").and_then(Value::as_integer).unwrap_or(0) as i32;
        Ok(Value::structure([
            ("EV_GREETING", Value::from(format!("Hello {}", name.trim_end()))),
            ("CV_COUNT", Value::I32(count + 1)),
        ]))
    }

    fn request(desc: &FunctionDescription, params: Value) -> MemoryContainer {
        let mut container = MemoryContainer::for_function(desc);
        fill_parameters(desc, &mut container, &params).unwrap();
        container
    }

    #[test]
    fn test_register_and_names() {
        let registry = HandlerRegistry::new();
        assert!(registry.names().is_empty());

        registry.register(greet_description(), greet);
        registry.register(FunctionDescription::new("Z_ALPHA"), |_, _| Ok(Value::Null));

        assert!(registry.contains("Z_GREET"));
        assert!(!registry.contains("Z_OTHER"));
        assert_eq!(registry.names(), vec!["Z_ALPHA", "Z_GREET"]);
        assert_eq!(registry.description("Z_GREET").unwrap().parameters.len(), 3);
    }

    #[test]
    fn test_dispatch_fills_response() {
        let registry = HandlerRegistry::new();
        let desc = greet_description();
        registry.register(desc.clone(), greet);

        let mut container = request(
            &desc,
            Value::structure([("IV_NAME", Value::from("Ada")), ("CV_COUNT", Value::I32(41))]),
        );
        registry
            .dispatch("Z_GREET", &ConnectionAttributes::default(), &mut container)
            .unwrap();

        let response = unwrap_parameters(&desc, &container, true, |p| p.direction != Direction::Import).unwrap();
        assert_eq!(response.get("EV_GREETING"), Some(&Value::from("Hello Ada")));
        assert_eq!(response.get("CV_COUNT"), Some(&Value::I32(42)));
        assert_eq!(registry.stats("Z_GREET"), Some(DispatchStats { calls: 1, failures: 0 }));
    }

    #[test]
    fn test_dispatch_passes_unstripped_request() {
        let registry = HandlerRegistry::new();
        let desc = greet_description();
        registry.register(desc.clone(), |_, params| {
            assert_eq!(params.get("IV_NAME"), Some(&Value::from("Ada       ")));
            assert!(!params.contains_key("EV_GREETING"));
            Ok(Value::Null)
        });

        let mut container = request(&desc, Value::structure([("IV_NAME", Value::from("Ada"))]));
        registry
            .dispatch("Z_GREET", &ConnectionAttributes::default(), &mut container)
            .unwrap();
    }

    #[test]
    fn test_dispatch_unknown_function() {
        let registry = HandlerRegistry::new();
        let desc = greet_description();
        let mut container = MemoryContainer::for_function(&desc);

        let err = registry
            .dispatch("Z_GREET", &ConnectionAttributes::default(), &mut container)
            .unwrap_err();
        assert!(matches!(err, ServerError::HandlerNotFound(_)));
        let info = err.to_error_info();
        assert_eq!(info.code, ReturnCode::NotFound);
        assert_eq!(info.key, "FU_NOT_FOUND");
    }

    #[test]
    fn test_dispatch_handler_error_passes_through() {
        let registry = HandlerRegistry::new();
        let desc = greet_description();
        registry.register(desc.clone(), |_, _| Err(ErrorInfo::abap_exception("NOT_ALLOWED", "go away")));

        let mut container = MemoryContainer::for_function(&desc);
        let err = registry
            .dispatch("Z_GREET", &ConnectionAttributes::default(), &mut container)
            .unwrap_err();
        let info = err.to_error_info();
        assert_eq!(info.code, ReturnCode::AbapException);
        assert_eq!(info.key, "NOT_ALLOWED");
        assert_eq!(registry.stats("Z_GREET"), Some(DispatchStats { calls: 1, failures: 1 }));
    }

    #[test]
    fn test_dispatch_rejects_unknown_response_field() {
        let registry = HandlerRegistry::new();
        let desc = greet_description();
        registry.register(desc.clone(), |_, _| Ok(Value::structure([("EV_NOPE", Value::I32(1))])));

        let mut container = MemoryContainer::for_function(&desc);
        let err = registry
            .dispatch("Z_GREET", &ConnectionAttributes::default(), &mut container)
            .unwrap_err();
        assert!(matches!(err, ServerError::Marshal { .. }));
        assert_eq!(err.to_error_info().code, ReturnCode::ConversionFailure);
        assert!(err.to_string().contains("EV_NOPE"));
    }

    #[test]
    fn test_register_replaces() {
        let registry = HandlerRegistry::new();
        registry.register(greet_description(), greet);
        registry.register(FunctionDescription::new("Z_GREET"), |_, _| Ok(Value::Null));
        assert_eq!(registry.names().len(), 1);
        assert!(registry.description("Z_GREET").unwrap().parameters.is_empty());
    }
}
