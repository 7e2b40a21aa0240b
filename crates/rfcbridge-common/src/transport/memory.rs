//! In-process implementation of [`RemoteSession`].
//!
//! `MemorySession` keeps registered procedures (a description plus a handler
//! closure) and executes them on the calling thread. It models the parts of a
//! real remote session the client relies on:
//!
//! - logon checks and missing-host errors on `open`
//! - per-session attributes, padded to their declared widths
//! - schema lookup through type handles
//! - cancellation: `cancel` flips a flag the running handler observes through
//!   [`CallContext::sleep`] / [`CallContext::is_cancelled`], and the handle is
//!   gone afterwards
//! - counters of created and destroyed invocation containers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rfcbridge_common::protocol::FunctionDescription;
//! use rfcbridge_common::transport::MemorySession;
//!
//! let ping = FunctionDescription::new("RFC_PING");
//! let session = Arc::new(MemorySession::new().with_function(ping, |_ctx, _container| Ok(())));
//! assert!(session.has_function("RFC_PING"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::protocol::attributes::{Attribute, ConnectionAttributes, RawAttributes};
use crate::protocol::error::{ErrorInfo, RemoteResult, ReturnCode};
use crate::protocol::params::ConnectionParameters;
use crate::protocol::schema::{FieldDescription, FunctionDescription, ParameterDescription, TypeDescription};

use super::codec::TextCodec;
use super::container::MemoryContainer;
use super::{
    DataContainer, RawFieldDesc, RawFunctionDesc, RawParameterDesc, RawTypeDesc, RemoteSession,
    SessionHandle, TypeHandle,
};

/// Poll interval of [`CallContext::sleep`].
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// Procedure implementation registered with a [`MemorySession`].
pub type FunctionHandler =
    Arc<dyn Fn(&CallContext, &mut dyn DataContainer) -> RemoteResult<()> + Send + Sync>;

/// What a handler sees about the call it is serving.
pub struct CallContext {
    function: Arc<FunctionDescription>,
    handle: SessionHandle,
    attributes: ConnectionAttributes,
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    pub fn function(&self) -> &FunctionDescription {
        &self.function
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Attributes of the session the call arrived on.
    pub fn attributes(&self) -> &ConnectionAttributes {
        &self.attributes
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks for `duration`, returning `RFC_CANCELED` early if the call is
    /// cancelled meanwhile.
    pub fn sleep(&self, duration: Duration) -> RemoteResult<()> {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return Err(canceled());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

struct Registered {
    description: Arc<FunctionDescription>,
    handler: FunctionHandler,
}

struct SessionState {
    attributes: RawAttributes,
    cancelled: Arc<AtomicBool>,
}

/// A complete remote session living in this process.
pub struct MemorySession {
    functions: RwLock<HashMap<String, Registered>>,
    types: Mutex<Vec<Arc<TypeDescription>>>,
    sessions: Mutex<HashMap<u64, SessionState>>,
    logon: Option<(String, String)>,
    attributes: HashMap<Attribute, String>,
    online: AtomicBool,
    next_handle: AtomicU64,
    opened: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    invoked: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    pub fn new() -> Self {
        let attributes = [
            (Attribute::Host, "localhost"),
            (Attribute::SysId, "MEM"),
            (Attribute::Language, "E"),
            (Attribute::IsoLanguage, "EN"),
            (Attribute::Trace, "0"),
            (Attribute::Codepage, "4103"),
            (Attribute::PartnerCodepage, "4103"),
            (Attribute::PartnerSystemCodepage, "4103"),
            (Attribute::RfcRole, "C"),
            (Attribute::Type, "E"),
            (Attribute::PartnerType, "3"),
            (Attribute::Rel, "753"),
            (Attribute::PartnerRel, "757"),
            (Attribute::KernelRel, "753"),
            (Attribute::ProgName, "SAPLSYST"),
            (Attribute::PartnerBytesPerChar, "2"),
            (Attribute::PartnerIp, "127.0.0.1"),
            (Attribute::PartnerIpv6, "::1"),
        ]
        .into_iter()
        .map(|(attr, value)| (attr, value.to_string()))
        .collect();

        Self {
            functions: RwLock::new(HashMap::new()),
            types: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            logon: None,
            attributes,
            online: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
            opened: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            invoked: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    /// Requires `user`/`passwd` on open. The user name is compared
    /// case-insensitively, the password exactly.
    pub fn with_user(mut self, user: impl Into<String>, passwd: impl Into<String>) -> Self {
        self.logon = Some((user.into(), passwd.into()));
        self
    }

    /// Overrides a session attribute reported to every opened session.
    pub fn with_attribute(mut self, attr: Attribute, value: impl Into<String>) -> Self {
        self.attributes.insert(attr, value.into());
        self
    }

    pub fn with_function<F>(self, description: FunctionDescription, handler: F) -> Self
    where
        F: Fn(&CallContext, &mut dyn DataContainer) -> RemoteResult<()> + Send + Sync + 'static,
    {
        self.register(description, Arc::new(handler));
        self
    }

    /// Registers or replaces a procedure.
    pub fn register(&self, description: FunctionDescription, handler: FunctionHandler) {
        let name = description.name.clone();
        let registered = Registered {
            description: Arc::new(description),
            handler,
        };
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, registered);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// While offline, `open` fails with `RFC_COMMUNICATION_FAILURE`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn open_sessions(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Number of successful opens so far.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn created_invocations(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed_invocations(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Number of times a handler was entered.
    pub fn invoke_count(&self) -> usize {
        self.invoked.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<u64, SessionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_handle(&self, handle: SessionHandle) -> RemoteResult<()> {
        if self.lock_sessions().contains_key(&handle.0) {
            Ok(())
        } else {
            Err(invalid_handle(handle))
        }
    }

    fn check_logon(&self, params: &ConnectionParameters) -> RemoteResult<()> {
        if params.get("dest").is_none() && params.get("ashost").is_none() && params.get("mshost").is_none() {
            return Err(ErrorInfo::new(
                ReturnCode::InvalidParameter,
                "Parameter ASHOST, GWHOST, MSHOST or PORT is missing.",
            ));
        }

        if let Some((user, passwd)) = &self.logon {
            let user_ok = params
                .get("user")
                .map(|u| u.eq_ignore_ascii_case(user))
                .unwrap_or(false);
            let passwd_ok = params.get("passwd") == Some(passwd.as_str());
            if !user_ok || !passwd_ok {
                return Err(ErrorInfo::new(
                    ReturnCode::LogonFailure,
                    "Name or password is incorrect (repeat logon)",
                )
                .with_key("RFC_ERROR_LOGON_FAILURE"));
            }
        }
        Ok(())
    }

    fn session_attributes(&self, params: &ConnectionParameters, handle: u64) -> RawAttributes {
        let mut values = self.attributes.clone();
        let from_params = [
            (Attribute::Dest, "dest"),
            (Attribute::PartnerHost, "ashost"),
            (Attribute::SysNumber, "sysnr"),
            (Attribute::Client, "client"),
        ];
        for (attr, key) in from_params {
            if let Some(value) = params.get(key) {
                values.insert(attr, value.to_string());
            }
        }
        if let Some(user) = params.get("user") {
            values.insert(Attribute::User, user.to_ascii_uppercase());
        }
        if let Some(lang) = params.get("lang") {
            values.insert(Attribute::Language, lang.to_ascii_uppercase());
        }
        values.insert(Attribute::CpicConvId, format!("{:08}", handle));

        values
            .into_iter()
            .map(|(attr, value)| {
                let mut units = TextCodec::encode(&value);
                units.resize(attr.width().max(units.len()), b' ' as u16);
                (attr, units)
            })
            .collect()
    }

    /// Hands out a stable handle per distinct type name.
    fn type_handle(&self, type_desc: &Arc<TypeDescription>) -> TypeHandle {
        let mut types = self.types.lock().unwrap_or_else(PoisonError::into_inner);
        match types.iter().position(|t| t.name == type_desc.name) {
            Some(index) => TypeHandle(index as u64),
            None => {
                types.push(Arc::clone(type_desc));
                TypeHandle((types.len() - 1) as u64)
            }
        }
    }

    fn raw_parameter(&self, p: &ParameterDescription) -> RawParameterDesc {
        RawParameterDesc {
            name: TextCodec::encode(&p.name),
            kind: p.parameter_type.code(),
            direction: p.direction.code(),
            nuc_length: p.nuc_length,
            uc_length: p.uc_length,
            decimals: p.decimals,
            default_value: TextCodec::encode(&p.default_value),
            parameter_text: TextCodec::encode(&p.parameter_text),
            optional: p.optional,
            type_handle: p.type_desc.as_ref().map(|t| self.type_handle(t)),
        }
    }

    fn raw_field(&self, f: &FieldDescription) -> RawFieldDesc {
        RawFieldDesc {
            name: TextCodec::encode(&f.name),
            kind: f.field_type.code(),
            nuc_length: f.nuc_length,
            nuc_offset: f.nuc_offset,
            uc_length: f.uc_length,
            uc_offset: f.uc_offset,
            decimals: f.decimals,
            type_handle: f.type_desc.as_ref().map(|t| self.type_handle(t)),
        }
    }
}

impl RemoteSession for MemorySession {
    fn open(&self, params: &ConnectionParameters) -> RemoteResult<SessionHandle> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(ErrorInfo::new(
                ReturnCode::CommunicationFailure,
                "partner not reached (host offline)",
            ));
        }
        self.check_logon(params)?;

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let state = SessionState {
            attributes: self.session_attributes(params, id),
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        self.lock_sessions().insert(id, state);
        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Memory session {} opened", id);
        Ok(SessionHandle(id))
    }

    fn close(&self, handle: SessionHandle) -> RemoteResult<()> {
        match self.lock_sessions().remove(&handle.0) {
            Some(_) => {
                debug!("Memory session {} closed", handle.0);
                Ok(())
            }
            None => Err(invalid_handle(handle)),
        }
    }

    fn ping(&self, handle: SessionHandle) -> RemoteResult<()> {
        self.check_handle(handle)
    }

    fn attributes(&self, handle: SessionHandle) -> RemoteResult<RawAttributes> {
        self.lock_sessions()
            .get(&handle.0)
            .map(|state| state.attributes.clone())
            .ok_or_else(|| invalid_handle(handle))
    }

    fn describe_function(&self, handle: SessionHandle, name: &str) -> RemoteResult<RawFunctionDesc> {
        self.check_handle(handle)?;
        let description = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|r| Arc::clone(&r.description))
            .ok_or_else(|| {
                ErrorInfo::new(ReturnCode::NotFound, format!("'{}' not found", name))
                    .with_key("FU_NOT_FOUND")
            })?;

        Ok(RawFunctionDesc {
            name: TextCodec::encode(&description.name),
            parameters: description
                .parameters
                .iter()
                .map(|p| self.raw_parameter(p))
                .collect(),
        })
    }

    fn describe_type(&self, handle: SessionHandle, type_handle: TypeHandle) -> RemoteResult<RawTypeDesc> {
        self.check_handle(handle)?;
        let type_desc = self
            .types
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_handle.0 as usize)
            .cloned()
            .ok_or_else(|| {
                ErrorInfo::new(
                    ReturnCode::InvalidHandle,
                    format!("type handle {} is unknown", type_handle.0),
                )
            })?;

        Ok(RawTypeDesc {
            name: TextCodec::encode(&type_desc.name),
            nuc_length: type_desc.nuc_length,
            uc_length: type_desc.uc_length,
            fields: type_desc.fields.iter().map(|f| self.raw_field(f)).collect(),
        })
    }

    fn create_invocation(&self, description: &FunctionDescription) -> RemoteResult<Box<dyn DataContainer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryContainer::for_function(description)))
    }

    fn destroy_invocation(&self, container: Box<dyn DataContainer>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        drop(container);
    }

    fn invoke(&self, handle: SessionHandle, container: &mut dyn DataContainer) -> RemoteResult<()> {
        let (attributes, cancelled) = {
            let sessions = self.lock_sessions();
            let state = sessions.get(&handle.0).ok_or_else(|| invalid_handle(handle))?;
            (state.attributes.clone(), Arc::clone(&state.cancelled))
        };

        let (description, handler) = {
            let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
            let registered = functions.get(container.type_name()).ok_or_else(|| {
                ErrorInfo::new(
                    ReturnCode::NotFound,
                    format!("'{}' not found", container.type_name()),
                )
                .with_key("FU_NOT_FOUND")
            })?;
            (Arc::clone(&registered.description), Arc::clone(&registered.handler))
        };

        let ctx = CallContext {
            function: description,
            handle,
            attributes: ConnectionAttributes::from_raw(&attributes, true).unwrap_or_default(),
            cancelled,
        };

        self.invoked.fetch_add(1, Ordering::SeqCst);
        let result = handler(&ctx, container);
        if ctx.is_cancelled() {
            return Err(canceled());
        }
        result
    }

    fn cancel(&self, handle: SessionHandle) -> RemoteResult<()> {
        let state = self
            .lock_sessions()
            .remove(&handle.0)
            .ok_or_else(|| invalid_handle(handle))?;
        state.cancelled.store(true, Ordering::SeqCst);
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        debug!("Memory session {} cancelled", handle.0);
        Ok(())
    }
}

fn invalid_handle(handle: SessionHandle) -> ErrorInfo {
    ErrorInfo::new(
        ReturnCode::InvalidHandle,
        format!("An invalid handle was passed: {}", handle.0),
    )
}

fn canceled() -> ErrorInfo {
    ErrorInfo::new(ReturnCode::Canceled, "Connection was canceled")
}
