//! Type schema resolution and caching.
//!
//! The remote session reports raw descriptors: names in remote text, kinds
//! and directions as numeric tags, and nested types as [`TypeHandle`]s. This
//! module turns them into the shared [`FunctionDescription`] the marshaling
//! engine works with, fetching every nested type through the session.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rfcbridge_common::protocol::{
    Direction, FieldDescription, FunctionDescription, ParameterDescription, Result, RfcError,
    RfcType, TypeDescription,
};
use rfcbridge_common::transport::{
    RawFieldDesc, RawFunctionDesc, RawParameterDesc, RemoteSession, SessionHandle, TextCodec,
    TypeHandle,
};
use tracing::debug;

/// Nesting limit for structured types.
const MAX_TYPE_DEPTH: usize = 64;

/// Memoized function descriptions of one connection.
///
/// Type handles belong to a remote session, so the cache is cleared whenever
/// the connection is closed or reopened.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, Arc<FunctionDescription>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionDescription>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn insert(&self, description: Arc<FunctionDescription>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(description.name.clone(), description);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Looks up `name` on the remote side and resolves its full schema.
///
/// # Errors
///
/// `RfcError::Remote` if the procedure or one of its types cannot be
/// described, `RfcError::Internal` for malformed descriptors.
pub fn describe_function(
    session: &dyn RemoteSession,
    handle: SessionHandle,
    name: &str,
) -> Result<FunctionDescription> {
    let raw = session.describe_function(handle, name).map_err(|info| {
        RfcError::remote(format!("Could not get function description for \"{}\"", name), info)
    })?;
    let description = Resolver::new(session, handle).function(raw)?;
    debug!(
        "Resolved '{}' with {} parameters",
        description.name,
        description.parameters.len()
    );
    Ok(description)
}

/// Resolves raw descriptors, sharing one `Arc` per type handle.
struct Resolver<'s> {
    session: &'s dyn RemoteSession,
    handle: SessionHandle,
    types: HashMap<TypeHandle, Arc<TypeDescription>>,
}

impl<'s> Resolver<'s> {
    fn new(session: &'s dyn RemoteSession, handle: SessionHandle) -> Self {
        Self {
            session,
            handle,
            types: HashMap::new(),
        }
    }

    fn function(&mut self, raw: RawFunctionDesc) -> Result<FunctionDescription> {
        let mut description = FunctionDescription::new(TextCodec::decode_all(&raw.name, true)?);
        for raw_param in raw.parameters {
            let parameter = self.parameter(raw_param)?;
            description = description.parameter(parameter);
        }
        Ok(description)
    }

    fn parameter(&mut self, raw: RawParameterDesc) -> Result<ParameterDescription> {
        let name = TextCodec::decode_all(&raw.name, true)?;
        let kind = RfcType::from_code(raw.kind);
        let direction = Direction::from_code(raw.direction).ok_or_else(|| {
            RfcError::Internal(format!(
                "parameter '{}' has unknown direction {}",
                name, raw.direction
            ))
        })?;
        let type_desc = self.nested(&name, kind, raw.type_handle, 0)?;

        Ok(ParameterDescription {
            name,
            parameter_type: kind,
            direction,
            nuc_length: raw.nuc_length,
            uc_length: raw.uc_length,
            decimals: raw.decimals,
            default_value: TextCodec::decode_all(&raw.default_value, true)?,
            parameter_text: TextCodec::decode_all(&raw.parameter_text, true)?,
            optional: raw.optional,
            type_desc,
        })
    }

    fn field(&mut self, raw: RawFieldDesc, depth: usize) -> Result<FieldDescription> {
        let name = TextCodec::decode_all(&raw.name, true)?;
        let kind = RfcType::from_code(raw.kind);
        let type_desc = self.nested(&name, kind, raw.type_handle, depth)?;

        Ok(FieldDescription {
            name,
            field_type: kind,
            nuc_length: raw.nuc_length,
            nuc_offset: raw.nuc_offset,
            uc_length: raw.uc_length,
            uc_offset: raw.uc_offset,
            decimals: raw.decimals,
            type_desc,
        })
    }

    fn nested(
        &mut self,
        name: &str,
        kind: RfcType,
        type_handle: Option<TypeHandle>,
        depth: usize,
    ) -> Result<Option<Arc<TypeDescription>>> {
        if !kind.is_complex() {
            return Ok(None);
        }
        match type_handle {
            Some(th) => self.resolve_type(th, depth + 1).map(Some),
            None => Err(RfcError::Internal(format!(
                "{} '{}' has no type handle",
                kind, name
            ))),
        }
    }

    fn resolve_type(&mut self, type_handle: TypeHandle, depth: usize) -> Result<Arc<TypeDescription>> {
        if let Some(known) = self.types.get(&type_handle) {
            return Ok(Arc::clone(known));
        }
        if depth > MAX_TYPE_DEPTH {
            return Err(RfcError::Internal(format!(
                "type nesting deeper than {} levels",
                MAX_TYPE_DEPTH
            )));
        }

        let raw = self
            .session
            .describe_type(self.handle, type_handle)
            .map_err(|info| RfcError::remote("Could not get type description", info))?;

        let mut type_desc = TypeDescription::new(TextCodec::decode_all(&raw.name, true)?);
        type_desc.nuc_length = raw.nuc_length;
        type_desc.uc_length = raw.uc_length;
        for raw_field in raw.fields {
            let field = self.field(raw_field, depth)?;
            type_desc.fields.push(field);
        }

        let type_desc = Arc::new(type_desc);
        self.types.insert(type_handle, Arc::clone(&type_desc));
        Ok(type_desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfcbridge_common::protocol::ConnectionParameters;
    use rfcbridge_common::transport::MemorySession;

    fn session_with(desc: FunctionDescription) -> (MemorySession, SessionHandle) {
        let session = MemorySession::new().with_function(desc, |_, _| Ok(()));
        let handle = session
            .open(&ConnectionParameters::new().with("ashost", "localhost"))
            .unwrap();
        (session, handle)
    }

    #[test]
    fn test_describe_resolves_nested_types() {
        let inner = Arc::new(
            TypeDescription::new("ZINNER")
                .field(FieldDescription::new("ID", RfcType::Int, 4))
                .field(FieldDescription::new("AMOUNT", RfcType::Bcd, 8).with_decimals(2)),
        );
        let outer = Arc::new(
            TypeDescription::new("ZOUTER")
                .field(FieldDescription::new("NAME", RfcType::Char, 10))
                .field(FieldDescription::new("LINES", RfcType::Table, 8).with_type(inner.clone())),
        );
        let desc = FunctionDescription::new("Z_NESTED")
            .parameter(
                ParameterDescription::new("IV_FLAG", RfcType::Char, Direction::Import, 1)
                    .optional()
                    .with_default("X")
                    .with_text("Flag"),
            )
            .parameter(ParameterDescription::complex("ES_OUT", RfcType::Structure, Direction::Export, outer))
            .parameter(ParameterDescription::complex("ET_IN", RfcType::Table, Direction::Tables, inner));
        let (session, handle) = session_with(desc.clone());

        let resolved = describe_function(&session, handle, "Z_NESTED").unwrap();
        assert_eq!(resolved, desc);

        let flag = resolved.parameter_by_name("IV_FLAG").unwrap();
        assert!(flag.optional);
        assert_eq!(flag.default_value, "X");
        assert_eq!(flag.parameter_text, "Flag");
    }

    #[test]
    fn test_describe_shares_repeated_types() {
        let line = Arc::new(TypeDescription::new("ZLINE").field(FieldDescription::new("ID", RfcType::Int, 4)));
        let desc = FunctionDescription::new("Z_TWICE")
            .parameter(ParameterDescription::complex("A", RfcType::Table, Direction::Tables, line.clone()))
            .parameter(ParameterDescription::complex("B", RfcType::Structure, Direction::Import, line));
        let (session, handle) = session_with(desc);

        let resolved = describe_function(&session, handle, "Z_TWICE").unwrap();
        let a = resolved.parameters[0].type_desc.as_ref().unwrap();
        let b = resolved.parameters[1].type_desc.as_ref().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_describe_unknown_function() {
        let (session, handle) = session_with(FunctionDescription::new("Z_KNOWN"));
        let err = describe_function(&session, handle, "Z_UNKNOWN").unwrap_err();
        assert!(err.is_remote());
        assert!(err.to_string().contains("Z_UNKNOWN"));
    }

    #[test]
    fn test_cache_insert_get_clear() {
        let cache = SchemaCache::new();
        assert!(cache.is_empty());

        cache.insert(Arc::new(FunctionDescription::new("Z_A")));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("Z_A").is_some());
        assert!(cache.get("Z_B").is_none());

        cache.clear();
        assert!(cache.get("Z_A").is_none());
    }
}
