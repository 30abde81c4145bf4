//! Process-wide, content-addressable map from a parameter tag to the pair of
//! (decoder, service factory) needed to serve it.
//!
//! A tag is registered exactly once per parameter type, and the same tag
//! always resolves to the same concrete types.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, FastFlightError, Result};
use crate::param::{ParamTag, Parameter};
use crate::service::ServiceHandler;

/// Decodes ticket bytes into a type-erased parameter, for a single concrete type.
type Decoder = Arc<dyn Fn(&[u8]) -> Result<Box<dyn Parameter>> + Send + Sync>;

/// Builds a fresh service instance for a single concrete type.
type ServiceFactory = Arc<dyn Fn() -> Box<dyn ServiceHandler> + Send + Sync>;

/// Everything the registry knows about one tag.
#[derive(Clone)]
struct RegistryEntry {
    tag: &'static str,
    param_type_id: TypeId,
    decode: Decoder,
    make_service: ServiceFactory,
}

/// Process-wide tag -> (parameter type, service handler) directory, plus a
/// separate index of short aliases that resolve to the same entry.
///
/// Reads (`decode`, `make_service`, `tags`) take a read lock; only `register`,
/// `register_alias`, and `unregister` take a write lock, so concurrent `do_get`
/// dispatch never blocks on registration after startup.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<&'static str, RegistryEntry>>,
    aliases: RwLock<HashMap<&'static str, &'static str>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()), aliases: RwLock::new(HashMap::new()) }
    }

    /// Registers `P` (with its bound service handler built by `make_service`) under
    /// `P::TAG`. Re-registering the same concrete type under the same tag is a no-op;
    /// registering a different type under an already-used tag is an error, since a
    /// tag must always resolve to the same parameter type.
    pub fn register<P, S, F>(&self, make_service: F) -> Result<()>
    where
        P: Parameter + ParamTag + DeserializeOwned + 'static,
        S: ServiceHandler + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let tag = P::TAG;
        let param_type_id = TypeId::of::<P>();

        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some(existing) = entries.get(tag) {
            if existing.param_type_id == param_type_id {
                return Ok(());
            }
            return Err(FastFlightError::new(
                ErrorKind::Internal,
                format!("tag '{tag}' is already registered to a different parameter type"),
            ));
        }

        let decode: Decoder = Arc::new(|bytes| crate::param::decode_erased::<P>(bytes));
        let make_service: ServiceFactory = Arc::new(move || Box::new(make_service()) as Box<dyn ServiceHandler>);

        entries.insert(tag, RegistryEntry { tag, param_type_id, decode, make_service });
        Ok(())
    }

    /// Registers `alias` as an additional lookup key for the already-registered
    /// `tag`. Re-registering the same (alias, tag) pair is a no-op; aliasing an
    /// unregistered tag, or an alias that collides with an existing tag or a
    /// different tag's alias, is an error.
    pub fn register_alias(&self, alias: &'static str, tag: &'static str) -> Result<()> {
        {
            let entries = self.entries.read().expect("registry lock poisoned");
            if !entries.contains_key(tag) {
                return Err(FastFlightError::new(
                    ErrorKind::Internal,
                    format!("cannot register alias '{alias}' for unregistered tag '{tag}'"),
                ));
            }
            if entries.contains_key(alias) {
                return Err(FastFlightError::new(
                    ErrorKind::Internal,
                    format!("alias '{alias}' collides with a registered tag"),
                ));
            }
        }

        let mut aliases = self.aliases.write().expect("registry lock poisoned");
        if let Some(existing) = aliases.get(alias) {
            if *existing == tag {
                return Ok(());
            }
            return Err(FastFlightError::new(
                ErrorKind::Internal,
                format!("alias '{alias}' is already registered to a different tag"),
            ));
        }
        aliases.insert(alias, tag);
        Ok(())
    }

    /// Removes a tag's registration and any aliases pointing to it. No-op if the
    /// tag isn't registered.
    pub fn unregister(&self, tag: &str) -> Result<()> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.remove(tag);
        drop(entries);

        let mut aliases = self.aliases.write().expect("registry lock poisoned");
        aliases.retain(|_, canonical| *canonical != tag);
        Ok(())
    }

    /// Resolves a tag or alias to the canonical registered tag.
    fn canonical_tag(&self, tag: &str) -> Option<&'static str> {
        let entries = self.entries.read().expect("registry lock poisoned");
        if let Some(entry) = entries.get(tag) {
            return Some(entry.tag);
        }
        drop(entries);
        self.aliases.read().expect("registry lock poisoned").get(tag).copied()
    }

    /// Decodes ticket bytes whose `param_type` tag isn't known at the call site,
    /// looking the decoder up by the tag (or alias) embedded in the bytes.
    pub fn decode_ticket(&self, bytes: &[u8]) -> Result<Box<dyn Parameter>> {
        let tag = peek_param_type(bytes)?;
        let canonical = self
            .canonical_tag(&tag)
            .ok_or_else(|| FastFlightError::new(ErrorKind::UnknownParamType, format!("no service registered for tag '{tag}'")))?;
        let entries = self.entries.read().expect("registry lock poisoned");
        let entry = entries
            .get(canonical)
            .ok_or_else(|| FastFlightError::new(ErrorKind::UnknownParamType, format!("no service registered for tag '{tag}'")))?;
        (entry.decode)(bytes)
    }

    /// Builds a fresh service handler for the given tag or alias.
    pub fn make_service(&self, tag: &str) -> Result<Box<dyn ServiceHandler>> {
        let canonical = self
            .canonical_tag(tag)
            .ok_or_else(|| FastFlightError::new(ErrorKind::UnknownParamType, format!("no service registered for tag '{tag}'")))?;
        let entries = self.entries.read().expect("registry lock poisoned");
        let entry = entries
            .get(canonical)
            .ok_or_else(|| FastFlightError::new(ErrorKind::UnknownParamType, format!("no service registered for tag '{tag}'")))?;
        Ok((entry.make_service)())
    }

    /// Lists all currently-registered tags, for the gateway's `GET /params` endpoint.
    /// Aliases are not listed; only canonical tags are.
    pub fn tags(&self) -> Vec<&'static str> {
        let entries = self.entries.read().expect("registry lock poisoned");
        let mut tags: Vec<_> = entries.values().map(|e| e.tag).collect();
        tags.sort_unstable();
        tags
    }

    /// True if `tag` resolves to a registered entry, directly or via alias.
    pub fn is_registered(&self, tag: &str) -> bool {
        self.canonical_tag(tag).is_some()
    }
}

/// Reads just the `param_type` field out of ticket bytes without committing to a
/// concrete parameter type, so the registry can pick the right decoder.
fn peek_param_type(bytes: &[u8]) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| FastFlightError::with_source(ErrorKind::BadTicket, e.to_string(), e.into()))?;
    value
        .get(crate::param::PARAM_TYPE_KEY)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| FastFlightError::new(ErrorKind::BadTicket, "ticket missing required param_type key"))
}

/// Registers several (parameter type, service factory) pairs against one registry in
/// one call, for server bootstrap code that wires up every known backend at once.
#[macro_export]
macro_rules! register_all {
    ($registry:expr, [ $( ($param:ty, $make_service:expr) ),+ $(,)? ]) => {
        $(
            $registry.register::<$param, _, _>($make_service)?;
        )+
    };
}
