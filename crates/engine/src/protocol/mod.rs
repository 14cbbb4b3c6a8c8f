//! Save and delete protocols
//!
//! Two interchangeable implementations with the same observable results:
//! - `save`/`delete`: procedures run by the store as atomic scripts
//! - `locked`: command sequences guarded by a per-entity advisory lock,
//!   for stores without scripting
//!
//! [`Persistence`] picks one per configuration.
//!
//! ## Wire contract
//!
//! | Script | KEYS | ARGV | Reply |
//! |--------|------|------|-------|
//! | save | `[type, entity key?]` | `[name, value, ...]` | `[200, ["id", id]]` or `[500, [attr, "not_unique"]]` |
//! | delete | `[type, entity key]` | none | `[200, ["id", id]]` |

pub mod delete;
pub mod locked;
pub mod save;

use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{Error, Result, TypeKeys};
use tessera_storage::{Reply, Store};
use tracing::debug;

use crate::config::{LockConfig, PersistenceMode, TesseraConfig};
use crate::runner::{ScriptRunner, ScriptSource, DELETE, SAVE};

/// Success status
pub const STATUS_OK: i64 = 200;
/// Unique violation status
pub const STATUS_NOT_UNIQUE: i64 = 500;

const ID_FIELD: &str = "id";
const NOT_UNIQUE: &str = "not_unique";

/// `[200, ["id", id]]`
pub(crate) fn success(id: u64) -> Reply {
    Reply::Array(vec![
        Reply::Int(STATUS_OK),
        // Ids come from INCR or pass check_id, so they fit
        Reply::Array(vec![Reply::Bulk(ID_FIELD.to_string()), Reply::Int(id as i64)]),
    ])
}

/// `[500, [attribute, "not_unique"]]`
pub(crate) fn conflict(attribute: &str) -> Reply {
    Reply::Array(vec![
        Reply::Int(STATUS_NOT_UNIQUE),
        Reply::bulks([attribute, NOT_UNIQUE]),
    ])
}

/// Turn a protocol reply into an identity or a constraint error
pub fn decode_reply(type_name: &str, reply: Reply) -> Result<u64> {
    let items = reply.into_array()?;
    let (status, body) = match <[Reply; 2]>::try_from(items) {
        Ok([status, body]) => (status.into_int()?, body.into_strings()?),
        Err(items) => return Err(Error::unexpected_reply("[status, body]", items)),
    };
    match (status, body.as_slice()) {
        (STATUS_OK, [field, id]) if field == ID_FIELD => id
            .parse()
            .map_err(|_| Error::unexpected_reply("numeric id", id)),
        (STATUS_NOT_UNIQUE, [attribute, reason]) if reason == NOT_UNIQUE => {
            Err(Error::UniqueConstraintViolation {
                type_name: type_name.to_string(),
                attribute: attribute.clone(),
            })
        }
        _ => Err(Error::unexpected_reply("protocol reply", (status, &body))),
    }
}

/// Flatten attribute pairs into `[name, value, ...]`
pub fn flatten(attributes: &[(String, String)]) -> Vec<String> {
    attributes
        .iter()
        .flat_map(|(name, value)| [name.clone(), value.clone()])
        .collect()
}

/// Parse `[name, value, ...]`; a repeated name keeps its last value
pub(crate) fn pairs(args: &[String]) -> Result<BTreeMap<String, String>> {
    if args.len() % 2 != 0 {
        return Err(Error::script(format!(
            "attribute list has odd length {}",
            args.len()
        )));
    }
    Ok(args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// Type layout and optional identity from a script's KEYS
pub(crate) fn parse_keys(keys: &[String]) -> Result<(TypeKeys, Option<u64>)> {
    let type_name = keys
        .first()
        .ok_or_else(|| Error::script("missing type name in KEYS"))?;
    let layout = TypeKeys::new(type_name.as_str());
    let id = match keys.get(1) {
        Some(key) => {
            let id = layout.parse_entity_id(key).ok_or_else(|| {
                Error::script(format!("'{}' is not an entity key of {}", key, type_name))
            })?;
            Some(check_id(type_name, id)?)
        }
        None => None,
    };
    Ok((layout, id))
}

/// Identities travel as integer replies; anything above `i64::MAX` is refused
/// before a write happens
pub(crate) fn check_id(type_name: &str, id: u64) -> Result<u64> {
    i64::try_from(id).map(|_| id).map_err(|_| {
        Error::invalid_input(format!("{} id {} is out of range", type_name, id))
    })
}

/// Dispatches saves and deletes to the scripted or the locked path
pub struct Persistence {
    store: Arc<dyn Store>,
    runner: ScriptRunner,
    lock: LockConfig,
    scripted: bool,
}

impl Persistence {
    /// Build from configuration, resolving `mode = "auto"` against the store
    pub fn new(store: Arc<dyn Store>, config: &TesseraConfig) -> Result<Self> {
        config.validate()?;
        let scripted = match config.persistence_mode()? {
            PersistenceMode::Auto => store.supports_scripting(),
            PersistenceMode::Script => true,
            PersistenceMode::Lock => false,
        };
        let source = match &config.scripts_dir {
            Some(dir) => ScriptSource::Directory(dir.clone()),
            None => ScriptSource::Builtin,
        };
        Ok(Self {
            runner: ScriptRunner::new(Arc::clone(&store), source),
            store,
            lock: config.lock.clone(),
            scripted,
        })
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The script runner
    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// True if saves and deletes run as atomic scripts
    pub fn is_scripted(&self) -> bool {
        self.scripted
    }

    /// Save an entity; returns its (possibly new) identity
    ///
    /// `attributes` is the complete desired attribute set.
    pub fn save(
        &self,
        type_name: &str,
        id: Option<u64>,
        attributes: &[(String, String)],
    ) -> Result<u64> {
        if let Some(id) = id {
            check_id(type_name, id)?;
        }
        let result = if self.scripted {
            let layout = TypeKeys::new(type_name);
            let mut keys = vec![type_name.to_string()];
            if let Some(id) = id {
                keys.push(layout.entity(id).into_string());
            }
            let reply = self.runner.run(SAVE, &keys, &flatten(attributes))?;
            decode_reply(type_name, reply)
        } else {
            locked::save(self.store.as_ref(), &self.lock, type_name, id, attributes)
        };
        match &result {
            Ok(saved) => {
                debug!(target: "tessera::save", type_name, id = *saved, scripted = self.scripted, "saved")
            }
            Err(e) => {
                debug!(target: "tessera::save", type_name, error = %e, scripted = self.scripted, "save rejected")
            }
        }
        result
    }

    /// Delete an entity with everything it owns; a missing entity is a no-op
    pub fn delete(&self, type_name: &str, id: u64) -> Result<()> {
        check_id(type_name, id)?;
        if self.scripted {
            let keys = vec![
                type_name.to_string(),
                TypeKeys::new(type_name).entity(id).into_string(),
            ];
            let reply = self.runner.run(DELETE, &keys, &[])?;
            decode_reply(type_name, reply)?;
        } else {
            locked::delete(self.store.as_ref(), &self.lock, type_name, id)?;
        }
        debug!(target: "tessera::delete", type_name, id, scripted = self.scripted, "deleted");
        Ok(())
    }
}
