//! ScriptRunner: run named server-side scripts by content hash
//!
//! Every call is an EVALSHA. When the store answers "no such script"
//! (a fresh server, a `SCRIPT FLUSH`, a failover) the runner submits the
//! body and retries exactly once. A second miss is a store failure.
//!
//! Bodies are read once per name and cached for the life of the runner.
//! Before hashing, lines are trimmed and blank lines and `--` comments are
//! dropped, so reformatting a listing does not change its identity.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::{Error, Result};
use tessera_storage::{Procedure, Reply, Script, Store};
use tracing::debug;

use crate::protocol::delete::DeleteProcedure;
use crate::protocol::save::SaveProcedure;

/// Name of the save script
pub const SAVE: &str = "save";
/// Name of the delete script
pub const DELETE: &str = "delete";

/// File extension of script listings
pub const SCRIPT_EXTENSION: &str = "proc";

const COMMENT_PREFIX: &str = "--";

static BUILTIN_SAVE: Lazy<String> = Lazy::new(|| normalize(include_str!("../scripts/save.proc")));
static BUILTIN_DELETE: Lazy<String> =
    Lazy::new(|| normalize(include_str!("../scripts/delete.proc")));

/// Where script bodies come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Listings compiled into the binary
    Builtin,
    /// `<dir>/<name>.proc`
    Directory(PathBuf),
}

/// Strip comments and blank lines, trim the rest
pub fn normalize(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

fn procedure_for(name: &str) -> Result<Arc<dyn Procedure>> {
    match name {
        SAVE => Ok(Arc::new(SaveProcedure)),
        DELETE => Ok(Arc::new(DeleteProcedure)),
        other => Err(Error::script(format!("unknown script '{}'", other))),
    }
}

/// Executes named scripts against a store
pub struct ScriptRunner {
    store: Arc<dyn Store>,
    source: ScriptSource,
    cache: DashMap<String, Script>,
}

impl ScriptRunner {
    /// Runner over `store` reading bodies from `source`
    pub fn new(store: Arc<dyn Store>, source: ScriptSource) -> Self {
        Self {
            store,
            source,
            cache: DashMap::new(),
        }
    }

    /// Where bodies are read from
    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    /// The script bound to `name`, reading its body on first use
    pub fn script(&self, name: &str) -> Result<Script> {
        if let Some(script) = self.cache.get(name) {
            return Ok(script.clone());
        }
        let procedure = procedure_for(name)?;
        let body = self.read_body(name)?;
        let script = Script::new(body, procedure);
        debug!(target: "tessera::script", name, sha = script.sha(), "script body cached");
        // A concurrent first use may have won; keep whichever landed first
        Ok(self
            .cache
            .entry(name.to_string())
            .or_insert(script)
            .value()
            .clone())
    }

    fn read_body(&self, name: &str) -> Result<String> {
        match &self.source {
            ScriptSource::Builtin => match name {
                SAVE => Ok(BUILTIN_SAVE.clone()),
                DELETE => Ok(BUILTIN_DELETE.clone()),
                other => Err(Error::script(format!("unknown script '{}'", other))),
            },
            ScriptSource::Directory(dir) => {
                let path = dir.join(format!("{}.{}", name, SCRIPT_EXTENSION));
                let raw = std::fs::read_to_string(&path).map_err(|e| Error::Io {
                    reason: format!("Failed to read script '{}': {}", path.display(), e),
                })?;
                Ok(normalize(&raw))
            }
        }
    }

    /// Run `name` with `keys`/`args`, loading it into the store on a miss
    pub fn run(&self, name: &str, keys: &[String], args: &[String]) -> Result<Reply> {
        let script = self.script(name)?;
        match self.store.eval_sha(script.sha(), keys, args) {
            Err(e) if e.is_script_miss() => {
                debug!(target: "tessera::script", name, sha = script.sha(), "script not loaded, submitting body");
                self.store.script_load(&script)?;
                match self.store.eval_sha(script.sha(), keys, args) {
                    Err(e) if e.is_script_miss() => Err(Error::Store {
                        reason: format!("script '{}' still unknown after load: {}", name, e),
                    }),
                    other => other,
                }
            }
            other => other,
        }
    }
}
