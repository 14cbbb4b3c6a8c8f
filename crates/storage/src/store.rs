//! Store trait and the embedded in-memory store
//!
//! The persistence layer only ever talks to a [`Store`]: single commands,
//! pipelines (many commands, one round trip, not atomic), `multi` blocks
//! (atomic), and the script facility.
//!
//! [`MemoryStore`] is the embedded implementation:
//! - `parking_lot::RwLock` around the keyspace: read-only commands share
//!   the lock, everything else (including whole scripts and `multi`
//!   blocks) runs under the exclusive lock
//! - DashMap for the loaded-script table, so EVALSHA lookups never touch
//!   the keyspace lock
//! - A round-trip counter, so callers can verify batching

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{Error, Result};
use tracing::{debug, trace};

use crate::command::Command;
use crate::keyspace::Keyspace;
use crate::reply::Reply;
use crate::script::{content_hash, Procedure, Script};

/// Command surface consumed by the persistence layer
///
/// Implementations must be `Send + Sync`; every call is a synchronous
/// round trip.
pub trait Store: Send + Sync {
    /// Execute one command
    fn execute(&self, command: Command) -> Result<Reply>;

    /// Execute several commands in one round trip, without atomicity
    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Execute several commands atomically
    ///
    /// Every command runs even if an earlier one fails; the first failure
    /// is then returned.
    fn multi(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// True if `script_load`/`eval_sha` are available
    fn supports_scripting(&self) -> bool;

    /// Load a script; returns its content hash
    fn script_load(&self, script: &Script) -> Result<String>;

    /// Run a loaded script by content hash
    ///
    /// Fails with `Error::NoScript` if the hash is unknown.
    fn eval_sha(&self, sha: &str, keys: &[String], args: &[String]) -> Result<Reply>;
}

/// Configuration for [`MemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Offer the script facility
    pub scripting: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { scripting: true }
    }
}

/// Embedded in-memory store
///
/// # Example
///
/// ```
/// use tessera_storage::{Command, MemoryStore, Reply, Store};
///
/// let store = MemoryStore::new();
/// store.execute(Command::SAdd { key: "User:all".into(), members: vec!["1".into()] }).unwrap();
/// let card = store.execute(Command::SCard { key: "User:all".into() }).unwrap();
/// assert_eq!(card, Reply::Int(1));
/// ```
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    scripts: DashMap<String, Arc<dyn Procedure>>,
    config: StoreConfig,
    connected: AtomicBool,
    round_trips: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_config(StoreConfig::default())
    }
}

impl MemoryStore {
    /// Store with scripting enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with explicit configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::new()),
            scripts: DashMap::new(),
            config,
            connected: AtomicBool::new(true),
            round_trips: AtomicU64::new(0),
        }
    }

    /// Store without the script facility
    pub fn without_scripting() -> Self {
        Self::with_config(StoreConfig { scripting: false })
    }

    /// Simulate losing the connection; every call fails until
    /// [`reconnect`](Self::reconnect)
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Restore the connection
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Forget every loaded script (SCRIPT FLUSH)
    pub fn script_flush(&self) {
        self.scripts.clear();
    }

    /// True if a script with this hash is loaded
    pub fn script_exists(&self, sha: &str) -> bool {
        self.scripts.contains_key(sha)
    }

    /// Number of round trips served so far
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Keys matching a glob, bypassing the round-trip counter
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        self.keyspace.read().keys(pattern)
    }

    /// Clone of the whole keyspace, for before/after comparisons
    pub fn snapshot(&self) -> Keyspace {
        self.keyspace.read().clone()
    }

    fn round_trip(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                reason: "connection closed".to_string(),
            });
        }
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn run(&self, command: &Command) -> Result<Reply> {
        trace!(target: "tessera::store", command = command.name());
        if command.is_read_only() {
            self.keyspace.read().read(command)
        } else {
            self.keyspace.write().apply(command)
        }
    }
}

impl Store for MemoryStore {
    fn execute(&self, command: Command) -> Result<Reply> {
        self.round_trip()?;
        self.run(&command)
    }

    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.round_trip()?;
        commands.iter().map(|c| self.run(c)).collect()
    }

    fn multi(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.round_trip()?;
        let mut keyspace = self.keyspace.write();
        let mut replies = Vec::with_capacity(commands.len());
        let mut first_error = None;
        for command in &commands {
            match keyspace.apply(command) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    replies.push(Reply::Nil);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }

    fn supports_scripting(&self) -> bool {
        self.config.scripting
    }

    fn script_load(&self, script: &Script) -> Result<String> {
        self.round_trip()?;
        if !self.config.scripting {
            return Err(Error::ScriptingUnsupported);
        }
        let sha = content_hash(script.body());
        debug!(target: "tessera::store", sha = %sha, "script loaded");
        self.scripts.insert(sha.clone(), script.procedure());
        Ok(sha)
    }

    fn eval_sha(&self, sha: &str, keys: &[String], args: &[String]) -> Result<Reply> {
        self.round_trip()?;
        if !self.config.scripting {
            return Err(Error::ScriptingUnsupported);
        }
        // Clone out of the map before taking the keyspace lock
        let procedure = self
            .scripts
            .get(sha)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| Error::NoScript {
                sha: sha.to_string(),
            })?;
        let mut keyspace = self.keyspace.write();
        procedure.call(&mut keyspace, keys, args)
    }
}
