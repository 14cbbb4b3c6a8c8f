//! Persistence engine for Tessera
//!
//! This crate keeps an entity's hash, `all` membership, unique maps and
//! index sets consistent:
//! - ScriptRunner: EVALSHA with transparent reload on a script miss
//! - Save/Delete protocols: server-side procedures, one atomic unit each
//! - Locked fallback: the same protocols over plain commands, guarded by
//!   a per-entity advisory lock with expiry
//! - Persistence: picks the scripted or locked path per configuration
//! - TesseraConfig: `tessera.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod lock;
pub mod protocol;
pub mod runner;

pub use config::{LockConfig, PersistenceMode, TesseraConfig, CONFIG_FILE_NAME};
pub use lock::EntityLock;
pub use protocol::delete::DeleteProcedure;
pub use protocol::save::SaveProcedure;
pub use protocol::{decode_reply, flatten, Persistence, STATUS_NOT_UNIQUE, STATUS_OK};
pub use runner::{normalize, ScriptRunner, ScriptSource, DELETE, SAVE};
