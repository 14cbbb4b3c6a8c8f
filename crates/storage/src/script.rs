//! Server-side script facility
//!
//! A script is a body of text plus the procedure the store runs for it.
//! The body's content hash is the script's identity: callers submit the
//! body once (`script_load`) and afterwards refer to it by hash
//! (`eval_sha`). A store that has never seen, or has forgotten, a hash
//! answers `Error::NoScript`.
//!
//! While a procedure runs it has exclusive access to the [`Keyspace`];
//! nothing else can observe or interleave with its intermediate state.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tessera_core::Result;

use crate::keyspace::Keyspace;
use crate::reply::Reply;

/// Executable side of a script
pub trait Procedure: Send + Sync {
    /// Run against the keyspace with the script's `KEYS` and `ARGV`
    fn call(&self, keyspace: &mut Keyspace, keys: &[String], args: &[String]) -> Result<Reply>;
}

/// A loadable script: body text and the procedure it denotes
#[derive(Clone)]
pub struct Script {
    body: String,
    sha: String,
    procedure: Arc<dyn Procedure>,
}

impl Script {
    /// Build a script; the hash is computed from `body` as given
    pub fn new(body: impl Into<String>, procedure: Arc<dyn Procedure>) -> Self {
        let body = body.into();
        let sha = content_hash(&body);
        Self {
            body,
            sha,
            procedure,
        }
    }

    /// Body text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Lower-case hex SHA-256 of the body
    pub fn sha(&self) -> &str {
        &self.sha
    }

    /// The procedure to execute
    pub fn procedure(&self) -> Arc<dyn Procedure> {
        Arc::clone(&self.procedure)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("sha", &self.sha)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Lower-case hex SHA-256 of a script body
pub fn content_hash(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
