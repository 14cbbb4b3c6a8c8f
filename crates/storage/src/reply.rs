//! Reply enum for command execution results.
//!
//! Every command produces exactly one reply shape; the mapping is
//! documented on each [`Command`](crate::Command) variant. The `into_*`
//! accessors convert a reply into the shape the caller expects and fail
//! with `Error::UnexpectedReply` otherwise.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tessera_core::{Error, Result};

/// Successful command execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Absent value
    Nil,
    /// Status line, e.g. `OK`
    Status(String),
    /// Integer result
    Int(i64),
    /// String result
    Bulk(String),
    /// Multiple results
    Array(Vec<Reply>),
}

impl Reply {
    /// The `OK` status
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Build an array of bulk strings
    pub fn bulks<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::Array(items.into_iter().map(|s| Reply::Bulk(s.into())).collect())
    }

    /// Integer reply; bulk strings holding an integer are accepted too
    pub fn into_int(self) -> Result<i64> {
        match self {
            Reply::Int(i) => Ok(i),
            Reply::Bulk(ref s) => s
                .parse()
                .map_err(|_| Error::unexpected_reply("integer", &self)),
            other => Err(Error::unexpected_reply("integer", other)),
        }
    }

    /// Integer reply read as a flag
    pub fn into_bool(self) -> Result<bool> {
        Ok(self.into_int()? != 0)
    }

    /// Bulk or nil reply
    pub fn into_opt_string(self) -> Result<Option<String>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Bulk(s) | Reply::Status(s) => Ok(Some(s)),
            Reply::Int(i) => Ok(Some(i.to_string())),
            other => Err(Error::unexpected_reply("bulk or nil", other)),
        }
    }

    /// Array reply
    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(Error::unexpected_reply("array", other)),
        }
    }

    /// Array of bulk strings
    pub fn into_strings(self) -> Result<Vec<String>> {
        self.into_array()?
            .into_iter()
            .map(|r| {
                r.into_opt_string()?
                    .ok_or_else(|| Error::unexpected_reply("bulk", Reply::Nil))
            })
            .collect()
    }

    /// Array of bulk-or-nil entries
    pub fn into_opt_strings(self) -> Result<Vec<Option<String>>> {
        self.into_array()?
            .into_iter()
            .map(Reply::into_opt_string)
            .collect()
    }

    /// Flat field/value array (as returned by `HGETALL`) into a map
    pub fn into_hash(self) -> Result<HashMap<String, String>> {
        let items = self.into_strings()?;
        if items.len() % 2 != 0 {
            return Err(Error::unexpected_reply("field/value pairs", items));
        }
        let mut map = HashMap::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }
}
