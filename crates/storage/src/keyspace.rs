//! In-memory keyspace
//!
//! The data structures behind [`MemoryStore`](crate::MemoryStore) and the
//! surface server-side procedures program against.
//!
//! # Design
//!
//! - FxHashMap: O(1) key lookup, fast non-crypto hash
//! - BTreeSet for sets: members come back in ascending order, so replies
//!   are deterministic
//! - VecDeque for lists: O(1) push/pop at both ends
//!
//! Empty hashes, sets and lists are removed as soon as they become empty,
//! so "absent" and "empty" are the same observable state.
//!
//! Methods take `&self` for reads and `&mut self` for writes; the owner
//! decides how the keyspace is shared.

use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};
use tessera_core::{Error, Result};

use crate::command::{Command, SortSpec};
use crate::reply::Reply;

/// A value held by one key
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Plain string (counters, lock stamps)
    String(String),
    /// Field/value map
    Hash(FxHashMap<String, String>),
    /// Unordered member set (stored ordered)
    Set(BTreeSet<String>),
    /// Ordered list
    List(VecDeque<String>),
}

impl Entry {
    /// Kind name used in `WrongType` errors
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::String(_) => "string",
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::List(_) => "list",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Entry::String(_) => false,
            Entry::Hash(h) => h.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::List(l) => l.is_empty(),
        }
    }
}

fn wrong_type(key: &str, expected: &str) -> Error {
    Error::WrongType {
        key: key.to_string(),
        expected: expected.to_string(),
    }
}

fn not_an_integer(key: &str) -> Error {
    Error::Store {
        reason: format!("value at {} is not an integer", key),
    }
}

/// The whole keyspace
#[derive(Debug, Default, Clone)]
pub struct Keyspace {
    data: FxHashMap<String, Entry>,
}

impl Keyspace {
    /// Create an empty keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no key exists
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw entry lookup
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.data.get(key)
    }

    fn prune(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Entry::is_empty) {
            self.data.remove(key);
        }
    }

    // ========================================================================
    // Typed accessors
    // ========================================================================

    fn hash(&self, key: &str) -> Result<Option<&FxHashMap<String, String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut FxHashMap<String, String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(FxHashMap::default()))
        {
            Entry::Hash(h) => Ok(h),
            _ => Err(wrong_type(key, "hash")),
        }
    }

    fn set(&self, key: &str) -> Result<Option<&BTreeSet<String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(s) => Ok(s),
            _ => Err(wrong_type(key, "set")),
        }
    }

    fn list(&self, key: &str) -> Result<Option<&VecDeque<String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::List(l)) => Ok(Some(l)),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(l) => Ok(l),
            _ => Err(wrong_type(key, "list")),
        }
    }

    // ========================================================================
    // Strings and keys
    // ========================================================================

    /// GET
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    /// SET
    pub fn set_string(&mut self, key: &str, value: &str) {
        self.data
            .insert(key.to_string(), Entry::String(value.to_string()));
    }

    /// SETNX; true if written
    pub fn setnx(&mut self, key: &str, value: &str) -> bool {
        if self.data.contains_key(key) {
            return false;
        }
        self.set_string(key, value);
        true
    }

    /// GETSET
    pub fn getset(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        let old = self.get(key)?;
        self.set_string(key, value);
        Ok(old)
    }

    /// DEL; number of keys removed
    pub fn del<S: AsRef<str>>(&mut self, keys: &[S]) -> i64 {
        keys.iter()
            .filter(|k| self.data.remove(k.as_ref()).is_some())
            .count() as i64
    }

    /// EXISTS
    pub fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// INCRBY
    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        let current = match self.get(key)? {
            Some(s) => s.parse::<i64>().map_err(|_| not_an_integer(key))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| not_an_integer(key))?;
        self.set_string(key, &next.to_string());
        Ok(next)
    }

    /// KEYS; sorted
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// FLUSHDB
    pub fn flush(&mut self) {
        self.data.clear();
    }

    // ========================================================================
    // Hashes
    // ========================================================================

    /// HGET
    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    /// HSET; true if the field is new
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        Ok(self
            .hash_mut(key)?
            .insert(field.to_string(), value.to_string())
            .is_none())
    }

    /// HSETNX; true if written
    pub fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        if self.hget(key, field)?.is_some() {
            return Ok(false);
        }
        self.hset(key, field, value)
    }

    /// HMSET
    pub fn hmset(&mut self, key: &str, pairs: &[(String, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let hash = self.hash_mut(key)?;
        for (field, value) in pairs {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    /// HDEL; number of fields removed
    pub fn hdel<S: AsRef<str>>(&mut self, key: &str, fields: &[S]) -> Result<i64> {
        if self.hash(key)?.is_none() {
            return Ok(0);
        }
        let hash = self.hash_mut(key)?;
        let removed = fields
            .iter()
            .filter(|f| hash.remove(f.as_ref()).is_some())
            .count() as i64;
        self.prune(key);
        Ok(removed)
    }

    /// HGETALL; pairs sorted by field
    pub fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = self
            .hash(key)?
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default();
        pairs.sort();
        Ok(pairs)
    }

    /// HKEYS; sorted
    pub fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.hgetall(key)?.into_iter().map(|(f, _)| f).collect())
    }

    /// HINCRBY
    pub fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let current = match self.hget(key, field)? {
            Some(s) => s.parse::<i64>().map_err(|_| not_an_integer(key))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| not_an_integer(key))?;
        self.hset(key, field, &next.to_string())?;
        Ok(next)
    }

    // ========================================================================
    // Sets
    // ========================================================================

    /// SADD; number of members added
    pub fn sadd<S: AsRef<str>>(&mut self, key: &str, members: &[S]) -> Result<i64> {
        if members.is_empty() {
            return Ok(0);
        }
        let set = self.set_mut(key)?;
        Ok(members
            .iter()
            .filter(|m| set.insert(m.as_ref().to_string()))
            .count() as i64)
    }

    /// SREM; number of members removed
    pub fn srem<S: AsRef<str>>(&mut self, key: &str, members: &[S]) -> Result<i64> {
        if self.set(key)?.is_none() {
            return Ok(0);
        }
        let set = self.set_mut(key)?;
        let removed = members.iter().filter(|m| set.remove(m.as_ref())).count() as i64;
        self.prune(key);
        Ok(removed)
    }

    /// SMEMBERS; ascending
    pub fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// SCARD
    pub fn scard(&self, key: &str) -> Result<i64> {
        Ok(self.set(key)?.map(|s| s.len() as i64).unwrap_or(0))
    }

    /// SISMEMBER
    pub fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.set(key)?.is_some_and(|s| s.contains(member)))
    }

    fn sets_of<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<BTreeSet<String>>> {
        keys.iter()
            .map(|k| Ok(self.set(k.as_ref())?.cloned().unwrap_or_default()))
            .collect()
    }

    /// SINTER
    pub fn sinter<S: AsRef<str>>(&self, keys: &[S]) -> Result<BTreeSet<String>> {
        let mut sets = self.sets_of(keys)?.into_iter();
        let first = sets.next().unwrap_or_default();
        Ok(sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect()))
    }

    /// SUNION
    pub fn sunion<S: AsRef<str>>(&self, keys: &[S]) -> Result<BTreeSet<String>> {
        Ok(self.sets_of(keys)?.into_iter().flatten().collect())
    }

    /// SDIFF
    pub fn sdiff<S: AsRef<str>>(&self, keys: &[S]) -> Result<BTreeSet<String>> {
        let mut sets = self.sets_of(keys)?.into_iter();
        let first = sets.next().unwrap_or_default();
        Ok(sets.fold(first, |acc, s| acc.difference(&s).cloned().collect()))
    }

    fn store_set(&mut self, dest: &str, result: BTreeSet<String>) -> i64 {
        let len = result.len() as i64;
        if result.is_empty() {
            self.data.remove(dest);
        } else {
            self.data.insert(dest.to_string(), Entry::Set(result));
        }
        len
    }

    /// SINTERSTORE
    pub fn sinterstore<S: AsRef<str>>(&mut self, dest: &str, keys: &[S]) -> Result<i64> {
        let result = self.sinter(keys)?;
        Ok(self.store_set(dest, result))
    }

    /// SUNIONSTORE
    pub fn sunionstore<S: AsRef<str>>(&mut self, dest: &str, keys: &[S]) -> Result<i64> {
        let result = self.sunion(keys)?;
        Ok(self.store_set(dest, result))
    }

    /// SDIFFSTORE
    pub fn sdiffstore<S: AsRef<str>>(&mut self, dest: &str, keys: &[S]) -> Result<i64> {
        let result = self.sdiff(keys)?;
        Ok(self.store_set(dest, result))
    }

    // ========================================================================
    // Lists
    // ========================================================================

    /// LPUSH; new length
    pub fn lpush<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> Result<i64> {
        if values.is_empty() {
            return Ok(self.llen(key)?);
        }
        let list = self.list_mut(key)?;
        for v in values {
            list.push_front(v.as_ref().to_string());
        }
        Ok(list.len() as i64)
    }

    /// RPUSH; new length
    pub fn rpush<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> Result<i64> {
        if values.is_empty() {
            return Ok(self.llen(key)?);
        }
        let list = self.list_mut(key)?;
        for v in values {
            list.push_back(v.as_ref().to_string());
        }
        Ok(list.len() as i64)
    }

    /// LPOP
    pub fn lpop(&mut self, key: &str) -> Result<Option<String>> {
        if self.list(key)?.is_none() {
            return Ok(None);
        }
        let value = self.list_mut(key)?.pop_front();
        self.prune(key);
        Ok(value)
    }

    /// RPOP
    pub fn rpop(&mut self, key: &str) -> Result<Option<String>> {
        if self.list(key)?.is_none() {
            return Ok(None);
        }
        let value = self.list_mut(key)?.pop_back();
        self.prune(key);
        Ok(value)
    }

    /// LRANGE; inclusive, negative indices count from the tail
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let Some(list) = self.list(key)? else {
            return Ok(Vec::new());
        };
        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    /// LLEN
    pub fn llen(&self, key: &str) -> Result<i64> {
        Ok(self.list(key)?.map(|l| l.len() as i64).unwrap_or(0))
    }

    /// LREM; number removed
    pub fn lrem(&mut self, key: &str, count: i64, value: &str) -> Result<i64> {
        if self.list(key)?.is_none() {
            return Ok(0);
        }
        let list = self.list_mut(key)?;
        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0usize;
        if count >= 0 {
            let mut i = 0;
            while i < list.len() && removed < limit {
                if list[i] == value {
                    list.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = list.len();
            while i > 0 && removed < limit {
                i -= 1;
                if list[i] == value {
                    list.remove(i);
                    removed += 1;
                }
            }
        }
        self.prune(key);
        Ok(removed as i64)
    }

    // ========================================================================
    // Sort
    // ========================================================================

    /// SORT
    pub fn sort(&self, key: &str, spec: &SortSpec) -> Result<Vec<Option<String>>> {
        crate::sort::sort(self, key, spec)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Execute a read-only command
    ///
    /// Fails with `Error::InvalidInput` for mutating commands.
    pub fn read(&self, command: &Command) -> Result<Reply> {
        let reply = match command {
            Command::Get { key } => opt(self.get(key)?),
            Command::Exists { key } => Reply::Int(self.exists(key) as i64),
            Command::Keys { pattern } => Reply::bulks(self.keys(pattern)),
            Command::HGet { key, field } => opt(self.hget(key, field)?),
            Command::HGetAll { key } => Reply::bulks(
                self.hgetall(key)?
                    .into_iter()
                    .flat_map(|(f, v)| [f, v]),
            ),
            Command::HKeys { key } => Reply::bulks(self.hkeys(key)?),
            Command::SMembers { key } => Reply::bulks(self.smembers(key)?),
            Command::SCard { key } => Reply::Int(self.scard(key)?),
            Command::SIsMember { key, member } => {
                Reply::Int(self.sismember(key, member)? as i64)
            }
            Command::LRange { key, start, stop } => Reply::bulks(self.lrange(key, *start, *stop)?),
            Command::LLen { key } => Reply::Int(self.llen(key)?),
            Command::Sort { key, spec } => {
                Reply::Array(self.sort(key, spec)?.into_iter().map(opt).collect())
            }
            Command::DbSize => Reply::Int(self.len() as i64),
            other => {
                return Err(Error::invalid_input(format!(
                    "{} is not a read-only command",
                    other.name()
                )))
            }
        };
        Ok(reply)
    }

    /// Execute any command
    pub fn apply(&mut self, command: &Command) -> Result<Reply> {
        if command.is_read_only() {
            return self.read(command);
        }
        let reply = match command {
            Command::Set { key, value } => {
                self.set_string(key, value);
                Reply::ok()
            }
            Command::SetNx { key, value } => Reply::Int(self.setnx(key, value) as i64),
            Command::GetSet { key, value } => opt(self.getset(key, value)?),
            Command::Del { keys } => Reply::Int(self.del(keys)),
            Command::Incr { key } => Reply::Int(self.incr_by(key, 1)?),
            Command::IncrBy { key, delta } => Reply::Int(self.incr_by(key, *delta)?),
            Command::HSet { key, field, value } => {
                Reply::Int(self.hset(key, field, value)? as i64)
            }
            Command::HSetNx { key, field, value } => {
                Reply::Int(self.hsetnx(key, field, value)? as i64)
            }
            Command::HMSet { key, pairs } => {
                self.hmset(key, pairs)?;
                Reply::ok()
            }
            Command::HDel { key, fields } => Reply::Int(self.hdel(key, fields)?),
            Command::HIncrBy { key, field, delta } => {
                Reply::Int(self.hincr_by(key, field, *delta)?)
            }
            Command::SAdd { key, members } => Reply::Int(self.sadd(key, members)?),
            Command::SRem { key, members } => Reply::Int(self.srem(key, members)?),
            Command::SInterStore { dest, keys } => Reply::Int(self.sinterstore(dest, keys)?),
            Command::SUnionStore { dest, keys } => Reply::Int(self.sunionstore(dest, keys)?),
            Command::SDiffStore { dest, keys } => Reply::Int(self.sdiffstore(dest, keys)?),
            Command::LPush { key, values } => Reply::Int(self.lpush(key, values)?),
            Command::RPush { key, values } => Reply::Int(self.rpush(key, values)?),
            Command::LPop { key } => opt(self.lpop(key)?),
            Command::RPop { key } => opt(self.rpop(key)?),
            Command::LRem { key, count, value } => Reply::Int(self.lrem(key, *count, value)?),
            Command::FlushDb => {
                self.flush();
                Reply::ok()
            }
            // Read-only commands were handled above
            other => return self.read(other),
        };
        Ok(reply)
    }
}

fn opt(value: Option<String>) -> Reply {
    value.map(Reply::Bulk).unwrap_or(Reply::Nil)
}

/// Glob match supporting `*` (any run) and `?` (any one character)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
