//! Collections of entity identities
//!
//! Every collection wraps one store key holding ids of a model type:
//! - [`Set`]: a raw set key (`{Type}:all`, an index set)
//! - [`MutableSet`]: a set owned by an entity (`{Type}:{id}:{name}`)
//! - [`List`]: a list owned by an entity
//! - [`MultiSet`]: the result of `find`/`except`/`union`
//!
//! ## Scratch keys
//!
//! Set algebra is computed by the store into scratch keys named
//! `{Type}:tmp:{uuid}`. A `MultiSet` only *plans* that work: each terminal
//! operation sends the setup commands, its read and the deletion of every
//! scratch key in one `multi`. Scratch keys never outlive the call, even
//! when the read fails, and concurrent queries never share one.
//!
//! ## Round trips
//!
//! `ids`, `size`, `contains`: 1. `all`, `sort`, `sort_by`: 2 (ids, then one
//! pipelined fetch of every hash).

use std::marker::PhantomData;
use tessera_core::{Error, Result, TypeKeys, Value};
use tessera_storage::{Command, Reply, SortSpec};
use uuid::Uuid;

use crate::db::Db;
use crate::model::Model;

// ============================================================================
// Criteria
// ============================================================================

/// Ordered `(attribute, values)` filters
///
/// `eq` matches one value; `any_of` matches any of several (their index
/// sets are unioned before intersecting with the rest).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    terms: Vec<(String, Vec<Value>)>,
}

impl Criteria {
    /// No filters
    pub fn new() -> Self {
        Self::default()
    }

    /// `attribute == value`
    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((attribute.into(), vec![value.into()]));
        self
    }

    /// `attribute` is one of `values`
    pub fn any_of<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.terms.push((
            attribute.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// True if there are no filters
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

// ============================================================================
// Sort options
// ============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// Options of `sort`, `sort_by` and `first`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// Direction
    pub order: Order,
    /// Compare as strings instead of numbers
    pub alpha: bool,
    /// `(offset, count)`
    pub limit: Option<(usize, usize)>,
}

impl SortOptions {
    /// Ascending, numeric, unlimited
    pub fn new() -> Self {
        Self::default()
    }

    /// Descending
    pub fn desc(mut self) -> Self {
        self.order = Order::Desc;
        self
    }

    /// Compare as strings
    pub fn alpha(mut self) -> Self {
        self.alpha = true;
        self
    }

    /// Skip `offset`, return at most `count`
    pub fn limit(mut self, offset: usize, count: usize) -> Self {
        self.limit = Some((offset, count));
        self
    }

    fn spec(&self, by: Option<String>, get: Vec<String>) -> SortSpec {
        SortSpec {
            by,
            limit: self.limit,
            get,
            descending: self.order == Order::Desc,
            alpha: self.alpha,
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Storage shape of the key a collection reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A set key
    Set,
    /// A list key
    List,
}

/// The key a collection reads, plus the scratch work that produces it
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    setup: Vec<Command>,
    key: String,
    scratch: Vec<String>,
}

impl Plan {
    /// A plain key; nothing to compute
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            setup: Vec::new(),
            key: key.into(),
            scratch: Vec::new(),
        }
    }

    /// Key the reads target
    pub fn target(&self) -> &str {
        &self.key
    }

    /// True if reads go straight to a stored key
    pub fn is_direct(&self) -> bool {
        self.setup.is_empty()
    }

    /// Scratch keys created (and deleted) per read
    pub fn scratch_keys(&self) -> &[String] {
        &self.scratch
    }

    /// Run reads against the planned key
    ///
    /// Direct plans pipeline the reads. Otherwise setup, reads and scratch
    /// deletion go out as one `multi`; the deletion runs even when a read
    /// fails.
    pub fn run(&self, db: &Db, reads: Vec<Command>) -> Result<Vec<Reply>> {
        if self.is_direct() {
            return db.store().pipeline(reads);
        }
        let setup = self.setup.len();
        let count = reads.len();
        let mut commands = self.setup.clone();
        commands.extend(reads);
        commands.push(Command::Del {
            keys: self.scratch.clone(),
        });
        let replies = db.store().multi(commands)?;
        Ok(replies.into_iter().skip(setup).take(count).collect())
    }

    fn run_one(&self, db: &Db, read: Command) -> Result<Reply> {
        self.run(db, vec![read])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::unexpected_reply("one reply", "none"))
    }

    /// Extend with set algebra: `dest = op(self, keys)`
    fn compose(&self, layout: &TypeKeys, resolved: Resolved, op: SetOp) -> Plan {
        let dest = scratch_key(layout);
        let mut setup = self.setup.clone();
        setup.extend(resolved.setup);
        let mut keys = vec![self.key.clone()];
        keys.extend(resolved.keys);
        setup.push(match op {
            SetOp::Inter => Command::SInterStore {
                dest: dest.clone(),
                keys,
            },
            SetOp::Diff => Command::SDiffStore {
                dest: dest.clone(),
                keys,
            },
            SetOp::Union => Command::SUnionStore {
                dest: dest.clone(),
                keys,
            },
        });
        let mut scratch = self.scratch.clone();
        scratch.extend(resolved.scratch);
        scratch.push(dest.clone());
        Plan {
            setup,
            key: dest,
            scratch,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Inter,
    Diff,
    Union,
}

fn scratch_key(layout: &TypeKeys) -> String {
    layout
        .scratch(&Uuid::new_v4().simple().to_string())
        .into_string()
}

/// Criteria resolved to index keys, with any union work they need
#[derive(Debug, Default)]
struct Resolved {
    setup: Vec<Command>,
    keys: Vec<String>,
    scratch: Vec<String>,
}

impl Resolved {
    /// Collapse to one key holding the intersection of every resolved key
    fn intersected(mut self, layout: &TypeKeys) -> Self {
        if self.keys.len() > 1 {
            let dest = scratch_key(layout);
            self.setup.push(Command::SInterStore {
                dest: dest.clone(),
                keys: std::mem::take(&mut self.keys),
            });
            self.keys.push(dest.clone());
            self.scratch.push(dest);
        }
        self
    }
}

/// Map criteria to index keys; fails before any round trip on an
/// undeclared index
fn resolve<M: Model>(db: &Db, criteria: Criteria) -> Result<Resolved> {
    let schema = db.schema::<M>()?;
    let layout = Db::layout::<M>();
    if criteria.is_empty() {
        return Err(Error::invalid_input("empty criteria"));
    }
    let mut resolved = Resolved::default();
    for (attribute, values) in criteria.terms {
        if !schema.is_indexed(&attribute) {
            return Err(Error::IndexNotFound {
                type_name: M::NAME.to_string(),
                attribute,
            });
        }
        let mut keys = Vec::with_capacity(values.len());
        for value in values {
            let stored = value.encode(db.bool_policy()).ok_or_else(|| {
                Error::invalid_input(format!(
                    "{}.{}: {} value has no stored form",
                    M::NAME,
                    attribute,
                    value.type_name()
                ))
            })?;
            keys.push(layout.index(&attribute, &stored).into_string());
        }
        match keys.len() {
            1 => resolved.keys.extend(keys),
            _ => {
                // No values: an unpopulated scratch key is the empty set
                let dest = scratch_key(&layout);
                if !keys.is_empty() {
                    resolved.setup.push(Command::SUnionStore {
                        dest: dest.clone(),
                        keys,
                    });
                }
                resolved.keys.push(dest.clone());
                resolved.scratch.push(dest);
            }
        }
    }
    Ok(resolved)
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| Error::decode(format!("collection member '{}' is not an id", raw)))
}

fn parse_ids(reply: Reply) -> Result<Vec<u64>> {
    reply
        .into_opt_strings()?
        .into_iter()
        .flatten()
        .map(|raw| parse_id(&raw))
        .collect()
}

// ============================================================================
// Collection trait
// ============================================================================

/// Read operations shared by every collection
pub trait Collection<M: Model> {
    /// Owning database handle
    fn db(&self) -> &Db;

    /// What to read
    fn plan(&self) -> &Plan;

    /// Set or list
    fn kind(&self) -> Kind;

    /// Member ids (set order for sets, list order for lists)
    fn ids(&self) -> Result<Vec<u64>> {
        let key = self.plan().target().to_string();
        let read = match self.kind() {
            Kind::Set => Command::SMembers { key },
            Kind::List => Command::LRange {
                key,
                start: 0,
                stop: -1,
            },
        };
        parse_ids(self.plan().run_one(self.db(), read)?)
    }

    /// Number of members
    fn size(&self) -> Result<usize> {
        let key = self.plan().target().to_string();
        let read = match self.kind() {
            Kind::Set => Command::SCard { key },
            Kind::List => Command::LLen { key },
        };
        let size = self.plan().run_one(self.db(), read)?.into_int()?;
        Ok(size.max(0) as usize)
    }

    /// True if there are no members
    fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// True if `id` is a member
    fn contains(&self, id: u64) -> Result<bool> {
        match self.kind() {
            Kind::Set => self
                .plan()
                .run_one(
                    self.db(),
                    Command::SIsMember {
                        key: self.plan().target().to_string(),
                        member: id.to_string(),
                    },
                )?
                .into_bool(),
            Kind::List => Ok(self.ids()?.contains(&id)),
        }
    }

    /// Every member, loaded in one pipelined fetch
    fn all(&self) -> Result<Vec<M>> {
        let ids = self.ids()?;
        self.db().fetch(&ids)
    }

    /// First member: list head, or lowest id of a set; with options,
    /// the first of that ordering
    fn first(&self, options: Option<&SortOptions>) -> Result<Option<M>> {
        let ids = match (options, self.kind()) {
            (None, Kind::List) => parse_ids(self.plan().run_one(
                self.db(),
                Command::LRange {
                    key: self.plan().target().to_string(),
                    start: 0,
                    stop: 0,
                },
            )?)?,
            (options, _) => {
                let options = options.cloned().unwrap_or_default();
                let (offset, _) = options.limit.unwrap_or((0, 1));
                self.sort_ids(None, &options.limit(offset, 1))?
            }
        };
        Ok(self.db().fetch(&ids)?.into_iter().next())
    }

    /// Members ordered by their ids
    fn sort(&self, options: &SortOptions) -> Result<Vec<M>> {
        let ids = self.sort_ids(None, options)?;
        self.db().fetch(&ids)
    }

    /// Members ordered by one of their attributes
    fn sort_by(&self, attribute: &str, options: &SortOptions) -> Result<Vec<M>> {
        let by = self.attribute_pattern(attribute)?;
        let ids = self.sort_ids(Some(by), options)?;
        self.db().fetch(&ids)
    }

    /// One attribute of every member, in id order
    fn sort_get(&self, attribute: &str, options: &SortOptions) -> Result<Vec<Option<String>>> {
        let get = self.attribute_pattern(attribute)?;
        let spec = options.spec(None, vec![get]);
        self.plan()
            .run_one(
                self.db(),
                Command::Sort {
                    key: self.plan().target().to_string(),
                    spec,
                },
            )?
            .into_opt_strings()
    }

    /// SORT returning ids
    #[doc(hidden)]
    fn sort_ids(&self, by: Option<String>, options: &SortOptions) -> Result<Vec<u64>> {
        let spec = options.spec(by, Vec::new());
        parse_ids(self.plan().run_one(
            self.db(),
            Command::Sort {
                key: self.plan().target().to_string(),
                spec,
            },
        )?)
    }

    /// `{Type}:*->attribute`; the attribute must be declared
    #[doc(hidden)]
    fn attribute_pattern(&self, attribute: &str) -> Result<String> {
        if !self.db().schema::<M>()?.is_declared(attribute) {
            return Err(Error::IndexNotFound {
                type_name: M::NAME.to_string(),
                attribute: attribute.to_string(),
            });
        }
        Ok(Db::layout::<M>().attribute_pattern(attribute))
    }
}

// ============================================================================
// Set
// ============================================================================

/// A stored set of ids
pub struct Set<M: Model> {
    db: Db,
    plan: Plan,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Set<M> {
    pub(crate) fn new(db: Db, key: String) -> Self {
        Self {
            db,
            plan: Plan::key(key),
            _model: PhantomData,
        }
    }

    /// Members matching every criterion
    ///
    /// A single `eq` on the type's `all` set reads the index set directly;
    /// anything else intersects into a scratch key.
    pub fn find(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        let layout = Db::layout::<M>();
        let resolved = resolve::<M>(&self.db, criteria)?;
        if self.plan.target() == layout.all().as_str()
            && resolved.keys.len() == 1
            && resolved.setup.is_empty()
        {
            let key = resolved.keys.into_iter().next().unwrap_or_default();
            return Ok(MultiSet::new(self.db.clone(), Plan::key(key)));
        }
        let plan = self.plan.compose(&layout, resolved, SetOp::Inter);
        Ok(MultiSet::new(self.db.clone(), plan))
    }

    /// Members matching none of the criteria
    pub fn except(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        MultiSet::new(self.db.clone(), self.plan.clone()).except(criteria)
    }

    /// Members plus every entity matching all criteria
    pub fn union(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        MultiSet::new(self.db.clone(), self.plan.clone()).union(criteria)
    }
}

impl<M: Model> Collection<M> for Set<M> {
    fn db(&self) -> &Db {
        &self.db
    }

    fn plan(&self) -> &Plan {
        &self.plan
    }

    fn kind(&self) -> Kind {
        Kind::Set
    }
}

// ============================================================================
// MutableSet
// ============================================================================

/// A set of ids owned by one entity
pub struct MutableSet<M: Model> {
    set: Set<M>,
}

impl<M: Model> MutableSet<M> {
    pub(crate) fn new(db: Db, key: String) -> Self {
        Self {
            set: Set::new(db, key),
        }
    }

    fn key(&self) -> String {
        self.set.plan.target().to_string()
    }

    /// Add a saved entity
    pub fn add(&self, member: &M) -> Result<bool> {
        let id = Db::identity(member)?;
        self.set
            .db
            .store()
            .execute(Command::SAdd {
                key: self.key(),
                members: vec![id.to_string()],
            })?
            .into_bool()
    }

    /// Remove an entity
    pub fn remove(&self, member: &M) -> Result<bool> {
        let id = Db::identity(member)?;
        self.set
            .db
            .store()
            .execute(Command::SRem {
                key: self.key(),
                members: vec![id.to_string()],
            })?
            .into_bool()
    }

    /// Atomically replace every member
    pub fn replace(&self, members: &[M]) -> Result<()> {
        let ids = members
            .iter()
            .map(|m| Db::identity(m).map(|id| id.to_string()))
            .collect::<Result<Vec<_>>>()?;
        let mut commands = vec![Command::del(self.key())];
        if !ids.is_empty() {
            commands.push(Command::SAdd {
                key: self.key(),
                members: ids,
            });
        }
        self.set.db.store().multi(commands)?;
        Ok(())
    }

    /// See [`Set::find`]
    pub fn find(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        self.set.find(criteria)
    }

    /// See [`Set::except`]
    pub fn except(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        self.set.except(criteria)
    }

    /// See [`Set::union`]
    pub fn union(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        self.set.union(criteria)
    }
}

impl<M: Model> Collection<M> for MutableSet<M> {
    fn db(&self) -> &Db {
        &self.set.db
    }

    fn plan(&self) -> &Plan {
        &self.set.plan
    }

    fn kind(&self) -> Kind {
        Kind::Set
    }
}

// ============================================================================
// List
// ============================================================================

/// An ordered list of ids owned by one entity
pub struct List<M: Model> {
    db: Db,
    plan: Plan,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> List<M> {
    pub(crate) fn new(db: Db, key: String) -> Self {
        Self {
            db,
            plan: Plan::key(key),
            _model: PhantomData,
        }
    }

    fn key(&self) -> String {
        self.plan.target().to_string()
    }

    fn pop_with(&self, command: Command) -> Result<Option<M>> {
        match self.db.store().execute(command)?.into_opt_string()? {
            Some(raw) => self.db.get(parse_id(&raw)?),
            None => Ok(None),
        }
    }

    /// Append; returns the new length
    pub fn push(&self, member: &M) -> Result<usize> {
        let id = Db::identity(member)?;
        let len = self
            .db
            .store()
            .execute(Command::RPush {
                key: self.key(),
                values: vec![id.to_string()],
            })?
            .into_int()?;
        Ok(len.max(0) as usize)
    }

    /// Prepend; returns the new length
    pub fn unshift(&self, member: &M) -> Result<usize> {
        let id = Db::identity(member)?;
        let len = self
            .db
            .store()
            .execute(Command::LPush {
                key: self.key(),
                values: vec![id.to_string()],
            })?
            .into_int()?;
        Ok(len.max(0) as usize)
    }

    /// Remove and load the last member
    pub fn pop(&self) -> Result<Option<M>> {
        self.pop_with(Command::RPop { key: self.key() })
    }

    /// Remove and load the first member
    pub fn shift(&self) -> Result<Option<M>> {
        self.pop_with(Command::LPop { key: self.key() })
    }

    /// Remove every occurrence; returns how many were removed
    pub fn remove(&self, member: &M) -> Result<usize> {
        let id = Db::identity(member)?;
        let removed = self
            .db
            .store()
            .execute(Command::LRem {
                key: self.key(),
                count: 0,
                value: id.to_string(),
            })?
            .into_int()?;
        Ok(removed.max(0) as usize)
    }

    /// Last member
    pub fn last(&self) -> Result<Option<M>> {
        Ok(self.range(-1, -1)?.into_iter().next())
    }

    /// Members between two inclusive positions (negative counts from the end)
    pub fn range(&self, start: i64, stop: i64) -> Result<Vec<M>> {
        let ids = parse_ids(self.db.store().execute(Command::LRange {
            key: self.key(),
            start,
            stop,
        })?)?;
        self.db.fetch(&ids)
    }

    /// Atomically replace every member, keeping the given order
    pub fn replace(&self, members: &[M]) -> Result<()> {
        let ids = members
            .iter()
            .map(|m| Db::identity(m).map(|id| id.to_string()))
            .collect::<Result<Vec<_>>>()?;
        let mut commands = vec![Command::del(self.key())];
        if !ids.is_empty() {
            commands.push(Command::RPush {
                key: self.key(),
                values: ids,
            });
        }
        self.db.store().multi(commands)?;
        Ok(())
    }
}

impl<M: Model> Collection<M> for List<M> {
    fn db(&self) -> &Db {
        &self.db
    }

    fn plan(&self) -> &Plan {
        &self.plan
    }

    fn kind(&self) -> Kind {
        Kind::List
    }
}

// ============================================================================
// MultiSet
// ============================================================================

/// A composed query; each read recomputes it in fresh scratch keys
pub struct MultiSet<M: Model> {
    db: Db,
    plan: Plan,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> MultiSet<M> {
    pub(crate) fn new(db: Db, plan: Plan) -> Self {
        Self {
            db,
            plan,
            _model: PhantomData,
        }
    }

    /// Narrow by more criteria
    pub fn find(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        let layout = Db::layout::<M>();
        let resolved = resolve::<M>(&self.db, criteria)?;
        Ok(Self::new(
            self.db.clone(),
            self.plan.compose(&layout, resolved, SetOp::Inter),
        ))
    }

    /// Drop members matching any criterion
    pub fn except(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        let layout = Db::layout::<M>();
        let resolved = resolve::<M>(&self.db, criteria)?;
        Ok(Self::new(
            self.db.clone(),
            self.plan.compose(&layout, resolved, SetOp::Diff),
        ))
    }

    /// Add every entity matching all criteria
    pub fn union(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        let layout = Db::layout::<M>();
        let resolved = resolve::<M>(&self.db, criteria)?.intersected(&layout);
        Ok(Self::new(
            self.db.clone(),
            self.plan.compose(&layout, resolved, SetOp::Union),
        ))
    }
}

impl<M: Model> Collection<M> for MultiSet<M> {
    fn db(&self) -> &Db {
        &self.db
    }

    fn plan(&self) -> &Plan {
        &self.plan
    }

    fn kind(&self) -> Kind {
        Kind::Set
    }
}
