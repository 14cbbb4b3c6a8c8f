//! `Db`: the model-level entry point
//!
//! Holds the store, the resolved registry and the persistence dispatcher.
//! Cheap to clone; every clone talks to the same store.
//!
//! ## Round trips
//!
//! | Operation | Round trips |
//! |-----------|-------------|
//! | `save` / `delete` | 1 (scripted), several (locked) |
//! | `get` | 1 (pipeline: membership + hash) |
//! | `fetch` | 1 (pipeline over all ids) |
//! | `with` | 2 (unique map, then `get`) |

use std::sync::Arc;
use tessera_core::{BoolPolicy, Error, Key, Result, TypeKeys, Value};
use tessera_engine::{Persistence, TesseraConfig};
use tessera_storage::{Command, Reply, Store};
use tracing::info;

use crate::collection::{Criteria, List, MultiSet, MutableSet, Set};
use crate::model::{encode_attributes, Attributes, Model};
use crate::registry::Registry;
use crate::schema::{CollectionKind, Schema};

/// Model persistence over one store
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    persistence: Arc<Persistence>,
    policy: BoolPolicy,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("types", &self.registry.len())
            .field("scripted", &self.persistence.is_scripted())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Db {
    /// Open over `store`, writing every type's declarations into it
    ///
    /// The save and delete scripts read `{Type}:uniques`, `{Type}:indices`
    /// and `{Type}:collections`; they are replaced atomically here.
    pub fn open(store: Arc<dyn Store>, registry: Registry, config: &TesseraConfig) -> Result<Self> {
        let persistence = Persistence::new(Arc::clone(&store), config)?;
        let policy = config.bool_policy()?;

        let mut commands = Vec::new();
        for schema in registry.schemas() {
            let layout = TypeKeys::new(schema.name());
            let declarations: [(Key, Vec<String>); 3] = [
                (layout.uniques(), schema.uniques().map(str::to_string).collect()),
                (layout.indices(), schema.indices().map(str::to_string).collect()),
                (
                    layout.collections(),
                    schema.collections().iter().map(|c| c.name.clone()).collect(),
                ),
            ];
            for (key, members) in declarations {
                commands.push(Command::del(key.clone()));
                if !members.is_empty() {
                    commands.push(Command::SAdd {
                        key: key.into_string(),
                        members,
                    });
                }
            }
        }
        if !commands.is_empty() {
            store.multi(commands)?;
        }

        info!(
            target: "tessera::db",
            types = registry.len(),
            scripted = persistence.is_scripted(),
            "opened"
        );
        Ok(Self {
            store,
            registry: Arc::new(registry),
            persistence: Arc::new(persistence),
            policy,
        })
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The resolved registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The persistence dispatcher
    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// How `false` is written
    pub fn bool_policy(&self) -> BoolPolicy {
        self.policy
    }

    /// Registered schema of `M`
    pub fn schema<M: Model>(&self) -> Result<&Arc<Schema>> {
        self.registry.schema(M::NAME)
    }

    pub(crate) fn layout<M: Model>() -> TypeKeys {
        TypeKeys::new(M::NAME)
    }

    pub(crate) fn identity<M: Model>(model: &M) -> Result<u64> {
        model.id().ok_or_else(|| Error::MissingIdentity {
            type_name: M::NAME.to_string(),
        })
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save `model`; assigns its identity if new
    ///
    /// On failure the model keeps its values and the store is untouched.
    pub fn save<M: Model>(&self, model: &mut M) -> Result<u64> {
        let schema = self.schema::<M>()?;
        let attributes = encode_attributes(schema, model, self.policy)?;
        let id = self.persistence.save(M::NAME, model.id(), &attributes)?;
        model.set_id(id);
        Ok(id)
    }

    /// Delete `model` and everything it owns
    pub fn delete<M: Model>(&self, model: &M) -> Result<()> {
        self.schema::<M>()?;
        let id = Self::identity(model)?;
        self.persistence.delete(M::NAME, id)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Load one entity
    pub fn get<M: Model>(&self, id: u64) -> Result<Option<M>> {
        Ok(self.fetch::<M>(&[id])?.into_iter().next())
    }

    /// True if the entity exists
    pub fn exists<M: Model>(&self, id: u64) -> Result<bool> {
        self.schema::<M>()?;
        self.store
            .execute(Command::SIsMember {
                key: Self::layout::<M>().all().into_string(),
                member: id.to_string(),
            })?
            .into_bool()
    }

    /// Load many entities in one round trip, in the order given
    ///
    /// Ids that no longer exist are skipped.
    pub fn fetch<M: Model>(&self, ids: &[u64]) -> Result<Vec<M>> {
        self.schema::<M>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let layout = Self::layout::<M>();
        let all = layout.all().into_string();
        let commands = ids
            .iter()
            .flat_map(|id| {
                [
                    Command::SIsMember {
                        key: all.clone(),
                        member: id.to_string(),
                    },
                    Command::HGetAll {
                        key: layout.entity(*id).into_string(),
                    },
                ]
            })
            .collect();
        let replies = self.store.pipeline(commands)?;

        let mut models = Vec::with_capacity(ids.len());
        let mut replies = replies.into_iter();
        for id in ids {
            let (Some(member), Some(hash)) = (replies.next(), replies.next()) else {
                return Err(Error::unexpected_reply("membership and hash", "short pipeline"));
            };
            if member.into_bool()? {
                let attributes = Attributes::new(hash.into_hash()?);
                models.push(M::from_attributes(*id, attributes)?);
            }
        }
        Ok(models)
    }

    /// Load the entity holding `value` for a unique attribute
    pub fn with<M: Model>(&self, attribute: &str, value: impl Into<Value>) -> Result<Option<M>> {
        let schema = self.schema::<M>()?;
        if !schema.is_unique(attribute) {
            return Err(Error::IndexNotFound {
                type_name: M::NAME.to_string(),
                attribute: attribute.to_string(),
            });
        }
        let value = value.into().encode(self.policy).ok_or_else(|| {
            Error::invalid_input(format!("no stored form for {}.{}", M::NAME, attribute))
        })?;
        let owner = self
            .store
            .execute(Command::HGet {
                key: Self::layout::<M>().unique(attribute).into_string(),
                field: value,
            })?
            .into_opt_string()?;
        match owner {
            Some(raw) => {
                let id = raw
                    .parse()
                    .map_err(|_| Error::decode(format!("unique map holds '{}'", raw)))?;
                self.get(id)
            }
            None => Ok(None),
        }
    }

    /// Every entity of `M`
    pub fn all<M: Model>(&self) -> Result<Set<M>> {
        self.schema::<M>()?;
        Ok(Set::new(self.clone(), Self::layout::<M>().all().into_string()))
    }

    /// Entities matching every criterion
    pub fn find<M: Model>(&self, criteria: Criteria) -> Result<MultiSet<M>> {
        self.all::<M>()?.find(criteria)
    }

    /// Entity a reference of `model` points at
    pub fn referenced<M: Model, T: Model>(&self, model: &M, reference: &str) -> Result<Option<T>> {
        let schema = self.schema::<M>()?;
        let def = schema.reference_def(reference).ok_or_else(|| {
            Error::invalid_input(format!("{} has no reference '{}'", M::NAME, reference))
        })?;
        self.expect_target::<M, T>(reference)?;
        let stored = model
            .to_attributes()
            .into_iter()
            .find(|(name, _)| *name == def.attribute)
            .and_then(|(_, value)| value.encode(self.policy));
        match stored {
            Some(raw) => {
                let id = raw.parse().map_err(|_| {
                    Error::decode(format!("{}.{} = '{}'", M::NAME, def.attribute, raw))
                })?;
                self.get::<T>(id)
            }
            None => Ok(None),
        }
    }

    fn expect_target<M: Model, T: Model>(&self, member: &str) -> Result<()> {
        let target = self.registry.target(M::NAME, member)?;
        if target.name() != T::NAME {
            return Err(Error::invalid_input(format!(
                "{}.{} holds {}, not {}",
                M::NAME,
                member,
                target.name(),
                T::NAME
            )));
        }
        Ok(())
    }

    fn owned_collection<M: Model, T: Model>(
        &self,
        owner: &M,
        name: &str,
        kind: CollectionKind,
    ) -> Result<String> {
        let schema = self.schema::<M>()?;
        match schema.collection_def(name) {
            Some(def) if def.kind == kind => {}
            _ => {
                return Err(Error::invalid_input(format!(
                    "{} has no {:?} collection '{}'",
                    M::NAME,
                    kind,
                    name
                )))
            }
        }
        self.expect_target::<M, T>(name)?;
        let id = Self::identity(owner)?;
        Ok(Self::layout::<M>().collection(id, name).into_string())
    }

    /// A set collection owned by `owner`
    pub fn set<M: Model, T: Model>(&self, owner: &M, name: &str) -> Result<MutableSet<T>> {
        let key = self.owned_collection::<M, T>(owner, name, CollectionKind::Set)?;
        Ok(MutableSet::new(self.clone(), key))
    }

    /// A list collection owned by `owner`
    pub fn list<M: Model, T: Model>(&self, owner: &M, name: &str) -> Result<List<T>> {
        let key = self.owned_collection::<M, T>(owner, name, CollectionKind::List)?;
        Ok(List::new(self.clone(), key))
    }

    // ========================================================================
    // Counters
    // ========================================================================

    fn counter_key<M: Model>(&self, model: &M, name: &str) -> Result<String> {
        let schema = self.schema::<M>()?;
        if !schema.has_counter(name) {
            return Err(Error::invalid_input(format!(
                "{} has no counter '{}'",
                M::NAME,
                name
            )));
        }
        let id = Self::identity(model)?;
        Ok(Self::layout::<M>().counters(id).into_string())
    }

    /// Add `by` to a counter; returns the new value
    pub fn incr<M: Model>(&self, model: &M, name: &str, by: i64) -> Result<i64> {
        let key = self.counter_key(model, name)?;
        self.store
            .execute(Command::HIncrBy {
                key,
                field: name.to_string(),
                delta: by,
            })?
            .into_int()
    }

    /// Subtract `by` from a counter; returns the new value
    pub fn decr<M: Model>(&self, model: &M, name: &str, by: i64) -> Result<i64> {
        let delta = by.checked_neg().ok_or_else(|| {
            Error::invalid_input(format!("cannot decrement {}.{} by {}", M::NAME, name, by))
        })?;
        self.incr(model, name, delta)
    }

    /// Current counter value; never-touched counters read `0`
    pub fn counter<M: Model>(&self, model: &M, name: &str) -> Result<i64> {
        let key = self.counter_key(model, name)?;
        let reply = self.store.execute(Command::HGet {
            key,
            field: name.to_string(),
        })?;
        match reply {
            Reply::Nil => Ok(0),
            other => other.into_int(),
        }
    }
}
