//! Locked save/delete for stores without scripting
//!
//! Same observable results as the scripts, built from plain commands:
//! reads happen under the entity's [`EntityLock`], and every write of one
//! save or delete goes out in a single `multi`.
//!
//! The entity lock cannot see two *new* entities racing for the same
//! unique value, since they lock different ids. Unique values are
//! therefore claimed with HSETNX before the write; a lost claim releases
//! the claims already made and fails the save. The identity a failed new
//! save drew from the counter stays burned.

use std::collections::BTreeMap;
use tessera_core::{Error, Result, TypeKeys};
use tessera_storage::{Command, Reply, Store};
use tracing::warn;

use crate::config::LockConfig;
use crate::lock::EntityLock;

fn strings(reply: Option<Reply>) -> Result<Vec<String>> {
    reply
        .ok_or_else(|| Error::unexpected_reply("pipeline reply", "missing"))?
        .into_strings()
}

fn declarations(store: &dyn Store, layout: &TypeKeys, collections: bool) -> Result<Declarations> {
    let mut commands = vec![
        Command::SMembers {
            key: layout.uniques().into_string(),
        },
        Command::SMembers {
            key: layout.indices().into_string(),
        },
    ];
    if collections {
        commands.push(Command::SMembers {
            key: layout.collections().into_string(),
        });
    }
    let mut replies = store.pipeline(commands)?.into_iter();
    Ok(Declarations {
        uniques: strings(replies.next())?,
        indices: strings(replies.next())?,
        collections: if collections {
            strings(replies.next())?
        } else {
            Vec::new()
        },
    })
}

struct Declarations {
    uniques: Vec<String>,
    indices: Vec<String>,
    collections: Vec<String>,
}

/// Stored hash and `_indices` memo of one entity
struct Stored {
    hash: BTreeMap<String, String>,
    memo: Vec<String>,
}

fn stored(store: &dyn Store, layout: &TypeKeys, id: u64) -> Result<Stored> {
    let mut replies = store
        .pipeline(vec![
            Command::HGetAll {
                key: layout.entity(id).into_string(),
            },
            Command::SMembers {
                key: layout.entity_indices(id).into_string(),
            },
        ])?
        .into_iter();
    let hash = replies
        .next()
        .ok_or_else(|| Error::unexpected_reply("pipeline reply", "missing"))?
        .into_hash()?
        .into_iter()
        .collect();
    Ok(Stored {
        hash,
        memo: strings(replies.next())?,
    })
}

/// Unique owners for `(attribute, value)` pairs, one pipeline
fn owners(
    store: &dyn Store,
    layout: &TypeKeys,
    lookups: &[(&String, &String)],
) -> Result<Vec<Option<String>>> {
    if lookups.is_empty() {
        return Ok(Vec::new());
    }
    let commands = lookups
        .iter()
        .map(|(attribute, value)| Command::HGet {
            key: layout.unique(attribute).into_string(),
            field: (*value).clone(),
        })
        .collect();
    store
        .pipeline(commands)?
        .into_iter()
        .map(Reply::into_opt_string)
        .collect()
}

/// Commands dropping an entity from its stale unique entries, old index
/// sets and memo
fn cleanup(
    store: &dyn Store,
    layout: &TypeKeys,
    id: u64,
    declared: &Declarations,
    old: &Stored,
    keep: &BTreeMap<String, String>,
) -> Result<Vec<Command>> {
    let member = id.to_string();
    let mut commands = Vec::new();

    // Unique entries survive only when the value is unchanged
    let stale: Vec<(&String, &String)> = declared
        .uniques
        .iter()
        .filter_map(|attribute| {
            let value = old.hash.get(attribute)?;
            (keep.get(attribute) != Some(value)).then_some((attribute, value))
        })
        .collect();
    for ((attribute, value), owner) in stale.iter().zip(owners(store, layout, &stale)?) {
        if owner.as_deref() == Some(member.as_str()) {
            commands.push(Command::HDel {
                key: layout.unique(attribute).into_string(),
                fields: vec![(*value).clone()],
            });
        }
    }

    for attribute in &declared.indices {
        if let Some(value) = old.hash.get(attribute) {
            commands.push(Command::SRem {
                key: layout.index(attribute, value).into_string(),
                members: vec![member.clone()],
            });
        }
    }
    for index in &old.memo {
        commands.push(Command::SRem {
            key: index.clone(),
            members: vec![member.clone()],
        });
    }
    commands.push(Command::del(layout.entity_indices(id)));
    Ok(commands)
}

/// Claim unique values for `id`; on a lost claim, undo and report it
fn claim_uniques(
    store: &dyn Store,
    layout: &TypeKeys,
    id: u64,
    wanted: &[(&String, &String)],
) -> Result<std::result::Result<Vec<Command>, String>> {
    let member = id.to_string();
    let mut undo = Vec::new();
    for (attribute, value) in wanted {
        let map = layout.unique(attribute).into_string();
        loop {
            let won = store
                .execute(Command::HSetNx {
                    key: map.clone(),
                    field: (*value).clone(),
                    value: member.clone(),
                })?
                .into_bool()?;
            if won {
                undo.push(Command::HDel {
                    key: map.clone(),
                    fields: vec![(*value).clone()],
                });
                break;
            }
            let owner = store
                .execute(Command::HGet {
                    key: map.clone(),
                    field: (*value).clone(),
                })?
                .into_opt_string()?;
            match owner {
                Some(owner) if owner == member => break,
                Some(_) => {
                    if !undo.is_empty() {
                        store.multi(undo)?;
                    }
                    return Ok(Err((*attribute).clone()));
                }
                // Released between HSETNX and HGET
                None => continue,
            }
        }
    }
    Ok(Ok(undo))
}

fn not_unique(layout: &TypeKeys, attribute: String) -> Error {
    Error::UniqueConstraintViolation {
        type_name: layout.type_name().to_string(),
        attribute,
    }
}

/// Save under the entity lock; returns the identity
pub fn save(
    store: &dyn Store,
    config: &LockConfig,
    type_name: &str,
    existing: Option<u64>,
    attributes: &[(String, String)],
) -> Result<u64> {
    let layout = TypeKeys::new(type_name);
    let attributes: BTreeMap<String, String> = attributes.iter().cloned().collect();
    let declared = declarations(store, &layout, false)?;
    let wanted: Vec<(&String, &String)> = declared
        .uniques
        .iter()
        .filter_map(|attribute| attributes.get(attribute).map(|value| (attribute, value)))
        .collect();

    // Fail fast before drawing an identity
    let own = existing.map(|id| id.to_string());
    for ((attribute, _), owner) in wanted.iter().zip(owners(store, &layout, &wanted)?) {
        if owner.is_some() && owner != own {
            return Err(not_unique(&layout, (*attribute).clone()));
        }
    }

    let id = match existing {
        Some(id) => id,
        None => {
            let next = store
                .execute(Command::Incr {
                    key: layout.id_counter().into_string(),
                })?
                .into_int()?;
            u64::try_from(next)
                .map_err(|_| Error::Store {
                    reason: format!("id counter is negative: {}", next),
                })?
        }
    };

    let _lock = EntityLock::acquire(store, &layout.lock(id), config)?;
    let claims = match claim_uniques(store, &layout, id, &wanted)? {
        Ok(claims) => claims,
        Err(attribute) => return Err(not_unique(&layout, attribute)),
    };

    let write = || -> Result<()> {
        let old = stored(store, &layout, id)?;
        let member = id.to_string();
        let entity = layout.entity(id).into_string();
        let mut commands = cleanup(store, &layout, id, &declared, &old, &attributes)?;

        commands.push(Command::del(entity.clone()));
        if !attributes.is_empty() {
            commands.push(Command::HMSet {
                key: entity,
                pairs: attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            });
        }
        for (attribute, value) in &wanted {
            commands.push(Command::HSet {
                key: layout.unique(attribute).into_string(),
                field: (*value).clone(),
                value: member.clone(),
            });
        }
        let memberships: Vec<String> = declared
            .indices
            .iter()
            .filter_map(|attribute| {
                attributes
                    .get(attribute)
                    .map(|value| layout.index(attribute, value).into_string())
            })
            .collect();
        for index in &memberships {
            commands.push(Command::SAdd {
                key: index.clone(),
                members: vec![member.clone()],
            });
        }
        if !memberships.is_empty() {
            commands.push(Command::SAdd {
                key: layout.entity_indices(id).into_string(),
                members: memberships,
            });
        }
        commands.push(Command::SAdd {
            key: layout.all().into_string(),
            members: vec![member],
        });
        store.multi(commands)?;
        Ok(())
    };

    if let Err(e) = write() {
        if !claims.is_empty() {
            if let Err(undo) = store.multi(claims) {
                warn!(target: "tessera::save", type_name, id, error = %undo, "failed to release unique claims");
            }
        }
        return Err(e);
    }
    Ok(id)
}

/// Delete under the entity lock; a missing entity is a no-op
pub fn delete(store: &dyn Store, config: &LockConfig, type_name: &str, id: u64) -> Result<()> {
    let layout = TypeKeys::new(type_name);
    let declared = declarations(store, &layout, true)?;
    let _lock = EntityLock::acquire(store, &layout.lock(id), config)?;

    let old = stored(store, &layout, id)?;
    let mut commands = cleanup(store, &layout, id, &declared, &old, &BTreeMap::new())?;
    commands.push(Command::Del {
        keys: std::iter::once(layout.entity(id).into_string())
            .chain(
                declared
                    .collections
                    .iter()
                    .map(|name| layout.collection(id, name).into_string()),
            )
            .chain(std::iter::once(layout.counters(id).into_string()))
            .collect(),
    });
    commands.push(Command::SRem {
        key: layout.all().into_string(),
        members: vec![id.to_string()],
    });
    store.multi(commands)?;
    Ok(())
}
