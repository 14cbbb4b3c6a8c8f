//! SaveProtocol: the atomic save script
//!
//! Runs inside the store with exclusive access to the keyspace. Order
//! matters:
//!
//! 1. Validate every declared unique before touching anything; a conflict
//!    replies `500` with no writes.
//! 2. Assign the identity (INCR) for new entities and add it to `all`.
//! 3. Clean up from the *stored* hash and the `_indices` memo: stale
//!    unique entries and index memberships. This must happen before the
//!    hash is replaced, otherwise the old values are gone.
//! 4. Replace the hash, then write uniques, index memberships and the memo.
//!
//! Empty strings are values like any other. Absent attributes are simply
//! not in ARGV.

use std::collections::BTreeMap;
use tessera_core::{Error, Result, TypeKeys};
use tessera_storage::{Keyspace, Procedure, Reply};

use super::{conflict, pairs, parse_keys, success};

/// Procedure behind the `save` script
#[derive(Debug, Default, Clone, Copy)]
pub struct SaveProcedure;

impl Procedure for SaveProcedure {
    fn call(&self, ks: &mut Keyspace, keys: &[String], args: &[String]) -> Result<Reply> {
        let (layout, existing) = parse_keys(keys)?;
        let attributes = pairs(args)?;
        let uniques = ks.smembers(layout.uniques().as_str())?;
        let indices = ks.smembers(layout.indices().as_str())?;

        if let Some(attribute) = first_conflict(ks, &layout, existing, &uniques, &attributes)? {
            return Ok(conflict(&attribute));
        }

        let id = match existing {
            Some(id) => id,
            None => {
                let next = ks.incr_by(layout.id_counter().as_str(), 1)?;
                u64::try_from(next)
                    .map_err(|_| Error::script(format!("id counter is negative: {}", next)))?
            }
        };
        let member = id.to_string();
        ks.sadd(layout.all().as_str(), &[&member])?;

        remove_entity_indices(ks, &layout, id, &uniques, &indices)?;

        let entity = layout.entity(id);
        ks.del(&[entity.as_str()]);
        if !attributes.is_empty() {
            let pairs: Vec<(String, String)> = attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            ks.hmset(entity.as_str(), &pairs)?;
        }

        for attribute in &uniques {
            if let Some(value) = attributes.get(attribute) {
                ks.hset(layout.unique(attribute).as_str(), value, &member)?;
            }
        }

        let mut memberships = Vec::new();
        for attribute in &indices {
            if let Some(value) = attributes.get(attribute) {
                let index = layout.index(attribute, value);
                ks.sadd(index.as_str(), &[&member])?;
                memberships.push(index.into_string());
            }
        }
        if !memberships.is_empty() {
            ks.sadd(layout.entity_indices(id).as_str(), &memberships)?;
        }

        Ok(success(id))
    }
}

/// First unique attribute (in name order) whose value belongs to another id
fn first_conflict(
    ks: &Keyspace,
    layout: &TypeKeys,
    existing: Option<u64>,
    uniques: &[String],
    attributes: &BTreeMap<String, String>,
) -> Result<Option<String>> {
    let own = existing.map(|id| id.to_string());
    for attribute in uniques {
        let Some(value) = attributes.get(attribute) else {
            continue;
        };
        if let Some(owner) = ks.hget(layout.unique(attribute).as_str(), value)? {
            if Some(&owner) != own.as_ref() {
                return Ok(Some(attribute.clone()));
            }
        }
    }
    Ok(None)
}

/// Drop an entity from every unique map and index set it is recorded in
///
/// Reads the stored hash and the `_indices` memo; shared with delete.
pub(crate) fn remove_entity_indices(
    ks: &mut Keyspace,
    layout: &TypeKeys,
    id: u64,
    uniques: &[String],
    indices: &[String],
) -> Result<()> {
    let member = id.to_string();
    let old: BTreeMap<String, String> = ks
        .hgetall(layout.entity(id).as_str())?
        .into_iter()
        .collect();

    for attribute in uniques {
        if let Some(value) = old.get(attribute) {
            let map = layout.unique(attribute);
            if ks.hget(map.as_str(), value)?.as_deref() == Some(member.as_str()) {
                ks.hdel(map.as_str(), &[value])?;
            }
        }
    }
    for attribute in indices {
        if let Some(value) = old.get(attribute) {
            ks.srem(layout.index(attribute, value).as_str(), &[&member])?;
        }
    }

    let memo = layout.entity_indices(id);
    for index in ks.smembers(memo.as_str())? {
        ks.srem(&index, &[&member])?;
    }
    ks.del(&[memo.as_str()]);
    Ok(())
}
