//! DeleteProtocol: the atomic delete script
//!
//! Removes the entity from its unique maps and index sets, deletes its
//! hash and memo, drops it from `all` and deletes every declared
//! collection key and the counters hash it owns. Deleting an entity that
//! does not exist succeeds without effect.

use tessera_core::{Error, Result};
use tessera_storage::{Keyspace, Procedure, Reply};

use super::save::remove_entity_indices;
use super::{parse_keys, success};

/// Procedure behind the `delete` script
#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteProcedure;

impl Procedure for DeleteProcedure {
    fn call(&self, ks: &mut Keyspace, keys: &[String], _args: &[String]) -> Result<Reply> {
        let (layout, id) = parse_keys(keys)?;
        let id = id.ok_or_else(|| Error::script("delete needs an entity key"))?;
        let uniques = ks.smembers(layout.uniques().as_str())?;
        let indices = ks.smembers(layout.indices().as_str())?;
        let collections = ks.smembers(layout.collections().as_str())?;

        remove_entity_indices(ks, &layout, id, &uniques, &indices)?;

        let mut owned = vec![layout.entity(id).into_string()];
        owned.extend(
            collections
                .iter()
                .map(|name| layout.collection(id, name).into_string()),
        );
        owned.push(layout.counters(id).into_string());
        ks.del(&owned);
        ks.srem(layout.all().as_str(), &[id.to_string()])?;

        Ok(success(id))
    }
}
