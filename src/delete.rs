//! Delete (§4.6): CAS the entry's value to `None`, then write an
//! index-level tombstone.

use crate::accessor::AccessorStorage;
use crate::error::{Error, Result};
use crate::lookup::{probe, ProbeResult};
use crate::meta::Meta;
use crate::sync::Ordering;

/// Deletes `key` from `meta`, returning its last value.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the key is absent or already deleted.
pub fn delete<K, V>(meta: &Meta<K, V>, accessor: &AccessorStorage, hash: i64, key: &K) -> Result<V>
where
    K: PartialEq,
    V: Clone,
{
    loop {
        let (index_pos, page, offset, entry) = match probe(meta, hash, key) {
            ProbeResult::Found {
                index_pos,
                page,
                offset,
                entry,
            } => (index_pos, page, offset, entry),
            ProbeResult::Vacant { .. } | ProbeResult::MustGrow => return Err(Error::NotFound),
        };

        let Some(previous_value) = entry.value.clone() else {
            return Err(Error::NotFound);
        };
        let slot = page.slot(offset);
        match slot.compare_and_set_value(&entry, None) {
            Ok(()) => {
                let layout = meta.layout();
                meta.write_node(index_pos, layout.tombstone_raw());
                accessor.local_tombstones.fetch_add(1, Ordering::Relaxed);
                accessor.local_len.fetch_add(-1, Ordering::Relaxed);
                return Ok(previous_value);
            }
            Err(_) => continue, // lost the race (concurrent delete or update); re-probe
        }
    }
}
