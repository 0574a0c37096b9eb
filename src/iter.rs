//! Fast partitioned iterator (§4.9).
//!
//! Each partition owns every `partitions`-th page, starting at
//! `this_partition`, and walks its owned pages' slots in order. Because
//! entries are held behind `Arc`, a loaded [`crate::page::EntryData`] can
//! never be freed out from under a reader the way a refcounted CPython
//! object can -- so the "concurrent usage detected" failure mode the
//! source models via try-incref never actually arises in this port.
//! [`crate::error::Error::ConcurrentUsageDetected`] is kept in the public
//! error type for interface parity (and in case a future weak-reference
//! based entry representation needs it), but this iterator never returns
//! it.

use std::sync::Arc;

use crate::meta::Meta;
use crate::page::ENTRIES_IN_PAGE;
use std::sync::atomic::Ordering;

/// Partitioned scan over one `Meta` snapshot's pages, yielding `(key,
/// value)` for every live entry this partition owns.
pub struct FastIter<K, V> {
    meta: Arc<Meta<K, V>>,
    partitions: usize,
    page_ix: usize,
    offset: usize,
}

impl<K, V> FastIter<K, V> {
    #[must_use]
    pub fn new(meta: Arc<Meta<K, V>>, partitions: usize, this_partition: usize) -> Self {
        let partitions = partitions.max(1);
        FastIter {
            meta,
            partitions,
            page_ix: this_partition % partitions,
            offset: 0,
        }
    }
}

impl<K, V> Iterator for FastIter<K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let greatest = self.meta.greatest_allocated_page.load(Ordering::Acquire);
            if self.page_ix > greatest {
                return None;
            }
            let Some(page) = self.meta.page_at(self.page_ix) else {
                return None;
            };

            while self.offset < ENTRIES_IN_PAGE {
                let offset = self.offset;
                self.offset += 1;
                let slot = page.slot(offset);
                if !slot.is_claimed() {
                    continue;
                }
                if let Some(entry) = slot.load() {
                    if let Some(value) = entry.value.clone() {
                        return Some((entry.key.clone(), value));
                    }
                }
            }

            self.offset = 0;
            self.page_ix += self.partitions;
        }
    }
}
