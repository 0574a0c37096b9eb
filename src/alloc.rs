//! Page-pool entry reservation (§4.3): turning the append-only page array
//! into a steady supply of pre-claimed entry slots for accessors to publish
//! into.

use std::sync::Arc;

use crate::accessor::AccessorStorage;
use crate::config::MapConfig;
use crate::meta::Meta;
use crate::page::{Page, ENTRIES_IN_PAGE};
use crate::reservation::EntryLoc;
use std::sync::atomic::Ordering;

/// Reserves one entry slot for this accessor: pops from its local
/// reservation buffer if nonempty, otherwise claims a fresh
/// `reservation_buffer_size`-aligned block from the page pool and refills
/// the buffer from it. Returns `None` if another page cannot be reserved
/// without exceeding the index's current capacity (§4.3 point 5) — the
/// caller must grow before retrying.
pub fn reserve_entry<K, V>(
    meta: &Meta<K, V>,
    accessor: &AccessorStorage,
    config: &MapConfig,
) -> Option<EntryLoc> {
    if let Some(loc) = accessor.reservation_buffer.lock().pop() {
        return Some(loc);
    }

    let stride = config.reservation_buffer_size;
    loop {
        let p = meta.inserting_page.load(Ordering::Acquire);
        let Some(page) = meta.page_at(p) else {
            // greatest_allocated_page already advanced past p in another
            // thread but the push into `pages` hasn't become visible yet.
            std::hint::spin_loop();
            continue;
        };

        if let Some(first_offset) = claim_block(&page, stride) {
            let first_location = (p * ENTRIES_IN_PAGE + first_offset) as u64;
            let mut buf = accessor.reservation_buffer.lock();
            buf.put(first_location, stride);
            return buf.pop();
        }

        let greatest_allocated = meta.greatest_allocated_page.load(Ordering::Acquire);
        if greatest_allocated > p {
            let _ =
                meta.inserting_page
                    .compare_exchange(p, p + 1, Ordering::AcqRel, Ordering::Acquire);
            continue;
        }

        if (greatest_allocated + 2) * ENTRIES_IN_PAGE > meta.size() {
            return None;
        }

        let new_page = Arc::new(Page::<K, V>::new());
        {
            let mut pages = meta.pages.write();
            if pages.len() != p + 1 {
                // Someone else already appended a page; retry against it.
                continue;
            }
            pages.push(new_page);
        }
        if meta
            .greatest_allocated_page
            .compare_exchange(p, p + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            continue;
        }
        let _ = meta
            .inserting_page
            .compare_exchange(p, p + 1, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Attempts to claim one aligned `stride`-sized run of slots in `page`,
/// scanning forward from its first block. Returns the offset of the
/// block's first slot on success, or `None` if the page has no free block
/// left.
fn claim_block<K, V>(page: &Page<K, V>, stride: usize) -> Option<usize> {
    let mut offset = 0;
    while offset + stride <= ENTRIES_IN_PAGE {
        if page.slot(offset).try_reserve() {
            for i in 1..stride {
                let claimed = page.slot(offset + i).try_reserve();
                debug_assert!(
                    claimed,
                    "block-aligned reservation slot already claimed out of turn"
                );
            }
            return Some(offset);
        }
        offset += stride;
    }
    None
}
