//! Node codec: packing and unpacking the fixed-width index-ring slots.
//!
//! A node is a single 64-bit word. `entry_index` occupies the high
//! `log_size` bits; `tag` occupies the remaining low bits. Distance is never
//! stored in the word (unlike the block-packed legacy variant in
//! `atomic_dict_node_ops.c`); it is always derived from a slot's position
//! relative to the key's `distance_0`, per §4.1/§4.2.

/// Decoded view of an index-ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// Index into the page pool's flattened entry space. `0` is reserved
    /// and never stored as a live node (invariant 3, §3).
    pub entry_index: u64,
    /// The low bits of the key's rehashed hash, used to short-circuit a
    /// probe before reading the entry itself.
    pub tag: u64,
}

/// `log_size`-dependent constants needed to encode/decode nodes. Threaded
/// explicitly rather than read from a shared `Meta` on every call, so
/// callers that already hold a local copy of `log_size` don't pay for an
/// extra indirection.
#[derive(Debug, Clone, Copy)]
pub struct NodeLayout {
    log_size: u32,
}

impl NodeLayout {
    #[must_use]
    pub fn new(log_size: u32) -> Self {
        debug_assert!(log_size > 0 && log_size < 64);
        NodeLayout { log_size }
    }

    /// `TAG_MASK = (1 << (64 - log_size)) - 1`: all tag bits set. A node
    /// whose tag equals this mask is an index-level tombstone.
    #[must_use]
    pub fn tag_mask(&self) -> u64 {
        if self.log_size >= 64 {
            0
        } else {
            (1u64 << (64 - self.log_size)) - 1
        }
    }

    /// Encodes `(entry_index, tag)` into a raw 64-bit node word.
    #[must_use]
    pub fn encode(&self, entry_index: u64, tag: u64) -> u64 {
        debug_assert!(entry_index < (1u64 << self.log_size) || self.log_size == 64);
        (entry_index << (64 - self.log_size)) | (tag & self.tag_mask())
    }

    /// Decodes a raw 64-bit node word into `(entry_index, tag)`.
    #[must_use]
    pub fn decode(&self, raw: u64) -> Node {
        Node {
            entry_index: raw >> (64 - self.log_size),
            tag: raw & self.tag_mask(),
        }
    }

    /// The raw word representing an index-level tombstone: all tag bits
    /// set, entry_index left at whatever the encoding implies (ignored by
    /// readers once they see the tag is all-ones).
    #[must_use]
    pub fn tombstone_raw(&self) -> u64 {
        self.tag_mask()
    }

    /// Derives the low bits of a rehashed hash used as this layout's tag.
    #[must_use]
    pub fn tag_of(&self, rehashed: u64) -> u64 {
        rehashed & self.tag_mask()
    }

    /// The maximum Robin-Hood displacement representable/tolerated before a
    /// grow is required. Derived from the tag width: a narrower tag (larger
    /// index) affords a smaller safe probe length before tag collisions
    /// dominate; this crate fixes it to the index size itself, capped, so
    /// that an adversarial workload still terminates with a grow rather
    /// than probing the entire ring.
    #[must_use]
    pub fn max_distance(&self) -> u64 {
        let size = 1u64 << self.log_size;
        size.min(1 << 16)
    }
}

/// `raw == 0` unambiguously means an empty slot (`entry_index == 0` is never
/// a valid payload, invariant 3).
#[must_use]
pub fn is_empty(raw: u64) -> bool {
    raw == 0
}

/// A node is an index-level tombstone iff its tag bits are all set.
#[must_use]
pub fn is_tombstone(raw: u64, layout: &NodeLayout) -> bool {
    raw != 0 && (raw & layout.tag_mask()) == layout.tag_mask()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entry_index_and_tag() {
        let layout = NodeLayout::new(10); // 1024 slots, 54-bit tag space
        let raw = layout.encode(5, 0xABCD);
        let node = layout.decode(raw);
        assert_eq!(node.entry_index, 5);
        assert_eq!(node.tag, 0xABCD & layout.tag_mask());
    }

    #[test]
    fn zero_raw_is_empty() {
        assert!(is_empty(0));
        let layout = NodeLayout::new(10);
        assert!(!is_empty(layout.encode(1, 0)));
    }

    #[test]
    fn tombstone_has_all_tag_bits_set() {
        let layout = NodeLayout::new(8);
        let raw = layout.tombstone_raw();
        assert!(is_tombstone(raw, &layout));
        assert!(!is_empty(raw));
    }

    #[test]
    fn non_tombstone_live_node_is_not_tombstone() {
        let layout = NodeLayout::new(8);
        let raw = layout.encode(3, 1);
        assert!(!is_tombstone(raw, &layout));
    }

    #[test]
    fn entry_index_zero_never_encoded_as_live() {
        // entry_index == 0 combined with tag == 0 is exactly the "empty"
        // raw value; callers must never construct this for a live node.
        let layout = NodeLayout::new(8);
        assert_eq!(layout.encode(0, 0), 0);
    }
}
