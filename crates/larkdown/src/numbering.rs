//! Ordered-list numbering
//!
//! The source stores a sequence hint on ordered blocks that is usually an
//! `auto` placeholder, so numbers are rebuilt from the sibling list instead.

use crate::model::{Block, BlockKind};

/// Sequence numbers for a sibling list.
///
/// Each ordered sibling gets the count of ordered siblings since the last
/// non-ordered one, inclusive. Other siblings get `None`.
pub fn sequence_numbers(siblings: &[Block]) -> Vec<Option<u32>> {
    number_kinds(siblings.iter().map(|block| &block.kind))
}

fn number_kinds<'a>(kinds: impl Iterator<Item = &'a BlockKind>) -> Vec<Option<u32>> {
    let mut count = 0;
    kinds
        .map(|kind| {
            if *kind == BlockKind::Ordered {
                count += 1;
                Some(count)
            } else {
                count = 0;
                None
            }
        })
        .collect()
}
