//! Merging the hosting and invited legs into one ordered page.

use std::cmp::Ordering;
use std::collections::HashSet;

use eventful_types::{Event, PageRequest};

/// The feed's total order: newest first, then `id` ascending.
pub fn feed_order(a: &Event, b: &Event) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Combines both legs into one deduplicated sequence in feed order.
///
/// Hosting items are inserted first, so an event present in both legs keeps
/// its hosting copy. Duplicates within a single leg are dropped as well.
pub fn merge(hosting: Vec<Event>, invited: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::with_capacity(hosting.len() + invited.len());
    let mut merged = Vec::with_capacity(hosting.len() + invited.len());
    for event in hosting.into_iter().chain(invited) {
        if seen.insert(event.id.clone()) {
            merged.push(event);
        }
    }
    merged.sort_by(feed_order);
    merged
}

/// Returns the `[offset, offset + limit)` window of an ordered sequence.
pub fn slice_page(items: Vec<Event>, page: PageRequest) -> Vec<Event> {
    items
        .into_iter()
        .skip(page.offset())
        .take(page.limit as usize)
        .collect()
}

/// Merges both legs and slices out the requested page.
///
/// Each leg must hold at least its first `page.end()` items in feed order
/// for the window to be complete.
pub fn merge_and_page(hosting: Vec<Event>, invited: Vec<Event>, page: PageRequest) -> Vec<Event> {
    slice_page(merge(hosting, invited), page)
}
