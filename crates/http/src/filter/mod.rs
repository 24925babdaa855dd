//! Priority-grouped response filters.
//!
//! Filters intercept a response at two points: once when the head is
//! emitted (head phase) and once per body flush (body phase). They are
//! registered with a [`FilterPriority`] and bucketed into at most three
//! groups, stored high to low; within a group registration order is
//! preserved and empty groups are omitted.
//!
//! Each filter returns a [`FilterAction`]. `Continue` proceeds to the
//! next filter; `Stop` skips the remaining filters of the current group
//! *and* all later groups for that phase. Filters mutate the response
//! through the narrow [`ResponseParts`] view and must not retain it past
//! the call.

use std::fmt;
use std::sync::Arc;

use crate::response::ResponseParts;

/// Which tier a filter runs in. Tiers run high to low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPriority {
    High,
    Medium,
    Low,
}

/// The outcome of one filter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Proceed to the next filter.
    Continue,
    /// Skip every remaining filter of this phase.
    Stop,
}

/// A response-side interceptor. Both phases default to pass-through, so
/// implementors override only the one they care about.
pub trait ResponseFilter: Send + Sync {
    /// Runs once, immediately before the header table freezes.
    fn filter_head(&self, _parts: &mut ResponseParts) -> FilterAction {
        FilterAction::Continue
    }

    /// Runs once per body flush, before the chunk reaches the transport.
    fn filter_body(&self, _parts: &mut ResponseParts) -> FilterAction {
        FilterAction::Continue
    }
}

/// Ordered groups of response filters, applied by the state machine.
pub struct FilterChain {
    groups: Vec<Vec<Arc<dyn ResponseFilter>>>,
}

impl FilterChain {
    /// A chain with no filters; both phases are pass-through.
    pub fn empty() -> Self {
        Self { groups: Vec::new() }
    }

    /// Buckets `(filter, priority)` registrations into tiers.
    ///
    /// Registrations may arrive in any order; tiers sort high before
    /// medium before low while keeping registration order inside each
    /// tier. Tiers with no filters are not stored.
    pub fn from_registrations(registrations: Vec<(Arc<dyn ResponseFilter>, FilterPriority)>) -> Self {
        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low = Vec::new();
        for (filter, priority) in registrations {
            match priority {
                FilterPriority::High => high.push(filter),
                FilterPriority::Medium => medium.push(filter),
                FilterPriority::Low => low.push(filter),
            }
        }
        let groups = [high, medium, low].into_iter().filter(|group| !group.is_empty()).collect();
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn run_head(&self, parts: &mut ResponseParts) {
        'chain: for group in &self.groups {
            for filter in group {
                if filter.filter_head(parts) == FilterAction::Stop {
                    break 'chain;
                }
            }
        }
    }

    pub(crate) fn run_body(&self, parts: &mut ResponseParts) {
        'chain: for group in &self.groups {
            for filter in group {
                if filter.filter_body(parts) == FilterAction::Stop {
                    break 'chain;
                }
            }
        }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<usize> = self.groups.iter().map(Vec::len).collect();
        f.debug_struct("FilterChain").field("group_sizes", &sizes).finish()
    }
}

/// Wraps a closure as a head-phase filter.
pub fn head_filter_fn<F>(f: F) -> impl ResponseFilter
where
    F: Fn(&mut ResponseParts) -> FilterAction + Send + Sync,
{
    HeadFilterFn(f)
}

/// Wraps a closure as a body-phase filter.
pub fn body_filter_fn<F>(f: F) -> impl ResponseFilter
where
    F: Fn(&mut ResponseParts) -> FilterAction + Send + Sync,
{
    BodyFilterFn(f)
}

struct HeadFilterFn<F>(F);

impl<F> ResponseFilter for HeadFilterFn<F>
where
    F: Fn(&mut ResponseParts) -> FilterAction + Send + Sync,
{
    fn filter_head(&self, parts: &mut ResponseParts) -> FilterAction {
        (self.0)(parts)
    }
}

struct BodyFilterFn<F>(F);

impl<F> ResponseFilter for BodyFilterFn<F>
where
    F: Fn(&mut ResponseParts) -> FilterAction + Send + Sync,
{
    fn filter_body(&self, parts: &mut ResponseParts) -> FilterAction {
        (self.0)(parts)
    }
}
