//! Selection subscriber trait

use super::SelectionEvent;

/// Trait for components that need to respond to selection changes
pub trait SelectionSubscriber: Send + Sync {
    /// Called after a clause was stored or removed
    fn on_selection_change(&self, event: &SelectionEvent);
}
