use crate::annotations::OwnerAnnotations;

/// Decides which owner watch events warrant a reconciliation.
///
/// Only transitions of the boolean flags are admitted by default; edits to the label list
/// annotations are picked up the next time the owner is reconciled for another reason. Setting
/// `track_label_lists` admits those edits as well.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub track_label_lists: bool,
}

// === impl EventFilter ===

impl EventFilter {
    pub fn new(track_label_lists: bool) -> Self {
        Self { track_label_lists }
    }

    /// Admits a newly observed owner only if it opts into microsegmentation.
    pub fn admit_create(&self, new: &OwnerAnnotations) -> bool {
        new.microsegmentation()
    }

    /// Admits a change to an owner if either flag flipped.
    pub fn admit_update(&self, old: &OwnerAnnotations, new: &OwnerAnnotations) -> bool {
        if old.microsegmentation() != new.microsegmentation()
            || old.allow_from_self() != new.allow_from_self()
        {
            return true;
        }

        self.track_label_lists
            && (old.inbound_namespace_labels != new.inbound_namespace_labels
                || old.outbound_namespace_labels != new.outbound_namespace_labels)
    }
}
