use std::cmp::Ordering;
use std::sync::Arc;

use crate::types::{extract_user_key, trailer};

/// Total order over byte strings.
///
/// User keys are ordered by an injected comparator so applications can
/// supply their own ordering without touching the table code. The name is
/// recorded for diagnostics; two comparators with the same name must agree.
pub trait Comparator: Send + Sync {
    /// Stable identifier of this ordering.
    fn name(&self) -> &'static str;

    /// Three-way comparison of `a` and `b`.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte ordering. The default user comparator.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "lsm.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders encoded internal keys: user key ascending through the wrapped
/// user comparator, then trailer (sequence, type) descending.
///
/// Keys shorter than the 8-byte trailer sort as if their trailer were 0;
/// callers that need to reject them parse with `ParsedInternalKey::decode`.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user: Arc<dyn Comparator>) -> Self {
        InternalKeyComparator { user }
    }

    /// The wrapped user-key comparator.
    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user
    }
}

impl Comparator for InternalKeyComparator {
    fn name(&self) -> &'static str {
        "lsm.InternalKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user
            .compare(extract_user_key(a), extract_user_key(b))
            .then_with(|| trailer(b).cmp(&trailer(a)))
    }
}

impl std::fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user", &self.user.name())
            .finish()
    }
}
