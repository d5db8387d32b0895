//! Change classification produced when caches absorb new compiler output.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// One classified change to an ABI-relevant fact of a class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeInfo {
    /// Nothing ABI-relevant changed.
    NoChange,
    /// An inline function appeared that did not exist before.
    InlineBodyAdded {
        /// Owning class.
        scope: String,
    },
    /// An existing inline function's body changed or was removed.
    InlineBodyChanged {
        /// Owning class.
        scope: String,
    },
    /// A constant was added, removed, or changed value.
    ConstantValueChanged {
        /// Owning class.
        scope: String,
    },
    /// Non-private member signatures changed.
    SignatureChanged {
        /// Names of the changed members; may be empty when only the owner
        /// is known to have changed.
        members: Vec<String>,
        /// Owning class; the lookup scope of `members`.
        scope: String,
    },
}

/// The aggregated changes of one round.
///
/// Aggregation with `+` is associative with [`CompilationResult::NO_CHANGES`]
/// as identity; flags combine by `or` and change lists concatenate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilationResult {
    /// An inline function was newly added somewhere.
    pub inline_added: bool,
    /// An inline function body changed somewhere.
    pub inline_changed: bool,
    /// A constant value changed somewhere.
    pub constants_changed: bool,
    /// A non-private signature changed somewhere.
    pub signature_changed: bool,
    /// Member-level changes in the order they were observed.
    pub changes: Vec<ChangeInfo>,
}

impl CompilationResult {
    /// The identity: no changes at all.
    pub const NO_CHANGES: CompilationResult = CompilationResult {
        inline_added: false,
        inline_changed: false,
        constants_changed: false,
        signature_changed: false,
        changes: Vec::new(),
    };

    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        !self.inline_added
            && !self.inline_changed
            && !self.constants_changed
            && !self.signature_changed
            && self.changes.is_empty()
    }

    /// A result flagging a signature change without naming members.
    pub fn signature_only() -> Self {
        Self {
            signature_changed: true,
            ..Self::NO_CHANGES
        }
    }
}

impl From<ChangeInfo> for CompilationResult {
    fn from(change: ChangeInfo) -> Self {
        let mut result = CompilationResult::NO_CHANGES;
        match &change {
            ChangeInfo::NoChange => return result,
            ChangeInfo::InlineBodyAdded { .. } => result.inline_added = true,
            ChangeInfo::InlineBodyChanged { .. } => result.inline_changed = true,
            ChangeInfo::ConstantValueChanged { .. } => result.constants_changed = true,
            ChangeInfo::SignatureChanged { .. } => result.signature_changed = true,
        }
        result.changes.push(change);
        result
    }
}

impl AddAssign for CompilationResult {
    fn add_assign(&mut self, other: CompilationResult) {
        self.inline_added |= other.inline_added;
        self.inline_changed |= other.inline_changed;
        self.constants_changed |= other.constants_changed;
        self.signature_changed |= other.signature_changed;
        self.changes.extend(other.changes);
    }
}

impl AddAssign<ChangeInfo> for CompilationResult {
    fn add_assign(&mut self, change: ChangeInfo) {
        *self += CompilationResult::from(change);
    }
}

impl Add for CompilationResult {
    type Output = CompilationResult;

    fn add(mut self, other: CompilationResult) -> CompilationResult {
        self += other;
        self
    }
}

impl Sum for CompilationResult {
    fn sum<I: Iterator<Item = CompilationResult>>(iter: I) -> Self {
        iter.fold(CompilationResult::NO_CHANGES, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(member: &str) -> ChangeInfo {
        ChangeInfo::SignatureChanged {
            members: vec![member.to_string()],
            scope: "app.Widget".to_string(),
        }
    }

    fn added() -> ChangeInfo {
        ChangeInfo::InlineBodyAdded {
            scope: "app.Util".to_string(),
        }
    }

    #[test]
    fn no_change_is_identity() {
        let r = CompilationResult::from(sig("foo"));
        assert_eq!(r.clone() + CompilationResult::from(ChangeInfo::NoChange), r);
        assert_eq!(CompilationResult::NO_CHANGES + r.clone(), r);
        assert!(CompilationResult::from(ChangeInfo::NoChange).is_empty());
    }

    #[test]
    fn flags_accumulate() {
        let total: CompilationResult = vec![
            CompilationResult::from(sig("foo")),
            CompilationResult::from(added()),
            CompilationResult::from(ChangeInfo::ConstantValueChanged {
                scope: "app.K".to_string(),
            }),
        ]
        .into_iter()
        .sum();
        assert!(total.signature_changed);
        assert!(total.inline_added);
        assert!(total.constants_changed);
        assert!(!total.inline_changed);
        assert_eq!(total.changes.len(), 3);
    }

    #[test]
    fn aggregation_is_associative() {
        let a = CompilationResult::from(sig("a"));
        let b = CompilationResult::from(added());
        let c = CompilationResult::from(sig("c"));
        assert_eq!(
            (a.clone() + b.clone()) + c.clone(),
            a + (b + c)
        );
    }

    #[test]
    fn flags_are_commutative() {
        let a = CompilationResult::from(sig("a"));
        let b = CompilationResult::from(added());
        let ab = a.clone() + b.clone();
        let ba = b + a;
        assert_eq!(ab.inline_added, ba.inline_added);
        assert_eq!(ab.signature_changed, ba.signature_changed);
        assert_eq!(ab.changes.len(), ba.changes.len());
    }

    #[test]
    fn signature_only_has_no_members() {
        let r = CompilationResult::signature_only();
        assert!(r.signature_changed);
        assert!(r.changes.is_empty());
        assert!(!r.is_empty());
    }
}
