// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! The enumerable stage taxonomy consulted by the interception hook.

/// What kind of stage a subscriber is being constructed for.
///
/// The skip-list is deliberately a closed set of variants instead of
/// open-ended type inspection: every stage kind added to the pipeline layer
/// must pick a variant here, which keeps the list auditable. The variants
/// that are skipped do not transfer from other reactive runtimes; they are
/// derived against this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// A producing stage that emits a sequence of items.
    Source,
    /// An intermediate transforming stage.
    Operator,
    /// A source that emits at most one signal instantly (`just`, `empty`,
    /// `fail`). Skipped: the wrap would outweigh the stage.
    Scalar,
    /// A fan-out stage delivering each signal to many subscribers. Skipped:
    /// a wrapper captured at one subscriber's wrap time would bracket the
    /// other subscribers' deliveries.
    Multicast,
    /// A stage that splits one sequence into keyed sub-sequences. Skipped
    /// for the same fan-out hazard as [`StageKind::Multicast`].
    Grouped,
}

impl StageKind {
    /// Whether the hook may wrap a stage of this kind.
    #[inline]
    pub fn wrappable(self) -> bool {
        matches!(self, StageKind::Source | StageKind::Operator)
    }
}

#[cfg(test)]
mod tests {
    use super::StageKind;

    #[test]
    fn test_skip_list_is_exactly_the_composite_and_scalar_kinds() {
        assert!(StageKind::Source.wrappable());
        assert!(StageKind::Operator.wrappable());
        assert!(!StageKind::Scalar.wrappable());
        assert!(!StageKind::Multicast.wrappable());
        assert!(!StageKind::Grouped.wrappable());
    }
}
