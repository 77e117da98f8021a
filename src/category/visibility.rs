//! Visibility cascade planning.
//!
//! Hiding or showing a category touches its whole subtree. The planners here
//! are pure: given the current flags of the target and of every descendant,
//! they compute every row that must change. The store then writes the plan
//! in one transaction.
//!
//! `visibleold` means two different things depending on who set it:
//!
//! - on the category the caller hid directly, it is whatever the caller
//!   passed (`false` for a plain hide, `true` when the hide is a side effect
//!   of moving into a hidden parent);
//! - on a descendant hidden by the cascade, it is the descendant's own
//!   `visible` flag right before the cascade.
//!
//! Showing a category only turns back on the descendants whose `visibleold`
//! is set, so a subcategory hidden on its own before its parent was hidden
//! stays hidden when the parent is shown again.
use crate::storage::{CourseVisibilityAction, VisibilityChange, VisibilityPlan, VisibilityState};

/// Plan hiding `target` and cascading to `descendants`.
///
/// Returns `None` when nothing would change.
pub fn plan_hide(
    target: VisibilityState,
    descendants: &[VisibilityState],
    visible_old: bool,
) -> Option<VisibilityPlan> {
    if !target.visible {
        // Already hidden: only the undo buffer of the target may change, and
        // the subtree is left exactly as the earlier hide put it.
        if target.visibleold == visible_old {
            return None;
        }
        return Some(VisibilityPlan {
            categories: vec![VisibilityChange {
                id: target.id,
                visible: false,
                visibleold: visible_old,
            }],
            course_categories: Vec::new(),
            courses: CourseVisibilityAction::Hide,
        });
    }

    let mut categories = Vec::with_capacity(descendants.len() + 1);
    categories.push(VisibilityChange {
        id: target.id,
        visible: false,
        visibleold: visible_old,
    });
    categories.extend(descendants.iter().map(|d| VisibilityChange {
        id: d.id,
        visible: false,
        visibleold: d.visible,
    }));

    let course_categories = categories.iter().map(|c| c.id).collect();

    Some(VisibilityPlan {
        categories,
        course_categories,
        courses: CourseVisibilityAction::Hide,
    })
}

/// Plan showing `target` and restoring its subtree.
///
/// Returns `None` when the target is already visible.
pub fn plan_show(
    target: VisibilityState,
    descendants: &[VisibilityState],
) -> Option<VisibilityPlan> {
    if target.visible {
        return None;
    }

    let mut categories = vec![VisibilityChange {
        id: target.id,
        visible: true,
        visibleold: true,
    }];
    categories.extend(
        descendants
            .iter()
            .filter(|d| d.visibleold && !d.visible)
            .map(|d| VisibilityChange {
                id: d.id,
                visible: true,
                visibleold: d.visibleold,
            }),
    );

    let course_categories = std::iter::once(target.id)
        .chain(descendants.iter().map(|d| d.id))
        .collect();

    Some(VisibilityPlan {
        categories,
        course_categories,
        courses: CourseVisibilityAction::Restore,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: i64, visible: bool, visibleold: bool) -> VisibilityState {
        VisibilityState {
            id,
            visible,
            visibleold,
        }
    }

    fn find(plan: &VisibilityPlan, id: i64) -> Option<VisibilityChange> {
        plan.categories.iter().copied().find(|c| c.id == id)
    }

    #[test]
    fn test_direct_hide_records_caller_value() {
        let plan = plan_hide(state(1, true, true), &[], false).unwrap();
        assert_eq!(find(&plan, 1), Some(state(1, false, false)));
        assert_eq!(plan.course_categories, vec![1]);
        assert_eq!(plan.courses, CourseVisibilityAction::Hide);
    }

    #[test]
    fn test_cascade_hide_records_prior_visibility() {
        let descendants = [state(2, true, true), state(3, false, false)];
        let plan = plan_hide(state(1, true, true), &descendants, false).unwrap();

        assert_eq!(find(&plan, 2), Some(state(2, false, true)));
        assert_eq!(find(&plan, 3), Some(state(3, false, false)));
        assert_eq!(plan.course_categories, vec![1, 2, 3]);
    }

    #[test]
    fn test_hide_already_hidden_is_noop() {
        assert!(plan_hide(state(1, false, false), &[state(2, false, true)], false).is_none());
    }

    #[test]
    fn test_hide_already_hidden_updates_undo_buffer_only() {
        let plan = plan_hide(state(1, false, false), &[state(2, false, true)], true).unwrap();
        assert_eq!(plan.categories, vec![state(1, false, true)]);
        assert!(plan.course_categories.is_empty());
    }

    #[test]
    fn test_show_restores_only_cascade_hidden() {
        // 2 was visible before the parent was hidden, 3 was already hidden.
        let descendants = [state(2, false, true), state(3, false, false)];
        let plan = plan_show(state(1, false, false), &descendants).unwrap();

        assert_eq!(find(&plan, 1), Some(state(1, true, true)));
        assert_eq!(find(&plan, 2), Some(state(2, true, true)));
        assert_eq!(find(&plan, 3), None);
        assert_eq!(plan.course_categories, vec![1, 2, 3]);
        assert_eq!(plan.courses, CourseVisibilityAction::Restore);
    }

    #[test]
    fn test_show_visible_is_noop() {
        assert!(plan_show(state(1, true, true), &[]).is_none());
    }

    #[test]
    fn test_hide_then_show_round_trip() {
        let before = [state(2, true, true), state(3, false, false)];
        let hide = plan_hide(state(1, true, true), &before, false).unwrap();

        let hidden: Vec<VisibilityState> = hide.categories[1..].to_vec();
        let show = plan_show(hide.categories[0], &hidden).unwrap();

        assert_eq!(find(&show, 2).map(|c| c.visible), Some(true));
        assert_eq!(find(&show, 3), None);
    }
}
