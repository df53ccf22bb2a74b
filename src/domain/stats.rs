//! Aggregate statistics over one owner's todos.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Priority;

/// Summary of an owner's todos, recomputed on every request.
///
/// The counts come from independent queries and are not a consistent
/// snapshot when data changes concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoStats {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub overdue: u64,
    pub today_count: u64,
    pub upcoming_count: u64,
    /// Category name to number of todos. Uncategorised todos are not listed.
    pub by_category: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<Priority, u64>,
}

/// The independently computed counts that make up a [`TodoStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsParts {
    pub total: u64,
    pub completed: u64,
    pub overdue: u64,
    pub today_count: u64,
    pub upcoming_count: u64,
    pub by_category: Vec<(String, u64)>,
    pub by_priority: Vec<(Priority, u64)>,
}

impl From<StatsParts> for TodoStats {
    fn from(parts: StatsParts) -> Self {
        let mut by_category = BTreeMap::new();
        for (name, count) in parts.by_category {
            *by_category.entry(name).or_insert(0) += count;
        }
        let mut by_priority = BTreeMap::new();
        for (priority, count) in parts.by_priority {
            *by_priority.entry(priority).or_insert(0) += count;
        }
        Self {
            total: parts.total,
            completed: parts.completed,
            pending: parts.total.saturating_sub(parts.completed),
            overdue: parts.overdue,
            today_count: parts.today_count,
            upcoming_count: parts.upcoming_count,
            by_category,
            by_priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, 4, 6)]
    #[case(3, 3, 0)]
    #[case(2, 5, 0)]
    fn test_pending_is_saturating_difference(
        #[case] total: u64,
        #[case] completed: u64,
        #[case] pending: u64,
    ) {
        let stats = TodoStats::from(StatsParts {
            total,
            completed,
            ..StatsParts::default()
        });
        assert_eq!(stats.pending, pending);
    }

    #[rstest]
    fn test_groupings_merge_duplicate_keys() {
        let stats = TodoStats::from(StatsParts {
            by_category: vec![
                ("Work".to_string(), 2),
                ("Home".to_string(), 1),
                ("Work".to_string(), 3),
            ],
            by_priority: vec![(Priority::High, 1), (Priority::High, 1)],
            ..StatsParts::default()
        });
        assert_eq!(stats.by_category.get("Work"), Some(&5));
        assert_eq!(stats.by_category.get("Home"), Some(&1));
        assert_eq!(stats.by_priority.get(&Priority::High), Some(&2));
    }

    #[rstest]
    fn test_serializes_with_camel_case_keys() {
        let stats = TodoStats::from(StatsParts {
            total: 1,
            today_count: 1,
            by_priority: vec![(Priority::Low, 1)],
            ..StatsParts::default()
        });
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["todayCount"], 1);
        assert_eq!(json["upcomingCount"], 0);
        assert_eq!(json["byPriority"]["low"], 1);
        assert!(json["byCategory"].as_object().unwrap().is_empty());
    }
}
