//! `GET /todos-advanced/stats`.

use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};

use super::dto::Data;
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::{OwnerId, StatsParts, TodoStats};
use crate::infrastructure::{RepositoryResult, TodoFilter, TodoRepository};

/// Computes the summary of one owner's todos at `now`.
///
/// The five counts and the two breakdowns are independent queries issued
/// concurrently. The first failure fails the whole summary.
///
/// # Errors
///
/// Returns the first `RepositoryError` reported by any query.
pub async fn get_todo_stats(
    repository: &dyn TodoRepository,
    owner: &OwnerId,
    now: DateTime<Utc>,
) -> RepositoryResult<TodoStats> {
    let today = now.date_naive();
    let total = TodoFilter::all();
    let completed = TodoFilter::completed(true);
    let overdue = TodoFilter::overdue(now.naive_utc());
    let due_today = TodoFilter::due_on(today);
    let upcoming = TodoFilter::upcoming(today);

    let (total, completed, overdue, today_count, upcoming_count, by_category, by_priority) =
        futures::try_join!(
            repository.count(owner, &total),
            repository.count(owner, &completed),
            repository.count(owner, &overdue),
            repository.count(owner, &due_today),
            repository.count(owner, &upcoming),
            repository.count_by_category(owner),
            repository.count_by_priority(owner),
        )?;

    Ok(TodoStats::from(StatsParts {
        total,
        completed,
        overdue,
        today_count,
        upcoming_count,
        by_category,
        by_priority,
    }))
}

/// Aggregate counts for the caller.
///
/// # Errors
///
/// - **400 Bad Request**: any count failed
pub async fn todo_stats(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Data<TodoStats>>, ApiErrorResponse> {
    let stats = get_todo_stats(state.todo_repository.as_ref(), &owner, state.clock.now()).await?;
    Ok(Json(Data::new(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use rstest::{fixture, rstest};

    use crate::domain::{NewCategory, NewTodo, Priority, TodoPatch};
    use crate::infrastructure::{CategoryRepository, FixedClock, InMemoryStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[fixture]
    fn store() -> InMemoryStore {
        InMemoryStore::with_clock(Arc::new(FixedClock::new(now())))
    }

    #[rstest]
    #[tokio::test]
    async fn test_empty_owner_has_zero_stats(store: InMemoryStore) {
        let stats = get_todo_stats(&store, &OwnerId::generate(), now()).await.unwrap();
        assert_eq!(stats, TodoStats::default());
    }

    #[rstest]
    #[tokio::test]
    async fn test_stats_classify_due_dates(store: InMemoryStore) {
        let owner = OwnerId::generate();
        let work = CategoryRepository::insert(&store, &owner, NewCategory::new("Work", "#f00"))
            .await
            .unwrap();
        TodoRepository::insert_many(
            &store,
            &owner,
            vec![
                NewTodo::new("past").with_date(day(8)).with_category(work.id),
                NewTodo::new("past done").with_date(day(8)).completed(),
                NewTodo::new("earlier today")
                    .with_date(day(10))
                    .with_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
                NewTodo::new("later today")
                    .with_date(day(10))
                    .with_time(NaiveTime::from_hms_opt(18, 0, 0).unwrap())
                    .with_priority(Priority::High),
                NewTodo::new("tomorrow").with_date(day(11)).with_category(work.id),
                NewTodo::new("someday").with_priority(Priority::Low),
            ],
        )
        .await
        .unwrap();

        let stats = get_todo_stats(&store, &owner, now()).await.unwrap();

        assert_eq!(stats.total, 6);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 5);
        assert_eq!(stats.overdue, 2);
        assert_eq!(stats.today_count, 2);
        assert_eq!(stats.upcoming_count, 1);
        assert_eq!(stats.by_category.get("Work"), Some(&2));
        assert_eq!(stats.by_category.len(), 1);
        assert_eq!(stats.by_priority.get(&Priority::Medium), Some(&4));
        assert_eq!(stats.by_priority.get(&Priority::High), Some(&1));
        assert_eq!(stats.by_priority.get(&Priority::Low), Some(&1));
    }

    #[rstest]
    #[tokio::test]
    async fn test_stats_ignore_other_owners(store: InMemoryStore) {
        let owner = OwnerId::generate();
        TodoRepository::insert_many(&store, &OwnerId::generate(), vec![NewTodo::new("not mine")])
            .await
            .unwrap();

        let stats = get_todo_stats(&store, &owner, now()).await.unwrap();

        assert_eq!(stats.total, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_completing_an_overdue_todo_clears_it(store: InMemoryStore) {
        let owner = OwnerId::generate();
        let todo = TodoRepository::insert(&store, &owner, NewTodo::new("late").with_date(day(1)))
            .await
            .unwrap();
        assert_eq!(get_todo_stats(&store, &owner, now()).await.unwrap().overdue, 1);

        let patch = TodoPatch {
            completed: Some(true),
            ..TodoPatch::default()
        };
        TodoRepository::update(&store, &owner, todo.id, &patch).await.unwrap();

        let stats = get_todo_stats(&store, &owner, now()).await.unwrap();
        assert_eq!(stats.overdue, 0);
        assert_eq!(stats.completed, 1);
    }

    #[rstest]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(TodoStats {
            by_priority: [(Priority::High, 2)].into_iter().collect(),
            ..TodoStats::default()
        })
        .unwrap();

        assert_eq!(json["todayCount"], 0);
        assert_eq!(json["upcomingCount"], 0);
        assert_eq!(json["byPriority"]["high"], 2);
        assert!(json["byCategory"].as_object().unwrap().is_empty());
    }
}
