//! Todo search, pagination and due-date listings.
//!
//! [`apply_search`] turns sparse query-string parameters into a
//! [`TodoFilter`]; [`apply_pagination`] validates paging and ordering and
//! applies them to a [`TodoQuery`]. The handlers below compose the two and
//! hand the result to the todo repository.

use axum::{Extension, Json, extract::State};
use serde::Deserialize;

use super::dto::{Data, TodoResponse, parse_date};
use super::error::{ApiErrorResponse, FieldError, ValidationError};
use super::extract::ApiQuery;
use super::handlers::AppState;
use crate::domain::{CategoryId, OwnerId, Priority, Todo};
use crate::infrastructure::{
    PageWindow, SortDirection, SortField, SortOrder, TodoFilter, TodoPredicate, TodoQuery,
};

// =============================================================================
// Query Parameters
// =============================================================================

/// Filter parameters of `GET /todos-advanced/search`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchParams {
    /// Free text matched against the title and the note.
    pub query: Option<String>,
    /// Category id.
    pub category: Option<String>,
    /// `completed` or `pending`.
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Inclusive lower bound on the due date, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Inclusive upper bound on the due date, `YYYY-MM-DD`.
    pub end_date: Option<String>,
}

/// Paging and ordering parameters.
///
/// Kept as strings so that malformed numbers produce a field error
/// instead of a generic query rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaginationParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub order: Option<String>,
    pub direction: Option<String>,
}

/// Full query string of the search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(flatten)]
    pub search: SearchParams,
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

// =============================================================================
// Filter Composer
// =============================================================================

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|value| value.trim()).filter(|value| !value.is_empty())
}

/// Builds the predicate set for a search.
///
/// Each present parameter adds one predicate; predicates are combined with
/// AND. Values that cannot be interpreted are ignored rather than rejected.
#[must_use]
pub fn apply_search(params: &SearchParams) -> TodoFilter {
    let mut filter = TodoFilter::all();

    if let Some(text) = present(params.query.as_ref()) {
        filter.push(TodoPredicate::TextContains(text.to_string()));
    }
    if let Some(category) = present(params.category.as_ref()).and_then(|raw| raw.parse().ok()) {
        filter.push(TodoPredicate::Category(CategoryId::new(category)));
    }
    match present(params.status.as_ref()) {
        Some(status) if status.eq_ignore_ascii_case("completed") => {
            filter.push(TodoPredicate::Completed(true));
        }
        Some(status) if status.eq_ignore_ascii_case("pending") => {
            filter.push(TodoPredicate::Completed(false));
        }
        _ => {}
    }
    if let Some(priority) =
        present(params.priority.as_ref()).and_then(|raw| raw.parse::<Priority>().ok())
    {
        filter.push(TodoPredicate::Priority(priority));
    }
    if let Some(start) = present(params.start_date.as_ref()).and_then(parse_date) {
        filter.push(TodoPredicate::DueOnOrAfter(start));
    }
    if let Some(end) = present(params.end_date.as_ref()).and_then(parse_date) {
        filter.push(TodoPredicate::DueOnOrBefore(end));
    }

    filter
}

// =============================================================================
// Pager
// =============================================================================

fn positive(field: &'static str, raw: Option<&String>, default: u32) -> Result<u32, FieldError> {
    let Some(raw) = present(raw) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Ok(u32::try_from(value).unwrap_or(u32::MAX)),
        _ => Err(FieldError::new(
            field,
            format!("{field} must be a positive integer, got '{raw}'"),
        )),
    }
}

/// Validates paging and ordering and applies them to `query`.
///
/// Defaults: page 1, limit 10, newest `created_at` first. A limit above
/// [`PageWindow::MAX_LIMIT`] is clamped.
///
/// # Errors
///
/// Returns a `ValidationError` naming each field that is non-numeric, not
/// positive, or not a known order field or direction.
pub fn apply_pagination(
    query: TodoQuery,
    params: &PaginationParams,
) -> Result<TodoQuery, ValidationError> {
    let mut errors = Vec::new();

    let page = positive("page", params.page.as_ref(), 1).map_err(|error| errors.push(error));
    let limit = positive("limit", params.limit.as_ref(), PageWindow::DEFAULT_LIMIT)
        .map_err(|error| errors.push(error));
    let field = present(params.order.as_ref())
        .map_or(Ok(SortField::CreatedAt), str::parse::<SortField>)
        .map_err(|message| errors.push(FieldError::new("order", message)));
    let direction = present(params.direction.as_ref())
        .map_or(Ok(SortDirection::Desc), str::parse::<SortDirection>)
        .map_err(|message| errors.push(FieldError::new("direction", message)));

    match (page, limit, field, direction) {
        (Ok(page), Ok(limit), Ok(field), Ok(direction)) => Ok(TodoQuery {
            order: SortOrder::new(field, direction),
            window: Some(PageWindow::new(page, limit)),
            ..query
        }),
        _ => Err(ValidationError::new(errors)),
    }
}

fn respond(todos: Vec<Todo>) -> Json<Data<Vec<TodoResponse>>> {
    Json(Data::new(todos.into_iter().map(TodoResponse::from).collect()))
}

// =============================================================================
// GET /todos-advanced/search
// =============================================================================

/// Filtered, ordered, paginated todo listing.
///
/// # Errors
///
/// - **400 Bad Request**: invalid paging or ordering, or a store failure
pub async fn search_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiQuery(params): ApiQuery<SearchQuery>,
) -> Result<Json<Data<Vec<TodoResponse>>>, ApiErrorResponse> {
    let filter = apply_search(&params.search);
    let query = apply_pagination(TodoQuery::new(filter, SortOrder::default()), &params.pagination)?;

    let todos = state.todo_repository.list(&owner, &query).await?;
    tracing::debug!(
        count = todos.len(),
        predicates = query.filter.predicates().len(),
        "Search completed"
    );
    Ok(respond(todos))
}

// =============================================================================
// GET /todos-advanced/overdue | today | upcoming
// =============================================================================

/// Incomplete todos whose due moment has passed, earliest due first.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
pub async fn overdue_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Data<Vec<TodoResponse>>>, ApiErrorResponse> {
    let now = state.clock.now().naive_utc();
    let query = TodoQuery::new(TodoFilter::overdue(now), SortOrder::earliest_due_first());
    Ok(respond(state.todo_repository.list(&owner, &query).await?))
}

/// Todos due today, newest first. Completed todos are included.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
pub async fn today_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Data<Vec<TodoResponse>>>, ApiErrorResponse> {
    let today = state.clock.now().date_naive();
    let query = TodoQuery::new(TodoFilter::due_on(today), SortOrder::newest_first());
    Ok(respond(state.todo_repository.list(&owner, &query).await?))
}

/// Incomplete todos due after today, earliest first.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
pub async fn upcoming_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Data<Vec<TodoResponse>>>, ApiErrorResponse> {
    let today = state.clock.now().date_naive();
    let query = TodoQuery::new(TodoFilter::upcoming(today), SortOrder::earliest_due_first());
    Ok(respond(state.todo_repository.list(&owner, &query).await?))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};
    use proptest::prelude::*;
    use rstest::rstest;

    use crate::domain::{NewTodo, TodoId};

    fn search(pairs: &[(&str, &str)]) -> SearchParams {
        let object = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), serde_json::Value::from(*value)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object)).unwrap()
    }

    fn paging(page: Option<&str>, limit: Option<&str>) -> PaginationParams {
        PaginationParams {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
            ..PaginationParams::default()
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    // -------------------------------------------------------------------------
    // apply_search
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_apply_search_without_params_is_empty() {
        assert!(apply_search(&SearchParams::default()).is_empty());
    }

    #[rstest]
    fn test_apply_search_builds_one_predicate_per_param() {
        let filter = apply_search(&search(&[
            ("query", " milk "),
            ("category", "7"),
            ("status", "completed"),
            ("priority", "high"),
            ("startDate", "2024-03-01"),
            ("endDate", "2024-03-31"),
        ]));

        assert_eq!(
            filter.predicates(),
            &[
                TodoPredicate::TextContains("milk".to_string()),
                TodoPredicate::Category(CategoryId::new(7)),
                TodoPredicate::Completed(true),
                TodoPredicate::Priority(Priority::High),
                TodoPredicate::DueOnOrAfter(date(1)),
                TodoPredicate::DueOnOrBefore(date(31)),
            ]
        );
    }

    #[rstest]
    #[case("status", "pending", Some(TodoPredicate::Completed(false)))]
    #[case("status", "archived", None)]
    #[case("category", "work", None)]
    #[case("priority", "urgent", None)]
    #[case("startDate", "yesterday", None)]
    #[case("query", "   ", None)]
    fn test_apply_search_ignores_unusable_values(
        #[case] key: &str,
        #[case] value: &str,
        #[case] expected: Option<TodoPredicate>,
    ) {
        let filter = apply_search(&search(&[(key, value)]));
        assert_eq!(filter.predicates(), expected.as_slice());
    }

    // -------------------------------------------------------------------------
    // apply_pagination
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_apply_pagination_defaults() {
        let query = apply_pagination(TodoQuery::default(), &PaginationParams::default()).unwrap();

        assert_eq!(query.window, Some(PageWindow::new(1, 10)));
        assert_eq!(
            query.order,
            SortOrder::new(SortField::CreatedAt, SortDirection::Desc)
        );
    }

    #[rstest]
    fn test_apply_pagination_keeps_filter() {
        let filter = TodoFilter::completed(true);
        let query = apply_pagination(
            TodoQuery::new(filter.clone(), SortOrder::default()),
            &paging(Some("2"), Some("5")),
        )
        .unwrap();

        assert_eq!(query.filter, filter);
        assert_eq!(query.window.map(|window| window.offset()), Some(5));
    }

    #[rstest]
    fn test_apply_pagination_clamps_limit() {
        let query = apply_pagination(TodoQuery::default(), &paging(None, Some("1000"))).unwrap();
        assert_eq!(query.window.map(|window| window.limit()), Some(100));
    }

    #[rstest]
    #[case(Some("0"), None, "page")]
    #[case(Some("-3"), None, "page")]
    #[case(Some("two"), None, "page")]
    #[case(None, Some("0"), "limit")]
    #[case(None, Some("1.5"), "limit")]
    fn test_apply_pagination_rejects_bad_numbers(
        #[case] page: Option<&str>,
        #[case] limit: Option<&str>,
        #[case] field: &str,
    ) {
        let error = apply_pagination(TodoQuery::default(), &paging(page, limit)).unwrap_err();
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].field, field);
    }

    #[rstest]
    fn test_apply_pagination_rejects_unknown_order_and_direction() {
        let params = PaginationParams {
            order: Some("user_id".to_string()),
            direction: Some("sideways".to_string()),
            ..PaginationParams::default()
        };

        let error = apply_pagination(TodoQuery::default(), &params).unwrap_err();

        let fields: Vec<&str> = error.errors.iter().map(|error| error.field.as_str()).collect();
        assert_eq!(fields, vec!["order", "direction"]);
    }

    #[rstest]
    fn test_apply_pagination_accepts_every_order_field() {
        for field in SortField::ALL {
            let params = PaginationParams {
                order: Some(field.as_str().to_string()),
                direction: Some("ASC".to_string()),
                ..PaginationParams::default()
            };
            let query = apply_pagination(TodoQuery::default(), &params).unwrap();
            assert_eq!(query.order, SortOrder::new(field, SortDirection::Asc));
        }
    }

    // -------------------------------------------------------------------------
    // Property Tests
    // -------------------------------------------------------------------------

    fn sample_todos(count: usize) -> Vec<Todo> {
        let owner = OwnerId::generate();
        let base = DateTime::<Utc>::from_timestamp(1_710_000_000, 0).unwrap();
        (0..count)
            .map(|index| {
                let offset = i64::try_from(index).unwrap();
                let mut draft = NewTodo::new(format!("todo {index}"))
                    .with_priority(Priority::ALL[index % 3]);
                if index % 4 != 0 {
                    draft = draft.with_date(date(1 + u32::try_from(index % 28).unwrap()));
                }
                if index % 5 == 0 {
                    draft = draft.completed();
                }
                Todo::from_draft(
                    TodoId::new(offset + 1),
                    owner,
                    draft,
                    base + chrono::Duration::minutes(offset % 7),
                )
            })
            .collect()
    }

    proptest! {
        /// A valid page holds at most `limit` rows, starting at `(page - 1) * limit`
        /// of the fully ordered listing.
        #[test]
        fn pagination_windows_the_ordered_listing(
            count in 0_usize..60,
            page in 1_u32..8,
            limit in 1_u32..15,
            field_index in 0_usize..SortField::ALL.len(),
            ascending in any::<bool>(),
        ) {
            let todos = sample_todos(count);
            let params = PaginationParams {
                page: Some(page.to_string()),
                limit: Some(limit.to_string()),
                order: Some(SortField::ALL[field_index].as_str().to_string()),
                direction: Some(if ascending { "asc" } else { "desc" }.to_string()),
            };
            let query = apply_pagination(TodoQuery::default(), &params).unwrap();
            let unpaged = TodoQuery { window: None, ..query.clone() };

            let everything = unpaged.apply(&todos);
            let window = query.apply(&todos);

            let offset = ((page - 1) * limit) as usize;
            prop_assert!(window.len() <= limit as usize);
            let expected: Vec<TodoId> = everything
                .iter()
                .skip(offset)
                .take(limit as usize)
                .map(|todo| todo.id)
                .collect();
            let actual: Vec<TodoId> = window.iter().map(|todo| todo.id).collect();
            prop_assert_eq!(actual, expected);
        }

        /// Combining filters yields the intersection of the single-filter results.
        #[test]
        fn combined_filters_intersect(
            status in prop::option::of(prop_oneof![Just("completed"), Just("pending")]),
            priority in prop::option::of(prop_oneof![Just("low"), Just("medium"), Just("high")]),
            start in prop::option::of(1_u32..28),
            text in prop::option::of(prop_oneof![Just("todo 1"), Just("TODO 2"), Just("3")]),
        ) {
            let todos = sample_todos(40);
            let start = start.map(|day| date(day).format("%Y-%m-%d").to_string());
            let mut pairs: Vec<(&str, &str)> = Vec::new();
            if let Some(status) = status { pairs.push(("status", status)); }
            if let Some(priority) = priority { pairs.push(("priority", priority)); }
            if let Some(start) = start.as_deref() { pairs.push(("startDate", start)); }
            if let Some(text) = text { pairs.push(("query", text)); }

            let combined = apply_search(&search(&pairs));
            let singles: Vec<TodoFilter> = pairs
                .iter()
                .map(|pair| apply_search(&search(std::slice::from_ref(pair))))
                .collect();

            for todo in &todos {
                let expected = singles.iter().all(|filter| filter.matches(todo));
                prop_assert_eq!(combined.matches(todo), expected);
            }
        }
    }
}
