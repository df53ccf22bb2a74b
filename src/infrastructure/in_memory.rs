//! In-memory repository implementation.
//!
//! A single [`InMemoryStore`] holds todos, categories and attachments behind
//! one `Arc<RwLock<..>>` and implements every repository trait. Multi-row
//! writes validate every input before mutating anything while holding the
//! write lock, which gives them the same all-or-nothing behaviour as the
//! PostgreSQL transactions.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::domain::{
    Attachment, AttachmentId, Category, CategoryId, CategoryPatch, NewAttachment, NewCategory,
    NewTodo, OwnerId, Priority, Todo, TodoId, TodoPatch,
};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::repository::{
    AttachmentRepository, CategoryRepository, PositionUpdate, RepositoryError, RepositoryResult,
    TodoFilter, TodoQuery, TodoRepository,
};

// =============================================================================
// Tables
// =============================================================================

#[derive(Debug, Default)]
struct Tables {
    todos: BTreeMap<TodoId, Todo>,
    categories: BTreeMap<CategoryId, Category>,
    attachments: BTreeMap<AttachmentId, Attachment>,
    todo_sequence: i64,
    category_sequence: i64,
    attachment_sequence: i64,
}

impl Tables {
    fn next_todo_id(&mut self) -> TodoId {
        self.todo_sequence += 1;
        TodoId::new(self.todo_sequence)
    }

    fn next_category_id(&mut self) -> CategoryId {
        self.category_sequence += 1;
        CategoryId::new(self.category_sequence)
    }

    fn next_attachment_id(&mut self) -> AttachmentId {
        self.attachment_sequence += 1;
        AttachmentId::new(self.attachment_sequence)
    }

    fn owned_todos<'t>(&'t self, owner: &'t OwnerId) -> impl Iterator<Item = &'t Todo> + 't {
        self.todos.values().filter(move |todo| todo.owner == *owner)
    }

    fn owns_todo(&self, owner: &OwnerId, id: TodoId) -> bool {
        self.todos.get(&id).is_some_and(|todo| todo.owner == *owner)
    }

    fn owns_category(&self, owner: &OwnerId, id: CategoryId) -> bool {
        self.categories
            .get(&id)
            .is_some_and(|category| category.owner == *owner)
    }

    fn check_category_reference(
        &self,
        owner: &OwnerId,
        category_id: Option<CategoryId>,
    ) -> RepositoryResult<()> {
        match category_id {
            Some(id) if !self.owns_category(owner, id) => Err(
                RepositoryError::ConstraintViolation(format!("Category {id} does not exist")),
            ),
            _ => Ok(()),
        }
    }

    fn remove_todo(&mut self, owner: &OwnerId, id: TodoId) -> Option<Todo> {
        if !self.owns_todo(owner, id) {
            return None;
        }
        self.attachments
            .retain(|_, attachment| attachment.todo_id != id);
        self.todos.remove(&id)
    }

    fn remove_category(&mut self, owner: &OwnerId, id: CategoryId) -> Option<Category> {
        if !self.owns_category(owner, id) {
            return None;
        }
        for todo in self.todos.values_mut() {
            if todo.category_id == Some(id) {
                todo.category_id = None;
            }
        }
        self.categories.remove(&id)
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory implementation of every repository trait.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Creates an empty store stamping rows with the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store stamping rows with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            clock,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TodoRepository
// =============================================================================

impl TodoRepository for InMemoryStore {
    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Todo>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(guard
                .todos
                .get(&id)
                .filter(|todo| todo.owner == *owner)
                .cloned())
        })
    }

    fn list<'a>(
        &'a self,
        owner: &'a OwnerId,
        query: &'a TodoQuery,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(query.apply(guard.owned_todos(owner)))
        })
    }

    fn count<'a>(
        &'a self,
        owner: &'a OwnerId,
        filter: &'a TodoFilter,
    ) -> BoxFuture<'a, RepositoryResult<u64>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let count = guard
                .owned_todos(owner)
                .filter(|todo| filter.matches(todo))
                .count();
            Ok(count as u64)
        })
    }

    fn count_by_priority<'a>(
        &'a self,
        owner: &'a OwnerId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<(Priority, u64)>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let mut counts: BTreeMap<Priority, u64> = BTreeMap::new();
            for todo in guard.owned_todos(owner) {
                *counts.entry(todo.priority).or_insert(0) += 1;
            }
            Ok(counts.into_iter().collect())
        })
    }

    fn count_by_category<'a>(
        &'a self,
        owner: &'a OwnerId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<(String, u64)>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for todo in guard.owned_todos(owner) {
                let category = todo
                    .category_id
                    .and_then(|id| guard.categories.get(&id))
                    .filter(|category| category.owner == *owner);
                if let Some(category) = category {
                    *counts.entry(category.name.clone()).or_insert(0) += 1;
                }
            }
            Ok(counts.into_iter().collect())
        })
    }

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewTodo>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            for draft in &drafts {
                guard.check_category_reference(owner, draft.category_id)?;
            }

            let now = self.clock.now();
            let mut inserted = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let id = guard.next_todo_id();
                let todo = Todo::from_draft(id, *owner, draft, now);
                guard.todos.insert(id, todo.clone());
                inserted.push(todo);
            }
            drop(guard);
            Ok(inserted)
        })
    }

    fn update<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
        patch: &'a TodoPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Todo>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            if !guard.owns_todo(owner, id) {
                return Ok(None);
            }
            guard.check_category_reference(owner, patch.category_id.flatten())?;

            let now = self.clock.now();
            Ok(guard.todos.get_mut(&id).map(|todo| {
                patch.apply_to(todo, now);
                todo.clone()
            }))
        })
    }

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(TodoId, TodoPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            for (id, patch) in &patches {
                if !guard.owns_todo(owner, *id) {
                    return Err(RepositoryError::NotFound(format!("Todo {id}")));
                }
                guard.check_category_reference(owner, patch.category_id.flatten())?;
            }

            let now = self.clock.now();
            let mut updated = Vec::with_capacity(patches.len());
            for (id, patch) in patches {
                if let Some(todo) = guard.todos.get_mut(&id) {
                    patch.apply_to(todo, now);
                    updated.push(todo.clone());
                }
            }
            drop(guard);
            Ok(updated)
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<bool>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            Ok(guard.remove_todo(owner, id).is_some())
        })
    }

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [TodoId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            let deleted = ids
                .iter()
                .filter_map(|id| guard.remove_todo(owner, *id))
                .collect();
            drop(guard);
            Ok(deleted)
        })
    }

    fn reorder<'a>(
        &'a self,
        owner: &'a OwnerId,
        positions: &'a [PositionUpdate],
    ) -> BoxFuture<'a, RepositoryResult<u64>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            if let Some(missing) = positions
                .iter()
                .find(|update| !guard.owns_todo(owner, update.id))
            {
                return Err(RepositoryError::NotFound(format!("Todo {}", missing.id)));
            }

            let now = self.clock.now();
            for update in positions {
                if let Some(todo) = guard.todos.get_mut(&update.id) {
                    todo.position = update.position;
                    todo.updated_at = now;
                }
            }
            drop(guard);
            Ok(positions.len() as u64)
        })
    }
}

// =============================================================================
// CategoryRepository
// =============================================================================

impl CategoryRepository for InMemoryStore {
    fn list<'a>(&'a self, owner: &'a OwnerId) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let mut categories: Vec<Category> = guard
                .categories
                .values()
                .filter(|category| category.owner == *owner)
                .cloned()
                .collect();
            drop(guard);
            categories.sort_by(|left, right| {
                left.name.cmp(&right.name).then(left.id.cmp(&right.id))
            });
            Ok(categories)
        })
    }

    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Category>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(guard
                .categories
                .get(&id)
                .filter(|category| category.owner == *owner)
                .cloned())
        })
    }

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewCategory>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            let now = self.clock.now();
            let mut inserted = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let id = guard.next_category_id();
                let category = Category::from_draft(id, *owner, draft, now);
                guard.categories.insert(id, category.clone());
                inserted.push(category);
            }
            drop(guard);
            Ok(inserted)
        })
    }

    fn update<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
        patch: &'a CategoryPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Category>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            Ok(guard
                .categories
                .get_mut(&id)
                .filter(|category| category.owner == *owner)
                .map(|category| {
                    patch.apply_to(category);
                    category.clone()
                }))
        })
    }

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(CategoryId, CategoryPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            if let Some((missing, _)) = patches
                .iter()
                .find(|(id, _)| !guard.owns_category(owner, *id))
            {
                return Err(RepositoryError::NotFound(format!("Category {missing}")));
            }

            let mut updated = Vec::with_capacity(patches.len());
            for (id, patch) in patches {
                if let Some(category) = guard.categories.get_mut(&id) {
                    patch.apply_to(category);
                    updated.push(category.clone());
                }
            }
            drop(guard);
            Ok(updated)
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
    ) -> BoxFuture<'a, RepositoryResult<bool>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            Ok(guard.remove_category(owner, id).is_some())
        })
    }

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [CategoryId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            let deleted = ids
                .iter()
                .filter_map(|id| guard.remove_category(owner, *id))
                .collect();
            drop(guard);
            Ok(deleted)
        })
    }
}

// =============================================================================
// AttachmentRepository
// =============================================================================

impl AttachmentRepository for InMemoryStore {
    fn list_for_todo<'a>(
        &'a self,
        owner: &'a OwnerId,
        todo_id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Attachment>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            let mut attachments: Vec<Attachment> = guard
                .attachments
                .values()
                .filter(|attachment| attachment.owner == *owner && attachment.todo_id == todo_id)
                .cloned()
                .collect();
            drop(guard);
            attachments.sort_by(|left, right| {
                right
                    .created_at
                    .cmp(&left.created_at)
                    .then(right.id.cmp(&left.id))
            });
            Ok(attachments)
        })
    }

    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: AttachmentId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Attachment>>> {
        Box::pin(async move {
            let guard = self.tables.read().await;
            Ok(guard
                .attachments
                .get(&id)
                .filter(|attachment| attachment.owner == *owner)
                .cloned())
        })
    }

    fn insert<'a>(
        &'a self,
        owner: &'a OwnerId,
        draft: NewAttachment,
    ) -> BoxFuture<'a, RepositoryResult<Attachment>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            if !guard.owns_todo(owner, draft.todo_id) {
                return Err(RepositoryError::NotFound(format!("Todo {}", draft.todo_id)));
            }
            let id = guard.next_attachment_id();
            let attachment = Attachment::from_draft(id, *owner, draft, self.clock.now());
            guard.attachments.insert(id, attachment.clone());
            drop(guard);
            Ok(attachment)
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: AttachmentId,
    ) -> BoxFuture<'a, RepositoryResult<bool>> {
        Box::pin(async move {
            let mut guard = self.tables.write().await;
            let owned = guard
                .attachments
                .get(&id)
                .is_some_and(|attachment| attachment.owner == *owner);
            if owned {
                guard.attachments.remove(&id);
            }
            Ok(owned)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
