use std::sync::Arc;

use parkway_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::executor::{Row, StatementExecutor, Value};

pub const DEFAULT_LIST_LIMIT: i64 = 10;
pub const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub mail: String,
}

impl User {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64(0)?,
            name: row.get_str(1)?.to_string(),
            mail: row.get_str(2)?.to_string(),
        })
    }
}

/// User persistence on top of any `StatementExecutor`. Requires the `users`
/// table created by the embedded migrations.
pub struct UserStore {
    executor: Arc<dyn StatementExecutor>,
}

impl UserStore {
    pub fn new(executor: Arc<dyn StatementExecutor>) -> Self {
        Self { executor }
    }

    pub fn create(&self, name: &str, mail: &str) -> Result<User> {
        let rows = self.executor.query(
            "INSERT INTO users (name, mail) VALUES (?1, ?2) RETURNING id, name, mail",
            &[name.into(), mail.into()],
        )?;
        let user = rows
            .first()
            .ok_or_else(|| Error::Database("insert returned no row".into()))
            .and_then(User::from_row)?;

        info!("created user {}", user.id);
        Ok(user)
    }

    pub fn get(&self, id: i64) -> Result<Option<User>> {
        let rows = self.executor.query(
            "SELECT id, name, mail FROM users WHERE id = ?1",
            &[id.into()],
        )?;
        rows.first().map(User::from_row).transpose()
    }

    /// Returns `Error::NotFound` when no row has `id`.
    pub fn update(&self, id: i64, name: &str, mail: &str) -> Result<User> {
        let affected = self.executor.execute(
            "UPDATE users SET name = ?1, mail = ?2 WHERE id = ?3",
            &[name.into(), mail.into(), id.into()],
        )?;
        if affected == 0 {
            warn!("no user with id {id} to update");
            return Err(Error::NotFound(format!("user {id}")));
        }

        info!("updated user {id}");
        Ok(User {
            id,
            name: name.to_string(),
            mail: mail.to_string(),
        })
    }

    /// Returns `Error::NotFound` when no row has `id`.
    pub fn delete(&self, id: i64) -> Result<()> {
        let affected = self
            .executor
            .execute("DELETE FROM users WHERE id = ?1", &[id.into()])?;
        if affected == 0 {
            warn!("no user with id {id} to delete");
            return Err(Error::NotFound(format!("user {id}")));
        }

        info!("deleted user {id}");
        Ok(())
    }

    /// Page through users by id. `limit` is clamped to `1..=100` (non-positive
    /// means the default of 10); a negative `offset` is treated as zero.
    pub fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let limit = match limit {
            l if l <= 0 => DEFAULT_LIST_LIMIT,
            l => l.min(MAX_LIST_LIMIT),
        };
        let offset = offset.max(0);

        let rows = self.executor.query(
            "SELECT id, name, mail FROM users ORDER BY id LIMIT ?1 OFFSET ?2",
            &[limit.into(), offset.into()],
        )?;
        rows.iter().map(User::from_row).collect()
    }

    /// Case-insensitive substring match on name, at most 100 results.
    pub fn search_by_name(&self, pattern: &str) -> Result<Vec<User>> {
        let rows = self.executor.query(
            "SELECT id, name, mail FROM users WHERE name LIKE ?1 COLLATE NOCASE ORDER BY id LIMIT ?2",
            &[Value::Text(format!("%{pattern}%")), MAX_LIST_LIMIT.into()],
        )?;
        rows.iter().map(User::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SqliteExecutor;
    use crate::migrations::{EmbeddedSource, MigrationRunner};

    fn store() -> UserStore {
        let exec: Arc<dyn StatementExecutor> = Arc::new(SqliteExecutor::in_memory().unwrap());
        MigrationRunner::new(Arc::clone(&exec))
            .run(&EmbeddedSource)
            .unwrap();
        UserStore::new(exec)
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = store();
        let created = store.create("Ada", "ada@example.com").unwrap();
        assert!(created.id > 0);

        let fetched = store.get(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get(created.id + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_mail_is_rejected() {
        let store = store();
        store.create("Ada", "ada@example.com").unwrap();
        let err = store.create("Other Ada", "ada@example.com").unwrap_err();
        assert!(err.is_duplicate_key(), "unexpected error: {err}");
    }

    #[test]
    fn update_and_delete_missing_user_is_not_found() {
        let store = store();
        assert!(matches!(
            store.update(42, "x", "x@example.com"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(store.delete(42), Err(Error::NotFound(_))));
    }

    #[test]
    fn update_then_delete() {
        let store = store();
        let user = store.create("Ada", "ada@example.com").unwrap();

        let updated = store
            .update(user.id, "Ada Lovelace", "ada@example.org")
            .unwrap();
        assert_eq!(store.get(user.id).unwrap().unwrap(), updated);

        store.delete(user.id).unwrap();
        assert!(store.get(user.id).unwrap().is_none());
        assert!(store.list(10, 0).unwrap().is_empty());
    }

    #[test]
    fn list_clamps_limit_and_offset() {
        let store = store();
        for i in 0..15 {
            store
                .create(&format!("user{i}"), &format!("user{i}@example.com"))
                .unwrap();
        }

        assert_eq!(store.list(0, 0).unwrap().len(), 10);
        assert_eq!(store.list(1000, 0).unwrap().len(), 15);
        let page = store.list(5, -3).unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].name, "user0");
        assert_eq!(store.list(10, 10).unwrap().len(), 5);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let store = store();
        store.create("Grace Hopper", "grace@example.com").unwrap();
        store.create("Ada Lovelace", "ada@example.com").unwrap();

        let found = store.search_by_name("HOPP").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Grace Hopper");
        assert!(store.search_by_name("turing").unwrap().is_empty());
    }
}
