use crate::models::{FollowRow, PostRow, UserConflict, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Row};

/// Column list shared by every post read, so all paths return the same joined shape.
const POST_COLUMNS: &str =
    "p.id, p.title, p.body, p.author_id, u.username, u.email, p.created_at";

impl Database {
    // -- Users --

    /// Insert a user. A collision on a unique column comes back as `Some(conflict)`
    /// instead of an error.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<UserConflict>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, username, email, password_hash),
            );
            match inserted {
                Ok(_) => Ok(None),
                Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    if msg.contains("users.username") {
                        Ok(Some(UserConflict::Username))
                    } else if msg.contains("users.email") {
                        Ok(Some(UserConflict::Email))
                    } else {
                        Err(rusqlite::Error::SqliteFailure(err, Some(msg)).into())
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    // -- Follows --

    pub fn follow_exists(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                    (follower_id, followed_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Insert an edge. Returns false if the edge was already there.
    pub fn insert_follow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id) VALUES (?1, ?2)",
                (follower_id, followed_id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove an edge. Returns false if there was nothing to remove.
    pub fn delete_follow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                (follower_id, followed_id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Accounts following `user_id`, in the order the edges were created.
    pub fn get_followers(&self, user_id: &str) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| {
            query_follow_party(
                conn,
                "SELECT u.username, u.email
                 FROM follows f
                 JOIN users u ON f.follower_id = u.id
                 WHERE f.followed_id = ?1
                 ORDER BY f.rowid",
                user_id,
            )
        })
    }

    /// Accounts `user_id` follows, in the order the edges were created.
    pub fn get_following(&self, user_id: &str) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| {
            query_follow_party(
                conn,
                "SELECT u.username, u.email
                 FROM follows f
                 JOIN users u ON f.followed_id = u.id
                 WHERE f.follower_id = ?1
                 ORDER BY f.rowid",
                user_id,
            )
        })
    }

    pub fn get_followed_ids(&self, follower_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT followed_id FROM follows WHERE follower_id = ?1 ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map([follower_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    pub fn count_followers(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            count(conn, "SELECT COUNT(*) FROM follows WHERE followed_id = ?1", user_id)
        })
    }

    pub fn count_following(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            count(conn, "SELECT COUNT(*) FROM follows WHERE follower_id = ?1", user_id)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        id: &str,
        title: &str,
        body: &str,
        author_id: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, title, body, author_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, title, body, author_id, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.author_id = u.id
                 WHERE p.id = ?1"
            );
            let row = conn.query_row(&sql, [id], map_post_row).optional()?;
            Ok(row)
        })
    }

    /// Posts by one author, newest first.
    pub fn get_posts_by_author(&self, author_id: &str) -> Result<Vec<PostRow>> {
        self.get_posts_by_authors(&[author_id.to_string()])
    }

    /// Posts by any of `author_ids`, newest first.
    pub fn get_posts_by_authors(&self, author_ids: &[String]) -> Result<Vec<PostRow>> {
        if author_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=author_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.author_id = u.id
                 WHERE p.author_id IN ({})
                 ORDER BY p.created_at DESC, p.rowid DESC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = author_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_post_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Overwrite title and body. `created_at` and the author never change.
    pub fn update_post(&self, id: &str, title: &str, body: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET title = ?2, body = ?3 WHERE id = ?1",
                (id, title, body),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn count_posts_by_author(&self, author_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            count(conn, "SELECT COUNT(*) FROM posts WHERE author_id = ?1", author_id)
        })
    }

    /// Run an FTS5 match expression over titles and bodies, best match first.
    pub fn search_posts(&self, match_expr: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS}
                 FROM posts_fts
                 JOIN posts p ON p.rowid = posts_fts.rowid
                 JOIN users u ON p.author_id = u.id
                 WHERE posts_fts MATCH ?1
                 ORDER BY bm25(posts_fts), p.created_at DESC"
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([match_expr], map_post_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_follow_party(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<FollowRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(FollowRow {
                username: row.get(0)?,
                email: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn count(conn: &Connection, sql: &str, id: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [id], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn map_post_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row.get(4)?,
        author_email: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "alice@example.com", "x").unwrap();
        db.create_user("u2", "bob", "bob@example.com", "x").unwrap();
        db
    }

    #[test]
    fn duplicate_users_report_the_colliding_column() {
        let db = seeded();
        assert_eq!(
            db.create_user("u3", "alice", "other@example.com", "x").unwrap(),
            Some(UserConflict::Username)
        );
        assert_eq!(
            db.create_user("u4", "carol", "bob@example.com", "x").unwrap(),
            Some(UserConflict::Email)
        );
        assert_eq!(db.create_user("u5", "carol", "carol@example.com", "x").unwrap(), None);
    }

    #[test]
    fn follow_edges_are_unique() {
        let db = seeded();
        assert!(db.insert_follow("u2", "u1").unwrap());
        assert!(!db.insert_follow("u2", "u1").unwrap());
        assert_eq!(db.count_followers("u1").unwrap(), 1);
        assert_eq!(db.count_following("u2").unwrap(), 1);
    }

    #[test]
    fn self_edges_are_never_stored() {
        let db = seeded();
        assert!(!matches!(db.insert_follow("u1", "u1"), Ok(true)));
        assert_eq!(db.count_following("u1").unwrap(), 0);
    }

    #[test]
    fn search_index_follows_updates_and_deletes() {
        let db = seeded();
        db.insert_post("p1", "Rust tips", "borrowing explained", "u1", "2024-01-01T00:00:00.000000Z")
            .unwrap();
        assert_eq!(db.search_posts("\"borrowing\"").unwrap().len(), 1);

        db.update_post("p1", "Rust tips", "lifetimes explained").unwrap();
        assert!(db.search_posts("\"borrowing\"").unwrap().is_empty());
        assert_eq!(db.search_posts("\"lifetimes\"").unwrap().len(), 1);

        db.delete_post("p1").unwrap();
        assert!(db.search_posts("\"lifetimes\"").unwrap().is_empty());
    }

    #[test]
    fn author_listing_is_newest_first() {
        let db = seeded();
        db.insert_post("old", "a", "a", "u1", "2024-01-01T00:00:00.000000Z").unwrap();
        db.insert_post("new", "b", "b", "u1", "2024-02-01T00:00:00.000000Z").unwrap();
        let ids: Vec<String> = db
            .get_posts_by_author("u1")
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
