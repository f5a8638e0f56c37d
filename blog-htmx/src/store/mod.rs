//! Author and post storage on SQLx
//!
//! Schema changes live in `migrations/` and are applied by [`BlogStore::migrate`],
//! which `blog-htmx serve` runs at startup and `blog-htmx migrate` runs alone.

pub mod models;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub use models::{Author, NewPost, Post, PostUpdate, PostWithAuthor};

const POST_WITH_AUTHOR_SELECT: &str = r"
    SELECT p.id, p.author_id, p.title, p.body, p.created_at, p.published_at,
           a.name AS author_name, a.email AS author_email
    FROM posts p
    LEFT JOIN authors a ON a.id = p.author_id
";

/// Handle to the blog database
#[derive(Debug, Clone)]
pub struct BlogStore {
    pool: SqlitePool,
}

impl BlogStore {
    /// Wrap an existing pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the database cannot be opened
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending migrations
    ///
    /// # Errors
    ///
    /// Returns error if a migration fails
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Create the author for `email`, or refresh its name
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn upsert_author(&self, name: &str, email: &str) -> Result<Author, sqlx::Error> {
        sqlx::query_as::<_, Author>(
            r"
            INSERT INTO authors (name, email, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (email)
            DO UPDATE SET name = excluded.name
            RETURNING id, name, email, created_at
            ",
        )
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// Find an author by email
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn find_author_by_email(&self, email: &str) -> Result<Option<Author>, sqlx::Error> {
        sqlx::query_as::<_, Author>(
            "SELECT id, name, email, created_at FROM authors WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// All posts, newest first, with their authors
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn list_posts(&self) -> Result<Vec<PostWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, PostWithAuthor>(&format!(
            "{POST_WITH_AUTHOR_SELECT} ORDER BY p.created_at DESC, p.id DESC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    /// One post with its author
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn find_post(&self, id: i64) -> Result<Option<PostWithAuthor>, sqlx::Error> {
        sqlx::query_as::<_, PostWithAuthor>(&format!("{POST_WITH_AUTHOR_SELECT} WHERE p.id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert a post
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Post>(
            r"
            INSERT INTO posts (author_id, title, body, created_at, published_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, author_id, title, body, created_at, published_at
            ",
        )
        .bind(post.author_id)
        .bind(post.title.trim())
        .bind(&post.body)
        .bind(now)
        .bind(post.publish.then_some(now))
        .fetch_one(&self.pool)
        .await
    }

    /// Apply a partial update, `None` if the post does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn update_post(
        &self,
        id: i64,
        update: &PostUpdate,
    ) -> Result<Option<Post>, sqlx::Error> {
        // `publish`: NULL keeps, 1 stamps now unless already published, 0 clears
        sqlx::query_as::<_, Post>(
            r"
            UPDATE posts
            SET title = COALESCE(?1, title),
                body = COALESCE(?2, body),
                published_at = CASE
                    WHEN ?3 IS NULL THEN published_at
                    WHEN ?3 = 1 THEN COALESCE(published_at, ?4)
                    ELSE NULL
                END
            WHERE id = ?5
            RETURNING id, author_id, title, body, created_at, published_at
            ",
        )
        .bind(update.title.as_deref().map(str::trim))
        .bind(update.body.as_deref())
        .bind(update.publish)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a post, `true` if a row was removed
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn delete_post(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
