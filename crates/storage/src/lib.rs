use anyhow::{Context, Result};
use async_trait::async_trait;
use presenter_core::scripture::{BookSummary, LookupError, ScriptureLookup};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::info;

/// Read-only scripture database. Book ids are the 0-based book indices the
/// navigation layer uses; chapters and verses are 1-based.
#[derive(Clone)]
pub struct ScriptureDb {
    pool: Pool<Sqlite>,
}

impl ScriptureDb {
    pub async fn open(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid scripture database url '{database_url}'"))?
            .create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open scripture database '{database_url}'"))?;

        let db = Self { pool };
        db.ensure_schema().await?;
        info!(database_url, "scripture database ready");
        Ok(db)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id     INTEGER PRIMARY KEY,
                name   TEXT,
                abbrev TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure books table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS verses (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                version TEXT,
                book_id INTEGER,
                chapter INTEGER,
                verse   INTEGER,
                text    TEXT,
                FOREIGN KEY(book_id) REFERENCES books(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure verses table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_verses_lookup ON verses (version, book_id, chapter, verse)",
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure verses index")?;

        Ok(())
    }

    pub async fn seed_book(&self, book_index: u32, name: &str, abbrev: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO books (id, name, abbrev) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, abbrev=excluded.abbrev",
        )
        .bind(i64::from(book_index))
        .bind(name)
        .bind(abbrev)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_verse(
        &self,
        version: &str,
        book_index: u32,
        chapter: u32,
        verse: u32,
        text: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO verses (version, book_id, chapter, verse, text) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(version)
        .bind(i64::from(book_index))
        .bind(i64::from(chapter))
        .bind(i64::from(verse))
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Books in id order. The chapter count is the highest chapter stored for
    /// the book in any version, or `None` when it has no verses yet.
    pub async fn list_books(&self) -> Result<Vec<BookSummary>> {
        let rows = sqlx::query(
            "SELECT b.name, b.abbrev, MAX(v.chapter)
             FROM books b
             LEFT JOIN verses v ON v.book_id = b.id
             GROUP BY b.id
             ORDER BY b.id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list books")?;

        Ok(rows
            .into_iter()
            .map(|r| BookSummary {
                name: r.get::<Option<String>, _>(0).unwrap_or_default(),
                abbreviation: r.get::<Option<String>, _>(1).unwrap_or_default(),
                chapter_count: r
                    .get::<Option<i64>, _>(2)
                    .and_then(|count| u32::try_from(count).ok()),
            })
            .collect())
    }

    pub async fn chapter_verses(
        &self,
        version: &str,
        book_index: u32,
        chapter: u32,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT text FROM verses
             WHERE version = ? AND book_id = ? AND chapter = ?
             ORDER BY verse",
        )
        .bind(version)
        .bind(i64::from(book_index))
        .bind(i64::from(chapter))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load {version} book {book_index} chapter {chapter}"))?;

        Ok(rows
            .into_iter()
            .map(|r| r.get::<Option<String>, _>(0).unwrap_or_default())
            .collect())
    }
}

#[async_trait]
impl ScriptureLookup for ScriptureDb {
    async fn books(&self) -> Result<Vec<BookSummary>, LookupError> {
        self.list_books()
            .await
            .map_err(|err| LookupError::Unavailable(format!("{err:#}")))
    }

    async fn chapter(
        &self,
        version: &str,
        book_index: u32,
        chapter: u32,
    ) -> Result<Vec<String>, LookupError> {
        self.chapter_verses(version, book_index, chapter)
            .await
            .map_err(|err| LookupError::Unavailable(format!("{err:#}")))
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
