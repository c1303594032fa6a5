use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    NewPost, NewReport, PeriodType, Post, Report, ReportStatus, SummaryStatus,
};

use super::schema::SCHEMA;
use super::{PostStore, ReportStore};

const POST_COLUMNS: &str =
    "id, user_id, title, content, summary, summary_status, created_at";

const REPORT_COLUMNS: &str =
    "id, user_id, content, post_count, period_type, status, error, created_at";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }

    pub async fn ping(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for Repository {
    async fn create_post(&self, user_id: i64, post: NewPost, created_at: DateTime<Utc>) -> Result<Post> {
        let post = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let now = format_datetime(created_at);
                tx.execute(
                    r#"INSERT INTO posts (user_id, title, content, summary_status, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?5)"#,
                    params![
                        user_id,
                        post.title,
                        post.content,
                        SummaryStatus::Pending.as_str(),
                        now
                    ],
                )?;
                let post_id = tx.last_insert_rowid();

                for tag in &post.tags {
                    tx.execute(
                        "INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                        params![tag],
                    )?;
                    let tag_id: i64 = tx.query_row(
                        "SELECT id FROM tags WHERE name = ?1",
                        params![tag],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
                        params![post_id, tag_id],
                    )?;
                }

                let post = load_post(&tx, post_id)?;
                tx.commit()?;
                Ok(post)
            })
            .await?;

        post.ok_or_else(|| anyhow::anyhow!("inserted post disappeared").into())
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>> {
        let post = self.conn.call(move |conn| Ok(load_post(conn, id)?)).await?;
        Ok(post)
    }

    async fn find_posts_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM posts
                       WHERE user_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                       ORDER BY created_at DESC, id DESC"#,
                    POST_COLUMNS
                ))?;
                let mut posts = stmt
                    .query_map(
                        params![user_id, format_datetime(start), format_datetime(end)],
                        post_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                for post in posts.iter_mut() {
                    post.tags = load_tags(conn, post.id)?;
                }
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    async fn save_summary(&self, id: i64, summary: &str) -> Result<()> {
        let summary = summary.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE posts SET summary = ?1, summary_status = ?2, updated_at = ?3 WHERE id = ?4",
                    params![
                        summary,
                        SummaryStatus::Completed.as_str(),
                        format_datetime(Utc::now()),
                        id
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn set_summary_status(&self, id: i64, status: SummaryStatus) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE posts SET summary_status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), format_datetime(Utc::now()), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for Repository {
    async fn create_report(&self, report: NewReport) -> Result<Report> {
        let created_at = Utc::now();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO reports (user_id, content, post_count, period_type, status, created_at)
                       VALUES (?1, '', ?2, ?3, ?4, ?5)"#,
                    params![
                        report.user_id,
                        report.post_count,
                        report.period_type.as_str(),
                        report.status.as_str(),
                        format_datetime(created_at)
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(Report {
            id,
            user_id: report.user_id,
            content: String::new(),
            post_count: report.post_count,
            period_type: report.period_type,
            status: report.status,
            error: None,
            created_at,
        })
    }

    async fn find_report(&self, id: i64) -> Result<Option<Report>> {
        let report = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS))?;
                let report = stmt.query_row(params![id], report_from_row).optional()?;
                Ok(report)
            })
            .await?;
        Ok(report)
    }

    async fn list_reports(&self, user_id: i64) -> Result<Vec<Report>> {
        let reports = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM reports WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                    REPORT_COLUMNS
                ))?;
                let reports = stmt
                    .query_map(params![user_id], report_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(reports)
            })
            .await?;
        Ok(reports)
    }

    async fn complete_report(&self, id: i64, content: &str) -> Result<()> {
        let content = content.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE reports SET content = ?1, status = ?2, error = NULL WHERE id = ?3",
                    params![content, ReportStatus::Completed.as_str(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn fail_report(&self, id: i64, content: &str, error: &str) -> Result<()> {
        let content = content.to_string();
        let error = error.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE reports SET content = ?1, status = ?2, error = ?3 WHERE id = ?4",
                    params![content, ReportStatus::Failed.as_str(), error, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn delete_report(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM reports WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Millisecond RFC 3339 in UTC, so stored timestamps sort as text.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn load_post(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Post>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS))?;
    let post = stmt.query_row(params![id], post_from_row).optional()?;
    match post {
        Some(mut post) => {
            post.tags = load_tags(conn, post.id)?;
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

fn load_tags(conn: &SqliteConnection, post_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT t.name FROM post_tags pt
           JOIN tags t ON pt.tag_id = t.id
           WHERE pt.post_id = ?1
           ORDER BY pt.id"#,
    )?;
    let tags = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        summary: row.get(4)?,
        summary_status: SummaryStatus::parse(&row.get::<_, String>(5)?).unwrap_or_default(),
        tags: Vec::new(),
        created_at: parse_datetime(&row.get::<_, String>(6)?).unwrap_or_else(Utc::now),
    })
}

fn report_from_row(row: &Row) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        post_count: row.get(3)?,
        period_type: PeriodType::parse(&row.get::<_, String>(4)?).unwrap_or(PeriodType::Monthly),
        status: ReportStatus::parse(&row.get::<_, String>(5)?).unwrap_or(ReportStatus::Failed),
        error: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?).unwrap_or_else(Utc::now),
    })
}
