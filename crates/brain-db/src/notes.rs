//! PostgreSQL note repository (relational store of record).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use brain_core::{Error, LinkInterval, Note, NoteRepository, Result, TxContext};

use crate::controllers::SqlController;
use crate::escape_like;

const NOTE_COLUMNS: &str = "id, user_id, title, text, represents_keyword_id, is_pinned, \
     is_archived, created_at, updated_at, link_intervals";

/// Note rows, read and written through the operation's relational transaction.
#[derive(Clone)]
pub struct PgNoteRepository {
    sql: Arc<SqlController>,
}

impl PgNoteRepository {
    pub fn new(sql: Arc<SqlController>) -> Self {
        Self { sql }
    }

    fn row_to_note(row: PgRow) -> Result<Note> {
        let intervals: Json<Vec<LinkInterval>> =
            row.try_get("link_intervals").map_err(Error::Database)?;
        Ok(Note {
            id: row.get("id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            text: row.get("text"),
            represents_keyword_id: row.get("represents_keyword_id"),
            is_pinned: row.get("is_pinned"),
            is_archived: row.get("is_archived"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            link_intervals: intervals.0,
        })
    }

    async fn fetch_one_by_id(
        &self,
        ctx: &mut TxContext,
        id: Uuid,
        lock: bool,
    ) -> Result<Option<Note>> {
        let query = format!(
            "SELECT {} FROM note WHERE id = $1{}",
            NOTE_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );
        let tx = self.sql.transaction(ctx).await?;
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        row.map(Self::row_to_note).transpose()
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn get_by_id(&self, ctx: &mut TxContext, id: Uuid) -> Result<Option<Note>> {
        self.fetch_one_by_id(ctx, id, false).await
    }

    async fn get_for_update(&self, ctx: &mut TxContext, id: Uuid) -> Result<Option<Note>> {
        self.fetch_one_by_id(ctx, id, true).await
    }

    async fn create(&self, ctx: &mut TxContext, note: &Note) -> Result<()> {
        let tx = self.sql.transaction(ctx).await?;
        sqlx::query(
            r#"
            INSERT INTO note (id, user_id, title, text, represents_keyword_id, is_pinned,
                              is_archived, created_at, updated_at, link_intervals)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(note.id)
        .bind(note.user_id)
        .bind(&note.title)
        .bind(&note.text)
        .bind(note.represents_keyword_id)
        .bind(note.is_pinned)
        .bind(note.is_archived)
        .bind(note.created_at)
        .bind(note.updated_at)
        .bind(Json(&note.link_intervals))
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update(&self, ctx: &mut TxContext, note: &Note) -> Result<()> {
        let tx = self.sql.transaction(ctx).await?;
        let result = sqlx::query(
            r#"
            UPDATE note
            SET title = $2,
                text = $3,
                represents_keyword_id = $4,
                is_pinned = $5,
                is_archived = $6,
                updated_at = $7,
                link_intervals = $8
            WHERE id = $1
            "#,
        )
        .bind(note.id)
        .bind(&note.title)
        .bind(&note.text)
        .bind(note.represents_keyword_id)
        .bind(note.is_pinned)
        .bind(note.is_archived)
        .bind(note.updated_at)
        .bind(Json(&note.link_intervals))
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(note.id));
        }
        Ok(())
    }

    async fn delete(&self, ctx: &mut TxContext, id: Uuid) -> Result<()> {
        let tx = self.sql.transaction(ctx).await?;
        let result = sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(id));
        }
        Ok(())
    }

    async fn get_by_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
        exact_match: bool,
    ) -> Result<Option<Note>> {
        let tx = self.sql.transaction(ctx).await?;
        let row = if exact_match {
            sqlx::query(&format!(
                "SELECT {} FROM note WHERE user_id = $1 AND title = $2",
                NOTE_COLUMNS
            ))
            .bind(user_id)
            .bind(title)
            .fetch_optional(&mut **tx)
            .await
        } else {
            sqlx::query(&format!(
                "SELECT {} FROM note
                 WHERE user_id = $1 AND title ILIKE '%' || $2 || '%' ESCAPE '\\'
                 ORDER BY updated_at DESC
                 LIMIT 1",
                NOTE_COLUMNS
            ))
            .bind(user_id)
            .bind(escape_like(title))
            .fetch_optional(&mut **tx)
            .await
        }
        .map_err(Error::Database)?;

        row.map(Self::row_to_note).transpose()
    }
}
