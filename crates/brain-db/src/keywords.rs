//! PostgreSQL keyword repository and note-keyword links.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use brain_core::{new_v7, Error, Keyword, KeywordRepository, Result, TxContext};

use crate::controllers::SqlController;

#[derive(Clone)]
pub struct PgKeywordRepository {
    sql: Arc<SqlController>,
}

impl PgKeywordRepository {
    pub fn new(sql: Arc<SqlController>) -> Self {
        Self { sql }
    }
}

#[async_trait]
impl KeywordRepository for PgKeywordRepository {
    async fn ensure_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<Keyword>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.sql.transaction(ctx).await?;

        for name in names {
            sqlx::query(
                r#"
                INSERT INTO keyword (id, user_id, name)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, name) DO NOTHING
                "#,
            )
            .bind(new_v7())
            .bind(user_id)
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }

        let rows = sqlx::query(
            "SELECT id, user_id, name FROM keyword WHERE user_id = $1 AND name = ANY($2)",
        )
        .bind(user_id)
        .bind(names)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        // Keep the caller's order.
        let mut keywords: Vec<Keyword> = rows
            .into_iter()
            .map(|row| Keyword {
                id: row.get("id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
            })
            .collect();
        keywords.sort_by_key(|k| names.iter().position(|n| n == &k.name));
        Ok(keywords)
    }

    async fn get_by_user_and_name(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<Keyword>> {
        let tx = self.sql.transaction(ctx).await?;
        let row = sqlx::query(
            "SELECT id, user_id, name FROM keyword WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| Keyword {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
        }))
    }

    async fn get_note_keyword_names(
        &self,
        ctx: &mut TxContext,
        note_id: Uuid,
    ) -> Result<Vec<String>> {
        let tx = self.sql.transaction(ctx).await?;
        let rows = sqlx::query(
            r#"
            SELECT k.name
            FROM note_keyword nk
            JOIN keyword k ON k.id = nk.keyword_id
            WHERE nk.note_id = $1
            ORDER BY k.name
            "#,
        )
        .bind(note_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    async fn replace_note_keywords(
        &self,
        ctx: &mut TxContext,
        note_id: Uuid,
        keyword_ids: &[Uuid],
    ) -> Result<()> {
        let tx = self.sql.transaction(ctx).await?;
        sqlx::query(
            "DELETE FROM note_keyword WHERE note_id = $1 AND NOT (keyword_id = ANY($2))",
        )
        .bind(note_id)
        .bind(keyword_ids)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO note_keyword (note_id, keyword_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(note_id)
        .bind(keyword_ids)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete_note_keywords(&self, ctx: &mut TxContext, note_id: Uuid) -> Result<()> {
        let tx = self.sql.transaction(ctx).await?;
        sqlx::query("DELETE FROM note_keyword WHERE note_id = $1")
            .bind(note_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete_unused_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.sql.transaction(ctx).await?;

        // Referrers are checked by the DELETE itself.
        let rows = sqlx::query(
            r#"
            DELETE FROM keyword k
            WHERE k.user_id = $1
              AND k.name = ANY($2)
              AND NOT EXISTS (SELECT 1 FROM note_keyword nk WHERE nk.keyword_id = k.id)
              AND NOT EXISTS (SELECT 1 FROM note n WHERE n.represents_keyword_id = k.id)
            RETURNING k.name
            "#,
        )
        .bind(user_id)
        .bind(names)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let deleted: Vec<String> = rows.into_iter().map(|row| row.get("name")).collect();
        debug!(
            subsystem = "db",
            component = "keywords",
            op = "delete_unused",
            requested = names.len(),
            deleted = deleted.len(),
            "Deleted unreferenced keywords"
        );
        Ok(deleted)
    }
}
