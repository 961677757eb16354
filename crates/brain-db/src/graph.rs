//! Graph projection stored in PostgreSQL.
//!
//! Note and keyword nodes live in `graph_note` and `graph_keyword`; edges in
//! `graph_edge` carry their kind (`links_to` or `represents`). All access goes
//! through the lazily started graph transaction.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, warn};
use uuid::Uuid;

use brain_core::{
    EdgeKind, Error, GraphEdge, Keyword, Note, NoteGraphRepository, Result, TxContext,
};

use crate::controllers::{GraphController, PgTransaction};

#[derive(Clone)]
pub struct PgGraphRepository {
    graph: Arc<GraphController>,
}

impl PgGraphRepository {
    pub fn new(graph: Arc<GraphController>) -> Self {
        Self { graph }
    }

    /// Keyword node id for `keyword`, creating the node if needed.
    ///
    /// An existing node with the same user and name wins over the given id.
    async fn upsert_keyword(tx: &mut PgTransaction, keyword: &Keyword) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO graph_keyword (id, user_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, name) DO NOTHING
            "#,
        )
        .bind(keyword.id)
        .bind(keyword.user_id)
        .bind(&keyword.name)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query("SELECT id FROM graph_keyword WHERE user_id = $1 AND name = $2")
            .bind(keyword.user_id)
            .bind(&keyword.name)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("id"))
    }

    async fn fetch_edges(tx: &mut PgTransaction, note_id: Uuid) -> Result<Vec<GraphEdge>> {
        let rows = sqlx::query(
            r#"
            SELECT e.note_id, e.keyword_id, k.name AS keyword_name, e.kind
            FROM graph_edge e
            JOIN graph_keyword k ON k.id = e.keyword_id
            WHERE e.note_id = $1
            ORDER BY e.position
            "#,
        )
        .bind(note_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("kind");
            let Some(kind) = EdgeKind::parse(&kind) else {
                warn!(
                    subsystem = "db",
                    component = "graph",
                    note_id = %note_id,
                    kind = %kind,
                    "Skipping edge of unknown kind"
                );
                continue;
            };
            edges.push(GraphEdge {
                note_id: row.get("note_id"),
                keyword_id: row.get("keyword_id"),
                keyword_name: row.get("keyword_name"),
                kind,
            });
        }
        Ok(edges)
    }
}

#[async_trait]
impl NoteGraphRepository for PgGraphRepository {
    async fn upsert_note(&self, ctx: &mut TxContext, note: &Note) -> Result<()> {
        let tx = self.graph.transaction(ctx).await?;
        sqlx::query(
            r#"
            INSERT INTO graph_note (id, user_id, title, is_pinned, is_archived)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                is_pinned = EXCLUDED.is_pinned,
                is_archived = EXCLUDED.is_archived
            "#,
        )
        .bind(note.id)
        .bind(note.user_id)
        .bind(&note.title)
        .bind(note.is_pinned)
        .bind(note.is_archived)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete_note(&self, ctx: &mut TxContext, id: Uuid) -> Result<()> {
        let tx = self.graph.transaction(ctx).await?;
        // Edges cascade.
        sqlx::query("DELETE FROM graph_note WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn count_notes_by_user_and_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
    ) -> Result<i64> {
        let tx = self.graph.transaction(ctx).await?;
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM graph_note WHERE user_id = $1 AND title = $2",
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(row.get("count"))
    }

    async fn sync_note_keywords(
        &self,
        ctx: &mut TxContext,
        note: &Note,
        linked: &[Keyword],
        represents: Option<&Keyword>,
    ) -> Result<Vec<GraphEdge>> {
        let tx = self.graph.transaction(ctx).await?;

        sqlx::query("DELETE FROM graph_edge WHERE note_id = $1")
            .bind(note.id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let wanted = linked
            .iter()
            .map(|k| (k, EdgeKind::LinksTo))
            .chain(represents.map(|k| (k, EdgeKind::Represents)));
        for (position, (keyword, kind)) in wanted.enumerate() {
            let keyword_id = Self::upsert_keyword(tx, keyword).await?;
            sqlx::query(
                r#"
                INSERT INTO graph_edge (note_id, keyword_id, kind, position)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (note_id, keyword_id, kind) DO NOTHING
                "#,
            )
            .bind(note.id)
            .bind(keyword_id)
            .bind(kind.as_str())
            .bind(position as i32)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }

        let edges = Self::fetch_edges(tx, note.id).await?;
        debug!(
            subsystem = "db",
            component = "graph",
            op = "sync_note_keywords",
            note_id = %note.id,
            edge_count = edges.len(),
            "Replaced note edges"
        );
        Ok(edges)
    }

    async fn get_note_edges(&self, ctx: &mut TxContext, note_id: Uuid) -> Result<Vec<GraphEdge>> {
        let tx = self.graph.transaction(ctx).await?;
        Self::fetch_edges(tx, note_id).await
    }

    async fn delete_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let tx = self.graph.transaction(ctx).await?;
        sqlx::query("DELETE FROM graph_keyword WHERE user_id = $1 AND name = ANY($2)")
            .bind(user_id)
            .bind(names)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
