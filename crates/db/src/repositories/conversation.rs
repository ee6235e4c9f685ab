use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use entops_core::domain::conversation::{
    Conversation, ConversationId, ConversationMessage, MessageRole,
};
use entops_core::domain::deal::{DealId, OrgId};
use entops_core::errors::StoreError;
use entops_core::store::ConversationStore;

use super::{decode_enum, encode_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqlConversationRepository {
    async fn resolve(
        &self,
        id: Option<&ConversationId>,
        org_id: &OrgId,
        user_id: &str,
        deal_id: Option<&DealId>,
    ) -> Result<Conversation, StoreError> {
        if let Some(id) = id {
            let row = sqlx::query(
                "SELECT id, org_id, user_id, deal_id, created_at
                 FROM conversations
                 WHERE id = ? AND org_id = ?",
            )
            .bind(&id.0)
            .bind(&org_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

            return match row {
                Some(row) => Ok(conversation_from_row(row)?),
                None => Err(StoreError::NotFound(format!("conversation {}", id.0))),
            };
        }

        let conversation = Conversation {
            id: ConversationId::generate(),
            org_id: org_id.clone(),
            user_id: user_id.to_string(),
            deal_id: deal_id.cloned(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        sqlx::query(
            "INSERT INTO conversations (id, org_id, user_id, deal_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.org_id.0)
        .bind(&conversation.user_id)
        .bind(conversation.deal_id.as_ref().map(|deal_id| deal_id.0.as_str()))
        .bind(encode_timestamp(conversation.created_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(conversation)
    }

    async fn append_message(&self, message: ConversationMessage) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, agent_name, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.agent_name.as_deref())
        .bind(encode_timestamp(message.created_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT conversation_id, role, content, agent_name, created_at
             FROM messages
             WHERE conversation_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(&id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let mut messages = rows.into_iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        user_id: row.try_get("user_id")?,
        deal_id: row.try_get::<Option<String>, _>("deal_id")?.map(DealId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn message_from_row(row: SqliteRow) -> Result<ConversationMessage, RepositoryError> {
    Ok(ConversationMessage {
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        role: decode_enum("role", row.try_get("role")?, MessageRole::parse)?,
        content: row.try_get("content")?,
        agent_name: row.try_get("agent_name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use entops_core::domain::conversation::{ConversationId, ConversationMessage, MessageRole};
    use entops_core::domain::deal::OrgId;
    use entops_core::errors::StoreError;
    use entops_core::store::ConversationStore;

    use super::SqlConversationRepository;
    use crate::repositories::test_support::{parse_ts, setup_pool};

    #[tokio::test]
    async fn resolve_creates_then_reuses_within_org() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        let org = OrgId("org-1".to_string());

        let created = repo.resolve(None, &org, "user-1", None).await.expect("create");
        let reused = repo.resolve(Some(&created.id), &org, "user-1", None).await.expect("reuse");
        assert_eq!(created, reused);

        let error = repo
            .resolve(Some(&created.id), &OrgId("org-2".to_string()), "user-1", None)
            .await
            .expect_err("other org");
        assert!(matches!(error, StoreError::NotFound(_)));

        let error = repo
            .resolve(Some(&ConversationId("unknown".to_string())), &org, "user-1", None)
            .await
            .expect_err("unknown id");
        assert!(matches!(error, StoreError::NotFound(_)));
        pool.close().await;
    }

    #[tokio::test]
    async fn recent_messages_keeps_latest_in_chronological_order() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        let conversation =
            repo.resolve(None, &OrgId("org-1".to_string()), "user-1", None).await.expect("create");

        for (index, role) in
            [MessageRole::User, MessageRole::Assistant, MessageRole::User].into_iter().enumerate()
        {
            repo.append_message(ConversationMessage {
                conversation_id: conversation.id.clone(),
                role,
                content: format!("message {index}"),
                agent_name: (role == MessageRole::Assistant).then(|| "Coordinator".to_string()),
                created_at: parse_ts("2026-03-02T09:00:00Z"),
            })
            .await
            .expect("append");
        }

        let recent = repo.recent_messages(&conversation.id, 2).await.expect("recent");
        let contents: Vec<&str> = recent.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["message 1", "message 2"]);
        assert_eq!(recent[0].agent_name.as_deref(), Some("Coordinator"));
        pool.close().await;
    }
}
