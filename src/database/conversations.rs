use super::Database;
use crate::models::ChatConversation;
use crate::models::ChatMessage;
use crate::models::ConversationSummary;
use crate::models::MessageRole;
use crate::LexRagError;
use crate::Result;

/// Derive a conversation title from the first question: collapse whitespace,
/// cut at a word boundary within `max_chars`
pub fn derive_title(question: &str) -> String {
    const MAX_CHARS: usize = 80;

    let collapsed = question.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "Chat".to_string();
    }
    if collapsed.chars().count() <= MAX_CHARS {
        return collapsed;
    }

    // Char-indexed cut; byte slicing would split multi-byte text (Urdu)
    let cut_at = collapsed
        .char_indices()
        .nth(MAX_CHARS)
        .map_or(collapsed.len(), |(idx, _)| idx);
    let head = &collapsed[..cut_at];
    match head.rfind(' ') {
        Some(space) => head[..space].to_string(),
        None => head.to_string(),
    }
}

impl Database {
    /// Create a conversation titled from the opening question
    pub async fn create_conversation(&self, user_id: i64, title: &str) -> Result<ChatConversation> {
        let conversation = sqlx::query_as::<_, ChatConversation>(
            r"
            INSERT INTO chat_conversations (user_id, title)
            VALUES ($1, $2)
            RETURNING *
            ",
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(conversation)
    }

    /// Fetch a conversation enforcing ownership: absent ids are NotFound,
    /// someone else's ids are Forbidden
    pub async fn get_owned_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
    ) -> Result<ChatConversation> {
        let conversation = sqlx::query_as::<_, ChatConversation>(
            "SELECT * FROM chat_conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LexRagError::NotFound(format!("Conversation {conversation_id}")))?;

        if conversation.user_id != user_id {
            return Err(LexRagError::Forbidden(
                "Conversation belongs to another user".to_string(),
            ));
        }
        Ok(conversation)
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<ChatConversation> {
        self.get_owned_conversation(conversation_id, user_id).await?;

        let conversation = sqlx::query_as::<_, ChatConversation>(
            r"
            UPDATE chat_conversations
            SET title = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(conversation_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(conversation)
    }

    pub async fn delete_conversation(&self, conversation_id: i64, user_id: i64) -> Result<()> {
        self.get_owned_conversation(conversation_id, user_id).await?;

        sqlx::query("DELETE FROM chat_conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Newest-first conversation page with the latest message as preview
    pub async fn list_conversations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummary>> {
        let conversations = sqlx::query_as::<_, ConversationSummary>(
            r"
            SELECT c.id,
                   c.title,
                   (
                       SELECT m.content FROM chat_messages m
                       WHERE m.conversation_id = c.id
                       ORDER BY m.created_at DESC, m.id DESC
                       LIMIT 1
                   ) AS last_message,
                   c.created_at,
                   c.updated_at
            FROM chat_conversations c
            WHERE c.user_id = $1
            ORDER BY c.updated_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(conversations)
    }

    pub async fn count_conversations(&self, user_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_conversations WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Last `limit` turns of a conversation in chronological order
    ///
    /// Fetches newest-first then reverses, so the window is the most recent
    /// turns, oldest of the window first.
    pub async fn recent_messages(
        &self,
        conversation_id: i64,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            r"
            SELECT * FROM chat_messages
            WHERE conversation_id = $1 AND user_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            ",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    /// One page of history: pages run newest-first, the page itself is
    /// returned chronological (page 1 = the latest messages)
    pub async fn list_messages(
        &self,
        conversation_id: i64,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatMessage>> {
        self.get_owned_conversation(conversation_id, user_id).await?;

        let mut messages = sqlx::query_as::<_, ChatMessage>(
            r"
            SELECT * FROM chat_messages
            WHERE conversation_id = $1 AND user_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn count_messages(&self, conversation_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Append the user turn and assistant reply as one transaction, touch the
    /// conversation, then trim to the cap by deleting the oldest rows
    ///
    /// The paired insert keeps history parseable as strict user/assistant
    /// alternation; a crash never leaves a user turn without its reply.
    pub async fn append_turn(
        &self,
        conversation_id: i64,
        user_id: i64,
        question: &str,
        answer: &str,
        message_cap: usize,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO chat_messages (conversation_id, user_id, role, content)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(MessageRole::User.as_str())
        .bind(question)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO chat_messages (conversation_id, user_id, role, content)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(MessageRole::Assistant.as_str())
        .bind(answer)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        // Everything beyond the newest `message_cap` rows goes
        sqlx::query(
            r"
            DELETE FROM chat_messages
            WHERE conversation_id = $1
              AND id IN (
                  SELECT id FROM chat_messages
                  WHERE conversation_id = $1
                  ORDER BY created_at DESC, id DESC
                  OFFSET $2
              )
            ",
        )
        .bind(conversation_id)
        .bind(message_cap as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_passes_short_questions_through() {
        assert_eq!(derive_title("What is bail?"), "What is bail?");
    }

    #[test]
    fn title_collapses_whitespace() {
        assert_eq!(
            derive_title("  What   is\n\tbail?  "),
            "What is bail?"
        );
    }

    #[test]
    fn title_cuts_long_questions_at_word_boundary() {
        let question = "word ".repeat(40);
        let title = derive_title(&question);
        assert!(title.chars().count() <= 80);
        assert!(!title.ends_with(' '));
        assert!(title.ends_with("word"));
    }

    #[test]
    fn title_hard_cuts_unbroken_text() {
        let question = "x".repeat(200);
        let title = derive_title(&question);
        assert_eq!(title.chars().count(), 80);
    }

    #[test]
    fn title_for_empty_question_is_placeholder() {
        assert_eq!(derive_title("   "), "Chat");
    }

    #[test]
    fn title_cut_is_char_safe_for_urdu() {
        let question = "قانونی مدد ".repeat(30);
        let title = derive_title(&question);
        assert!(title.chars().count() <= 80);
    }
}
