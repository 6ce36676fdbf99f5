//! Per-question decision routing
//!
//! One `ask` call walks a fixed pipeline: validate, resolve the
//! conversation, classify, and either serve a canned reply or retrieve,
//! gate on the calibrated distance threshold, and compose a grounded
//! answer. Every terminal outcome leaves exactly one evaluation record
//! on the task queue, including failures.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::database::derive_title;
use crate::database::Database;
use crate::embeddings::EmbeddingGateway;
use crate::errors::LexRagError;
use crate::errors::Result;
use crate::models::Classification;
use crate::models::EvaluationRecord;
use crate::models::QueryCategory;
use crate::models::RouteDecision;
use crate::providers::ChatApi;
use crate::tasks::TaskQueue;

use super::classifier::QueryClassifier;
use super::composer;
use super::composer::AnswerComposer;
use super::composer::HistoryTurn;
use super::retriever::Retriever;
use super::threshold::ThresholdCalibrator;

const MAX_QUESTION_CHARS: usize = 2000;

/// One incoming question with its routing context
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub user_id: i64,
    /// "en" or "ur"; anything else reads as English
    pub language: String,
    pub conversation_id: Option<i64>,
    /// Suppresses all persistence for this call
    pub safe_mode: bool,
}

/// What the caller gets back
#[derive(Debug, Clone)]
pub struct AskResponse {
    pub answer: String,
    /// Always `None` in safe mode
    pub conversation_id: Option<i64>,
    pub contexts_used: i32,
    pub decision: RouteDecision,
}

/// Distance gate, retrieval stats and composition cost for one reply
struct RoutedReply {
    decision: RouteDecision,
    answer: String,
    contexts_used: i32,
    best_distance: Option<f64>,
    threshold: Option<f64>,
    embedding_time_ms: Option<u64>,
    llm_time_ms: Option<u64>,
    total_tokens: Option<i32>,
}

impl RoutedReply {
    fn canned(decision: RouteDecision, answer: String) -> Self {
        Self {
            decision,
            answer,
            contexts_used: 0,
            best_distance: None,
            threshold: None,
            embedding_time_ms: None,
            llm_time_ms: None,
            total_tokens: None,
        }
    }
}

/// The ask orchestrator
pub struct AskService {
    database: Arc<Database>,
    classifier: QueryClassifier,
    retriever: Retriever,
    composer: AnswerComposer,
    calibrator: ThresholdCalibrator,
    queue: TaskQueue,
    embedding_model: String,
    chat_model: String,
    memory_limit: usize,
    message_cap: usize,
}

impl AskService {
    pub fn new(
        database: Arc<Database>,
        gateway: Arc<EmbeddingGateway>,
        chat: Arc<dyn ChatApi>,
        queue: TaskQueue,
        config: &AppConfig,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(chat.clone(), &config.chat),
            retriever: Retriever::new(database.clone(), gateway, &config.rag),
            composer: AnswerComposer::new(chat, &config.chat),
            calibrator: ThresholdCalibrator::new(config.rag.clone()),
            database,
            queue,
            embedding_model: config.embedding_model().to_string(),
            chat_model: config.chat_model().to_string(),
            memory_limit: config.memory_limit(),
            message_cap: config.message_cap(),
        }
    }

    /// Drop the cached threshold; the next ask recalibrates
    pub fn reset_threshold(&mut self) {
        self.calibrator.reset();
    }

    /// Answer one question
    ///
    /// Validation and ownership rejections return early without an
    /// evaluation record; once the pipeline proper starts, every outcome,
    /// including an error, emits one.
    pub async fn ask(&self, request: &AskRequest) -> Result<AskResponse> {
        let started = Instant::now();

        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Err(LexRagError::InvalidInput("Question required".to_string()));
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(LexRagError::InvalidInput("Question too long".to_string()));
        }
        let language = if request.language == "ur" { "ur" } else { "en" };

        // Outside safe mode the conversation exists before anything is
        // routed, so even a canned reply lands in a thread
        let conversation_id = if request.safe_mode {
            None
        } else {
            match request.conversation_id {
                Some(id) => {
                    self.database
                        .get_owned_conversation(id, request.user_id)
                        .await?;
                    Some(id)
                }
                None => {
                    let conversation = self
                        .database
                        .create_conversation(request.user_id, &derive_title(&question))
                        .await?;
                    Some(conversation.id)
                }
            }
        };

        let classification = match self.classifier.classify(&question, language).await {
            Ok(classification) => classification,
            Err(e) => {
                self.emit_record(request, &question, language, None, Err(&e), started);
                return Err(e);
            }
        };

        let routed = if let Some(reply) = canned_reply(classification.category, language) {
            reply
        } else {
            match self
                .answer_in_domain(&question, language, conversation_id, request)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    self.emit_record(
                        request,
                        &question,
                        language,
                        Some(&classification),
                        Err(&e),
                        started,
                    );
                    return Err(e);
                }
            }
        };

        if let Some(conversation_id) = conversation_id {
            if let Err(e) = self
                .database
                .append_turn(
                    conversation_id,
                    request.user_id,
                    &question,
                    &routed.answer,
                    self.message_cap,
                )
                .await
            {
                self.emit_record(
                    request,
                    &question,
                    language,
                    Some(&classification),
                    Err(&e),
                    started,
                );
                return Err(e);
            }
        }

        info!(
            "Ask routed decision={} lang={} safe_mode={} contexts={} best_dist={:?} ms={}",
            routed.decision.as_str(),
            language,
            request.safe_mode,
            routed.contexts_used,
            routed.best_distance,
            started.elapsed().as_millis()
        );
        self.emit_record(
            request,
            &question,
            language,
            Some(&classification),
            Ok(&routed),
            started,
        );

        Ok(AskResponse {
            answer: routed.answer,
            conversation_id,
            contexts_used: routed.contexts_used,
            decision: routed.decision,
        })
    }

    /// Retrieval, threshold gate and composition for legal questions
    async fn answer_in_domain(
        &self,
        question: &str,
        language: &str,
        conversation_id: Option<i64>,
        request: &AskRequest,
    ) -> Result<RoutedReply> {
        let history = match conversation_id {
            Some(id) => self
                .database
                .recent_messages(id, request.user_id, self.memory_limit)
                .await?
                .into_iter()
                .map(|message| HistoryTurn {
                    role: message.role,
                    content: message.content,
                })
                .collect(),
            None => Vec::new(),
        };

        let retrieval = self.retriever.retrieve(question, language).await?;
        let threshold = self.calibrator.threshold(&self.database).await;

        let Some(best_distance) = retrieval.best_distance() else {
            return Ok(RoutedReply {
                decision: RouteDecision::NoHits,
                answer: composer::no_hits_message(language).to_string(),
                contexts_used: 0,
                best_distance: None,
                threshold: Some(threshold),
                embedding_time_ms: Some(retrieval.embedding_time_ms),
                llm_time_ms: None,
                total_tokens: None,
            });
        };

        // Inclusive compare: a distance exactly at the threshold is in-domain
        if best_distance > threshold {
            return Ok(RoutedReply {
                decision: RouteDecision::OutOfDomain,
                answer: composer::out_of_scope_message(language).to_string(),
                contexts_used: 0,
                best_distance: Some(best_distance),
                threshold: Some(threshold),
                embedding_time_ms: Some(retrieval.embedding_time_ms),
                llm_time_ms: None,
                total_tokens: None,
            });
        }

        let contexts = retrieval.contexts();
        let composed = self
            .composer
            .compose(question, &contexts, language, &history)
            .await?;

        Ok(RoutedReply {
            decision: RouteDecision::Answer,
            answer: composer::finalize_answer(&composed.text, language),
            contexts_used: contexts.len() as i32,
            best_distance: Some(best_distance),
            threshold: Some(threshold),
            embedding_time_ms: Some(retrieval.embedding_time_ms),
            llm_time_ms: Some(composed.llm_time_ms),
            total_tokens: composed.total_tokens,
        })
    }

    /// Queue the evaluation record for this ask; never fails the request
    #[allow(clippy::too_many_arguments)]
    fn emit_record(
        &self,
        request: &AskRequest,
        question: &str,
        language: &str,
        classification: Option<&Classification>,
        outcome: std::result::Result<&RoutedReply, &LexRagError>,
        started: Instant,
    ) {
        let category = classification.map_or(QueryCategory::InDomainLegal, |c| c.category);
        let record = match outcome {
            Ok(routed) => EvaluationRecord {
                question: question.to_string(),
                question_length: question.chars().count() as i32,
                answer: routed.answer.clone(),
                answer_length: routed.answer.chars().count() as i32,
                decision: routed.decision,
                category,
                in_domain: routed.decision == RouteDecision::Answer,
                safe_mode: request.safe_mode,
                language: language.to_string(),
                best_distance: routed.best_distance,
                threshold: routed.threshold,
                contexts_used: routed.contexts_used,
                embedding_time_ms: routed.embedding_time_ms.map(|ms| ms as i32),
                llm_time_ms: routed.llm_time_ms.map(|ms| ms as i32),
                total_time_ms: started.elapsed().as_millis() as i32,
                total_tokens: routed.total_tokens,
                embedding_model: self.embedding_model.clone(),
                chat_model: self.chat_model.clone(),
                error_occurred: false,
                error_message: None,
            },
            Err(error) => {
                warn!("Ask failed before completing: {}", error);
                EvaluationRecord {
                    question: question.to_string(),
                    question_length: question.chars().count() as i32,
                    answer: String::new(),
                    answer_length: 0,
                    decision: RouteDecision::Error,
                    category,
                    in_domain: false,
                    safe_mode: request.safe_mode,
                    language: language.to_string(),
                    best_distance: None,
                    threshold: None,
                    contexts_used: 0,
                    embedding_time_ms: None,
                    llm_time_ms: None,
                    total_time_ms: started.elapsed().as_millis() as i32,
                    total_tokens: None,
                    embedding_model: self.embedding_model.clone(),
                    chat_model: self.chat_model.clone(),
                    error_occurred: true,
                    error_message: Some(error.to_string()),
                }
            }
        };
        self.queue.log_evaluation(record);
    }
}

/// Map a classifier verdict to its canned reply, if it has one
fn canned_reply(category: QueryCategory, language: &str) -> Option<RoutedReply> {
    match category {
        QueryCategory::Emergency => Some(RoutedReply::canned(
            RouteDecision::Emergency,
            composer::emergency_message(language).to_string(),
        )),
        QueryCategory::GreetingOrAppHelp => Some(RoutedReply::canned(
            RouteDecision::Greeting,
            composer::greeting_message(language).to_string(),
        )),
        QueryCategory::OutOfDomain | QueryCategory::PromptInjectionOrMisuse => Some(
            RoutedReply::canned(
                RouteDecision::Refused,
                composer::out_of_scope_message(language).to_string(),
            ),
        ),
        QueryCategory::InDomainLegal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_replies_cover_every_fast_path() {
        let emergency = canned_reply(QueryCategory::Emergency, "en").unwrap();
        assert_eq!(emergency.decision, RouteDecision::Emergency);
        assert!(emergency.answer.contains("15 in Pakistan"));

        let greeting = canned_reply(QueryCategory::GreetingOrAppHelp, "ur").unwrap();
        assert_eq!(greeting.decision, RouteDecision::Greeting);

        for category in [
            QueryCategory::OutOfDomain,
            QueryCategory::PromptInjectionOrMisuse,
        ] {
            let refused = canned_reply(category, "en").unwrap();
            assert_eq!(refused.decision, RouteDecision::Refused);
            assert_eq!(refused.contexts_used, 0);
        }

        assert!(canned_reply(QueryCategory::InDomainLegal, "en").is_none());
    }

    #[test]
    fn canned_replies_carry_no_retrieval_stats() {
        let reply = canned_reply(QueryCategory::Emergency, "en").unwrap();
        assert_eq!(reply.best_distance, None);
        assert_eq!(reply.threshold, None);
        assert_eq!(reply.total_tokens, None);
    }
}
