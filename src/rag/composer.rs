//! Answer composition and canned replies
//!
//! Everything the user can read comes from here: the grounded-answer prompt,
//! the fixed safety and scope messages in both languages, and the disclaimer
//! appended to substantive replies.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing::info;

use crate::config::ChatConfig;
use crate::errors::Result;
use crate::providers::ChatApi;
use crate::providers::ChatTurn;
use crate::providers::CompletionOptions;

/// The answer prompt instructs the model to emit exactly this sentence when
/// the provided context cannot support an answer; reply handling matches on it
/// to decide whether a disclaimer belongs.
pub const REFUSAL_SENTENCE: &str = "I am an AI legal lawyer assistant. \
    I can only help you with legal awareness. I'm not able to process this query.";

pub fn language_name(language: &str) -> &'static str {
    if language == "ur" {
        "Urdu"
    } else {
        "English"
    }
}

/// System instructions for the grounded answer call
pub fn build_answer_system_prompt(language: &str) -> String {
    let lang_name = language_name(language);
    let mut prompt = format!(
        "You are an AI legal lawyer assistant for Pakistan. \
         You MUST answer ONLY from the provided legal context. \
         If the context does not contain the answer, DO NOT use outside knowledge. \
         Instead reply exactly with:\n\"{REFUSAL_SENTENCE}\"\n\
         Do not add anything else except the legal answer when context is sufficient. \
         You MUST respond strictly in the selected language: {lang_name}. \
         Even if the user writes in a different language, still respond in {lang_name}. \
         Avoid giving procedural guarantees. \
         If sources do not mention an act/law name, do NOT name any act or section. \
         NEVER mention any act/section/law name unless it appears in the provided sources."
    );
    if language == "ur" {
        prompt.push_str(" جواب اردو میں دیں۔");
    }
    prompt
}

/// Final user turn carrying the retrieved context and the question
pub fn build_answer_user_prompt(question: &str, contexts: &[String]) -> String {
    let context_block = if contexts.is_empty() {
        "No relevant context.".to_string()
    } else {
        contexts
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!("Context:\n{context_block}\n\nQuestion: {question}")
}

/// Fixed safety guidance for emergency-classified questions
pub fn emergency_message(language: &str) -> &'static str {
    if language == "ur" {
        "⚠️ اگر آپ کو فوری خطرہ ہے تو ابھی محفوظ جگہ پر جائیں اور فوراً مدد لیں۔\n\n\
         ✅ فوری قدم:\n\
         1) اگر ممکن ہو تو فوراً گھر/جگہ چھوڑ کر کسی قابلِ اعتماد شخص کے پاس جائیں۔\n\
         2) ایمرجنسی میں 15 پر کال کریں۔\n\
         3) کسی قریبی رشتہ دار/دوست کو فوراً اطلاع دیں۔\n\n\
         ✅ قانونی مدد:\n\
         • آپ پولیس میں رپورٹ/FIR درج کروا سکتی ہیں۔\n\
         • آپ پروٹیکشن آرڈر/عدالتی تحفظ کے لیے درخواست دے سکتی ہیں۔\n\n\
         نوٹ: قوانین صوبے کے لحاظ سے مختلف ہو سکتے ہیں۔ یہ معلومات صرف آگاہی کے لیے ہیں۔"
    } else {
        "⚠️ If you are in immediate danger, please prioritize your safety first.\n\n\
         ✅ Immediate steps:\n\
         1) Move to a safe place (trusted friend/relative). \n\
         2) Call emergency services (15 in Pakistan). \n\
         3) Inform someone you trust immediately.\n\n\
         ✅ Legal steps:\n\
         • You may report to police / file an FIR.\n\
         • You can seek a protection order or legal protection through courts.\n\n\
         Note: Laws may vary by province. This information is for awareness only."
    }
}

/// Capability description for greetings and app-help questions
pub fn greeting_message(language: &str) -> &'static str {
    if language == "ur" {
        "السلام علیکم! میں پاکستان کے قوانین اور خواتین کے قانونی حقوق کے بارے میں آگاہی \
         فراہم کرتا ہوں۔ آپ مجھ سے کوئی بھی قانونی سوال پوچھ سکتی ہیں، مثلاً وراثت، خلع، \
         تحفظ یا FIR کے بارے میں۔"
    } else {
        "Hello! I provide legal awareness about Pakistan's laws and women's legal rights. \
         You can ask me any legal question, for example about inheritance, khula, \
         protection orders, or filing an FIR."
    }
}

/// Sent when retrieval finds nothing at all
pub fn no_hits_message(language: &str) -> &'static str {
    if language == "ur" {
        "مجھے اپ لوڈ کیے گئے قانونی دستاویزات میں اس سوال سے متعلق معلومات نہیں ملیں۔ \
         براہِ کرم اپنا قانونی سوال واضح انداز میں دوبارہ لکھیں۔"
    } else {
        "I could not find relevant information in the uploaded legal documents. \
         Please ask a specific legal question or rephrase."
    }
}

/// Sent when hits exist but none is close enough, and for refused questions
pub fn out_of_scope_message(language: &str) -> &'static str {
    if language == "ur" {
        "میں صرف پاکستان کے قوانین اور قانونی آگاہی کے بارے میں مدد کر سکتا ہوں۔ \
         براہِ کرم کوئی قانونی سوال کریں۔"
    } else {
        "I can only help with legal awareness related to Pakistan\u{2019}s laws. \
         Please ask a legal question."
    }
}

pub fn disclaimer(language: &str) -> &'static str {
    if language == "ur" {
        "نوٹ: یہ معلومات صرف آپ کے قانونی حقوق کی وضاحت کے لیے فراہم کی جاتی ہیں۔ \
         اگر آپ قانونی کارروائی کرنا چاہتے ہیں تو براہِ کرم ہماری فراہم کردہ \
         فہرست میں سے کسی وکیل سے رابطہ کریں \
         یا ذاتی طور پر کسی وکیل سے مشورہ کریں۔ فوری مدد کے لیے ہیلپ لائن استعمال کریں۔"
    } else {
        "Note: This information is provided only to explain your legal rights. \
         If you want to take legal action, please contact a lawyer from our provided list \
         or consult a lawyer in person. For urgent help, use the Helpline."
    }
}

/// Append the language's disclaimer below a reply
pub fn with_disclaimer(text: &str, language: &str) -> String {
    format!("{text}\n\n{}", disclaimer(language))
}

/// A grounded answer gets the disclaimer unless the model declined; the
/// refusal sentence already tells the user everything it needs to.
pub fn finalize_answer(answer: &str, language: &str) -> String {
    if answer.contains(REFUSAL_SENTENCE) {
        answer.to_string()
    } else {
        with_disclaimer(answer, language)
    }
}

/// One prior turn handed to the answer model
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Outcome of one composition call
#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub text: String,
    /// The full prompt as sent, for the evaluation record
    pub prompt: Vec<ChatTurn>,
    pub llm_time_ms: u64,
    pub total_tokens: Option<i32>,
}

/// Builds the grounded prompt and runs the chat completion
pub struct AnswerComposer {
    chat: Arc<dyn ChatApi>,
    timeout: Duration,
}

impl AnswerComposer {
    pub fn new(chat: Arc<dyn ChatApi>, config: &ChatConfig) -> Self {
        Self {
            chat,
            timeout: Duration::from_secs(config.answer_timeout_secs),
        }
    }

    /// Compose an answer restricted to `contexts`, in `language`, with the
    /// conversation window replayed before the final user turn
    pub async fn compose(
        &self,
        question: &str,
        contexts: &[String],
        language: &str,
        history: &[HistoryTurn],
    ) -> Result<ComposedAnswer> {
        let started = Instant::now();

        let mut prompt = Vec::with_capacity(history.len() + 2);
        prompt.push(ChatTurn::system(build_answer_system_prompt(language)));
        for turn in history {
            match turn.role.as_str() {
                "user" => prompt.push(ChatTurn::user(turn.content.clone())),
                "assistant" => prompt.push(ChatTurn::assistant(turn.content.clone())),
                _ => {}
            }
        }
        prompt.push(ChatTurn::user(build_answer_user_prompt(question, contexts)));

        let options = CompletionOptions {
            temperature: 0.2,
            max_tokens: 900,
            timeout: self.timeout,
        };
        let completion = self.chat.complete(&prompt, &options).await?;
        let llm_time_ms = started.elapsed().as_millis() as u64;

        info!(
            "Answer composed lang={} contexts={} history={} ms={}",
            language,
            contexts.len(),
            history.len(),
            llm_time_ms
        );

        Ok(ComposedAnswer {
            text: completion.text.trim().to_string(),
            prompt,
            llm_time_ms,
            total_tokens: completion.total_tokens,
        })
    }
}
