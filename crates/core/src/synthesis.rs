use crate::models::{Answer, AnswerOutcome, Chunk};
use crate::traits::LanguageModel;
use tracing::warn;

/// The sentence the model is told to give when the passage lacks the answer.
pub const NOT_IN_CONTEXT: &str = "The provided document does not contain this information.";

pub static ANSWER_SYSTEM_PROMPT: &str = r#"You answer questions about scanned documents.
You are given one passage from a document between <context> and </context> tags. It is your only source of facts.

Rules:
1. Answer using only information stated in the passage.
2. Do not use outside knowledge, and do not guess or fill gaps with assumptions.
3. If the passage does not contain the answer, reply exactly: "The provided document does not contain this information."
4. If only part of the answer is in the passage, give that part and say what is missing.
5. Be clear, objective and brief."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(question: &str, chunk: &Chunk) -> Prompt {
    let user = format!(
        "Document: {file} (chunk {index})\n\n<context>\n{context}\n</context>\n\nQuestion: {question}\n\nAnswer based only on the passage above.",
        file = chunk.source_file,
        index = chunk.chunk_index,
        context = chunk.text,
        question = question.trim(),
    );

    Prompt {
        system: ANSWER_SYSTEM_PROMPT.to_string(),
        user,
    }
}

pub struct AnswerSynthesizer<'a, L> {
    model: &'a L,
}

impl<'a, L> AnswerSynthesizer<'a, L>
where
    L: LanguageModel + Send + Sync,
{
    pub fn new(model: &'a L) -> Self {
        Self { model }
    }

    /// One model call per question. A failed call becomes an error-marked
    /// answer instead of an error.
    pub async fn answer(&self, question: &str, chunk: &Chunk) -> Answer {
        let prompt = build_prompt(question, chunk);
        let provenance = format!(
            "Source document: {} (chunk {})",
            chunk.source_file, chunk.chunk_index
        );

        let (text, outcome) = match self.model.generate(&prompt).await {
            Ok(reply) => (format!("{provenance}\n\n{reply}"), AnswerOutcome::Grounded),
            Err(error) => {
                warn!(file = %chunk.source_file, chunk = chunk.chunk_index, error = %error, "answer generation failed");
                (
                    format!("[error] language model request failed: {error}"),
                    AnswerOutcome::Failed,
                )
            }
        };

        Answer {
            question: question.to_string(),
            source_file: chunk.source_file.clone(),
            chunk_index: chunk.chunk_index,
            text,
            outcome,
        }
    }
}
