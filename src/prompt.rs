//! Prompt Builder
//!
//! Turns a question plus ranked passages into the two-message chat prompt
//! handed to the generation runtime. Pure; no I/O.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::retrieval::ScoredPassage;

/// Fixed system instruction
pub const SYSTEM_PROMPT: &str = "You are a careful assistant answering questions about a small \
library of books. Answer ONLY from the passages supplied in the user message. If the passages \
do not contain the answer, say that you do not know. Cite the book and page range for every \
claim, like (Book Title, pp. 12-13).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Build `[system, user]` for a question and its passages (in ranking order)
pub fn build_prompt(question: &str, passages: &[ScoredPassage<'_>]) -> Vec<ChatMessage> {
    let mut context = String::new();
    for (i, passage) in passages.iter().enumerate() {
        let record = passage.record;
        // write! into a String cannot fail
        let _ = write!(
            context,
            "[#{}] score={:.3} | {} pp. {}\n{}\n\n",
            i + 1,
            passage.score,
            record.book,
            record.pages,
            record.text.trim()
        );
    }

    let user = format!(
        "Passages:\n\n{context}Question: {}\n\n\
         Answer using only the passages above and cite the book and page range for each claim.",
        question.trim()
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}
