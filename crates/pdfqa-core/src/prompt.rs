//! Prompt assembly for grounded answering.
//!
//! A prompt is an ordered list of role-tagged [`PromptMessage`]s:
//!
//! 1. `system`: the answering policy (stay within the domain, refuse
//!    otherwise, point at the escalation link),
//! 2. `evidence`: the retrieved chunks as a JSON array,
//! 3. `user`: the question, verbatim.
//!
//! The policy text is configuration, not code: see [`AnswerPolicy`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Who a prompt message speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    /// Retrieved context supplied to the model as reference material.
    Evidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
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

    pub fn evidence(content: impl Into<String>) -> Self {
        Self {
            role: Role::Evidence,
            content: content.into(),
        }
    }
}

/// Domain restriction and refusal wording for the system instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPolicy {
    /// Subject the assistant is restricted to (e.g. a product name).
    pub domain: String,
    /// Reply for out-of-domain questions. `{domain}` is substituted.
    pub refusal_message: String,
    /// Where users can raise a ticket. Omitted from the prompt when unset.
    pub escalation_url: Option<String>,
    /// Replaces the generated instruction entirely when set.
    pub system_prompt: Option<String>,
}

impl Default for AnswerPolicy {
    fn default() -> Self {
        Self {
            domain: "the provided documents".to_string(),
            refusal_message: "Sorry, I'm trained to answer only questions related to {domain}."
                .to_string(),
            escalation_url: None,
            system_prompt: None,
        }
    }
}

impl AnswerPolicy {
    /// The system instruction this policy produces.
    pub fn system_instruction(&self) -> String {
        if let Some(custom) = &self.system_prompt {
            return custom.clone();
        }

        let refusal = self.refusal_message.replace("{domain}", &self.domain);
        let mut text = format!(
            "Answer the user's question using only the provided information from the pages.\n\
             Be friendly and conversational, but do not add any information beyond the \
             {domain} data you are given.\n\
             If a question is not about {domain}, respond with: \"{refusal}\"",
            domain = self.domain,
            refusal = refusal,
        );
        if let Some(url) = &self.escalation_url {
            text.push_str(&format!(
                "\nIf the user wants to raise a ticket, give them this link: \"{}\".",
                url
            ));
        }
        text
    }
}

#[derive(Serialize)]
struct EvidenceItem<'a> {
    source: &'a str,
    page: u32,
    text: &'a str,
}

/// Serialize retrieved chunks as the JSON evidence payload.
pub fn evidence_json(chunks: &[Chunk]) -> Result<String> {
    let items: Vec<EvidenceItem<'_>> = chunks
        .iter()
        .map(|c| EvidenceItem {
            source: &c.source_ref.source,
            page: c.source_ref.page_number,
            text: &c.text,
        })
        .collect();
    serde_json::to_string(&items)
        .map_err(|e| Error::Generation(format!("failed to serialize evidence: {}", e)))
}

/// Assemble the three-message prompt for `question`.
///
/// An empty `chunks` slice still yields an evidence message (`[]`), so the
/// model always sees the same structure and can refuse on its own.
pub fn build_prompt(
    policy: &AnswerPolicy,
    chunks: &[Chunk],
    question: &str,
) -> Result<Vec<PromptMessage>> {
    Ok(vec![
        PromptMessage::system(policy.system_instruction()),
        PromptMessage::evidence(evidence_json(chunks)?),
        PromptMessage::user(question),
    ])
}
