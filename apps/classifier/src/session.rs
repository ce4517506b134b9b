use tracing::warn;

use crate::case::Case;
use crate::llm_client::ChatMessage;
use crate::prompt::{PromptSet, PromptSpec};

/// Per-case conversation state: the run's system preamble, the case introduction
/// derived from the bound judgment, and the prompts in declared order.
///
/// A session can only be built from a loaded case, so every message it renders has a
/// judgment behind it.
#[derive(Debug, Clone)]
pub struct CaseChatSession<'a> {
    prompts: &'a PromptSet,
    intro: String,
}

impl<'a> CaseChatSession<'a> {
    pub fn new(prompts: &'a PromptSet, case: &Case) -> Self {
        Self {
            prompts,
            intro: render_intro(&prompts.intro, case),
        }
    }

    pub fn intro(&self) -> &str {
        &self.intro
    }

    pub fn start_chat(&self) -> ChatMessage {
        ChatMessage::system(self.prompts.system.clone())
    }

    /// Prompts in declaration order. Each call starts a fresh pass.
    pub fn next_prompt(&self) -> impl Iterator<Item = &'a PromptSpec> {
        self.prompts.iter()
    }

    pub fn message(&self, prompt: &PromptSpec) -> ChatMessage {
        ChatMessage::user(prompt.render(&self.intro))
    }

    /// The full conversation for one prompt: system preamble followed by the question.
    pub fn conversation(&self, prompt: &PromptSpec) -> Vec<ChatMessage> {
        vec![self.start_chat(), self.message(prompt)]
    }
}

fn render_intro(template: &str, case: &Case) -> String {
    let judgment = match serde_json::to_string_pretty(&case.judgment) {
        Ok(s) => s,
        Err(e) => {
            warn!(case_id = %case.id, "could not serialize judgment: {e}");
            case.judgment.to_string()
        }
    };
    template
        .replace("{mnc}", &case.mnc)
        .replace("{judgment}", &judgment)
}
