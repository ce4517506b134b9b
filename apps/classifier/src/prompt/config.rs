//! Loading prompt definitions.
//!
//! The definitions are exported from the research team's prompt spreadsheet as JSON:
//! a system preamble, a judgment introduction template and an ordered prompt list.
//! Order matters: output columns follow it.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::prompt::{FieldSpec, PromptSpec, ReturnShape};

#[derive(Debug, Deserialize)]
struct PromptFile {
    system: String,
    intro: String,
    prompts: Vec<PromptDefinition>,
}

#[derive(Debug, Deserialize)]
struct PromptDefinition {
    name: String,
    #[serde(alias = "prompt")]
    prompt_question: String,
    return_type: String,
    #[serde(default)]
    fields: Vec<FieldDefinition>,
    #[serde(default)]
    repeats: Option<Repeats>,
    #[serde(default)]
    return_instruction: String,
    #[serde(default)]
    additional_instruction: String,
}

#[derive(Debug, Deserialize)]
struct FieldDefinition {
    name: String,
    #[serde(default, alias = "question")]
    question_description: String,
    #[serde(default)]
    example: String,
}

/// Spreadsheet exports write every cell as a string, so accept both forms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Repeats {
    Count(usize),
    Text(String),
}

impl Repeats {
    fn resolve(&self, prompt: &str) -> Result<usize, AppError> {
        match self {
            Repeats::Count(n) => Ok(*n),
            Repeats::Text(s) if s.trim().is_empty() => Ok(1),
            Repeats::Text(s) => s.trim().parse().map_err(|_| {
                AppError::Config(format!("prompt '{prompt}' has non-numeric repeats '{s}'"))
            }),
        }
    }
}

/// The validated, ordered set of prompts for a run, plus the shared templates.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system: String,
    /// Case introduction template. `{judgment}` and `{mnc}` are substituted per case.
    pub intro: String,
    prompts: Vec<PromptSpec>,
}

impl PromptSet {
    /// Builds a prompt set, validating every prompt and rejecting duplicate names.
    pub fn new(
        system: impl Into<String>,
        intro: impl Into<String>,
        prompts: Vec<PromptSpec>,
    ) -> Result<Self, AppError> {
        let mut seen = HashSet::new();
        for spec in &prompts {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate prompt name '{}'",
                    spec.name
                )));
            }
        }
        Ok(Self {
            system: system.into(),
            intro: intro.into(),
            prompts,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("cannot read prompts {}: {e}", path.display()))
        })?;
        let set = Self::from_json(&raw)?;
        info!("Loaded {} prompts from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let file: PromptFile = serde_json::from_str(raw)
            .map_err(|e| AppError::Config(format!("invalid prompt definitions: {e}")))?;
        let prompts = file
            .prompts
            .into_iter()
            .map(PromptDefinition::into_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(file.system, file.intro, prompts)
    }

    /// Prompts in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, PromptSpec> {
        self.prompts.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PromptSpec> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }
}

impl PromptDefinition {
    fn into_spec(self) -> Result<PromptSpec, AppError> {
        let shape = match self.return_type.trim().to_ascii_lowercase().as_str() {
            "" | "text" => ReturnShape::Text,
            "json" | "json_object" => ReturnShape::Object,
            "json_multiple" | "json_array" => ReturnShape::Array {
                repeats: match &self.repeats {
                    Some(r) => r.resolve(&self.name)?,
                    None => 1,
                },
            },
            other => {
                return Err(AppError::Config(format!(
                    "prompt '{}' has unknown return_type '{other}'",
                    self.name
                )))
            }
        };
        let fields = self
            .fields
            .into_iter()
            .map(|f| FieldSpec::new(f.name, f.question_description, f.example))
            .collect();
        Ok(PromptSpec::new(self.name, self.prompt_question, shape, fields)
            .with_return_instruction(self.return_instruction)
            .with_additional_instruction(self.additional_instruction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"{
        "system": "You are a legal research assistant.",
        "intro": "Here is a judgment ({mnc}):\n{judgment}",
        "prompts": [
            {
                "name": "dates",
                "prompt_question": "Answer these questions about dates.",
                "return_type": "json",
                "fields": [
                    {"name": "filing_date", "question_description": "Filing date?", "example": "2010-06-05"},
                    {"name": "interlocutory", "question_description": "Interlocutory?", "example": "yes"}
                ]
            },
            {
                "name": "parties",
                "prompt_question": "List the parties.",
                "return_type": "json_multiple",
                "repeats": "2",
                "fields": [
                    {"name": "name", "question_description": "Name?", "example": "John Smith"}
                ],
                "additional_instruction": "Include every party."
            },
            {
                "name": "will_date",
                "prompt_question": "List the dates of each will.",
                "return_type": "text"
            }
        ]
    }"#;

    #[test]
    fn test_loads_in_declared_order() {
        let set = PromptSet::from_json(DEFINITIONS).unwrap();
        assert_eq!(set.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["dates", "parties", "will_date"]);
        assert_eq!(set.get("dates").unwrap().shape, ReturnShape::Object);
        assert_eq!(
            set.get("parties").unwrap().shape,
            ReturnShape::Array { repeats: 2 }
        );
        assert_eq!(
            set.get("parties").unwrap().additional_instruction,
            "Include every party."
        );
        assert_eq!(set.get("will_date").unwrap().shape, ReturnShape::Text);
        assert_eq!(set.system, "You are a legal research assistant.");
    }

    #[test]
    fn test_numeric_repeats_accepted() {
        let raw = r#"{"system": "", "intro": "", "prompts": [
            {"name": "p", "prompt_question": "q", "return_type": "json_array", "repeats": 3,
             "fields": [{"name": "a"}]}
        ]}"#;
        let set = PromptSet::from_json(raw).unwrap();
        assert_eq!(set.get("p").unwrap().shape, ReturnShape::Array { repeats: 3 });
    }

    #[test]
    fn test_array_without_fields_rejected_at_load() {
        let raw = r#"{"system": "", "intro": "", "prompts": [
            {"name": "parties", "prompt_question": "q", "return_type": "json_multiple", "repeats": 2}
        ]}"#;
        assert!(matches!(PromptSet::from_json(raw), Err(AppError::Config(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let raw = r#"{"system": "", "intro": "", "prompts": [
            {"name": "a", "prompt_question": "q", "return_type": "text"},
            {"name": "a", "prompt_question": "q2", "return_type": "text"}
        ]}"#;
        let err = PromptSet::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate prompt name 'a'"));
    }

    #[test]
    fn test_unknown_return_type_rejected() {
        let raw = r#"{"system": "", "intro": "", "prompts": [
            {"name": "a", "prompt_question": "q", "return_type": "yaml"}
        ]}"#;
        assert!(matches!(PromptSet::from_json(raw), Err(AppError::Config(_))));
    }

    #[test]
    fn test_bad_repeats_rejected() {
        let raw = r#"{"system": "", "intro": "", "prompts": [
            {"name": "a", "prompt_question": "q", "return_type": "json_multiple", "repeats": "two",
             "fields": [{"name": "x"}]}
        ]}"#;
        assert!(matches!(PromptSet::from_json(raw), Err(AppError::Config(_))));
    }

    #[test]
    fn test_example_definitions_parse() {
        let set = PromptSet::from_json(include_str!("../../prompts.example.json")).unwrap();
        assert_eq!(set.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["summary", "dates", "plaintiffs"]);
        assert_eq!(
            set.get("plaintiffs").unwrap().shape,
            ReturnShape::Array { repeats: 3 }
        );
    }

    #[test]
    fn test_name_unusable_as_cache_key_rejected_at_load() {
        let raw = r#"{"system": "", "intro": "", "prompts": [
            {"name": "costs/orders", "prompt_question": "q", "return_type": "text"}
        ]}"#;
        let err = PromptSet::from_json(raw).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("costs/orders"));
    }
}
