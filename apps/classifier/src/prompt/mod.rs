//! Prompt definitions and everything that depends on a prompt's return shape:
//! rendering, parsing, column layout, flattening, error wrapping and mock output.

pub mod config;
pub mod json;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::AppError;
use crate::prompt::json::parse_llm_json;

pub use config::PromptSet;

const ERROR_EXCERPT_CHARS: usize = 300;
const MAX_NAME_LEN: usize = 64;

/// One flat field -> value mapping, in declaration order.
pub type Record = Map<String, Value>;

/// Expected shape of an LLM answer to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// Free text, kept verbatim.
    Text,
    /// A single JSON object keyed by field name.
    Object,
    /// A JSON array of objects, laid out as `repeats` column groups.
    Array { repeats: usize },
}

/// One sub-question of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub question: String,
    pub example: String,
}

impl FieldSpec {
    pub fn new(
        name: impl Into<String>,
        question: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            question: question.into(),
            example: example.into(),
        }
    }
}

/// Parsed answer to one prompt. The variant always matches the prompt's `ReturnShape`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PromptResult {
    Text(String),
    Object(Record),
    Array(Vec<Record>),
}

/// Immutable definition of one classification question.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub name: String,
    pub question: String,
    pub shape: ReturnShape,
    pub fields: Vec<FieldSpec>,
    pub return_instruction: String,
    pub additional_instruction: String,
}

impl PromptSpec {
    pub fn new(
        name: impl Into<String>,
        question: impl Into<String>,
        shape: ReturnShape,
        fields: Vec<FieldSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            question: question.into(),
            shape,
            fields,
            return_instruction: String::new(),
            additional_instruction: String::new(),
        }
    }

    #[must_use]
    pub fn with_return_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.return_instruction = instruction.into();
        self
    }

    #[must_use]
    pub fn with_additional_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.additional_instruction = instruction.into();
        self
    }

    /// Rejects definitions that cannot produce a stable column layout. The name doubles as
    /// a cache path component and a batch `custom_id`, so it is restricted to the
    /// characters both accept.
    pub fn validate(&self) -> Result<(), AppError> {
        if !is_valid_name(&self.name) {
            return Err(AppError::Config(format!(
                "prompt name '{}' must be 1-{MAX_NAME_LEN} characters of A-Z, a-z, 0-9, '_' or '-'",
                self.name
            )));
        }
        if let ReturnShape::Array { repeats } = self.shape {
            if self.fields.is_empty() {
                return Err(AppError::Config(format!(
                    "prompt '{}' returns a JSON array but declares no fields",
                    self.name
                )));
            }
            if repeats == 0 {
                return Err(AppError::Config(format!(
                    "prompt '{}' returns a JSON array but has repeats = 0",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Static column names this prompt occupies in a case row.
    pub fn headers(&self) -> Vec<String> {
        match self.shape {
            ReturnShape::Text => vec![self.name.clone()],
            ReturnShape::Object => self
                .fields
                .iter()
                .map(|f| format!("{}:{}", self.name, f.name))
                .collect(),
            ReturnShape::Array { repeats } => (1..=repeats)
                .flat_map(move |i| {
                    self.fields
                        .iter()
                        .map(move |f| format!("{}:{}:{}", self.name, i, f.name))
                })
                .collect(),
        }
    }

    /// Full user message for this prompt: case introduction, question, numbered
    /// sub-questions, return-format instruction and an example answer.
    pub fn render(&self, intro: &str) -> String {
        let mut sections: Vec<String> = Vec::new();
        if !intro.trim().is_empty() {
            sections.push(intro.trim_end().to_string());
        }
        sections.push(self.question.trim().to_string());

        if !self.fields.is_empty() {
            let questions = self
                .fields
                .iter()
                .enumerate()
                .map(|(i, f)| format!("Q{}: {}", i + 1, f.question.trim()))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(questions);
        }

        sections.push(self.format_instruction());
        if let Some(skeleton) = self.example_skeleton() {
            sections.push(skeleton);
        }
        if !self.additional_instruction.trim().is_empty() {
            sections.push(self.additional_instruction.trim().to_string());
        }
        sections.join("\n\n")
    }

    /// Parses raw model output. Malformed or mis-shaped JSON never fails the caller;
    /// it degrades to `wrap_error` so the column group stays in place.
    pub fn parse(&self, raw: &str) -> PromptResult {
        match self.shape {
            ReturnShape::Text => PromptResult::Text(raw.to_string()),
            ReturnShape::Object => match parse_llm_json(raw) {
                Ok(Value::Object(record)) => PromptResult::Object(record),
                Ok(other) => self.shape_mismatch("a JSON object", &other),
                Err(e) => self.unparseable(raw, &e.to_string()),
            },
            ReturnShape::Array { .. } => match parse_llm_json(raw) {
                Ok(Value::Array(items)) => {
                    let total = items.len();
                    let records: Vec<Record> = items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(record) => Some(record),
                            _ => None,
                        })
                        .collect();
                    if total > 0 && records.is_empty() {
                        return self.report_error(format!(
                            "expected a JSON array of objects but none of its {total} elements is an object"
                        ));
                    }
                    if records.len() < total {
                        warn!(
                            prompt = %self.name,
                            skipped = total - records.len(),
                            "ignoring non-object array elements"
                        );
                    }
                    PromptResult::Array(records)
                }
                // Models sometimes send the lone item without its enclosing list.
                Ok(Value::Object(record)) => PromptResult::Array(vec![record]),
                Ok(other) => self.shape_mismatch("a JSON array", &other),
                Err(e) => self.unparseable(raw, &e.to_string()),
            },
        }
    }

    /// Projects a result onto this prompt's fixed-width column group.
    /// `None` (prompt not run) yields the same width of empty values.
    pub fn collimate(&self, result: Option<&PromptResult>) -> Vec<Value> {
        match self.shape {
            ReturnShape::Text => {
                let value = match result {
                    Some(PromptResult::Text(text)) => Value::String(text.clone()),
                    _ => empty(),
                };
                vec![value]
            }
            ReturnShape::Object => {
                let record = match result {
                    Some(PromptResult::Object(record)) => Some(record),
                    _ => None,
                };
                self.fields
                    .iter()
                    .map(|f| field_value(record, &f.name))
                    .collect()
            }
            ReturnShape::Array { repeats } => {
                let records: &[Record] = match result {
                    Some(PromptResult::Array(records)) => records,
                    _ => &[],
                };
                (0..repeats)
                    .flat_map(move |i| {
                        let record = records.get(i);
                        self.fields.iter().map(move |f| field_value(record, &f.name))
                    })
                    .collect()
            }
        }
    }

    /// Projects a result into composite keys: `name`, `name:field` or `name:index:field`
    /// (1-based index). Array items beyond `repeats` are kept here; only `collimate`
    /// is width-bounded.
    pub fn flatten(&self, result: &PromptResult) -> Record {
        let mut flat = Record::new();
        match (self.shape, result) {
            (ReturnShape::Text, PromptResult::Text(text)) => {
                flat.insert(self.name.clone(), Value::String(text.clone()));
            }
            (ReturnShape::Object, PromptResult::Object(record)) => {
                for f in &self.fields {
                    flat.insert(
                        format!("{}:{}", self.name, f.name),
                        field_value(Some(record), &f.name),
                    );
                }
            }
            (ReturnShape::Array { .. }, PromptResult::Array(records)) => {
                for (i, record) in records.iter().enumerate() {
                    for f in &self.fields {
                        flat.insert(
                            format!("{}:{}:{}", self.name, i + 1, f.name),
                            field_value(Some(record), &f.name),
                        );
                    }
                }
            }
            _ => {
                warn!(prompt = %self.name, "result does not match the prompt's return shape");
            }
        }
        flat
    }

    /// An error-shaped result: the message in the first field, every other field empty.
    pub fn wrap_error(&self, message: &str) -> PromptResult {
        match self.shape {
            ReturnShape::Text => PromptResult::Text(message.to_string()),
            ReturnShape::Object => PromptResult::Object(self.error_record(message)),
            ReturnShape::Array { .. } => PromptResult::Array(vec![self.error_record(message)]),
        }
    }

    /// A plausible answer built from the field examples, for dry runs.
    pub fn mock_response(&self) -> String {
        match self.shape {
            ReturnShape::Text => self
                .fields
                .first()
                .map(|f| f.example.clone())
                .filter(|example| !example.is_empty())
                .unwrap_or_else(|| format!("Mock response for {}", self.name)),
            ReturnShape::Object => Value::Object(self.example_record(false)).to_string(),
            ReturnShape::Array { repeats } => {
                let items = (0..repeats.max(1))
                    .map(|_| Value::Object(self.example_record(false)))
                    .collect();
                Value::Array(items).to_string()
            }
        }
    }

    fn format_instruction(&self) -> String {
        if !self.return_instruction.trim().is_empty() {
            return self.return_instruction.trim().to_string();
        }
        match self.shape {
            ReturnShape::Text => "Answer in plain text.".to_string(),
            ReturnShape::Object => format!(
                "Return your answers as a single JSON object with the keys {}. \
                 Cite the paragraph numbers your answer relies on in brackets.",
                self.field_list()
            ),
            ReturnShape::Array { .. } => format!(
                "Return a JSON array containing one object per item, each with the keys {}. \
                 Cite the paragraph numbers your answer relies on in brackets.",
                self.field_list()
            ),
        }
    }

    fn example_skeleton(&self) -> Option<String> {
        let example = match self.shape {
            ReturnShape::Text => return None,
            ReturnShape::Object => Value::Object(self.example_record(true)),
            ReturnShape::Array { .. } => {
                Value::Array(vec![Value::Object(self.example_record(true))])
            }
        };
        serde_json::to_string_pretty(&example).ok()
    }

    fn example_record(&self, with_references: bool) -> Record {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let value = if with_references {
                    format!("{} {}", f.example, paragraph_reference(i))
                        .trim()
                        .to_string()
                } else {
                    f.example.clone()
                };
                (f.name.clone(), Value::String(value))
            })
            .collect()
    }

    fn error_record(&self, message: &str) -> Record {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let value = if i == 0 { message.to_string() } else { String::new() };
                (f.name.clone(), Value::String(value))
            })
            .collect()
    }

    fn field_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("\"{}\"", f.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn shape_mismatch(&self, expected: &str, got: &Value) -> PromptResult {
        self.report_error(format!("expected {expected} but got {}", json_kind(got)))
    }

    /// Keeps an excerpt of the raw text so a cached provider error stays readable.
    fn unparseable(&self, raw: &str, reason: &str) -> PromptResult {
        let excerpt: String = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(ERROR_EXCERPT_CHARS)
            .collect();
        self.report_error(format!("could not parse LLM response ({reason}): {excerpt}"))
    }

    fn report_error(&self, message: String) -> PromptResult {
        warn!(prompt = %self.name, "{message}");
        self.wrap_error(&message)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn empty() -> Value {
    Value::String(String::new())
}

fn field_value(record: Option<&Record>, field: &str) -> Value {
    record
        .and_then(|r| r.get(field))
        .cloned()
        .unwrap_or_else(empty)
}

/// Illustrative paragraph citation for example answers. Deterministic so that a
/// rendered message is stable across runs.
fn paragraph_reference(index: usize) -> String {
    if index % 2 == 0 {
        format!("(p{})", index * 3 + 2)
    } else {
        format!("(pp{}-{})", index + 1, index + 3)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
