use crate::error::{EvalError, EvalResult};
use crate::models::{ANSWER_FIELD, OUTPUT_FIELD, QUESTION_FIELD, Record};
use serde_json::Value;
use thiserror::Error;

/// Built-in judgment prompt. The judge is expected to reply with a single
/// `Correct` or `Incorrect`.
pub const DEFAULT_TEMPLATE: &str = r#"You are a careful and precise grader. You will be given a question, an output sentence produced by a model, and the correct answer. Decide whether the output sentence answers the question correctly according to the correct answer, and reply with exactly one word: Correct or Incorrect.
-
Rules:
1. Several answers: if the output gives more than one answer, later answers may revise earlier ones. Judge the final answer. If the final answer is unclear or wrong, reply Incorrect.
2. Math: answers that differ in format but are mathematically equivalent are Correct.
3. Options: if the question lists candidate options, the output is Correct when it clearly selects the right option by its label or by its content.
4. No options: otherwise the output must match the correct answer in content and meaning.
-
Question: """{question}"""

Output sentence: """{output}"""

Correct answer: {answer}

Judgement:"#;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown placeholder `{{{0}}}` in prompt template")]
    UnknownPlaceholder(String),

    #[error("unbalanced brace at byte {0} in prompt template")]
    UnbalancedBrace(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Question,
    Output,
    Answer,
}

impl Slot {
    fn from_placeholder(name: &str) -> Option<Self> {
        match name {
            "question" => Some(Slot::Question),
            "output" => Some(Slot::Output),
            "answer" => Some(Slot::Answer),
            _ => None,
        }
    }

    fn record_field(self) -> &'static str {
        match self {
            Slot::Question => QUESTION_FIELD,
            Slot::Output => OUTPUT_FIELD,
            Slot::Answer => ANSWER_FIELD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// Renders records into judge prompts from a pre-parsed template
#[derive(Debug, Clone)]
pub struct PromptRenderer {
    segments: Vec<Segment>,
}

impl PromptRenderer {
    /// Parse a template using `{question}`, `{output}` and `{answer}` placeholders.
    /// `{{` and `}}` produce literal braces.
    pub fn new(template: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            segments: parse_template(template)?,
        })
    }

    /// Renderer for an optional custom template, falling back to [`DEFAULT_TEMPLATE`]
    pub fn with_template(template: Option<&str>) -> Result<Self, TemplateError> {
        Self::new(template.unwrap_or(DEFAULT_TEMPLATE))
    }

    pub fn render(&self, record: &Record) -> Result<String, TemplateError> {
        let mut prompt = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => prompt.push_str(text),
                Segment::Slot(slot) => {
                    let field = slot.record_field();
                    match record.field(field) {
                        Some(Value::String(text)) => prompt.push_str(text),
                        Some(other) => prompt.push_str(&other.to_string()),
                        None => return Err(TemplateError::MissingField(field)),
                    }
                }
            }
        }

        Ok(prompt)
    }

    /// Render every record, failing on the first one that cannot be rendered
    pub fn render_all(&self, records: &[Record]) -> EvalResult<Vec<String>> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.render(record)
                    .map_err(|source| EvalError::Template { index, source })
            })
            .collect()
    }
}

fn parse_template(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().map(|&(_, next)| next) == Some('{') => {
                chars.next();
                text.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::UnbalancedBrace(pos)),
                        Some((_, c)) => name.push(c),
                    }
                }
                let slot = Slot::from_placeholder(&name).ok_or(TemplateError::UnknownPlaceholder(name))?;
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Slot(slot));
            }
            '}' if chars.peek().map(|&(_, next)| next) == Some('}') => {
                chars.next();
                text.push('}');
            }
            '}' => return Err(TemplateError::UnbalancedBrace(pos)),
            _ => text.push(ch),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_from(value: serde_json::Value) -> Record {
        Record::from_fields(value.as_object().unwrap().clone())
    }

    #[test]
    fn test_default_template_renders_all_fields() {
        let renderer = PromptRenderer::with_template(None).unwrap();
        let prompt = renderer.render(&Record::new("2+2?", "It is 4", "4")).unwrap();

        assert!(prompt.contains(r#"Question: """2+2?""""#));
        assert!(prompt.contains(r#"Output sentence: """It is 4""""#));
        assert!(prompt.contains("Correct answer: 4"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_custom_template() {
        let renderer = PromptRenderer::new("Q={question}|O={output}|A={answer}").unwrap();
        let prompt = renderer.render(&Record::new("q", "o", "a")).unwrap();
        assert_eq!(prompt, "Q=q|O=o|A=a");
    }

    #[test]
    fn test_field_content_is_not_rescanned() {
        let renderer = PromptRenderer::new("{question} / {answer}").unwrap();
        let prompt = renderer.render(&Record::new("what is {answer}?", "x", "42")).unwrap();
        assert_eq!(prompt, "what is {answer}? / 42");
    }

    #[test]
    fn test_escaped_braces() {
        let renderer = PromptRenderer::new(r#"{{"verdict": "{answer}"}}"#).unwrap();
        let prompt = renderer.render(&Record::new("q", "o", "yes")).unwrap();
        assert_eq!(prompt, r#"{"verdict": "yes"}"#);
    }

    #[test]
    fn test_missing_field() {
        let renderer = PromptRenderer::with_template(None).unwrap();
        let record = record_from(json!({"question": "q", "llm_output": "o"}));
        assert_eq!(
            renderer.render(&record),
            Err(TemplateError::MissingField("correct_answer"))
        );
    }

    #[test]
    fn test_null_field_is_missing() {
        let renderer = PromptRenderer::new("{output}").unwrap();
        let record = record_from(json!({"question": "q", "llm_output": null, "correct_answer": "a"}));
        assert_eq!(renderer.render(&record), Err(TemplateError::MissingField("llm_output")));
    }

    #[test]
    fn test_non_string_field_renders_as_json() {
        let renderer = PromptRenderer::new("{answer}").unwrap();
        let record = record_from(json!({"question": "q", "llm_output": "o", "correct_answer": 12.5}));
        assert_eq!(renderer.render(&record).unwrap(), "12.5");
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = PromptRenderer::new("{question} {reference}").unwrap_err();
        assert_eq!(err, TemplateError::UnknownPlaceholder("reference".to_string()));
    }

    #[test]
    fn test_unbalanced_braces() {
        assert_eq!(PromptRenderer::new("{question").unwrap_err(), TemplateError::UnbalancedBrace(0));
        assert_eq!(PromptRenderer::new("abc }").unwrap_err(), TemplateError::UnbalancedBrace(4));
        assert_eq!(PromptRenderer::new("a {b{c}").unwrap_err(), TemplateError::UnbalancedBrace(2));
    }

    #[test]
    fn test_render_all_reports_failing_index() {
        let renderer = PromptRenderer::with_template(None).unwrap();
        let records = vec![
            Record::new("q1", "o1", "a1"),
            record_from(json!({"question": "q2", "correct_answer": "a2"})),
        ];

        match renderer.render_all(&records) {
            Err(EvalError::Template { index, source }) => {
                assert_eq!(index, 1);
                assert_eq!(source, TemplateError::MissingField("llm_output"));
            }
            other => panic!("expected template error, got {other:?}"),
        }
    }
}
