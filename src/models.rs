use crate::error::{EvalError, EvalResult};
use crate::judge::JudgeSettings;
use crate::label::{LabelResult, normalize};
use crate::stats::Statistics;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const QUESTION_FIELD: &str = "question";
pub const OUTPUT_FIELD: &str = "llm_output";
pub const ANSWER_FIELD: &str = "correct_answer";
pub const PROMPT_FIELD: &str = "prompt";
pub const JUDGE_VALID_FIELD: &str = "judge_valid";

/// Key under which the raw judgment of `model_name` is stored in a result entry
pub fn judgment_key(model_name: &str) -> String {
    format!("{model_name}_judgment_result")
}

/// One dataset row. Besides the three evaluated fields it keeps every other
/// key of the source object so the report can echo the row back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Build a record from the three evaluated fields
    pub fn new(question: &str, llm_output: &str, correct_answer: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(QUESTION_FIELD.to_string(), Value::from(question));
        fields.insert(OUTPUT_FIELD.to_string(), Value::from(llm_output));
        fields.insert(ANSWER_FIELD.to_string(), Value::from(correct_answer));
        Self(fields)
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Field value, treating an explicit `null` as absent
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }
}

/// A record together with its rendered prompt and the judge's raw answer
#[derive(Debug, Clone, PartialEq)]
pub struct JudgedRecord {
    pub record: Record,
    pub prompt: String,
    /// Raw judge text, empty when the judge call failed
    pub judgment_result: String,
    pub judge_valid: bool,
}

impl JudgedRecord {
    /// Pair a prompted record with its judgment; validity comes from the normalized label
    pub fn new(record: Record, prompt: String, judgment_result: String) -> Self {
        let judge_valid = normalize(&judgment_result).valid;
        Self {
            record,
            prompt,
            judgment_result,
            judge_valid,
        }
    }

    pub fn label(&self) -> LabelResult {
        normalize(&self.judgment_result)
    }

    /// Flatten into the persisted result entry
    pub fn into_entry(self, model_name: &str) -> Map<String, Value> {
        let mut entry = self.record.0;
        entry.insert(PROMPT_FIELD.to_string(), Value::String(self.prompt));
        entry.insert(judgment_key(model_name), Value::String(self.judgment_result));
        entry.insert(JUDGE_VALID_FIELD.to_string(), Value::Bool(self.judge_valid));
        entry
    }

    /// Recover a judged record from a persisted result entry
    pub fn from_entry(index: usize, entry: &Map<String, Value>, model_name: &str) -> EvalResult<Self> {
        let mut fields = entry.clone();
        let key = judgment_key(model_name);

        let judgment_result = match fields.remove(&key) {
            Some(Value::String(text)) => text,
            Some(other) => {
                return Err(EvalError::MalformedReport {
                    index,
                    message: format!("`{key}` is not a string: {other}"),
                });
            }
            None => {
                return Err(EvalError::MalformedReport {
                    index,
                    message: format!("missing `{key}`"),
                });
            }
        };
        let prompt = match fields.remove(PROMPT_FIELD) {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let judge_valid = match fields.remove(JUDGE_VALID_FIELD) {
            Some(Value::Bool(valid)) => valid,
            _ => normalize(&judgment_result).valid,
        };

        Ok(Self {
            record: Record(fields),
            prompt,
            judgment_result,
            judge_valid,
        })
    }
}

/// Metadata captured once at the start of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub llm: JudgeSettings,
    pub dataset: String,
    pub data_num: usize,
    #[serde(with = "report_datetime")]
    pub datetime: NaiveDateTime,
}

/// The persisted artifact of one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub info: RunInfo,
    pub stat_info: Statistics,
    pub results: Vec<Map<String, Value>>,
}

impl Report {
    pub fn new(info: RunInfo, stat_info: Statistics, judged: Vec<JudgedRecord>) -> Self {
        let results = judged
            .into_iter()
            .map(|record| record.into_entry(&info.llm.model_name))
            .collect();

        Self {
            info,
            stat_info,
            results,
        }
    }

    /// Judged records as they were persisted, in report order
    pub fn judged_records(&self) -> EvalResult<Vec<JudgedRecord>> {
        self.results
            .iter()
            .enumerate()
            .map(|(index, entry)| JudgedRecord::from_entry(index, entry, &self.info.llm.model_name))
            .collect()
    }
}

mod report_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, FORMAT).map_err(D::Error::custom)
    }
}
