use crate::error::{EvalError, EvalResult};
use crate::label::{Label, LabelResult};
use serde::{Deserialize, Serialize};

/// Accuracy statistics for one run, persisted as the report's `stat_info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(rename = "Valid_num")]
    pub valid_count: usize,
    #[serde(rename = "Correct_num")]
    pub correct_count: usize,
    #[serde(rename = "Incorrect_num")]
    pub incorrect_count: usize,
    /// Correct answers over all items, invalid judgments included in the denominator
    #[serde(rename = "Accuracy")]
    pub accuracy: f64,
}

/// Count labels and compute accuracy over the full input length
pub fn aggregate(labels: &[LabelResult]) -> EvalResult<Statistics> {
    if labels.is_empty() {
        return Err(EvalError::EmptyDataset);
    }

    let count = |wanted: Label| labels.iter().filter(|result| result.label == wanted).count();
    let correct_count = count(Label::Correct);
    let incorrect_count = count(Label::Incorrect);

    Ok(Statistics {
        valid_count: correct_count + incorrect_count,
        correct_count,
        incorrect_count,
        accuracy: correct_count as f64 / labels.len() as f64,
    })
}
