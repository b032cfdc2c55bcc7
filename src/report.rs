use crate::error::{EvalError, EvalResult};
use crate::label::LabelResult;
use crate::models::{JudgedRecord, Report};
use crate::stats::aggregate;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Report file name for `report` written at `at`:
/// `Eval_Judge_<model>_<dataset>_<count>_<YYYYMMDD_HHMMSS>.json`
pub fn output_file_name(report: &Report, at: NaiveDateTime) -> String {
    let name = format!(
        "Eval_Judge_{}_{}_{}_{}.json",
        report.info.llm.model_name,
        report.info.dataset,
        report.info.data_num,
        at.format("%Y%m%d_%H%M%S")
    );
    // Model names such as `org/model` must not introduce sub-directories
    name.replace(['/', '\\'], "_")
}

/// Persist `report` under `output_dir`, stamped with the current local time
pub fn write(report: &Report, output_dir: &Path) -> EvalResult<PathBuf> {
    write_at(report, output_dir, Local::now().naive_local())
}

/// Persist `report` under `output_dir` with the given timestamp.
///
/// The directory is created if needed. Content goes to a temporary file in
/// the same directory which is synced and then renamed onto the final name,
/// so the report either exists complete or not at all. The finished file is
/// world-readable like any other file in the results directory.
pub fn write_at(report: &Report, output_dir: &Path, at: NaiveDateTime) -> EvalResult<PathBuf> {
    let content = serialize_pretty(report)?;

    std::fs::create_dir_all(output_dir).map_err(|source| EvalError::io(output_dir, source))?;
    let path = output_dir.join(output_file_name(report, at));

    let mut temp_file = tempfile::Builder::new()
        .prefix(".Eval_Judge_")
        .suffix(".json.tmp")
        .tempfile_in(output_dir)
        .map_err(|source| EvalError::io(output_dir, source))?;

    temp_file
        .write_all(&content)
        .and_then(|()| make_readable(temp_file.as_file()))
        .and_then(|()| temp_file.as_file().sync_all())
        .map_err(|source| EvalError::io(temp_file.path(), source))?;

    temp_file
        .persist(&path)
        .map_err(|e| EvalError::io(&path, e.error))?;

    info!("Output saved to {}", path.display());
    Ok(path)
}

/// Load a previously written report
pub fn read(path: &Path) -> EvalResult<Report> {
    let content = std::fs::read_to_string(path).map_err(|source| EvalError::io(path, source))?;
    Ok(serde_json::from_str(&content)?)
}

/// Reload a report and check that its `stat_info` still matches what its
/// `results` aggregate to, and that every `judge_valid` flag agrees with the
/// stored judgment
pub fn verify(path: &Path) -> EvalResult<Report> {
    let report = read(path)?;
    let judged = report.judged_records()?;

    for (index, record) in judged.iter().enumerate() {
        if record.judge_valid != record.label().valid {
            return Err(EvalError::MalformedReport {
                index,
                message: format!(
                    "judge_valid is {} but judgment {:?} says otherwise",
                    record.judge_valid, record.judgment_result
                ),
            });
        }
    }

    let labels: Vec<LabelResult> = judged.iter().map(JudgedRecord::label).collect();
    let recomputed = aggregate(&labels)?;
    if recomputed != report.stat_info {
        return Err(EvalError::StatisticsMismatch {
            path: path.to_path_buf(),
            recorded: report.stat_info.clone(),
            recomputed,
        });
    }

    Ok(report)
}

// Temp files start out owner-only
#[cfg(unix)]
fn make_readable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn make_readable(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Pretty JSON with four-space indentation; non-ASCII text is kept as is
fn serialize_pretty(report: &Report) -> EvalResult<Vec<u8>> {
    let mut content = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut content, formatter);
    report.serialize(&mut serializer)?;
    Ok(content)
}
