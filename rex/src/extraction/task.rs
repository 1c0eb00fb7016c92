//! Extraction domain types and task building
//!
//! A run works on reports (uploaded text documents) crossed with JSON
//! schemas. Each unsatisfied report×schema pair becomes one immutable task;
//! results are merged back into the owning report by the caller, never by
//! the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One uploaded text report and everything extracted from it so far
#[derive(Debug, Clone)]
pub struct Report {
    pub id: Uuid,
    pub name: String,
    pub content: Arc<str>,
    pub extractions: Vec<Extraction>,
}

impl Report {
    pub fn new(name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            content: content.into(),
            extractions: Vec::new(),
        }
    }
}

/// Extracted data for one schema of one report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub schema_id: usize,
    pub data: Value,
}

impl Extraction {
    /// An extraction counts as satisfied once it carries at least one field
    pub fn has_data(&self) -> bool {
        self.data.as_object().is_some_and(|obj| !obj.is_empty())
    }
}

/// One unit of work: a report×schema pair plus call context.
///
/// Immutable; shares the heavyweight pieces so building hundreds of tasks
/// stays cheap.
#[derive(Debug, Clone)]
pub struct ExtractionTask {
    pub report_id: Uuid,
    pub report_name: String,
    pub content: Arc<str>,
    pub schema_id: usize,
    pub schema: Arc<Value>,
    pub system_prompt: Arc<str>,
    pub model: Arc<str>,
}

/// Build tasks for every report×schema pair that has no extracted data yet
pub fn build_extraction_tasks(
    reports: &[Report],
    schemas: &[Arc<Value>],
    system_prompt: &Arc<str>,
    model: &Arc<str>,
) -> Vec<ExtractionTask> {
    let mut tasks = Vec::new();

    for report in reports {
        let satisfied: Vec<usize> = report
            .extractions
            .iter()
            .filter(|e| e.has_data())
            .map(|e| e.schema_id)
            .collect();

        for (schema_id, schema) in schemas.iter().enumerate() {
            if satisfied.contains(&schema_id) {
                continue;
            }
            tasks.push(ExtractionTask {
                report_id: report.id,
                report_name: report.name.clone(),
                content: Arc::clone(&report.content),
                schema_id,
                schema: Arc::clone(schema),
                system_prompt: Arc::clone(system_prompt),
                model: Arc::clone(model),
            });
        }
    }

    tasks
}

/// Snapshot of how far a run has progressed
#[derive(Debug, Default)]
pub struct ExtractionProgress {
    /// Satisfied extraction count per report
    pub per_report: HashMap<Uuid, usize>,
    /// Reports with every schema satisfied
    pub completed_reports: usize,
    /// Satisfied report×schema pairs
    pub completed_tasks: usize,
}

/// Count already-satisfied extractions across all reports
pub fn count_extraction_progress(reports: &[Report], schemas_count: usize) -> ExtractionProgress {
    let mut progress = ExtractionProgress::default();

    for report in reports {
        let extracted = report.extractions.iter().filter(|e| e.has_data()).count();
        progress.per_report.insert(report.id, extracted);
        if extracted == schemas_count && schemas_count > 0 {
            progress.completed_reports += 1;
        }
        progress.completed_tasks += extracted;
    }

    progress
}

/// Merge a task outcome into the owning report.
///
/// `data` is `None` when the task failed: the slot is still created so the
/// report records the attempt, but existing data is never overwritten by an
/// error.
pub fn update_report_with_extraction(report: &mut Report, schema_id: usize, data: Option<Value>) {
    let existing = report.extractions.iter_mut().find(|e| e.schema_id == schema_id);
    let entry = match existing {
        Some(entry) => entry,
        None => {
            report.extractions.push(Extraction {
                schema_id,
                data: Value::Object(Default::default()),
            });
            report.extractions.last_mut().unwrap()
        }
    };

    if let Some(data) = data {
        entry.data = data;
    }
}
