//! Information extraction core
//!
//! Turns reports × schemas into scheduler tasks, builds prompts, parses
//! fenced-JSON model output, and implements the per-task execution function
//! with its retry contract.

mod engine;
mod parser;
mod prompts;
mod task;

pub use engine::Extractor;
pub use parser::{extract_and_parse, extract_json_block, has_schema_properties, parse_json_block};
pub use prompts::{build_combined_prompt, build_developer_prompt, build_user_query};
pub use task::{
    Extraction, ExtractionProgress, ExtractionTask, Report, build_extraction_tasks,
    count_extraction_progress, update_report_with_extraction,
};
