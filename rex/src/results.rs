//! Result processing: combining per-report extractions into flat rows,
//! CSV conversion, and run provenance.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::extraction::Report;

/// How a results document was produced
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    #[serde(rename = "startedAtTime")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "endedAtTime")]
    pub ended_at: DateTime<Utc>,

    #[serde(rename = "chatCompletionsEndpoint")]
    pub endpoint: String,

    #[serde(rename = "modelName")]
    pub model: String,
}

/// Combined extraction output written to disk
#[derive(Debug, Serialize)]
pub struct ResultsDocument {
    pub provenance: Provenance,
    pub data: Vec<Value>,
}

/// Flatten every report with extractions into one row carrying the file name
/// plus the merged fields from all of its schemas
pub fn combine_extracted_data(reports: &[Report]) -> Vec<Value> {
    reports
        .iter()
        .filter(|report| !report.extractions.is_empty())
        .map(|report| {
            let mut row = serde_json::Map::new();
            row.insert("fileName".to_string(), Value::String(report.name.clone()));
            for extraction in &report.extractions {
                if let Some(fields) = extraction.data.as_object() {
                    for (key, value) in fields {
                        row.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(row)
        })
        .collect()
}

/// Union of row keys, fileName first
pub fn data_headers(rows: &[Value]) -> Vec<String> {
    let mut headers = vec!["fileName".to_string()];
    for row in rows {
        if let Some(fields) = row.as_object() {
            for key in fields.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
    }
    headers
}

/// Render rows as CSV with quoted, escaped cells. Nested values are
/// JSON-encoded.
pub fn convert_to_csv(rows: &[Value]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let headers = data_headers(rows);
    let header_line = headers
        .iter()
        .map(|h| format!("\"{}\"", h.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",");

    let mut lines = vec![header_line];
    for row in rows {
        let cells = headers
            .iter()
            .map(|header| csv_cell(row.get(header)))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(cells);
    }

    lines.join("\n")
}

fn csv_cell(value: Option<&Value>) -> String {
    let raw = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Array(_) | Value::Object(_))) => v.to_string(),
        Some(other) => other.to_string(),
    };
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::Extraction;
    use serde_json::json;

    fn report_with(name: &str, extractions: Vec<Extraction>) -> Report {
        let mut report = Report::new(name, "content");
        report.extractions = extractions;
        report
    }

    #[test]
    fn test_combine_merges_schema_fields() {
        let reports = vec![
            report_with(
                "01.txt",
                vec![
                    Extraction {
                        schema_id: 0,
                        data: json!({"diagnosis": "IDC"}),
                    },
                    Extraction {
                        schema_id: 1,
                        data: json!({"grade": 2}),
                    },
                ],
            ),
            report_with("02.txt", vec![]),
        ];

        let rows = combine_extracted_data(&reports);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["fileName"], "01.txt");
        assert_eq!(rows[0]["diagnosis"], "IDC");
        assert_eq!(rows[0]["grade"], 2);
    }

    #[test]
    fn test_combine_keeps_rows_with_empty_data() {
        let reports = vec![report_with(
            "01.txt",
            vec![Extraction {
                schema_id: 0,
                data: json!({}),
            }],
        )];

        let rows = combine_extracted_data(&reports);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_csv_headers_and_escaping() {
        let rows = vec![
            json!({"fileName": "01.txt", "diagnosis": "said \"IDC\"", "grade": 2}),
            json!({"fileName": "02.txt", "markers": ["ER", "PR"]}),
        ];

        let csv = convert_to_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"fileName\""));
        assert!(lines[0].contains("\"diagnosis\""));
        assert!(lines[0].contains("\"markers\""));
        assert!(lines[1].contains("\"said \"\"IDC\"\"\""));
        // Missing cells are empty, nested values JSON-encoded.
        assert!(lines[2].contains("\"[\"\"ER\"\",\"\"PR\"\"]\""));
        assert!(lines[1].ends_with("\"\"") || lines[1].contains(",\"\","));
    }

    #[test]
    fn test_csv_empty_rows() {
        assert_eq!(convert_to_csv(&[]), "");
    }

    #[test]
    fn test_provenance_serializes_with_original_field_names() {
        let provenance = Provenance {
            started_at: Utc::now(),
            ended_at: Utc::now(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
        };

        let value = serde_json::to_value(&provenance).unwrap();
        assert!(value.get("startedAtTime").is_some());
        assert!(value.get("endedAtTime").is_some());
        assert!(value.get("chatCompletionsEndpoint").is_some());
        assert!(value.get("modelName").is_some());
    }
}
