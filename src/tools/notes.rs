//! 客服备注工具：`add_customer_note` / `get_recent_notes`

use crate::error::{Result, ToolError};
use crate::memory::NotesStore;
use crate::memory::notes::DEFAULT_RECENT_LIMIT;
use crate::tools::{Tool, ToolParameters, ToolResult, required_str};
use serde_json::{Value, json};
use std::sync::Arc;

pub const ADD_NOTE: &str = "add_customer_note";
pub const RECENT_NOTES: &str = "get_recent_notes";

pub struct AddNoteTool {
    store: Arc<NotesStore>,
}

impl AddNoteTool {
    pub fn new(store: Arc<NotesStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for AddNoteTool {
    fn name(&self) -> &str {
        ADD_NOTE
    }

    fn description(&self) -> &str {
        "Add a note about customer interactions, preferences, or issues. Args: content (the note text), category (optional: type of note)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The note text"
                },
                "category": {
                    "type": "string",
                    "description": "Type of note, e.g. preference, issue, feedback (default: general)"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let content = required_str(&parameters, "content")?;
        let category = parameters.get("category").and_then(Value::as_str);
        Ok(ToolResult::success(self.store.add_note(content, category).await?))
    }
}

pub struct RecentNotesTool {
    store: Arc<NotesStore>,
}

impl RecentNotesTool {
    pub fn new(store: Arc<NotesStore>) -> Self {
        Self { store }
    }
}

/// `limit` 可以是数字或数字字符串，必须 ≥ 1
fn parse_limit(parameters: &ToolParameters) -> Result<usize> {
    let invalid = |message: String| ToolError::InvalidParameter {
        name: "limit".to_string(),
        message,
    };
    let limit = match parameters.get("limit") {
        None | Some(Value::Null) => return Ok(DEFAULT_RECENT_LIMIT),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid(format!("expected a positive integer, got {n}")))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(format!("expected a positive integer, got {s:?}")))?,
        Some(other) => return Err(invalid(format!("expected a positive integer, got {other}")).into()),
    };
    if limit == 0 {
        return Err(invalid("limit must be at least 1".to_string()).into());
    }
    Ok(limit as usize)
}

#[async_trait::async_trait]
impl Tool for RecentNotesTool {
    fn name(&self) -> &str {
        RECENT_NOTES
    }

    fn description(&self) -> &str {
        "Retrieve recent customer service notes. Args: limit (optional: number of notes to retrieve, default 5)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of notes to retrieve (default 5)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let limit = parse_limit(&parameters)?;
        Ok(ToolResult::success(self.store.get_recent_notes(limit).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SupportError;
    use crate::memory::notes::NO_NOTES;
    use std::collections::HashMap;

    fn params(pairs: &[(&str, Value)]) -> ToolParameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_add_and_recall_through_tools() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(NotesStore::new(dir.path().join("customer_notes.txt"))?);
        let add = AddNoteTool::new(store.clone());
        let recent = RecentNotesTool::new(store);

        let empty = recent.execute(HashMap::new()).await?;
        assert_eq!(empty.output, NO_NOTES);

        let saved = add
            .execute(params(&[
                ("content", json!("Customer prefers email contact")),
                ("category", json!("preference")),
            ]))
            .await?;
        assert_eq!(saved.output, "Note saved successfully: Customer prefers email contact");

        let listed = recent.execute(params(&[("limit", json!("1"))])).await?;
        assert!(listed.output.ends_with("(preference): Customer prefers email contact"));
        Ok(())
    }

    #[test]
    fn test_limit_parsing() {
        assert_eq!(parse_limit(&HashMap::new()).unwrap(), 5);
        assert_eq!(parse_limit(&params(&[("limit", json!(2))])).unwrap(), 2);
        assert_eq!(parse_limit(&params(&[("limit", json!(" 3 "))])).unwrap(), 3);
        for bad in [json!(0), json!(-1), json!(1.5), json!("many"), json!([1])] {
            assert!(
                matches!(
                    parse_limit(&params(&[("limit", bad.clone())])),
                    Err(SupportError::Tool(ToolError::InvalidParameter { .. }))
                ),
                "应拒绝 {bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(NotesStore::new(dir.path().join("n.txt")).unwrap());
        let err = AddNoteTool::new(store).execute(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SupportError::Tool(ToolError::MissingParameter(_))));
    }
}
