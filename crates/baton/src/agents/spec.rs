use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::errors::{ConfigError, WorkflowError, WorkflowResult};

/// One role in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    /// Execution order. Agents sharing a round keep their listed order.
    pub round: i64,
    pub system_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enable_web_search: bool,
    /// Agents whose outputs this one consumes. Empty means it works from the task.
    #[serde(default, deserialize_with = "null_as_default")]
    pub receives_messages_from: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub accepts_files: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub callable_tools: Vec<String>,
}

/// `null` reads the same as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn label(entry: &Value, index: usize) -> String {
    entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", index + 1))
}

fn has_required_fields(entry: &Value) -> bool {
    let name = entry.get("name").and_then(Value::as_str);
    let round = entry.get("round").and_then(Value::as_i64);
    let instruction = entry.get("system_instruction").and_then(Value::as_str);
    matches!(
        (name, round, instruction),
        (Some(name), Some(_), Some(instruction)) if !name.trim().is_empty() && !instruction.trim().is_empty()
    )
}

/// Keep the well formed agent definitions and order them by round.
///
/// Entries that are not objects, or whose `name`, `round` or `system_instruction` are
/// missing or of the wrong type, are dropped with a warning. Extra keys are ignored.
pub fn validate_config_list(
    entries: &[Value],
    source_desc: &str,
) -> Result<Vec<AgentSpec>, ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::Empty(source_desc.to_string()));
    }

    let mut specs = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_object() {
            tracing::warn!(source = source_desc, index, "skipping entry that is not an object");
            continue;
        }
        if !has_required_fields(entry) {
            tracing::warn!(
                source = source_desc,
                agent = %label(entry, index),
                "skipping agent: needs string 'name', integer 'round' and string 'system_instruction'"
            );
            continue;
        }
        match serde_json::from_value::<AgentSpec>(entry.clone()) {
            Ok(spec) => specs.push(spec),
            Err(e) => tracing::warn!(
                source = source_desc,
                agent = %label(entry, index),
                error = %e,
                "skipping agent with ill-typed fields"
            ),
        }
    }

    if specs.is_empty() {
        return Err(ConfigError::NoValidAgents(source_desc.to_string()));
    }
    if specs.len() < entries.len() {
        tracing::warn!(
            source = source_desc,
            dropped = entries.len() - specs.len(),
            "at least one agent definition was invalid"
        );
    }

    // sort_by_key is stable, so ties keep their listed order
    specs.sort_by_key(|spec| spec.round);
    Ok(specs)
}

/// Read an agent configuration file as raw JSON entries.
///
/// Workflow files are ordered by round on load. The generator file is left as written,
/// since only its first entry is used.
pub fn load_agent_config(path: &Path, is_generator: bool) -> Result<Vec<Value>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let data: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        source_desc: path.display().to_string(),
        source,
    })?;
    let Value::Array(mut entries) = data else {
        return Err(ConfigError::NotAList(path.display().to_string()));
    };

    if !is_generator {
        entries.sort_by_key(|entry| {
            entry
                .get("round")
                .and_then(Value::as_i64)
                .unwrap_or(i64::MAX)
        });
    }
    Ok(entries)
}

/// Load and validate a workflow file in one step
pub fn load_workflow(path: &Path, is_generator: bool) -> Result<Vec<AgentSpec>, ConfigError> {
    let entries = load_agent_config(path, is_generator)?;
    validate_config_list(&entries, &path.display().to_string())
}

fn strip_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Turn the generator's reply into raw agent entries.
///
/// One leading ```` ```json ```` or ```` ``` ```` fence and one trailing fence are removed
/// before parsing. The result must be a JSON array of objects.
pub fn parse_generator_output(text: &str) -> WorkflowResult<Vec<Value>> {
    let fail = |message: String| WorkflowError::GeneratorParse {
        message,
        raw_output: text.to_string(),
    };

    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(fail("the generator reply was empty after cleanup".to_string()));
    }

    let parsed: Value = serde_json::from_str(cleaned)
        .map_err(|e| fail(format!("the generator reply is not valid JSON: {}", e)))?;
    let Value::Array(entries) = parsed else {
        return Err(fail("the generator reply is not a JSON list".to_string()));
    };

    if let Some(bad) = entries.iter().find(|entry| !entry.is_object()) {
        let preview: String = bad.to_string().chars().take(100).collect();
        return Err(fail(format!(
            "the generator reply contains a non-object entry: {}",
            preview
        )));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_validate_drops_invalid_and_sorts_stably() {
        let entries = vec![
            json!({"name": "C", "round": 2, "system_instruction": "c"}),
            json!({"name": "A", "round": 1, "system_instruction": "a"}),
            json!("not an agent"),
            json!({"name": "Broken", "round": "1", "system_instruction": "x"}),
            json!({"round": 1, "system_instruction": "nameless"}),
            json!({"name": "B", "round": 1, "system_instruction": "b", "extra": true}),
            json!({"name": "BadTemp", "round": 1, "system_instruction": "t", "temperature": "hot"}),
        ];

        let specs = validate_config_list(&entries, "test").unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_validate_applies_defaults() {
        let specs = validate_config_list(
            &[json!({"name": "Solo", "round": 1, "system_instruction": "go"})],
            "test",
        )
        .unwrap();
        let spec = &specs[0];
        assert_eq!(spec.temperature, None);
        assert!(!spec.enable_web_search);
        assert!(!spec.accepts_files);
        assert!(spec.receives_messages_from.is_empty());
        assert!(spec.callable_tools.is_empty());
    }

    #[test]
    fn test_validate_treats_null_optionals_as_defaults() {
        let entries = vec![
            json!({"name": "A", "round": 1, "system_instruction": "a",
                   "receives_messages_from": null, "accepts_files": null}),
            json!({"name": "B", "round": 2, "system_instruction": "b",
                   "callable_tools": null, "enable_web_search": null,
                   "temperature": null, "description": null}),
            json!({"name": "C", "round": 3, "system_instruction": "c",
                   "receives_messages_from": ["A", "B"]}),
        ];

        let specs = validate_config_list(&entries, "generated workflow").unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(specs[0].receives_messages_from.is_empty());
        assert!(!specs[0].accepts_files);
        assert!(specs[1].callable_tools.is_empty());
        assert!(!specs[1].enable_web_search);
        assert_eq!(specs[1].temperature, None);
    }

    #[test]
    fn test_validate_errors() {
        assert!(matches!(
            validate_config_list(&[], "empty.json"),
            Err(ConfigError::Empty(_))
        ));
        assert!(matches!(
            validate_config_list(&[json!({"name": "x"})], "bad.json"),
            Err(ConfigError::NoValidAgents(_))
        ));
    }

    #[test]
    fn test_load_agent_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        fs::write(
            &path,
            r#"[{"name": "Late", "round": 3, "system_instruction": "l"},
                {"name": "Early", "round": 1, "system_instruction": "e"}]"#,
        )
        .unwrap();

        let sorted = load_agent_config(&path, false).unwrap();
        assert_eq!(sorted[0]["name"], "Early");
        let unsorted = load_agent_config(&path, true).unwrap();
        assert_eq!(unsorted[0]["name"], "Late");

        let specs = load_workflow(&path, false).unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn test_load_agent_config_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_agent_config(&missing, false),
            Err(ConfigError::FileNotFound(_))
        ));

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, "{ nope").unwrap();
        assert!(matches!(
            load_agent_config(&invalid, false),
            Err(ConfigError::Json { .. })
        ));

        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"name": "x"}"#).unwrap();
        assert!(matches!(
            load_agent_config(&object, false),
            Err(ConfigError::NotAList(_))
        ));
    }

    #[test]
    fn test_parse_generator_output_strips_fences() {
        let bare = r#"[{"name": "A", "round": 1, "system_instruction": "a"}]"#;
        let fenced = format!("```json\n{}\n```", bare);
        let plain_fence = format!("```\n{}\n```", bare);

        let expected = parse_generator_output(bare).unwrap();
        assert_eq!(parse_generator_output(&fenced).unwrap(), expected);
        assert_eq!(parse_generator_output(&plain_fence).unwrap(), expected);
        assert_eq!(strip_fences(strip_fences(&fenced)), strip_fences(&fenced));
    }

    #[test]
    fn test_parse_generator_output_round_trip() {
        let specs = vec![AgentSpec {
            name: "Planner".to_string(),
            round: 1,
            system_instruction: "Plan the work.".to_string(),
            description: Some("plans".to_string()),
            temperature: Some(0.3),
            enable_web_search: true,
            receives_messages_from: vec![],
            accepts_files: true,
            callable_tools: vec!["calculator".to_string()],
        }];
        let text = format!("```json\n{}\n```", serde_json::to_string_pretty(&specs).unwrap());

        let entries = parse_generator_output(&text).unwrap();
        let validated = validate_config_list(&entries, "generated").unwrap();
        assert_eq!(validated, specs);
    }

    #[test]
    fn test_parse_generator_output_errors() {
        for text in ["```json\n```", "not json", r#"{"name": "A"}"#, r#"[{"name": "A"}, 3]"#] {
            let err = parse_generator_output(text).unwrap_err();
            assert!(matches!(err, WorkflowError::GeneratorParse { .. }), "{}", text);
            assert_eq!(err.raw_output(), Some(text));
        }
    }
}
