use serde::Deserialize;
use thiserror::Error;

/// Metadata parsed from one task directory, before it becomes a [`Task`].
///
/// Every field is optional in the source files; missing keys default to
/// empty values rather than failing the parse.
///
/// [`Task`]: crate::Task
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskMeta {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
}

/// A metadata file that could not be understood. Recorded as a refresh
/// diagnostic and skipped; never fatal to the run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("failed to parse task metadata at {path}: {reason}")]
pub struct ParseError {
    pub path: String,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// `task.toml` layout: task fields under `[task]`, authorship and
/// classification under `[metadata]`. Unknown keys are ignored.
#[derive(Deserialize, Default)]
struct TomlDoc {
    #[serde(default)]
    task: TomlTask,
    #[serde(default)]
    metadata: TomlMetadata,
}

#[derive(Deserialize, Default)]
struct TomlTask {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize, Default)]
struct TomlMetadata {
    author_name: Option<String>,
    difficulty: Option<String>,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// `task.yaml` layout: flat keys, with `instruction` standing in for a
/// description in the older benchmarks.
#[derive(Deserialize, Default)]
struct YamlDoc {
    title: Option<String>,
    description: Option<String>,
    instruction: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    author_name: Option<String>,
    difficulty: Option<String>,
    category: Option<String>,
}

/// Parse a `task.toml`, folding in the sibling `instruction.md` contents
/// when the document carries no description of its own.
pub fn parse_toml(
    path: &str,
    raw: &str,
    instruction: Option<&str>,
) -> Result<TaskMeta, ParseError> {
    let doc: TomlDoc =
        toml::from_str(raw).map_err(|err| ParseError::new(path, err.to_string()))?;
    let description = doc
        .task
        .description
        .filter(|text| !text.trim().is_empty())
        .or_else(|| instruction.map(str::to_string))
        .unwrap_or_default();
    let mut tags = doc.task.tags;
    tags.extend(doc.metadata.tags);
    Ok(TaskMeta {
        title: doc.task.title.unwrap_or_default(),
        description,
        tags: normalize_tags(tags),
        author: normalize_opt(doc.metadata.author_name),
        difficulty: normalize_opt(doc.metadata.difficulty),
        category: normalize_opt(doc.metadata.category),
    })
}

/// Parse a `task.yaml` document.
pub fn parse_yaml(path: &str, raw: &str) -> Result<TaskMeta, ParseError> {
    let doc: YamlDoc =
        serde_yaml::from_str(raw).map_err(|err| ParseError::new(path, err.to_string()))?;
    let description = doc
        .description
        .filter(|text| !text.trim().is_empty())
        .or(doc.instruction)
        .unwrap_or_default();
    Ok(TaskMeta {
        title: doc.title.unwrap_or_default(),
        description,
        tags: normalize_tags(doc.tags),
        author: normalize_opt(doc.author_name),
        difficulty: normalize_opt(doc.difficulty),
        category: normalize_opt(doc.category),
    })
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn toml_with_all_fields() {
        let raw = r#"
            [task]
            title = "Authentication Flow"
            description = "Harden the login path."
            tags = ["auth", "security"]

            [metadata]
            author_name = "Ada"
            difficulty = "hard"
            category = "web"
            tags = ["security", "backend"]
        "#;
        let meta = parse_toml("tasks/fix-auth/task.toml", raw, None).expect("parse");
        assert_eq!(meta.title, "Authentication Flow");
        assert_eq!(meta.description, "Harden the login path.");
        assert_eq!(meta.tags, vec!["auth", "backend", "security"]);
        assert_eq!(meta.author.as_deref(), Some("Ada"));
        assert_eq!(meta.difficulty.as_deref(), Some("hard"));
        assert_eq!(meta.category.as_deref(), Some("web"));
    }

    #[test]
    fn toml_missing_keys_default_to_empty() {
        let meta = parse_toml("tasks/bare/task.toml", "", None).expect("parse");
        assert_eq!(meta, TaskMeta::default());
    }

    #[test]
    fn toml_description_falls_back_to_instruction_file() {
        let raw = "[task]\ntitle = \"Port scanner\"\n";
        let meta =
            parse_toml("tasks/scan/task.toml", raw, Some("Scan the subnet.")).expect("parse");
        assert_eq!(meta.description, "Scan the subnet.");
    }

    #[test]
    fn toml_inline_description_wins_over_instruction_file() {
        let raw = "[task]\ndescription = \"inline\"\n";
        let meta = parse_toml("tasks/x/task.toml", raw, Some("from file")).expect("parse");
        assert_eq!(meta.description, "inline");
    }

    #[test]
    fn toml_unknown_keys_are_ignored() {
        let raw = r#"
            schema_version = 3

            [task]
            title = "ok"

            [environment]
            docker_image = "ubuntu:24.04"
        "#;
        let meta = parse_toml("tasks/x/task.toml", raw, None).expect("parse");
        assert_eq!(meta.title, "ok");
    }

    #[test]
    fn toml_structural_garbage_is_a_parse_error() {
        let err = parse_toml("tasks/bad/task.toml", "title = [unclosed", None)
            .expect_err("should fail");
        assert_eq!(err.path, "tasks/bad/task.toml");
    }

    #[test]
    fn yaml_instruction_doubles_as_description() {
        let raw = "instruction: |\n  Fix the flaky test.\ntags: [ci, flaky]\nauthor_name: Grace\n";
        let meta = parse_yaml("tasks/flaky/task.yaml", raw).expect("parse");
        assert_eq!(meta.description.trim(), "Fix the flaky test.");
        assert_eq!(meta.tags, vec!["ci", "flaky"]);
        assert_eq!(meta.author.as_deref(), Some("Grace"));
    }

    #[test]
    fn yaml_empty_document_defaults() {
        let meta = parse_yaml("tasks/bare/task.yaml", "{}").expect("parse");
        assert_eq!(meta, TaskMeta::default());
    }

    #[test]
    fn yaml_wrong_shape_is_a_parse_error() {
        let err = parse_yaml("tasks/bad/task.yaml", "- just\n- a list\n").expect_err("fail");
        assert_eq!(err.path, "tasks/bad/task.yaml");
    }

    #[test]
    fn tags_are_trimmed_sorted_and_deduplicated() {
        let raw = "[task]\ntags = [\" zeta\", \"alpha\", \"zeta \", \"\"]\n";
        let meta = parse_toml("tasks/x/task.toml", raw, None).expect("parse");
        assert_eq!(meta.tags, vec!["alpha", "zeta"]);
    }
}
