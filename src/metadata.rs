use crate::error::{ExtractError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Raw `image inspect` payload, as reported by the runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInspect {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default, rename = "RepoTags")]
    pub repo_tags: Option<Vec<String>>,
    #[serde(default, rename = "Created")]
    pub created: Option<String>,
    #[serde(default, rename = "Author")]
    pub author: Option<String>,
    #[serde(default, rename = "Os")]
    pub os: String,
    #[serde(default, rename = "Architecture")]
    pub architecture: String,
    #[serde(default, rename = "Size")]
    pub size: u64,
    #[serde(default, rename = "Config")]
    pub config: Option<InspectConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InspectConfig {
    #[serde(default, rename = "User")]
    pub user: Option<String>,
    #[serde(default, rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(default, rename = "ExposedPorts")]
    pub exposed_ports: Option<BTreeMap<String, Value>>,
    #[serde(default, rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, rename = "Entrypoint")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, rename = "WorkingDir")]
    pub working_dir: Option<String>,
}

impl ImageInspect {
    /// Parses the JSON array printed by `docker image inspect`.
    pub fn from_inspect_output(output: &str) -> Result<Self> {
        let mut images: Vec<ImageInspect> = serde_json::from_str(output)?;
        if images.is_empty() {
            return Err(ExtractError::InvalidResponse(
                "image inspect returned an empty list".to_string(),
            ));
        }
        Ok(images.swap_remove(0))
    }
}

/// One image build step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerRecord {
    pub created_by: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Remaining runtime fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerRecord {
    /// Parses one `docker history --format '{{json .}}'` line.
    ///
    /// Both the CLI shape (`CreatedAt` RFC 3339, `Size` as a string) and the
    /// Engine API shape (`Created` epoch seconds, numeric `Size`) are accepted.
    pub fn from_history_json(line: &str) -> Result<Self> {
        let mut fields: Map<String, Value> = serde_json::from_str(line)?;

        let created_by = match fields.remove("CreatedBy") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => {
                return Err(ExtractError::InvalidResponse(format!(
                    "unexpected CreatedBy value: {other}"
                )))
            }
        };
        let size = size_field(fields.remove("Size"))?;

        let created = fields
            .get("CreatedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                fields
                    .get("Created")
                    .and_then(Value::as_i64)
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            });

        Ok(Self {
            created_by,
            size,
            created,
            extra: fields,
        })
    }

    /// Build instruction with the shell wrapper stripped.
    pub fn instruction(&self) -> String {
        self.created_by
            .strip_prefix("/bin/sh -c #(nop) ")
            .or_else(|| self.created_by.strip_prefix("/bin/sh -c "))
            .map(str::trim_start)
            .unwrap_or(self.created_by.as_str())
            .to_string()
    }

    pub fn is_empty_layer(&self) -> bool {
        self.size == 0
    }
}

fn size_field(value: Option<Value>) -> Result<u64> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => Ok(n.as_u64().unwrap_or(0)),
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| {
            ExtractError::InvalidResponse(format!(
                "layer size is not a byte count: {s:?} (was --human=false passed?)"
            ))
        }),
        Some(other) => Err(ExtractError::InvalidResponse(format!(
            "unexpected layer size: {other}"
        ))),
    }
}

/// Parses the full line-delimited history output, newest layer first.
pub fn parse_history_output(output: &str) -> Result<Vec<LayerRecord>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(LayerRecord::from_history_json)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub image_id: String,
    pub author: Option<String>,
    pub os: String,
    pub architecture: String,
    pub size: u64,
    pub user: Option<String>,
    pub exposed_ports: Vec<String>,
    pub env_vars: Vec<String>,
    pub history: Vec<LayerRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repo_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl ImageMetadata {
    pub fn from_inspect(inspect: ImageInspect, history: Vec<LayerRecord>) -> Self {
        let config = inspect.config.unwrap_or_default();

        Self {
            image_id: inspect.id,
            author: non_empty(inspect.author),
            os: inspect.os,
            architecture: inspect.architecture,
            size: inspect.size,
            user: non_empty(config.user),
            exposed_ports: config
                .exposed_ports
                .map(|ports| ports.into_keys().collect())
                .unwrap_or_default(),
            env_vars: config.env.unwrap_or_default(),
            history,
            repo_tags: inspect.repo_tags.unwrap_or_default(),
            created: non_empty(inspect.created),
            cmd: config.cmd,
            entrypoint: config.entrypoint,
            working_dir: non_empty(config.working_dir),
        }
    }

    /// Human-readable report of the image, used by the CLI.
    pub fn render_markdown(&self) -> String {
        let mut markdown = String::new();

        markdown.push_str(&format!("# Image: {}\n\n", self.image_id));

        markdown.push_str("## Basic Information\n\n");
        markdown.push_str(&format!("- **ID**: `{}`\n", self.image_id));
        if !self.repo_tags.is_empty() {
            markdown.push_str(&format!("- **Tags**: {}\n", self.repo_tags.join(", ")));
        }
        if let Some(created) = &self.created {
            markdown.push_str(&format!("- **Created**: {}\n", created));
        }
        if let Some(author) = &self.author {
            markdown.push_str(&format!("- **Author**: {}\n", author));
        }
        markdown.push_str(&format!("- **OS/Arch**: {}/{}\n", self.os, self.architecture));
        markdown.push_str(&format!("- **Size**: {} bytes\n", self.size));
        markdown.push_str(&format!(
            "- **User**: {}\n",
            self.user.as_deref().unwrap_or("not set (defaults to root)")
        ));
        markdown.push('\n');

        markdown.push_str("## Container Configuration\n\n");

        if !self.env_vars.is_empty() {
            markdown.push_str("### Environment Variables\n\n");
            markdown.push_str("```\n");
            for env in &self.env_vars {
                markdown.push_str(&format!("{}\n", env));
            }
            markdown.push_str("```\n\n");
        }

        if let Some(cmd) = &self.cmd {
            markdown.push_str("### Command\n\n");
            markdown.push_str(&format!("```\n{}\n```\n\n", cmd.join(" ")));
        }

        if let Some(entrypoint) = &self.entrypoint {
            markdown.push_str("### Entrypoint\n\n");
            markdown.push_str(&format!("```\n{}\n```\n\n", entrypoint.join(" ")));
        }

        if let Some(working_dir) = &self.working_dir {
            markdown.push_str(&format!("### Working Directory\n\n`{}`\n\n", working_dir));
        }

        if !self.exposed_ports.is_empty() {
            markdown.push_str("### Exposed Ports\n\n");
            for port in &self.exposed_ports {
                markdown.push_str(&format!("- `{}`\n", port));
            }
            markdown.push('\n');
        }

        if !self.history.is_empty() {
            markdown.push_str("## Layer History\n\n");
            markdown.push_str("| Created | Command | Size | Empty |\n");
            markdown.push_str("|---------|---------|------|-------|\n");

            for layer in &self.history {
                let created = layer
                    .created
                    .map(|c| c.to_rfc3339())
                    .unwrap_or_default();
                // Pipes would break the table.
                let command = layer.instruction().replace('|', "\\|");
                markdown.push_str(&format!(
                    "| {} | `{}` | {} | {} |\n",
                    created,
                    command,
                    layer.size,
                    layer.is_empty_layer()
                ));
            }
            markdown.push('\n');
        }

        markdown
    }
}
