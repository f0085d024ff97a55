//! Edge and service-frequency inputs.
//!
//! The controller only sees the [`EdgeSource`] and [`ServiceSource`] traits;
//! the CSV implementations here read header-keyed files such as
//!
//! ```text
//! start,end
//! frontend,checkout
//! checkout,payment
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::DataSourceError;
use crate::types::{Edge, ServiceRecord};

/// Produces the call edges of the mesh.
#[async_trait]
pub trait EdgeSource: Send + Sync {
    async fn load_edges(&self) -> Result<Vec<Edge>, DataSourceError>;
}

/// Produces service records, most frequently called first.
#[async_trait]
pub trait ServiceSource: Send + Sync {
    async fn load_services(&self) -> Result<Vec<ServiceRecord>, DataSourceError>;
}

/// One parsed CSV row, keyed by header name.
type Row = HashMap<String, String>;

/// Parse header-keyed CSV content. Blank lines are skipped; quoting is limited
/// to stripping surrounding double quotes from each field.
fn parse_csv(path: &Path, content: &str) -> Result<Vec<(usize, Row)>, DataSourceError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines.next().ok_or_else(|| DataSourceError::Empty {
        path: path.to_path_buf(),
    })?;
    let columns: Vec<String> = split_fields(header_line);

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let fields = split_fields(line);
        if fields.len() != columns.len() {
            return Err(DataSourceError::Malformed {
                path: path.to_path_buf(),
                line: line_no,
                message: format!(
                    "expected {} fields, found {}",
                    columns.len(),
                    fields.len()
                ),
            });
        }
        rows.push((line_no, columns.iter().cloned().zip(fields).collect()));
    }
    Ok(rows)
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect()
}

async fn read_rows(path: &Path) -> Result<Vec<(usize, Row)>, DataSourceError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DataSourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_csv(path, &content)
}

fn require_column(
    path: &Path,
    rows: &[(usize, Row)],
    column: &str,
) -> Result<(), DataSourceError> {
    match rows.first() {
        Some((_, row)) if !row.contains_key(column) => Err(DataSourceError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        }),
        _ => Ok(()),
    }
}

fn non_empty_field(
    path: &Path,
    line: usize,
    row: &Row,
    column: &str,
) -> Result<String, DataSourceError> {
    match row.get(column) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(DataSourceError::Malformed {
            path: path.to_path_buf(),
            line,
            message: format!("empty '{}' field", column),
        }),
    }
}

// ---------------------------------------------------------------------------
// CsvEdgeSource
// ---------------------------------------------------------------------------

/// Call edges from a CSV file with `start` and `end` columns.
#[derive(Debug, Clone)]
pub struct CsvEdgeSource {
    pub path: PathBuf,
}

impl CsvEdgeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EdgeSource for CsvEdgeSource {
    async fn load_edges(&self) -> Result<Vec<Edge>, DataSourceError> {
        let rows = read_rows(&self.path).await?;
        require_column(&self.path, &rows, "start")?;
        require_column(&self.path, &rows, "end")?;

        rows.iter()
            .map(|(line, row)| {
                Ok(Edge {
                    start: non_empty_field(&self.path, *line, row, "start")?,
                    end: non_empty_field(&self.path, *line, row, "end")?,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CsvServiceSource
// ---------------------------------------------------------------------------

/// Service records from a CSV file with a `service` column and an optional
/// `count` column.
#[derive(Debug, Clone)]
pub struct CsvServiceSource {
    pub path: PathBuf,
}

impl CsvServiceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ServiceSource for CsvServiceSource {
    async fn load_services(&self) -> Result<Vec<ServiceRecord>, DataSourceError> {
        let rows = read_rows(&self.path).await?;
        require_column(&self.path, &rows, "service")?;

        rows.iter()
            .map(|(line, row)| {
                let service = non_empty_field(&self.path, *line, row, "service")?;
                let count = match row.get("count").filter(|c| !c.is_empty()) {
                    Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                        DataSourceError::Malformed {
                            path: self.path.clone(),
                            line: *line,
                            message: format!("invalid count '{}': {}", raw, e),
                        }
                    })?),
                    None => None,
                };
                Ok(ServiceRecord { service, count })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory sources
// ---------------------------------------------------------------------------

/// Fixed in-memory edges, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticEdgeSource(pub Vec<Edge>);

#[async_trait]
impl EdgeSource for StaticEdgeSource {
    async fn load_edges(&self) -> Result<Vec<Edge>, DataSourceError> {
        Ok(self.0.clone())
    }
}

/// Fixed in-memory service records, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticServiceSource(pub Vec<ServiceRecord>);

#[async_trait]
impl ServiceSource for StaticServiceSource {
    async fn load_services(&self) -> Result<Vec<ServiceRecord>, DataSourceError> {
        Ok(self.0.clone())
    }
}
