//! Route file ingest.
//!
//! The route file is a JSON array of `{"source": ..., "target": ...}` objects.
//! When no path is given, `config.json` in the working directory is used if it
//! exists; otherwise an example file is written and loaded.

use std::path::{Path, PathBuf};

use crate::error::{RedirectError, Result};
use crate::table::{LoadReport, RouteEntry, RoutingTable};

pub const DEFAULT_ROUTES_FILE: &str = "config.json";
pub const EXAMPLE_ROUTES_FILE: &str = "config-example.json";

/// Routes written to the example file.
pub fn example_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new("example.local", "https://www.google.com"),
        RouteEntry::new("api.local", "http://127.0.0.1:8080"),
    ]
}

/// Pick the route file to load, writing the example file into `dir` if needed.
pub fn discover(explicit: Option<&str>, dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    let default = dir.join(DEFAULT_ROUTES_FILE);
    if default.exists() {
        tracing::info!(path = %default.display(), "No route file given, using existing file");
        return Ok(default);
    }

    let example = dir.join(EXAMPLE_ROUTES_FILE);
    write_example(&example)?;
    tracing::info!(path = %example.display(), "Created example route file");
    Ok(example)
}

pub fn write_example(path: &Path) -> Result<()> {
    let routes_write = |source| RedirectError::RoutesWrite {
        path: path.display().to_string(),
        source,
    };
    let json = serde_json::to_vec_pretty(&example_routes())
        .map_err(|e| routes_write(std::io::Error::other(e)))?;
    std::fs::write(path, json).map_err(routes_write)
}

/// Read and parse a route file. Unreadable files and invalid JSON are errors.
pub fn read(path: &Path) -> Result<Vec<RouteEntry>> {
    let data = std::fs::read(path).map_err(|source| RedirectError::RoutesRead {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_slice(&data).map_err(|source| RedirectError::RoutesParse {
        path: path.display().to_string(),
        source,
    })
}

/// Read the route file and load it into the table in one batch.
pub fn ingest(path: &Path, table: &RoutingTable) -> Result<LoadReport> {
    let entries = read(path)?;
    let report = table.load(entries);

    tracing::info!(
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped.len(),
        "Route file loaded"
    );

    Ok(report)
}
