//! Breakpoint export (JSON).

use anyhow::{Context, Result};
use std::path::Path;

use crate::stage::BreakpointStage;

pub fn write_breakpoints(path: &Path, breakpoints: &BreakpointStage) -> Result<()> {
    let json = serde_json::to_string_pretty(breakpoints)
        .context("Failed to serialize breakpoints")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write breakpoints to {}", path.display()))?;
    Ok(())
}

pub fn read_breakpoints(path: &Path) -> Result<BreakpointStage> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read breakpoints from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed breakpoints file {}", path.display()))
}
