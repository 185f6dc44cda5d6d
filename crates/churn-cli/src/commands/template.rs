//! Printing an input template

use anyhow::{Context, Result};
use churn_core::{Column, REQUIRED_COLUMNS};
use std::path::Path;

use crate::output::print_success;

/// Header line listing the id column and every required column
pub fn header() -> String {
    std::iter::once(Column::Id)
        .chain(REQUIRED_COLUMNS)
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(",")
}

/// Header plus one illustrative row
pub fn template() -> String {
    format!("{}\n1001,1,0,2.5,0.8,0,45.2,4.1,0\n", header())
}

/// Print the template, or write it to `output`
pub fn run(output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, template())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("Template written to {}", path.display()));
        }
        None => print!("{}", template()),
    }
    Ok(())
}
