//! Definition Parser
//!
//! Handles loading and saving chain definitions as YAML.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::workflow::definition::ChainDefinition;
use crate::workflow::validator::validate_definition;

/// Loads and validates a chain definition from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use stepchain::workflow::load_definition;
///
/// fn main() -> Result<(), stepchain::Error> {
///     let definition = load_definition("chain.yaml")?;
///     println!("Loaded {} steps", definition.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_definition(path: impl AsRef<Path>) -> Result<ChainDefinition> {
    let path = path.as_ref();
    info!("Loading chain definition from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());
    parse_definition(&yaml_content)
}

/// Parses and validates a chain definition from YAML text.
pub fn parse_definition(yaml_content: &str) -> Result<ChainDefinition> {
    let mut definition: ChainDefinition = serde_yaml::from_str(yaml_content)?;

    for step in &mut definition.steps {
        step.id = step.id.trim().to_string();
    }

    info!(
        "Parsed {} steps (contract: {})",
        definition.steps.len(),
        definition.contract.as_deref().unwrap_or("<default>")
    );

    validate_definition(&definition)?;
    Ok(definition)
}

/// Saves a chain definition to a YAML file.
pub fn save_definition(definition: &ChainDefinition, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let yaml_content = serde_yaml::to_string(definition)?;
    fs::write(path, yaml_content).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!("Chain definition saved to: {}", path.display());
    Ok(())
}
