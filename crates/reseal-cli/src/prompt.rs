//! Collection of positional arguments that were left off the command line.

use std::io::{self, IsTerminal};

use anyhow::anyhow;
use dialoguer::Input;

use crate::client::{CliError, CliResult};

/// A required value that may be prompted for.
pub(crate) struct PromptField {
    pub(crate) label: &'static str,
    pub(crate) argument: &'static str,
}

pub(crate) const KMS_KEY_ID: PromptField = PromptField {
    label: "KMS key id",
    argument: "KMS_KEY_ID",
};

pub(crate) const INSTANCE_ID: PromptField = PromptField {
    label: "Instance id",
    argument: "INSTANCE_ID",
};

/// Use the supplied value, or ask for it when stdin is a terminal.
pub(crate) fn resolve_value(provided: Option<String>, field: &PromptField) -> CliResult<String> {
    resolve_with(provided, field, io::stdin().is_terminal(), || {
        Input::<String>::new()
            .with_prompt(field.label)
            .interact_text()
            .map_err(|err| {
                CliError::failure(anyhow!(
                    "failed to read {} from stdin: {err}",
                    field.label
                ))
            })
    })
}

fn resolve_with<F>(
    provided: Option<String>,
    field: &PromptField,
    interactive: bool,
    ask: F,
) -> CliResult<String>
where
    F: FnOnce() -> CliResult<String>,
{
    let raw = match provided {
        Some(value) => value,
        None if interactive => ask()?,
        None => {
            return Err(CliError::validation(format!(
                "{} required; supply it as the {} argument when running non-interactively",
                field.label, field.argument
            )));
        }
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::validation(format!(
            "{} cannot be empty",
            field.label
        )));
    }
    Ok(trimmed.to_string())
}
