//! Shell Command Steps
//!
//! Turns a declarative step definition into a [`Step`] that runs its
//! command through the shell:
//! - Placeholder substitution from the execution context
//! - `set -e` so the first failing command fails the step
//! - Trimmed stdout handed to the following step and kept as the result
//!
//! # Placeholders
//!
//! - `{args}` - all run arguments, space separated
//! - `{arg0}`, `{arg1}`, ... - a single run argument
//! - `{value}` - the run-scoped value
//! - `{previous}` - the value handed over by the previous step
//! - `{result}` - the current result
//! - `{error}` - the last captured failure
//!
//! Unknown placeholders are left untouched; missing values render empty.
//!
//! Substituted values are always shell-quoted for the position they land
//! in, so they reach the command as data and are never parsed as shell
//! code. A bare placeholder becomes one single-quoted word (`{args}` one
//! word per argument); inside `'...'` or `"..."` the value is escaped for
//! that quoting, so `echo '{previous}'` and `echo "got {arg0}"` both work.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, error, info};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::StepResult;
use crate::workflow::context::ExecutionContext;
use crate::workflow::definition::StepDefinition;
use crate::workflow::model::Step;

/// Environment variable overriding the shell used for command steps.
pub const SHELL_ENV: &str = "STEPCHAIN_SHELL";

/// Lazily-resolved shell binary.
pub static SHELL_PATH: Lazy<PathBuf> = Lazy::new(|| match std::env::var(SHELL_ENV) {
    Ok(shell) if !shell.trim().is_empty() => {
        info!("Using shell from {}: {}", SHELL_ENV, shell.trim());
        PathBuf::from(shell.trim())
    }
    _ => PathBuf::from("bash"),
});

/// Builds a step that runs `definition.command` through the shell.
pub fn shell_step(definition: &StepDefinition, working_dir: Option<&Path>) -> Step {
    let template = definition.command.clone();
    let continue_on_error = definition.continue_on_error;
    let cancel = definition.cancel;
    let throw_errors = definition.throw_errors;
    let working_dir = working_dir.map(Path::to_path_buf);

    Step::new(&definition.id, move |ctx| {
        ctx.set_continue_on_error(continue_on_error);
        if let Some(throw_errors) = throw_errors {
            ctx.set_throw_errors(throw_errors);
        }

        let command_text = render_command(&template, ctx);
        run_command(ctx, &command_text, working_dir.as_deref())?;

        if cancel {
            ctx.cancel();
        }
        Ok(())
    })
}

/// Quoting in effect at a position of a command template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Bare,
    Single,
    Double,
}

/// Resolves placeholders in `template` against the context.
pub fn render_command(template: &str, ctx: &ExecutionContext) -> String {
    let mut output = String::with_capacity(template.len());
    let mut quoting = Quoting::Bare;
    let mut escaped = false;
    let mut rest = template;

    while let Some(c) = rest.chars().next() {
        if c == '{' && !escaped {
            let replaced = rest
                .find('}')
                .and_then(|close| placeholder(&rest[1..close], ctx).map(|words| (words, close)));

            if let Some((words, close)) = replaced {
                output.push_str(&quote_words(&words, quoting));
                rest = &rest[close + 1..];
                continue;
            }
        }

        output.push(c);
        rest = &rest[c.len_utf8()..];

        if escaped {
            escaped = false;
            continue;
        }
        match (quoting, c) {
            (Quoting::Bare, '\\') | (Quoting::Double, '\\') => escaped = true,
            (Quoting::Bare, '\'') => quoting = Quoting::Single,
            (Quoting::Bare, '"') => quoting = Quoting::Double,
            (Quoting::Single, '\'') | (Quoting::Double, '"') => quoting = Quoting::Bare,
            _ => {}
        }
    }

    output
}

fn placeholder(name: &str, ctx: &ExecutionContext) -> Option<Vec<String>> {
    let words = match name {
        "args" => ctx.arguments().iter().map(value_text).collect(),
        "value" => vec![ctx.value().map(value_text).unwrap_or_default()],
        "previous" => vec![ctx.previous_value().map(value_text).unwrap_or_default()],
        "result" => vec![ctx.result().map(value_text).unwrap_or_default()],
        "error" => vec![ctx
            .last_error()
            .map(|failure| failure.cause().to_string())
            .unwrap_or_default()],
        _ => {
            let index: usize = name.strip_prefix("arg")?.parse().ok()?;
            vec![ctx.argument(index).map(value_text).unwrap_or_default()]
        }
    };
    Some(words)
}

/// Quotes substituted words so the shell reads them as literal data.
fn quote_words(words: &[String], quoting: Quoting) -> String {
    match quoting {
        Quoting::Bare => words
            .iter()
            .map(|word| format!("'{}'", word.replace('\'', r"'\''")))
            .collect::<Vec<_>>()
            .join(" "),
        Quoting::Single => words.join(" ").replace('\'', r"'\''"),
        Quoting::Double => {
            let joined = words.join(" ");
            let mut escaped = String::with_capacity(joined.len());
            for c in joined.chars() {
                if matches!(c, '\\' | '"' | '$' | '`') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped
        }
    }
}

/// Renders a value as plain text; strings are taken without JSON quotes.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn run_command(ctx: &mut ExecutionContext, command_text: &str, working_dir: Option<&Path>) -> StepResult {
    let step_name = ctx.step_name().to_string();

    let mut cmd = Command::new(&*SHELL_PATH);
    cmd.arg("-c").arg(format!("set -e\n{}", command_text));

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
        debug!("Executing in directory: {}", dir.display());
    }

    debug!("Step '{}' command: {}", step_name, command_text);
    let output = cmd
        .output()
        .map_err(|e| format!("failed to start {}: {}", SHELL_PATH.display(), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();

    if output.status.success() {
        if !stdout.is_empty() {
            debug!("Step '{}' output:\n{}", step_name, stdout);
            ctx.set_next_value(stdout);
            ctx.set_result(stdout);
        }
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "Step '{}' exited with code: {:?}",
            step_name,
            output.status.code()
        );
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr.trim());
        }

        let detail = stderr.trim().lines().last().unwrap_or("").to_string();
        match (output.status.code(), detail.is_empty()) {
            (Some(code), true) => Err(format!("command exited with code {}", code).into()),
            (Some(code), false) => Err(format!("command exited with code {}: {}", code, detail).into()),
            (None, _) => Err("command terminated by signal".into()),
        }
    }
}
