//! Questions the change detector cannot answer on its own.
//!
//! A [`MigrationQuestioner`] decides whether an app without migrations gets
//! an initial migration and whether a removed field plus an added field of the
//! same shape is really a rename.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};

/// Resolves ambiguous decisions during change detection.
pub trait MigrationQuestioner {
    /// Should an initial migration be created for an app without migrations?
    fn ask_initial(&mut self, app_label: &str) -> bool;

    /// Was `model.old_name` renamed to `model.new_name`?
    fn ask_rename(&mut self, model_name: &str, old_name: &str, new_name: &str, field_type: &str)
        -> bool;
}

/// Prompts a human for every rename, reading `y/N` answers from `input`.
pub struct InteractiveQuestioner<R, W> {
    input: R,
    output: W,
    specified_apps: BTreeSet<String>,
}

impl<R: BufRead, W: Write> InteractiveQuestioner<R, W> {
    /// Creates a questioner that prompts on `output` and reads from `input`.
    pub fn new(input: R, output: W, specified_apps: BTreeSet<String>) -> Self {
        Self {
            input,
            output,
            specified_apps,
        }
    }

    fn boolean_input(&mut self, question: &str) -> bool {
        if write!(self.output, "{question} [y/N] ").is_err() || self.output.flush().is_err() {
            return false;
        }
        loop {
            let mut answer = String::new();
            match self.input.read_line(&mut answer) {
                Ok(0) => return false,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Could not read answer: {e}");
                    return false;
                }
            }
            match answer.trim().to_lowercase().as_str() {
                "" | "n" | "no" => return false,
                "y" | "yes" => return true,
                _ => {
                    if write!(self.output, "Please answer yes or no: ").is_err()
                        || self.output.flush().is_err()
                    {
                        return false;
                    }
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> MigrationQuestioner for InteractiveQuestioner<R, W> {
    fn ask_initial(&mut self, app_label: &str) -> bool {
        self.specified_apps.contains(app_label)
    }

    fn ask_rename(
        &mut self,
        model_name: &str,
        old_name: &str,
        new_name: &str,
        field_type: &str,
    ) -> bool {
        self.boolean_input(&format!(
            "Was {model_name}.{old_name} renamed to {model_name}.{new_name} (a {field_type})?"
        ))
    }
}

/// Answers every question with a fixed default and logs its choices.
#[derive(Debug, Clone, Default)]
pub struct NonInteractiveQuestioner {
    specified_apps: BTreeSet<String>,
    verbosity: u8,
}

impl NonInteractiveQuestioner {
    /// Creates a questioner that treats `specified_apps` as initial apps.
    pub const fn new(specified_apps: BTreeSet<String>, verbosity: u8) -> Self {
        Self {
            specified_apps,
            verbosity,
        }
    }
}

impl MigrationQuestioner for NonInteractiveQuestioner {
    fn ask_initial(&mut self, app_label: &str) -> bool {
        self.specified_apps.contains(app_label)
    }

    fn ask_rename(
        &mut self,
        model_name: &str,
        old_name: &str,
        new_name: &str,
        _field_type: &str,
    ) -> bool {
        if self.verbosity >= 1 {
            tracing::info!(
                "Not renaming {model_name}.{old_name} to {model_name}.{new_name}: \
                 treating it as a removal and an addition"
            );
        }
        false
    }
}
