//! Management command framework for replace-migrations.
//!
//! This module provides the [`ManagementCommand`] trait for defining CLI commands
//! and [`CommandRegistry`] for registering and discovering them.
//!
//! ## Defining a Custom Command
//!
//! ```rust,no_run
//! use replace_migrations_cli::command::{CommandIo, ManagementCommand};
//! use replace_migrations_core::{ReplaceResult, Settings};
//!
//! struct GreetCommand;
//!
//! impl ManagementCommand for GreetCommand {
//!     fn name(&self) -> &str { "greet" }
//!     fn help(&self) -> &str { "Say hello" }
//!
//!     fn handle(
//!         &self,
//!         _matches: &clap::ArgMatches,
//!         _settings: &Settings,
//!         io: &mut CommandIo<'_>,
//!     ) -> ReplaceResult<()> {
//!         writeln!(io.stdout, "Hello from replace-migrations!")?;
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use replace_migrations_core::{ReplaceError, ReplaceResult, Settings};

/// The name of the global verbosity argument.
pub const VERBOSITY: &str = "verbosity";

/// The name of the global settings file argument.
pub const SETTINGS: &str = "settings";

/// The standard streams a command reads from and writes to.
pub struct CommandIo<'a> {
    pub stdin: &'a mut dyn BufRead,
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
}

/// A management command that can be registered and invoked through the CLI.
///
/// Implementations define a name, help text, optional arguments, and a
/// handler function.
pub trait ManagementCommand {
    /// Returns the name of this command (used to invoke it from the CLI).
    fn name(&self) -> &str;

    /// Returns a short help description for this command.
    fn help(&self) -> &str;

    /// Adds custom arguments to the clap command.
    ///
    /// Override this to add positional arguments, flags, or options.
    /// The default implementation returns the command unchanged.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Executes the command with the given argument matches and settings.
    fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> ReplaceResult<()>;
}

/// Returns the verbosity level selected on the command line (default 1).
pub fn verbosity(matches: &clap::ArgMatches) -> u8 {
    matches
        .try_get_one::<u8>(VERBOSITY)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(1)
}

/// A registry of management commands.
///
/// Commands are registered by name and can be looked up, listed, or executed.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn ManagementCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Creates a new empty command registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a management command.
    ///
    /// If a command with the same name already exists, it is replaced.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        let name = command.name().to_string();
        self.commands.insert(name, command);
    }

    /// Returns a reference to the command with the given name, if registered.
    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Returns a sorted list of all registered command names.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds a top-level clap `Command` containing all registered subcommands.
    ///
    /// `--settings` and `-v/--verbosity` are global and accepted after the
    /// subcommand name as well.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = clap::Command::new("replace-migrations")
            .about("Replace migration histories with squashed migrations")
            .subcommand_required(true)
            .arg(
                clap::Arg::new(SETTINGS)
                    .long("settings")
                    .global(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Path to a TOML or JSON settings file"),
            )
            .arg(
                clap::Arg::new(VERBOSITY)
                    .short('v')
                    .long("verbosity")
                    .global(true)
                    .default_value("1")
                    .value_parser(clap::value_parser!(u8).range(0..=3))
                    .help("Verbosity level; 0=minimal output, 1=normal output, 3=very verbose output"),
            );

        // Collect entries and sort by name
        let mut entries: Vec<_> = self.commands.iter().collect();
        entries.sort_by_key(|(name, _)| (*name).clone());

        for (name, cmd) in entries {
            // clap requires &'static str for command names. Commands are
            // registered once at startup, so the leak is bounded.
            let static_name: &'static str = Box::leak(name.clone().into_boxed_str());
            let subcmd = clap::Command::new(static_name).about(cmd.help().to_string());
            let subcmd = cmd.add_arguments(subcmd);
            app = app.subcommand(subcmd);
        }

        app
    }

    /// Executes the command identified by the given argument matches.
    ///
    /// Looks up the subcommand name from `matches` and dispatches to the
    /// registered command's `handle` method.
    pub fn execute(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> ReplaceResult<()> {
        let (name, sub_matches) = matches.subcommand().ok_or_else(|| {
            ReplaceError::ConfigurationError("No subcommand specified".to_string())
        })?;

        let cmd = self.get(name).ok_or_else(|| {
            ReplaceError::ConfigurationError(format!("Unknown command: {name}"))
        })?;

        cmd.handle(sub_matches, settings, io)
    }
}
