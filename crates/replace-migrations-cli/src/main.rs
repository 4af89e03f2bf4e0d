//! The `replace-migrations` command-line tool.
//!
//! ```bash
//! replace-migrations --settings project.toml replaceallmigrations billing --name squashed
//! ```
//!
//! Settings come from `--settings` when given, otherwise from defaults; in
//! both cases `REPLACE_MIGRATIONS_*` environment variables override them.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use replace_migrations_cli::command::{CommandIo, CommandRegistry, SETTINGS};
use replace_migrations_cli::commands::register_builtin_commands;
use replace_migrations_core::logging::setup_logging;
use replace_migrations_core::settings_loader;

fn main() -> ExitCode {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    let matches = registry.build_cli().get_matches();

    let settings = match matches.get_one::<PathBuf>(SETTINGS) {
        Some(path) => match settings_loader::from_file_with_env(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(exit_status(e.exit_code()));
            }
        },
        None => settings_loader::from_env(),
    };
    setup_logging(&settings);
    tracing::debug!(
        "Settings loaded: migrations_dir={}, apps={:?}",
        settings.migrations_dir.display(),
        settings.installed_apps
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let (mut stdin, mut stdout, mut stderr) = (stdin.lock(), stdout.lock(), stderr.lock());
    let result = {
        let mut io = CommandIo {
            stdin: &mut stdin,
            stdout: &mut stdout,
            stderr: &mut stderr,
        };
        registry.execute(&matches, &settings, &mut io)
    };
    stdout.flush().ok();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            writeln!(stderr, "{e}").ok();
            ExitCode::from(exit_status(e.exit_code()))
        }
    }
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
