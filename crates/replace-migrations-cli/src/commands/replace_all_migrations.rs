//! The `replaceallmigrations` management command.
//!
//! Replaces the whole migration history of the given apps (or of every app)
//! with freshly detected migrations that keep the special operations of the
//! migrations they replace.

use std::collections::BTreeSet;
use std::io::Write;

use replace_migrations_core::logging::command_span;
use replace_migrations_core::{AppRegistry, ReplaceError, ReplaceResult, Settings};
use replace_migrations_engine::{
    is_valid_migration_name, no_changes_message, write_migration_files, InteractiveQuestioner,
    MigrationAutodetector, MigrationGraph, MigrationLoader, MigrationQuestioner,
    MigrationRecorder, NonInteractiveQuestioner, OutputWriter, ProjectState, ReplacementComposer,
    Superseded, WriteOptions,
};

use crate::command::{verbosity, CommandIo, ManagementCommand};

/// Squashes every migration of the requested apps into new migrations.
pub struct ReplaceAllMigrationsCommand;

impl ManagementCommand for ReplaceAllMigrationsCommand {
    fn name(&self) -> &'static str {
        "replaceallmigrations"
    }

    fn help(&self) -> &'static str {
        "Replace all migrations of the given apps with a new set of migrations"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("app_label")
                .help("Specify the app label(s) to replace migrations for")
                .num_args(0..)
                .required(false),
        )
        .arg(
            clap::Arg::new("dry-run")
                .long("dry-run")
                .action(clap::ArgAction::SetTrue)
                .help("Just show what migrations would be made; don't actually write them"),
        )
        .arg(
            clap::Arg::new("noinput")
                .long("noinput")
                .visible_alias("no-input")
                .action(clap::ArgAction::SetTrue)
                .help("Tells the tool to NOT prompt the user for input of any kind"),
        )
        .arg(
            clap::Arg::new("name")
                .short('n')
                .long("name")
                .help("Use this name for migration file(s)"),
        )
        .arg(
            clap::Arg::new("no-header")
                .long("no-header")
                .action(clap::ArgAction::SetTrue)
                .help("Do not add header comments to new migration file(s)"),
        )
        .arg(
            clap::Arg::new("scriptable")
                .long("scriptable")
                .action(clap::ArgAction::SetTrue)
                .help(
                    "Divert log output and input prompts to stderr, writing only paths of \
                     generated migration files to stdout",
                ),
        )
    }

    fn handle(
        &self,
        matches: &clap::ArgMatches,
        settings: &Settings,
        io: &mut CommandIo<'_>,
    ) -> ReplaceResult<()> {
        let span = command_span(self.name());
        let _guard = span.enter();

        let options = Options::from_matches(matches);
        if let Some(name) = options.name.as_deref() {
            if !is_valid_migration_name(name) {
                return Err(ReplaceError::InvalidName(name.to_string()));
            }
        }

        let registry = AppRegistry::from_installed_apps(&settings.installed_apps)?;
        registry.check_labels(&options.app_labels)?;
        let app_labels: BTreeSet<String> = options.app_labels.iter().cloned().collect();

        let mut loader = MigrationLoader::new(&settings.migrations_dir);
        let graph = loader.load()?;
        tracing::debug!("Loaded {} migration(s)", graph.len());
        check_consistent_history(&graph, settings)?;

        let composer =
            ReplacementComposer::new(&graph, &app_labels).with_name(options.name.as_deref());
        composer.check_conflicts()?;

        let desired_state = ProjectState::from_json_file(&settings.models_file)?;
        let detector = MigrationAutodetector::new(composer.baseline_state()?, desired_state);

        let changes = {
            let mut questioner: Box<dyn MigrationQuestioner + '_> = if options.interactive {
                let prompts: &mut dyn Write = if options.scriptable {
                    &mut *io.stderr
                } else {
                    &mut *io.stdout
                };
                Box::new(InteractiveQuestioner::new(
                    &mut *io.stdin,
                    prompts,
                    app_labels.clone(),
                ))
            } else {
                Box::new(NonInteractiveQuestioner::new(
                    app_labels.clone(),
                    options.verbosity,
                ))
            };
            composer.compose(&detector, questioner.as_mut())?
        };

        let mut output = OutputWriter::new(&mut *io.stdout, &mut *io.stderr, options.scriptable);
        if changes.is_empty() {
            if options.verbosity >= 1 {
                output.log(&no_changes_message(&app_labels))?;
            }
            return Ok(());
        }

        let written = write_migration_files(
            &changes,
            &WriteOptions {
                migrations_dir: settings.migrations_dir.clone(),
                include_header: options.include_header,
                dry_run: options.dry_run,
                verbosity: options.verbosity,
            },
            &Superseded {
                paths: Some(loader.paths()),
                update_previous: None,
            },
            &mut output,
        )?;
        tracing::info!("Wrote {} migration file(s)", written.len());
        Ok(())
    }
}

/// Parsed command-line options.
#[derive(Debug, Clone)]
struct Options {
    app_labels: Vec<String>,
    dry_run: bool,
    interactive: bool,
    name: Option<String>,
    include_header: bool,
    scriptable: bool,
    verbosity: u8,
}

impl Options {
    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            app_labels: matches
                .get_many::<String>("app_label")
                .map_or_else(Vec::new, |labels| labels.cloned().collect()),
            dry_run: matches.get_flag("dry-run"),
            interactive: !matches.get_flag("noinput"),
            name: matches.get_one::<String>("name").cloned(),
            include_header: !matches.get_flag("no-header"),
            scriptable: matches.get_flag("scriptable"),
            verbosity: verbosity(matches),
        }
    }
}

/// Checks the recorded history of every non-dummy database, in alias order.
///
/// Inconsistencies and unreadable histories are logged and never abort.
fn check_consistent_history(graph: &MigrationGraph, settings: &Settings) -> ReplaceResult<()> {
    for (alias, database) in &settings.databases {
        if database.is_dummy() {
            continue;
        }
        let checked = database
            .history
            .as_deref()
            .ok_or_else(|| {
                ReplaceError::OperationalError(format!(
                    "database '{alias}' has no migration history configured"
                ))
            })
            .and_then(|path| MigrationRecorder::from_history_file(alias.as_str(), path))
            .and_then(|recorder| graph.check_consistent_history(&recorder));
        match checked {
            Ok(()) => {}
            Err(e) if e.is_advisory() => {
                tracing::warn!("Got an error checking a consistent migration history: {e}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
