//! Writing composed replacements to disk.
//!
//! [`MigrationWriter`] renders one replacement as file contents.
//! [`write_migration_files`] writes a whole [`ReplacementSet`], reports what
//! it does through an [`OutputWriter`], and removes the files of replaced
//! migrations once it is safe to do so.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use replace_migrations_core::ReplaceResult;

use crate::migration::MigrationKey;
use crate::operations::StateOperation;
use crate::replace::{Replacement, ReplacementSet};
use crate::serializer::{migration_file_path, MigrationFile, PACKAGE_MARKER};

/// Command output split between a log stream and a result stream.
///
/// In scriptable mode the log goes to stderr so that stdout only carries the
/// paths of written files.
pub struct OutputWriter<'a> {
    stdout: &'a mut dyn Write,
    stderr: &'a mut dyn Write,
    scriptable: bool,
}

impl<'a> OutputWriter<'a> {
    pub fn new(stdout: &'a mut dyn Write, stderr: &'a mut dyn Write, scriptable: bool) -> Self {
        Self {
            stdout,
            stderr,
            scriptable,
        }
    }

    /// Writes a progress line.
    pub fn log(&mut self, message: &str) -> ReplaceResult<()> {
        if self.scriptable {
            writeln!(self.stderr, "{message}")?;
        } else {
            writeln!(self.stdout, "{message}")?;
        }
        Ok(())
    }

    /// Writes a result line to stdout.
    pub fn out(&mut self, message: &str) -> ReplaceResult<()> {
        writeln!(self.stdout, "{message}")?;
        Ok(())
    }

    /// Writes an error line to stderr.
    pub fn err(&mut self, message: &str) -> ReplaceResult<()> {
        writeln!(self.stderr, "{message}")?;
        Ok(())
    }

    pub const fn is_scriptable(&self) -> bool {
        self.scriptable
    }
}

/// Renders one replacement as a migration file.
pub struct MigrationWriter<'a> {
    replacement: &'a Replacement,
    migrations_dir: &'a Path,
    include_header: bool,
}

impl<'a> MigrationWriter<'a> {
    pub const fn new(
        replacement: &'a Replacement,
        migrations_dir: &'a Path,
        include_header: bool,
    ) -> Self {
        Self {
            replacement,
            migrations_dir,
            include_header,
        }
    }

    /// Returns the file contents.
    pub fn as_string(&self) -> ReplaceResult<String> {
        MigrationFile::from_migration(
            &self.replacement.migration,
            &self.replacement.portability,
            self.include_header,
        )
        .to_json()
    }

    /// Returns the directory holding the app's migrations.
    pub fn basedir(&self) -> PathBuf {
        self.migrations_dir.join(&self.replacement.migration.app_label)
    }

    pub fn filename(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> PathBuf {
        let migration = &self.replacement.migration;
        migration_file_path(self.migrations_dir, &migration.app_label, &migration.name)
    }

    pub fn needs_manual_porting(&self) -> bool {
        self.replacement.portability.needs_manual_porting()
    }
}

/// How [`write_migration_files`] behaves.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub migrations_dir: PathBuf,
    pub include_header: bool,
    /// Report only; nothing is written or deleted.
    pub dry_run: bool,
    pub verbosity: u8,
}

/// Where the migrations being written over came from.
#[derive(Debug, Clone, Default)]
pub struct Superseded<'a> {
    /// The file of every loaded migration.
    pub paths: Option<&'a BTreeMap<MigrationKey, PathBuf>>,
    /// One previous file per app that the new file updates.
    pub update_previous: Option<&'a BTreeMap<String, PathBuf>>,
}

/// Writes every replacement and returns the paths written.
///
/// After a file is written, the files of the migrations it replaces are
/// deleted, never the file just written. When the replacement needs manual
/// porting the old files are kept and a warning names them.
pub fn write_migration_files(
    changes: &ReplacementSet,
    options: &WriteOptions,
    superseded: &Superseded<'_>,
    output: &mut OutputWriter<'_>,
) -> ReplaceResult<Vec<PathBuf>> {
    let mut written_files = Vec::new();
    let mut directory_created: BTreeSet<&str> = BTreeSet::new();

    for (app_label, replacements) in changes {
        if options.verbosity >= 1 {
            output.log(&format!("Migrations for '{app_label}':"))?;
        }
        for replacement in replacements {
            let writer =
                MigrationWriter::new(replacement, &options.migrations_dir, options.include_header);
            let migration = &replacement.migration;

            if options.verbosity >= 1 {
                let migration_string = relative_path(&writer.path());
                output.log(&format!("  {migration_string}"))?;
                output.log(&format!("  Replaces '{}'.", format_keys(&migration.replaces)))?;
                for operation in &migration.operations {
                    output.log(&format!("    - {}", operation.describe()))?;
                }
                if output.is_scriptable() {
                    output.out(&migration_string)?;
                }
            }

            if options.dry_run {
                if options.verbosity == 3 {
                    output.log(&format!("Full migrations file '{}':", writer.filename()))?;
                    output.log(&writer.as_string()?)?;
                }
                continue;
            }

            if directory_created.insert(app_label.as_str()) {
                let basedir = writer.basedir();
                std::fs::create_dir_all(&basedir)?;
                let marker = basedir.join(PACKAGE_MARKER);
                if !marker.is_file() {
                    std::fs::File::create(&marker)?;
                }
            }

            let path = writer.path();
            std::fs::write(&path, writer.as_string()?)?;
            tracing::debug!("Wrote {}", path.display());

            let candidates = superseded
                .update_previous
                .and_then(|paths| paths.get(app_label))
                .into_iter()
                .chain(superseded.paths.into_iter().flat_map(|paths| {
                    migration.replaces.iter().filter_map(move |key| paths.get(key))
                }));
            let mut previous: Vec<&PathBuf> = Vec::new();
            for prev in candidates {
                if *prev != path && !previous.contains(&prev) {
                    previous.push(prev);
                }
            }

            for prev in previous {
                let rel_prev_path = relative_path(prev);
                if writer.needs_manual_porting() {
                    output.log(&format!(
                        "Updated migration {} requires manual porting.\n\
                         Previous migration {rel_prev_path} was kept and must be deleted \
                         after porting functions manually.",
                        relative_path(&path)
                    ))?;
                } else if prev.is_file() {
                    std::fs::remove_file(prev)?;
                    if options.verbosity >= 1 {
                        output.log(&format!("Deleted {rel_prev_path}"))?;
                    }
                }
            }

            written_files.push(path);
        }
    }

    Ok(written_files)
}

/// Shows `path` relative to the working directory when it lies below it.
pub fn relative_path(path: &Path) -> String {
    if path.is_absolute() {
        if let Ok(cwd) = std::env::current_dir() {
            if let Ok(relative) = path.strip_prefix(&cwd) {
                return relative.display().to_string();
            }
        }
    }
    path.display().to_string()
}

fn format_keys(keys: &[MigrationKey]) -> String {
    let items: Vec<String> = keys
        .iter()
        .map(|(app, name)| format!("('{app}', '{name}')"))
        .collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::Migration;
    use crate::operations::{CodePath, DeleteModel, RunRust};
    use crate::portability::{analyze, PortabilityReport};

    fn replacement(code: &str) -> Replacement {
        let migration = Migration::new("billing", "0001_squashed")
            .replacing("billing", "0001_initial")
            .replacing("billing", "0002_add_status")
            .add_operation(DeleteModel { name: "Receipt".into() })
            .add_operation(RunRust {
                code: CodePath::parse(code).unwrap(),
                reverse_code: None,
                elidable: false,
            });
        Replacement {
            portability: analyze(&migration),
            migration,
        }
    }

    fn set(replacement: Replacement) -> ReplacementSet {
        [("billing".to_string(), vec![replacement])].into()
    }

    fn old_files(dir: &Path) -> BTreeMap<MigrationKey, PathBuf> {
        let app_dir = dir.join("billing");
        std::fs::create_dir_all(&app_dir).unwrap();
        ["0001_initial", "0002_add_status"]
            .iter()
            .map(|name| {
                let path = app_dir.join(format!("{name}.json"));
                std::fs::write(&path, "{}").unwrap();
                (("billing".to_string(), (*name).to_string()), path)
            })
            .collect()
    }

    fn options(dir: &Path, dry_run: bool, verbosity: u8) -> WriteOptions {
        WriteOptions {
            migrations_dir: dir.to_path_buf(),
            include_header: false,
            dry_run,
            verbosity,
        }
    }

    // ── MigrationWriter ─────────────────────────────────────────────

    #[test]
    fn test_writer_paths() {
        let r = replacement("shared.backfills.run");
        let writer = MigrationWriter::new(&r, Path::new("/m"), true);
        assert_eq!(writer.filename(), "0001_squashed.json");
        assert_eq!(writer.basedir(), PathBuf::from("/m/billing"));
        assert_eq!(writer.path(), PathBuf::from("/m/billing/0001_squashed.json"));
        assert!(!writer.needs_manual_porting());
        assert!(writer.as_string().unwrap().contains("\"header\""));
    }

    // ── write_migration_files ───────────────────────────────────────

    #[test]
    fn test_write_creates_marker_and_deletes_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let paths = old_files(dir.path());
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let mut output = OutputWriter::new(&mut stdout, &mut stderr, false);

        let written = write_migration_files(
            &set(replacement("shared.backfills.run")),
            &options(dir.path(), false, 1),
            &Superseded {
                paths: Some(&paths),
                update_previous: None,
            },
            &mut output,
        )
        .unwrap();

        assert_eq!(written.len(), 1);
        assert!(written[0].is_file());
        assert!(dir.path().join("billing").join(PACKAGE_MARKER).is_file());
        assert!(paths.values().all(|p| !p.exists()));

        let log = String::from_utf8(stdout).unwrap();
        assert!(log.contains("Migrations for 'billing':"));
        assert!(log.contains(
            "Replaces '[('billing', '0001_initial'), ('billing', '0002_add_status')]'."
        ));
        assert!(log.contains("    - Delete model Receipt"));
        assert!(log.contains("    - Raw Rust operation"));
        assert!(log.contains("Deleted "));
        assert!(stderr.is_empty());
    }

    #[test]
    fn test_manual_porting_keeps_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = old_files(dir.path());
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let mut output = OutputWriter::new(&mut stdout, &mut stderr, false);

        let r = replacement("billing.migrations.0002_add_status.forwards");
        assert!(r.portability.needs_manual_porting());
        write_migration_files(
            &set(r),
            &options(dir.path(), false, 1),
            &Superseded {
                paths: Some(&paths),
                update_previous: None,
            },
            &mut output,
        )
        .unwrap();

        assert!(paths.values().all(|p| p.exists()));
        let log = String::from_utf8(stdout).unwrap();
        assert!(log.contains("requires manual porting"));
        assert!(log.contains("was kept"));
    }

    #[test]
    fn test_never_deletes_file_just_written() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("billing");
        std::fs::create_dir_all(&app_dir).unwrap();
        let same = app_dir.join("0001_squashed.json");
        std::fs::write(&same, "{}").unwrap();
        let paths: BTreeMap<MigrationKey, PathBuf> =
            [(("billing".to_string(), "0001_squashed".to_string()), same.clone())].into();

        let migration = Migration::new("billing", "0001_squashed").replacing("billing", "0001_squashed");
        let r = Replacement {
            migration,
            portability: PortabilityReport::default(),
        };
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let mut output = OutputWriter::new(&mut stdout, &mut stderr, false);
        write_migration_files(
            &set(r),
            &options(dir.path(), false, 0),
            &Superseded {
                paths: Some(&paths),
                update_previous: None,
            },
            &mut output,
        )
        .unwrap();
        assert!(same.is_file());
        assert!(stdout.is_empty());
    }

    #[test]
    fn test_update_previous_deletes_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = old_files(dir.path());
        let previous: BTreeMap<String, PathBuf> = [(
            "billing".to_string(),
            paths[&("billing".to_string(), "0002_add_status".to_string())].clone(),
        )]
        .into();
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let mut output = OutputWriter::new(&mut stdout, &mut stderr, false);

        write_migration_files(
            &set(replacement("shared.backfills.run")),
            &options(dir.path(), false, 0),
            &Superseded {
                paths: None,
                update_previous: Some(&previous),
            },
            &mut output,
        )
        .unwrap();
        assert!(!previous["billing"].exists());
        assert!(paths[&("billing".to_string(), "0001_initial".to_string())].exists());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = old_files(dir.path());
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let mut output = OutputWriter::new(&mut stdout, &mut stderr, false);

        let written = write_migration_files(
            &set(replacement("shared.backfills.run")),
            &options(dir.path(), true, 3),
            &Superseded {
                paths: Some(&paths),
                update_previous: None,
            },
            &mut output,
        )
        .unwrap();

        assert!(written.is_empty());
        assert!(!dir.path().join("billing").join("0001_squashed.json").exists());
        assert!(!dir.path().join("billing").join(PACKAGE_MARKER).exists());
        assert!(paths.values().all(|p| p.exists()));
        let log = String::from_utf8(stdout).unwrap();
        assert!(log.contains("Full migrations file '0001_squashed.json':"));
        assert!(log.contains("\"special_operations\""));
    }

    #[test]
    fn test_scriptable_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        let mut output = OutputWriter::new(&mut stdout, &mut stderr, true);

        write_migration_files(
            &set(replacement("shared.backfills.run")),
            &options(dir.path(), false, 1),
            &Superseded::default(),
            &mut output,
        )
        .unwrap();

        let out = String::from_utf8(stdout).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.trim_end().ends_with("0001_squashed.json"));
        assert!(String::from_utf8(stderr)
            .unwrap()
            .contains("Migrations for 'billing':"));
    }

    #[test]
    fn test_relative_path() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            relative_path(&cwd.join("migrations").join("a.json")),
            Path::new("migrations").join("a.json").display().to_string()
        );
        assert_eq!(relative_path(Path::new("rel/a.json")), "rel/a.json");
    }
}
