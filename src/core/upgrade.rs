//! The upgrade step sequence.
//!
//! Steps run in fixed order and the first failing external command aborts the
//! whole run; its exit status becomes the process exit status. There is no
//! retry and no rollback - the external environment is assumed idempotent, so
//! re-running after a fix is the recovery path.
//!
//! Downtime policy: migration need and pending configuration-management
//! changes are both computed *before* anything is stopped. If neither is
//! pending the server is never stopped; the restart at the end always runs.
//! Long-running index builds from a known allow-list run proactively, outside
//! the downtime window.

use serde::Serialize;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::log_status;
use crate::migrations::{self, MigrationStatus};
use crate::paths::DeployPaths;
use crate::runner::{ProcessRunner, RunRequest};
use crate::supervisor::ServiceController;

/// Command-line derived options, immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct UpgradeFlags {
    pub deploy_path: PathBuf,
    pub skip_puppet: bool,
    pub skip_migrations: bool,
    pub from_git: bool,
}

/// Exit code the no-op configuration-management run uses to signal
/// pending changes (puppet convention).
const PUPPET_CHANGES_PENDING: i32 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    /// Step names, in execution order.
    pub steps: Vec<String>,
    pub migrations_needed: bool,
    pub puppet_changes: bool,
    pub server_stopped: bool,
    pub large_indexes_built: bool,
    pub pending_migrations: Vec<String>,
}

/// Require an effective uid of root before touching the system.
pub fn require_root() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(Error::privilege_required("root"));
    }
    Ok(())
}

pub struct Upgrader<'a> {
    flags: &'a UpgradeFlags,
    paths: &'a DeployPaths,
    runner: &'a dyn ProcessRunner,
    services: &'a dyn ServiceController,
    report: UpgradeReport,
}

impl<'a> Upgrader<'a> {
    pub fn new(
        flags: &'a UpgradeFlags,
        paths: &'a DeployPaths,
        runner: &'a dyn ProcessRunner,
        services: &'a dyn ServiceController,
    ) -> Self {
        Self {
            flags,
            paths,
            runner,
            services,
            report: UpgradeReport {
                steps: Vec::new(),
                migrations_needed: false,
                puppet_changes: false,
                server_stopped: false,
                large_indexes_built: false,
                pending_migrations: Vec::new(),
            },
        }
    }

    pub fn run(mut self) -> Result<UpgradeReport> {
        self.paths.validate()?;

        self.apply_compat_fixes()?;
        self.upgrade_os_packages()?;
        self.provision_environment()?;
        self.generate_secrets()?;
        self.build_or_copy_static_assets()?;

        let status = self.detect_migrations()?;
        self.report.migrations_needed = status.migrations_needed();
        self.report.pending_migrations = status.pending.clone();
        if status.needs_large_indexes {
            self.build_large_indexes()?;
        }

        self.report.puppet_changes = self.detect_puppet_changes()?;

        if self.report.migrations_needed || self.report.puppet_changes {
            self.stop_server()?;
        }

        if self.report.puppet_changes {
            self.apply_puppet()?;
        }

        if self.report.migrations_needed {
            self.run_migrations()?;
        }

        self.restart_server()?;
        self.purge_old_deployments()?;

        Ok(self.report)
    }

    fn record(&mut self, step: &str) {
        self.report.steps.push(step.to_string());
    }

    fn script(&self, relative: &str) -> String {
        self.paths.script(relative).display().to_string()
    }

    fn manage(&self, args: &[&str]) -> RunRequest {
        RunRequest::new("./manage.py", args).in_dir(&self.paths.deploy_path)
    }

    /// Older releases kept settings inside the deploy tree instead of the
    /// production config dir. If the config dir has no settings file but the
    /// deploy carries the legacy one, copy it into place so the rest of the
    /// sequence finds it where current code expects it.
    fn apply_compat_fixes(&mut self) -> Result<()> {
        self.record("compat-fixup");

        let settings = self.paths.config_dir.join("settings.py");
        let legacy = self.paths.deploy_path.join("app/local_settings.py");
        if !settings.exists() && legacy.exists() {
            log_status!("upgrade", "Migrating legacy settings to {}", settings.display());
            crate::utils::io::copy_file(&legacy, &settings, "migrate legacy settings")?;
        }

        Ok(())
    }

    /// --skip-puppet also skips the OS package upgrade; package state
    /// belongs to configuration management.
    fn upgrade_os_packages(&mut self) -> Result<()> {
        if self.flags.skip_puppet {
            return Ok(());
        }
        self.record("os-packages");
        log_status!("upgrade", "Upgrading OS packages");
        self.runner
            .check_run(&RunRequest::new("apt-get", &["-y", "upgrade"]))?;
        Ok(())
    }

    fn provision_environment(&mut self) -> Result<()> {
        self.record("provision");
        log_status!("upgrade", "Provisioning runtime environment");
        let deploy = self.paths.deploy_path.display().to_string();
        self.runner.check_run(&RunRequest::new(
            self.script("scripts/lib/create-production-venv"),
            &[deploy.as_str()],
        ))?;
        Ok(())
    }

    fn generate_secrets(&mut self) -> Result<()> {
        self.record("secrets");
        log_status!("upgrade", "Generating secrets");
        self.runner.check_run(&RunRequest::new(
            self.script("scripts/setup/generate-secrets"),
            &["--production"],
        ))?;
        Ok(())
    }

    fn build_or_copy_static_assets(&mut self) -> Result<()> {
        self.record("static-assets");
        if self.flags.from_git {
            log_status!("upgrade", "Building static assets");
            self.runner.check_run(
                &RunRequest::new(self.script("tools/build-static-assets"), &[])
                    .in_dir(&self.paths.deploy_path),
            )?;
        } else {
            // Tarball deploys ship prebuilt assets; install them into the
            // static root the web server serves from.
            log_status!("upgrade", "Copying prebuilt static assets");
            let serve = self
                .paths
                .deploy_path
                .join("prod-static/serve")
                .display()
                .to_string();
            let static_root = self.paths.static_root.display().to_string();
            self.runner.check_run(&RunRequest::new(
                "cp",
                &["-rT", serve.as_str(), static_root.as_str()],
            ))?;
        }
        Ok(())
    }

    fn detect_migrations(&mut self) -> Result<MigrationStatus> {
        if self.flags.skip_migrations {
            return Ok(MigrationStatus {
                pending: Vec::new(),
                needs_large_indexes: false,
            });
        }
        self.record("detect-migrations");
        let output = self.runner.check_run(&self.manage(&["showmigrations"]))?;
        Ok(migrations::parse_status_listing(&output.stdout))
    }

    /// Large index builds happen before the downtime window so the server
    /// stays up while they run.
    fn build_large_indexes(&mut self) -> Result<()> {
        self.record("build-large-indexes");
        self.report.large_indexes_built = true;
        log_status!("upgrade", "Building large indexes before downtime");
        self.runner
            .check_run(&self.manage(&["create_large_indexes"]))?;
        Ok(())
    }

    /// A no-op configuration-management run reports whether an apply would
    /// change anything. Exit 0 means clean, 2 means changes pending.
    fn detect_puppet_changes(&mut self) -> Result<bool> {
        if self.flags.skip_puppet {
            return Ok(false);
        }
        self.record("detect-puppet-changes");
        let request = RunRequest::new(self.script("scripts/setup/apply-puppet"), &["--noop"]);
        let output = self.runner.run(&request)?;
        match output.exit_code {
            0 => Ok(false),
            PUPPET_CHANGES_PENDING => Ok(true),
            _ => Err(Error::external_command_failed(
                crate::error::ExternalCommandFailedDetails {
                    command: request.command_line(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                },
            )),
        }
    }

    fn stop_server(&mut self) -> Result<()> {
        self.record("stop-server");
        self.report.server_stopped = true;
        // Indexer first: it is off the critical path and tolerates the
        // longest outage.
        self.services.stop_search_indexer()?;
        log_status!("upgrade", "Stopping server");
        self.services.stop_server()?;
        Ok(())
    }

    fn apply_puppet(&mut self) -> Result<()> {
        self.record("puppet-apply");
        log_status!("upgrade", "Applying configuration management changes");
        self.runner.check_run(&RunRequest::new(
            self.script("scripts/setup/apply-puppet"),
            &["--force"],
        ))?;
        Ok(())
    }

    fn run_migrations(&mut self) -> Result<()> {
        self.record("migrate");
        log_status!("upgrade", "Running database migrations");
        self.runner
            .check_run(&self.manage(&["migrate", "--noinput"]))?;
        Ok(())
    }

    fn restart_server(&mut self) -> Result<()> {
        self.record("restart-server");
        log_status!("upgrade", "Restarting server");
        self.services.restart_server()?;
        self.services.start_search_indexer()?;
        Ok(())
    }

    fn purge_old_deployments(&mut self) -> Result<()> {
        self.record("purge-deployments");
        log_status!("upgrade", "Purging stale deployments");
        self.runner.check_run(&RunRequest::new(
            self.script("scripts/purge-old-deployments"),
            &[],
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunOutput;
    use std::cell::RefCell;
    use std::rc::Rc;

    type EventLog = Rc<RefCell<Vec<String>>>;

    /// Scripted runner: records every command and answers from a substring
    /// match table, defaulting to success with empty output.
    struct ScriptedRunner {
        events: EventLog,
        responses: Vec<(&'static str, RunOutput)>,
    }

    impl ScriptedRunner {
        fn new(events: EventLog) -> Self {
            Self {
                events,
                responses: Vec::new(),
            }
        }

        fn respond(mut self, needle: &'static str, output: RunOutput) -> Self {
            self.responses.push((needle, output));
            self
        }
    }

    fn ok_output(stdout: &str) -> RunOutput {
        RunOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    fn failed_output(exit_code: i32, stderr: &str) -> RunOutput {
        RunOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
            success: false,
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, request: &RunRequest) -> Result<RunOutput> {
            let line = request.command_line();
            self.events.borrow_mut().push(line.clone());
            for (needle, output) in &self.responses {
                if line.contains(needle) {
                    return Ok(output.clone());
                }
            }
            Ok(ok_output(""))
        }
    }

    struct RecordingController {
        events: EventLog,
    }

    impl ServiceController for RecordingController {
        fn stop_search_indexer(&self) -> Result<()> {
            self.events.borrow_mut().push("stop-indexer".to_string());
            Ok(())
        }

        fn start_search_indexer(&self) -> Result<()> {
            self.events.borrow_mut().push("start-indexer".to_string());
            Ok(())
        }

        fn stop_server(&self) -> Result<()> {
            self.events.borrow_mut().push("stop-server".to_string());
            Ok(())
        }

        fn restart_server(&self) -> Result<()> {
            self.events.borrow_mut().push("restart-server".to_string());
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        flags: UpgradeFlags,
        paths: DeployPaths,
        events: EventLog,
    }

    fn fixture(skip_puppet: bool, skip_migrations: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("etc");
        std::fs::create_dir(&config_dir).unwrap();
        let flags = UpgradeFlags {
            deploy_path: dir.path().to_path_buf(),
            skip_puppet,
            skip_migrations,
            from_git: false,
        };
        let paths = DeployPaths::for_deploy(dir.path()).with_config_dir(&config_dir);
        Fixture {
            _dir: dir,
            flags,
            paths,
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn run_upgrade(fx: &Fixture, runner: &ScriptedRunner) -> Result<UpgradeReport> {
        let controller = RecordingController {
            events: Rc::clone(&fx.events),
        };
        Upgrader::new(&fx.flags, &fx.paths, runner, &controller).run()
    }

    fn position(events: &[String], needle: &str) -> Option<usize> {
        events.iter().position(|e| e.contains(needle))
    }

    #[test]
    fn both_skip_flags_skip_stop_but_still_restart() {
        let fx = fixture(true, true);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events));

        let report = run_upgrade(&fx, &runner).unwrap();

        let events = fx.events.borrow();
        assert!(position(&events, "stop-server").is_none());
        assert!(position(&events, "stop-indexer").is_none());
        assert!(position(&events, "restart-server").is_some());
        assert!(position(&events, "start-indexer").is_some());
        assert!(position(&events, "showmigrations").is_none());
        assert!(position(&events, "apt-get").is_none());
        assert!(!report.server_stopped);
        assert!(!report.migrations_needed);
    }

    #[test]
    fn pending_large_index_migration_builds_indexes_once_before_downtime() {
        let fx = fixture(true, false);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events)).respond(
            "showmigrations",
            ok_output(" [ ] 0095_index_unread_messages\n [ ] 0100_add_topic_links\n"),
        );

        let report = run_upgrade(&fx, &runner).unwrap();

        let events = fx.events.borrow();
        let index_builds = events
            .iter()
            .filter(|e| e.contains("create_large_indexes"))
            .count();
        assert_eq!(index_builds, 1);

        let build_at = position(&events, "create_large_indexes").unwrap();
        let stop_at = position(&events, "stop-server").unwrap();
        assert!(build_at < stop_at);

        let migrate_at = position(&events, "migrate --noinput").unwrap();
        assert!(stop_at < migrate_at);
        assert!(report.large_indexes_built);
        assert!(report.server_stopped);
    }

    #[test]
    fn no_pending_migrations_and_clean_puppet_never_stops_server() {
        let fx = fixture(false, false);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events))
            .respond("showmigrations", ok_output(" [X] 0001_initial\n"))
            .respond("apply-puppet --noop", ok_output(""));

        let report = run_upgrade(&fx, &runner).unwrap();

        let events = fx.events.borrow();
        assert!(position(&events, "stop-server").is_none());
        assert!(position(&events, "stop-indexer").is_none());
        assert!(position(&events, "restart-server").is_some());
        assert!(!report.migrations_needed);
        assert!(!report.puppet_changes);
        assert!(!report.server_stopped);
    }

    #[test]
    fn pending_puppet_changes_trigger_stop_and_apply() {
        let fx = fixture(false, false);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events))
            .respond("showmigrations", ok_output(" [X] 0001_initial\n"))
            .respond("apply-puppet --noop", failed_output(2, ""));

        let report = run_upgrade(&fx, &runner).unwrap();

        let events = fx.events.borrow();
        let stop_at = position(&events, "stop-server").unwrap();
        let apply_at = position(&events, "apply-puppet --force").unwrap();
        assert!(stop_at < apply_at);
        assert!(position(&events, "migrate --noinput").is_none());
        assert!(report.puppet_changes);
        assert!(report.server_stopped);
    }

    #[test]
    fn failing_command_aborts_with_its_exit_status() {
        let fx = fixture(true, true);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events))
            .respond("generate-secrets", failed_output(4, "entropy pool on fire"));

        let err = run_upgrade(&fx, &runner).unwrap_err();
        assert_eq!(err.exit_status, Some(4));
        assert_eq!(err.code.as_str(), "external.command_failed");

        // Nothing after the failing step ran.
        let events = fx.events.borrow();
        assert!(position(&events, "restart-server").is_none());
        assert!(position(&events, "purge-old-deployments").is_none());
    }

    #[test]
    fn steps_run_in_documented_order() {
        let fx = fixture(false, false);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events))
            .respond("showmigrations", ok_output(" [ ] 0100_add_topic_links\n"))
            .respond("apply-puppet --noop", failed_output(2, ""));

        let report = run_upgrade(&fx, &runner).unwrap();

        assert_eq!(
            report.steps,
            vec![
                "compat-fixup",
                "os-packages",
                "provision",
                "secrets",
                "static-assets",
                "detect-migrations",
                "detect-puppet-changes",
                "stop-server",
                "puppet-apply",
                "migrate",
                "restart-server",
                "purge-deployments",
            ]
        );
    }

    #[test]
    fn from_git_builds_assets_instead_of_copying() {
        let mut fx = fixture(true, true);
        fx.flags.from_git = true;
        let runner = ScriptedRunner::new(Rc::clone(&fx.events));

        run_upgrade(&fx, &runner).unwrap();

        let events = fx.events.borrow();
        assert!(position(&events, "build-static-assets").is_some());
        assert!(position(&events, "cp -rT").is_none());
    }

    #[test]
    fn tarball_deploy_copies_prebuilt_assets() {
        let fx = fixture(true, true);
        let runner = ScriptedRunner::new(Rc::clone(&fx.events));

        run_upgrade(&fx, &runner).unwrap();

        let events = fx.events.borrow();
        assert!(position(&events, "cp -rT").is_some());
        assert!(position(&events, "build-static-assets").is_none());
    }

    #[test]
    fn compat_fixup_copies_legacy_settings_when_marker_present() {
        let fx = fixture(true, true);
        let legacy_dir = fx.flags.deploy_path.join("app");
        std::fs::create_dir(&legacy_dir).unwrap();
        std::fs::write(legacy_dir.join("local_settings.py"), "LEGACY = True\n").unwrap();

        let runner = ScriptedRunner::new(Rc::clone(&fx.events));
        run_upgrade(&fx, &runner).unwrap();

        let migrated = fx.paths.config_dir.join("settings.py");
        assert_eq!(
            std::fs::read_to_string(migrated).unwrap(),
            "LEGACY = True\n"
        );
    }
}
