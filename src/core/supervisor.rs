//! Service supervision seam.
//!
//! The upgrade sequence needs to stop and start services, but which
//! supervision tool does that is an installation detail. The orchestrator
//! only talks to `ServiceController`; `ScriptController` is the production
//! implementation (project-local helper scripts plus the supervisor control
//! tool, both driven through a `ProcessRunner`).

use crate::error::Result;
use crate::paths::DeployPaths;
use crate::runner::{ProcessRunner, RunRequest};

/// Supervisor control tool used by the production controller.
pub const DEFAULT_SUPERVISOR_CTL: &str = "supervisorctl";

/// Background service that keeps the full-text-search index current.
/// Non-critical path: stopped first, restarted last.
pub const SEARCH_INDEX_SERVICE: &str = "search-index-updater";

pub trait ServiceController {
    /// Stop the search-index updater (outside the critical path).
    fn stop_search_indexer(&self) -> Result<()>;

    /// Start the search-index updater again, after everything else is up.
    fn start_search_indexer(&self) -> Result<()>;

    /// Stop the server process groups (workers, web, realtime).
    fn stop_server(&self) -> Result<()>;

    /// Restart the server; safe to call whether or not it was stopped.
    fn restart_server(&self) -> Result<()>;
}

pub struct ScriptController<'a> {
    runner: &'a dyn ProcessRunner,
    paths: &'a DeployPaths,
    supervisor_ctl: String,
}

impl<'a> ScriptController<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, paths: &'a DeployPaths) -> Self {
        Self {
            runner,
            paths,
            supervisor_ctl: DEFAULT_SUPERVISOR_CTL.to_string(),
        }
    }

    pub fn with_supervisor_ctl(mut self, tool: impl Into<String>) -> Self {
        self.supervisor_ctl = tool.into();
        self
    }

    fn script_path(&self, relative: &str) -> String {
        self.paths.script(relative).display().to_string()
    }
}

impl ServiceController for ScriptController<'_> {
    fn stop_search_indexer(&self) -> Result<()> {
        self.runner
            .check_run(&RunRequest::new(
                &self.supervisor_ctl,
                &["stop", SEARCH_INDEX_SERVICE],
            ))
            .map(|_| ())
    }

    fn start_search_indexer(&self) -> Result<()> {
        self.runner
            .check_run(&RunRequest::new(
                &self.supervisor_ctl,
                &["start", SEARCH_INDEX_SERVICE],
            ))
            .map(|_| ())
    }

    fn stop_server(&self) -> Result<()> {
        self.runner
            .check_run(&RunRequest::new(self.script_path("scripts/stop-server"), &[]))
            .map(|_| ())
    }

    fn restart_server(&self) -> Result<()> {
        self.runner
            .check_run(&RunRequest::new(
                self.script_path("scripts/restart-server"),
                &[],
            ))
            .map(|_| ())
    }
}
