use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use stagehand::paths::DeployPaths;
use stagehand::runner::SystemRunner;
use stagehand::supervisor::ScriptController;
use stagehand::upgrade::{self, UpgradeFlags, UpgradeReport, Upgrader};

use super::CmdResult;

#[derive(Args)]
pub struct UpgradeArgs {
    /// Directory containing the versioned deployment to activate
    pub deploy_path: PathBuf,

    /// Skip the configuration-management apply (and OS package upgrade)
    #[arg(long)]
    pub skip_puppet: bool,

    /// Skip migration detection and execution
    #[arg(long)]
    pub skip_migrations: bool,

    /// Deployment checked out from git; build static assets instead of
    /// copying prebuilt ones
    #[arg(long)]
    pub from_git: bool,
}

#[derive(Serialize)]
pub struct UpgradeOutput {
    pub command: String,
    pub deploy_path: String,
    pub skip_puppet: bool,
    pub skip_migrations: bool,
    pub from_git: bool,
    #[serde(flatten)]
    pub report: UpgradeReport,
}

pub fn run(args: UpgradeArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<UpgradeOutput> {
    upgrade::require_root()?;

    let flags = UpgradeFlags {
        deploy_path: args.deploy_path.clone(),
        skip_puppet: args.skip_puppet,
        skip_migrations: args.skip_migrations,
        from_git: args.from_git,
    };

    let paths = DeployPaths::for_deploy(&flags.deploy_path);
    let runner = SystemRunner;
    let services = ScriptController::new(&runner, &paths);

    let report = Upgrader::new(&flags, &paths, &runner, &services).run()?;

    Ok((
        UpgradeOutput {
            command: "upgrade.run".to_string(),
            deploy_path: args.deploy_path.display().to_string(),
            skip_puppet: args.skip_puppet,
            skip_migrations: args.skip_migrations,
            from_git: args.from_git,
            report,
        },
        0,
    ))
}
