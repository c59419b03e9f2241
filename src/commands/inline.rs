use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use stagehand::inline::{self, InlineReport, DEFAULT_CSS_PATH, DEFAULT_TEMPLATES_DIR};

use super::CmdResult;

#[derive(Args)]
pub struct InlineArgs {
    /// Directory scanned for <name>.source.html templates
    #[arg(long, default_value = DEFAULT_TEMPLATES_DIR)]
    pub templates_dir: PathBuf,

    /// Stylesheet whose rules are inlined into the templates
    #[arg(long, default_value = DEFAULT_CSS_PATH)]
    pub css: PathBuf,
}

#[derive(Serialize)]
pub struct InlineOutput {
    pub command: String,
    pub templates_dir: String,
    pub css: String,
    #[serde(flatten)]
    pub report: InlineReport,
}

pub fn run(args: InlineArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<InlineOutput> {
    let report = inline::run(&args.templates_dir, &args.css)?;

    Ok((
        InlineOutput {
            command: "inline.run".to_string(),
            templates_dir: args.templates_dir.display().to_string(),
            css: args.css.display().to_string(),
            report,
        },
        0,
    ))
}
