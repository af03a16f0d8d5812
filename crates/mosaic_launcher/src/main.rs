//! mosaic - bootstrap launcher
//!
//! Loads the runtime, core and ui libraries, hands control to `core_init`,
//! then loads and runs the application library. Every failure stage exits
//! with its own negative code:
//!
//! | Code | Stage                      |
//! |------|----------------------------|
//! | -1   | runtime library load       |
//! | -2   | core library load          |
//! | -3   | ui library load            |
//! | -4   | `core_init` lookup         |
//! | -5   | `core_exit` lookup         |
//! | -6   | `core_init` failed         |
//! | -7   | application library load   |
//! | -8   | `app_init` lookup          |
//!
//! On success the process exits with the application's return code.

mod error;
mod launcher;

use clap::Parser;
use launcher::{LaunchPlan, Launcher};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mosaic")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Application directory, relative to the parent of the search root
    #[arg(long, env = "MOSAIC_APP", default_value = "sidury")]
    app: String,

    /// Application library name
    #[arg(long, default_value = "client")]
    module: String,

    /// Directory holding the per-platform launcher libraries
    #[arg(long, env = "MOSAIC_BIN_DIR", default_value = "bin")]
    bin_dir: PathBuf,

    /// Windowing/base runtime library
    #[arg(long, default_value = "SDL2")]
    runtime_library: String,

    /// Core library exporting core_init and core_exit
    #[arg(long, default_value = "ch_core")]
    core_library: String,

    /// UI library
    #[arg(long, default_value = "imgui")]
    ui_library: String,

    /// Arguments passed through to core_init
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl From<Cli> for LaunchPlan {
    fn from(cli: Cli) -> Self {
        Self {
            bin_dir: cli.bin_dir,
            runtime_library: cli.runtime_library,
            core_library: cli.core_library,
            ui_library: cli.ui_library,
            app_path: cli.app,
            app_module: cli.module,
            args: cli.args,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let plan = LaunchPlan::from(Cli::parse());
    log::debug!("Launch plan: {:?}", plan);

    let code = {
        let mut launcher = Launcher::new();
        match launcher.run(&plan) {
            Ok(code) => code,
            Err(e) => {
                log::error!("{}", e);
                e.exit_code()
            }
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_builds_plan() {
        let cli = Cli::parse_from([
            "mosaic",
            "--app",
            "demo",
            "--bin-dir",
            "/opt/mosaic/bin",
            "--",
            "-map",
            "test",
        ]);
        let plan = LaunchPlan::from(cli);

        assert_eq!(plan.app_path, "demo");
        assert_eq!(plan.app_module, "client");
        assert_eq!(plan.bin_dir, PathBuf::from("/opt/mosaic/bin"));
        assert_eq!(plan.args, vec!["-map", "test"]);
    }
}
