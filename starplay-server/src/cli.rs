use clap::Parser;
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "starplay-server",
    version,
    about = "StarPlay family server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the YAML config; overrides CONFIG_PATH.
    #[arg(long)]
    pub config: Option<PathBuf>,
}
