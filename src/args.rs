use clap::Parser;
use shadow_rs::shadow;

shadow!(build);

/// Command line args.
#[derive(Parser)]
#[clap(version = build::CLAP_LONG_VERSION)]
#[clap(about = "Submission judge orchestrator.", long_about = None)]
pub struct Args {
  /// Extra config file search paths, checked after `/etc/judge/judge.*`.
  #[clap(short, long, value_parser)]
  pub config_search_path: Vec<String>,
}
