use clap::Parser;
use env_promote::sync::{
  DEFAULT_DESTINATION_FILENAME, DEFAULT_SOURCE_FILENAME, EnvSync, SyncOptions, SyncReport,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
  name = "env-promote",
  about = "Promote an env template onto another environment without losing its values",
  version,
  author
)]
struct Cli {
  /// Path to the source env file (uat/test/dev)
  #[arg(short, long, default_value = DEFAULT_SOURCE_FILENAME)]
  source: PathBuf,

  /// Path to the destination env file (prod)
  #[arg(short, long, default_value = DEFAULT_DESTINATION_FILENAME)]
  dest: PathBuf,

  /// Print the result; do not write the destination
  #[arg(long)]
  dry_run: bool,

  /// Append keys found only in the destination to the end of the output
  #[arg(
    long,
    default_value_t = true,
    num_args = 0..=1,
    default_missing_value = "true",
    action = clap::ArgAction::Set
  )]
  keep_unused: bool,

  /// When a key is missing in the destination, keep the source value instead of blank
  #[arg(long)]
  use_source_defaults: bool,

  /// If a destination value is empty, fill it from the source (non-empty values are never overwritten)
  #[arg(long)]
  fill_empty: bool,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

fn print_keys(label: &str, keys: &[String]) {
  if keys.is_empty() {
    return;
  }

  eprintln!("{} ({}):", label, keys.len());
  for key in keys {
    eprintln!("  {}", key);
  }
}

fn print_report(report: &SyncReport, dest: &Path) {
  print_keys("Missing in destination", &report.missing_keys);
  print_keys("Only in destination", &report.unused_keys);

  if report.written {
    eprintln!("Updated {}", dest.display());
  } else {
    print!("{}", report.output);
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  let options = SyncOptions {
    source_file: cli.source,
    destination_file: cli.dest.clone(),
    dry_run: cli.dry_run,
    keep_unused: cli.keep_unused,
    use_source_defaults: cli.use_source_defaults,
    fill_empty: cli.fill_empty,
  };

  let report = EnvSync::sync_with_options(options)?;
  print_report(&report, &cli.dest);

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let cli = Cli::try_parse_from(["env-promote"]).unwrap();
    assert_eq!(cli.source, PathBuf::from(DEFAULT_SOURCE_FILENAME));
    assert_eq!(cli.dest, PathBuf::from(DEFAULT_DESTINATION_FILENAME));
    assert!(cli.keep_unused);
    assert!(!cli.dry_run);
    assert!(!cli.use_source_defaults);
    assert!(!cli.fill_empty);
  }

  #[test]
  fn test_keep_unused_accepts_bare_flag_and_value() {
    let cli = Cli::try_parse_from(["env-promote", "--keep-unused"]).unwrap();
    assert!(cli.keep_unused);

    let cli = Cli::try_parse_from(["env-promote", "--keep-unused", "false"]).unwrap();
    assert!(!cli.keep_unused);

    let cli = Cli::try_parse_from(["env-promote", "--keep-unused=false", "--dry-run"]).unwrap();
    assert!(!cli.keep_unused);
    assert!(cli.dry_run);

    let cli = Cli::try_parse_from(["env-promote", "--keep-unused", "--fill-empty"]).unwrap();
    assert!(cli.keep_unused);
    assert!(cli.fill_empty);
  }
}
