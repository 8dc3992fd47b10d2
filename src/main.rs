use anyhow::Result;
use clap::Parser;
use college_mail_sorter::auth::{
    FileCredentialStore, CLIENT_SECRETS_PATH, REQUIRED_SCOPES, TOKEN_CACHE_PATH,
};
use college_mail_sorter::cli::{self, Cli};
use college_mail_sorter::config::{Config, CONFIG_PATH};
use college_mail_sorter::login::InstalledAppFlow;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let _cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("college_mail_sorter=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::load(Path::new(CONFIG_PATH)).await?;
    let store = FileCredentialStore::new(TOKEN_CACHE_PATH);
    let flow = InstalledAppFlow::new(CLIENT_SECRETS_PATH, REQUIRED_SCOPES);

    let report = cli::run(&config, &store, &flow).await?;
    println!("{}", cli::format_report(&report));

    Ok(())
}

/// Print the error and its cause chain
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }
}
