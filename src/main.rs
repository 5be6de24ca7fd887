//! drive-recorder CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drive_recorder::cli::{
    app::{auth_provider, config_store, load_merged_config, run_record, EXIT_ERROR, EXIT_USAGE_ERROR},
    args::{Cli, Commands, RecordArgs, RecordOptions},
    auth_cmd::handle_auth_command,
    config_cmd::handle_config_command,
    presenter::Presenter,
};
use drive_recorder::domain::config::AppConfig;
use drive_recorder::domain::recording::Duration;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let presenter = Presenter::new();
    let store = config_store();

    let record = match cli.command {
        Some(Commands::Config { action }) => {
            if let Err(e) = handle_config_command(action, &store, &presenter).await {
                presenter.error(&e.to_string());
                return ExitCode::from(EXIT_ERROR);
            }
            return ExitCode::SUCCESS;
        }
        Some(Commands::Auth { action }) => {
            let config = load_merged_config(&store, AppConfig::empty()).await;
            let auth = auth_provider(&config);
            return match handle_auth_command(action, &auth, &store, &presenter).await {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::from(EXIT_ERROR),
                Err(e) => {
                    presenter.error(&e.to_string());
                    ExitCode::from(EXIT_ERROR)
                }
            };
        }
        Some(Commands::Record(args)) => args,
        None => cli.record,
    };

    // Reject bad CLI values before touching the microphone
    for (flag, value) in [("duration", &record.duration), ("max-duration", &record.max_duration)] {
        if let Some(Err(e)) = value.as_deref().map(str::parse::<Duration>) {
            presenter.error(&format!("Invalid {}: {}", flag, e));
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    }

    let config = load_merged_config(&store, cli_config(&record)).await;
    let options = match record_options(&config, record) {
        Ok(options) => options,
        Err(message) => {
            presenter.error(&message);
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    run_record(options).await
}

/// Log to stderr, filtered by RUST_LOG (default warn)
fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config layer contributed by command-line flags
fn cli_config(record: &RecordArgs) -> AppConfig {
    AppConfig {
        folder: record.folder.clone(),
        duration: record.duration.clone(),
        max_duration: record.max_duration.clone(),
        upload: if record.no_upload { Some(false) } else { None },
        ..Default::default()
    }
}

fn record_options(config: &AppConfig, record: RecordArgs) -> Result<RecordOptions, String> {
    let duration = match config.duration.as_ref() {
        Some(s) => Some(
            s.parse::<Duration>()
                .map_err(|e| format!("Invalid duration: {}", e))?,
        ),
        None => None,
    };
    let max_duration = match config.max_duration.as_ref() {
        Some(s) => s
            .parse::<Duration>()
            .map_err(|e| format!("Invalid max-duration: {}", e))?,
        None => Duration::default_max_duration(),
    };

    Ok(RecordOptions {
        duration,
        max_duration,
        folder: config.folder_or_default().to_string(),
        output: record.output,
        output_dir: config.output_dir(),
        upload: config.upload_or_default(),
        access_token: config.access_token.clone(),
        api_base_url: config.api_base_url.clone(),
    })
}
