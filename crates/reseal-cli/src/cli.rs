//! Command-line entrypoint for encrypting an instance's volumes.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use reseal_aws::Ec2Provider;
use reseal_config::{ConfigError, RunSettings, SettingsOverrides};
use reseal_core::{EncryptionService, RunRequest};
use reseal_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics, init_logging};
use uuid::Uuid;

use crate::client::{AppContext, CliError, CliResult, TelemetryEmitter};
use crate::commands::encrypt::handle_encrypt;
use crate::commands::plan::handle_plan;
use crate::prompt::{INSTANCE_ID, KMS_KEY_ID, resolve_value};

/// Parses CLI arguments, executes the run, and handles user-facing telemetry
/// emission. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli);
    let trace_id = Uuid::new_v4().to_string();
    if let Err(err) = install_logging(&cli) {
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }
    let telemetry = TelemetryEmitter::from_env();

    let result = dispatch(cli).await;

    let (exit_code, message, outcome) = match result {
        Ok(()) => (0, None, "success"),
        Err(err) => {
            let exit_code = err.exit_code();
            let message = err.display_message();
            eprintln!("error: {message}");
            (exit_code, Some(message), "error")
        }
    };

    if let Some(emitter) = &telemetry {
        emitter
            .emit(
                &trace_id,
                command_name,
                outcome,
                exit_code,
                message.as_deref(),
            )
            .await;
    }

    exit_code
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let settings = resolve_settings(&cli)?;
    let request = resolve_request(cli.kms_key_id, cli.instance_id)?;
    let metrics = Metrics::new().map_err(CliError::failure)?;
    let provider = Ec2Provider::from_env().await;

    let ctx = AppContext {
        service: EncryptionService::new(provider, settings, metrics.clone()),
        metrics,
        output: cli.output,
        metrics_file: cli.metrics_file,
    };

    if cli.dry_run {
        handle_plan(&ctx, &request).await
    } else {
        handle_encrypt(&ctx, &request).await
    }
}

#[derive(Parser)]
#[command(
    name = "reseal",
    about = "Encrypt the EBS volumes of an EC2 instance in place"
)]
pub(crate) struct Cli {
    /// KMS key used for every replacement volume.
    #[arg(value_name = "KMS_KEY_ID")]
    pub(crate) kms_key_id: Option<String>,
    /// Instance whose volumes are encrypted.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: Option<String>,
    #[arg(long, help = "Seconds between state probes while waiting")]
    pub(crate) poll_interval_secs: Option<u64>,
    #[arg(long, help = "Give up waiting after this many probes")]
    pub(crate) max_poll_attempts: Option<u32>,
    #[arg(long, help = "Classify volumes and print the plan without changing anything")]
    pub(crate) dry_run: bool,
    #[arg(
        long = "output",
        alias = "format",
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for the run summary"
    )]
    pub(crate) output: OutputFormat,
    #[arg(
        long,
        env = "RESEAL_METRICS_FILE",
        help = "Write Prometheus text exposition here after the run"
    )]
    pub(crate) metrics_file: Option<PathBuf>,
    #[arg(long, env = "RESEAL_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, env = "RESEAL_LOG_FORMAT", value_parser = parse_log_format)]
    pub(crate) log_format: Option<LogFormat>,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

const fn command_label(cli: &Cli) -> &'static str {
    if cli.dry_run { "plan" } else { "encrypt" }
}

fn parse_log_format(input: &str) -> Result<LogFormat, String> {
    input.parse()
}

fn install_logging(cli: &Cli) -> CliResult<()> {
    let config = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.unwrap_or_else(LogFormat::infer),
        build_sha: option_env!("RESEAL_BUILD_SHA").unwrap_or("dev"),
    };
    init_logging(&config).map_err(CliError::failure)
}

/// Flags win over `RESEAL_*` environment values, which win over defaults.
pub(crate) fn resolve_settings(cli: &Cli) -> CliResult<RunSettings> {
    let env = SettingsOverrides::from_env().map_err(config_error)?;
    let flags = SettingsOverrides {
        poll_interval_secs: cli.poll_interval_secs,
        max_poll_attempts: cli.max_poll_attempts,
        ..SettingsOverrides::default()
    };
    RunSettings::from_overrides(&env.merged_with(flags)).map_err(config_error)
}

pub(crate) fn resolve_request(
    kms_key_id: Option<String>,
    instance_id: Option<String>,
) -> CliResult<RunRequest> {
    let kms_key_id = resolve_value(kms_key_id, &KMS_KEY_ID)?;
    let instance_id = resolve_value(instance_id, &INSTANCE_ID)?;
    if !instance_id.starts_with("i-") {
        return Err(CliError::validation(format!(
            "instance id '{instance_id}' must start with 'i-'"
        )));
    }
    Ok(RunRequest {
        instance_id,
        kms_key_id,
    })
}

fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::InvalidField {
            field,
            reason,
            value,
        } => value.map_or_else(
            || CliError::validation(format!("invalid {field}: {reason}")),
            |value| CliError::validation(format!("invalid {field}: {reason} (got '{value}')")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("reseal").chain(args.iter().copied()))
    }

    #[test]
    fn positional_arguments_are_key_then_instance() -> Result<(), clap::Error> {
        let cli = parse(&["arn:aws:kms:us-east-1:111:key/abc", "i-0abc"])?;
        assert_eq!(
            cli.kms_key_id.as_deref(),
            Some("arn:aws:kms:us-east-1:111:key/abc")
        );
        assert_eq!(cli.instance_id.as_deref(), Some("i-0abc"));
        assert_eq!(cli.output, OutputFormat::Table);
        assert!(!cli.dry_run);
        Ok(())
    }

    #[test]
    fn command_label_tracks_dry_run() -> Result<(), clap::Error> {
        assert_eq!(command_label(&parse(&["--dry-run"])?), "plan");
        assert_eq!(command_label(&parse(&[])?), "encrypt");
        Ok(())
    }

    #[test]
    fn log_format_flag_is_parsed() -> Result<(), clap::Error> {
        let cli = parse(&["--log-format", "json", "--output", "json"])?;
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(parse(&["--log-format", "xml"]).is_err());
        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> anyhow::Result<()> {
        let cli = parse(&["--poll-interval-secs", "5", "--max-poll-attempts", "12"])?;
        let settings = resolve_settings(&cli).map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.max_poll_attempts, Some(12));
        Ok(())
    }

    #[test]
    fn zero_poll_interval_is_a_validation_error() -> Result<(), clap::Error> {
        let cli = parse(&["--poll-interval-secs", "0"])?;
        let err = resolve_settings(&cli).err();
        assert!(matches!(
            err,
            Some(CliError::Validation(ref message)) if message.contains("poll_interval")
        ));
        Ok(())
    }

    #[test]
    fn instance_id_must_look_like_an_instance() {
        let err = resolve_request(Some("key".into()), Some("vol-123".into())).err();
        assert_eq!(err.map(|err| err.exit_code()), Some(2));
    }

    #[test]
    fn request_trims_supplied_values() -> anyhow::Result<()> {
        let request = resolve_request(Some(" key ".into()), Some(" i-0abc ".into()))
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(request.kms_key_id, "key");
        assert_eq!(request.instance_id, "i-0abc");
        Ok(())
    }
}
