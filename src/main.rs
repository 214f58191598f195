use std::time::Duration;

use myslt::reports::{render_vas_bundles, vas_bundles, BillReminder, BillStatus, ProfileInfo};
use myslt::spike::detect_spike;
use myslt::summary::{render_daily_summary, summarize};
use myslt::usage::usage_overview;
use myslt::{logging, AuthenticatedClient, ClientError, Config, SpikeTracker};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

const USAGE_TEXT: &str = "\
usage: myslt [command] [--json]

commands:
  usage                       current package usage (default)
  summary                     daytime / nighttime / total breakdown
  profile                     subscriber name and package
  bill                        bill status
  bill-payment                latest bill payment reminder
  vas                         active VAS bundles
  extra-gb                    extra GB details
  spike <gb> [--threshold <gb>]
                              check a usage delta against the threshold
  monitor [--interval <secs>] poll usage and report spikes between polls
  help                        show this help

configuration is read from MYSLT_* environment variables";

const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    message: String,
    exit_code: i32,
}

impl CliError {
    fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    fn usage(message: impl Into<String>) -> Self {
        Self::new(message, 2)
    }
}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        Self::new(err.to_string(), 1)
    }
}

type CliResult<T> = Result<T, CliError>;

#[derive(Debug, PartialEq)]
enum CliCommand {
    Help,
    Usage,
    Summary,
    Profile,
    Bill,
    BillPayment,
    Vas,
    ExtraGb,
    Spike {
        usage_diff: f64,
        threshold: Option<f64>,
    },
    Monitor {
        interval_secs: u64,
    },
}

#[derive(Debug, PartialEq)]
struct Cli {
    command: CliCommand,
    json: bool,
}

impl Cli {
    fn parse(args: &[String]) -> CliResult<Self> {
        let json = args.iter().any(|arg| arg == "--json");
        let args = args
            .iter()
            .filter(|arg| arg.as_str() != "--json")
            .cloned()
            .collect::<Vec<_>>();

        let Some(first) = args.first() else {
            return Ok(Self {
                command: CliCommand::Usage,
                json,
            });
        };

        let simple = |command: CliCommand, name: &str| {
            if args.len() != 1 {
                return Err(CliError::usage(format!("usage: myslt {} [--json]", name)));
            }
            Ok(command)
        };

        let command = match first.as_str() {
            "-h" | "--help" | "help" => CliCommand::Help,
            "usage" => simple(CliCommand::Usage, "usage")?,
            "summary" => simple(CliCommand::Summary, "summary")?,
            "profile" => simple(CliCommand::Profile, "profile")?,
            "bill" => simple(CliCommand::Bill, "bill")?,
            "bill-payment" => simple(CliCommand::BillPayment, "bill-payment")?,
            "vas" => simple(CliCommand::Vas, "vas")?,
            "extra-gb" => simple(CliCommand::ExtraGb, "extra-gb")?,
            "spike" => parse_spike(&args[1..])?,
            "monitor" => parse_monitor(&args[1..])?,
            _ => return Err(CliError::usage(format!("unknown command: {}", first))),
        };
        Ok(Self { command, json })
    }
}

fn parse_spike(args: &[String]) -> CliResult<CliCommand> {
    const SPIKE_USAGE: &str = "usage: myslt spike <gb> [--threshold <gb>] [--json]";
    let mut usage_diff = None;
    let mut threshold = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--threshold" => {
                i += 1;
                let raw = args.get(i).ok_or_else(|| CliError::usage(SPIKE_USAGE))?;
                threshold = Some(parse_gb(raw)?);
            }
            raw if usage_diff.is_none() => usage_diff = Some(parse_gb(raw)?),
            _ => return Err(CliError::usage(SPIKE_USAGE)),
        }
        i += 1;
    }
    let usage_diff = usage_diff.ok_or_else(|| CliError::usage(SPIKE_USAGE))?;
    Ok(CliCommand::Spike {
        usage_diff,
        threshold,
    })
}

fn parse_monitor(args: &[String]) -> CliResult<CliCommand> {
    const MONITOR_USAGE: &str = "usage: myslt monitor [--interval <secs>]";
    match args {
        [] => Ok(CliCommand::Monitor {
            interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
        }),
        [flag, raw] if flag == "--interval" => {
            let interval_secs = raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| CliError::usage(format!("invalid interval: {}", raw)))?;
            Ok(CliCommand::Monitor { interval_secs })
        }
        _ => Err(CliError::usage(MONITOR_USAGE)),
    }
}

fn parse_gb(raw: &str) -> CliResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| CliError::usage(format!("not a number: {}", raw)))
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("myslt: {}", err.message);
        std::process::exit(err.exit_code);
    }
}

fn run() -> CliResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = Cli::parse(&args)?;

    match cli.command {
        CliCommand::Help => {
            println!("{}", USAGE_TEXT);
            Ok(())
        }
        CliCommand::Spike {
            usage_diff,
            threshold,
        } => {
            let report = detect_spike(usage_diff, threshold)?;
            emit(cli.json, &report, || report.message.clone())
        }
        command => {
            let config = Config::from_env()?;
            let client = AuthenticatedClient::new(
                config.client.clone(),
                config.username.clone(),
                config.password.clone(),
            )?;
            run_account_command(&client, &config, command, cli.json)
        }
    }
}

fn run_account_command(
    client: &AuthenticatedClient,
    config: &Config,
    command: CliCommand,
    json: bool,
) -> CliResult<()> {
    match command {
        CliCommand::Usage => {
            let bucket = usage_overview(&client.get_usage_summary(&config.subscriber_id)?)?;
            emit(json, &bucket, || {
                format!(
                    "Usage: {}GB out of {}GB ({:.1}%)",
                    bucket.used, bucket.limit, bucket.percentage
                )
            })
        }
        CliCommand::Summary => {
            let summary = summarize(&client.get_usage_summary(&config.subscriber_id)?)?;
            emit(json, &summary, || render_daily_summary(&summary))
        }
        CliCommand::Profile => {
            let profile = ProfileInfo::from_envelope(&client.get_profile(&config.subscriber_id)?)?;
            emit(json, &profile, || {
                format!("Profile: {}, Package: {}", profile.full_name, profile.package)
            })
        }
        CliCommand::Bill => {
            let status = BillStatus::from_envelope(
                &client.get_bill_status(&config.tp_no, &config.account_no)?,
            )?;
            emit(json, &status, || format!("Bill status: {}", status.status))
        }
        CliCommand::BillPayment => {
            let reminder = BillReminder::from_envelope(
                &client.get_bill_payment_request(&config.tp_no, &config.account_no)?,
            )?;
            emit(json, &reminder, || reminder.render())
        }
        CliCommand::Vas => {
            let bundles = vas_bundles(&client.get_vas_bundles(&config.subscriber_id)?)?;
            emit(json, &bundles, || render_vas_bundles(&bundles))
        }
        CliCommand::ExtraGb => {
            let envelope = client.get_extra_gb(&config.subscriber_id)?;
            let data = envelope.require_success("extra GB")?;
            emit(json, data, || render_extra_gb(data))
        }
        CliCommand::Monitor { interval_secs } => monitor(client, config, interval_secs, json),
        CliCommand::Help | CliCommand::Spike { .. } => Ok(()),
    }
}

/// Polls the usage summary forever, reporting spikes between polls. Failed
/// polls are logged and skipped; the next poll compares against the last
/// successful reading.
fn monitor(
    client: &AuthenticatedClient,
    config: &Config,
    interval_secs: u64,
    json: bool,
) -> CliResult<()> {
    let mut tracker = SpikeTracker::new(config.spike_threshold);
    tracing::info!(interval_secs, threshold = config.spike_threshold, "monitoring usage");
    loop {
        let reading = client
            .get_usage_summary(&config.subscriber_id)
            .and_then(|envelope| usage_overview(&envelope));
        match reading {
            Ok(bucket) => {
                if let Some(report) = tracker.observe(bucket.used)? {
                    if report.spiked {
                        emit(json, &report, || report.message.clone())?;
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "usage poll failed"),
        }
        std::thread::sleep(Duration::from_secs(interval_secs));
    }
}

/// The extra GB payload has no fixed shape; list its top-level fields.
fn render_extra_gb(data: &Value) -> String {
    let Some(fields) = data.as_object().filter(|fields| !fields.is_empty()) else {
        return "No extra GB information available.".to_string();
    };
    let mut lines = vec!["Extra GB:".to_string()];
    for (key, value) in fields {
        let rendered = match value {
            Value::String(text) => text.clone(),
            Value::Null => "N/A".to_string(),
            other => other.to_string(),
        };
        lines.push(format!("  {}: {}", key, rendered));
    }
    lines.join("\n")
}

fn emit<T, F>(json: bool, value: &T, text: F) -> CliResult<()>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    if json {
        let rendered = serde_json::to_string_pretty(value)
            .map_err(|err| CliError::new(format!("failed to encode output: {}", err), 1))?;
        println!("{}", rendered);
    } else {
        println!("{}", text());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_defaults_to_usage() {
        let cli = Cli::parse(&[]).expect("parse");
        assert_eq!(
            cli,
            Cli {
                command: CliCommand::Usage,
                json: false
            }
        );
    }

    #[test]
    fn json_flag_is_accepted_anywhere() {
        let cli = Cli::parse(&args(&["--json", "summary"])).expect("parse");
        assert_eq!(cli.command, CliCommand::Summary);
        assert!(cli.json);

        let cli = Cli::parse(&args(&["bill-payment", "--json"])).expect("parse");
        assert_eq!(cli.command, CliCommand::BillPayment);
        assert!(cli.json);
    }

    #[test]
    fn simple_commands_reject_extra_arguments() {
        let err = Cli::parse(&args(&["profile", "extra"])).expect_err("extra arg");
        assert_eq!(err.exit_code, 2);
        assert!(err.message.contains("myslt profile"));
    }

    #[test]
    fn parse_supports_spike_with_threshold() {
        let cli = Cli::parse(&args(&["spike", "2.5", "--threshold", "1.5"])).expect("parse");
        assert_eq!(
            cli.command,
            CliCommand::Spike {
                usage_diff: 2.5,
                threshold: Some(1.5)
            }
        );

        let cli = Cli::parse(&args(&["spike", "--threshold", "3", "0.2"])).expect("parse");
        assert_eq!(
            cli.command,
            CliCommand::Spike {
                usage_diff: 0.2,
                threshold: Some(3.0)
            }
        );
    }

    #[test]
    fn spike_requires_numeric_delta() {
        assert!(Cli::parse(&args(&["spike"])).is_err());
        assert!(Cli::parse(&args(&["spike", "lots"])).is_err());
        assert!(Cli::parse(&args(&["spike", "1", "2"])).is_err());
        assert!(Cli::parse(&args(&["spike", "1", "--threshold"])).is_err());
    }

    #[test]
    fn parse_supports_monitor_interval() {
        let cli = Cli::parse(&args(&["monitor"])).expect("parse");
        assert_eq!(
            cli.command,
            CliCommand::Monitor {
                interval_secs: DEFAULT_MONITOR_INTERVAL_SECS
            }
        );
        let cli = Cli::parse(&args(&["monitor", "--interval", "60"])).expect("parse");
        assert_eq!(cli.command, CliCommand::Monitor { interval_secs: 60 });
        assert!(Cli::parse(&args(&["monitor", "--interval", "0"])).is_err());
    }

    #[test]
    fn unknown_command_is_a_usage_error() {
        let err = Cli::parse(&args(&["refresh"])).expect_err("unknown");
        assert_eq!(err.exit_code, 2);
        assert_eq!(err.message, "unknown command: refresh");
    }

    #[test]
    fn extra_gb_text_lists_fields() {
        let data = serde_json::json!({
            "packageName": "Extra GB 10",
            "remaining": 7.5,
            "expiry": null
        });
        assert_eq!(
            render_extra_gb(&data),
            "Extra GB:\n  expiry: N/A\n  packageName: Extra GB 10\n  remaining: 7.5"
        );
        assert_eq!(
            render_extra_gb(&serde_json::json!({})),
            "No extra GB information available."
        );
    }

    #[test]
    fn client_errors_exit_with_one() {
        let err = CliError::from(ClientError::DataShape("missing".to_string()));
        assert_eq!(err.exit_code, 1);
        assert!(err.message.contains("missing"));
    }
}
