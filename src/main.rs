use std::{env, ffi::OsStr, io, str::FromStr};

use argp::{FromArgValue, FromArgs};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

pub mod cmd;
pub mod obj;
pub mod util;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(()),
        })
    }
}

impl FromArgValue for LogLevel {
    fn from_arg_value(value: &OsStr) -> Result<Self, String> {
        String::from_arg_value(value)
            .and_then(|s| Self::from_str(&s).map_err(|_| "Invalid log level".to_string()))
    }
}

#[derive(FromArgs, Debug)]
/// Size metrics and BSS ordering checks for makerom linker maps.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(option, short = 'L')]
    /// Minimum logging level. (Default: info)
    /// Possible values: error, warn, info, debug, trace
    log_level: Option<LogLevel>,
    #[argp(switch)]
    /// Disable color output. (env: NO_COLOR)
    no_color: bool,
}

#[derive(FromArgs, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Bss(cmd::bss::Args),
    Sizes(cmd::sizes::Args),
}

/// Global color override, if any. Colors are only ever forced off, so output
/// redirected to a file stays plain.
fn color_override(no_color: bool, ansi_enabled: bool) -> Option<bool> {
    (no_color || !ansi_enabled).then_some(false)
}

fn main() {
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);

    let no_color = args.no_color || env::var_os("NO_COLOR").is_some();
    let ansi_enabled = !no_color && enable_ansi_support::enable_ansi_support().is_ok();
    if let Some(enabled) = color_override(no_color, ansi_enabled) {
        owo_colors::set_override(enabled);
    }
    let use_colors =
        ansi_enabled && supports_color::on(supports_color::Stream::Stderr).is_some();

    let format =
        tracing_subscriber::fmt::format().with_ansi(use_colors).with_target(false).without_time();
    let builder = tracing_subscriber::fmt().event_format(format).with_writer(io::stderr);
    if let Some(level) = args.log_level {
        builder
            .with_max_level(match level {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            })
            .init();
    } else {
        builder
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    }

    let result = match args.command {
        SubCommand::Bss(c_args) => cmd::bss::run(c_args),
        SubCommand::Sizes(c_args) => cmd::sizes::run(c_args),
    };
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}
