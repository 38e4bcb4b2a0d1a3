use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const ENV_EFFECT: &str = "SHADER_BG_EFFECT";

#[derive(Parser, Debug)]
#[command(
    name = "shaderbg",
    author,
    version,
    about = "Live shader wallpaper for every display",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Effect to start with, by name, alias or index (e.g. `lorenz`, `3`).
    #[arg(long, value_name = "NAME", env = ENV_EFFECT)]
    pub effect: Option<String>,

    /// Configuration file to load instead of `<config dir>/config.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Update rate while the wallpaper is visible.
    #[arg(long, value_name = "FPS", value_parser = parse_rate)]
    pub high_rate: Option<f64>,

    /// Update rate while the wallpaper is mostly covered.
    #[arg(long, value_name = "FPS", value_parser = parse_rate)]
    pub low_rate: Option<f64>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`, `renderer=trace`).
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Skip window-system sampling and always render at the high rate.
    #[arg(long)]
    pub no_probe: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effect catalog with indices.
    List,
    /// Ask the running daemon to switch effects.
    Select {
        /// Effect name, alias or index.
        #[arg(value_name = "NAME|INDEX")]
        effect: String,
    },
    /// Ask the running daemon which effect is showing.
    Current,
    /// Print resolved config, state and socket locations.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_rate(value: &str) -> Result<f64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("rate must not be empty".to_string());
    }
    let rate: f64 = trimmed
        .parse()
        .map_err(|_| format!("invalid rate '{trimmed}'; expected frames per second"))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("rate must be a positive number, got {trimmed}"));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rate_accepts_positive_numbers() {
        assert_eq!(parse_rate("30").unwrap(), 30.0);
        assert_eq!(parse_rate(" 7.5 ").unwrap(), 7.5);
    }

    #[test]
    fn parse_rate_rejects_zero_and_garbage() {
        assert!(parse_rate("0").is_err());
        assert!(parse_rate("-4").is_err());
        assert!(parse_rate("fast").is_err());
        assert!(parse_rate("").is_err());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["shaderbg", "select", "plasma"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Select { ref effect }) if effect == "plasma"));

        let cli = Cli::try_parse_from(["shaderbg", "--no-probe", "--high-rate", "24"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.no_probe);
        assert_eq!(cli.run.high_rate, Some(24.0));
    }
}
