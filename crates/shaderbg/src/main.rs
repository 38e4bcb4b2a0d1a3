mod catalog;
mod cli;
#[cfg(unix)]
mod control;
mod paths;
mod run;
mod state;
#[cfg(target_os = "linux")]
mod x11;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
