#![deny(clippy::all, warnings)]

use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use color_eyre::{eyre::eyre, Result};

mod cli;
mod commands;

use cli::VxCli;

fn main() -> Result<()> {
    color_eyre::install()?;
    CompleteEnv::with_factory(VxCli::command).complete();

    let cli = VxCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let code = commands::run(cli).map_err(|err| eyre!("{err:?}"))?;
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!(
        "vx={level},vx_cli={level},vx_core={level},vx_nvd={level},vx_ghsa={level},vx_http={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
