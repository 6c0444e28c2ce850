use calicoctl::{cli::Cli, commands::execute};
use clap::Parser;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    execute(cli)
}
