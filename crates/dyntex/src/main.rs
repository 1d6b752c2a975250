mod cli;
mod output;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing(cli.verbose);

    match cli.command {
        Command::List => run::list(),
        Command::Render(args) => run::render(args),
        Command::Gallery(args) => run::gallery(args),
    }
}
