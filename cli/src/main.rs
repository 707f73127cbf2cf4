mod commands;
mod terminal;

use commands::device::{self, Action};
use commands::{CommandLine, Commands, discover};
use terminal::{print, spinner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLine::parse_args();

    spinner::init_logging(cli.verbose);

    match cli.command {
        Commands::Discover => {
            print::header("discovering devices");
            discover::discover(&cli.device).await
        }
        Commands::Prepare => device::run(&cli.device, Action::Prepare).await,
        Commands::Reboot => device::run(&cli.device, Action::Reboot).await,
        Commands::Exec { command } => device::run(&cli.device, Action::Exec(command)).await,
    }
}
