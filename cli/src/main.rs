mod commands;
mod lookup;
mod terminal;

use commands::{CommandLine, Commands, info, route};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose);

    match commands.command {
        Commands::Info => {
            print::header("about the tool");
            info::info()
        }
        Commands::Route(args) => route::route(args).await,
    }
}
