use anyhow::Result;
use snapm_cli::{Cli, Commands, Parser};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::try_init().ok();

    let cli = Cli::parse();
    let debug = cli.debug;

    let result: Result<()> = match cli.command {
        Commands::Snapset { subcommand } => subcommand.run().await,
        Commands::Schedule { subcommand } => subcommand.run().await,
        Commands::Diff { subcommand } => subcommand.run().await,
    };

    if let Err(err) = result {
        if debug {
            eprintln!("{err:?}");
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }
}
