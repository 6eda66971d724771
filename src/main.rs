use clap::Parser;
use slotgrid::cli::commands::Cli;
use slotgrid::cli::handlers;

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
