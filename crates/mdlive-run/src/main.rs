use clap::Parser;

fn main() -> miette::Result<()> {
    mdlive_run::Cli::parse().run()
}
