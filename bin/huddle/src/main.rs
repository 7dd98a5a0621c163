//! Huddle lobby simulator binary.

mod cli;
mod config;
mod simulate;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    cli::run().await
}
