mod app;
mod cli;
mod config;
mod error;
mod install;
mod manifest;
mod sync;
mod transport;
mod ui;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
