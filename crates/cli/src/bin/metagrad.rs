//! metagrad CLI binary entrypoint.

fn main() -> anyhow::Result<()> {
    metagrad_cli::app::run()?;
    Ok(())
}
