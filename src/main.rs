use utxo_ledger::cli::commands::run_cli;

fn main() -> anyhow::Result<()> {
    // Configuration is resolved inside the CLI once the data directory is known
    run_cli()?;

    Ok(())
}
