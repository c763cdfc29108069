use crate::config::Config;
use crate::core::{Block, Blockchain, Ledger, Transfer};
use crate::wallet::{pubkey_hash_to_address, Keystore};
use crate::{LedgerError, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledgerd")]
#[command(about = "Single-node UTXO ledger with proof-of-work block admission")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Data directory")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, help = "Proof-of-work difficulty (leading zero bits)")]
    pub difficulty: Option<u32>,

    #[arg(long, help = "Give up mining a block after this many seconds")]
    pub mining_timeout: Option<u64>,

    #[arg(long, help = "Enable debug logging")]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the genesis block paying the reward to an address
    Genesis {
        #[arg(long, help = "Reward address")]
        address: String,
    },

    /// Send funds; repeat the flags to batch several transfers into one block
    Send {
        #[arg(long, required = true, help = "Sender address")]
        from: Vec<String>,
        #[arg(long, required = true, help = "Recipient address")]
        to: Vec<String>,
        #[arg(long, required = true, help = "Amount in base units")]
        amount: Vec<u64>,
    },

    /// Show the balance of an address
    Balance {
        #[arg(long)]
        address: String,
    },

    /// Show the head block
    LastBlock,

    /// List every block from head to genesis
    Blocks {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    /// Generate and store a new address
    NewAddress,

    /// List stored addresses
    ListAddresses,

    /// Print the hex private key of a stored address
    DumpPrivKey {
        #[arg(long)]
        address: String,
    },
}

#[derive(Serialize)]
struct BlockView {
    height: u64,
    hash: String,
    prev_hash: String,
    timestamp: u64,
    nonce: u64,
    transactions: Vec<TransactionView>,
}

#[derive(Serialize)]
struct TransactionView {
    hash: String,
    inputs: Vec<String>,
    outputs: Vec<OutputView>,
}

#[derive(Serialize)]
struct OutputView {
    value: u64,
    address: String,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            height: block.height,
            hash: block.hash.to_hex(),
            prev_hash: block.prev_hash.to_hex(),
            timestamp: block.timestamp,
            nonce: block.nonce,
            transactions: block.transactions.iter()
                .map(|tx| TransactionView {
                    hash: tx.hash.to_hex(),
                    inputs: tx.outpoints().map(|outpoint| outpoint.to_string()).collect(),
                    outputs: tx.outputs.iter()
                        .map(|output| OutputView {
                            value: output.value,
                            address: pubkey_hash_to_address(&output.pubkey_hash),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn format_timestamp(timestamp: u64) -> String {
    chrono::DateTime::from_timestamp(timestamp as i64, 0)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_block(block: &Block) {
    println!("📦 Block {}", block.height);
    println!("Hash: {}", block.hash);
    println!("Previous hash: {}", block.prev_hash);
    println!("Timestamp: {}", format_timestamp(block.timestamp));
    println!("Nonce: {}", block.nonce);
    println!("Transactions: {}", block.transactions.len());
    for tx in &block.transactions {
        println!("  💰 {}", tx.hash);
        for outpoint in tx.outpoints() {
            println!("    in  {}", outpoint);
        }
        for output in &tx.outputs {
            println!("    out {} -> {}", output.value, pubkey_hash_to_address(&output.pubkey_hash));
        }
    }
}

/// Pairs up repeated `--from/--to/--amount` flags.
fn collect_transfers(from: Vec<String>, to: Vec<String>, amount: Vec<u64>) -> Result<Vec<Transfer>> {
    if from.len() != to.len() || from.len() != amount.len() {
        return Err(LedgerError::Validation(format!(
            "Got {} senders, {} recipients and {} amounts",
            from.len(),
            to.len(),
            amount.len()
        )));
    }

    Ok(from.into_iter()
        .zip(to)
        .zip(amount)
        .map(|((from, to), amount)| Transfer { from, to, amount })
        .collect())
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging once
    let _ = if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).try_init()
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init()
    };

    let data_dir = cli.data_dir.unwrap_or_else(|| Config::default().storage.data_dir);
    let mut config = Config::load(&data_dir)?;
    if let Some(difficulty) = cli.difficulty {
        config.mining.difficulty = difficulty;
    }
    if let Some(secs) = cli.mining_timeout {
        config.mining.timeout_secs = Some(secs);
    }

    let chain = Blockchain::open(&config)?;
    let keystore = Keystore::open(chain.database())?;

    execute(cli.command, &chain, &keystore)
}

pub fn execute(command: Commands, chain: &Blockchain, keystore: &Keystore) -> Result<()> {
    let ledger = Ledger::new(chain, keystore);

    match command {
        Commands::Genesis { address } => {
            let existed = chain.head()?.is_some();
            let block = ledger.create_genesis(&address)?;
            if existed {
                println!("⚠️  Chain already initialized");
            } else {
                println!("🌱 Genesis block created, {} paid to {}", chain.coinbase_reward(), address);
            }
            println!("📦 Genesis hash: {}", block.hash);
        }

        Commands::Send { from, to, amount } => {
            let transfers = collect_transfers(from, to, amount)?;
            let block = ledger.send(&transfers)?;
            println!("✅ Block {} mined at height {}", block.hash, block.height);
            for transfer in &transfers {
                println!("  💸 {} -> {}: {}", transfer.from, transfer.to, transfer.amount);
            }
        }

        Commands::Balance { address } => {
            let balance = ledger.balance(&address, &[])?;
            println!("💰 Balance of {}: {}", address, balance);
        }

        Commands::LastBlock => {
            print_block(&chain.last_block()?);
        }

        Commands::Blocks { json } => {
            let blocks = chain.all_blocks()?;
            if json {
                let views: Vec<BlockView> = blocks.iter().map(BlockView::from).collect();
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                for block in &blocks {
                    print_block(block);
                    println!();
                }
            }
        }

        Commands::NewAddress => {
            let address = keystore.new_address()?;
            println!("🔑 {}", address);
        }

        Commands::ListAddresses => {
            let addresses = keystore.addresses()?;
            if addresses.is_empty() {
                println!("No addresses yet. Use 'ledgerd new-address' to create one.");
            }
            for address in addresses {
                println!("{}", address);
            }
        }

        Commands::DumpPrivKey { address } => {
            println!("{}", keystore.export_private_key(&address)?);
        }
    }

    Ok(())
}
