use clap::{Parser, Subcommand};
use obscura_wallet::Wallet;

#[derive(Parser)]
#[command(name = "obscura")]
#[command(about = "Obscura blockchain CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full node
    Node,
    /// Start the miner
    Miner,
    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Generate a new keypair and print its address and private key
    Generate,
    /// Import a keypair from a hex-encoded private key and print its address
    Import {
        /// Hex-encoded private key, with or without a leading 0x
        private_key: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Node => {
            // TODO: wire up ChainDb, RosterManager and the p2p/RPC seams.
            println!("Obscura CLI stub: node");
        }
        Commands::Miner => {
            // TODO: wire up Miner::run against a live chain and tx pool.
            println!("Obscura CLI stub: miner");
        }
        Commands::Wallet { command } => wallet_command(command),
    }
}

fn wallet_command(command: WalletCommands) {
    match command {
        WalletCommands::Generate => {
            let wallet = Wallet::generate();
            println!("address:     0x{}", hex::encode(wallet.address()));
            println!("private key: 0x{}", wallet.private_key_hex());
        }
        WalletCommands::Import { private_key } => match Wallet::from_hex(&private_key) {
            Ok(wallet) => println!("address: 0x{}", hex::encode(wallet.address())),
            Err(err) => eprintln!("invalid private key: {err}"),
        },
    }
}
