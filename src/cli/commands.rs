use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "architect-ledger")]
pub struct Opt {
    #[arg(long, global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(help = "Enable mining mode and send rewards to ACCOUNT")]
        miner: Option<String>,
    },
    #[command(name = "printchain", about = "Print every block of a running node")]
    Printchain {
        #[arg(long, help = "Node to ask (defaults to the configured address)")]
        node: Option<String>,
    },
    #[command(name = "getbalance", about = "Get the confirmed balance of an account")]
    GetBalance {
        #[arg(help = "Account identifier (a hex public key or a miner id)")]
        account: String,
        #[arg(long, help = "Node to ask (defaults to the configured address)")]
        node: Option<String>,
    },
    #[command(name = "keygen", about = "Generate an Ed25519 keypair")]
    Keygen,
    #[command(name = "send", about = "Sign a transfer and submit it to a node")]
    Send {
        #[arg(help = "Sender private key (PKCS#8, hex) as printed by keygen")]
        key: String,
        #[arg(help = "Recipient account")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
        #[arg(long, help = "Node to submit to (defaults to the configured address)")]
        node: Option<String>,
    },
}
