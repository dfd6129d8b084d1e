// Entry point for the ledger node CLI
use architect_ledger::{
    fetch_chain, send_tx, BlockchainError, Command, Config, Keypair, Ledger, Node, Opt, Peers,
    Server, SledStore, TcpTransport, Transaction,
};
use clap::Parser;
use log::{error, info, LevelFilter};
use std::process;
use std::sync::Arc;

fn main() {
    // Info level shows chain mutations and sync decisions without per-package noise
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(opt.config.as_deref())?;

    match opt.command {
        Command::StartNode { miner } => {
            let mut config = config;
            if let Some(miner) = miner {
                config.node.miner_id = Some(miner);
            }
            let addr = config.node.addr.clone();
            let peers = Arc::new(Peers::from_addrs(config.node.peers.clone()));

            // Each node gets its own database so several can share a data dir
            let store = SledStore::open(&config.node_db_path())?;
            info!("Using database at {}", store.get_path().display());

            let transport = Arc::new(TcpTransport::new(&addr, Arc::clone(&peers)));
            let node = Node::new(config, transport, Some(Box::new(store)));
            node.spawn_sync_timer()?;
            if node.get_config().is_miner() {
                node.start_mining()?;
            }

            let server = Server::new(Arc::clone(&node), peers, &addr);
            let result = server.run();
            node.shutdown();
            result?
        }
        Command::Printchain { node } => {
            let addr = node.unwrap_or(config.node.addr);
            let chain = fetch_chain(&addr)?;
            // Newest first
            for block in chain.iter().rev() {
                println!("Height: {}", block.get_height());
                println!("Pre block hash: {}", block.get_previous_hash());
                println!("Cur block hash: {}", block.get_hash());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Difficulty: {}, nonce: {}", block.get_difficulty(), block.get_nonce());
                println!("Mined by: {}", block.get_mined_by());
                println!("Merkle root: {}", block.get_merkle_root());
                for tx in block.get_transactions() {
                    println!("- Transaction {}", tx.get_id());
                    println!(
                        "-- {} -> {}: {}",
                        tx.get_sender(),
                        tx.get_recipient(),
                        tx.get_amount()
                    );
                }
                println!()
            }
        }
        Command::GetBalance { account, node } => {
            let addr = node.unwrap_or(config.node.addr);
            let chain = config
                .consensus
                .validator()
                .validate(fetch_chain(&addr)?)
                .map_err(BlockchainError::InvalidChain)?;
            let balance = Ledger::rebuild_balances(chain.blocks()).balance_of(&account);
            println!("Balance of {account}: {balance}");
        }
        Command::Keygen => {
            let keypair = Keypair::generate()?;
            println!("Account: {}", keypair.public_key_hex());
            println!("Private key: {}", keypair.to_pkcs8_hex());
        }
        Command::Send {
            key,
            to,
            amount,
            node,
        } => {
            if amount == 0 {
                return Err("Amount must be positive".into());
            }
            let keypair = Keypair::from_pkcs8_hex(&key)?;
            let tx = Transaction::new_transfer(&keypair, &to, amount)?;
            let addr = node.unwrap_or(config.node.addr);
            send_tx(&addr, &tx)?;
            println!("Submitted transaction {}", tx.get_id());
        }
    }
    Ok(())
}
