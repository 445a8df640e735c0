use anyhow::Context;
use log::{info, warn};

use pow_ledger::blockchain::{Account, Blockchain};
use pow_ledger::LedgerConfig;

const CONFIG_ENV: &str = "POW_LEDGER_CONFIG";

// Use the config file named by POW_LEDGER_CONFIG, or the defaults
fn load_config() -> anyhow::Result<LedgerConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let config = LedgerConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            info!("Loaded config from {}", path);
            Ok(config)
        }
        Err(_) => {
            info!("{} not set, using default config", CONFIG_ENV);
            Ok(LedgerConfig::default())
        }
    }
}

// Register a few accounts with the configured opening balance
fn initialize_blockchain(config: &LedgerConfig) -> anyhow::Result<Blockchain> {
    let mut blockchain = Blockchain::with_config(config);

    for id in ["alice", "bob", "carol"] {
        let account = Account::with_config(id, config)
            .with_context(|| format!("Failed to create account {}", id))?;
        blockchain.add_account(account)?;
    }

    Ok(blockchain)
}

fn submit(blockchain: &mut Blockchain, from: &str, to: &str, value: u64) -> anyhow::Result<()> {
    let account = blockchain
        .account_mut(from)
        .with_context(|| format!("Unknown account {}", from))?;
    let transaction = account.create_transaction(to, value, "demo transfer")?;

    if let Err(err) = blockchain.add_transaction(transaction) {
        warn!("Transaction not accepted: {}", err);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = load_config()?;
    let mut blockchain = initialize_blockchain(&config)?;

    submit(&mut blockchain, "alice", "bob", 30)?;
    submit(&mut blockchain, "bob", "carol", 50)?;
    blockchain.create_new_block()?;

    // This one overdraws alice and must leave the ledger untouched
    submit(&mut blockchain, "alice", "carol", 500)?;
    if let Err(err) = blockchain.create_new_block() {
        warn!("Block rejected: {}", err);
    }

    match blockchain.validate_blockchain() {
        Ok(()) => info!("Blockchain is valid"),
        Err(err) => warn!("Blockchain is invalid: {}", err),
    }

    info!("{}", blockchain);
    for row in blockchain.get_account_balances() {
        info!("{:>8}: {}", row.id, row.balance);
    }

    Ok(())
}
