use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

use std::collections::HashMap;
use std::fmt;

use super::account::{Account, AccountId};
use super::block::{Block, BlockError, HashTarget};
use super::transaction::Transaction;
use crate::config::LedgerConfig;

/// Errors that can occur while accepting transactions or sealing blocks
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction from {sender} failed signature validation: {reason}")]
    SignatureInvalid { sender: AccountId, reason: String },

    #[error("Transaction from {sender} reuses nonce {nonce} (last seen {last_seen})")]
    NonceReplayed {
        sender: AccountId,
        nonce: u64,
        last_seen: u64,
    },

    #[error("Account already registered: {0}")]
    DuplicateAccount(AccountId),

    #[error("Account not found: {0}")]
    UnknownAccount(AccountId),

    #[error(
        "Pending transaction {position} ({transaction_id}) from {sender} failed balance validation: \
         value {value}, available {available}"
    )]
    InsufficientBalance {
        position: usize,
        transaction_id: String,
        sender: AccountId,
        value: u64,
        available: u64,
    },

    #[error(
        "Pending transaction {position} ({transaction_id}) would overflow the balance of \
         {receiver}: balance {balance}, value {value}"
    )]
    BalanceOverflow {
        position: usize,
        transaction_id: String,
        receiver: AccountId,
        balance: u64,
        value: u64,
    },

    #[error("Block error: {0}")]
    Block(#[from] BlockError),
}

/// Integrity violations found by `Blockchain::validate_blockchain`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Previous block hash mismatch at block index {index}")]
    ChainLinkBroken { index: u64 },

    #[error("Proof of work invalid at block index {index}: {reason}")]
    ProofOfWorkInvalid { index: u64, reason: String },

    #[error(
        "Balance of {account} would go negative at block index {index}: \
         balance {balance}, value {value}"
    )]
    BalanceInvariantViolated {
        index: u64,
        account: AccountId,
        balance: u64,
        value: u64,
    },

    #[error(
        "Balance of {account} would overflow at block index {index}: \
         balance {balance}, value {value}"
    )]
    BalanceOverflow {
        index: u64,
        account: AccountId,
        balance: u64,
        value: u64,
    },

    #[error("Nonce {nonce} from {account} replayed at block index {index} (last seen {last_seen})")]
    NonceReplayed {
        index: u64,
        account: AccountId,
        nonce: u64,
        last_seen: u64,
    },

    #[error("Unknown account {account} at block index {index}")]
    UnknownAccount { index: u64, account: AccountId },
}

impl ValidationError {
    /// Index of the block that violated a rule
    pub fn index(&self) -> u64 {
        match self {
            ValidationError::ChainLinkBroken { index }
            | ValidationError::ProofOfWorkInvalid { index, .. }
            | ValidationError::BalanceInvariantViolated { index, .. }
            | ValidationError::BalanceOverflow { index, .. }
            | ValidationError::NonceReplayed { index, .. }
            | ValidationError::UnknownAccount { index, .. } => *index,
        }
    }
}

/// One row of `Blockchain::get_account_balances`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub id: AccountId,
    pub balance: u64,
}

/// A registered account together with the balance it joined the ledger with
#[derive(Debug)]
struct LedgerEntry {
    account: Account,
    opening_balance: u64,
}

/// Represents the blockchain
#[derive(Debug)]
pub struct Blockchain {
    /// The chain of blocks; index 0 is always genesis
    chain: Vec<Block>,

    /// Pending transactions to be included in the next block
    pending_transactions: Vec<Transaction>,

    /// Registered accounts
    accounts: HashMap<AccountId, LedgerEntry>,

    /// Account ids in registration order
    registration_order: Vec<AccountId>,

    /// Highest nonce accepted so far from each sender
    last_nonces: HashMap<AccountId, u64>,

    /// Difficulty for the next block
    hash_target: HashTarget,

    enforce_nonce_order: bool,
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block
    ///
    /// # Arguments
    ///
    /// * `hash_target` - The difficulty new blocks are mined under
    ///
    /// # Returns
    ///
    /// A new Blockchain instance
    pub fn new(hash_target: HashTarget) -> Self {
        Self::with_config(&LedgerConfig {
            hash_target,
            ..LedgerConfig::default()
        })
    }

    /// Creates a new blockchain from configuration
    pub fn with_config(config: &LedgerConfig) -> Self {
        info!(
            "Created blockchain with hash target {} (~{} attempts per block)",
            config.hash_target,
            config.hash_target.expected_attempts()
        );

        Blockchain {
            chain: vec![Block::genesis(&config.genesis_message)],
            pending_transactions: Vec::new(),
            accounts: HashMap::new(),
            registration_order: Vec::new(),
            last_nonces: HashMap::new(),
            hash_target: config.hash_target,
            enforce_nonce_order: config.enforce_nonce_order,
        }
    }

    pub fn hash_target(&self) -> HashTarget {
        self.hash_target
    }

    /// Changes the difficulty. Blocks already sealed keep the target they
    /// were mined under.
    pub fn set_hash_target(&mut self, hash_target: HashTarget) {
        info!("Hash target changed from {} to {}", self.hash_target, hash_target);
        self.hash_target = hash_target;
    }

    /// Gets the entire blockchain
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    /// Gets all pending transactions
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    /// Registers an account with the ledger. Its current balance becomes the
    /// opening balance used when replaying the chain.
    pub fn add_account(&mut self, account: Account) -> Result<(), BlockchainError> {
        let id = account.id().clone();
        if self.accounts.contains_key(&id) {
            return Err(BlockchainError::DuplicateAccount(id));
        }

        info!("Registered account {} with balance {}", id, account.balance());
        let opening_balance = account.balance();
        self.accounts.insert(
            id.clone(),
            LedgerEntry {
                account,
                opening_balance,
            },
        );
        self.registration_order.push(id);

        Ok(())
    }

    /// Looks up a registered account
    pub fn get_account_details(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id).map(|entry| &entry.account)
    }

    /// Mutable access to a registered account, so its holder can sign
    /// transactions. Balances stay read-only outside this crate.
    pub fn account_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.get_mut(id).map(|entry| &mut entry.account)
    }

    /// Balances of all accounts, in registration order
    pub fn get_account_balances(&self) -> Vec<AccountBalance> {
        self.registration_order
            .iter()
            .filter_map(|id| self.accounts.get(id))
            .map(|entry| AccountBalance {
                id: entry.account.id().clone(),
                balance: entry.account.balance(),
            })
            .collect()
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// # Arguments
    ///
    /// * `transaction` - The transaction to add
    ///
    /// # Returns
    ///
    /// `Ok(())` once the signature checks out against the registered sender;
    /// the pool is left untouched on any error
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<(), BlockchainError> {
        let sender = transaction.sender().clone();

        if let Err(err) = self.validate_transaction(&transaction) {
            warn!("Rejected transaction {}: {}", transaction.id(), err);
            return Err(err);
        }

        let nonce = transaction.message.nonce;
        if self.enforce_nonce_order {
            let last_seen = self.last_nonces.get(&sender).copied().unwrap_or(0);
            if nonce <= last_seen {
                warn!(
                    "Rejected transaction {}: nonce {} from {} already used",
                    transaction.id(),
                    nonce,
                    sender
                );
                return Err(BlockchainError::NonceReplayed {
                    sender,
                    nonce,
                    last_seen,
                });
            }
        }

        info!(
            "Accepted transaction {} ({} -> {}, value {})",
            transaction.id(),
            sender,
            transaction.receiver(),
            transaction.value()
        );
        self.last_nonces
            .entry(sender)
            .and_modify(|last| *last = (*last).max(nonce))
            .or_insert(nonce);
        self.pending_transactions.push(transaction);

        Ok(())
    }

    fn validate_transaction(&self, transaction: &Transaction) -> Result<(), BlockchainError> {
        let sender = transaction.sender();
        let signature_invalid = |reason: String| BlockchainError::SignatureInvalid {
            sender: sender.clone(),
            reason,
        };

        let account = self
            .get_account_details(sender.as_str())
            .ok_or_else(|| signature_invalid("unknown sender".to_string()))?;

        match transaction.verify(account.public_key()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(signature_invalid("signature does not match".to_string())),
            Err(err) => Err(signature_invalid(err.to_string())),
        }
    }

    /// Seals every pending transaction into a new block under the current
    /// hash target
    pub fn create_new_block(&mut self) -> Result<Block, BlockchainError> {
        self.create_new_block_with_target(self.hash_target)
    }

    /// Seals every pending transaction into a new block mined under `hash_target`
    ///
    /// Transfers are checked in pool order before any state changes. If one of
    /// them is not covered by its sender's balance the whole block is
    /// abandoned and the pool stays as it was.
    ///
    /// # Returns
    ///
    /// The newly mined block
    pub fn create_new_block_with_target(
        &mut self,
        hash_target: HashTarget,
    ) -> Result<Block, BlockchainError> {
        if let Err(err) = self.check_pending_balances() {
            warn!("Block not created: {}", err);
            return Err(err);
        }

        let index = self.chain.len() as u64;
        let previous_hash = self.last_block().hash.clone();
        let block = Block::mine(
            index,
            self.pending_transactions.clone(),
            previous_hash,
            hash_target,
        )?;

        for transaction in &block.transactions {
            self.transfer(transaction);
        }

        info!(
            "Mined block {} with {} transactions after {} attempts (nonce {}, hash {})",
            block.index,
            block.transactions.len(),
            block.attempts,
            block.nonce,
            block.hash
        );

        self.pending_transactions.clear();
        self.chain.push(block.clone());

        Ok(block)
    }

    /// Dry run of the pending pool against current balances
    fn check_pending_balances(&self) -> Result<(), BlockchainError> {
        let mut balances: HashMap<&AccountId, u64> = HashMap::new();

        for (position, transaction) in self.pending_transactions.iter().enumerate() {
            let sender = transaction.sender();
            let receiver = transaction.receiver();
            let value = transaction.value();

            let available = self.current_balance(&balances, sender)?;
            self.current_balance(&balances, receiver)?;

            if available < value {
                return Err(BlockchainError::InsufficientBalance {
                    position,
                    transaction_id: transaction.id(),
                    sender: sender.clone(),
                    value,
                    available,
                });
            }

            balances.insert(sender, available - value);
            // Read after the debit; sender and receiver may be the same account
            let receiver_balance = self.current_balance(&balances, receiver)?;
            let credited = receiver_balance.checked_add(value).ok_or_else(|| {
                BlockchainError::BalanceOverflow {
                    position,
                    transaction_id: transaction.id(),
                    receiver: receiver.clone(),
                    balance: receiver_balance,
                    value,
                }
            })?;
            balances.insert(receiver, credited);
        }

        Ok(())
    }

    fn current_balance(
        &self,
        scratch: &HashMap<&AccountId, u64>,
        id: &AccountId,
    ) -> Result<u64, BlockchainError> {
        if let Some(balance) = scratch.get(id) {
            return Ok(*balance);
        }
        self.get_account_details(id.as_str())
            .map(Account::balance)
            .ok_or_else(|| BlockchainError::UnknownAccount(id.clone()))
    }

    fn transfer(&mut self, transaction: &Transaction) {
        let value = transaction.value();
        if let Some(sender) = self.account_mut(transaction.sender().as_str()) {
            sender.decrease_balance(value);
        }
        if let Some(receiver) = self.account_mut(transaction.receiver().as_str()) {
            receiver.increase_balance(value);
        }
        debug!("Applied transaction {}", transaction.id());
    }

    /// Validates the blockchain
    ///
    /// Runs three passes over every block after genesis, stopping at the
    /// first violation: link integrity, proof of work, and a full balance
    /// replay. Never mutates the chain.
    pub fn validate_blockchain(&self) -> Result<(), ValidationError> {
        let result = self
            .validate_chain_hash_integrity()
            .and_then(|_| self.validate_block_hash_target())
            .and_then(|_| self.validate_complete_account_balances());

        match &result {
            Ok(()) => debug!("Blockchain of {} blocks is valid", self.chain.len()),
            Err(err) => error!("Blockchain validation failed: {}", err),
        }

        result
    }

    fn validate_chain_hash_integrity(&self) -> Result<(), ValidationError> {
        if !self.chain[0].is_genesis() {
            return Err(ValidationError::ChainLinkBroken { index: 0 });
        }

        for (position, pair) in self.chain.windows(2).enumerate() {
            let index = position as u64 + 1;
            let (previous, current) = (&pair[0], &pair[1]);
            if current.index != index
                || current.previous_hash.as_deref() != Some(previous.hash_block().as_str())
            {
                return Err(ValidationError::ChainLinkBroken { index });
            }
        }

        Ok(())
    }

    fn validate_block_hash_target(&self) -> Result<(), ValidationError> {
        for (index, block) in self.chain.iter().enumerate().skip(1) {
            let invalid = |reason: &str| ValidationError::ProofOfWorkInvalid {
                index: index as u64,
                reason: reason.to_string(),
            };

            if block.hash_target.is_none() {
                return Err(invalid("block has no hash target"));
            }
            if !block.meets_target() {
                return Err(invalid("hash does not meet the block's target"));
            }
            if block.hash != block.hash_block() {
                return Err(invalid("stored hash does not match block contents"));
            }
        }

        Ok(())
    }

    /// Replays every sealed transaction from the opening balances and checks
    /// that no balance would ever go negative
    fn validate_complete_account_balances(&self) -> Result<(), ValidationError> {
        let mut balances: HashMap<&AccountId, u64> = self
            .accounts
            .iter()
            .map(|(id, entry)| (id, entry.opening_balance))
            .collect();
        let mut nonces: HashMap<&AccountId, u64> = HashMap::new();

        for (index, block) in self.chain.iter().enumerate().skip(1) {
            let index = index as u64;
            for transaction in &block.transactions {
                let sender = transaction.sender();
                let receiver = transaction.receiver();
                let value = transaction.value();

                for id in [sender, receiver] {
                    if !balances.contains_key(id) {
                        return Err(ValidationError::UnknownAccount {
                            index,
                            account: id.clone(),
                        });
                    }
                }

                if self.enforce_nonce_order {
                    let nonce = transaction.message.nonce;
                    let last_seen = nonces.get(sender).copied().unwrap_or(0);
                    if nonce <= last_seen {
                        return Err(ValidationError::NonceReplayed {
                            index,
                            account: sender.clone(),
                            nonce,
                            last_seen,
                        });
                    }
                    nonces.insert(sender, nonce);
                }

                let balance = balances.get(sender).copied().unwrap_or(0);
                if balance < value {
                    return Err(ValidationError::BalanceInvariantViolated {
                        index,
                        account: sender.clone(),
                        balance,
                        value,
                    });
                }

                balances.insert(sender, balance - value);
                let receiver_balance = balances.get(receiver).copied().unwrap_or(0);
                let credited = receiver_balance.checked_add(value).ok_or_else(|| {
                    ValidationError::BalanceOverflow {
                        index,
                        account: receiver.clone(),
                        balance: receiver_balance,
                        value,
                    }
                })?;
                balances.insert(receiver, credited);
            }
        }

        Ok(())
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chain ({} blocks, target {}):", self.chain.len(), self.hash_target)?;
        for block in &self.chain {
            writeln!(
                f,
                "  #{} {} ({} transactions)",
                block.index,
                block.hash,
                block.transactions.len()
            )?;
        }
        write!(f, "Pending transactions: {}", self.pending_transactions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GENESIS_MESSAGE;

    fn easy_target() -> HashTarget {
        HashTarget::from_leading_zero_bits(8)
    }

    /// Blockchain with alice and bob, 100 each
    fn setup() -> Blockchain {
        let mut blockchain = Blockchain::new(easy_target());
        blockchain.add_account(Account::new("alice", 100).unwrap()).unwrap();
        blockchain.add_account(Account::new("bob", 100).unwrap()).unwrap();
        blockchain
    }

    fn send(blockchain: &mut Blockchain, from: &str, to: &str, value: u64) -> Transaction {
        blockchain
            .account_mut(from)
            .unwrap()
            .create_transaction(to, value, "")
            .unwrap()
    }

    fn balance(blockchain: &Blockchain, id: &str) -> u64 {
        blockchain.get_account_details(id).unwrap().balance()
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = Blockchain::new(easy_target());
        let chain = blockchain.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 0);
        assert!(chain[0].is_genesis());
        assert_eq!(chain[0].hash, GENESIS_MESSAGE);
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_duplicate_account() {
        let mut blockchain = setup();
        let result = blockchain.add_account(Account::new("alice", 5).unwrap());

        assert!(matches!(result, Err(BlockchainError::DuplicateAccount(id)) if id.as_str() == "alice"));
        assert_eq!(balance(&blockchain, "alice"), 100);
    }

    #[test]
    fn test_add_transaction() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "bob", 30);

        blockchain.add_transaction(transaction).unwrap();
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_unknown_sender_is_rejected() {
        let mut blockchain = setup();
        let mut mallory = Account::new("mallory", 100).unwrap();
        let transaction = mallory.create_transaction("bob", 1, "").unwrap();

        let result = blockchain.add_transaction(transaction);
        assert!(matches!(result, Err(BlockchainError::SignatureInvalid { .. })));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_forged_signature_is_rejected() {
        let mut blockchain = setup();

        // Signed by an impostor holding a different key for the same id
        let mut impostor = Account::new("alice", 100).unwrap();
        let forged = impostor.create_transaction("bob", 50, "").unwrap();
        let result = blockchain.add_transaction(forged);
        assert!(matches!(result, Err(BlockchainError::SignatureInvalid { .. })));

        // A genuine transaction with its value edited afterwards
        let mut edited = send(&mut blockchain, "alice", "bob", 1);
        edited.message.value = 90;
        let result = blockchain.add_transaction(edited);
        assert!(matches!(result, Err(BlockchainError::SignatureInvalid { .. })));

        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_replayed_transaction_is_rejected() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "bob", 10);

        blockchain.add_transaction(transaction.clone()).unwrap();
        let result = blockchain.add_transaction(transaction);

        assert!(matches!(
            result,
            Err(BlockchainError::NonceReplayed { nonce: 1, last_seen: 1, .. })
        ));
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_replay_allowed_when_nonce_order_disabled() {
        let config = LedgerConfig {
            hash_target: easy_target(),
            enforce_nonce_order: false,
            ..LedgerConfig::default()
        };
        let mut blockchain = Blockchain::with_config(&config);
        blockchain.add_account(Account::new("alice", 100).unwrap()).unwrap();
        blockchain.add_account(Account::new("bob", 100).unwrap()).unwrap();

        let transaction = send(&mut blockchain, "alice", "bob", 10);
        blockchain.add_transaction(transaction.clone()).unwrap();
        blockchain.add_transaction(transaction).unwrap();
        blockchain.create_new_block().unwrap();

        assert_eq!(balance(&blockchain, "alice"), 80);
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_create_new_block() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "bob", 30);
        blockchain.add_transaction(transaction).unwrap();

        let block = blockchain.create_new_block().unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.previous_hash.as_deref(), Some(GENESIS_MESSAGE));
        assert!(block.meets_target());

        assert_eq!(balance(&blockchain, "alice"), 70);
        assert_eq!(balance(&blockchain, "bob"), 130);
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.chain().len(), 2);
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_empty_block() {
        let mut blockchain = setup();
        let block = blockchain.create_new_block().unwrap();

        assert!(block.transactions.is_empty());
        assert_eq!(blockchain.chain().len(), 2);
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_insufficient_balance_aborts_block() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "bob", 150);
        blockchain.add_transaction(transaction).unwrap();

        let result = blockchain.create_new_block();

        assert!(matches!(
            result,
            Err(BlockchainError::InsufficientBalance { position: 0, value: 150, available: 100, .. })
        ));
        assert_eq!(balance(&blockchain, "alice"), 100);
        assert_eq!(balance(&blockchain, "bob"), 100);
        assert_eq!(blockchain.chain().len(), 1);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_block_is_all_or_nothing() {
        let mut blockchain = setup();

        // The first transfer is fine alone, the second overdraws alice after it
        let first = send(&mut blockchain, "alice", "bob", 60);
        let second = send(&mut blockchain, "alice", "bob", 60);
        blockchain.add_transaction(first).unwrap();
        blockchain.add_transaction(second).unwrap();

        let result = blockchain.create_new_block();
        assert!(matches!(
            result,
            Err(BlockchainError::InsufficientBalance { position: 1, available: 40, .. })
        ));
        assert_eq!(balance(&blockchain, "alice"), 100);
        assert_eq!(balance(&blockchain, "bob"), 100);
        assert_eq!(blockchain.pending_transactions().len(), 2);
    }

    #[test]
    fn test_credit_overflow_aborts_block() {
        let mut blockchain = setup();
        blockchain
            .add_account(Account::new("whale", u64::MAX - 5).unwrap())
            .unwrap();

        let transaction = send(&mut blockchain, "alice", "whale", 10);
        blockchain.add_transaction(transaction).unwrap();

        let result = blockchain.create_new_block();
        assert!(matches!(
            result,
            Err(BlockchainError::BalanceOverflow { position: 0, balance: whale_balance, value: 10, .. })
                if whale_balance == u64::MAX - 5
        ));
        assert_eq!(balance(&blockchain, "alice"), 100);
        assert_eq!(balance(&blockchain, "whale"), u64::MAX - 5);
        assert_eq!(blockchain.chain().len(), 1);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_self_transfer() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "alice", 100);
        blockchain.add_transaction(transaction).unwrap();

        blockchain.create_new_block().unwrap();
        assert_eq!(balance(&blockchain, "alice"), 100);
        assert_eq!(balance(&blockchain, "bob"), 100);
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_empty_genesis_message_is_kept() {
        let config = LedgerConfig {
            hash_target: easy_target(),
            genesis_message: String::new(),
            ..LedgerConfig::default()
        };
        let mut blockchain = Blockchain::with_config(&config);

        assert_eq!(blockchain.chain()[0].hash, "");
        let block = blockchain.create_new_block().unwrap();
        assert_eq!(block.previous_hash.as_deref(), Some(""));
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_pool_order_can_fund_later_transfers() {
        let mut blockchain = setup();

        // bob spends money he only receives earlier in the same block
        let incoming = send(&mut blockchain, "alice", "bob", 100);
        let outgoing = send(&mut blockchain, "bob", "alice", 150);
        blockchain.add_transaction(incoming).unwrap();
        blockchain.add_transaction(outgoing).unwrap();

        blockchain.create_new_block().unwrap();
        assert_eq!(balance(&blockchain, "alice"), 150);
        assert_eq!(balance(&blockchain, "bob"), 50);
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_unknown_receiver_aborts_block() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "nobody", 10);
        blockchain.add_transaction(transaction).unwrap();

        let result = blockchain.create_new_block();
        assert!(matches!(result, Err(BlockchainError::UnknownAccount(id)) if id.as_str() == "nobody"));
        assert_eq!(balance(&blockchain, "alice"), 100);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_hash_target_change_only_affects_new_blocks() {
        let mut blockchain = setup();
        blockchain.create_new_block().unwrap();

        let harder = HashTarget::from_leading_zero_bits(12);
        blockchain.set_hash_target(harder);
        blockchain.create_new_block().unwrap();

        let chain = blockchain.chain();
        assert_eq!(chain[1].hash_target, Some(easy_target()));
        assert_eq!(chain[2].hash_target, Some(harder));
        assert!(chain[2].hash.starts_with("000"));
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_unreachable_target_leaves_state_untouched() {
        let mut blockchain = setup();
        let transaction = send(&mut blockchain, "alice", "bob", 10);
        blockchain.add_transaction(transaction).unwrap();

        let result = blockchain.create_new_block_with_target(HashTarget::from_bytes([0u8; 32]));

        assert!(matches!(result, Err(BlockchainError::Block(BlockError::UnreachableTarget(_)))));
        assert_eq!(balance(&blockchain, "alice"), 100);
        assert_eq!(blockchain.pending_transactions().len(), 1);
        assert_eq!(blockchain.chain().len(), 1);
    }

    #[test]
    fn test_get_account_balances_in_registration_order() {
        let mut blockchain = setup();
        blockchain.add_account(Account::new("carol", 7).unwrap()).unwrap();

        let balances = blockchain.get_account_balances();
        let ids: Vec<&str> = balances.iter().map(|b| b.id.as_str()).collect();

        assert_eq!(ids, vec!["alice", "bob", "carol"]);
        assert_eq!(balances[2].balance, 7);
        assert!(blockchain.get_account_details("dave").is_none());
    }

    /// Three sealed blocks, each moving 10 from alice to bob
    fn mined_chain() -> Blockchain {
        let mut blockchain = setup();
        for _ in 0..3 {
            let transaction = send(&mut blockchain, "alice", "bob", 10);
            blockchain.add_transaction(transaction).unwrap();
            blockchain.create_new_block().unwrap();
        }
        blockchain
    }

    #[test]
    fn test_links_match_recomputed_hashes() {
        let blockchain = mined_chain();
        let chain = blockchain.chain();

        for i in 1..chain.len() {
            assert_eq!(chain[i].previous_hash.as_deref(), Some(chain[i - 1].hash_block().as_str()));
            assert!(chain[i].meets_target());
        }
        assert!(blockchain.validate_blockchain().is_ok());
    }

    #[test]
    fn test_tampered_last_block_fails_proof_of_work() {
        let mut blockchain = mined_chain();
        blockchain.chain[3].transactions[0].message.value = 1;

        let err = blockchain.validate_blockchain().unwrap_err();
        assert!(matches!(err, ValidationError::ProofOfWorkInvalid { index: 3, .. }));
        assert_eq!(err.index(), 3);
    }

    #[test]
    fn test_tampered_middle_block_breaks_next_link() {
        let mut blockchain = mined_chain();
        blockchain.chain[1].transactions.clear();

        let err = blockchain.validate_blockchain().unwrap_err();
        assert_eq!(err, ValidationError::ChainLinkBroken { index: 2 });
    }

    #[test]
    fn test_forged_stored_hash() {
        let mut blockchain = mined_chain();
        let last = blockchain.chain.len() - 1;
        blockchain.chain[last].hash = "00".repeat(32);

        let err = blockchain.validate_blockchain().unwrap_err();
        assert!(matches!(err, ValidationError::ProofOfWorkInvalid { index: 3, .. }));
    }

    #[test]
    fn test_unmined_block_fails_proof_of_work() {
        let mut blockchain = mined_chain();
        let last = blockchain.chain.len() - 1;

        // Pick a nonce that misses the target and store its honest hash
        let forged = &mut blockchain.chain[last];
        for nonce in 0.. {
            forged.nonce = nonce;
            forged.hash = forged.hash_block();
            if !forged.meets_target() {
                break;
            }
        }

        let err = blockchain.validate_blockchain().unwrap_err();
        assert!(matches!(err, ValidationError::ProofOfWorkInvalid { index: 3, .. }));
    }

    #[test]
    fn test_balance_replay_detects_overdraft() {
        let mut blockchain = setup();

        // Mine a well-formed block that overdraws alice, bypassing sealing checks
        let overdraft = send(&mut blockchain, "alice", "bob", 500);
        let block = Block::mine(
            1,
            vec![overdraft],
            blockchain.last_block().hash.clone(),
            easy_target(),
        )
        .unwrap();
        blockchain.chain.push(block);

        let err = blockchain.validate_blockchain().unwrap_err();
        assert_eq!(
            err,
            ValidationError::BalanceInvariantViolated {
                index: 1,
                account: AccountId::from("alice"),
                balance: 100,
                value: 500,
            }
        );
    }

    #[test]
    fn test_balance_replay_detects_credit_overflow() {
        let mut blockchain = setup();
        blockchain
            .add_account(Account::new("whale", u64::MAX - 5).unwrap())
            .unwrap();

        // Well-formed and mined, but crediting whale would overflow
        let transaction = send(&mut blockchain, "alice", "whale", 10);
        let block = Block::mine(
            1,
            vec![transaction],
            blockchain.last_block().hash.clone(),
            easy_target(),
        )
        .unwrap();
        blockchain.chain.push(block);

        let err = blockchain.validate_blockchain().unwrap_err();
        assert_eq!(
            err,
            ValidationError::BalanceOverflow {
                index: 1,
                account: AccountId::from("whale"),
                balance: u64::MAX - 5,
                value: 10,
            }
        );
    }

    #[test]
    fn test_balance_replay_detects_replayed_nonce() {
        let mut blockchain = mined_chain();

        let replayed = blockchain.chain[1].transactions[0].clone();
        let block = Block::mine(
            4,
            vec![replayed],
            blockchain.last_block().hash.clone(),
            easy_target(),
        )
        .unwrap();
        blockchain.chain.push(block);

        let err = blockchain.validate_blockchain().unwrap_err();
        assert!(matches!(err, ValidationError::NonceReplayed { index: 4, nonce: 1, last_seen: 3, .. }));
    }

    #[test]
    fn test_display() {
        let blockchain = mined_chain();
        let text = blockchain.to_string();

        assert!(text.starts_with("Chain (4 blocks"));
        assert!(text.ends_with("Pending transactions: 0"));
    }
}
