//! A ledger node
//!
//! [`Node`] owns one chain and one mempool behind a single mutex, so every
//! chain or mempool mutation is serialized: when two conflicting
//! transactions race, whichever takes the lock first is admitted.
//! Proof-of-work and peer-chain validation run without the lock and only
//! take it to commit. Nothing is broadcast while the lock is held.

pub mod miner;

use crate::config::Config;
use crate::core::{
    Block, Blockchain, ChainFault, ProofOfWork, Synchronizer, Transaction, ValidatedChain,
    VerifyMode,
};
use crate::error::{BlockchainError, Result};
use crate::network::Transport;
use crate::storage::{Admission, ChainSnapshot, MemoryPool, SnapshotStore};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub use miner::MiningOutcome;

const IDLE_MINER_SLEEP: Duration = Duration::from_millis(200);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Accepted,
    /// Already pending; nothing changed and nothing was broadcast
    Duplicate,
    /// Already on the chain; nothing changed
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Appended,
    AlreadyKnown,
    /// The block did not extend our tip, but a sync adopted a chain with it
    Synchronized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Replaced { from: usize, to: usize },
    Kept,
}

/// Chain and mempool, always locked together
struct NodeState {
    blockchain: Blockchain,
    mempool: MemoryPool,
}

pub struct Node {
    config: Config,
    state: Mutex<NodeState>,
    tip: Arc<RwLock<String>>,
    synchronizer: Synchronizer,
    transport: Arc<dyn Transport>,
    store: Option<Box<dyn SnapshotStore>>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Build a node, resuming from `store` when it holds a usable snapshot.
    /// A snapshot that fails validation is discarded and the node starts
    /// from the configured genesis.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Option<Box<dyn SnapshotStore>>,
    ) -> Arc<Node> {
        let state = match store.as_ref().map(|s| s.load()) {
            Some(Ok(Some(snapshot))) => match Self::restore(&config, snapshot) {
                Ok(state) => state,
                Err(e) => {
                    error!("Stored snapshot rejected, starting from genesis: {e}");
                    Self::fresh_state(&config)
                }
            },
            Some(Ok(None)) | None => Self::fresh_state(&config),
            Some(Err(e)) => {
                error!("Failed to load snapshot, starting from genesis: {e}");
                Self::fresh_state(&config)
            }
        };

        let tip = Arc::new(RwLock::new(state.blockchain.get_tip_hash().to_string()));
        info!(
            "Node {} ready at height {} (tip {})",
            config.node.node_id,
            state.blockchain.get_best_height(),
            state.blockchain.get_tip_hash()
        );
        let node = Arc::new(Node {
            synchronizer: Synchronizer::new(config.consensus.validator()),
            config,
            state: Mutex::new(state),
            tip,
            transport,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        });
        node.persist();
        node
    }

    fn fresh_state(config: &Config) -> NodeState {
        NodeState {
            blockchain: Blockchain::new(config.genesis.build_block(), config.consensus.clone()),
            mempool: MemoryPool::new(),
        }
    }

    /// Rebuild state from an untrusted snapshot: the chain is revalidated,
    /// balances and difficulty are recomputed, pending entries re-admitted.
    fn restore(config: &Config, snapshot: ChainSnapshot) -> Result<NodeState> {
        let genesis = config.genesis.build_block();
        if let Some(stored) = snapshot.chain.first() {
            if stored.get_hash() != genesis.get_hash() {
                return Err(BlockchainError::InvalidChain(ChainFault::ForeignGenesis {
                    expected: genesis.get_hash().to_string(),
                    found: stored.get_hash().to_string(),
                }));
            }
        }
        let validated = config.consensus.validator().validate(snapshot.chain)?;
        let blockchain = Blockchain::from_validated(validated, config.consensus.clone());

        if &snapshot.balances != blockchain.get_balances() {
            warn!("Stored balances differ from chain replay; using the replay");
        }
        if snapshot.difficulty != blockchain.get_difficulty() {
            warn!(
                "Stored difficulty {} differs from recomputed {}; using the recomputed value",
                snapshot.difficulty,
                blockchain.get_difficulty()
            );
        }

        let mut mempool = MemoryPool::new();
        for tx in snapshot.pending {
            if blockchain.contains_transaction(&tx.get_id()) {
                continue;
            }
            if let Err(reason) = mempool.submit(tx, blockchain.get_ledger()) {
                warn!("Dropping stored pending transaction: {reason}");
            }
        }
        Ok(NodeState {
            blockchain,
            mempool,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_tip(&self, hash: &str) {
        let mut tip = self.tip.write().unwrap_or_else(PoisonError::into_inner);
        *tip = hash.to_string();
    }

    /// Submit a transaction from a local client
    pub fn submit_transaction(&self, tx: Transaction) -> Result<TxOutcome> {
        let id = tx.get_id();
        let best_height = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            if state.blockchain.contains_transaction(&id) {
                debug!("Transaction {id} already confirmed");
                return Ok(TxOutcome::AlreadyConfirmed);
            }
            match state
                .mempool
                .submit(tx.clone(), state.blockchain.get_ledger())?
            {
                Admission::Duplicate => return Ok(TxOutcome::Duplicate),
                Admission::Accepted => {}
            }
            info!("Accepted transaction {id}");
            self.persist_state(state);
            state.blockchain.get_best_height()
        };

        self.transport.broadcast_transaction(&tx, best_height);
        Ok(TxOutcome::Accepted)
    }

    /// Handle a transaction relayed by a peer. A peer announcing a longer
    /// chain is synced with first so the transaction is checked against the
    /// balances it was created under.
    pub fn receive_transaction(&self, tx: Transaction, peer_height: u64) -> Result<TxOutcome> {
        if peer_height > self.best_height() {
            if let Err(e) = self.synchronize() {
                warn!("Sync before relayed transaction failed: {e}");
            }
        }
        self.submit_transaction(tx)
    }

    /// Handle a block mined elsewhere. A block that does not validate on our
    /// tip triggers a sync; if the adopted chain contains it the result is
    /// [`BlockOutcome::Synchronized`], otherwise the fault is returned.
    pub fn submit_block(&self, block: Block) -> Result<BlockOutcome> {
        let appended = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            if state.blockchain.contains_block(block.get_hash()) {
                return Ok(BlockOutcome::AlreadyKnown);
            }
            match state.blockchain.append(block.clone(), VerifyMode::Untrusted) {
                Ok(()) => {
                    self.after_append(state, &block);
                    Ok(())
                }
                Err(fault) => Err(fault),
            }
        };

        match appended {
            Ok(()) => {
                self.transport.broadcast_block(&block);
                Ok(BlockOutcome::Appended)
            }
            Err(fault) => {
                warn!("Block {} rejected: {fault}; synchronizing", block.get_hash());
                if let Err(e) = self.synchronize() {
                    warn!("Sync after rejected block failed: {e}");
                }
                if self.lock_state().blockchain.contains_block(block.get_hash()) {
                    Ok(BlockOutcome::Synchronized)
                } else {
                    Err(BlockchainError::InvalidBlock(fault))
                }
            }
        }
    }

    fn after_append(&self, state: &mut NodeState, block: &Block) {
        let NodeState {
            blockchain,
            mempool,
        } = &mut *state;
        mempool.remove_included(block);
        mempool.revalidate(blockchain.get_ledger(), |id| {
            blockchain.contains_transaction(id)
        });
        self.set_tip(blockchain.get_tip_hash());
        self.persist_state(state);
    }

    /// Copy of the local chain, as served to peers
    pub fn request_chain_snapshot(&self) -> Vec<Block> {
        self.lock_state().blockchain.get_blocks().to_vec()
    }

    /// Fetch peer chains and adopt the longest valid one if it beats ours
    pub fn synchronize(&self) -> Result<SyncOutcome> {
        let candidates = self.transport.fetch_peer_chains();
        Ok(self.synchronize_with(candidates))
    }

    /// Reconcile against the given candidate chains. Validation runs without
    /// the lock; the commit rechecks that the winner is still longer.
    pub fn synchronize_with(&self, candidates: Vec<Vec<Block>>) -> SyncOutcome {
        let (genesis, local_len) = {
            let state = self.lock_state();
            (
                state.blockchain.get_genesis_hash().to_string(),
                state.blockchain.len(),
            )
        };
        match self
            .synchronizer
            .select_longest_valid(&genesis, local_len, candidates)
        {
            Some(chain) => self.adopt(chain),
            None => SyncOutcome::Kept,
        }
    }

    fn adopt(&self, chain: ValidatedChain) -> SyncOutcome {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let from = state.blockchain.len();
        if chain.len() <= from {
            debug!("Local chain grew to {from} while validating; keeping it");
            return SyncOutcome::Kept;
        }
        let to = chain.len();
        state.blockchain.replace(chain);

        let NodeState {
            blockchain,
            mempool,
        } = &mut *state;
        let dropped = mempool.revalidate(blockchain.get_ledger(), |id| {
            blockchain.contains_transaction(id)
        });
        info!("Adopted peer chain: length {from} -> {to}, dropped {dropped} pending transactions");
        self.set_tip(blockchain.get_tip_hash());
        self.persist_state(state);
        SyncOutcome::Replaced { from, to }
    }

    /// Mine one block on the current tip with everything pending, rewarding
    /// `miner_id`. If the tip moves while searching, the work is discarded
    /// and mining restarts on the new tip. Returns `None` on shutdown, or when
    /// a restart finds nothing pending and empty blocks are not mined.
    pub fn mine_block(&self, miner_id: &str) -> Result<Option<Block>> {
        let reward = self.config.consensus.block_reward;
        let poll_interval = self.config.consensus.stale_poll_interval;
        let mut restarted = false;

        loop {
            if self.is_shutdown() {
                return Ok(None);
            }
            let (previous, pending, difficulty) = {
                let state = self.lock_state();
                (
                    state.blockchain.tip().clone(),
                    state.mempool.get_all(),
                    state.blockchain.get_difficulty(),
                )
            };
            // The new tip may have confirmed everything we were mining
            if restarted && pending.is_empty() && !self.config.consensus.mine_empty_blocks {
                debug!("Nothing left to mine on {}", previous.get_hash());
                return Ok(None);
            }
            restarted = true;

            let candidate =
                ProofOfWork::prepare_candidate(&previous, &pending, miner_id, difficulty, reward)?;
            let receiver = miner::spawn_search(
                candidate,
                Arc::clone(&self.tip),
                Arc::clone(&self.shutdown),
                poll_interval,
            )?;
            let outcome = receiver
                .recv()
                .map_err(|e| BlockchainError::Mining(format!("Miner thread vanished: {e}")))?;

            let block = match outcome {
                MiningOutcome::Found(block) => block,
                MiningOutcome::Abandoned => {
                    debug!("Mining on {} abandoned", previous.get_hash());
                    continue;
                }
            };

            let committed = {
                let mut guard = self.lock_state();
                let state = &mut *guard;
                if state.blockchain.get_tip_hash() != block.get_previous_hash() {
                    debug!("Discarding stale block {}", block.get_hash());
                    false
                } else {
                    state
                        .blockchain
                        .append(block.clone(), VerifyMode::Trusted)?;
                    self.after_append(state, &block);
                    true
                }
            };

            if committed {
                info!(
                    "Mined block {} at height {} with {} transactions",
                    block.get_hash(),
                    block.get_height(),
                    block.get_transactions().len()
                );
                self.transport.broadcast_block(&block);
                return Ok(Some(block));
            }
        }
    }

    /// Background miner. Needs `node.miner_id` in the config.
    pub fn start_mining(self: &Arc<Self>) -> Result<()> {
        let miner_id = self.config.node.miner_id.clone().ok_or_else(|| {
            BlockchainError::Config("Mining requires node.miner_id".to_string())
        })?;
        let node = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("miner-loop".to_string())
            .spawn(move || {
                info!("Mining is on. Rewards go to {miner_id}");
                while !node.is_shutdown() {
                    let has_work = node.config.consensus.mine_empty_blocks
                        || !node.lock_state().mempool.is_empty();
                    if !has_work {
                        thread::sleep(IDLE_MINER_SLEEP);
                        continue;
                    }
                    if let Err(e) = node.mine_block(&miner_id) {
                        error!("Mining failed: {e}");
                        thread::sleep(IDLE_MINER_SLEEP);
                    }
                }
            })
            .map_err(|e| BlockchainError::Mining(format!("Failed to spawn miner loop: {e}")))?;
        self.track(handle);
        Ok(())
    }

    /// Periodic sync every `node.sync_interval_secs`
    pub fn spawn_sync_timer(self: &Arc<Self>) -> Result<()> {
        let interval = Duration::from_secs(self.config.node.sync_interval_secs.max(1));
        let node = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("sync-timer".to_string())
            .spawn(move || {
                let mut last = Instant::now();
                while !node.is_shutdown() {
                    thread::sleep(SHUTDOWN_POLL);
                    if last.elapsed() < interval {
                        continue;
                    }
                    last = Instant::now();
                    match node.synchronize() {
                        Ok(SyncOutcome::Replaced { from, to }) => {
                            info!("Periodic sync replaced chain ({from} -> {to})")
                        }
                        Ok(SyncOutcome::Kept) => debug!("Periodic sync kept local chain"),
                        Err(e) => warn!("Periodic sync failed: {e}"),
                    }
                }
            })
            .map_err(|e| BlockchainError::Network(format!("Failed to spawn sync timer: {e}")))?;
        self.track(handle);
        Ok(())
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Stop background work, wait for it and write a final snapshot
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down node {}", self.config.node.node_id);
        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                error!("A background worker panicked");
            }
        }
        self.persist();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Write the current state to the store, if there is one
    pub fn persist(&self) {
        let guard = self.lock_state();
        self.persist_state(&guard);
    }

    // Storage problems are logged, never fatal
    fn persist_state(&self, state: &NodeState) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let snapshot = ChainSnapshot {
            chain: state.blockchain.get_blocks().to_vec(),
            balances: state.blockchain.get_balances().clone(),
            pending: state.mempool.get_all(),
            difficulty: state.blockchain.get_difficulty(),
        };
        if let Err(e) = store.persist(&snapshot) {
            error!("Failed to persist node state: {e}");
        }
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn get_node_id(&self) -> &str {
        &self.config.node.node_id
    }

    pub fn best_height(&self) -> u64 {
        self.lock_state().blockchain.get_best_height()
    }

    pub fn chain_len(&self) -> usize {
        self.lock_state().blockchain.len()
    }

    pub fn tip_hash(&self) -> String {
        self.tip
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn difficulty(&self) -> u32 {
        self.lock_state().blockchain.get_difficulty()
    }

    pub fn balance_of(&self, account: &str) -> i128 {
        self.lock_state().blockchain.balance_of(account)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.lock_state().mempool.get_all()
    }

    pub fn contains_transaction(&self, tx_id: &str) -> bool {
        self.lock_state().blockchain.contains_transaction(tx_id)
    }
}
