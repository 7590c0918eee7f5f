use crate::chain::{
    ChainEvent,
    GameChain,
    ResultSubscription,
    TxHandle,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::types::{
    Address,
    H256,
    U256,
};
use std::sync::{
    Arc,
    Mutex,
    atomic::{
        AtomicBool,
        AtomicU64,
        Ordering,
    },
};
use tokio::sync::mpsc::{
    UnboundedSender,
    unbounded_channel,
};

/// Scriptable chain double for exercising the session controller without a
/// node. Clones share state, so a test can hold one handle while the
/// controller owns another.
#[derive(Clone)]
pub struct MockChain {
    player: Address,
    connected: Arc<AtomicBool>,
    allowance: Arc<Mutex<U256>>,
    fail_next_play: Arc<Mutex<Option<String>>>,
    fail_next_receipt: Arc<Mutex<Option<String>>>,
    play_calls: Arc<AtomicU64>,
    approve_calls: Arc<AtomicU64>,
    senders: Arc<Mutex<Vec<UnboundedSender<ChainEvent>>>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            player: Address::from_low_u64_be(0xDA),
            connected: Arc::new(AtomicBool::new(true)),
            allowance: Arc::new(Mutex::new(U256::MAX)),
            fail_next_play: Arc::new(Mutex::new(None)),
            fail_next_receipt: Arc::new(Mutex::new(None)),
            play_calls: Arc::new(AtomicU64::new(0)),
            approve_calls: Arc::new(AtomicU64::new(0)),
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::SeqCst);
    }

    pub fn set_allowance(&self, amount: U256) {
        *self.allowance.lock().unwrap() = amount;
    }

    pub fn fail_next_play(&self, message: impl Into<String>) {
        *self.fail_next_play.lock().unwrap() = Some(message.into());
    }

    pub fn fail_next_receipt(&self, message: impl Into<String>) {
        *self.fail_next_receipt.lock().unwrap() = Some(message.into());
    }

    pub fn play_calls(&self) -> u64 {
        self.play_calls.load(Ordering::SeqCst)
    }

    pub fn approve_calls(&self) -> u64 {
        self.approve_calls.load(Ordering::SeqCst)
    }

    /// Pushes an event into every live subscription.
    pub fn emit(&self, event: ChainEvent) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl GameChain for MockChain {
    fn player(&self) -> Address {
        self.player
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn allowance(&self) -> Result<U256> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn approve(&self, amount: U256) -> Result<TxHandle> {
        self.approve_calls.fetch_add(1, Ordering::SeqCst);
        *self.allowance.lock().unwrap() = amount;
        Ok(H256::from_low_u64_be(0xA11))
    }

    async fn play_game(&self) -> Result<TxHandle> {
        if let Some(message) = self.fail_next_play.lock().unwrap().take() {
            return Err(eyre!(message));
        }
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        Ok(H256::from_low_u64_be(0xD1CE))
    }

    async fn await_receipt(&self, _tx: TxHandle) -> Result<()> {
        if let Some(message) = self.fail_next_receipt.lock().unwrap().take() {
            return Err(eyre!(message));
        }
        Ok(())
    }

    fn subscribe_results(&self) -> ResultSubscription {
        let (tx, rx) = unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        ResultSubscription::from_channel(rx, None)
    }
}
