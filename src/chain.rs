use crate::addresses::ChainAddresses;
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::prelude::*;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::warn;

abigen!(
    DangerDiceGame,
    r#"[
        function playGame() external
        event GameResult(address indexed player, uint256[6] diceValues, bool won, uint256 payoutAmount, uint256 potAmount)
    ]"#
);

abigen!(
    UsdcToken,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
    ]"#
);

const RESULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// Hash of an in-flight wallet transaction. A new submission supersedes the
/// previous handle; it is never mutated in place.
pub type TxHandle = H256;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameResultEvent {
    pub player: Address,
    pub dice_values: [u8; 6],
    pub won: bool,
    pub payout_amount: U256,
    pub pot_amount: U256,
}

#[derive(Clone, Debug)]
pub enum ChainEvent {
    Result(GameResultEvent),
    SubscriptionError(String),
}

/// Observer registration for `GameResult` logs. Dropping the subscription
/// aborts the backing poll task, which is the unsubscribe path.
pub struct ResultSubscription {
    rx: Option<mpsc::UnboundedReceiver<ChainEvent>>,
    task: Option<JoinHandle<()>>,
}

impl ResultSubscription {
    pub fn from_channel(
        rx: mpsc::UnboundedReceiver<ChainEvent>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { rx: Some(rx), task }
    }

    /// Next event, or `None` exactly once when the feed closes. Afterwards
    /// this pends forever so a `select!` arm over it goes quiet instead of
    /// spinning.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        match self.rx.as_mut() {
            Some(rx) => {
                let event = rx.recv().await;
                if event.is_none() {
                    self.rx = None;
                }
                event
            }
            None => std::future::pending().await,
        }
    }
}

impl Drop for ResultSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Everything the session controller needs from the chain: who the player
/// is, whether the provider is reachable, the deposit-token allowance, and
/// the play transaction plus its result feed.
#[allow(async_fn_in_trait)]
pub trait GameChain {
    fn player(&self) -> Address;
    async fn is_connected(&self) -> bool;
    async fn allowance(&self) -> Result<U256>;
    async fn approve(&self, amount: U256) -> Result<TxHandle>;
    async fn play_game(&self) -> Result<TxHandle>;
    async fn await_receipt(&self, tx: TxHandle) -> Result<()>;
    fn subscribe_results(&self) -> ResultSubscription;
}

type EvmMiddleware = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EvmChain {
    provider: Provider<Http>,
    game: DangerDiceGame<EvmMiddleware>,
    token: UsdcToken<EvmMiddleware>,
    player: Address,
    game_address: Address,
}

impl EvmChain {
    pub fn connect(rpc_url: &str, wallet: LocalWallet, addresses: ChainAddresses) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|err| eyre!("Invalid RPC URL {rpc_url}: {err}"))?;
        let player = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        let game = DangerDiceGame::new(addresses.game_contract, client.clone());
        let token = UsdcToken::new(addresses.usdc_token, client);
        Ok(Self {
            provider,
            game,
            token,
            player,
            game_address: addresses.game_contract,
        })
    }
}

impl GameChain for EvmChain {
    fn player(&self) -> Address {
        self.player
    }

    async fn is_connected(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }

    async fn allowance(&self) -> Result<U256> {
        let allowance = self
            .token
            .allowance(self.player, self.game_address)
            .call()
            .await
            .map_err(|err| eyre!("allowance query failed: {err}"))?;
        Ok(allowance)
    }

    async fn approve(&self, amount: U256) -> Result<TxHandle> {
        // The pending transaction borrows the call, so it needs a binding.
        let call = self.token.approve(self.game_address, amount);
        let pending = call
            .send()
            .await
            .map_err(|err| eyre!("approve rejected: {err}"))?;
        Ok(pending.tx_hash())
    }

    async fn play_game(&self) -> Result<TxHandle> {
        let call = self.game.play_game();
        let pending = call
            .send()
            .await
            .map_err(|err| eyre!("playGame rejected: {err}"))?;
        Ok(pending.tx_hash())
    }

    async fn await_receipt(&self, tx: TxHandle) -> Result<()> {
        let deadline = time::Instant::now() + RECEIPT_TIMEOUT;
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx).await? {
                if receipt.status == Some(U64::zero()) {
                    return Err(eyre!("transaction {tx:#x} reverted"));
                }
                return Ok(());
            }
            if time::Instant::now() >= deadline {
                return Err(eyre!("timed out waiting for receipt of {tx:#x}"));
            }
            time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn subscribe_results(&self) -> ResultSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let provider = self.provider.clone();
        let game = self.game.clone();
        let task = tokio::spawn(async move {
            watch_results(provider, game, tx).await;
        });
        ResultSubscription::from_channel(rx, Some(task))
    }
}

/// Polls `GameResult` logs and forwards them oldest-first. Errors are
/// surfaced to the subscriber and polling continues; it is the controller's
/// call whether an error tears down the session.
async fn watch_results(
    provider: Provider<Http>,
    game: DangerDiceGame<EvmMiddleware>,
    tx: mpsc::UnboundedSender<ChainEvent>,
) {
    let mut from_block: Option<u64> = None;
    loop {
        time::sleep(RESULT_POLL_INTERVAL).await;
        let latest = match provider.get_block_number().await {
            Ok(number) => number.as_u64(),
            Err(err) => {
                if tx
                    .send(ChainEvent::SubscriptionError(err.to_string()))
                    .is_err()
                {
                    return;
                }
                continue;
            }
        };
        let start = *from_block.get_or_insert(latest);
        if latest < start {
            continue;
        }
        match game
            .event::<GameResultFilter>()
            .from_block(start)
            .to_block(latest)
            .query_with_meta()
            .await
        {
            Ok(mut events) => {
                events.sort_by_key(|(_, meta)| (meta.block_number, meta.log_index));
                for (event, meta) in events {
                    match decode_result(event) {
                        Ok(result) => {
                            if tx.send(ChainEvent::Result(result)).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(
                                block = meta.block_number.as_u64(),
                                log_index = meta.log_index.as_u64(),
                                %err,
                                "ignoring malformed GameResult log"
                            );
                        }
                    }
                }
                from_block = Some(latest + 1);
            }
            Err(err) => {
                if tx
                    .send(ChainEvent::SubscriptionError(err.to_string()))
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

fn decode_result(event: GameResultFilter) -> Result<GameResultEvent> {
    let mut dice_values = [0u8; 6];
    for (slot, raw) in dice_values.iter_mut().zip(event.dice_values.iter()) {
        if raw.is_zero() || *raw > U256::from(6) {
            return Err(eyre!("dice value {raw} out of range"));
        }
        *slot = raw.as_u64() as u8;
    }
    Ok(GameResultEvent {
        player: event.player,
        dice_values,
        won: event.won,
        payout_amount: event.payout_amount,
        pot_amount: event.pot_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_result__rejects_out_of_range_faces() {
        let event = GameResultFilter {
            player: Address::zero(),
            dice_values: [U256::from(7); 6],
            won: false,
            payout_amount: U256::zero(),
            pot_amount: U256::zero(),
        };
        assert!(decode_result(event).is_err());
    }

    #[test]
    fn decode_result__maps_valid_faces() {
        let event = GameResultFilter {
            player: Address::zero(),
            dice_values: [
                U256::from(1),
                U256::from(2),
                U256::from(3),
                U256::from(4),
                U256::from(5),
                U256::from(6),
            ],
            won: true,
            payout_amount: U256::from(100),
            pot_amount: U256::zero(),
        };
        let result = decode_result(event).unwrap();
        assert_eq!(result.dice_values, [1, 2, 3, 4, 5, 6]);
        assert!(result.won);
    }
}
