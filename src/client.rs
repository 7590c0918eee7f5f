use crate::{
    addresses,
    chain::{
        ChainEvent,
        EvmChain,
        GameChain,
        GameResultEvent,
        TxHandle,
    },
    dice::{
        ANIMATION_POLL_INTERVAL,
        DICE_COUNT,
        DiceRow,
        INITIAL_FACE,
    },
    ui,
    wallets,
};
use color_eyre::eyre::Result;
use ethers::types::{
    Address,
    U256,
};
use std::{
    path::PathBuf,
    time::{
        Duration,
        Instant,
    },
};
use tokio::time;
use tracing::{
    error,
    info,
};

pub const DEFAULT_MAINNET_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://sepolia.base.org";

/// The fixed deposit: 1 USDC (6 decimals).
pub const REQUIRED_DEPOSIT: u64 = 1_000_000;

const CONNECT_PROMPT: &str = "Connect your wallet to play.";
const READY_PROMPT: &str = "Wallet connected. Press r to roll!";
const MAX_ERRORS: usize = 50;
const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Mainnet { url: String },
    Testnet { url: String },
}

impl NetworkTarget {
    pub fn chain_id(&self) -> u64 {
        match self {
            NetworkTarget::Mainnet { .. } => addresses::CHAIN_ID_BASE,
            NetworkTarget::Testnet { .. } => addresses::CHAIN_ID_BASE_SEPOLIA,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Mainnet { url } | NetworkTarget::Testnet { url } => url,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NetworkTarget::Mainnet { .. } => "Base",
            NetworkTarget::Testnet { .. } => "Base Sepolia",
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallet: WalletConfig,
    pub game_address: Option<Address>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GameState {
    Initial,
    Connecting,
    CheckingAllowance,
    Approving,
    Approved,
    SendingDeposit,
    WaitingForRollResult,
    GameOver,
}

pub type DiceDisplay = [u8; DICE_COUNT];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameOutcome {
    pub won: bool,
    pub message: String,
}

/// Everything the presentation layer needs to render one frame.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub state: GameState,
    pub faces: DiceDisplay,
    pub settled: bool,
    pub outcome: Option<GameOutcome>,
    pub message: Option<String>,
    pub connected: bool,
    pub spinning: bool,
    pub roll_enabled: bool,
    pub reset_enabled: bool,
    pub player: Address,
    pub network: &'static str,
    pub errors: Vec<String>,
}

/// Ties a result expectation to the session that created it. A Reset or a
/// disconnect bumps the epoch, so a late event for the old session no longer
/// matches and is dropped.
#[derive(Clone, Copy, Debug)]
struct PendingResult {
    epoch: u64,
}

pub struct AppController<C: GameChain> {
    chain: C,
    network: &'static str,
    state: GameState,
    dice: DiceDisplay,
    outcome: Option<GameOutcome>,
    message: Option<String>,
    epoch: u64,
    pending: Option<PendingResult>,
    connected: bool,
    errors: Vec<String>,
}

impl<C: GameChain> AppController<C> {
    pub fn new(chain: C, network: &'static str) -> Self {
        Self {
            chain,
            network,
            state: GameState::Connecting,
            dice: [INITIAL_FACE; DICE_COUNT],
            outcome: None,
            message: Some(CONNECT_PROMPT.to_string()),
            epoch: 0,
            pending: None,
            connected: false,
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn dice(&self) -> DiceDisplay {
        self.dice
    }

    pub fn outcome(&self) -> Option<&GameOutcome> {
        self.outcome.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Spinning is a projection of the state, so it can never disagree with
    /// "a deposit is in flight or a result is awaited".
    pub fn is_spinning(&self) -> bool {
        matches!(
            self.state,
            GameState::SendingDeposit | GameState::WaitingForRollResult
        )
    }

    /// A wallet transaction is mid-flight (signature or receipt pending).
    fn op_pending(&self) -> bool {
        matches!(
            self.state,
            GameState::CheckingAllowance
                | GameState::Approving
                | GameState::Approved
                | GameState::SendingDeposit
        )
    }

    pub fn roll_enabled(&self) -> bool {
        !self.op_pending() && self.state != GameState::WaitingForRollResult
    }

    pub fn reset_enabled(&self) -> bool {
        !self.op_pending()
    }

    /// Animator inputs for the dice row: spin while money is in motion, hand
    /// over targets once the game is decided.
    pub fn spin_inputs(&self) -> (bool, Option<DiceDisplay>) {
        let targets = match self.state {
            GameState::GameOver => Some(self.dice),
            _ => None,
        };
        (self.is_spinning(), targets)
    }

    pub fn subscribe_results(&self) -> crate::chain::ResultSubscription {
        self.chain.subscribe_results()
    }

    pub async fn refresh_connection(&mut self) {
        let up = self.chain.is_connected().await;
        self.set_connected(up);
    }

    fn set_connected(&mut self, up: bool) {
        if !up {
            self.connected = false;
            if self.state != GameState::Connecting {
                // Whatever was in flight belongs to a dead session now.
                self.invalidate_session();
                self.outcome = None;
                self.state = GameState::Connecting;
                self.message = Some(CONNECT_PROMPT.to_string());
            }
            return;
        }
        self.connected = true;
        if self.state == GameState::Connecting {
            self.state = GameState::Initial;
            self.message = Some(READY_PROMPT.to_string());
        }
    }

    pub async fn handle_roll(&mut self) {
        self.handle_roll_with(&mut |_| {}).await;
    }

    /// Runs the roll flow, invoking `on_progress` after every state or
    /// message change so the caller can render the intermediate stages
    /// before the next chain call blocks.
    pub async fn handle_roll_with(&mut self, on_progress: &mut dyn FnMut(&Self)) {
        if !self.roll_enabled() {
            return;
        }
        if !self.connected {
            self.message = Some("Please connect your wallet.".to_string());
            return;
        }

        self.outcome = None;
        self.state = GameState::CheckingAllowance;
        self.message = Some("Preparing to roll...".to_string());
        on_progress(self);

        let deposit = U256::from(REQUIRED_DEPOSIT);
        let allowance = match self.chain.allowance().await {
            Ok(allowance) => allowance,
            Err(err) => return self.fail(format!("Allowance check failed: {err}")),
        };

        if allowance < deposit {
            self.state = GameState::Approving;
            self.message =
                Some("Approving USDC spend. Please confirm in your wallet...".to_string());
            on_progress(self);
            let tx = match self.chain.approve(deposit).await {
                Ok(tx) => tx,
                Err(err) => return self.fail(format!("Approval error: {err}")),
            };
            self.message = Some(format!("Approving USDC... Tx: {}...", short_hash(tx)));
            on_progress(self);
            if let Err(err) = self.chain.await_receipt(tx).await {
                return self.fail(format!("Approval error: {err}"));
            }
            self.state = GameState::Approved;
            self.message = Some("USDC approved. Ready to deposit.".to_string());
            on_progress(self);
        }

        self.state = GameState::SendingDeposit;
        self.message = Some(
            "Please confirm the transaction in your wallet to deposit $1 USDC and roll."
                .to_string(),
        );
        on_progress(self);
        let tx = match self.chain.play_game().await {
            Ok(tx) => tx,
            Err(err) => return self.fail(format!("Play Game Error: {err}")),
        };
        self.message = Some(format!("Depositing $1 USDC... Tx: {}...", short_hash(tx)));
        on_progress(self);
        if let Err(err) = self.chain.await_receipt(tx).await {
            return self.fail(format!("Play Game Error: {err}"));
        }

        self.state = GameState::WaitingForRollResult;
        self.pending = Some(PendingResult { epoch: self.epoch });
        self.message = Some(
            "Deposit successful! Waiting for dice roll results from the contract...".to_string(),
        );
        info!(tx = %format!("{tx:#x}"), "deposit confirmed, awaiting GameResult");
    }

    pub fn handle_reset(&mut self) {
        if !self.reset_enabled() {
            return;
        }
        self.invalidate_session();
        self.dice = [INITIAL_FACE; DICE_COUNT];
        self.outcome = None;
        self.message = Some(READY_PROMPT.to_string());
        self.state = GameState::Initial;
    }

    pub fn apply_chain_event(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::Result(result) => self.apply_result(result),
            ChainEvent::SubscriptionError(err) => {
                if self.state == GameState::WaitingForRollResult {
                    self.fail(format!("Error receiving game results: {err}"));
                } else {
                    self.push_error(format!("Result subscription error: {err}"));
                }
            }
        }
    }

    /// The result feed closed underneath us.
    pub fn subscription_lost(&mut self) {
        if self.state == GameState::WaitingForRollResult {
            self.fail("Result subscription closed unexpectedly".to_string());
        } else {
            self.push_error("Result subscription closed unexpectedly".to_string());
        }
    }

    fn apply_result(&mut self, result: GameResultEvent) {
        if self.state != GameState::WaitingForRollResult {
            return;
        }
        let Some(pending) = self.pending else {
            return;
        };
        if pending.epoch != self.epoch {
            return;
        }
        if result.player != self.chain.player() {
            return;
        }

        self.dice = result.dice_values;
        self.outcome = Some(if result.won {
            GameOutcome {
                won: true,
                message: format!("You won! Payout: {}", result.payout_amount),
            }
        } else {
            GameOutcome {
                won: false,
                message: format!("You lost! Current pot: {}", result.pot_amount),
            }
        });
        self.state = GameState::GameOver;
        self.message = None;
        self.pending = None;
        info!(won = result.won, dice = ?result.dice_values, "game resolved");
    }

    fn invalidate_session(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.pending = None;
    }

    fn fail(&mut self, message: String) {
        self.push_error(message.clone());
        self.invalidate_session();
        self.message = Some(message);
        self.state = GameState::Initial;
    }

    fn push_error(&mut self, message: String) {
        error!("{message}");
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn snapshot(&self, dice: &DiceRow) -> AppSnapshot {
        AppSnapshot {
            state: self.state,
            faces: dice.faces(),
            settled: dice.settled(),
            outcome: self.outcome.clone(),
            message: self.message.clone(),
            connected: self.connected,
            spinning: self.is_spinning(),
            roll_enabled: self.roll_enabled(),
            reset_enabled: self.reset_enabled(),
            player: self.chain.player(),
            network: self.network,
            errors: self.errors.iter().rev().take(5).cloned().collect(),
        }
    }
}

fn short_hash(tx: TxHandle) -> String {
    let full = format!("{tx:#x}");
    full[..10].to_string()
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let chain_id = config.network.chain_id();
    let mut resolved = addresses::resolve(chain_id);
    if let Some(game_address) = config.game_address {
        resolved.game_contract = game_address;
    }

    // Unlock before entering the alternate screen so the password prompt
    // stays visible.
    let WalletConfig::Keystore { name, dir } = &config.wallet;
    let descriptor = wallets::find_wallet(dir, name)?;
    let wallet = wallets::unlock_wallet(&descriptor, chain_id)?;

    let chain = EvmChain::connect(config.network.url(), wallet, resolved)?;
    let controller = AppController::new(chain, config.network.name());

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!(network = config.network.name(), "starting danger-dice client");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<C: GameChain>(
    mut controller: AppController<C>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    let mut results = controller.subscribe_results();
    let mut dice = DiceRow::new(INITIAL_FACE);
    let mut conn_ticker = time::interval(CONNECTION_POLL_INTERVAL);
    let mut anim_ticker = time::interval(ANIMATION_POLL_INTERVAL);

    controller.refresh_connection().await;
    let (spinning, targets) = controller.spin_inputs();
    dice.sync(spinning, targets, Instant::now());
    ui::draw(ui_state, &controller.snapshot(&dice))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = conn_ticker.tick() => {
                controller.refresh_connection().await;
            }
            _ = anim_ticker.tick() => {
                let out = dice.poll(Instant::now());
                if !out.changed && !out.completed {
                    continue;
                }
                if out.completed && dice.settled() {
                    info!("dice animation settled");
                }
            }
            event = results.recv() => {
                match event {
                    Some(event) => controller.apply_chain_event(event),
                    None => controller.subscription_lost(),
                }
            }
            raw = ui::next_raw_event(input_events) => {
                let Some(event) = ui::interpret_event(ui_state, raw?) else {
                    continue;
                };
                match event {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Roll => {
                        // Render every intermediate stage (wallet prompts,
                        // tx-hash progress, the spin starting) while the
                        // roll flow blocks on chain calls.
                        let mut on_progress = |app: &AppController<C>| {
                            let (spinning, targets) = app.spin_inputs();
                            dice.sync(spinning, targets, Instant::now());
                            let _ = ui::draw(ui_state, &app.snapshot(&dice));
                        };
                        controller.handle_roll_with(&mut on_progress).await;
                    }
                    ui::UserEvent::Reset => controller.handle_reset(),
                    ui::UserEvent::Redraw => {}
                }
            }
        }
        let (spinning, targets) = controller.spin_inputs();
        dice.sync(spinning, targets, Instant::now());
        ui::draw(ui_state, &controller.snapshot(&dice))?;
    }
    Ok(())
}
