#![allow(non_snake_case)]

use danger_dice::chain::{ChainEvent, GameChain, GameResultEvent};
use danger_dice::client::{AppController, GameState, REQUIRED_DEPOSIT};
use danger_dice::test_helpers::MockChain;
use ethers::types::{Address, U256};

fn controller(chain: &MockChain) -> AppController<MockChain> {
    AppController::new(chain.clone(), "Base Sepolia")
}

fn winning_result(chain: &MockChain, dice: [u8; 6]) -> ChainEvent {
    ChainEvent::Result(GameResultEvent {
        player: chain.player(),
        dice_values: dice,
        won: true,
        payout_amount: U256::from(6_000_000u64),
        pot_amount: U256::zero(),
    })
}

fn losing_result(chain: &MockChain, dice: [u8; 6]) -> ChainEvent {
    ChainEvent::Result(GameResultEvent {
        player: chain.player(),
        dice_values: dice,
        won: false,
        payout_amount: U256::zero(),
        pot_amount: U256::from(3_000_000u64),
    })
}

#[tokio::test]
async fn wallet_disconnected__forces_connecting_state_with_prompt() {
    // given
    let chain = MockChain::new();
    chain.set_connected(false);
    let mut app = controller(&chain);

    // when
    app.refresh_connection().await;

    // then
    assert_eq!(app.state(), GameState::Connecting);
    assert!(!app.is_connected());
    assert_eq!(app.message(), Some("Connect your wallet to play."));
}

#[tokio::test]
async fn connection__moves_from_connecting_to_initial() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    assert_eq!(app.state(), GameState::Connecting);

    // when
    app.refresh_connection().await;

    // then
    assert_eq!(app.state(), GameState::Initial);
    assert!(app.is_connected());
}

#[tokio::test]
async fn roll__while_disconnected_issues_no_transaction() {
    // given
    let chain = MockChain::new();
    chain.set_connected(false);
    let mut app = controller(&chain);
    app.refresh_connection().await;

    // when
    app.handle_roll().await;

    // then
    assert_eq!(chain.play_calls(), 0);
    assert_eq!(app.state(), GameState::Connecting);
    assert_eq!(app.message(), Some("Please connect your wallet."));
}

#[tokio::test]
async fn roll__winning_result_reaches_game_over_with_dice() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();

    // when
    app.handle_roll().await;

    // then: deposit confirmed, spinning while the contract decides
    assert_eq!(app.state(), GameState::WaitingForRollResult);
    assert!(app.is_spinning());
    assert_eq!(chain.play_calls(), 1);

    // when: the GameResult event arrives
    chain.emit(winning_result(&chain, [3, 3, 3, 3, 3, 3]));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then
    assert_eq!(app.state(), GameState::GameOver);
    assert!(!app.is_spinning());
    assert_eq!(app.dice(), [3, 3, 3, 3, 3, 3]);
    let outcome = app.outcome().unwrap();
    assert!(outcome.won);
    assert!(outcome.message.contains("You won!"));

    // and the animator is told to decelerate onto the revealed faces
    let (spinning, targets) = app.spin_inputs();
    assert!(!spinning);
    assert_eq!(targets, Some([3, 3, 3, 3, 3, 3]));
}

#[tokio::test]
async fn roll__losing_result_reports_the_pot() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    app.handle_roll().await;

    // when
    chain.emit(losing_result(&chain, [1, 2, 3, 4, 5, 6]));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then
    assert_eq!(app.state(), GameState::GameOver);
    let outcome = app.outcome().unwrap();
    assert!(!outcome.won);
    assert!(outcome.message.contains("You lost!"));
    assert_eq!(app.dice(), [1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn roll__signature_rejection_returns_to_initial() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    chain.fail_next_play("user rejected transaction");

    // when
    app.handle_roll().await;

    // then: no spin, dice untouched, error surfaced
    assert_eq!(app.state(), GameState::Initial);
    assert!(!app.is_spinning());
    assert_eq!(app.dice(), [1, 1, 1, 1, 1, 1]);
    assert!(app.message().unwrap().contains("user rejected transaction"));
    assert!(app.outcome().is_none());

    // and a later roll works
    app.handle_roll().await;
    assert_eq!(app.state(), GameState::WaitingForRollResult);
    assert_eq!(chain.play_calls(), 1);
}

#[tokio::test]
async fn roll__failed_receipt_returns_to_initial() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    chain.fail_next_receipt("transaction reverted");

    // when
    app.handle_roll().await;

    // then
    assert_eq!(app.state(), GameState::Initial);
    assert!(app.message().unwrap().contains("transaction reverted"));
}

#[tokio::test]
async fn reset__during_wait_discards_late_result() {
    // given: a deposit confirmed and a result pending
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    app.handle_roll().await;
    assert_eq!(app.state(), GameState::WaitingForRollResult);

    // when: the player resets, then the old result straggles in
    app.handle_reset();
    chain.emit(winning_result(&chain, [6, 6, 6, 6, 6, 6]));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then: the stale event changed nothing
    assert_eq!(app.state(), GameState::Initial);
    assert!(app.outcome().is_none());
    assert_eq!(app.dice(), [1, 1, 1, 1, 1, 1]);
}

#[tokio::test]
async fn result__for_another_player_is_ignored() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    app.handle_roll().await;

    // when
    chain.emit(ChainEvent::Result(GameResultEvent {
        player: Address::from_low_u64_be(0xBEEF),
        dice_values: [2, 2, 2, 2, 2, 2],
        won: true,
        payout_amount: U256::from(1u64),
        pot_amount: U256::zero(),
    }));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then: still waiting for our own result
    assert_eq!(app.state(), GameState::WaitingForRollResult);
    assert!(app.outcome().is_none());
}

#[tokio::test]
async fn roll__insufficient_allowance_approves_before_deposit() {
    // given: allowance below the required deposit
    let chain = MockChain::new();
    chain.set_allowance(U256::from(REQUIRED_DEPOSIT - 1));
    let mut app = controller(&chain);
    app.refresh_connection().await;

    // when
    app.handle_roll().await;

    // then: one approval, then the deposit went out
    assert_eq!(chain.approve_calls(), 1);
    assert_eq!(chain.play_calls(), 1);
    assert_eq!(app.state(), GameState::WaitingForRollResult);
}

#[tokio::test]
async fn roll__while_awaiting_result_issues_no_second_transaction() {
    // given: a deposit already confirmed and a result awaited
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    app.handle_roll().await;
    assert_eq!(app.state(), GameState::WaitingForRollResult);

    // when: the player hammers roll again
    app.handle_roll().await;

    // then: still the one outstanding play, nothing restarted
    assert_eq!(chain.play_calls(), 1);
    assert_eq!(app.state(), GameState::WaitingForRollResult);
    assert!(app.is_spinning());
}

#[tokio::test]
async fn roll__reports_every_stage_before_each_chain_call() {
    // given: an approval is needed so the full flow runs
    let chain = MockChain::new();
    chain.set_allowance(U256::zero());
    let mut app = controller(&chain);
    app.refresh_connection().await;

    // when: each progress notification is recorded
    let mut seen = Vec::new();
    app.handle_roll_with(&mut |app| seen.push(app.state())).await;

    // then: the intermediate stages were observable, in order
    let expected = [
        GameState::CheckingAllowance,
        GameState::Approving,
        GameState::Approved,
        GameState::SendingDeposit,
    ];
    let mut stages = seen.clone();
    stages.dedup();
    for state in expected {
        assert!(stages.contains(&state), "missing stage {state:?} in {seen:?}");
    }
    let approving = stages.iter().position(|s| *s == GameState::Approving).unwrap();
    let depositing = stages.iter().position(|s| *s == GameState::SendingDeposit).unwrap();
    assert!(approving < depositing);
}

#[tokio::test]
async fn roll__sufficient_allowance_skips_approval() {
    // given
    let chain = MockChain::new();
    chain.set_allowance(U256::from(REQUIRED_DEPOSIT));
    let mut app = controller(&chain);
    app.refresh_connection().await;

    // when
    app.handle_roll().await;

    // then
    assert_eq!(chain.approve_calls(), 0);
    assert_eq!(chain.play_calls(), 1);
}

#[tokio::test]
async fn reset__after_game_over_restores_the_idle_board() {
    // given: a finished game
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    app.handle_roll().await;
    chain.emit(winning_result(&chain, [4, 4, 4, 4, 4, 4]));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);
    assert_eq!(app.state(), GameState::GameOver);

    // when
    app.handle_reset();

    // then
    assert_eq!(app.state(), GameState::Initial);
    assert_eq!(app.dice(), [1, 1, 1, 1, 1, 1]);
    assert!(app.outcome().is_none());
}

#[tokio::test]
async fn subscription_error__while_waiting_fails_the_round() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    app.handle_roll().await;

    // when
    chain.emit(ChainEvent::SubscriptionError("rpc timeout".to_string()));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then
    assert_eq!(app.state(), GameState::Initial);
    assert!(!app.is_spinning());
    assert!(app.message().unwrap().contains("rpc timeout"));
}

#[tokio::test]
async fn disconnect__while_waiting_invalidates_the_session() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    app.handle_roll().await;
    assert_eq!(app.state(), GameState::WaitingForRollResult);

    // when: the provider drops, then the old result arrives anyway
    chain.set_connected(false);
    app.refresh_connection().await;
    chain.emit(winning_result(&chain, [5, 5, 5, 5, 5, 5]));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then
    assert_eq!(app.state(), GameState::Connecting);
    assert!(app.outcome().is_none());
}

#[tokio::test]
async fn spinning__holds_exactly_while_money_is_in_motion() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    assert!(!app.is_spinning());
    app.refresh_connection().await;
    assert!(!app.is_spinning());

    // when: deposit confirmed and result awaited
    app.handle_roll().await;

    // then
    assert_eq!(app.state(), GameState::WaitingForRollResult);
    assert!(app.is_spinning());

    // and it stops the moment the session ends
    app.handle_reset();
    assert!(!app.is_spinning());
}

#[tokio::test]
async fn outcome__is_present_exactly_in_game_over() {
    // given
    let chain = MockChain::new();
    let mut app = controller(&chain);
    app.refresh_connection().await;
    let mut results = app.subscribe_results();
    assert!(app.outcome().is_none());

    app.handle_roll().await;
    assert!(app.outcome().is_none());

    // when
    chain.emit(losing_result(&chain, [2, 3, 2, 3, 2, 3]));
    let event = results.recv().await.unwrap();
    app.apply_chain_event(event);

    // then
    assert_eq!(app.state(), GameState::GameOver);
    assert!(app.outcome().is_some());

    app.handle_reset();
    assert!(app.outcome().is_none());
}
