#![allow(non_snake_case)]
use ethers::types::U256;
use payment_bank::{
    AppController,
    BankError,
    error::INSTALL_WALLET_MESSAGE,
    state::{
        ConnectionState,
        FormField,
        TxPhase,
    },
    test_helpers::MockBank,
};

fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::exp10(18)
}

#[tokio::test]
async fn connect__without_provider_reports_install_message() {
    // given
    let bank = MockBank::without_wallet(BankError::ProviderUnavailable(String::from(
        "no wallet configured",
    )));
    let mut controller = AppController::new(bank);

    // when
    controller.connect();
    controller.settle().await;

    // then
    let state = controller.state();
    assert_eq!(state.connection, ConnectionState::Disconnected);
    assert_eq!(state.account, None);
    let message = state.error_message().unwrap();
    assert!(message.contains(INSTALL_WALLET_MESSAGE));
}

#[tokio::test]
async fn connect__loads_account_balance_and_friends() {
    // given
    let alice = MockBank::alice();
    let bank = MockBank::default().with_balance(alice, ether(3));
    let mut controller = AppController::new(bank);

    // when
    controller.connect();
    controller.settle().await;

    // then
    let state = controller.state();
    assert!(state.is_connected());
    assert_eq!(state.account, Some(alice));
    assert_eq!(state.balance, Some(ether(3)));
    assert!(state.friends.is_empty());
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn connect__twice_keeps_the_same_account() {
    let mut controller = AppController::new(MockBank::default());
    controller.connect();
    controller.connect();
    controller.settle().await;
    assert_eq!(controller.state().account, Some(MockBank::alice()));
    assert_eq!(controller.running(), 0);
}

#[tokio::test]
async fn deposit__is_submitted_before_it_is_confirmed() {
    // given
    let mut controller = AppController::new(MockBank::default());
    controller.connect();
    controller.settle().await;
    controller.gateway().hold_confirmations();
    controller.set_input(FormField::Deposit, "2");

    // when
    let id = controller.deposit().unwrap();
    while !matches!(controller.state().pending_phase(id), Some(TxPhase::Submitted(_))) {
        let event = controller.next_worker_event().await.unwrap();
        controller.handle(event);
    }

    // then
    assert_eq!(controller.state().balance, Some(U256::zero()));
    controller.gateway().release_confirmations();
    controller.settle().await;
    assert_eq!(controller.state().pending_phase(id), None);
    assert_eq!(controller.state().balance, Some(ether(2)));
}

#[tokio::test]
async fn withdraw__revert_is_not_reported_as_missing_wallet() {
    // given
    let mut controller = AppController::new(MockBank::default());
    controller.connect();
    controller.settle().await;
    controller.set_input(FormField::Withdraw, "5");

    // when
    controller.withdraw();
    controller.settle().await;

    // then
    let state = controller.state();
    assert!(matches!(state.error, Some(BankError::Reverted(_))));
    assert!(!state.error_message().unwrap().contains(INSTALL_WALLET_MESSAGE));
    assert!(state.pending.is_empty());
    assert!(state.is_connected());
}

#[tokio::test]
async fn submit__wallet_rejection_keeps_inputs_and_error_until_dismissed() {
    // given
    let mut controller = AppController::new(MockBank::default());
    controller.connect();
    controller.settle().await;
    controller
        .gateway()
        .fail_next_submit(BankError::Rejected(String::from("user denied")));
    controller.set_input(FormField::Deposit, "1");

    // when
    controller.deposit();
    controller.settle().await;

    // then
    assert!(matches!(controller.state().error, Some(BankError::Rejected(_))));
    assert_eq!(controller.state().inputs.deposit, "1");
    controller.dismiss_error();
    assert_eq!(controller.state().error, None);
}

#[tokio::test]
async fn confirm__dropped_transaction_surfaces_its_hash() {
    // given
    let mut controller = AppController::new(MockBank::default());
    controller.connect();
    controller.settle().await;
    controller.gateway().drop_next_confirmation();
    controller.set_input(FormField::Deposit, "1");

    // when
    controller.deposit();
    controller.settle().await;

    // then
    assert!(matches!(controller.state().error, Some(BankError::Dropped(_))));
    assert_eq!(controller.gateway().balance_of(MockBank::alice()), U256::zero());
}
