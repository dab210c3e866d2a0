#![allow(non_snake_case)]
use ethers::types::U256;
use payment_bank::{
    AppController,
    BankCall,
    BankError,
    state::{
        FormField,
        TxPhase,
    },
    test_helpers::MockBank,
};

async fn connected(bank: MockBank) -> AppController<MockBank> {
    let mut controller = AppController::new(bank);
    controller.connect();
    controller.settle().await;
    controller
}

#[tokio::test]
async fn deposit__sends_value_in_base_units_then_refreshes_balance() {
    // given
    let mut controller = connected(MockBank::default()).await;
    controller.set_input(FormField::Deposit, "1.5");

    // when
    controller.deposit();
    controller.settle().await;

    // then
    let expected = U256::from(1_500_000_000_000_000_000u64);
    assert_eq!(
        controller.gateway().calls(),
        vec![BankCall::Deposit { amount: expected }]
    );
    assert_eq!(controller.state().balance, Some(expected));
    assert!(controller.state().pending.is_empty());
}

#[tokio::test]
async fn withdraw__pays_out_to_the_connected_account() {
    // given
    let alice = MockBank::alice();
    let bank = MockBank::default().with_balance(alice, U256::exp10(18));
    let mut controller = connected(bank).await;
    controller.set_input(FormField::Withdraw, "0.5");

    // when
    controller.withdraw();
    controller.settle().await;

    // then
    let half = U256::from(500_000_000_000_000_000u64);
    assert_eq!(
        controller.gateway().calls(),
        vec![BankCall::Withdraw {
            to: alice,
            amount: half
        }]
    );
    assert_eq!(controller.state().balance, Some(half));
}

#[tokio::test]
async fn refresh_all__reads_balance_and_friends_of_wallet_account() {
    // given
    let alice = MockBank::alice();
    let bank = MockBank::default().with_balance(alice, U256::from(42u64));
    let mut controller = AppController::new(bank);

    // when
    controller.refresh_all();
    controller.settle().await;

    // then
    assert_eq!(controller.state().balance, Some(U256::from(42u64)));
    assert!(controller.state().friends.is_empty());
    assert_eq!(controller.state().error, None);
}

#[tokio::test]
async fn deposit__too_many_decimals_is_never_submitted() {
    let mut controller = connected(MockBank::default()).await;
    controller.set_input(FormField::Deposit, "0.0000000000000000001");
    assert_eq!(controller.deposit(), None);
    controller.settle().await;
    assert!(controller.gateway().calls().is_empty());
    assert!(controller.state().error.is_some());
}

#[tokio::test]
async fn withdraw__second_overlapping_withdrawal_reverts_at_confirmation() {
    // given
    let alice = MockBank::alice();
    let bank = MockBank::default().with_balance(alice, U256::exp10(18));
    let mut controller = connected(bank).await;
    controller.gateway().hold_confirmations();
    controller.set_input(FormField::Withdraw, "0.6");

    // when
    let first = controller.withdraw().unwrap();
    let second = controller.withdraw().unwrap();
    while [first, second].iter().any(|id| {
        !matches!(controller.state().pending_phase(*id), Some(TxPhase::Submitted(_)))
    }) {
        let event = controller.next_worker_event().await.unwrap();
        controller.handle(event);
    }
    controller.gateway().release_confirmations();
    controller.settle().await;

    // then
    let remaining = U256::from(400_000_000_000_000_000u64);
    assert_eq!(controller.gateway().balance_of(alice), remaining);
    assert_eq!(controller.state().balance, Some(remaining));
    assert!(matches!(controller.state().error, Some(BankError::Reverted(_))));
    assert!(controller.state().pending.is_empty());
}
