use crate::{
    error::BankError,
    gateway::Friend,
};
use chrono::{
    DateTime,
    Local,
};
use ethers::types::{
    Address,
    TxHash,
    U256,
};
use std::fmt;

pub type ActionId = u64;
pub type Ticket = u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormField {
    Deposit,
    Withdraw,
    NewFriendName,
    NewFriendAddress,
    TransferAmount,
}

impl FormField {
    pub fn label(self) -> &'static str {
        match self {
            FormField::Deposit => "deposit amount",
            FormField::Withdraw => "withdraw amount",
            FormField::NewFriendName => "friend name",
            FormField::NewFriendAddress => "friend wallet address",
            FormField::TransferAmount => "transfer amount",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormInputs {
    pub deposit: String,
    pub withdraw: String,
    pub new_friend_name: String,
    pub new_friend_address: String,
    pub transfer_amount: String,
}

impl FormInputs {
    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Deposit => &self.deposit,
            FormField::Withdraw => &self.withdraw,
            FormField::NewFriendName => &self.new_friend_name,
            FormField::NewFriendAddress => &self.new_friend_address,
            FormField::TransferAmount => &self.transfer_amount,
        }
    }

    fn slot(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Deposit => &mut self.deposit,
            FormField::Withdraw => &mut self.withdraw,
            FormField::NewFriendName => &mut self.new_friend_name,
            FormField::NewFriendAddress => &mut self.new_friend_address,
            FormField::TransferAmount => &mut self.transfer_amount,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Deposit,
    Withdraw,
    AddFriend,
    Transfer,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Deposit => "Deposit",
            ActionKind::Withdraw => "Withdraw",
            ActionKind::AddFriend => "Add friend",
            ActionKind::Transfer => "Transfer",
        };
        write!(f, "{name}")
    }
}

/// Where a write currently is. Not being in the pending list means idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxPhase {
    Preparing,
    Submitted(TxHash),
    Confirmed(TxHash),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub phase: TxPhase,
    pub started_at: DateTime<Local>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Connecting,
    Connected(Address),
    BalanceLoaded { ticket: Ticket, amount: U256 },
    FriendsLoaded { ticket: Ticket, friends: Vec<Friend> },
    InputChanged { field: FormField, value: String },
    FriendSelected(Friend),
    TxStarted { id: ActionId, kind: ActionKind },
    TxSubmitted { id: ActionId, hash: TxHash },
    TxConfirmed { id: ActionId },
    TxFinished { id: ActionId },
    Failed { id: Option<ActionId>, error: BankError },
    DismissError,
}

#[derive(Clone, Debug, Default)]
pub struct ViewState {
    pub connection: ConnectionState,
    pub account: Option<Address>,
    pub balance: Option<U256>,
    pub friends: Vec<Friend>,
    pub selected_friend: Option<Friend>,
    pub inputs: FormInputs,
    pub error: Option<BankError>,
    pub pending: Vec<PendingAction>,
    pub status: String,
    balance_ticket: Option<Ticket>,
    friends_ticket: Option<Ticket>,
}

impl ViewState {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Transfers need a recipient.
    pub fn can_transfer(&self) -> bool {
        self.selected_friend.is_some()
    }

    pub fn is_selected(&self, friend: &Friend) -> bool {
        self.selected_friend.as_ref() == Some(friend)
    }

    pub fn pending_phase(&self, id: ActionId) -> Option<TxPhase> {
        self.pending.iter().find(|p| p.id == id).map(|p| p.phase)
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(BankError::user_message)
    }

    fn pending_mut(&mut self, id: ActionId) -> Option<&mut PendingAction> {
        self.pending.iter_mut().find(|p| p.id == id)
    }

    fn take_pending(&mut self, id: ActionId) -> Option<PendingAction> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        Some(self.pending.remove(index))
    }
}

fn is_fresh(last: Option<Ticket>, ticket: Ticket) -> bool {
    last.is_none_or(|last| ticket > last)
}

pub fn reduce(state: &mut ViewState, action: Action) {
    match action {
        Action::Connecting => {
            state.connection = ConnectionState::Connecting;
            state.status = String::from("Connecting wallet...");
        }
        Action::Connected(address) => {
            state.connection = ConnectionState::Connected;
            state.account = Some(address);
            state.status = format!("Account connected: {address:#x}");
        }
        Action::BalanceLoaded { ticket, amount } => {
            if is_fresh(state.balance_ticket, ticket) {
                state.balance_ticket = Some(ticket);
                state.balance = Some(amount);
            }
        }
        Action::FriendsLoaded { ticket, friends } => {
            if is_fresh(state.friends_ticket, ticket) {
                state.friends_ticket = Some(ticket);
                state.friends = friends;
            }
        }
        Action::InputChanged { field, value } => {
            *state.inputs.slot(field) = value;
        }
        Action::FriendSelected(friend) => {
            if state.is_selected(&friend) {
                state.selected_friend = None;
            } else {
                state.selected_friend = Some(friend);
            }
        }
        Action::TxStarted { id, kind } => {
            state.pending.push(PendingAction {
                id,
                kind,
                phase: TxPhase::Preparing,
                started_at: Local::now(),
            });
            state.status = format!("{kind}: waiting for the wallet...");
        }
        Action::TxSubmitted { id, hash } => {
            if let Some(pending) = state.pending_mut(id) {
                pending.phase = TxPhase::Submitted(hash);
                state.status = format!("{}: submitted {hash:#x}", pending.kind);
            }
        }
        Action::TxConfirmed { id } => {
            if let Some(pending) = state.pending_mut(id)
                && let TxPhase::Submitted(hash) = pending.phase
            {
                pending.phase = TxPhase::Confirmed(hash);
                state.status = format!("{}: confirmed, refreshing...", pending.kind);
            }
        }
        Action::TxFinished { id } => {
            if let Some(done) = state.take_pending(id) {
                state.status = format!("{} complete", done.kind);
            }
        }
        Action::Failed { id, error } => {
            let failed = id.and_then(|id| state.take_pending(id));
            if state.connection == ConnectionState::Connecting {
                state.connection = if state.account.is_some() {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                };
            }
            state.status = match failed {
                Some(pending) => format!("{} failed", pending.kind),
                None => String::from("Request failed"),
            };
            state.error = Some(error);
        }
        Action::DismissError => {
            state.error = None;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn friend(name: &str, byte: u8) -> Friend {
        Friend::new(name, Address::repeat_byte(byte))
    }

    fn applied(actions: Vec<Action>) -> ViewState {
        let mut state = ViewState::default();
        for action in actions {
            reduce(&mut state, action);
        }
        state
    }

    #[test]
    fn reduce__connected_sets_account_and_state() {
        // given
        let account = Address::repeat_byte(0xaa);

        // when
        let state = applied(vec![Action::Connecting, Action::Connected(account)]);

        // then
        assert!(state.is_connected());
        assert_eq!(state.account, Some(account));
    }

    #[test]
    fn reduce__failed_connect_leaves_account_untouched() {
        // given
        let error = BankError::ProviderUnavailable(String::from("no wallet"));

        // when
        let state = applied(vec![
            Action::Connecting,
            Action::Failed {
                id: None,
                error: error.clone(),
            },
        ]);

        // then
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert_eq!(state.account, None);
        assert_eq!(state.error, Some(error));
    }

    #[test]
    fn reduce__failed_reconnect_keeps_previous_connection() {
        // given
        let account = Address::repeat_byte(0xaa);

        // when
        let state = applied(vec![
            Action::Connected(account),
            Action::Connecting,
            Action::Failed {
                id: None,
                error: BankError::Rejected(String::from("denied")),
            },
        ]);

        // then
        assert!(state.is_connected());
        assert_eq!(state.account, Some(account));
    }

    #[test]
    fn reduce__selecting_same_friend_twice_deselects() {
        // given
        let f1 = friend("Bob", 0xbb);

        // when
        let state = applied(vec![
            Action::FriendSelected(f1.clone()),
            Action::FriendSelected(f1),
        ]);

        // then
        assert_eq!(state.selected_friend, None);
        assert!(!state.can_transfer());
    }

    #[test]
    fn reduce__selecting_another_friend_replaces_selection() {
        // given
        let f1 = friend("Bob", 0xbb);
        let f2 = friend("Carol", 0xcc);

        // when
        let state = applied(vec![
            Action::FriendSelected(f1),
            Action::FriendSelected(f2.clone()),
        ]);

        // then
        assert_eq!(state.selected_friend, Some(f2));
        assert!(state.can_transfer());
    }

    #[test]
    fn reduce__selection_matches_on_name_and_address() {
        // given
        let bob = friend("Bob", 0xbb);
        let bob_elsewhere = friend("Bob", 0xcc);

        // when
        let state = applied(vec![
            Action::FriendSelected(bob),
            Action::FriendSelected(bob_elsewhere.clone()),
        ]);

        // then
        assert_eq!(state.selected_friend, Some(bob_elsewhere));
    }

    #[test]
    fn reduce__older_balance_read_does_not_overwrite_newer() {
        // when
        let state = applied(vec![
            Action::BalanceLoaded {
                ticket: 2,
                amount: U256::from(20),
            },
            Action::BalanceLoaded {
                ticket: 1,
                amount: U256::from(10),
            },
        ]);

        // then
        assert_eq!(state.balance, Some(U256::from(20)));
    }

    #[test]
    fn reduce__older_friend_read_does_not_overwrite_newer() {
        // when
        let state = applied(vec![
            Action::FriendsLoaded {
                ticket: 4,
                friends: vec![friend("Bob", 0xbb), friend("Carol", 0xcc)],
            },
            Action::FriendsLoaded {
                ticket: 3,
                friends: vec![friend("Bob", 0xbb)],
            },
        ]);

        // then
        assert_eq!(state.friends.len(), 2);
    }

    #[test]
    fn reduce__write_moves_through_phases_then_leaves_pending() {
        // given
        let hash = TxHash::repeat_byte(0x01);
        let mut state = ViewState::default();

        // when / then
        reduce(
            &mut state,
            Action::TxStarted {
                id: 7,
                kind: ActionKind::Deposit,
            },
        );
        assert_eq!(state.pending_phase(7), Some(TxPhase::Preparing));
        reduce(&mut state, Action::TxSubmitted { id: 7, hash });
        assert_eq!(state.pending_phase(7), Some(TxPhase::Submitted(hash)));
        reduce(&mut state, Action::TxConfirmed { id: 7 });
        assert_eq!(state.pending_phase(7), Some(TxPhase::Confirmed(hash)));
        reduce(&mut state, Action::TxFinished { id: 7 });
        assert_eq!(state.pending_phase(7), None);
        assert_eq!(state.status, "Deposit complete");
    }

    #[test]
    fn reduce__failed_write_returns_to_idle_with_error() {
        // given
        let error = BankError::Reverted(String::from("insufficient balance"));

        // when
        let state = applied(vec![
            Action::TxStarted {
                id: 1,
                kind: ActionKind::Withdraw,
            },
            Action::Failed {
                id: Some(1),
                error: error.clone(),
            },
        ]);

        // then
        assert!(state.pending.is_empty());
        assert_eq!(state.error, Some(error));
        assert_eq!(state.status, "Withdraw failed");
    }

    #[test]
    fn reduce__inputs_persist_and_error_only_clears_on_dismiss() {
        // when
        let mut state = applied(vec![
            Action::InputChanged {
                field: FormField::Deposit,
                value: String::from("1.5"),
            },
            Action::Failed {
                id: None,
                error: BankError::Rpc(String::from("timeout")),
            },
            Action::BalanceLoaded {
                ticket: 1,
                amount: U256::one(),
            },
        ]);

        // then
        assert_eq!(state.inputs.get(FormField::Deposit), "1.5");
        assert!(state.error.is_some());
        reduce(&mut state, Action::DismissError);
        assert!(state.error.is_none());
    }
}
