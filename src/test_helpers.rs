use crate::{
    error::BankError,
    gateway::{
        BankCall,
        BankGateway,
        Confirmation,
        Friend,
    },
    units,
};
use ethers::types::{
    Address,
    TxHash,
    U256,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};
use tokio::sync::Semaphore;

/// In-memory stand-in for the Payment contract behind a single wallet account.
pub struct MockBank {
    ledger: Mutex<Ledger>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

#[derive(Default)]
struct Ledger {
    account: Option<Address>,
    connect_error: Option<BankError>,
    balances: HashMap<Address, U256>,
    friends: HashMap<Address, Vec<Friend>>,
    in_flight: HashMap<TxHash, (Address, BankCall)>,
    calls: Vec<BankCall>,
    next_fault: Option<BankError>,
    drop_next: bool,
    next_block: u64,
}

impl Default for MockBank {
    fn default() -> Self {
        Self::new(MockBank::alice())
    }
}

impl MockBank {
    pub fn alice() -> Address {
        Address::repeat_byte(0xaa)
    }

    pub fn bob() -> Address {
        Address::repeat_byte(0xbb)
    }

    pub fn new(account: Address) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                account: Some(account),
                next_block: 1,
                ..Ledger::default()
            }),
            gate: Mutex::new(None),
        }
    }

    /// A bank whose wallet refuses every connection attempt.
    pub fn without_wallet(error: BankError) -> Self {
        let bank = Self::default();
        {
            let mut ledger = bank.ledger();
            ledger.account = None;
            ledger.connect_error = Some(error);
        }
        bank
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_balance(self, account: Address, amount: U256) -> Self {
        self.ledger().balances.insert(account, amount);
        self
    }

    pub fn with_friend(self, owner: Address, friend: Friend) -> Self {
        self.ledger().friends.entry(owner).or_default().push(friend);
        self
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.ledger()
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    pub fn friends_of(&self, owner: Address) -> Vec<Friend> {
        self.ledger()
            .friends
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call that reached `submit`, in order.
    pub fn calls(&self) -> Vec<BankCall> {
        self.ledger().calls.clone()
    }

    pub fn fail_next_submit(&self, error: BankError) {
        self.ledger().next_fault = Some(error);
    }

    pub fn drop_next_confirmation(&self) {
        self.ledger().drop_next = true;
    }

    /// Confirmations block until `release_confirmations` is called.
    pub fn hold_confirmations(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        *gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_confirmations(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(gate) = gate.take() {
            gate.close();
        }
    }

    fn current_gate(&self) -> Option<Arc<Semaphore>> {
        self.gate.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn connected(&self) -> Result<Address, BankError> {
        self.ledger().account.ok_or_else(|| {
            BankError::ProviderUnavailable(String::from("no account connected"))
        })
    }
}

impl Ledger {
    fn balance(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn check(&self, caller: Address, call: &BankCall) -> Result<(), BankError> {
        match call {
            BankCall::Withdraw { amount, .. } | BankCall::Transfer { amount, .. }
                if *amount > self.balance(&caller) =>
            {
                Err(BankError::Reverted(String::from("insufficient balance")))
            }
            BankCall::AddFriend { name, account } => {
                let name = units::decode_name(name)
                    .map_err(|e| BankError::Reverted(e.to_string()))?;
                let known = self.friends.get(&caller).is_some_and(|friends| {
                    friends
                        .iter()
                        .any(|f| f.wallet_address == *account || f.name == name)
                });
                if known {
                    Err(BankError::Reverted(String::from("friend already added")))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    fn debit(&mut self, account: Address, amount: U256) -> Result<(), BankError> {
        let balance = self.balances.entry(account).or_default();
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| BankError::Reverted(String::from("insufficient balance")))?;
        Ok(())
    }

    /// Applies a mined call. Balances are checked again, as other calls may have mined first.
    fn execute(&mut self, caller: Address, call: BankCall) -> Result<(), BankError> {
        match call {
            BankCall::Deposit { amount } => {
                *self.balances.entry(caller).or_default() += amount;
            }
            BankCall::Withdraw { amount, .. } => self.debit(caller, amount)?,
            BankCall::Transfer { to, amount } => {
                self.debit(caller, amount)?;
                *self.balances.entry(to).or_default() += amount;
            }
            BankCall::AddFriend { name, account } => {
                let name = units::decode_name(&name).unwrap_or_default();
                self.friends
                    .entry(caller)
                    .or_default()
                    .push(Friend::new(name, account));
            }
        }
        Ok(())
    }
}

impl BankGateway for MockBank {
    async fn connect(&self) -> Result<Address, BankError> {
        let ledger = self.ledger();
        if let Some(error) = &ledger.connect_error {
            return Err(error.clone());
        }
        ledger.account.ok_or_else(|| {
            BankError::ProviderUnavailable(String::from("the wallet returned no accounts"))
        })
    }

    async fn balance(&self) -> Result<U256, BankError> {
        let account = self.connected()?;
        Ok(self.balance_of(account))
    }

    async fn friends(&self) -> Result<Vec<Friend>, BankError> {
        let account = self.connected()?;
        Ok(self.friends_of(account))
    }

    async fn submit(&self, call: &BankCall) -> Result<TxHash, BankError> {
        let caller = self.connected()?;
        let mut ledger = self.ledger();
        ledger.calls.push(call.clone());
        if let Some(error) = ledger.next_fault.take() {
            return Err(error);
        }
        ledger.check(caller, call)?;
        let hash = TxHash::from_low_u64_be(ledger.calls.len() as u64);
        ledger.in_flight.insert(hash, (caller, call.clone()));
        Ok(hash)
    }

    async fn confirm(&self, hash: TxHash) -> Result<Confirmation, BankError> {
        if let Some(gate) = self.current_gate() {
            // closed on release
            let _ = gate.acquire().await;
        }
        let mut ledger = self.ledger();
        let entry = ledger.in_flight.remove(&hash);
        let Some((caller, call)) = entry else {
            return Err(BankError::Dropped(hash));
        };
        if std::mem::take(&mut ledger.drop_next) {
            return Err(BankError::Dropped(hash));
        }
        ledger.execute(caller, call)?;
        let block_number = ledger.next_block;
        ledger.next_block += 1;
        Ok(Confirmation {
            hash,
            block_number: Some(block_number),
        })
    }
}
