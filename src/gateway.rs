use crate::{
    artifact::{
        self,
        ContractArtifact,
    },
    error::BankError,
    units,
};
use ethers::{
    abi::Token,
    contract::{
        Contract,
        ContractCall,
    },
    providers::{
        Middleware,
        PendingTransaction,
    },
    types::{
        Address,
        TxHash,
        U64,
        U256,
    },
};
use std::{
    future::Future,
    sync::Arc,
};
use tracing::{
    debug,
    info,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Friend {
    pub name: String,
    pub wallet_address: Address,
}

impl Friend {
    pub fn new(name: impl Into<String>, wallet_address: Address) -> Self {
        Self {
            name: name.into(),
            wallet_address,
        }
    }
}

/// One state-changing contract call, already encoded for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BankCall {
    Deposit { amount: U256 },
    Withdraw { to: Address, amount: U256 },
    AddFriend { name: [u8; 32], account: Address },
    Transfer { to: Address, amount: U256 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

/// The wallet and bank contract as seen from the view.
pub trait BankGateway: Send + Sync + 'static {
    /// Requests account access and returns the first authorized account.
    fn connect(&self) -> impl Future<Output = Result<Address, BankError>> + Send;

    fn balance(&self) -> impl Future<Output = Result<U256, BankError>> + Send;

    fn friends(&self) -> impl Future<Output = Result<Vec<Friend>, BankError>> + Send;

    /// Sends the transaction and resolves once the node has accepted it.
    fn submit(
        &self,
        call: &BankCall,
    ) -> impl Future<Output = Result<TxHash, BankError>> + Send;

    /// Resolves once `hash` is mined with the configured number of confirmations.
    fn confirm(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Confirmation, BankError>> + Send;
}

pub struct EthersBank<M: Middleware> {
    client: Arc<M>,
    contract: Contract<M>,
    accounts: AccountSource,
    confirmations: usize,
}

/// Where the connected account comes from.
#[derive(Clone, Copy, Debug)]
pub enum AccountSource {
    /// The middleware signs locally with this address.
    Signer(Address),
    /// The endpoint signs for this sender, bound when the session was opened.
    Node(Address),
}

impl<M: Middleware + 'static> EthersBank<M> {
    pub fn new(
        client: Arc<M>,
        address: Address,
        artifact: &ContractArtifact,
        accounts: AccountSource,
        confirmations: usize,
    ) -> Self {
        let contract = Contract::new(address, artifact.abi.clone(), client.clone());
        Self {
            client,
            contract,
            accounts,
            confirmations: confirmations.max(1),
        }
    }

    pub fn contract_address(&self) -> Address {
        self.contract.address()
    }

    /// Builds the transaction for `call` without sending it.
    fn prepare(&self, call: &BankCall) -> Result<ContractCall<M, ()>, BankError> {
        let contract = &self.contract;
        let prepared = match call {
            BankCall::Deposit { amount } => contract
                .method::<_, ()>(artifact::DEPOSIT_METHOD, ())?
                .value(*amount),
            BankCall::Withdraw { to, amount } => {
                contract.method::<_, ()>(artifact::WITHDRAW_METHOD, (*to, *amount))?
            }
            BankCall::AddFriend { name, account } => {
                contract.method::<_, ()>(artifact::ADD_FRIEND_METHOD, (*name, *account))?
            }
            BankCall::Transfer { to, amount } => {
                contract.method::<_, ()>(artifact::TRANSFER_METHOD, (*to, *amount))?
            }
        };
        Ok(prepared)
    }

    async fn send_call(&self, call: &BankCall) -> Result<TxHash, BankError> {
        let prepared = self.prepare(call)?;
        let pending = prepared.send().await.map_err(BankError::from_contract)?;
        Ok(*pending)
    }
}

impl<M: Middleware + 'static> BankGateway for EthersBank<M> {
    async fn connect(&self) -> Result<Address, BankError> {
        match self.accounts {
            AccountSource::Signer(address) => {
                // the endpoint must answer before the account counts as connected
                self.client
                    .get_chainid()
                    .await
                    .map_err(BankError::from_middleware)?;
                Ok(address)
            }
            AccountSource::Node(sender) => {
                let accounts: Vec<Address> = self
                    .client
                    .provider()
                    .request("eth_requestAccounts", ())
                    .await
                    .map_err(BankError::from_provider)?;
                if accounts.contains(&sender) {
                    Ok(sender)
                } else if accounts.is_empty() {
                    Err(BankError::ProviderUnavailable(String::from(
                        "the wallet endpoint returned no accounts",
                    )))
                } else {
                    Err(BankError::Rejected(format!(
                        "the wallet endpoint no longer authorizes {sender:#x}"
                    )))
                }
            }
        }
    }

    async fn balance(&self) -> Result<U256, BankError> {
        let balance = self
            .contract
            .method::<_, U256>(artifact::BALANCE_METHOD, ())?
            .call()
            .await
            .map_err(BankError::from_contract)?;
        debug!(%balance, "retrieved balance");
        Ok(balance)
    }

    async fn friends(&self) -> Result<Vec<Friend>, BankError> {
        let raw = self
            .contract
            .method::<_, Token>(artifact::FRIEND_LIST_METHOD, ())?
            .call()
            .await
            .map_err(BankError::from_contract)?;
        let friends = decode_friend_list(raw)?;
        debug!(count = friends.len(), "retrieved friend list");
        Ok(friends)
    }

    async fn submit(&self, call: &BankCall) -> Result<TxHash, BankError> {
        let hash = self.send_call(call).await?;
        info!(?call, tx = ?hash, "transaction submitted");
        Ok(hash)
    }

    async fn confirm(&self, hash: TxHash) -> Result<Confirmation, BankError> {
        let receipt = PendingTransaction::new(hash, self.client.provider())
            .confirmations(self.confirmations)
            .await
            .map_err(BankError::from_provider)?
            .ok_or(BankError::Dropped(hash))?;
        if receipt.status == Some(U64::zero()) {
            return Err(BankError::Reverted(format!(
                "transaction {hash:#x} failed on chain"
            )));
        }
        let block_number = receipt.block_number.map(|n| n.as_u64());
        info!(tx = ?hash, ?block_number, "transaction confirmed");
        Ok(Confirmation { hash, block_number })
    }
}

/// Decodes `(bytes32 name, address friendAccount)[]`.
pub fn decode_friend_list(token: Token) -> Result<Vec<Friend>, BankError> {
    let malformed = || BankError::Abi(String::from("unexpected friend list encoding"));
    let Token::Array(items) = token else {
        return Err(malformed());
    };
    items
        .into_iter()
        .map(|item| {
            let Token::Tuple(fields) = item else {
                return Err(malformed());
            };
            match fields.as_slice() {
                [Token::FixedBytes(name), Token::Address(account)] => {
                    let raw: [u8; 32] = name.as_slice().try_into().map_err(|_| malformed())?;
                    let name = units::decode_name(&raw)
                        .map_err(|e| BankError::Abi(e.to_string()))?;
                    Ok(Friend::new(name, *account))
                }
                _ => Err(malformed()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn friend_token(name: &str, account: Address) -> Token {
        let raw = units::encode_name(name).unwrap();
        Token::Tuple(vec![Token::FixedBytes(raw.to_vec()), Token::Address(account)])
    }

    #[test]
    fn decode_friend_list__reads_names_and_addresses() {
        // given
        let bob = Address::repeat_byte(0xbb);
        let carol = Address::repeat_byte(0xcc);
        let token = Token::Array(vec![friend_token("Bob", bob), friend_token("Carol", carol)]);

        // when
        let friends = decode_friend_list(token).unwrap();

        // then
        assert_eq!(
            friends,
            vec![Friend::new("Bob", bob), Friend::new("Carol", carol)]
        );
    }

    #[test]
    fn decode_friend_list__accepts_empty_list() {
        assert_eq!(decode_friend_list(Token::Array(vec![])).unwrap(), vec![]);
    }

    #[test]
    fn decode_friend_list__rejects_unexpected_shapes() {
        // given
        let wrong_outer = Token::Uint(U256::one());
        let wrong_inner = Token::Array(vec![Token::Tuple(vec![Token::Bool(true)])]);
        let short_name = Token::Array(vec![Token::Tuple(vec![
            Token::FixedBytes(vec![0u8; 4]),
            Token::Address(Address::zero()),
        ])]);

        // then
        assert!(matches!(decode_friend_list(wrong_outer), Err(BankError::Abi(_))));
        assert!(matches!(decode_friend_list(wrong_inner), Err(BankError::Abi(_))));
        assert!(matches!(decode_friend_list(short_name), Err(BankError::Abi(_))));
    }

    mod ethers_bank {
        use super::*;
        use ethers::{
            abi,
            providers::{
                JsonRpcError,
                MockProvider,
                MockResponse,
                Provider,
            },
            types::{
                Bytes,
                NameOrAddress,
                Transaction,
                TransactionReceipt,
            },
            utils,
        };
        use std::time::Duration;

        const TIMEOUT: Duration = Duration::from_secs(5);

        fn bank_address() -> Address {
            Address::repeat_byte(0x42)
        }

        fn mocked(accounts: AccountSource) -> (EthersBank<Provider<MockProvider>>, MockProvider) {
            let (provider, mock) = Provider::mocked();
            let provider = provider.interval(Duration::from_millis(5));
            let artifact = ContractArtifact::packaged().unwrap();
            let bank = EthersBank::new(Arc::new(provider), bank_address(), &artifact, accounts, 1);
            (bank, mock)
        }

        fn signer_bank() -> (EthersBank<Provider<MockProvider>>, MockProvider) {
            mocked(AccountSource::Signer(Address::repeat_byte(0xaa)))
        }

        fn calldata(signature: &str, args: &[Token]) -> Vec<u8> {
            let mut data = utils::id(signature).to_vec();
            data.extend(abi::encode(args));
            data
        }

        fn push_rpc_error(mock: &MockProvider, code: i64, message: &str, data: Option<Vec<u8>>) {
            mock.push_response(MockResponse::Error(JsonRpcError {
                code,
                message: message.to_string(),
                data: data.map(|d| serde_json::Value::String(format!("0x{}", hex::encode(d)))),
            }));
        }

        #[test]
        fn prepare__deposit_attaches_value_to_payable_call() {
            // given
            let (bank, _mock) = signer_bank();
            let amount = U256::exp10(18);

            // when
            let prepared = bank.prepare(&BankCall::Deposit { amount }).unwrap();

            // then
            assert_eq!(
                prepared.tx.to(),
                Some(&NameOrAddress::Address(bank_address()))
            );
            assert_eq!(prepared.tx.value(), Some(&amount));
            assert_eq!(
                prepared.tx.data().unwrap().to_vec(),
                calldata("depositMoney()", &[])
            );
        }

        #[test]
        fn prepare__add_friend_encodes_bytes32_name_and_address() {
            // given
            let (bank, _mock) = signer_bank();
            let name = units::encode_name("Bob").unwrap();
            let account = Address::repeat_byte(0xbb);

            // when
            let prepared = bank.prepare(&BankCall::AddFriend { name, account }).unwrap();

            // then
            assert_eq!(
                prepared.tx.data().unwrap().to_vec(),
                calldata(
                    "addFriend(bytes32,address)",
                    &[Token::FixedBytes(name.to_vec()), Token::Address(account)]
                )
            );
            assert_eq!(prepared.tx.value(), None);
        }

        #[test]
        fn prepare__withdraw_and_transfer_pass_amount_as_argument() {
            // given
            let (bank, _mock) = signer_bank();
            let to = Address::repeat_byte(0xcc);
            let amount = U256::from(500u64);
            let args = [Token::Address(to), Token::Uint(amount)];

            // when
            let withdraw = bank.prepare(&BankCall::Withdraw { to, amount }).unwrap();
            let transfer = bank.prepare(&BankCall::Transfer { to, amount }).unwrap();

            // then
            assert_eq!(
                withdraw.tx.data().unwrap().to_vec(),
                calldata("withDrawMoney(address,uint256)", &args)
            );
            assert_eq!(
                transfer.tx.data().unwrap().to_vec(),
                calldata("transferMoney(address,uint256)", &args)
            );
            assert_eq!(withdraw.tx.value(), None);
            assert_eq!(transfer.tx.value(), None);
        }

        #[tokio::test]
        async fn balance__decodes_uint_result() {
            // given
            let (bank, mock) = signer_bank();
            let encoded = Bytes::from(abi::encode(&[Token::Uint(U256::from(1234u64))]));
            mock.push::<Bytes, _>(encoded).unwrap();

            // when
            let balance = bank.balance().await.unwrap();

            // then
            assert_eq!(balance, U256::from(1234u64));
        }

        #[tokio::test]
        async fn friends__decodes_tuple_array_result() {
            // given
            let (bank, mock) = signer_bank();
            let bob = Address::repeat_byte(0xbb);
            let list = Token::Array(vec![Token::Tuple(vec![
                Token::FixedBytes(units::encode_name("Bob").unwrap().to_vec()),
                Token::Address(bob),
            ])]);
            mock.push::<Bytes, _>(Bytes::from(abi::encode(&[list]))).unwrap();

            // when
            let friends = bank.friends().await.unwrap();

            // then
            assert_eq!(friends, vec![Friend::new("Bob", bob)]);
        }

        #[tokio::test]
        async fn balance__revert_reason_is_decoded() {
            // given
            let (bank, mock) = signer_bank();
            let reason = calldata("Error(string)", &[Token::String(String::from("not a customer"))]);
            push_rpc_error(&mock, 3, "execution reverted: not a customer", Some(reason));

            // when
            let result = bank.balance().await;

            // then
            assert_eq!(result, Err(BankError::Reverted(String::from("not a customer"))));
        }

        #[tokio::test]
        async fn balance__wallet_rejection_is_rejected() {
            // given
            let (bank, mock) = signer_bank();
            push_rpc_error(&mock, 4001, "User rejected the request.", None);

            // when
            let result = bank.balance().await;

            // then
            assert!(matches!(result, Err(BankError::Rejected(_))));
        }

        #[tokio::test]
        async fn confirm__missing_transaction_is_dropped() {
            // given
            let (bank, mock) = signer_bank();
            let hash = TxHash::repeat_byte(0x11);
            // first poll plus every retry
            for _ in 0..4 {
                mock.push::<Option<Transaction>, _>(None::<Transaction>).unwrap();
            }

            // when
            let result = tokio::time::timeout(TIMEOUT, bank.confirm(hash)).await.unwrap();

            // then
            assert_eq!(result, Err(BankError::Dropped(hash)));
        }

        fn push_mined(mock: &MockProvider, hash: TxHash, status: u64) {
            let receipt = TransactionReceipt {
                transaction_hash: hash,
                block_number: Some(U64::from(7)),
                status: Some(U64::from(status)),
                ..Default::default()
            };
            let tx = Transaction {
                hash,
                block_number: Some(U64::from(7)),
                ..Default::default()
            };
            // responses are served last in, first out
            mock.push::<TransactionReceipt, _>(receipt).unwrap();
            mock.push::<Transaction, _>(tx).unwrap();
        }

        #[tokio::test]
        async fn confirm__failed_receipt_is_reverted() {
            // given
            let (bank, mock) = signer_bank();
            let hash = TxHash::repeat_byte(0x22);
            push_mined(&mock, hash, 0);

            // when
            let result = tokio::time::timeout(TIMEOUT, bank.confirm(hash)).await.unwrap();

            // then
            assert!(matches!(result, Err(BankError::Reverted(_))));
        }

        #[tokio::test]
        async fn confirm__successful_receipt_reports_block() {
            // given
            let (bank, mock) = signer_bank();
            let hash = TxHash::repeat_byte(0x33);
            push_mined(&mock, hash, 1);

            // when
            let result = tokio::time::timeout(TIMEOUT, bank.confirm(hash)).await.unwrap();

            // then
            assert_eq!(
                result,
                Ok(Confirmation {
                    hash,
                    block_number: Some(7)
                })
            );
        }

        #[tokio::test]
        async fn connect__node_account_returns_bound_sender() {
            // given
            let sender = Address::repeat_byte(0xaa);
            let (bank, mock) = mocked(AccountSource::Node(sender));
            let other = Address::repeat_byte(0xdd);
            mock.push::<Vec<Address>, _>(vec![other, sender]).unwrap();

            // when
            let account = bank.connect().await;

            // then
            assert_eq!(account, Ok(sender));
        }

        #[tokio::test]
        async fn connect__node_account_no_longer_authorized_is_rejected() {
            // given
            let sender = Address::repeat_byte(0xaa);
            let (bank, mock) = mocked(AccountSource::Node(sender));
            mock.push::<Vec<Address>, _>(vec![Address::repeat_byte(0xdd)]).unwrap();

            // when
            let account = bank.connect().await;

            // then
            assert!(matches!(account, Err(BankError::Rejected(_))));
        }

        #[tokio::test]
        async fn connect__signer_needs_reachable_endpoint() {
            // given
            let (bank, mock) = signer_bank();
            mock.push::<U256, _>(U256::from(31337u64)).unwrap();

            // when
            let account = bank.connect().await;

            // then
            assert_eq!(account, Ok(Address::repeat_byte(0xaa)));
        }
    }
}
