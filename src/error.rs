use ethers::{
    contract::ContractError,
    providers::{
        JsonRpcError,
        Middleware,
        MiddlewareError,
        ProviderError,
        RpcError,
    },
    types::TxHash,
};
use thiserror::Error;

/// EIP-1193 codes a wallet answers with when the user declines.
const USER_REJECTED_CODE: i64 = 4001;
const UNAUTHORIZED_CODE: i64 = 4100;
/// Geth and most nodes report reverts with this code.
const EXECUTION_REVERTED_CODE: i64 = 3;

pub const INSTALL_WALLET_MESSAGE: &str =
    "No wallet available. Configure a keystore, key file or wallet endpoint to use the bank.";

/// Everything a single wallet or contract call can fail with.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BankError {
    #[error("wallet provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("request rejected by wallet: {0}")]
    Rejected(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("transaction {0:#x} was dropped before confirmation")]
    Dropped(TxHash),
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("contract interface error: {0}")]
    Abi(String),
}

impl BankError {
    pub fn invalid(field: &'static str, reason: impl ToString) -> Self {
        BankError::InvalidInput {
            field,
            reason: reason.to_string(),
        }
    }

    /// Text shown in the error panel. Each variant gets its own wording.
    pub fn user_message(&self) -> String {
        match self {
            BankError::ProviderUnavailable(detail) => {
                format!("{INSTALL_WALLET_MESSAGE} ({detail})")
            }
            BankError::Rejected(_) => {
                String::from("The wallet declined the request.")
            }
            BankError::Reverted(reason) => {
                format!("The bank contract rejected the transaction: {reason}")
            }
            BankError::Dropped(hash) => {
                format!("Transaction {hash:#x} disappeared before it was mined.")
            }
            BankError::InvalidInput { field, reason } => {
                format!("Check the {field}: {reason}")
            }
            BankError::Rpc(detail) => format!("Network error: {detail}"),
            BankError::Abi(detail) => format!("Contract interface problem: {detail}"),
        }
    }

    pub fn from_contract<M: Middleware>(err: ContractError<M>) -> Self {
        if let Some(reason) = err.decode_revert::<String>() {
            return BankError::Reverted(reason);
        }
        if err.is_revert() {
            return BankError::Reverted(String::from("execution reverted"));
        }
        if let ContractError::AbiError(abi) = &err {
            return BankError::Abi(abi.to_string());
        }
        let response = match &err {
            ContractError::MiddlewareError { e } => e.as_error_response(),
            ContractError::ProviderError { e } => RpcError::as_error_response(e),
            _ => None,
        };
        match response {
            Some(response) => classify_response(response),
            None => classify_message(err.to_string()),
        }
    }

    pub fn from_provider(err: ProviderError) -> Self {
        match RpcError::as_error_response(&err) {
            Some(response) => classify_response(response),
            None => classify_message(err.to_string()),
        }
    }

    pub fn from_middleware<E: MiddlewareError>(err: E) -> Self {
        match err.as_error_response() {
            Some(response) => classify_response(response),
            None => classify_message(err.to_string()),
        }
    }
}

impl From<ethers::abi::AbiError> for BankError {
    fn from(err: ethers::abi::AbiError) -> Self {
        BankError::Abi(err.to_string())
    }
}

fn classify_response(response: &JsonRpcError) -> BankError {
    let message = response.message.clone();
    match response.code {
        USER_REJECTED_CODE | UNAUTHORIZED_CODE => BankError::Rejected(message),
        EXECUTION_REVERTED_CODE => BankError::Reverted(message),
        _ if response.is_revert() => BankError::Reverted(message),
        code => BankError::Rpc(format!("{message} (code {code})")),
    }
}

/// Fallback for transport failures that carry no JSON-RPC error object.
fn classify_message(message: String) -> BankError {
    let lowered = message.to_lowercase();
    if lowered.contains("user rejected") || lowered.contains("user denied") {
        BankError::Rejected(message)
    } else if lowered.contains("execution reverted") {
        BankError::Reverted(message)
    } else if lowered.contains("error sending request")
        || lowered.contains("connection refused")
    {
        BankError::ProviderUnavailable(message)
    } else {
        BankError::Rpc(message)
    }
}
