use crate::{
    artifact::ContractArtifact,
    error::BankError,
    wallet::{
        self,
        ConnectOptions,
        WalletSource,
    },
};
use clap::{
    Parser,
    ValueEnum,
};
use color_eyre::eyre::Result;
use ethers::types::Address;
use std::path::PathBuf;

pub const DEFAULT_MAINNET_RPC_URL: &str = "https://ethereum-rpc.publicnode.com";
pub const DEFAULT_SEPOLIA_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Mainnet,
    Sepolia,
    #[default]
    Local,
}

impl Network {
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Network::Mainnet => DEFAULT_MAINNET_RPC_URL,
            Network::Sepolia => DEFAULT_SEPOLIA_RPC_URL,
            Network::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }
}

/// Terminal client for the Payment bank contract.
#[derive(Clone, Debug, Parser)]
#[command(name = "payment-bank", version, about)]
pub struct AppConfig {
    /// Network preset selecting the default RPC endpoint
    #[arg(long, value_enum, default_value_t = Network::Local, env = "PAYMENT_BANK_NETWORK")]
    pub network: Network,

    /// Override the RPC URL of the selected network
    #[arg(long, env = "PAYMENT_BANK_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Bank contract address; defaults to the artifact's record for the chain
    #[arg(long, env = "PAYMENT_BANK_CONTRACT")]
    pub contract_address: Option<Address>,

    /// Hardhat or Truffle artifact with the contract interface
    #[arg(long, env = "PAYMENT_BANK_ARTIFACT")]
    pub artifact: Option<PathBuf>,

    /// Keystore wallet to unlock
    #[arg(long, env = "PAYMENT_BANK_WALLET", conflicts_with_all = ["key_file", "node_accounts"])]
    pub wallet: Option<String>,

    /// Keystore directory (defaults to ~/.ethereum/keystore)
    #[arg(long, requires = "wallet")]
    pub wallet_dir: Option<String>,

    /// File holding a hex private key
    #[arg(long, env = "PAYMENT_BANK_KEY_FILE", conflicts_with = "node_accounts")]
    pub key_file: Option<PathBuf>,

    /// Use the accounts managed by the RPC endpoint
    #[arg(long)]
    pub node_accounts: bool,

    /// Blocks to wait for before a transaction counts as confirmed
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub confirmations: u16,

    /// Directory for the rolling log file
    #[arg(long, default_value = "logs", env = "PAYMENT_BANK_LOG_DIR")]
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn rpc_url(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| self.network.default_rpc_url().to_string())
    }

    /// The selected wallet. Without a choice the client still starts, reporting this error on connect.
    pub fn wallet_source(&self) -> std::result::Result<WalletSource, BankError> {
        if let Some(name) = &self.wallet {
            let dir = wallet::resolve_wallet_dir(self.wallet_dir.as_deref())?;
            return Ok(WalletSource::Keystore {
                name: name.clone(),
                dir,
            });
        }
        if let Some(path) = &self.key_file {
            return Ok(WalletSource::KeyFile(path.clone()));
        }
        if self.node_accounts {
            return Ok(WalletSource::NodeAccounts);
        }
        Err(BankError::ProviderUnavailable(String::from(
            "choose a wallet with --wallet <name>, --key-file <path> or --node-accounts",
        )))
    }

    pub fn contract_artifact(&self) -> Result<ContractArtifact> {
        match &self.artifact {
            Some(path) => ContractArtifact::load(path),
            None => ContractArtifact::packaged(),
        }
    }

    pub fn connect_options(&self, source: WalletSource, artifact: ContractArtifact) -> ConnectOptions {
        ConnectOptions {
            rpc_url: self.rpc_url(),
            source,
            contract_address: self.contract_address,
            artifact,
            confirmations: usize::from(self.confirmations),
        }
    }
}
