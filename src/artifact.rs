use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    abi::Abi,
    types::Address,
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::Path,
    str::FromStr,
};

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x8FAF7EFD8752497253603a4D24C6b85E0066DB97";
const PACKAGED_ARTIFACT: &str = include_str!("../contracts/Payment.json");

pub const BALANCE_METHOD: &str = "getCustomerBalance";
pub const FRIEND_LIST_METHOD: &str = "getCustomerFriendList";
pub const DEPOSIT_METHOD: &str = "depositMoney";
pub const WITHDRAW_METHOD: &str = "withDrawMoney";
pub const ADD_FRIEND_METHOD: &str = "addFriend";
pub const TRANSFER_METHOD: &str = "transferMoney";

const REQUIRED_METHODS: [&str; 6] = [
    BALANCE_METHOD,
    FRIEND_LIST_METHOD,
    DEPOSIT_METHOD,
    WITHDRAW_METHOD,
    ADD_FRIEND_METHOD,
    TRANSFER_METHOD,
];

#[derive(Clone, Debug, Deserialize)]
struct NetworkRecord {
    address: String,
}

/// A Hardhat or Truffle build artifact for the bank contract.
#[derive(Clone, Debug, Deserialize)]
pub struct ContractArtifact {
    #[serde(rename = "contractName", default)]
    pub contract_name: Option<String>,
    pub abi: Abi,
    #[serde(default)]
    networks: HashMap<String, NetworkRecord>,
}

impl ContractArtifact {
    pub fn packaged() -> Result<Self> {
        Self::parse(PACKAGED_ARTIFACT).wrap_err("Packaged Payment artifact is invalid")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).wrap_err_with(|| {
            format!("Failed to read contract artifact {}", path.display())
        })?;
        Self::parse(&data)
            .wrap_err_with(|| format!("Invalid contract artifact {}", path.display()))
    }

    pub fn parse(json: &str) -> Result<Self> {
        let artifact = serde_json::from_str::<ContractArtifact>(json)
            .wrap_err("Failed to parse contract artifact JSON")?;
        artifact.ensure_methods()?;
        Ok(artifact)
    }

    fn ensure_methods(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_METHODS
            .iter()
            .copied()
            .filter(|name| self.abi.function(name).is_err())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(eyre!("Contract interface is missing methods {:?}", missing))
        }
    }

    pub fn address_for_chain(&self, chain_id: u64) -> Result<Option<Address>> {
        self.networks
            .get(&chain_id.to_string())
            .map(|record| {
                Address::from_str(&record.address).wrap_err_with(|| {
                    format!(
                        "Artifact network {chain_id} has a malformed address {}",
                        record.address
                    )
                })
            })
            .transpose()
    }
}

/// Explicit override first, then the artifact's per-network record, then the built-in address.
pub fn resolve_contract_address(
    explicit: Option<Address>,
    artifact: &ContractArtifact,
    chain_id: u64,
) -> Result<Address> {
    if let Some(address) = explicit {
        return Ok(address);
    }
    if let Some(address) = artifact.address_for_chain(chain_id)? {
        return Ok(address);
    }
    Address::from_str(DEFAULT_CONTRACT_ADDRESS).wrap_err("Built-in contract address is invalid")
}
