use crate::{
    artifact::{
        self,
        ContractArtifact,
    },
    error::BankError,
    gateway::{
        AccountSource,
        BankCall,
        BankGateway,
        Confirmation,
        EthersBank,
        Friend,
    },
};
use eth_keystore::decrypt_key;
use ethers::{
    middleware::SignerMiddleware,
    providers::{
        Http,
        JsonRpcClient,
        Middleware,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        TxHash,
        U256,
    },
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::{
    info,
    warn,
};

pub type SignerClient<P = Http> = SignerMiddleware<Provider<P>, LocalWallet>;

const POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletSource {
    Keystore { name: String, dir: PathBuf },
    KeyFile(PathBuf),
    NodeAccounts,
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub rpc_url: String,
    pub source: WalletSource,
    pub contract_address: Option<Address>,
    pub artifact: ContractArtifact,
    pub confirmations: usize,
}

/// An opened wallet, bound to the bank contract.
pub enum Session<P: JsonRpcClient = Http> {
    Signer(EthersBank<SignerClient<P>>),
    Node(EthersBank<Provider<P>>),
}

pub fn default_wallet_dir() -> Result<PathBuf, BankError> {
    let home = std::env::var("HOME").map_err(|_| {
        BankError::ProviderUnavailable(String::from("HOME environment variable not set"))
    })?;
    Ok(PathBuf::from(home).join(".ethereum").join("keystore"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf, BankError> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, by file stem. Extensions `.json` and none are accepted.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>, BankError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let unreadable =
        |e: std::io::Error| BankError::ProviderUnavailable(format!("{}: {e}", dir.display()));
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            None | Some("json") => {}
            Some(_) => continue,
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        wallets.push(WalletDescriptor::new(name.to_owned(), path.clone()));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor, BankError> {
    let wallets = list_wallets(dir)?;
    wallets.into_iter().find(|w| w.name == name).ok_or_else(|| {
        BankError::ProviderUnavailable(format!(
            "wallet '{name}' not found in {}",
            dir.to_string_lossy()
        ))
    })
}

pub fn unlock_keystore(descriptor: &WalletDescriptor) -> Result<LocalWallet, BankError> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt)
        .map_err(|e| BankError::Rejected(format!("password prompt failed: {e}")))?;
    unlock_keystore_with(descriptor, &password)
}

pub fn unlock_keystore_with(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<LocalWallet, BankError> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes()).map_err(|_| {
        BankError::Rejected(format!("invalid password for wallet '{}'", descriptor.name))
    })?;
    LocalWallet::from_bytes(&secret).map_err(|e| {
        BankError::ProviderUnavailable(format!(
            "wallet '{}' contained unsupported key material: {e}",
            descriptor.name
        ))
    })
}

/// Reads a hex encoded private key, with or without a 0x prefix.
pub fn load_key_file(path: &Path) -> Result<LocalWallet, BankError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        BankError::ProviderUnavailable(format!("cannot read key file {}: {e}", path.display()))
    })?;
    let trimmed = raw.trim();
    let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_key)
        .map_err(|e| BankError::invalid("key file", format!("not hex: {e}")))?;
    LocalWallet::from_bytes(&bytes).map_err(|e| BankError::invalid("key file", e))
}

pub fn open_provider(rpc_url: &str) -> Result<Provider<Http>, BankError> {
    Provider::<Http>::try_from(rpc_url)
        .map(|provider| provider.interval(POLL_INTERVAL))
        .map_err(|e| BankError::ProviderUnavailable(format!("bad RPC URL {rpc_url}: {e}")))
}

/// Unlocks the local signer, if the source has one. May prompt for a password.
pub fn load_signer(source: &WalletSource) -> Result<Option<LocalWallet>, BankError> {
    match source {
        WalletSource::Keystore { name, dir } => {
            let descriptor = find_wallet(dir, name)?;
            unlock_keystore(&descriptor).map(Some)
        }
        WalletSource::KeyFile(path) => load_key_file(path).map(Some),
        WalletSource::NodeAccounts => Ok(None),
    }
}

/// Contacts the endpoint and binds the signer, or the endpoint's first account, to the bank contract.
pub async fn open_session<P: JsonRpcClient + 'static>(
    provider: Provider<P>,
    options: &ConnectOptions,
    signer: Option<LocalWallet>,
) -> Result<Session<P>, BankError> {
    let chain_id = provider
        .get_chainid()
        .await
        .map_err(BankError::from_provider)?
        .as_u64();
    let address = artifact::resolve_contract_address(
        options.contract_address,
        &options.artifact,
        chain_id,
    )
    .map_err(|e| BankError::Abi(e.to_string()))?;
    info!(chain_id, contract = ?address, "wallet endpoint reachable");

    let session = match signer {
        Some(wallet) => {
            let wallet = wallet.with_chain_id(chain_id);
            let account = wallet.address();
            let client = Arc::new(SignerMiddleware::new(provider, wallet));
            Session::Signer(EthersBank::new(
                client,
                address,
                &options.artifact,
                AccountSource::Signer(account),
                options.confirmations,
            ))
        }
        None => {
            let accounts: Vec<Address> = provider
                .request("eth_requestAccounts", ())
                .await
                .map_err(BankError::from_provider)?;
            let account = accounts.first().copied().ok_or_else(|| {
                BankError::ProviderUnavailable(String::from(
                    "the wallet endpoint returned no accounts",
                ))
            })?;
            let client = Arc::new(provider.with_sender(account));
            Session::Node(EthersBank::new(
                client,
                address,
                &options.artifact,
                AccountSource::Node(account),
                options.confirmations,
            ))
        }
    };
    Ok(session)
}

impl<P: JsonRpcClient + 'static> Session<P> {
    async fn connect(&self) -> Result<Address, BankError> {
        match self {
            Session::Signer(bank) => bank.connect().await,
            Session::Node(bank) => bank.connect().await,
        }
    }

    async fn balance(&self) -> Result<U256, BankError> {
        match self {
            Session::Signer(bank) => bank.balance().await,
            Session::Node(bank) => bank.balance().await,
        }
    }

    async fn friends(&self) -> Result<Vec<Friend>, BankError> {
        match self {
            Session::Signer(bank) => bank.friends().await,
            Session::Node(bank) => bank.friends().await,
        }
    }

    async fn submit(&self, call: &BankCall) -> Result<TxHash, BankError> {
        match self {
            Session::Signer(bank) => bank.submit(call).await,
            Session::Node(bank) => bank.submit(call).await,
        }
    }

    async fn confirm(&self, hash: TxHash) -> Result<Confirmation, BankError> {
        match self {
            Session::Signer(bank) => bank.confirm(hash).await,
            Session::Node(bank) => bank.confirm(hash).await,
        }
    }

    pub fn contract_address(&self) -> Address {
        match self {
            Session::Signer(bank) => bank.contract_address(),
            Session::Node(bank) => bank.contract_address(),
        }
    }
}

struct Opener<P> {
    provider: Provider<P>,
    options: ConnectOptions,
    signer: Option<LocalWallet>,
}

/// The configured wallet as a gateway. Until a session is open, every `connect` tries the endpoint again.
pub struct WalletBank<P: JsonRpcClient = Http> {
    opener: Option<Opener<P>>,
    session: RwLock<Option<Arc<Session<P>>>>,
    last_error: Mutex<BankError>,
}

impl WalletBank<Http> {
    /// Unlocks the signer now. The endpoint is first contacted on `connect`.
    pub fn open(options: ConnectOptions) -> Self {
        let opened = load_signer(&options.source)
            .and_then(|signer| Ok((open_provider(&options.rpc_url)?, signer)));
        match opened {
            Ok((provider, signer)) => Self::new(provider, options, signer),
            Err(reason) => {
                warn!(%reason, "wallet could not be opened");
                Self::unavailable(reason)
            }
        }
    }
}

impl<P: JsonRpcClient + Clone + 'static> WalletBank<P> {
    pub fn new(provider: Provider<P>, options: ConnectOptions, signer: Option<LocalWallet>) -> Self {
        Self {
            opener: Some(Opener {
                provider,
                options,
                signer,
            }),
            session: RwLock::new(None),
            last_error: Mutex::new(BankError::ProviderUnavailable(String::from(
                "wallet not connected",
            ))),
        }
    }

    /// A wallet that can never be opened; every call reports `reason`.
    pub fn unavailable(reason: BankError) -> Self {
        Self {
            opener: None,
            session: RwLock::new(None),
            last_error: Mutex::new(reason),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.session.read().await.is_some()
    }

    fn last_error(&self) -> BankError {
        self.last_error
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn remember(&self, error: &BankError) {
        let mut last = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        *last = error.clone();
    }

    async fn session(&self) -> Result<Arc<Session<P>>, BankError> {
        let current = self.session.read().await.clone();
        current.ok_or_else(|| self.last_error())
    }

    async fn reopen(&self) -> Result<Arc<Session<P>>, BankError> {
        let Some(opener) = &self.opener else {
            return Err(self.last_error());
        };
        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let opened = open_session(
            opener.provider.clone(),
            &opener.options,
            opener.signer.clone(),
        )
        .await;
        match opened {
            Ok(session) => {
                info!(contract = ?session.contract_address(), "wallet session opened");
                let session = Arc::new(session);
                *slot = Some(session.clone());
                Ok(session)
            }
            Err(error) => {
                warn!(%error, "wallet endpoint not reachable");
                self.remember(&error);
                Err(error)
            }
        }
    }
}

impl<P: JsonRpcClient + Clone + 'static> BankGateway for WalletBank<P> {
    async fn connect(&self) -> Result<Address, BankError> {
        let session = match self.session().await {
            Ok(session) => session,
            Err(_) => self.reopen().await?,
        };
        session.connect().await
    }

    async fn balance(&self) -> Result<U256, BankError> {
        self.session().await?.balance().await
    }

    async fn friends(&self) -> Result<Vec<Friend>, BankError> {
        self.session().await?.friends().await
    }

    async fn submit(&self, call: &BankCall) -> Result<TxHash, BankError> {
        self.session().await?.submit(call).await
    }

    async fn confirm(&self, hash: TxHash) -> Result<Confirmation, BankError> {
        self.session().await?.confirm(hash).await
    }
}
