use crate::{
    config::AppConfig,
    error::BankError,
    gateway::{
        BankCall,
        BankGateway,
    },
    state::{
        self,
        Action,
        ActionId,
        ActionKind,
        FormField,
        Ticket,
        ViewState,
    },
    ui,
    units,
    wallet::WalletBank,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::event::{
    Event,
    EventStream,
    KeyEventKind,
};
use futures::StreamExt;
use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing::{
    error,
    info,
    warn,
};

#[derive(Debug)]
pub enum WorkerEvent {
    Update(Action),
    Done,
}

/// Which reads follow a confirmed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Refresh {
    Balance,
    Friends,
}

impl Refresh {
    fn after(kind: ActionKind) -> Self {
        match kind {
            ActionKind::AddFriend => Refresh::Friends,
            ActionKind::Deposit | ActionKind::Withdraw | ActionKind::Transfer => {
                Refresh::Balance
            }
        }
    }
}

struct Worker<G> {
    gateway: Arc<G>,
    tickets: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl<G> Clone for Worker<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            tickets: self.tickets.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<G: BankGateway> Worker<G> {
    fn emit(&self, action: Action) {
        // the receiver only goes away when the controller is dropped
        let _ = self.tx.send(WorkerEvent::Update(action));
    }

    fn finish(&self) {
        let _ = self.tx.send(WorkerEvent::Done);
    }

    fn ticket(&self) -> Ticket {
        self.tickets.fetch_add(1, Ordering::SeqCst)
    }

    async fn load_balance(&self) -> Result<(), BankError> {
        let ticket = self.ticket();
        let amount = self.gateway.balance().await?;
        self.emit(Action::BalanceLoaded { ticket, amount });
        Ok(())
    }

    async fn load_friends(&self) -> Result<(), BankError> {
        let ticket = self.ticket();
        let friends = self.gateway.friends().await?;
        self.emit(Action::FriendsLoaded { ticket, friends });
        Ok(())
    }

    async fn refresh(&self, refresh: Refresh) -> Result<(), BankError> {
        match refresh {
            Refresh::Balance => self.load_balance().await,
            Refresh::Friends => self.load_friends().await,
        }
    }

    async fn connect_and_load(&self) {
        self.emit(Action::Connecting);
        let outcome = async {
            let account = self.gateway.connect().await?;
            info!(account = ?account, "account connected");
            self.emit(Action::Connected(account));
            self.load_balance().await?;
            self.load_friends().await
        }
        .await;
        if let Err(error) = outcome {
            warn!(%error, "connect sequence failed");
            self.emit(Action::Failed { id: None, error });
        }
        self.finish();
    }

    async fn read(&self, refresh: Refresh) {
        if let Err(error) = self.refresh(refresh).await {
            warn!(%error, ?refresh, "refresh failed");
            self.emit(Action::Failed { id: None, error });
        }
        self.finish();
    }

    async fn write(&self, id: ActionId, kind: ActionKind, call: BankCall) {
        let outcome = async {
            let hash = self.gateway.submit(&call).await?;
            self.emit(Action::TxSubmitted { id, hash });
            self.gateway.confirm(hash).await?;
            self.emit(Action::TxConfirmed { id });
            self.refresh(Refresh::after(kind)).await
        }
        .await;
        match outcome {
            Ok(()) => self.emit(Action::TxFinished { id }),
            Err(error) => {
                error!(%error, %kind, id, "action failed");
                self.emit(Action::Failed {
                    id: Some(id),
                    error,
                });
            }
        }
        self.finish();
    }
}

pub struct AppController<G> {
    worker: Worker<G>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    state: ViewState,
    next_action: ActionId,
    running: usize,
}

impl<G: BankGateway> AppController<G> {
    pub fn new(gateway: G) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            worker: Worker {
                gateway: Arc::new(gateway),
                tickets: Arc::new(AtomicU64::new(1)),
                tx,
            },
            events,
            state: ViewState::default(),
            next_action: 1,
            running: 0,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn gateway(&self) -> &G {
        &self.worker.gateway
    }

    /// Number of spawned reads and writes that have not reported back yet.
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn apply(&mut self, action: Action) {
        state::reduce(&mut self.state, action);
    }

    pub fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Update(action) => self.apply(action),
            WorkerEvent::Done => self.running = self.running.saturating_sub(1),
        }
    }

    pub async fn next_worker_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Applies worker events until every spawned task has reported back.
    pub async fn settle(&mut self) {
        while self.running > 0 {
            match self.events.recv().await {
                Some(event) => self.handle(event),
                None => break,
            }
        }
    }

    fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(Worker<G>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.running += 1;
        tokio::spawn(task(self.worker.clone()));
    }

    /// Connect, then load the balance, then the friend list.
    pub fn connect(&mut self) {
        self.spawn(|worker| async move { worker.connect_and_load().await });
    }

    pub fn refresh_balance(&mut self) {
        self.spawn(|worker| async move { worker.read(Refresh::Balance).await });
    }

    pub fn refresh_friends(&mut self) {
        self.spawn(|worker| async move { worker.read(Refresh::Friends).await });
    }

    pub fn refresh_all(&mut self) {
        self.refresh_balance();
        self.refresh_friends();
    }

    pub fn set_input(&mut self, field: FormField, value: impl Into<String>) {
        self.apply(Action::InputChanged {
            field,
            value: value.into(),
        });
    }

    pub fn dismiss_error(&mut self) {
        self.apply(Action::DismissError);
    }

    pub fn deposit(&mut self) -> Option<ActionId> {
        self.submit(ActionKind::Deposit)
    }

    pub fn withdraw(&mut self) -> Option<ActionId> {
        self.submit(ActionKind::Withdraw)
    }

    pub fn add_friend(&mut self) -> Option<ActionId> {
        self.submit(ActionKind::AddFriend)
    }

    pub fn transfer(&mut self) -> Option<ActionId> {
        self.submit(ActionKind::Transfer)
    }

    /// Validates the form for `kind` and starts the write. Nothing is sent when validation fails.
    pub fn submit(&mut self, kind: ActionKind) -> Option<ActionId> {
        let call = match self.prepare(kind) {
            Ok(call) => call,
            Err(error) => {
                warn!(%error, %kind, "action not submitted");
                self.apply(Action::Failed { id: None, error });
                return None;
            }
        };
        let id = self.next_action;
        self.next_action += 1;
        info!(%kind, id, ?call, "submitting action");
        self.apply(Action::TxStarted { id, kind });
        self.spawn(move |worker| async move { worker.write(id, kind, call).await });
        Some(id)
    }

    fn prepare(&self, kind: ActionKind) -> Result<BankCall, BankError> {
        let inputs = &self.state.inputs;
        let amount = |field: FormField| {
            units::parse_ether(inputs.get(field))
                .map_err(|e| BankError::invalid(field.label(), e))
        };
        match kind {
            ActionKind::Deposit => Ok(BankCall::Deposit {
                amount: amount(FormField::Deposit)?,
            }),
            ActionKind::Withdraw => {
                let to = self.state.account.ok_or_else(|| {
                    BankError::ProviderUnavailable(String::from("wallet not connected"))
                })?;
                Ok(BankCall::Withdraw {
                    to,
                    amount: amount(FormField::Withdraw)?,
                })
            }
            ActionKind::AddFriend => {
                let name_field = FormField::NewFriendName;
                let address_field = FormField::NewFriendAddress;
                let name = units::encode_name(inputs.get(name_field))
                    .map_err(|e| BankError::invalid(name_field.label(), e))?;
                let account = units::parse_address(inputs.get(address_field))
                    .map_err(|e| BankError::invalid(address_field.label(), e))?;
                Ok(BankCall::AddFriend { name, account })
            }
            ActionKind::Transfer => {
                let friend = self
                    .state
                    .selected_friend
                    .as_ref()
                    .ok_or_else(|| BankError::invalid("friend", "select a friend first"))?;
                Ok(BankCall::Transfer {
                    to: friend.wallet_address,
                    amount: amount(FormField::TransferAmount)?,
                })
            }
        }
    }
}

pub const LOG_FILE_PREFIX: &str = "payment-bank.log";

/// Logs go to a daily rolling file since the terminal belongs to the UI.
pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("cannot create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!(e))?;
    Ok(guard)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let artifact = config.contract_artifact()?;
    let bank = match config.wallet_source() {
        Ok(source) => WalletBank::open(config.connect_options(source, artifact)),
        Err(reason) => {
            warn!(%reason, "no wallet source configured");
            WalletBank::unavailable(reason)
        }
    };
    run_with(bank).await
}

async fn run_with<G: BankGateway>(gateway: G) -> Result<()> {
    let mut controller = AppController::new(gateway);
    controller.connect();
    let mut ui_state = ui::UiState::default();
    let mut input_events = EventStream::new();

    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(&mut controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<G: BankGateway>(
    controller: &mut AppController<G>,
    ui_state: &mut ui::UiState,
    input_events: &mut EventStream,
) -> Result<()> {
    loop {
        ui::draw(ui_state, controller.state()).wrap_err("draw failed")?;
        tokio::select! {
            input = input_events.next() => {
                let Some(input) = input else {
                    break;
                };
                let Event::Key(key) = input.wrap_err("terminal input failed")? else {
                    continue;
                };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let Some(event) = ui::handle_key(ui_state, controller.state(), key) else {
                    continue;
                };
                match event {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Connect => controller.connect(),
                    ui::UserEvent::Refresh => controller.refresh_all(),
                    ui::UserEvent::DismissError => controller.dismiss_error(),
                    ui::UserEvent::Input { field, value } => controller.set_input(field, value),
                    ui::UserEvent::ToggleFriend(friend) => {
                        controller.apply(Action::FriendSelected(friend))
                    }
                    ui::UserEvent::Submit(kind) => {
                        controller.submit(kind);
                    }
                }
            }
            Some(event) = controller.next_worker_event() => controller.handle(event),
        }
    }
    if controller.running() > 0 {
        warn!(running = controller.running(), "exiting with requests still in flight");
    }
    Ok(())
}
