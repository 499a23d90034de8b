//! The sync actor: owns the mirrored order state, takes [`Command`]s from
//! any number of [`SyncHandle`]s and publishes every state change on a watch
//! channel.
//!
//! Network work runs in spawned tasks reporting back to the actor. Each task
//! carries the [`GenerationToken`] of the context it started in and checks it
//! before every next step; the actor checks it again before applying the
//! result.
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use log::{debug, info, warn};
use shield_common::{
    eth,
    ports::{DecryptionOracle, EncryptionService, OrderStorePort},
    ChainError, ClearOrder, EncryptedOrder, Handle, HandleContractPair, ServiceError, TxReceipt,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    config::ClientConfig,
    context::{Generation, GenerationToken},
    deployments::Deployments,
    error::SyncError,
    oplog::LogKind,
    signature::{DecryptionSignature, SignatureError},
    state::{DecryptedOrder, FhevmStatus, SyncState},
    storage::StringStorage,
};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// The collaborators the sync layer talks to.
pub struct Services<S, E, D> {
    pub store: Arc<S>,
    pub encryptor: Arc<E>,
    pub oracle: Arc<D>,
    /// Decryption-signature cache.
    pub storage: Arc<dyn StringStorage>,
}

impl<S, E, D> Clone for Services<S, E, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            encryptor: self.encryptor.clone(),
            oracle: self.oracle.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<S, E, D> Services<S, E, D> {
    pub fn new<K: StringStorage + 'static>(store: S, encryptor: E, oracle: D, storage: K) -> Self {
        Self {
            store: Arc::new(store),
            encryptor: Arc::new(encryptor),
            oracle: Arc::new(oracle),
            storage: Arc::new(storage),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn StringStorage>) -> Self {
        self.storage = storage;
        self
    }
}

#[derive(Debug)]
pub enum Command {
    /// Switch the active chain and signer. Bumps the generation, resets the
    /// mirrored order and reads it again.
    SetContext {
        chain_id: Option<u64>,
        signer: Option<PrivateKeySigner>,
    },
    SetFhevmStatus(FhevmStatus),
    Refresh,
    /// Amounts are taken as entered and checked to fit in 32 bits.
    Submit {
        from: i64,
        to: i64,
    },
    Decrypt,
    ClearLog,
    /// Answered once every command sent before it has been handled.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

enum TaskEvent {
    Status {
        token: GenerationToken,
        message: String,
    },
    Refreshed {
        token: GenerationToken,
        result: Result<EncryptedOrder, SyncError>,
    },
    Submitted {
        token: GenerationToken,
        chain_id: u64,
        result: Result<(EncryptedOrder, TxReceipt), SyncError>,
    },
    Decrypted {
        token: GenerationToken,
        result: Result<DecryptedOrder, SyncError>,
    },
}

#[derive(Clone, Debug, Default)]
struct ActiveContext {
    chain_id: Option<u64>,
    signer: Option<PrivateKeySigner>,
    contract: Option<Address>,
}

impl ActiveContext {
    fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }
}

struct SyncActor<S, E, D> {
    services: Services<S, E, D>,
    deployments: Deployments,
    decryption_duration_days: u64,
    generation: Generation,
    context: ActiveContext,
    state: SyncState,
    /// A refresh was requested while a stale one was still in flight.
    refresh_after: bool,
    state_tx: watch::Sender<SyncState>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
}

impl<S, E, D> SyncActor<S, E, D>
where
    S: OrderStorePort + 'static,
    E: EncryptionService + 'static,
    D: DecryptionOracle + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<TaskEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
            self.publish();
        }
        info!("sync actor stopped");
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|published| {
            if *published == self.state {
                false
            } else {
                *published = self.state.clone();
                true
            }
        });
    }

    fn set_message<M: Into<String>>(&mut self, message: M, submitted: Option<&EncryptedOrder>) {
        let message = message.into();
        debug!("status: {message}");
        self.state.log.record_status(&message, submitted);
        self.state.message = message;
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetContext { chain_id, signer } => self.set_context(chain_id, signer),
            Command::SetFhevmStatus(status) => self.state.fhevm_status = status,
            Command::Refresh => self.refresh(),
            Command::Submit { from, to } => self.submit(from, to),
            Command::Decrypt => self.decrypt(),
            Command::ClearLog => self.state.log.clear(),
            Command::Flush(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Status { token, message } => {
                if token.is_current() {
                    self.set_message(message, None);
                }
            }
            TaskEvent::Refreshed { token, result } => self.on_refreshed(token, result),
            TaskEvent::Submitted {
                token,
                chain_id,
                result,
            } => self.on_submitted(token, chain_id, result),
            TaskEvent::Decrypted { token, result } => self.on_decrypted(token, result),
        }
    }

    fn set_context(&mut self, chain_id: Option<u64>, signer: Option<PrivateKeySigner>) {
        let account = signer.as_ref().map(|signer| signer.address());
        if chain_id == self.context.chain_id && account == self.context.account() {
            return;
        }
        let generation = self.generation.bump();
        let deployment = chain_id
            .and_then(|id| self.deployments.resolve(id))
            .cloned();
        info!(
            "context {generation}: chain {chain_id:?}, account {account:?}, contract {:?}",
            deployment.as_ref().map(|d| d.address)
        );

        self.context = ActiveContext {
            chain_id,
            signer,
            contract: deployment.as_ref().map(|d| d.address),
        };
        self.state.chain_id = chain_id;
        self.state.chain_name = deployment.map(|d| d.chain_name).or_else(|| {
            chain_id
                .and_then(eth::chain_name)
                .map(str::to_string)
        });
        self.state.account = account;
        self.state.contract = self.context.contract;
        self.state.handles = None;
        self.state.decrypted = None;
        self.state.last_receipt = None;

        if let (Some(id), None) = (chain_id, self.context.contract) {
            self.set_message(SyncError::NotDeployed(id).to_string(), None);
        }
        self.refresh_soon();
    }

    /// Refresh now, or right after the refresh currently in flight.
    fn refresh_soon(&mut self) {
        if self.state.is_refreshing {
            self.refresh_after = true;
        } else {
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        if self.state.is_refreshing {
            return;
        }
        let (Some(contract), Some(caller)) = (self.context.contract, self.context.account()) else {
            self.state.handles = None;
            return;
        };

        self.state.is_refreshing = true;
        let token = self.generation.token();
        let store = self.services.store.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = store
                .get_my_order(contract, caller)
                .await
                .map_err(SyncError::from);
            let _ = events.send(TaskEvent::Refreshed { token, result });
        });
    }

    fn on_refreshed(&mut self, token: GenerationToken, result: Result<EncryptedOrder, SyncError>) {
        self.state.is_refreshing = false;
        if token.is_current() {
            match result {
                Ok(order) => self.state.handles = Some(order),
                Err(e) => {
                    warn!("getMyOrder failed: {e}");
                    self.set_message(format!("ShieldSwap.getMyOrder() failed: {e}"), None);
                }
            }
        } else {
            debug!("discarding getMyOrder result of a previous context");
        }
        if std::mem::take(&mut self.refresh_after) {
            self.refresh();
        }
    }

    fn submit(&mut self, from: i64, to: i64) {
        if self.state.is_refreshing || self.state.is_submitting {
            debug!("dropping submission, another operation is in flight");
            return;
        }
        let (Some(contract), Some(signer), Some(chain_id)) = (
            self.context.contract,
            self.context.signer.clone(),
            self.context.chain_id,
        ) else {
            return;
        };
        if !self.state.fhevm_status.is_ready() {
            return;
        }

        self.state.log.add(
            LogKind::OfferCreate,
            "Submit Encrypted Order",
            Some(format!("from={from}, to={to}")),
        );
        let (Ok(from), Ok(to)) = (u32::try_from(from), u32::try_from(to)) else {
            self.set_message("Values must fit in uint32", None);
            return;
        };

        self.state.is_submitting = true;
        self.set_message("Encrypting and submitting order...", None);

        let token = self.generation.token();
        let services = self.services.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result =
                submit_order(&services, contract, &signer, from, to, &token, &events).await;
            let _ = events.send(TaskEvent::Submitted {
                token,
                chain_id,
                result,
            });
        });
    }

    fn on_submitted(
        &mut self,
        token: GenerationToken,
        chain_id: u64,
        result: Result<(EncryptedOrder, TxReceipt), SyncError>,
    ) {
        self.state.is_submitting = false;
        if !token.is_current() {
            debug!("discarding setOrder outcome of a previous context");
            self.set_message("Ignore setOrder", None);
            return;
        }
        match result {
            Ok((order, receipt)) => {
                info!(
                    "setOrder {} mined in block {}",
                    receipt.tx_hash, receipt.block_number
                );
                self.state.last_receipt = Some(receipt);
                self.set_message("setOrder completed", Some(&order));
                self.refresh_soon();
            }
            Err(SyncError::Stale) => self.set_message("Ignore setOrder", None),
            Err(e) if e.is_transport() => {
                warn!("setOrder transport failure: {e}");
                let chain = eth::chain_name(chain_id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("chain {chain_id}"));
                self.set_message(
                    format!("setOrder failed: Wallet RPC unreachable. Please switch {chain} RPC."),
                    None,
                );
            }
            Err(e) => {
                warn!("setOrder failed: {e}");
                self.set_message(format!("setOrder failed: {e}"), None);
            }
        }
    }

    fn decrypt(&mut self) {
        if self.state.is_refreshing || self.state.is_decrypting {
            debug!("dropping decryption, another operation is in flight");
            return;
        }
        let (Some(contract), Some(signer)) = (self.context.contract, self.context.signer.clone())
        else {
            return;
        };
        if !self.state.fhevm_status.is_ready() {
            return;
        }
        let Some(handles) = self.state.handles.filter(EncryptedOrder::is_complete) else {
            return;
        };

        self.state.is_decrypting = true;
        self.set_message("Start decrypting order...", None);

        let token = self.generation.token();
        let services = self.services.clone();
        let events = self.events_tx.clone();
        let duration_days = self.decryption_duration_days;
        tokio::spawn(async move {
            let result =
                decrypt_order(&services, contract, &signer, handles, duration_days, &token).await;
            let _ = events.send(TaskEvent::Decrypted { token, result });
        });
    }

    fn on_decrypted(&mut self, token: GenerationToken, result: Result<DecryptedOrder, SyncError>) {
        self.state.is_decrypting = false;
        if !token.is_current() {
            debug!("discarding decryption outcome of a previous context");
            self.set_message("Ignore FHEVM decryption", None);
            return;
        }
        match result {
            Ok(decrypted) => {
                self.state.decrypted = Some(decrypted);
                self.set_message(format!("Order decrypted: {}", decrypted.clear), None);
            }
            Err(SyncError::Stale) => self.set_message("Ignore FHEVM decryption", None),
            Err(SyncError::Signature(e)) => {
                warn!("decryption signature: {e}");
                self.set_message("Unable to build FHEVM decryption signature", None);
            }
            Err(e) => {
                warn!("userDecrypt failed: {e}");
                self.set_message(format!("FHEVM decryption failed: {e}"), None);
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn submit_order<S, E, D>(
    services: &Services<S, E, D>,
    contract: Address,
    signer: &PrivateKeySigner,
    from: u32,
    to: u32,
    token: &GenerationToken,
    events: &mpsc::UnboundedSender<TaskEvent>,
) -> Result<(EncryptedOrder, TxReceipt), SyncError>
where
    S: OrderStorePort,
    E: EncryptionService,
{
    let input = services
        .encryptor
        .create_encrypted_input(contract, signer.address())
        .add32(from)
        .add32(to)
        .encrypt()
        .await?;
    token.check()?;

    let order = match input.handles.as_slice() {
        [from_handle, to_handle] => EncryptedOrder::new(*from_handle, *to_handle),
        handles => {
            return Err(ServiceError::internal(format!(
                "expected 2 handles, encryption returned {}",
                handles.len()
            ))
            .into())
        }
    };
    let tx_hash = services
        .store
        .send_set_order(contract, signer, order, input.input_proof)
        .await?;
    let _ = events.send(TaskEvent::Status {
        token: token.clone(),
        message: format!("Waiting tx {tx_hash}..."),
    });

    let receipt = services.store.wait_for_receipt(tx_hash).await?;
    token.check()?;
    if !receipt.status {
        return Err(ChainError::Reverted(format!("transaction {tx_hash} failed")).into());
    }
    Ok((order, receipt))
}

async fn decrypt_order<S, E, D>(
    services: &Services<S, E, D>,
    contract: Address,
    signer: &PrivateKeySigner,
    handles: EncryptedOrder,
    duration_days: u64,
    token: &GenerationToken,
) -> Result<DecryptedOrder, SyncError>
where
    D: DecryptionOracle + 'static,
{
    // The signature cache may sit on disk.
    let oracle = services.oracle.clone();
    let storage = services.storage.clone();
    let owner = signer.clone();
    let signature = tokio::task::spawn_blocking(move || {
        DecryptionSignature::load_or_sign(
            oracle.as_ref(),
            storage.as_ref(),
            &[contract],
            &owner,
            duration_days,
            unix_now(),
        )
    })
    .await
    .map_err(|e| SignatureError::Signing(format!("signing task failed: {e}")))??;
    token.check()?;

    let pairs = [handles.from_amount, handles.to_amount].map(|handle| HandleContractPair {
        handle,
        contract_address: contract,
    });
    let clear = services
        .oracle
        .user_decrypt(&pairs, &signature.to_request())
        .await?;
    token.check()?;

    let value = |handle: Handle| {
        clear
            .get(&handle)
            .and_then(|value| u32::try_from(*value).ok())
            .ok_or_else(|| ServiceError::internal(format!("no 32-bit clear value for {handle}")))
    };
    Ok(DecryptedOrder {
        handles,
        clear: ClearOrder {
            from: value(handles.from_amount)?,
            to: value(handles.to_amount)?,
        },
    })
}

/// Cloneable front of the sync actor.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SyncState>,
}

impl SyncHandle {
    /// Start the actor on the current tokio runtime.
    pub fn spawn<S, E, D>(
        services: Services<S, E, D>,
        deployments: Deployments,
        config: &ClientConfig,
    ) -> Self
    where
        S: OrderStorePort + 'static,
        E: EncryptionService + 'static,
        D: DecryptionOracle + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SyncState::default());

        let actor = SyncActor {
            services,
            deployments,
            decryption_duration_days: config.decryption_duration_days,
            generation: Generation::default(),
            context: ActiveContext::default(),
            state: SyncState::default(),
            refresh_after: false,
            state_tx,
            events_tx,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
        }
    }

    pub async fn send(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::Closed)
    }

    pub async fn set_context(
        &self,
        chain_id: Option<u64>,
        signer: Option<PrivateKeySigner>,
    ) -> Result<(), SyncError> {
        self.send(Command::SetContext { chain_id, signer }).await
    }

    pub async fn set_fhevm_status(&self, status: FhevmStatus) -> Result<(), SyncError> {
        self.send(Command::SetFhevmStatus(status)).await
    }

    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.send(Command::Refresh).await
    }

    pub async fn submit_order(&self, from: i64, to: i64) -> Result<(), SyncError> {
        self.send(Command::Submit { from, to }).await
    }

    pub async fn decrypt_order(&self) -> Result<(), SyncError> {
        self.send(Command::Decrypt).await
    }

    pub async fn clear_log(&self) -> Result<(), SyncError> {
        self.send(Command::ClearLog).await
    }

    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.send(Command::Shutdown).await
    }

    /// Wait until every command sent so far has been handled.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Flush(done_tx)).await?;
        done_rx.await.map_err(|_| SyncError::Closed)
    }

    /// Wait until the commands sent so far and the work they started are
    /// done, and return the resulting state.
    pub async fn wait_idle(&self) -> Result<SyncState, SyncError> {
        self.flush().await?;
        let mut state = self.state.clone();
        let idle = state
            .wait_for(|state| !state.is_busy())
            .await
            .map_err(|_| SyncError::Closed)?;
        Ok(idle.clone())
    }

    /// Latest published state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }
}
