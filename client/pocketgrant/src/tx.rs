//! Write hooks: one mutating call and its lifecycle.
//!
//! ```text
//! Idle ─trigger─▶ WalletPending ─hash─▶ ChainPending ─receipt ok─▶ Confirmed
//!                      │                     │
//!                      └──────▶ Failed ◀─────┘  (rejected / reverted / timeout)
//!
//! Confirmed | Failed ─reset─▶ Idle
//! ```
//!
//! The submission runs on its own task, so it completes even if the caller
//! stops listening. A task that dies mid-flight still leaves the hook in
//! `Failed`. Each hook owns one notification key; every transition
//! replaces the notification under that key.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::chain::Wallet;
use crate::classify::ErrorClass;
use crate::context::{AppContext, Locale};
use crate::errors::{ClientError, Result};
use crate::notify::{NotificationKind, NotificationRegistry};
use crate::types::{Address, Receipt, TxHash, WriteCall};

// ─────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Idle,
    WalletPending,
    ChainPending { hash: TxHash },
    Confirmed { hash: TxHash, receipt: Receipt },
    Failed { error: String, class: ErrorClass },
}

impl TxStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WalletPending => "wallet_pending",
            Self::ChainPending { .. } => "chain_pending",
            Self::Confirmed { .. } => "confirmed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed { .. })
    }

    pub fn hash(&self) -> Option<&TxHash> {
        match self {
            Self::ChainPending { hash } | Self::Confirmed { hash, .. } => Some(hash),
            _ => None,
        }
    }

    /// The only transitions a write hook may take.
    pub fn can_transition_to(&self, next: &TxStatus) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::WalletPending)
                | (Self::WalletPending, Self::ChainPending { .. })
                | (Self::WalletPending, Self::Failed { .. })
                | (Self::ChainPending { .. }, Self::Confirmed { .. })
                | (Self::ChainPending { .. }, Self::Failed { .. })
                | (Self::Confirmed { .. }, Self::Idle)
                | (Self::Failed { .. }, Self::Idle)
        )
    }
}

// ─────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Claim,
    Gift,
    Request,
    Create,
    Approve,
    TopUp,
    Pause,
    Resume,
    End,
    Verify,
}

impl Operation {
    /// In declaration order.
    pub const ALL: [Operation; 10] = [
        Self::Claim,
        Self::Gift,
        Self::Request,
        Self::Create,
        Self::Approve,
        Self::TopUp,
        Self::Pause,
        Self::Resume,
        Self::End,
        Self::Verify,
    ];

    /// Notification key owned by this operation.
    pub fn key(self) -> &'static str {
        match self {
            Self::Claim => "claim-tx",
            Self::Gift => "gift-tx",
            Self::Request => "request-tx",
            Self::Create => "create-tx",
            Self::Approve => "approve-tx",
            Self::TopUp => "topup-tx",
            Self::Pause => "pause-tx",
            Self::Resume => "resume-tx",
            Self::End => "end-tx",
            Self::Verify => "verify-tx",
        }
    }

    pub fn pending_message(self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => "Waiting for wallet confirmation...",
            Locale::Id => "Menunggu konfirmasi wallet...",
        }
    }

    pub fn confirming_message(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::Gift, Locale::En) => "Verifying gift code...",
            (Self::Gift, Locale::Id) => "Memverifikasi kode hadiah...",
            (Self::Request, Locale::En) => "Submitting request...",
            (Self::Request, Locale::Id) => "Mengajukan permohonan...",
            (Self::Create, Locale::En) => "Creating program...",
            (Self::Create, Locale::Id) => "Membuat program...",
            (Self::Pause, Locale::En) => "Pausing program...",
            (Self::Pause, Locale::Id) => "Menjeda program...",
            (Self::Resume, Locale::En) => "Resuming program...",
            (Self::Resume, Locale::Id) => "Melanjutkan program...",
            (Self::End, Locale::En) => "Ending program...",
            (Self::End, Locale::Id) => "Mengakhiri program...",
            (Self::Verify, Locale::En) => "Verifying beneficiary...",
            (Self::Verify, Locale::Id) => "Memverifikasi pengguna...",
            (_, Locale::En) => "Confirming transaction...",
            (_, Locale::Id) => "Mengkonfirmasi transaksi...",
        }
    }

    pub fn success_message(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::Claim, Locale::En) => "Claim successful! Funds are in your wallet.",
            (Self::Claim, Locale::Id) => "Klaim berhasil! Dana sudah masuk ke wallet-mu.",
            (Self::Gift, Locale::En) => "Gift Card claimed!",
            (Self::Gift, Locale::Id) => "Gift Card berhasil diklaim!",
            (Self::Request, Locale::En) => "Request submitted!",
            (Self::Request, Locale::Id) => "Permohonan berhasil diajukan!",
            (Self::Create, Locale::En) => "Program created!",
            (Self::Create, Locale::Id) => "Program berhasil dibuat!",
            (Self::Approve, Locale::En) => "IDRX approved",
            (Self::Approve, Locale::Id) => "IDRX berhasil di-approve",
            (Self::TopUp, Locale::En) => "Program topped up",
            (Self::TopUp, Locale::Id) => "Dana program ditambahkan",
            (Self::Pause, Locale::En) => "Program paused",
            (Self::Pause, Locale::Id) => "Program dijeda",
            (Self::Resume, Locale::En) => "Program resumed",
            (Self::Resume, Locale::Id) => "Program dilanjutkan",
            (Self::End, Locale::En) => "Program ended",
            (Self::End, Locale::Id) => "Program diakhiri",
            (Self::Verify, Locale::En) => "Beneficiary verified",
            (Self::Verify, Locale::Id) => "Pengguna terverifikasi",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Hook
// ─────────────────────────────────────────────────────────

struct Shared {
    op: Operation,
    status: watch::Sender<TxStatus>,
    /// States observed since the last reset, starting with `idle`.
    history: Mutex<Vec<&'static str>>,
    notifications: Arc<NotificationRegistry>,
    locale: Locale,
    poll_interval: Duration,
    timeout: Duration,
}

impl Shared {
    fn advance(&self, next: TxStatus) -> Result<()> {
        let mut rejected = None;
        self.status.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                self.history
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(next.name());
                *current = next;
                true
            } else {
                rejected = Some((current.name(), next.name()));
                false
            }
        });
        match rejected {
            Some((from, to)) => Err(ClientError::InvalidTransition { from, to }),
            None => Ok(()),
        }
    }

    fn notify(&self, kind: NotificationKind, message: &str) {
        self.notifications.show(self.op.key(), kind, message);
    }

    fn current(&self) -> TxStatus {
        self.status.borrow().clone()
    }

    fn fail(&self, error: String) -> TxStatus {
        let class = ErrorClass::classify(&error);
        warn!(op = self.op.key(), %error, ?class, "transaction failed");
        self.notify(NotificationKind::Error, class.message(self.locale));
        let failed = TxStatus::Failed { error, class };
        match self.advance(failed.clone()) {
            Ok(()) => failed,
            Err(e) => {
                warn!(op = self.op.key(), "dropping failure: {e}");
                self.current()
            }
        }
    }
}

/// One triggered submission. Resolves to the terminal status of this
/// submission even if the hook has since been reset and triggered again.
pub struct Submission {
    done: oneshot::Receiver<TxStatus>,
}

impl Submission {
    pub async fn settled(self) -> Result<TxStatus> {
        self.done.await.map_err(|_| ClientError::Cancelled)
    }
}

pub struct WriteHook<S> {
    shared: Arc<Shared>,
    sender: Arc<S>,
}

impl<S: Wallet> WriteHook<S> {
    pub fn new(op: Operation, sender: Arc<S>, ctx: &AppContext) -> Self {
        let (status, _) = watch::channel(TxStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                op,
                status,
                history: Mutex::new(vec![TxStatus::Idle.name()]),
                notifications: ctx.notifications.clone(),
                locale: ctx.locale,
                poll_interval: ctx.config.receipt_poll_interval,
                timeout: ctx.config.confirmation_timeout,
            }),
            sender,
        }
    }

    pub fn operation(&self) -> Operation {
        self.shared.op
    }

    pub fn status(&self) -> TxStatus {
        self.shared.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<TxStatus> {
        self.shared.status.subscribe()
    }

    pub fn history(&self) -> Vec<&'static str> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Submit `call` from `from`. Only accepted while idle.
    pub fn trigger(&self, from: Address, call: WriteCall) -> Result<Submission> {
        self.shared
            .advance(TxStatus::WalletPending)
            .map_err(|_| ClientError::TxBusy)?;
        let shared = self.shared.clone();
        shared.notify(NotificationKind::Loading, shared.op.pending_message(shared.locale));
        info!(op = shared.op.key(), to = %call.to, sponsored = call.capabilities.is_some(), "write triggered");

        let lifecycle = tokio::spawn(run_lifecycle(shared.clone(), self.sender.clone(), from, call));
        let (done_tx, done) = oneshot::channel();
        tokio::spawn(async move {
            let status = match lifecycle.await {
                Ok(status) => status,
                Err(e) => shared.fail(format!("write task aborted: {e}")),
            };
            let _ = done_tx.send(status);
        });
        Ok(Submission { done })
    }

    /// Wait until the current submission settles.
    pub async fn wait_terminal(&self) -> Result<TxStatus> {
        let mut rx = self.subscribe();
        let status = rx
            .wait_for(TxStatus::is_terminal)
            .await
            .map_err(|_| ClientError::Cancelled)?;
        Ok(status.clone())
    }

    /// Return to `Idle` after a terminal state so the caller can retry.
    pub fn reset(&self) -> Result<()> {
        self.shared.advance(TxStatus::Idle)?;
        *self.shared.history.lock().unwrap_or_else(|e| e.into_inner()) =
            vec![TxStatus::Idle.name()];
        Ok(())
    }
}

/// Drive one submission to a terminal state and return it.
async fn run_lifecycle<S: Wallet>(
    shared: Arc<Shared>,
    sender: Arc<S>,
    from: Address,
    call: WriteCall,
) -> TxStatus {
    let hash = match sender.send(from, call).await {
        Ok(hash) => hash,
        Err(e) => return shared.fail(e.to_string()),
    };
    info!(op = shared.op.key(), %hash, "submitted");
    if let Err(e) = shared.advance(TxStatus::ChainPending { hash: hash.clone() }) {
        warn!(op = shared.op.key(), "lifecycle out of order: {e}");
        return shared.current();
    }
    shared.notify(NotificationKind::Loading, shared.op.confirming_message(shared.locale));

    match wait_for_receipt(sender.as_ref(), &hash, shared.poll_interval, shared.timeout).await {
        Ok(receipt) if receipt.success => {
            info!(op = shared.op.key(), %hash, block = receipt.block_number, "confirmed");
            shared.notify(NotificationKind::Success, shared.op.success_message(shared.locale));
            let confirmed = TxStatus::Confirmed { hash, receipt };
            match shared.advance(confirmed.clone()) {
                Ok(()) => confirmed,
                Err(e) => {
                    warn!(op = shared.op.key(), "lifecycle out of order: {e}");
                    shared.current()
                }
            }
        }
        Ok(_) => shared.fail(ClientError::Reverted(hash.0).to_string()),
        Err(e) => shared.fail(e.to_string()),
    }
}

/// Poll for a receipt until one arrives or `timeout` elapses.
pub async fn wait_for_receipt<S: Wallet>(
    sender: &S,
    hash: &TxHash,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Receipt> {
    let poll = async {
        loop {
            match sender.receipt(hash.clone()).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => warn!(%hash, "receipt poll failed: {e}"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| ClientError::Timeout(hash.0.clone()))
}
