//! Page controllers.
//!
//! Each controller is a small state machine over [`Step`]. It captures a
//! fresh [`GuardSnapshot`] right before every write, submits through the
//! shared write hook for its operation, and re-reads whatever the write
//! changed once the transaction settles.
//!
//! `unmount()` cancels the controller's token: it stops waiting and returns
//! [`ClientError::Cancelled`], while the submitted transaction keeps running
//! on its own task.

pub mod admin;
pub mod claim;
pub mod create;
pub mod gift;
pub mod network;
pub mod provider;
pub mod request;

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chain::{GrantReader, Wallet};
use crate::classify::ErrorClass;
use crate::context::AppContext;
use crate::errors::{ClientError, Result};
use crate::guards::GuardSnapshot;
use crate::reads::{ReadState, Reads};
use crate::routes::Route;
use crate::sponsor::with_paymaster;
use crate::tx::{Operation, TxStatus, WriteHook};
use crate::types::{Address, Receipt, TxHash, WriteCall};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Input,
    PendingApproval,
    PendingSubmission,
    Success {
        hash: TxHash,
        program_id: Option<u64>,
    },
}

/// What a controller action ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    #[serde(flatten)]
    pub step: Step,
    /// Explorer link of the settled transaction.
    pub explorer_url: Option<String>,
    /// Localised failure message.
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self.step, Step::Success { .. })
    }
}

// ─────────────────────────────────────────────────────────
// Shared write hooks
// ─────────────────────────────────────────────────────────

/// One write hook per operation, shared by every controller instance so a
/// second trigger while one is in flight is rejected.
pub struct Hooks<C> {
    hooks: Vec<WriteHook<C>>,
}

impl<C: Wallet> Hooks<C> {
    pub fn new(chain: Arc<C>, ctx: &AppContext) -> Self {
        Self {
            hooks: Operation::ALL
                .iter()
                .map(|op| WriteHook::new(*op, chain.clone(), ctx))
                .collect(),
        }
    }

    pub fn get(&self, op: Operation) -> &WriteHook<C> {
        &self.hooks[op as usize]
    }
}

// ─────────────────────────────────────────────────────────
// Environment
// ─────────────────────────────────────────────────────────

pub struct FlowEnv<C> {
    pub ctx: Arc<AppContext>,
    pub reads: Arc<Reads<C>>,
    pub hooks: Arc<Hooks<C>>,
}

impl<C> Clone for FlowEnv<C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            reads: self.reads.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

fn read_state<T>(result: Result<T>) -> ReadState<T> {
    match result {
        Ok(v) => ReadState::Loaded(v),
        Err(e) => ReadState::Errored(e.to_string()),
    }
}

impl<C: GrantReader + Wallet> FlowEnv<C> {
    pub fn new(ctx: Arc<AppContext>, chain: Arc<C>) -> Self {
        Self {
            hooks: Arc::new(Hooks::new(chain.clone(), &ctx)),
            reads: Arc::new(Reads::new(chain)),
            ctx,
        }
    }

    pub fn chain(&self) -> &Arc<C> {
        self.reads.chain()
    }

    pub fn grant(&self) -> Address {
        self.ctx.config.grant_address
    }

    pub fn token(&self) -> Address {
        self.ctx.config.token_address
    }

    /// Connected account, if any.
    pub async fn wallet(&self) -> Result<Option<Address>> {
        self.chain().account().await
    }

    pub async fn wallet_required(&self) -> Result<Address> {
        self.wallet().await?.ok_or(ClientError::WalletUnavailable)
    }

    pub async fn now(&self) -> ReadState<u64> {
        read_state(self.chain().latest_timestamp().await)
    }

    /// Capture every guard input for `wallet` and, when given, one program.
    /// With `fresh` every query is re-issued instead of served from cache.
    pub async fn snapshot(
        &self,
        wallet: Option<Address>,
        program_id: Option<u64>,
        requested: Option<u128>,
        fresh: bool,
    ) -> GuardSnapshot {
        let reads = &self.reads;
        let program = async {
            match program_id {
                Some(id) => reads.program(id, fresh).await,
                None => ReadState::Disabled,
            }
        };
        let has_claimed = async {
            match program_id {
                Some(id) => reads.has_claimed(id, wallet, fresh).await,
                None => ReadState::Disabled,
            }
        };
        let is_verified = async {
            match program_id {
                Some(id) => reads.is_verified(id, wallet, fresh).await,
                None => ReadState::Disabled,
            }
        };
        let (
            wallet_chain,
            global_paused,
            now,
            program,
            balance,
            allowance,
            has_claimed,
            is_verified,
            admin,
            is_verifier,
            program_count,
        ) = tokio::join!(
            reads.wallet_chain(wallet, fresh),
            reads.global_paused(fresh),
            self.now(),
            program,
            reads.balance(wallet, fresh),
            reads.allowance(wallet, fresh),
            has_claimed,
            is_verified,
            reads.admin(),
            reads.is_verifier(wallet, fresh),
            reads.program_count(fresh),
        );
        GuardSnapshot {
            wallet,
            required_chain_id: self.ctx.config.chain_id,
            requested,
            wallet_chain,
            global_paused,
            now,
            program,
            balance,
            allowance,
            has_claimed,
            is_verified,
            admin,
            is_verifier,
            program_count,
        }
    }

    /// Submit `call` through the hook for `op` and wait for it to settle, or
    /// for `cancel` to fire.
    pub async fn submit(
        &self,
        op: Operation,
        from: Address,
        call: WriteCall,
        cancel: &CancellationToken,
    ) -> Result<TxStatus> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let hook = self.hooks.get(op);
        if hook.status().is_terminal() {
            // Another controller may have reset it first; trigger decides.
            let _ = hook.reset();
        }
        let call = with_paymaster(call, self.ctx.config.paymaster_url.as_deref());
        let submission = hook.trigger(from, call)?;
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(op = op.key(), "controller unmounted, submission continues");
                Err(ClientError::Cancelled)
            }
            status = submission.settled() => status,
        }
    }

    /// Map a settled status to an outcome. `on_success` builds the success
    /// step; failures fall back to `fallback`.
    pub fn outcome(
        &self,
        status: TxStatus,
        fallback: Step,
        on_success: impl FnOnce(TxHash, &Receipt) -> Step,
    ) -> Outcome {
        match status {
            TxStatus::Confirmed { hash, receipt } => Outcome {
                explorer_url: Some(self.ctx.config.tx_url(&hash.0)),
                step: on_success(hash, &receipt),
                error: None,
                error_class: None,
            },
            TxStatus::Failed { class, .. } => Outcome {
                step: fallback,
                explorer_url: None,
                error: Some(class.message(self.ctx.locale).to_string()),
                error_class: Some(class),
            },
            other => Outcome {
                step: fallback,
                explorer_url: other.hash().map(|h| self.ctx.config.tx_url(&h.0)),
                error: None,
                error_class: None,
            },
        }
    }

    /// Redirect for a program detail page whose mode does not match.
    pub async fn resolve_route(&self, route: Route) -> Result<Option<Route>> {
        let Some(id) = route.program_id() else {
            return Ok(None);
        };
        match self.reads.program(id, false).await {
            ReadState::Loaded(p) => Ok(route.redirect_for(p.mode)),
            ReadState::Errored(e) => Err(ClientError::Rpc { code: 0, message: e }),
            _ => Ok(None),
        }
    }
}

/// Stop early once the controller has been unmounted.
pub(crate) fn ensure_mounted(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ClientError::Cancelled)
    } else {
        Ok(())
    }
}
