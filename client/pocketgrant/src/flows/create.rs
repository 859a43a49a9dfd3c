//! Program creation: validate the draft, approve IDRX, then create.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{ensure_mounted, FlowEnv, Outcome, Step};
use crate::abi;
use crate::chain::{GrantReader, Wallet};
use crate::errors::{ClientError, FieldErrors, Result};
use crate::guards::{self, estimated_recipients};
use crate::reads::ReadState;
use crate::tx::Operation;
use crate::types::{ProgramConfig, ProgramMode, WriteCall};
use crate::units::parse_amount;

const SECONDS_PER_DAY: u64 = 86_400;

/// Form input as entered by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDraft {
    pub total: String,
    pub per_claim: String,
    pub mode: Option<ProgramMode>,
    #[serde(default)]
    pub gift_code: Option<String>,
    /// Open window in days starting now; absent means no time bound.
    #[serde(default)]
    pub duration_days: Option<u64>,
    #[serde(default)]
    pub cap_per_wallet: Option<u128>,
    #[serde(default)]
    pub require_verification: bool,
}

impl CreateDraft {
    /// Build the on-chain config, collecting every field problem at once.
    /// `now` is only consulted when a duration is given.
    pub fn validate(&self, decimals: u8, now: Option<u64>) -> Result<ProgramConfig> {
        let mut errors = FieldErrors::new();

        let mut amount = |field: &'static str, input: &str| match parse_amount(input, decimals) {
            Ok(0) => {
                errors.add(field, "Amount must be greater than zero");
                None
            }
            Ok(v) => Some(v),
            Err(_) => {
                errors.add(field, "Enter a valid amount");
                None
            }
        };
        let total = amount("total", &self.total);
        let per_claim = amount("per_claim", &self.per_claim);
        if let (Some(t), Some(c)) = (total, per_claim) {
            if c > t {
                errors.add("per_claim", "Cannot exceed the total fund");
            }
        }

        if self.mode.is_none() {
            errors.add("mode", "Choose a program mode");
        }
        let gift_code = self.gift_code.as_deref().map(str::trim).unwrap_or_default();
        if self.mode == Some(ProgramMode::GiftCode) && gift_code.is_empty() {
            errors.add("gift_code", "Enter a gift code");
        }

        let window = match (self.duration_days, now) {
            (None, _) => Some((0, 0)),
            (Some(0), _) => {
                errors.add("duration_days", "Duration must be at least one day");
                None
            }
            (Some(_), None) => {
                errors.add("duration_days", "Network time unavailable, try again");
                None
            }
            (Some(days), Some(now)) => {
                let end = days
                    .checked_mul(SECONDS_PER_DAY)
                    .and_then(|secs| now.checked_add(secs));
                if end.is_none() {
                    errors.add("duration_days", "Duration is too long");
                }
                end.map(|end| (now, end))
            }
        };

        errors.into_result()?;
        let (Some(total_fund), Some(max_per_claim), Some(mode), Some((start, end))) =
            (total, per_claim, self.mode, window)
        else {
            return Err(ClientError::Validation(FieldErrors::new()));
        };
        Ok(ProgramConfig {
            total_fund,
            max_per_claim,
            mode,
            cap_per_wallet: self.cap_per_wallet.unwrap_or(1),
            start,
            end,
            gift_code_hash: if mode == ProgramMode::GiftCode {
                abi::gift_code_hash(gift_code)
            } else {
                [0u8; 32]
            },
            require_verification: self.require_verification,
        })
    }
}

pub struct CreateFlow<C> {
    env: FlowEnv<C>,
    step: Step,
    cancel: CancellationToken,
}

impl<C: GrantReader + Wallet> CreateFlow<C> {
    pub fn new(env: FlowEnv<C>) -> Self {
        Self {
            env,
            step: Step::Input,
            cancel: CancellationToken::new(),
        }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    async fn validated(&self, draft: &CreateDraft) -> Result<ProgramConfig> {
        let now = match draft.duration_days {
            Some(_) => self.env.now().await.loaded().copied(),
            None => None,
        };
        draft.validate(self.env.ctx.config.token_decimals, now)
    }

    /// How many wallets the program would serve at the full per-claim amount.
    pub fn estimate(&self, draft: &CreateDraft) -> Result<u128> {
        let decimals = self.env.ctx.config.token_decimals;
        let total = parse_amount(&draft.total, decimals)?;
        let per_claim = parse_amount(&draft.per_claim, decimals)?;
        Ok(estimated_recipients(total, per_claim))
    }

    /// Approve the PocketGrant contract to pull the total fund.
    pub async fn approve(&mut self, draft: &CreateDraft) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let config = self.validated(draft).await?;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self
            .env
            .snapshot(Some(wallet), None, Some(config.total_fund), true)
            .await;
        guards::check_approve(&snapshot)?;

        self.step = Step::PendingApproval;
        let call = WriteCall::new(self.env.token(), abi::approve(self.env.grant(), config.total_fund));
        let status = match self.env.submit(Operation::Approve, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = Step::Input;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        self.env.reads.allowance(Some(wallet), true).await;
        // Approved and waiting for submission, or back to input on failure.
        let outcome = self.env.outcome(status, Step::Input, |_, _| Step::PendingApproval);
        self.step = outcome.step.clone();
        Ok(outcome)
    }

    /// Create the program. Rejected by the guard until the allowance covers
    /// the total fund.
    pub async fn submit(&mut self, draft: &CreateDraft) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let config = self.validated(draft).await?;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self
            .env
            .snapshot(Some(wallet), None, Some(config.total_fund), true)
            .await;
        guards::check_create(&snapshot)?;

        let previous = self.step.clone();
        self.step = Step::PendingSubmission;
        let call = WriteCall::new(self.env.grant(), abi::create_program(&config));
        let status = match self.env.submit(Operation::Create, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = previous;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        let reads = &self.env.reads;
        let (count, _, _) = tokio::join!(
            reads.program_count(true),
            reads.balance(Some(wallet), true),
            reads.allowance(Some(wallet), true),
        );
        let grant = self.env.grant();
        let outcome = self.env.outcome(status, previous, |hash, receipt| {
            let program_id = abi::created_program_id(receipt, grant);
            if program_id.is_none() {
                warn!(%hash, count = ?count.loaded(), "no ProgramCreated event in receipt");
            }
            Step::Success { hash, program_id }
        });
        if let Step::Success { program_id: Some(id), .. } = outcome.step {
            reads.program(id, true).await;
        }
        self.step = outcome.step.clone();
        Ok(outcome)
    }

    /// Whether the current allowance already covers `draft`'s total.
    pub async fn approval_needed(&self, draft: &CreateDraft) -> Result<ReadState<bool>> {
        let config = self.validated(draft).await?;
        let wallet = self.env.wallet().await?;
        Ok(self
            .env
            .reads
            .allowance(wallet, true)
            .await
            .map(|a| a < config.total_fund))
    }
}
