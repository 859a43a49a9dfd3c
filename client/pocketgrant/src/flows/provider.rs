//! Provider dashboard: list owned programs, manage their lifecycle, top up.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ensure_mounted, FlowEnv, Outcome, Step};
use crate::abi;
use crate::chain::{GrantReader, Wallet};
use crate::errors::{ClientError, FieldErrors, Result};
use crate::guards::{self, GuardError, ManageAction};
use crate::reads::ReadState;
use crate::tx::Operation;
use crate::types::{Address, Program, WriteCall};
use crate::units::parse_amount;

pub struct ProviderFlow<C> {
    env: FlowEnv<C>,
    step: Step,
    cancel: CancellationToken,
}

impl<C: GrantReader + Wallet> ProviderFlow<C> {
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

    /// Programs owned by `owner`, oldest first. Programs that fail to load
    /// are skipped.
    pub async fn programs(&self, owner: Address, fresh: bool) -> Result<Vec<Program>> {
        let count = match self.env.reads.program_count(fresh).await {
            ReadState::Loaded(n) => n,
            ReadState::Errored(e) => return Err(ClientError::Rpc { code: 0, message: e }),
            _ => return Ok(vec![]),
        };
        let mut owned = Vec::new();
        for id in 1..=count {
            match self.env.reads.program(id, fresh).await {
                ReadState::Loaded(p) if p.owner == owner => owned.push(p),
                ReadState::Loaded(_) => {}
                other => debug!(id, state = ?other, "skipping program"),
            }
        }
        Ok(owned)
    }

    pub async fn pause(&mut self, id: u64) -> Result<Outcome> {
        self.manage(id, ManageAction::Pause, Operation::Pause, abi::pause_program(id))
            .await
    }

    pub async fn resume(&mut self, id: u64) -> Result<Outcome> {
        self.manage(id, ManageAction::Resume, Operation::Resume, abi::resume_program(id))
            .await
    }

    /// End the program; the contract refunds whatever is left to the owner.
    pub async fn end(&mut self, id: u64) -> Result<Outcome> {
        self.manage(id, ManageAction::End, Operation::End, abi::end_program(id))
            .await
    }

    async fn manage(
        &mut self,
        id: u64,
        action: ManageAction,
        op: Operation,
        data: Vec<u8>,
    ) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), Some(id), None, true).await;
        guards::check_manage(&snapshot, action)?;

        let call = WriteCall::new(self.env.grant(), data);
        self.run(op, wallet, call, id).await
    }

    /// Approve the grant contract to pull `amount` for a top-up.
    pub async fn top_up_approve(&mut self, id: u64, amount: &str) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let amount = self.parse(amount)?;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), Some(id), Some(amount), true).await;
        match guards::check_manage(&snapshot, ManageAction::TopUp) {
            Err(GuardError::NeedsApproval) => {}
            Ok(()) => return Err(GuardError::AlreadyApproved.into()),
            Err(e) => return Err(e.into()),
        }
        guards::check_approve(&snapshot)?;

        let call = WriteCall::new(self.env.token(), abi::approve(self.env.grant(), amount));
        let outcome = self.run(Operation::Approve, wallet, call, id).await?;
        if outcome.is_success() {
            self.step = Step::PendingApproval;
        }
        Ok(outcome)
    }

    pub async fn top_up(&mut self, id: u64, amount: &str) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let amount = self.parse(amount)?;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), Some(id), Some(amount), true).await;
        guards::check_manage(&snapshot, ManageAction::TopUp)?;

        let call = WriteCall::new(self.env.grant(), abi::top_up_program(id, amount));
        self.run(Operation::TopUp, wallet, call, id).await
    }

    fn parse(&self, amount: &str) -> Result<u128> {
        match parse_amount(amount, self.env.ctx.config.token_decimals) {
            Ok(v) if v > 0 => Ok(v),
            _ => {
                let mut errors = FieldErrors::new();
                errors.add("amount", "Enter a valid amount");
                Err(ClientError::Validation(errors))
            }
        }
    }

    async fn run(
        &mut self,
        op: Operation,
        wallet: Address,
        call: WriteCall,
        id: u64,
    ) -> Result<Outcome> {
        self.step = Step::PendingSubmission;
        let status = match self.env.submit(op, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = Step::Input;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        let reads = &self.env.reads;
        tokio::join!(
            reads.program(id, true),
            reads.balance(Some(wallet), true),
            reads.allowance(Some(wallet), true),
        );
        let outcome = self.env.outcome(status, Step::Input, |hash, _| Step::Success {
            hash,
            program_id: Some(id),
        });
        self.step = outcome.step.clone();
        Ok(outcome)
    }
}
