//! Dana Kaget (instant random claim) page.

use tokio_util::sync::CancellationToken;

use super::{ensure_mounted, FlowEnv, Outcome, Step};
use crate::abi;
use crate::chain::{GrantReader, Wallet};
use crate::errors::Result;
use crate::guards;
use crate::reads::ReadState;
use crate::tx::Operation;
use crate::types::{ClaimCheck, WriteCall};

pub struct ClaimFlow<C> {
    env: FlowEnv<C>,
    program_id: u64,
    step: Step,
    cancel: CancellationToken,
}

impl<C: GrantReader + Wallet> ClaimFlow<C> {
    pub fn new(env: FlowEnv<C>, program_id: u64) -> Self {
        Self {
            env,
            program_id,
            step: Step::Input,
            cancel: CancellationToken::new(),
        }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    /// Amount the connected wallet would receive right now.
    pub async fn preview(&self) -> Result<ReadState<ClaimCheck>> {
        let wallet = self.env.wallet().await?;
        Ok(self.env.reads.can_claim(self.program_id, wallet, false).await)
    }

    pub async fn claim(&mut self) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let id = self.program_id;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), Some(id), None, true).await;
        guards::check_claim_instant(&snapshot)?;

        self.step = Step::PendingSubmission;
        let call = WriteCall::new(self.env.grant(), abi::claim_instant(id));
        let status = match self.env.submit(Operation::Claim, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = Step::Input;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        let reads = &self.env.reads;
        tokio::join!(
            reads.has_claimed(id, Some(wallet), true),
            reads.can_claim(id, Some(wallet), true),
            reads.program(id, true),
            reads.balance(Some(wallet), true),
        );
        let outcome = self.env.outcome(status, Step::Input, |hash, _| Step::Success {
            hash,
            program_id: Some(id),
        });
        self.step = outcome.step.clone();
        Ok(outcome)
    }
}
