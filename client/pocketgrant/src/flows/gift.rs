//! Gift Card redemption page.

use tokio_util::sync::CancellationToken;

use super::{ensure_mounted, FlowEnv, Outcome, Step};
use crate::abi;
use crate::chain::{GrantReader, Wallet};
use crate::errors::{ClientError, FieldErrors, Result};
use crate::guards;
use crate::routes::Route;
use crate::tx::Operation;
use crate::types::WriteCall;

pub struct GiftFlow<C> {
    env: FlowEnv<C>,
    program_id: u64,
    step: Step,
    cancel: CancellationToken,
}

fn validate_code(code: &str) -> Result<&str> {
    let code = code.trim();
    if code.is_empty() {
        let mut errors = FieldErrors::new();
        errors.add("code", "Enter the gift code");
        return Err(ClientError::Validation(errors));
    }
    Ok(code)
}

impl<C: GrantReader + Wallet> GiftFlow<C> {
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

    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    /// Where to send the user when the program is not a gift program.
    pub async fn redirect(&self) -> Result<Option<Route>> {
        self.env.resolve_route(Route::GiftById(self.program_id)).await
    }

    pub async fn redeem(&mut self, code: &str) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let code = validate_code(code)?;
        let id = self.program_id;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), Some(id), None, true).await;
        guards::check_claim_gift(&snapshot)?;

        self.step = Step::PendingSubmission;
        let call = WriteCall::new(self.env.grant(), abi::claim_gift(id, code));
        let status = match self.env.submit(Operation::Gift, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = Step::Input;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        // Re-read either way: a rejected code must still show as unclaimed.
        let reads = &self.env.reads;
        tokio::join!(
            reads.has_claimed(id, Some(wallet), true),
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
