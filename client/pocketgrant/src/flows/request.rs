//! Request-for-approval page.

use tokio_util::sync::CancellationToken;

use super::{ensure_mounted, FlowEnv, Outcome, Step};
use crate::abi;
use crate::chain::{GrantReader, Wallet};
use crate::errors::{ClientError, FieldErrors, Result};
use crate::guards;
use crate::routes::Route;
use crate::tx::Operation;
use crate::types::WriteCall;
use crate::units::parse_amount;

pub struct RequestFlow<C> {
    env: FlowEnv<C>,
    program_id: u64,
    step: Step,
    cancel: CancellationToken,
}

impl<C: GrantReader + Wallet> RequestFlow<C> {
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

    pub async fn redirect(&self) -> Result<Option<Route>> {
        self.env.resolve_route(Route::RequestById(self.program_id)).await
    }

    /// Submit a request for `amount`, entered as a decimal IDRX string.
    pub async fn submit(&mut self, amount: &str) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let amount = match parse_amount(amount, self.env.ctx.config.token_decimals) {
            Ok(v) if v > 0 => v,
            Ok(_) => return Err(amount_error("Amount must be greater than zero")),
            Err(_) => return Err(amount_error("Enter a valid amount")),
        };
        let id = self.program_id;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), Some(id), Some(amount), true).await;
        guards::check_submit_request(&snapshot)?;

        self.step = Step::PendingSubmission;
        let call = WriteCall::new(self.env.grant(), abi::submit_request(id, amount));
        let status = match self.env.submit(Operation::Request, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = Step::Input;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        self.env.reads.program(id, true).await;
        let outcome = self.env.outcome(status, Step::Input, |hash, _| Step::Success {
            hash,
            program_id: Some(id),
        });
        self.step = outcome.step.clone();
        Ok(outcome)
    }
}

fn amount_error(message: &str) -> ClientError {
    let mut errors = FieldErrors::new();
    errors.add("amount", message);
    ClientError::Validation(errors)
}
