//! Admin page: verify a beneficiary for a program.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ensure_mounted, FlowEnv, Outcome, Step};
use crate::abi;
use crate::chain::{GrantReader, Wallet};
use crate::errors::{ClientError, FieldErrors, Result};
use crate::guards;
use crate::reads::ReadState;
use crate::tx::Operation;
use crate::types::{Address, WriteCall};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyForm {
    pub program_id: String,
    pub beneficiary: String,
}

/// Roles of the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roles {
    pub wallet: Option<Address>,
    pub is_admin: ReadState<bool>,
    pub is_verifier: ReadState<bool>,
}

impl VerifyForm {
    /// Check the form against the current program count.
    pub fn validate(&self, program_count: Option<u64>) -> Result<(u64, Address)> {
        let mut errors = FieldErrors::new();
        let id = match self.program_id.trim().parse::<u64>() {
            Ok(id) if id >= 1 && program_count.map_or(true, |count| id <= count) => Some(id),
            Ok(_) => {
                errors.add("program_id", "Program not found");
                None
            }
            Err(_) => {
                errors.add("program_id", "Enter a program ID");
                None
            }
        };
        let beneficiary = match self.beneficiary.trim().parse::<Address>() {
            Ok(a) if a != Address::ZERO => Some(a),
            _ => {
                errors.add("beneficiary", "Invalid wallet address");
                None
            }
        };
        errors.into_result()?;
        match (id, beneficiary) {
            (Some(id), Some(beneficiary)) => Ok((id, beneficiary)),
            _ => Err(ClientError::Validation(FieldErrors::new())),
        }
    }
}

pub struct AdminFlow<C> {
    env: FlowEnv<C>,
    step: Step,
    cancel: CancellationToken,
}

impl<C: GrantReader + Wallet> AdminFlow<C> {
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

    pub async fn roles(&self) -> Result<Roles> {
        let wallet = self.env.wallet().await?;
        let reads = &self.env.reads;
        let (admin, is_verifier) = tokio::join!(reads.admin(), reads.is_verifier(wallet, false));
        let is_admin = match (wallet, admin) {
            (None, _) => ReadState::Disabled,
            (Some(w), admin) => admin.map(|a| a == w),
        };
        Ok(Roles {
            wallet,
            is_admin,
            is_verifier,
        })
    }

    pub async fn verify(&mut self, form: &VerifyForm) -> Result<Outcome> {
        ensure_mounted(&self.cancel)?;
        let wallet = self.env.wallet_required().await?;
        let snapshot = self.env.snapshot(Some(wallet), None, None, true).await;
        let (id, beneficiary) = form.validate(snapshot.program_count.loaded().copied())?;
        guards::check_verify(&snapshot)?;

        self.step = Step::PendingSubmission;
        let call = WriteCall::new(self.env.grant(), abi::verify_beneficiary(id, beneficiary));
        let status = match self.env.submit(Operation::Verify, wallet, call, &self.cancel).await {
            Ok(status) => status,
            Err(e) => {
                self.step = Step::Input;
                return Err(e);
            }
        };
        ensure_mounted(&self.cancel)?;

        self.env.reads.is_verified(id, Some(beneficiary), true).await;
        let outcome = self.env.outcome(status, Step::Input, |hash, _| Step::Success {
            hash,
            program_id: Some(id),
        });
        self.step = outcome.step.clone();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::env;
    use super::*;
    use crate::guards::GuardError;
    use crate::testutil::wallet;

    fn form(id: &str, who: Address) -> VerifyForm {
        VerifyForm {
            program_id: id.to_string(),
            beneficiary: who.to_string(),
        }
    }

    #[test]
    fn form_validation() {
        assert_eq!(form("2", wallet(3)).validate(Some(2)).unwrap(), (2, wallet(3)));
        for (id, count) in [("0", Some(2)), ("3", Some(2)), ("x", Some(2))] {
            match form(id, wallet(3)).validate(count) {
                Err(ClientError::Validation(errors)) => assert!(errors.get("program_id").is_some()),
                other => panic!("unexpected {other:?}"),
            }
        }
        let bad = VerifyForm {
            program_id: "1".to_string(),
            beneficiary: "0x1234".to_string(),
        };
        match bad.validate(Some(1)) {
            Err(ClientError::Validation(errors)) => {
                assert_eq!(errors.get("beneficiary"), Some("Invalid wallet address"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admin_verifies_beneficiary() {
        let (chain, env) = env();
        let id = chain.add_request_program(wallet(9), 1_000, 100, true);
        chain.set_admin(wallet(1));
        let mut flow = AdminFlow::new(env.clone());

        let roles = flow.roles().await.unwrap();
        assert_eq!(roles.is_admin, ReadState::Loaded(true));

        let outcome = flow.verify(&form(&id.to_string(), wallet(5))).await.unwrap();
        assert!(outcome.is_success());
        assert!(chain.is_marked_verified(id, wallet(5)));
        assert_eq!(
            env.reads.is_verified(id, Some(wallet(5)), false).await,
            ReadState::Loaded(true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn verifier_role_is_enough() {
        let (chain, env) = env();
        let id = chain.add_request_program(wallet(9), 1_000, 100, true);
        chain.add_verifier(wallet(1));
        let mut flow = AdminFlow::new(env);
        assert!(flow.verify(&form(&id.to_string(), wallet(5))).await.unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn strangers_are_refused() {
        let (chain, env) = env();
        let id = chain.add_request_program(wallet(9), 1_000, 100, true);
        let mut flow = AdminFlow::new(env);

        assert_eq!(flow.roles().await.unwrap().is_admin, ReadState::Loaded(false));
        assert!(matches!(
            flow.verify(&form(&id.to_string(), wallet(5))).await,
            Err(ClientError::Guard(GuardError::NotAuthorized))
        ));
        assert!(chain.sent().is_empty());
    }
}
