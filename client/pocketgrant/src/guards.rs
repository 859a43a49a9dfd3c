//! Eligibility guards.
//!
//! Pure functions over a [`GuardSnapshot`] of read results. Nothing here
//! issues requests or caches derived values; callers capture a fresh snapshot
//! and recompute. Every gate fails closed: a read that is disabled, loading or
//! errored never grants permission.

use serde::Serialize;
use thiserror::Error;

use crate::reads::ReadState;
use crate::types::{Address, Program, ProgramMode, ProgramStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GuardError {
    #[error("wallet not connected")]
    WalletNotConnected,

    #[error("wrong network: connected to {connected}, expected {required}")]
    WrongNetwork { connected: u64, required: u64 },

    #[error("{what} is not available yet")]
    Unavailable { what: &'static str },

    #[error("contract is paused")]
    GloballyPaused,

    #[error("insufficient IDRX balance")]
    InsufficientBalance,

    #[error("token approval required before this action")]
    NeedsApproval,

    #[error("allowance already covers this amount")]
    AlreadyApproved,

    #[error("program is a {actual:?} program, not {expected:?}")]
    WrongMode { expected: ProgramMode, actual: ProgramMode },

    #[error("program is not open")]
    ProgramClosed,

    #[error("wallet is not verified for this program")]
    NotVerified,

    #[error("already claimed")]
    AlreadyClaimed,

    #[error("caller is not allowed to do this")]
    NotAuthorized,

    #[error("program cannot move from {from:?}")]
    InvalidStatus { from: ProgramStatus },

    #[error("amount out of range")]
    AmountOutOfRange,
}

pub type GuardResult = std::result::Result<(), GuardError>;

/// Latest read results relevant to one page, plus the fixed inputs the
/// guards compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub wallet: Option<Address>,
    pub required_chain_id: u64,
    /// Amount the user is about to spend or request, if the page has one.
    pub requested: Option<u128>,
    pub wallet_chain: ReadState<u64>,
    pub global_paused: ReadState<bool>,
    /// Latest block timestamp.
    pub now: ReadState<u64>,
    pub program: ReadState<Program>,
    pub balance: ReadState<u128>,
    pub allowance: ReadState<u128>,
    pub has_claimed: ReadState<bool>,
    pub is_verified: ReadState<bool>,
    pub admin: ReadState<Address>,
    pub is_verifier: ReadState<bool>,
    pub program_count: ReadState<u64>,
}

impl GuardSnapshot {
    /// Everything disabled: no read has been captured yet.
    pub fn new(wallet: Option<Address>, required_chain_id: u64) -> Self {
        Self {
            wallet,
            required_chain_id,
            requested: None,
            wallet_chain: ReadState::Disabled,
            global_paused: ReadState::Disabled,
            now: ReadState::Disabled,
            program: ReadState::Disabled,
            balance: ReadState::Disabled,
            allowance: ReadState::Disabled,
            has_claimed: ReadState::Disabled,
            is_verified: ReadState::Disabled,
            admin: ReadState::Disabled,
            is_verifier: ReadState::Disabled,
            program_count: ReadState::Disabled,
        }
    }
}

fn loaded<'a, T>(state: &'a ReadState<T>, what: &'static str) -> Result<&'a T, GuardError> {
    state.loaded().ok_or(GuardError::Unavailable { what })
}

// ─────────────────────────────────────────────────────────
// Single guards
// ─────────────────────────────────────────────────────────

pub fn sufficient_balance(s: &GuardSnapshot, amount: u128) -> bool {
    matches!(s.balance, ReadState::Loaded(b) if b >= amount)
}

/// `None` until the allowance has been read.
pub fn needs_approval(s: &GuardSnapshot, amount: u128) -> Option<bool> {
    s.allowance.loaded().map(|a| *a < amount)
}

pub fn approval_satisfied(s: &GuardSnapshot, amount: u128) -> bool {
    needs_approval(s, amount) == Some(false)
}

/// True only when the wallet is known to be on another network.
pub fn wrong_network(s: &GuardSnapshot) -> bool {
    s.wallet.is_some() && matches!(s.wallet_chain, ReadState::Loaded(id) if id != s.required_chain_id)
}

pub fn already_claimed(s: &GuardSnapshot) -> bool {
    s.has_claimed == ReadState::Loaded(true)
}

/// Open when the program does not require verification or the wallet reads
/// verified.
pub fn verification_gate(s: &GuardSnapshot) -> bool {
    match &s.program {
        ReadState::Loaded(p) if !p.require_verification => true,
        ReadState::Loaded(_) => s.is_verified == ReadState::Loaded(true),
        _ => false,
    }
}

/// Active, funded and, when time-bounded, inside `[start, end]`. An `end` of
/// zero leaves the window open-ended.
pub fn program_open(s: &GuardSnapshot) -> bool {
    let ReadState::Loaded(p) = &s.program else {
        return false;
    };
    if p.status != ProgramStatus::Active || p.remaining_fund == 0 {
        return false;
    }
    if !p.is_time_bounded() {
        return true;
    }
    match s.now {
        ReadState::Loaded(now) => now >= p.start && (p.end == 0 || now <= p.end),
        _ => false,
    }
}

pub fn estimated_recipients(total: u128, per_claim: u128) -> u128 {
    if per_claim == 0 {
        0
    } else {
        total / per_claim
    }
}

// ─────────────────────────────────────────────────────────
// Composite gates
// ─────────────────────────────────────────────────────────

/// Connected, on the required network and not globally paused.
pub fn check_wallet_ready(s: &GuardSnapshot) -> Result<Address, GuardError> {
    let wallet = s.wallet.ok_or(GuardError::WalletNotConnected)?;
    let connected = *loaded(&s.wallet_chain, "network")?;
    if connected != s.required_chain_id {
        return Err(GuardError::WrongNetwork {
            connected,
            required: s.required_chain_id,
        });
    }
    if *loaded(&s.global_paused, "pause flag")? {
        return Err(GuardError::GloballyPaused);
    }
    Ok(wallet)
}

fn check_funds(s: &GuardSnapshot, amount: u128) -> GuardResult {
    if amount == 0 {
        return Err(GuardError::AmountOutOfRange);
    }
    loaded(&s.balance, "balance")?;
    if !sufficient_balance(s, amount) {
        return Err(GuardError::InsufficientBalance);
    }
    Ok(())
}

fn requested(s: &GuardSnapshot) -> Result<u128, GuardError> {
    s.requested.ok_or(GuardError::AmountOutOfRange)
}

pub fn check_approve(s: &GuardSnapshot) -> GuardResult {
    check_wallet_ready(s)?;
    let amount = requested(s)?;
    check_funds(s, amount)?;
    match needs_approval(s, amount) {
        Some(true) => Ok(()),
        Some(false) => Err(GuardError::AlreadyApproved),
        None => Err(GuardError::Unavailable { what: "allowance" }),
    }
}

/// Spending `requested` out of the wallet: create and top-up.
fn check_spend(s: &GuardSnapshot) -> GuardResult {
    check_wallet_ready(s)?;
    let amount = requested(s)?;
    check_funds(s, amount)?;
    match needs_approval(s, amount) {
        Some(false) => Ok(()),
        Some(true) => Err(GuardError::NeedsApproval),
        None => Err(GuardError::Unavailable { what: "allowance" }),
    }
}

pub fn check_create(s: &GuardSnapshot) -> GuardResult {
    check_spend(s)
}

fn check_beneficiary(s: &GuardSnapshot, mode: ProgramMode) -> Result<&Program, GuardError> {
    check_wallet_ready(s)?;
    let program = loaded(&s.program, "program")?;
    if program.mode != mode {
        return Err(GuardError::WrongMode {
            expected: mode,
            actual: program.mode,
        });
    }
    if !program_open(s) {
        return Err(GuardError::ProgramClosed);
    }
    if !verification_gate(s) {
        return Err(GuardError::NotVerified);
    }
    Ok(program)
}

fn check_claim(s: &GuardSnapshot, mode: ProgramMode) -> GuardResult {
    check_beneficiary(s, mode)?;
    if *loaded(&s.has_claimed, "claim record")? {
        return Err(GuardError::AlreadyClaimed);
    }
    Ok(())
}

pub fn check_claim_instant(s: &GuardSnapshot) -> GuardResult {
    check_claim(s, ProgramMode::InstantRandomClaim)
}

pub fn check_claim_gift(s: &GuardSnapshot) -> GuardResult {
    check_claim(s, ProgramMode::GiftCode)
}

pub fn check_submit_request(s: &GuardSnapshot) -> GuardResult {
    let program = check_beneficiary(s, ProgramMode::Request)?;
    let amount = requested(s)?;
    if amount == 0 || amount > program.max_per_claim {
        return Err(GuardError::AmountOutOfRange);
    }
    Ok(())
}

/// Caller is the admin or a registered verifier.
pub fn check_verify(s: &GuardSnapshot) -> GuardResult {
    let wallet = check_wallet_ready(s)?;
    let is_admin = s.admin.loaded() == Some(&wallet);
    let is_verifier = s.is_verifier == ReadState::Loaded(true);
    if !is_admin && !is_verifier {
        return match (&s.admin, &s.is_verifier) {
            (ReadState::Loaded(_), ReadState::Loaded(_)) => Err(GuardError::NotAuthorized),
            _ => Err(GuardError::Unavailable { what: "roles" }),
        };
    }
    loaded(&s.program_count, "program count")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageAction {
    Pause,
    Resume,
    End,
    TopUp,
}

/// Provider-only lifecycle and funding actions.
pub fn check_manage(s: &GuardSnapshot, action: ManageAction) -> GuardResult {
    let wallet = check_wallet_ready(s)?;
    let program = loaded(&s.program, "program")?;
    if program.owner != wallet {
        return Err(GuardError::NotAuthorized);
    }
    let allowed = match action {
        ManageAction::Pause => program.status == ProgramStatus::Active,
        ManageAction::Resume => program.status == ProgramStatus::Paused,
        ManageAction::End | ManageAction::TopUp => program.status != ProgramStatus::Ended,
    };
    if !allowed {
        return Err(GuardError::InvalidStatus { from: program.status });
    }
    if action == ManageAction::TopUp {
        check_spend(s)?;
    }
    Ok(())
}

pub fn can_approve(s: &GuardSnapshot) -> bool {
    check_approve(s).is_ok()
}

pub fn can_create(s: &GuardSnapshot) -> bool {
    check_create(s).is_ok()
}

pub fn can_claim_instant(s: &GuardSnapshot) -> bool {
    check_claim_instant(s).is_ok()
}

pub fn can_claim_gift(s: &GuardSnapshot) -> bool {
    check_claim_gift(s).is_ok()
}

pub fn can_submit_request(s: &GuardSnapshot) -> bool {
    check_submit_request(s).is_ok()
}

pub fn can_verify(s: &GuardSnapshot) -> bool {
    check_verify(s).is_ok()
}

pub fn can_manage(s: &GuardSnapshot, action: ManageAction) -> bool {
    check_manage(s, action).is_ok()
}

// ─────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SwitchNetwork,
    Approve,
    Create,
    ClaimInstant,
    ClaimGift,
    SubmitRequest,
    Verify,
    Pause,
    Resume,
    End,
    TopUp,
}

/// Everything the user may do right now. On the wrong network the only
/// offer is switching.
pub fn available_actions(s: &GuardSnapshot) -> Vec<Action> {
    if wrong_network(s) {
        return vec![Action::SwitchNetwork];
    }
    let manage = |a: ManageAction| can_manage(s, a);
    let candidates = [
        (Action::Approve, can_approve(s) && !s.program.is_loaded()),
        (Action::Create, can_create(s) && !s.program.is_loaded()),
        (Action::ClaimInstant, can_claim_instant(s)),
        (Action::ClaimGift, can_claim_gift(s)),
        (Action::SubmitRequest, can_submit_request(s)),
        (Action::Verify, can_verify(s)),
        (Action::Pause, manage(ManageAction::Pause)),
        (Action::Resume, manage(ManageAction::Resume)),
        (Action::End, manage(ManageAction::End)),
        (Action::TopUp, manage(ManageAction::TopUp)),
    ];
    candidates
        .into_iter()
        .filter_map(|(action, ok)| ok.then_some(action))
        .collect()
}
