//! In-memory PocketGrant + IDRX used by the unit tests.
//!
//! Writes are decoded from their calldata and run against a small model of
//! the contract. Submission dry-runs the call, so bad calls fail in the
//! wallet the way gas estimation rejects them; the effects land only when
//! the receipt is first observed, together with the same events the real
//! contract emits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::abi::{self, sig, Decoder, Token};
use crate::chain::{GrantReader, Wallet};
use crate::errors::{ClientError, Result};
use crate::types::{
    Address, ClaimCheck, Log, Program, ProgramMode, ProgramStatus, Receipt, TxHash, WriteCall,
};

pub const CHAIN_ID: u64 = 84532;
pub const NOW: u64 = 1_700_000_000;

pub fn wallet(byte: u8) -> Address {
    Address([byte; 20])
}

pub fn grant_address() -> Address {
    crate::config::Config::for_tests().grant_address
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptPlan {
    Success,
    Revert,
    Never,
}

fn word(token: Token) -> [u8; 32] {
    abi::encode_args(&[token])
        .try_into()
        .expect("static token encodes to one word")
}

fn revert(reason: &str) -> ClientError {
    ClientError::Rpc {
        code: 3,
        message: format!("execution reverted: {reason}"),
    }
}

// ─────────────────────────────────────────────────────────
// Contract model
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct Contract {
    programs: BTreeMap<u64, Program>,
    gift_hashes: HashMap<u64, [u8; 32]>,
    claimed: HashSet<(u64, Address)>,
    verified: HashSet<(u64, Address)>,
    requests: Vec<(u64, Address, u128)>,
    admin: Address,
    verifiers: HashSet<Address>,
    global_paused: bool,
    balances: HashMap<Address, u128>,
    allowances: HashMap<Address, u128>,
}

impl Contract {
    fn take_funds(&mut self, from: Address, amount: u128) -> Result<()> {
        let allowance = self.allowances.get(&from).copied().unwrap_or(0);
        if allowance < amount {
            return Err(revert("ERC20: insufficient allowance"));
        }
        let balance = self.balances.get(&from).copied().unwrap_or(0);
        if balance < amount {
            return Err(revert("ERC20: transfer amount exceeds balance"));
        }
        self.allowances.insert(from, allowance - amount);
        self.balances.insert(from, balance - amount);
        Ok(())
    }

    fn apply(&mut self, from: Address, call: &WriteCall) -> Result<Vec<Log>> {
        let grant = grant_address();
        if call.data.len() < 4 {
            return Err(revert("empty calldata"));
        }
        let (sel, args) = call.data.split_at(4);
        let d = Decoder::new(args);
        let is = |signature: &str| sel == abi::selector(signature).as_slice();

        if is(sig::APPROVE) {
            self.allowances.insert(from, d.u128(1)?);
            return Ok(vec![]);
        }

        if self.global_paused {
            return Err(revert("Globally paused"));
        }

        if is(sig::CREATE_PROGRAM) {
            let total = d.u128(0)?;
            let mode = ProgramMode::try_from(d.u8(2)?)?;
            self.take_funds(from, total)?;
            let id = self.programs.len() as u64 + 1;
            self.programs.insert(
                id,
                Program {
                    id,
                    owner: from,
                    total_fund: total,
                    remaining_fund: total,
                    max_per_claim: d.u128(1)?,
                    mode,
                    status: ProgramStatus::Active,
                    cap_per_wallet: d.u128(3)?,
                    start: d.u64(4)?,
                    end: d.u64(5)?,
                    require_verification: d.bool(7)?,
                },
            );
            if mode == ProgramMode::GiftCode {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&args[6 * 32..7 * 32]);
                self.gift_hashes.insert(id, hash);
            }
            return Ok(vec![Log {
                address: grant,
                topics: vec![
                    abi::event_topic(sig::PROGRAM_CREATED),
                    word(Token::Uint(id.into())),
                    word(Token::Address(from)),
                ],
                data: abi::encode_args(&[Token::Uint(total), Token::Uint(mode.as_u8().into())]),
                block_number: None,
                tx_hash: None,
                log_index: Some(0),
            }]);
        }

        let id = d.u64(0)?;

        if is(sig::TOP_UP_PROGRAM) {
            let amount = d.u128(1)?;
            if !self.programs.contains_key(&id) {
                return Err(revert("Program not found"));
            }
            self.take_funds(from, amount)?;
            if let Some(p) = self.programs.get_mut(&id) {
                p.total_fund += amount;
                p.remaining_fund += amount;
            }
            return Ok(vec![]);
        }

        if is(sig::VERIFY_BENEFICIARY) {
            if from != self.admin && !self.verifiers.contains(&from) {
                return Err(revert("Not verifier"));
            }
            self.verified.insert((id, d.address(1)?));
            return Ok(vec![]);
        }

        let program = self
            .programs
            .get(&id)
            .cloned()
            .ok_or_else(|| revert("Program not found"))?;

        let next_status = if is(sig::PAUSE_PROGRAM) {
            Some(ProgramStatus::Paused)
        } else if is(sig::RESUME_PROGRAM) {
            Some(ProgramStatus::Active)
        } else if is(sig::END_PROGRAM) {
            Some(ProgramStatus::Ended)
        } else {
            None
        };
        if let Some(to) = next_status {
            if from != program.owner {
                return Err(revert("Not provider"));
            }
            if !program.status.can_transition_to(to) {
                return Err(revert("Invalid status"));
            }
            let mut refund = 0;
            if let Some(p) = self.programs.get_mut(&id) {
                p.status = to;
                if to == ProgramStatus::Ended {
                    refund = p.remaining_fund;
                    p.remaining_fund = 0;
                }
            }
            *self.balances.entry(from).or_insert(0) += refund;
            return Ok(vec![]);
        }

        if program.status != ProgramStatus::Active {
            return Err(revert("Program not active"));
        }
        if program.require_verification && !self.verified.contains(&(id, from)) {
            return Err(revert("Not verified"));
        }

        if is(sig::SUBMIT_REQUEST) {
            let amount = d.u128(1)?;
            if amount > program.max_per_claim {
                return Err(revert("Amount exceeds max"));
            }
            self.requests.push((id, from, amount));
            return Ok(vec![]);
        }

        if !is(sig::CLAIM_INSTANT) && !is(sig::CLAIM_GIFT) {
            return Err(revert("unknown selector"));
        }
        if is(sig::CLAIM_GIFT) {
            let code = d.string(1)?;
            if self.gift_hashes.get(&id) != Some(&abi::gift_code_hash(&code)) {
                return Err(revert("Invalid code"));
            }
        }
        if self.claimed.contains(&(id, from)) {
            return Err(revert("Already claimed"));
        }
        let amount = program.max_per_claim.min(program.remaining_fund);
        if amount == 0 {
            return Err(revert("Program empty"));
        }
        if let Some(p) = self.programs.get_mut(&id) {
            p.remaining_fund -= amount;
        }
        self.claimed.insert((id, from));
        *self.balances.entry(from).or_insert(0) += amount;
        Ok(vec![Log {
            address: grant,
            topics: vec![
                abi::event_topic(sig::CLAIMED),
                word(Token::Uint(id.into())),
                word(Token::Address(from)),
            ],
            data: abi::encode_args(&[Token::Uint(amount)]),
            block_number: None,
            tx_hash: None,
            log_index: Some(0),
        }])
    }
}

// ─────────────────────────────────────────────────────────
// Mock chain + wallet
// ─────────────────────────────────────────────────────────

struct Pending {
    from: Address,
    call: WriteCall,
    reverts: bool,
    polls_left: u32,
    block_number: u64,
    receipt: Option<Receipt>,
}

struct State {
    contract: Contract,
    now: u64,
    account: Option<Address>,
    wallet_chain: u64,
    send_error: Option<String>,
    receipt_plan: ReceiptPlan,
    receipt_delay: u32,
    pending: HashMap<String, Pending>,
    next_hash: u64,
    sent: Vec<WriteCall>,
    fail_reads: HashSet<&'static str>,
    reads: HashMap<&'static str, usize>,
}

pub struct MockChain {
    state: Mutex<State>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Wallet `wallet(1)` connected on the required network, admin `wallet(0xad)`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                contract: Contract {
                    programs: BTreeMap::new(),
                    gift_hashes: HashMap::new(),
                    claimed: HashSet::new(),
                    verified: HashSet::new(),
                    requests: Vec::new(),
                    admin: wallet(0xad),
                    verifiers: HashSet::new(),
                    global_paused: false,
                    balances: HashMap::new(),
                    allowances: HashMap::new(),
                },
                now: NOW,
                account: Some(wallet(1)),
                wallet_chain: CHAIN_ID,
                send_error: None,
                receipt_plan: ReceiptPlan::Success,
                receipt_delay: 0,
                pending: HashMap::new(),
                next_hash: 1,
                sent: Vec::new(),
                fail_reads: HashSet::new(),
                reads: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ── Setup ────────────────────────────────────────────

    pub fn add_program(&self, mut program: Program) -> u64 {
        let mut s = self.lock();
        let id = s.contract.programs.len() as u64 + 1;
        program.id = id;
        s.contract.programs.insert(id, program);
        id
    }

    fn template(owner: Address, total: u128, per_claim: u128, mode: ProgramMode) -> Program {
        Program {
            id: 0,
            owner,
            total_fund: total,
            remaining_fund: total,
            max_per_claim: per_claim,
            mode,
            status: ProgramStatus::Active,
            cap_per_wallet: 1,
            start: 0,
            end: 0,
            require_verification: false,
        }
    }

    pub fn add_instant_program(&self, owner: Address, total: u128, per_claim: u128) -> u64 {
        self.add_program(Self::template(owner, total, per_claim, ProgramMode::InstantRandomClaim))
    }

    pub fn add_gift_program(&self, owner: Address, total: u128, per_claim: u128, code: &str) -> u64 {
        let id = self.add_program(Self::template(owner, total, per_claim, ProgramMode::GiftCode));
        self.lock().contract.gift_hashes.insert(id, abi::gift_code_hash(code));
        id
    }

    pub fn add_request_program(&self, owner: Address, total: u128, max: u128, verification: bool) -> u64 {
        let mut p = Self::template(owner, total, max, ProgramMode::Request);
        p.require_verification = verification;
        self.add_program(p)
    }

    pub fn update_program(&self, id: u64, f: impl FnOnce(&mut Program)) {
        if let Some(p) = self.lock().contract.programs.get_mut(&id) {
            f(p);
        }
    }

    pub fn mark_claimed(&self, id: u64, w: Address) {
        self.lock().contract.claimed.insert((id, w));
    }

    pub fn unmark_claimed(&self, id: u64, w: Address) {
        self.lock().contract.claimed.remove(&(id, w));
    }

    pub fn set_verified(&self, id: u64, w: Address) {
        self.lock().contract.verified.insert((id, w));
    }

    pub fn add_verifier(&self, w: Address) {
        self.lock().contract.verifiers.insert(w);
    }

    pub fn set_admin(&self, w: Address) {
        self.lock().contract.admin = w;
    }

    pub fn set_global_paused(&self, paused: bool) {
        self.lock().contract.global_paused = paused;
    }

    pub fn set_balance(&self, w: Address, amount: u128) {
        self.lock().contract.balances.insert(w, amount);
    }

    pub fn set_allowance(&self, w: Address, amount: u128) {
        self.lock().contract.allowances.insert(w, amount);
    }

    pub fn set_account(&self, account: Option<Address>) {
        self.lock().account = account;
    }

    pub fn set_wallet_chain(&self, chain: u64) {
        self.lock().wallet_chain = chain;
    }

    pub fn set_now(&self, now: u64) {
        self.lock().now = now;
    }

    /// The next `send` fails in the wallet with `message`.
    pub fn fail_next_send(&self, message: &str) {
        self.lock().send_error = Some(message.to_string());
    }

    pub fn set_receipt_plan(&self, plan: ReceiptPlan) {
        self.lock().receipt_plan = plan;
    }

    /// Receipts of later submissions stay pending for `polls` polls.
    pub fn set_receipt_delay(&self, polls: u32) {
        self.lock().receipt_delay = polls;
    }

    pub fn fail_read(&self, method: &'static str) {
        self.lock().fail_reads.insert(method);
    }

    // ── Inspection ───────────────────────────────────────

    pub fn program(&self, id: u64) -> Option<Program> {
        self.lock().contract.programs.get(&id).cloned()
    }

    pub fn is_claimed(&self, id: u64, w: Address) -> bool {
        self.lock().contract.claimed.contains(&(id, w))
    }

    pub fn is_marked_verified(&self, id: u64, w: Address) -> bool {
        self.lock().contract.verified.contains(&(id, w))
    }

    pub fn requests(&self) -> Vec<(u64, Address, u128)> {
        self.lock().contract.requests.clone()
    }

    pub fn allowance_of(&self, w: Address) -> u128 {
        self.lock().contract.allowances.get(&w).copied().unwrap_or(0)
    }

    pub fn balance_of_now(&self, w: Address) -> u128 {
        self.lock().contract.balances.get(&w).copied().unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<WriteCall> {
        self.lock().sent.clone()
    }

    pub fn read_count(&self, method: &str) -> usize {
        self.lock().reads.get(method).copied().unwrap_or(0)
    }

    fn read(&self, method: &'static str) -> Result<MutexGuard<'_, State>> {
        let mut s = self.lock();
        *s.reads.entry(method).or_insert(0) += 1;
        if s.fail_reads.contains(method) {
            return Err(ClientError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            });
        }
        Ok(s)
    }
}

impl GrantReader for MockChain {
    async fn get_program(&self, id: u64) -> Result<Program> {
        let s = self.read("get_program")?;
        s.contract
            .programs
            .get(&id)
            .cloned()
            .ok_or_else(|| revert("Program not found"))
    }

    async fn can_claim(&self, id: u64, wallet: Address) -> Result<ClaimCheck> {
        let s = self.read("can_claim")?;
        let c = &s.contract;
        let Some(p) = c.programs.get(&id) else {
            return Ok(ClaimCheck { can_claim: false, amount: 0 });
        };
        let amount = p.max_per_claim.min(p.remaining_fund);
        let can = p.status == ProgramStatus::Active
            && amount > 0
            && !c.claimed.contains(&(id, wallet))
            && (!p.require_verification || c.verified.contains(&(id, wallet)));
        Ok(ClaimCheck {
            can_claim: can,
            amount: if can { amount } else { 0 },
        })
    }

    async fn has_claimed(&self, id: u64, wallet: Address) -> Result<bool> {
        Ok(self.read("has_claimed")?.contract.claimed.contains(&(id, wallet)))
    }

    async fn is_verified(&self, id: u64, wallet: Address) -> Result<bool> {
        Ok(self.read("is_verified")?.contract.verified.contains(&(id, wallet)))
    }

    async fn program_count(&self) -> Result<u64> {
        Ok(self.read("program_count")?.contract.programs.len() as u64)
    }

    async fn admin(&self) -> Result<Address> {
        Ok(self.read("admin")?.contract.admin)
    }

    async fn is_verifier(&self, account: Address) -> Result<bool> {
        Ok(self.read("is_verifier")?.contract.verifiers.contains(&account))
    }

    async fn global_paused(&self) -> Result<bool> {
        Ok(self.read("global_paused")?.contract.global_paused)
    }

    async fn balance_of(&self, owner: Address) -> Result<u128> {
        let s = self.read("balance_of")?;
        Ok(s.contract.balances.get(&owner).copied().unwrap_or(0))
    }

    async fn allowance(&self, owner: Address) -> Result<u128> {
        let s = self.read("allowance")?;
        Ok(s.contract.allowances.get(&owner).copied().unwrap_or(0))
    }

    async fn token_decimals(&self) -> Result<u8> {
        self.read("token_decimals")?;
        Ok(2)
    }

    async fn token_symbol(&self) -> Result<String> {
        self.read("token_symbol")?;
        Ok("IDRX".to_string())
    }

    async fn latest_timestamp(&self) -> Result<u64> {
        Ok(self.read("latest_timestamp")?.now)
    }
}

impl Wallet for MockChain {
    async fn account(&self) -> Result<Option<Address>> {
        Ok(self.lock().account)
    }

    async fn chain_id(&self) -> Result<u64> {
        let s = self.read("wallet_chain_id")?;
        if s.account.is_none() {
            return Err(ClientError::WalletUnavailable);
        }
        Ok(s.wallet_chain)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        let mut s = self.lock();
        if s.account.is_none() {
            return Err(ClientError::WalletUnavailable);
        }
        if let Some(message) = s.send_error.take() {
            return Err(ClientError::Rpc { code: 4001, message });
        }
        s.wallet_chain = chain_id;
        Ok(())
    }

    async fn send(&self, from: Address, call: WriteCall) -> Result<TxHash> {
        let mut s = self.lock();
        if s.account.is_none() {
            return Err(ClientError::WalletUnavailable);
        }
        if let Some(message) = s.send_error.take() {
            return Err(ClientError::Rpc { code: 4001, message });
        }
        let reverts = s.receipt_plan == ReceiptPlan::Revert;
        if !reverts {
            s.contract.clone().apply(from, &call)?;
        }
        s.sent.push(call.clone());
        let hash = TxHash(format!("0x{:064x}", s.next_hash));
        let block_number = 100 + s.next_hash;
        s.next_hash += 1;
        let polls_left = s.receipt_delay;
        s.pending.insert(
            hash.0.clone(),
            Pending {
                from,
                call,
                reverts,
                polls_left,
                block_number,
                receipt: None,
            },
        );
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>> {
        let mut guard = self.lock();
        let State {
            pending,
            contract,
            receipt_plan,
            ..
        } = &mut *guard;
        if *receipt_plan == ReceiptPlan::Never {
            return Ok(None);
        }
        let Some(tx) = pending.get_mut(&hash.0) else {
            return Ok(None);
        };
        if tx.polls_left > 0 {
            tx.polls_left -= 1;
            return Ok(None);
        }
        if tx.receipt.is_none() {
            let logs = if tx.reverts {
                None
            } else {
                contract.apply(tx.from, &tx.call).ok()
            };
            tx.receipt = Some(Receipt {
                tx_hash: hash.clone(),
                success: logs.is_some(),
                block_number: tx.block_number,
                logs: logs.unwrap_or_default(),
            });
        }
        Ok(tx.receipt.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn effects_land_with_the_receipt() {
        let chain = MockChain::new();
        chain.set_receipt_delay(1);
        let call = WriteCall::new(Address([7; 20]), abi::approve(grant_address(), 10));

        let hash = chain.send(wallet(1), call).await.unwrap();
        assert_eq!(chain.allowance_of(wallet(1)), 0);
        assert_eq!(chain.receipt(hash.clone()).await.unwrap(), None);

        let receipt = chain.receipt(hash.clone()).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(chain.allowance_of(wallet(1)), 10);
        assert_eq!(chain.receipt(hash).await.unwrap(), Some(receipt));
        assert_eq!(chain.allowance_of(wallet(1)), 10);
    }

    #[tokio::test]
    async fn dry_run_rejects_in_wallet() {
        let chain = MockChain::new();
        let id = chain.add_gift_program(wallet(9), 100, 10, "OK");
        let call = WriteCall::new(grant_address(), abi::claim_gift(id, "BAD"));
        let err = chain.send(wallet(1), call).await.unwrap_err();
        assert!(err.to_string().contains("Invalid code"));
        assert!(chain.sent().is_empty());
    }
}
