//! Payment rail ledger boundary
//!
//! The service is a client of the ledger (it opens, re-prices and terminates
//! rails) and an arbiter plugged into it (see [`crate::arbitration`]).

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use warm_storage_primitives::{Epoch, RailId, TokenAmount};

/// Errors reported by a payments ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Rail id unknown
    #[error("Rail {0} does not exist")]
    UnknownRail(RailId),

    /// Rail already terminated
    #[error("Rail {0} is terminated")]
    RailTerminated(RailId),

    /// Operator not approved by the client
    #[error("Operator {operator} not approved by client {client}")]
    OperatorNotApproved {
        /// Paying client
        client: Address,
        /// Rail operator
        operator: Address,
    },

    /// Rate increase beyond the operator's allowance
    #[error("Rate allowance exceeded: required {required}, available {available}")]
    RateAllowanceExceeded {
        /// Additional rate
        required: TokenAmount,
        /// Remaining allowance
        available: TokenAmount,
    },

    /// Lockup increase beyond the operator's allowance
    #[error("Lockup allowance exceeded: required {required}, available {available}")]
    LockupAllowanceExceeded {
        /// Additional lockup
        required: TokenAmount,
        /// Remaining allowance
        available: TokenAmount,
    },

    /// Lockup period beyond the operator's approval
    #[error("Lockup period {requested} exceeds approved maximum {max}")]
    LockupPeriodExceeded {
        /// Requested lockup period
        requested: u64,
        /// Approved maximum
        max: u64,
    },

    /// Client account cannot cover the lockup
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Additional lockup
        required: TokenAmount,
        /// Unlocked funds
        available: TokenAmount,
    },

    /// One-time payment exceeds the rail's fixed lockup
    #[error("One-time payment {requested} on rail {rail_id} exceeds fixed lockup {available}")]
    OneTimeExceedsLockup {
        /// Rail
        rail_id: RailId,
        /// Requested payment
        requested: TokenAmount,
        /// Fixed lockup
        available: TokenAmount,
    },
}

/// Parameters of a new rail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailParams {
    /// Payment token
    pub token: Address,
    /// Paying client
    pub from: Address,
    /// Payee
    pub to: Address,
    /// Operator allowed to modify the rail
    pub operator: Address,
    /// Arbiter consulted at settlement
    pub validator: Address,
    /// Operator commission in basis points
    pub commission_bps: u16,
    /// Recipient of the commission
    pub service_fee_recipient: Address,
}

/// Ledger view of one rail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailView {
    /// Payment token
    pub token: Address,
    /// Paying client
    pub from: Address,
    /// Payee
    pub to: Address,
    /// Operator
    pub operator: Address,
    /// Arbiter
    pub validator: Address,
    /// Streaming rate per epoch
    pub payment_rate: TokenAmount,
    /// Epochs of streaming payment held in lockup
    pub lockup_period: u64,
    /// Fixed lockup for one-time payments
    pub lockup_fixed: TokenAmount,
    /// Last payable epoch, zero while active
    pub end_epoch: Epoch,
    /// Commission in basis points
    pub commission_bps: u16,
    /// Recipient of the commission
    pub service_fee_recipient: Address,
}

impl RailView {
    /// Whether the rail was terminated
    pub const fn is_terminated(&self) -> bool {
        self.end_epoch != 0
    }

    fn lockup(&self) -> TokenAmount {
        self.payment_rate
            .saturating_mul(U256::from(self.lockup_period))
            .saturating_add(self.lockup_fixed)
    }
}

/// Client account in one token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    /// Deposited funds
    pub funds: TokenAmount,
    /// Funds held in lockup
    pub lockup_current: TokenAmount,
}

impl AccountView {
    /// Funds not held in lockup
    pub fn available(&self) -> TokenAmount {
        self.funds.saturating_sub(self.lockup_current)
    }
}

/// Client approval of an operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorApproval {
    /// Whether the operator may open rails
    pub is_approved: bool,
    /// Total rate the operator may stream
    pub rate_allowance: TokenAmount,
    /// Total lockup the operator may hold
    pub lockup_allowance: TokenAmount,
    /// Rate currently streamed
    pub rate_usage: TokenAmount,
    /// Lockup currently held
    pub lockup_usage: TokenAmount,
    /// Longest lockup period the operator may set
    pub max_lockup_period: u64,
}

impl OperatorApproval {
    /// Rate allowance left
    pub fn remaining_rate(&self) -> TokenAmount {
        self.rate_allowance.saturating_sub(self.rate_usage)
    }

    /// Lockup allowance left
    pub fn remaining_lockup(&self) -> TokenAmount {
        self.lockup_allowance.saturating_sub(self.lockup_usage)
    }
}

/// Payment rail ledger
pub trait PaymentsLedger {
    /// Open a rail with zero rate and lockup
    fn create_rail(&mut self, params: RailParams) -> Result<RailId, LedgerError>;

    /// Set the lockup period and fixed lockup of a rail
    fn modify_rail_lockup(
        &mut self,
        rail_id: RailId,
        lockup_period: u64,
        lockup_fixed: TokenAmount,
    ) -> Result<(), LedgerError>;

    /// Set the streaming rate and charge a one-time payment from the fixed lockup
    fn modify_rail_payment(
        &mut self,
        rail_id: RailId,
        rate: TokenAmount,
        one_time_payment: TokenAmount,
    ) -> Result<(), LedgerError>;

    /// Terminate a rail at `epoch`, returning its end epoch
    fn terminate_rail(&mut self, rail_id: RailId, epoch: Epoch) -> Result<Epoch, LedgerError>;

    /// Current view of a rail
    fn rail(&self, rail_id: RailId) -> Option<RailView>;

    /// Account of `owner` in `token`
    fn account(&self, token: Address, owner: Address) -> AccountView;

    /// Approval `client` granted `operator` in `token`
    fn operator_approval(
        &self,
        token: Address,
        client: Address,
        operator: Address,
    ) -> OperatorApproval;
}

/// Payments ledger held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayments {
    next_rail_id: RailId,
    rails: BTreeMap<RailId, RailView>,
    accounts: HashMap<(Address, Address), AccountView>,
    approvals: HashMap<(Address, Address, Address), OperatorApproval>,
    payouts: HashMap<(Address, Address), TokenAmount>,
}

impl InMemoryPayments {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `owner`'s account
    pub fn deposit(&mut self, token: Address, owner: Address, amount: TokenAmount) {
        let account = self.accounts.entry((token, owner)).or_default();
        account.funds = account.funds.saturating_add(amount);
    }

    /// Grant `operator` allowances over `client`'s account
    pub fn approve_operator(
        &mut self,
        token: Address,
        client: Address,
        operator: Address,
        rate_allowance: TokenAmount,
        lockup_allowance: TokenAmount,
        max_lockup_period: u64,
    ) {
        let approval = self.approvals.entry((token, client, operator)).or_default();
        approval.is_approved = true;
        approval.rate_allowance = rate_allowance;
        approval.lockup_allowance = lockup_allowance;
        approval.max_lockup_period = max_lockup_period;
    }

    /// One-time payments received by `payee`
    pub fn payouts(&self, token: Address, payee: Address) -> TokenAmount {
        self.payouts.get(&(token, payee)).copied().unwrap_or_default()
    }

    fn live_rail(&self, rail_id: RailId) -> Result<RailView, LedgerError> {
        let rail = self.rails.get(&rail_id).ok_or(LedgerError::UnknownRail(rail_id))?;
        if rail.is_terminated() {
            return Err(LedgerError::RailTerminated(rail_id));
        }
        Ok(rail.clone())
    }

    /// Move `old` to `new`, charging lockup and rate deltas to the client
    fn apply_rail_change(
        &mut self,
        rail_id: RailId,
        old: &RailView,
        new: RailView,
    ) -> Result<(), LedgerError> {
        let old_lockup = old.lockup();
        let new_lockup = new.lockup();

        let account_key = (new.token, new.from);
        let approval_key = (new.token, new.from, new.operator);
        let mut account = self.accounts.get(&account_key).copied().unwrap_or_default();
        let mut approval = self.approvals.get(&approval_key).copied().unwrap_or_default();

        if !approval.is_approved {
            return Err(LedgerError::OperatorNotApproved { client: new.from, operator: new.operator });
        }
        if new.lockup_period > approval.max_lockup_period {
            return Err(LedgerError::LockupPeriodExceeded {
                requested: new.lockup_period,
                max: approval.max_lockup_period,
            });
        }

        if new.payment_rate > old.payment_rate {
            let increase = new.payment_rate - old.payment_rate;
            if increase > approval.remaining_rate() {
                return Err(LedgerError::RateAllowanceExceeded {
                    required: increase,
                    available: approval.remaining_rate(),
                });
            }
            approval.rate_usage += increase;
        } else {
            approval.rate_usage = approval.rate_usage.saturating_sub(old.payment_rate - new.payment_rate);
        }

        if new_lockup > old_lockup {
            let increase = new_lockup - old_lockup;
            if increase > approval.remaining_lockup() {
                return Err(LedgerError::LockupAllowanceExceeded {
                    required: increase,
                    available: approval.remaining_lockup(),
                });
            }
            if increase > account.available() {
                return Err(LedgerError::InsufficientFunds {
                    required: increase,
                    available: account.available(),
                });
            }
            approval.lockup_usage += increase;
            account.lockup_current += increase;
        } else {
            let decrease = old_lockup - new_lockup;
            approval.lockup_usage = approval.lockup_usage.saturating_sub(decrease);
            account.lockup_current = account.lockup_current.saturating_sub(decrease);
        }

        self.accounts.insert(account_key, account);
        self.approvals.insert(approval_key, approval);
        self.rails.insert(rail_id, new);
        Ok(())
    }
}

impl PaymentsLedger for InMemoryPayments {
    fn create_rail(&mut self, params: RailParams) -> Result<RailId, LedgerError> {
        let approval = self.operator_approval(params.token, params.from, params.operator);
        if !approval.is_approved {
            return Err(LedgerError::OperatorNotApproved {
                client: params.from,
                operator: params.operator,
            });
        }

        self.next_rail_id += 1;
        let rail_id = self.next_rail_id;
        self.rails.insert(
            rail_id,
            RailView {
                token: params.token,
                from: params.from,
                to: params.to,
                operator: params.operator,
                validator: params.validator,
                payment_rate: U256::ZERO,
                lockup_period: 0,
                lockup_fixed: U256::ZERO,
                end_epoch: 0,
                commission_bps: params.commission_bps,
                service_fee_recipient: params.service_fee_recipient,
            },
        );
        Ok(rail_id)
    }

    fn modify_rail_lockup(
        &mut self,
        rail_id: RailId,
        lockup_period: u64,
        lockup_fixed: TokenAmount,
    ) -> Result<(), LedgerError> {
        let old = self.live_rail(rail_id)?;
        let new = RailView { lockup_period, lockup_fixed, ..old.clone() };
        self.apply_rail_change(rail_id, &old, new)
    }

    fn modify_rail_payment(
        &mut self,
        rail_id: RailId,
        rate: TokenAmount,
        one_time_payment: TokenAmount,
    ) -> Result<(), LedgerError> {
        let old = self.live_rail(rail_id)?;
        if one_time_payment > old.lockup_fixed {
            return Err(LedgerError::OneTimeExceedsLockup {
                rail_id,
                requested: one_time_payment,
                available: old.lockup_fixed,
            });
        }

        let new = RailView {
            payment_rate: rate,
            lockup_fixed: old.lockup_fixed - one_time_payment,
            ..old.clone()
        };
        self.apply_rail_change(rail_id, &old, new)?;

        if !one_time_payment.is_zero() {
            let account = self.accounts.entry((old.token, old.from)).or_default();
            account.funds = account.funds.saturating_sub(one_time_payment);
            let payout = self.payouts.entry((old.token, old.to)).or_default();
            *payout = payout.saturating_add(one_time_payment);
        }
        Ok(())
    }

    fn terminate_rail(&mut self, rail_id: RailId, epoch: Epoch) -> Result<Epoch, LedgerError> {
        let rail = self.rails.get_mut(&rail_id).ok_or(LedgerError::UnknownRail(rail_id))?;
        if rail.is_terminated() {
            return Err(LedgerError::RailTerminated(rail_id));
        }
        rail.end_epoch = epoch.saturating_add(rail.lockup_period);
        Ok(rail.end_epoch)
    }

    fn rail(&self, rail_id: RailId) -> Option<RailView> {
        self.rails.get(&rail_id).cloned()
    }

    fn account(&self, token: Address, owner: Address) -> AccountView {
        self.accounts.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn operator_approval(
        &self,
        token: Address,
        client: Address,
        operator: Address,
    ) -> OperatorApproval {
        self.approvals.get(&(token, client, operator)).copied().unwrap_or_default()
    }
}
