//! Integration tests for the execution runtime: savepoint rollback,
//! re-entrant value receivers, and ledger conservation under random load.

use std::sync::Arc;

use bursar_contracts::{
    Call, Chain, Event, ExecutionError, GenesisConfig, InstitutionError, InstitutionEvent,
    NativeTransfer, Transaction, ValueReceiver,
};
use bursar_protocol::config::{tenths, MAX_CALL_DEPTH};
use bursar_protocol::{AccountId, Amount};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn id(label: &str) -> AccountId {
    AccountId::from_label(label)
}

fn admin() -> AccountId {
    id("admin")
}

fn school() -> AccountId {
    id("school")
}

/// Chain with a funded native treasury and one registered payee, "tutor".
fn staffed_chain() -> Chain {
    let mut config = GenesisConfig::reference(admin(), school());
    config.native_allocations.insert(id("parent"), tenths(10));
    let mut chain = Chain::from_genesis(&config).unwrap();
    chain
        .submit(id("parent"), tenths(4), Call::RegisterPayer { name: "Parent".into(), tier: 400 })
        .unwrap();
    chain
        .submit(admin(), 0, Call::RegisterPayee { account: id("tutor"), name: "Tutor".into() })
        .unwrap();
    chain
}

fn pay_tutor(chain: &mut Chain, amount: Amount) -> Result<bursar_contracts::Receipt, ExecutionError> {
    chain.submit(
        admin(),
        amount,
        Call::PaySalaryNative { account: id("tutor"), amount },
    )
}

/// Captures everything the caller can observe, for before/after comparison.
fn fingerprint(chain: &Chain) -> String {
    serde_json::to_string(&(
        chain.institution().payees().collect::<Vec<_>>(),
        chain.institution().payers().collect::<Vec<_>>(),
        chain.institution().native_treasury(),
        chain.institution().token_treasury(),
        chain.ledger().total_supply(),
        chain.native_balance_of(admin()),
        chain.native_balance_of(school()),
        chain.native_balance_of(id("tutor")),
        chain.events().len(),
    ))
    .unwrap()
}

// ---------------------------------------------------------------------------
// Re-entrancy
// ---------------------------------------------------------------------------

/// Chain where the admin is also on the payroll, so a hook on the admin's
/// account re-enters with admin rights.
fn self_paying_chain() -> Chain {
    let mut chain = staffed_chain();
    chain
        .submit(admin(), 0, Call::RegisterPayee { account: admin(), name: "Admin".into() })
        .unwrap();
    chain
}

fn pay_admin(chain: &mut Chain, amount: Amount) -> Result<bursar_contracts::Receipt, ExecutionError> {
    chain.submit(
        admin(),
        amount,
        Call::PaySalaryNative { account: admin(), amount },
    )
}

/// Tries to collect a second salary from inside the first one.
struct DoubleDipper {
    observed_paid: Mutex<Vec<bool>>,
    nested_errors: Mutex<Vec<String>>,
}

impl ValueReceiver for DoubleDipper {
    fn on_value_received(
        &self,
        tx: &mut Transaction<'_>,
        transfer: &NativeTransfer,
    ) -> Result<(), ExecutionError> {
        let paid = tx
            .state()
            .institution
            .payee(transfer.to)
            .map(|p| p.salary_paid)
            .unwrap_or(false);
        self.observed_paid.lock().push(paid);

        let again = tx.call(
            transfer.amount,
            Call::PaySalaryNative { account: transfer.to, amount: transfer.amount },
        );
        if let Err(e) = again {
            self.nested_errors.lock().push(e.code().to_string());
        }
        Ok(())
    }
}

#[test]
fn reentrant_receiver_sees_committed_flag_and_cannot_double_dip() {
    let mut chain = self_paying_chain();
    let dipper = Arc::new(DoubleDipper {
        observed_paid: Mutex::new(Vec::new()),
        nested_errors: Mutex::new(Vec::new()),
    });
    chain.register_receiver(admin(), dipper.clone());
    let admin_before = chain.native_balance_of(admin());

    pay_admin(&mut chain, tenths(1)).unwrap();

    assert_eq!(*dipper.observed_paid.lock(), vec![true]);
    assert_eq!(*dipper.nested_errors.lock(), vec!["SalaryAlreadyPaid".to_string()]);
    // The attached value went out and came straight back as salary.
    assert_eq!(chain.native_balance_of(admin()), admin_before);
    assert_eq!(chain.institution().native_treasury(), tenths(3));

    let salaries = chain
        .events()
        .events()
        .filter(|e| matches!(e, Event::Institution(InstitutionEvent::SalaryPaid { .. })))
        .count();
    assert_eq!(salaries, 1);
}

/// Tries to use the admin's identity and funds from a payee's hook.
struct Impersonator {
    seen_as: Mutex<Vec<AccountId>>,
    nested_errors: Mutex<Vec<String>>,
}

impl ValueReceiver for Impersonator {
    fn on_value_received(
        &self,
        tx: &mut Transaction<'_>,
        _transfer: &NativeTransfer,
    ) -> Result<(), ExecutionError> {
        self.seen_as.lock().push(tx.caller());
        let attempts = [
            (0, Call::RegisterPayee { account: id("crony"), name: "Crony".into() }),
            (tenths(4), Call::RegisterPayer { name: "Admin".into(), tier: 400 }),
        ];
        for (value, call) in attempts {
            if let Err(e) = tx.call(value, call) {
                self.nested_errors.lock().push(e.code().to_string());
            }
        }
        Ok(())
    }
}

#[test]
fn hooks_reenter_only_as_the_receiving_account() {
    let mut chain = staffed_chain();
    let hook = Arc::new(Impersonator {
        seen_as: Mutex::new(Vec::new()),
        nested_errors: Mutex::new(Vec::new()),
    });
    chain.register_receiver(id("tutor"), hook.clone());
    let admin_before = chain.native_balance_of(admin());

    pay_tutor(&mut chain, tenths(1)).unwrap();

    assert_eq!(*hook.seen_as.lock(), vec![id("tutor")]);
    assert_eq!(
        *hook.nested_errors.lock(),
        vec!["Unauthorized".to_string(), "InsufficientFunds".to_string()]
    );
    assert!(chain.institution().payee(id("crony")).is_none());
    assert!(chain.institution().payer(admin()).is_none());
    assert!(chain.institution().payer(id("tutor")).is_none());
    assert_eq!(chain.native_balance_of(admin()), admin_before - tenths(1));
    assert_eq!(chain.native_balance_of(id("tutor")), tenths(1));
}

/// Spends the salary on tuition as soon as it arrives, then optionally
/// refuses the payment afterwards.
struct Reinvestor {
    refuse_after: bool,
}

impl ValueReceiver for Reinvestor {
    fn on_value_received(
        &self,
        tx: &mut Transaction<'_>,
        transfer: &NativeTransfer,
    ) -> Result<(), ExecutionError> {
        tx.call(
            transfer.amount,
            Call::RegisterPayer { name: "Tutor as student".into(), tier: 100 },
        )?;
        if self.refuse_after {
            return Err(ExecutionError::NonPayable { call: "on_value_received" });
        }
        Ok(())
    }
}

#[test]
fn nested_call_commits_with_the_outer_call() {
    let mut chain = staffed_chain();
    chain.register_receiver(id("tutor"), Arc::new(Reinvestor { refuse_after: false }));

    let receipt = pay_tutor(&mut chain, tenths(1)).unwrap();

    // Nested registration events land before the outer salary notification.
    let kinds: Vec<&str> = receipt
        .events
        .iter()
        .map(|r| match &r.event {
            Event::Institution(InstitutionEvent::PayerRegistered { .. }) => "payer_registered",
            Event::Institution(InstitutionEvent::PaymentReceived { .. }) => "payment_received",
            Event::Institution(InstitutionEvent::SalaryPaid { .. }) => "salary_paid",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["payer_registered", "payment_received", "salary_paid"]);

    assert!(chain.institution().payer(id("tutor")).is_some());
    assert_eq!(chain.native_balance_of(id("tutor")), 0);
    // 0.4 in, 0.1 out as salary, 0.1 back in as tuition.
    assert_eq!(chain.institution().native_treasury(), tenths(4));
}

#[test]
fn outer_failure_unwinds_nested_commits() {
    let mut chain = staffed_chain();
    chain.register_receiver(id("tutor"), Arc::new(Reinvestor { refuse_after: true }));
    let before = fingerprint(&chain);

    let err = pay_tutor(&mut chain, tenths(1)).unwrap_err();
    match err {
        ExecutionError::Institution(InstitutionError::PaymentFailed { account, reason }) => {
            assert_eq!(account, id("tutor"));
            assert!(reason.contains("does not accept native value"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(fingerprint(&chain), before);
    assert!(chain.institution().payer(id("tutor")).is_none());
}

/// Keeps paying itself again from inside every payment.
struct Recurser {
    deepest: Mutex<usize>,
}

impl ValueReceiver for Recurser {
    fn on_value_received(
        &self,
        tx: &mut Transaction<'_>,
        transfer: &NativeTransfer,
    ) -> Result<(), ExecutionError> {
        {
            let mut deepest = self.deepest.lock();
            *deepest = (*deepest).max(tx.depth());
        }
        tx.call(0, Call::ResetPayCycle { account: transfer.to })?;
        tx.call(
            transfer.amount,
            Call::PaySalaryNative { account: transfer.to, amount: transfer.amount },
        )
    }
}

#[test]
fn runaway_recursion_hits_the_depth_limit_and_reverts() {
    let mut chain = self_paying_chain();
    let recurser = Arc::new(Recurser { deepest: Mutex::new(0) });
    chain.register_receiver(admin(), recurser.clone());
    let before = fingerprint(&chain);

    let err = pay_admin(&mut chain, 1).unwrap_err();

    assert_eq!(err.code(), "PaymentFailed");
    assert!(err.to_string().contains("call depth limit"));
    assert_eq!(*recurser.deepest.lock(), MAX_CALL_DEPTH);
    assert_eq!(fingerprint(&chain), before);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn every_failure_leaves_state_and_log_untouched() {
    let mut chain = staffed_chain();
    chain
        .submit(id("parent"), 0, Call::Mint { account: id("parent"), amount: 1_000 })
        .unwrap();
    let before = fingerprint(&chain);
    let parent_native = chain.native_balance_of(id("parent"));

    let failures = [
        (id("parent"), 0, Call::Transfer { to: AccountId::ZERO, amount: 1 }),
        (id("parent"), 0, Call::Transfer { to: id("x"), amount: 1_001 }),
        (id("parent"), 0, Call::Approve { spender: id("x"), amount: 0 }),
        (id("x"), 0, Call::TransferFrom { from: id("parent"), to: id("x"), amount: 1 }),
        (id("parent"), 0, Call::Mint { account: id("x"), amount: Amount::MAX }),
        (id("parent"), tenths(1), Call::RegisterPayer { name: "P".into(), tier: 100 }),
        (id("parent"), 5, Call::Mint { account: id("x"), amount: 1 }),
        (admin(), tenths(9), Call::PaySalaryNative { account: id("tutor"), amount: tenths(9) }),
    ];
    for (caller, value, call) in failures {
        let name = call.name();
        assert!(chain.submit(caller, value, call).is_err(), "{name} should fail");
        assert_eq!(fingerprint(&chain), before, "{name} left a trace");
        assert_eq!(chain.native_balance_of(id("parent")), parent_native);
    }
}

#[test]
fn failed_calls_do_not_consume_log_positions() {
    let mut chain = staffed_chain();
    let next = chain.events().len() as u64;

    let _ = chain.submit(id("nobody"), 0, Call::Transfer { to: id("x"), amount: 1 });
    let receipt = chain
        .submit(id("nobody"), 0, Call::Mint { account: id("nobody"), amount: 7 })
        .unwrap();

    assert_eq!(receipt.events[0].sequence, next);
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[test]
fn random_calls_conserve_supply_and_native_value() {
    let mut config = GenesisConfig::reference(admin(), school());
    let accounts: Vec<AccountId> = ["a", "b", "c", "d", "e"].iter().map(|l| id(l)).collect();
    for account in &accounts {
        config.native_allocations.insert(*account, tenths(20));
    }
    let mut chain = Chain::from_genesis(&config).unwrap();
    let native_total = chain.state().native.total();

    let mut rng = StdRng::seed_from_u64(0xB0B5);
    for _ in 0..2_000 {
        let x = accounts[rng.gen_range(0..accounts.len())];
        let y = accounts[rng.gen_range(0..accounts.len())];
        let z = accounts[rng.gen_range(0..accounts.len())];
        let amount: Amount = rng.gen_range(0..tenths(5));
        let (caller, value, call) = match rng.gen_range(0..6) {
            0 => (x, 0, Call::Mint { account: y, amount }),
            1 => (x, 0, Call::Transfer { to: y, amount }),
            2 => (x, 0, Call::Approve { spender: y, amount }),
            3 => (x, 0, Call::TransferFrom { from: y, to: z, amount }),
            4 => {
                let tier = [100, 200, 300, 400][rng.gen_range(0..4)];
                (x, tenths(tier as Amount / 100), Call::RegisterPayer { name: "R".into(), tier })
            }
            _ => (x, 0, Call::RegisterPayerViaLedger { amount: tenths(1), name: "T".into(), tier: 100 }),
        };
        let _ = chain.submit(caller, value, call);

        let ledger = chain.ledger();
        assert_eq!(ledger.balances_sum(), ledger.total_supply());
        assert_eq!(chain.state().native.total(), native_total);
        assert_eq!(
            chain.institution().native_treasury(),
            chain.native_balance_of(school())
        );
    }
}
