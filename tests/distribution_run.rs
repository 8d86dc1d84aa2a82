mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use vision_airdrop::chain::token::{TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};
use vision_airdrop::chain::{AssetProgram, Keypair};
use vision_airdrop::config::DistributionConfig;
use vision_airdrop::storage::{DocumentStore, DOCUMENT_TREE};
use vision_airdrop::{
    Address, DistributionError, DistributionExecutor, DistributionLedger, DistributionPolicy,
    DistributionRequest, HolderRecord, Progress, TransferStatus,
};

use common::{addr, holder, init_test_tracing, signer, MockLedger};

const MINT: u8 = 200;

struct Harness {
    _dir: TempDir,
    ledger: Arc<MockLedger>,
    signer: Arc<Keypair>,
    store: DocumentStore,
    history: DistributionLedger,
}

impl Harness {
    fn new(program: AssetProgram, decimals: u8) -> Self {
        init_test_tracing();
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path().join("airdrop_data")).unwrap();
        let ledger = Arc::new(MockLedger::new());
        ledger.add_asset(addr(MINT), program, decimals);
        Self {
            _dir: dir,
            ledger,
            signer: Arc::new(signer()),
            history: DistributionLedger::new(store.clone()),
            store,
        }
    }

    fn payer(&self) -> Address {
        self.signer.address()
    }

    fn executor(&self, batch_size: usize, batch_pause_ms: u64) -> DistributionExecutor {
        DistributionExecutor::new(
            self.ledger.clone(),
            self.signer.clone(),
            self.history.clone(),
            &DistributionConfig {
                batch_size,
                batch_pause_ms,
            },
        )
    }

    /// Existing, empty asset accounts for every holder
    fn open_accounts(&self, holders: &[HolderRecord], program: AssetProgram) {
        for h in holders {
            self.ledger.fund(&h.address, &addr(MINT), program, 0);
        }
    }
}

fn request(total: f64, holders: Vec<HolderRecord>) -> DistributionRequest {
    DistributionRequest::new(total, addr(MINT), holders)
}

#[tokio::test]
async fn failed_recipient_does_not_stop_the_run() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 10.0), holder(2, 10.0), holder(3, 10.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 100_000_000);
    h.ledger.fail_transfers_to(&addr(2), &addr(MINT), AssetProgram::Legacy);

    let req = request(30.0, holders).with_policy(DistributionPolicy::Equal);
    let run = h.executor(10, 0).execute(req).await.unwrap();

    let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            TransferStatus::Confirmed,
            TransferStatus::Failed,
            TransferStatus::Confirmed
        ]
    );
    assert!(run.results[1].transaction_id.is_none());
    assert!(run.results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("custom program error"));
    assert_eq!(run.results[0].transaction_id.as_deref(), Some("mocksig1"));
    assert_eq!(run.failed_recipients(), vec![addr(2)]);

    assert_eq!(h.ledger.balance_of(&addr(1), &addr(MINT), AssetProgram::Legacy), 10_000_000);
    assert_eq!(h.ledger.balance_of(&addr(2), &addr(MINT), AssetProgram::Legacy), 0);
    assert_eq!(h.ledger.balance_of(&h.payer(), &addr(MINT), AssetProgram::Legacy), 80_000_000);

    let stored = h.history.get(&run.id).unwrap().unwrap();
    assert_eq!(stored, run);
    assert_eq!(stored.request.decimals, Some(6));
}

#[tokio::test]
async fn every_recipient_is_attempted_under_partial_failure() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders: Vec<_> = (1..=6).map(|i| holder(i, i as f64)).collect();
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 1_000_000_000);
    h.ledger.fail_transfers_to(&addr(2), &addr(MINT), AssetProgram::Legacy);
    h.ledger.fail_transfers_to(&addr(5), &addr(MINT), AssetProgram::Legacy);

    let run = h.executor(4, 0).execute(request(21.0, holders)).await.unwrap();
    let summary = run.summary();

    assert_eq!(h.ledger.submissions().len(), 6);
    assert_eq!(summary.recipients, 6);
    assert_eq!(summary.successful + summary.failed, 6);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.confirmed_amount, 21.0 - 2.0 - 5.0);
    assert_eq!(run.failed_recipients(), vec![addr(2), addr(5)]);
}

#[tokio::test]
async fn proportional_split_lands_exactly() {
    let h = Harness::new(AssetProgram::Legacy, 0);
    let holders = vec![holder(1, 100.0), holder(2, 100.0), holder(3, 200.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 7);

    let run = h.executor(10, 0).execute(request(7.0, holders)).await.unwrap();
    assert_eq!(run.summary().successful, 3);

    let got: Vec<u64> = [1, 2, 3]
        .iter()
        .map(|&i| h.ledger.balance_of(&addr(i), &addr(MINT), AssetProgram::Legacy))
        .collect();
    assert_eq!(got, vec![2, 2, 3]);
    assert_eq!(h.ledger.balance_of(&h.payer(), &addr(MINT), AssetProgram::Legacy), 0);
}

#[tokio::test]
async fn insufficient_balance_fails_before_any_transfer() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 10.0), holder(2, 10.0), holder(3, 10.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 5_000_000);

    let err = h.executor(10, 0).execute(request(30.0, holders)).await.unwrap_err();
    assert_eq!(
        err,
        DistributionError::Resource {
            required: 30.0,
            available: 5.0
        }
    );
    assert!(h.ledger.submissions().is_empty());
    assert!(h.history.history(None).unwrap().is_empty());
}

#[tokio::test]
async fn invalid_request_is_rejected_before_touching_the_ledger() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    // unknown asset: any ledger access would surface as a network error
    let req = DistributionRequest::new(0.0, addr(201), vec![holder(1, 1.0)]);
    let err = h.executor(10, 0).execute(req).await.unwrap_err();
    assert!(matches!(err, DistributionError::Validation(_)), "{err:?}");

    let req = DistributionRequest::new(1.0, addr(201), vec![]);
    let err = h.executor(10, 0).execute(req).await.unwrap_err();
    assert!(matches!(err, DistributionError::Validation(_)), "{err:?}");

    let req = DistributionRequest::new(1.0, addr(201), vec![holder(1, 1.0)]).with_batch_size(0);
    let err = h.executor(10, 0).execute(req).await.unwrap_err();
    assert!(matches!(err, DistributionError::Validation(_)), "{err:?}");

    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn no_eligible_recipient_is_a_validation_error() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 100_000_000);

    let req = request(5.0, vec![holder(1, 10.0), holder(2, 20.0)]).with_minimum_holder_balance(50.0);
    let err = h.executor(10, 0).execute(req).await.unwrap_err();
    assert!(matches!(err, DistributionError::Validation(_)), "{err:?}");
    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn unknown_asset_is_a_network_error() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let req = DistributionRequest::new(1.0, addr(201), vec![holder(1, 1.0)]);
    let err = h.executor(10, 0).execute(req).await.unwrap_err();
    match err {
        DistributionError::Network { context, message } => {
            assert!(context.contains(&addr(201).to_string()));
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn minimum_balance_excludes_small_holders() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 10.0), holder(2, 60.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 5_000_000);

    let req = request(5.0, holders).with_minimum_holder_balance(50.0);
    let run = h.executor(10, 0).execute(req).await.unwrap();

    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].recipient, addr(2));
    assert_eq!(run.results[0].raw_amount, 5_000_000);
    assert_eq!(run.results[0].amount, 5.0);
}

#[tokio::test]
async fn progress_fires_after_every_recipient() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders: Vec<_> = (1..=5).map(|i| holder(i, 1.0)).collect();
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 5_000_000);
    h.ledger.fail_transfers_to(&addr(4), &addr(MINT), AssetProgram::Legacy);

    let mut seen: Vec<Progress> = Vec::new();
    h.executor(2, 0)
        .execute_with_progress(request(5.0, holders), |p| seen.push(*p))
        .await
        .unwrap();

    assert_eq!(seen.len(), 5);
    assert_eq!(
        seen.iter().map(|p| p.completed).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
    assert!(seen.iter().all(|p| p.total == 5));
    let last = seen.last().unwrap();
    assert_eq!((last.successful, last.failed), (4, 1));
    assert!(last.rate > 0.0);
}

#[tokio::test]
async fn batches_are_paced() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders: Vec<_> = (1..=5).map(|i| holder(i, 1.0)).collect();
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 5_000_000);

    let started = Instant::now();
    let run = h
        .executor(2, 50)
        .execute(request(5.0, holders))
        .await
        .unwrap();

    // three batches, two pauses
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(run.summary().successful, 5);
    // recipients keep plan order across batches
    assert_eq!(
        run.results.iter().map(|r| r.recipient).collect::<Vec<_>>(),
        (1..=5).map(addr).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn missing_recipient_accounts_are_created_in_the_transfer() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 1.0), holder(2, 1.0)];
    // only the first recipient already has an asset account
    h.ledger.fund(&addr(1), &addr(MINT), AssetProgram::Legacy, 0);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 2_000_000);

    let run = h.executor(10, 0).execute(request(2.0, holders)).await.unwrap();
    assert_eq!(run.summary().successful, 2);

    let submissions = h.ledger.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].len(), 1);
    assert_eq!(submissions[1].len(), 2);
    assert!(h.ledger.has_account(&addr(2), &addr(MINT), AssetProgram::Legacy));
    assert_eq!(h.ledger.balance_of(&addr(2), &addr(MINT), AssetProgram::Legacy), 1_000_000);
}

#[tokio::test]
async fn missing_distributor_account_is_provisioned_first() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 1.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);

    let err = h.executor(10, 0).execute(request(1.0, holders)).await.unwrap_err();
    assert_eq!(
        err,
        DistributionError::Resource {
            required: 1.0,
            available: 0.0
        }
    );

    let submissions = h.ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].len(), 1);
    assert!(h.ledger.has_account(&h.payer(), &addr(MINT), AssetProgram::Legacy));
}

#[tokio::test]
async fn extended_program_assets_use_their_own_program() {
    let h = Harness::new(AssetProgram::Extended, 9);
    let holders = vec![holder(1, 3.0), holder(2, 1.0)];
    h.open_accounts(&holders, AssetProgram::Extended);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Extended, 4_000_000_000);

    let run = h.executor(10, 0).execute(request(4.0, holders)).await.unwrap();
    assert_eq!(run.summary().successful, 2);

    for ixs in h.ledger.submissions() {
        let transfer = ixs.last().unwrap();
        assert_eq!(transfer.program_id, *TOKEN_2022_PROGRAM_ID);
        assert_ne!(transfer.program_id, *TOKEN_PROGRAM_ID);
    }
    assert_eq!(
        h.ledger.balance_of(&addr(1), &addr(MINT), AssetProgram::Extended),
        3_000_000_000
    );
    // legacy-derived accounts were never touched
    assert!(!h.ledger.has_account(&addr(1), &addr(MINT), AssetProgram::Legacy));
}

#[tokio::test]
async fn runs_accumulate_in_history() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 1.0), holder(2, 3.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 100_000_000);

    let executor = h.executor(10, 0);
    let first = executor.execute(request(4.0, holders.clone())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = executor
        .execute(request(2.0, holders).with_policy(DistributionPolicy::Equal))
        .await
        .unwrap();

    let runs = h.history.history(None).unwrap();
    assert_eq!(
        runs.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec![second.id.as_str(), first.id.as_str()]
    );
    assert_eq!(runs[1].results.len(), 2);
    assert_eq!(runs[1].summary().confirmed_amount, 4.0);

    let limited = h.history.history(Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, second.id);
}

#[tokio::test]
async fn run_is_returned_when_it_cannot_be_saved() {
    let h = Harness::new(AssetProgram::Legacy, 6);
    let holders = vec![holder(1, 1.0), holder(2, 1.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, 2_000_000);
    assert!(h.store.db().drop_tree(DOCUMENT_TREE).unwrap());

    let run = h.executor(10, 0).execute(request(2.0, holders)).await.unwrap();
    assert_eq!(run.summary().successful, 2);
    assert_eq!(h.ledger.balance_of(&addr(2), &addr(MINT), AssetProgram::Legacy), 1_000_000);

    // the failure surfaces only to callers reading history directly
    assert!(matches!(h.history.get(&run.id), Err(DistributionError::Storage(_))));
}

#[tokio::test]
async fn total_beyond_asset_precision_is_rejected_before_any_transfer() {
    let h = Harness::new(AssetProgram::Legacy, 9);
    let holders = vec![holder(1, 1.0), holder(2, 1.0)];
    h.open_accounts(&holders, AssetProgram::Legacy);
    h.ledger.fund(&h.payer(), &addr(MINT), AssetProgram::Legacy, u64::MAX);

    let req = request(1e11, holders).with_policy(DistributionPolicy::Equal);
    let err = h.executor(10, 0).execute(req).await.unwrap_err();
    match err {
        DistributionError::Validation(message) => {
            assert!(message.contains("exceeds representable units"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.ledger.submissions().is_empty());
    assert!(h.history.history(None).unwrap().is_empty());
}
