//! End-to-end flows over the full service surface.

use std::fs;
use tempfile::TempDir;
use ulp_ledger::Pool;
use ulp_query::SearchMode;
use ulp_service::{Service, ServiceConfig};

const CAP: u32 = 2;

fn config_in(temp: &TempDir) -> ServiceConfig {
    ServiceConfig {
        corpus_dir: temp.path().join("corpus"),
        state_dir: temp.path().join("state"),
        daily_cap: CAP,
        referral_bonus: 1,
    }
}

async fn service_with_corpus(temp: &TempDir, lines: &str) -> Service {
    let config = config_in(temp);
    fs::create_dir_all(&config.corpus_dir).expect("corpus dir");
    fs::write(config.corpus_dir.join("dump.txt"), lines).expect("seed corpus");
    Service::start(config).await.expect("start")
}

#[tokio::test]
async fn searches_are_gated_by_credit() {
    let temp = TempDir::new().expect("tempdir");
    let service = service_with_corpus(&temp, "a@test.com:pw1\nb@test.com:pw2\n").await;

    service.get_or_create_account(1, "alice", None);

    for _ in 0..CAP {
        let reply = service
            .search_charged(1, "test.com", SearchMode::Pair)
            .await
            .expect("search")
            .expect("had credit");
        assert_eq!(reply.count, 2);
    }

    // Pools drained: the gate closes before any scanning happens.
    assert!(!service.has_credit(1));
    let gated = service
        .search_charged(1, "test.com", SearchMode::Pair)
        .await
        .expect("search");
    assert!(gated.is_none());
    assert_eq!(service.get_balance(1).expect("balance").total, 0);
}

#[tokio::test]
async fn admin_grant_reopens_the_gate() {
    let temp = TempDir::new().expect("tempdir");
    let service = service_with_corpus(&temp, "a@test.com:pw1\n").await;

    service.get_or_create_account(1, "alice", None);
    while service.consume_one(1, "drain", "-") {}
    assert!(service
        .search_charged(1, "test.com", SearchMode::Pair)
        .await
        .expect("search")
        .is_none());

    // Granting to a brand-new id must also work (auto-creation).
    service.grant(99, 1, Pool::Bonus, 1000).expect("grant new");
    assert!(service.has_credit(99));

    service.grant(1, 1, Pool::Bonus, 1000).expect("grant");
    let reply = service
        .search_charged(1, "test.com", SearchMode::Pair)
        .await
        .expect("search")
        .expect("bonus credit opened the gate");
    assert_eq!(reply.results, vec!["a@test.com:pw1"]);
}

#[tokio::test]
async fn referral_code_pays_the_referrer() {
    let temp = TempDir::new().expect("tempdir");
    let service = service_with_corpus(&temp, "").await;

    let alice = service.get_or_create_account(1, "alice", None);
    let bob = service.get_or_create_account(2, "bob", Some(&alice.referral_code));
    assert_eq!(bob.referred_by, Some(1));

    let balance = service.get_balance(1).expect("balance");
    assert_eq!(balance.bonus, 1);

    let info = service.referral_info(1).expect("info");
    assert_eq!(info.referrals, 1);
    assert_eq!(info.referral_code, alice.referral_code);

    // Bob cannot refer himself with his own code.
    let carol = service.get_or_create_account(3, "carol", Some("UNKNOWNCODE"));
    assert_eq!(carol.referred_by, None);
}

#[tokio::test]
async fn ingested_file_is_searchable_immediately() {
    let temp = TempDir::new().expect("tempdir");
    let service = service_with_corpus(&temp, "old@test.com:pw\n").await;

    let outside = TempDir::new().expect("tempdir");
    let dump = outside.path().join("fresh.txt");
    fs::write(&dump, "fresh@test.com:pw2\n").expect("write dump");

    service.ingest_file(&dump).await.expect("ingest");

    let reply = service
        .search("test.com", SearchMode::Pair)
        .await
        .expect("search");
    assert_eq!(
        reply.results,
        vec!["old@test.com:pw", "fresh@test.com:pw2"]
    );

    let stats = service.stats().await.expect("stats");
    assert_eq!(stats.corpus.files, 2);
    assert_eq!(stats.corpus.lines, 2);
    assert_eq!(stats.ledger.accounts, 0);
}

#[tokio::test]
async fn failed_gate_consumes_no_credit_and_returns_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let service = service_with_corpus(&temp, "a@test.com:pw1\n").await;

    // Unknown account: gate closed, nothing consumed, nothing scanned.
    let reply = service
        .search_charged(404, "test.com", SearchMode::Pair)
        .await
        .expect("search");
    assert!(reply.is_none());
    assert!(service.get_balance(404).is_err());
}
