#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use futures::StreamExt;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use shared::models::*;
    use shared::{identity_key, parse_candidate, parse_round_id, RejectReason};
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    use crate::build_rocket;
    use crate::config::{Config, ConfigError, IdentityMode};
    use crate::cors::CORS;
    use crate::ledger::RetryPolicy;
    use crate::rate_limiter::RateLimiter;
    use crate::service::VoteService;
    use crate::store::{InsertOutcome, MemoryStore, StoreError, VoteStore};
    use crate::tally::TallyAggregator;
    use crate::utils::init_test_tracing;
    use crate::verifier::IdentityVerifier;

    const TRUST_KEY: &str = "frame-host-test-key";

    fn candidate(symbol: &str) -> Candidate {
        parse_candidate(symbol).unwrap()
    }

    fn round_between(id: &str, starts_at: OffsetDateTime, ends_at: OffsetDateTime) -> VotingRound {
        VotingRound {
            id: parse_round_id(id).unwrap(),
            title: "$POPCAT vs $BRETT".into(),
            starts_at,
            ends_at,
            candidates: vec![candidate("POPCAT"), candidate("BRETT")],
        }
    }

    fn open_round(id: &str) -> VotingRound {
        let now = OffsetDateTime::now_utc();
        round_between(id, now - Duration::hours(1), now + Duration::hours(1))
    }

    fn closed_round(id: &str) -> VotingRound {
        let now = OffsetDateTime::now_utc();
        round_between(id, now - Duration::days(2), now - Duration::days(1))
    }

    fn upcoming_round(id: &str) -> VotingRound {
        let now = OffsetDateTime::now_utc();
        round_between(id, now + Duration::days(1), now + Duration::days(2))
    }

    fn service(rounds: Vec<VotingRound>, store: Arc<MemoryStore>) -> VoteService {
        service_with_timeout(rounds, store, StdDuration::from_secs(2))
    }

    fn service_with_timeout(rounds: Vec<VotingRound>, store: Arc<MemoryStore>, step_timeout: StdDuration) -> VoteService {
        init_test_tracing();
        VoteService::new(
            rounds,
            IdentityVerifier::new_with_key(TRUST_KEY),
            store,
            RetryPolicy { attempts: 3, backoff: StdDuration::from_millis(1) },
            step_timeout,
        )
    }

    fn claim(service: &VoteService, fid: u64) -> IdentityClaim {
        IdentityClaim {
            fid: Some(fid),
            profile: Profile { username: Some(format!("voter{fid}")), ..Default::default() },
            proof: service.verifier().issue(fid, OffsetDateTime::now_utc(), Duration::minutes(10)),
        }
    }

    fn request(claim: IdentityClaim, symbol: &str) -> SubmitVoteRequest {
        SubmitVoteRequest { claim, candidate: symbol.into(), ballot: BallotMeta::default() }
    }

    fn rid(id: &str) -> RoundId {
        parse_round_id(id).unwrap()
    }

    fn stored_vote(round: &VotingRound, fid: u64, symbol: &str) -> Vote {
        Vote {
            id: Uuid::new_v4(),
            round_id: round.id.clone(),
            identity: identity_key(fid).unwrap(),
            candidate: candidate(symbol),
            cast_at: OffsetDateTime::now_utc(),
            wallet_address: None,
            signature: None,
            profile: Profile::default(),
        }
    }

    #[tokio::test]
    async fn test_votes_are_tallied_and_duplicates_rejected() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(vec![open_round("meme")], store.clone());
        let round = rid("meme");

        for (fid, symbol) in [(1, "POPCAT"), (2, "POPCAT"), (3, "BRETT")] {
            let result = svc.submit(&round, request(claim(&svc, fid), symbol)).await;
            assert!(result.is_accepted(), "{:?}", result);
            assert_eq!(result.snapshot.as_ref().unwrap().total, fid);
        }

        let duplicate = svc.submit(&round, request(claim(&svc, 1), "BRETT")).await;
        assert_eq!(duplicate.reason, Some(RejectReason::AlreadyVoted));
        assert!(!duplicate.retryable);

        let snapshot = svc.snapshot(&round).unwrap();
        assert_eq!(snapshot.votes_for(&candidate("POPCAT")), Some(2));
        assert_eq!(snapshot.votes_for(&candidate("BRETT")), Some(1));
        assert_eq!(duplicate.snapshot, Some(snapshot));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_accept_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Some(StdDuration::from_millis(2)));
        let svc = service(vec![open_round("meme")], store.clone());
        let round = rid("meme");

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let svc = svc.clone();
                let round = round.clone();
                let req = request(claim(&svc, 77), if i % 2 == 0 { "POPCAT" } else { "BRETT" });
                tokio::spawn(async move { svc.submit(&round, req).await })
            })
            .collect();

        let mut accepted = 0;
        let mut duplicates = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            match result.reason {
                None => accepted += 1,
                Some(RejectReason::AlreadyVoted) => duplicates += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(duplicates, 31);
        assert_eq!(store.len(), 1);
        assert_eq!(svc.snapshot(&round).unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_neutral_and_one_sided_snapshots() {
        let svc = service(vec![open_round("meme")], Arc::new(MemoryStore::new()));
        let round = rid("meme");

        let empty = svc.snapshot(&round).unwrap();
        assert!(empty.is_neutral());
        assert_eq!(empty.share_of(&candidate("POPCAT")), Some(50.0));
        assert_eq!(empty.share_of(&candidate("BRETT")), Some(50.0));

        for fid in 1..=4 {
            assert!(svc.submit(&round, request(claim(&svc, fid), "$brett")).await.is_accepted());
        }
        let snapshot = svc.snapshot(&round).unwrap();
        assert_eq!(snapshot.votes_for(&candidate("BRETT")), Some(4));
        assert_eq!(snapshot.votes_for(&candidate("POPCAT")), Some(0));
        assert_eq!(snapshot.share_of(&candidate("BRETT")), Some(100.0));
    }

    #[tokio::test]
    async fn test_recount_agrees_with_incremental_tally() {
        let svc = service(vec![open_round("meme")], Arc::new(MemoryStore::new()));
        let round = rid("meme");

        for fid in 1..=40 {
            let symbol = if fid % 3 == 0 { "POPCAT" } else { "BRETT" };
            svc.submit(&round, request(claim(&svc, fid), symbol)).await;
            if fid % 10 == 0 {
                assert_eq!(svc.recount(&round).await.unwrap(), svc.snapshot(&round).unwrap());
            }
        }
        let report = svc.recover().await;
        assert_eq!(report[0].drift, 0);
        assert_eq!(report[0].total, 40);
    }

    #[tokio::test]
    async fn test_closed_round_rejects_everyone() {
        let svc = service(vec![closed_round("done")], Arc::new(MemoryStore::new()));
        let round = rid("done");

        let valid = svc.submit(&round, request(claim(&svc, 1), "POPCAT")).await;
        let bad_candidate = svc.submit(&round, request(claim(&svc, 2), "DOGE")).await;
        let no_identity = svc.submit(&round, request(IdentityClaim::default(), "POPCAT")).await;

        for result in [valid, bad_candidate, no_identity] {
            assert_eq!(result.reason, Some(RejectReason::RoundClosed));
            assert_eq!(result.snapshot.unwrap().total, 0);
        }
    }

    #[tokio::test]
    async fn test_round_state_and_candidate_errors() {
        let svc = service(vec![open_round("meme"), upcoming_round("later")], Arc::new(MemoryStore::new()));

        let early = svc.submit(&rid("later"), request(claim(&svc, 1), "POPCAT")).await;
        assert_eq!(early.reason, Some(RejectReason::RoundNotOpen));

        let missing = svc.submit(&rid("nope"), request(claim(&svc, 1), "POPCAT")).await;
        assert_eq!(missing.reason, Some(RejectReason::NoSuchRound));
        assert!(missing.snapshot.is_none());

        let unknown = svc.submit(&rid("meme"), request(claim(&svc, 1), "DOGE")).await;
        assert_eq!(unknown.reason, Some(RejectReason::InvalidCandidate));

        let garbage = svc.submit(&rid("meme"), request(claim(&svc, 1), "$$$")).await;
        assert_eq!(garbage.reason, Some(RejectReason::InvalidCandidate));

        let mut bad_wallet = request(claim(&svc, 1), "POPCAT");
        bad_wallet.ballot.wallet_address = Some("not-a-wallet".into());
        let malformed = svc.submit(&rid("meme"), bad_wallet).await;
        assert_eq!(malformed.reason, Some(RejectReason::Malformed));

        // None of the rejections above used up the identity.
        assert!(svc.submit(&rid("meme"), request(claim(&svc, 1), "POPCAT")).await.is_accepted());
    }

    #[tokio::test]
    async fn test_unverifiable_claims_never_touch_the_ledger() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(vec![open_round("meme")], store.clone());
        let round = rid("meme");
        let forger = IdentityVerifier::new_with_key("someone-else");
        let now = OffsetDateTime::now_utc();

        let mut no_proof = claim(&svc, 5);
        no_proof.proof = None;

        let mut forged = claim(&svc, 5);
        forged.proof = forger.issue(5, now, Duration::minutes(5));

        let mut borrowed = claim(&svc, 5);
        borrowed.proof = svc.verifier().issue(6, now, Duration::minutes(5));

        let mut expired = claim(&svc, 5);
        expired.proof = svc.verifier().issue(5, now - Duration::hours(1), Duration::minutes(5));

        let mut garbled = claim(&svc, 5);
        garbled.proof = Some("definitely.not-a-proof".into());

        let cases = [
            (IdentityClaim::default(), RejectReason::Malformed),
            (no_proof, RejectReason::Malformed),
            (garbled, RejectReason::Malformed),
            (forged, RejectReason::UntrustedIssuer),
            (borrowed, RejectReason::UntrustedIssuer),
            (expired, RejectReason::Expired),
        ];
        for (claim, reason) in cases {
            let result = svc.submit(&round, request(claim, "POPCAT")).await;
            assert_eq!(result.reason, Some(reason));
        }

        assert!(store.is_empty());
        assert_eq!(svc.snapshot(&round).unwrap().total, 0);
    }

    #[test]
    fn test_unverified_mode_is_explicit() {
        let verifier = IdentityVerifier::from_mode(&IdentityMode::Unverified);
        assert!(!verifier.is_verifying());
        assert!(verifier.issue(1, OffsetDateTime::now_utc(), Duration::minutes(1)).is_none());

        let claim = IdentityClaim { fid: Some(9), ..Default::default() };
        assert_eq!(verifier.verify_at(&claim, OffsetDateTime::now_utc()).unwrap().key.fid(), 9);
        assert_eq!(
            verifier.verify_at(&IdentityClaim::default(), OffsetDateTime::now_utc()),
            Err(RejectReason::Malformed)
        );

        let strict = IdentityVerifier::new_with_key(TRUST_KEY);
        assert!(strict.is_verifying());
        assert_eq!(strict.verify_at(&claim, OffsetDateTime::now_utc()), Err(RejectReason::Malformed));
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(vec![open_round("meme")], store.clone());
        let round = rid("meme");

        store.fail_next(2);
        assert!(svc.submit(&round, request(claim(&svc, 1), "POPCAT")).await.is_accepted());

        store.fail_next(10);
        let result = svc.submit(&round, request(claim(&svc, 2), "POPCAT")).await;
        assert_eq!(result.reason, Some(RejectReason::Unavailable));
        assert!(result.retryable);

        store.fail_next(0);
        assert!(svc.submit(&round, request(claim(&svc, 2), "POPCAT")).await.is_accepted());
        assert_eq!(svc.snapshot(&round).unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_timeout_is_retryable_and_never_double_counts() {
        let store = Arc::new(MemoryStore::new());
        let svc = service_with_timeout(vec![open_round("meme")], store.clone(), StdDuration::from_millis(20));
        let round = rid("meme");

        store.set_latency(Some(StdDuration::from_millis(150)));
        let result = svc.submit(&round, request(claim(&svc, 3), "BRETT")).await;
        assert_eq!(result.reason, Some(RejectReason::Timeout));
        assert!(result.retryable);

        // The abandoned insert still lands and is counted.
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        store.set_latency(None);
        assert_eq!(svc.snapshot(&round).unwrap().total, 1);

        let retry = svc.submit(&round, request(claim(&svc, 3), "BRETT")).await;
        assert_eq!(retry.reason, Some(RejectReason::AlreadyVoted));
        assert_eq!(store.len(), 1);
        assert_eq!(svc.snapshot(&round).unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_non_decreasing_totals() {
        let svc = service(vec![open_round("meme")], Arc::new(MemoryStore::new()));
        let round = rid("meme");

        let mut updates = svc.subscribe(&round).unwrap();
        assert_eq!(svc.fanout().subscriber_count(&round), 1);
        let first = updates.next().await.unwrap();
        assert!(first.is_neutral());

        for fid in 1..=3 {
            svc.submit(&round, request(claim(&svc, fid), "POPCAT")).await;
        }

        let mut last = first.total;
        loop {
            let snapshot = tokio::time::timeout(StdDuration::from_secs(1), updates.next())
                .await
                .expect("no tally update delivered")
                .unwrap();
            assert!(snapshot.total >= last);
            last = snapshot.total;
            if last == 3 {
                break;
            }
        }

        // A late subscriber starts from the current state.
        let mut late = svc.subscribe(&round).unwrap();
        assert_eq!(late.next().await.unwrap().total, 3);

        drop(updates);
        drop(late);
        assert_eq!(svc.fanout().subscriber_count(&round), 0);
        assert!(svc.subscribe(&rid("nope")).is_none());
    }

    #[tokio::test]
    async fn test_reconcile_recovers_missed_votes() {
        let store = Arc::new(MemoryStore::new());
        let meme = open_round("meme");
        let svc = service(vec![meme.clone()], store.clone());

        svc.submit(&meme.id, request(claim(&svc, 1), "POPCAT")).await;
        assert_eq!(
            store.insert_external(stored_vote(&meme, 2, "BRETT")),
            Ok(InsertOutcome::Inserted)
        );
        assert_eq!(svc.snapshot(&meme.id).unwrap().total, 1);

        let mut updates = svc.subscribe(&meme.id).unwrap();
        assert_eq!(updates.next().await.unwrap().total, 1);

        let reports = svc.reconcile().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].drift, 1);
        assert_eq!(reports[0].total, 2);
        assert_eq!(updates.next().await.unwrap().total, 2);

        assert!(svc.reconcile().await.is_empty());
        assert_eq!(svc.recount(&meme.id).await.unwrap(), svc.snapshot(&meme.id).unwrap());
    }

    #[tokio::test]
    async fn test_startup_recovery_rebuilds_counts() {
        let store = Arc::new(MemoryStore::new());
        let meme = open_round("meme");
        for (fid, symbol) in [(1, "POPCAT"), (2, "BRETT"), (3, "BRETT")] {
            store.insert_external(stored_vote(&meme, fid, symbol)).unwrap();
        }

        let svc = service(vec![meme.clone()], store.clone());
        assert_eq!(svc.snapshot(&meme.id).unwrap().total, 0);

        let reports = svc.recover().await;
        assert_eq!(reports[0].drift, 3);
        let snapshot = svc.snapshot(&meme.id).unwrap();
        assert_eq!(snapshot.votes_for(&candidate("BRETT")), Some(2));

        let again = svc.submit(&meme.id, request(claim(&svc, 2), "POPCAT")).await;
        assert_eq!(again.reason, Some(RejectReason::AlreadyVoted));
    }

    #[test]
    fn test_repeated_notification_is_counted_once() {
        let meme = open_round("meme");
        let aggregator = TallyAggregator::new(std::slice::from_ref(&meme));
        let vote = stored_vote(&meme, 8, "POPCAT");

        assert_eq!(aggregator.on_vote_accepted(&vote).unwrap().total, 1);
        assert_eq!(aggregator.on_vote_accepted(&vote).unwrap().total, 1);
        assert!(aggregator.has_counted(&meme.id, vote.identity));

        let stray = stored_vote(&open_round("other"), 9, "POPCAT");
        assert!(aggregator.on_vote_accepted(&stray).is_none());
    }

    #[tokio::test]
    async fn test_find_vote() {
        let svc = service(vec![open_round("meme")], Arc::new(MemoryStore::new()));
        let round = rid("meme");
        let mut req = request(claim(&svc, 12), "BRETT");
        req.ballot.wallet_address = Some("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into());
        svc.submit(&round, req).await;

        let vote = svc.find_vote(&round, identity_key(12).unwrap()).await.unwrap().unwrap();
        assert_eq!(vote.candidate, candidate("BRETT"));
        assert_eq!(vote.wallet_address.as_deref(), Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert_eq!(vote.profile.username.as_deref(), Some("voter12"));

        assert!(svc.find_vote(&round, identity_key(13).unwrap()).await.unwrap().is_none());
        assert_eq!(
            svc.find_vote(&rid("nope"), identity_key(12).unwrap()).await,
            Err(RejectReason::NoSuchRound)
        );
    }

    #[tokio::test]
    async fn test_memory_store_uniqueness() {
        let store = MemoryStore::new();
        let meme = open_round("meme");
        let other = open_round("other");

        assert_eq!(store.insert_if_absent(&stored_vote(&meme, 1, "POPCAT")).await, Ok(InsertOutcome::Inserted));
        assert_eq!(store.insert_if_absent(&stored_vote(&meme, 1, "BRETT")).await, Ok(InsertOutcome::Duplicate));
        assert_eq!(store.insert_if_absent(&stored_vote(&other, 1, "BRETT")).await, Ok(InsertOutcome::Inserted));
        assert_eq!(store.count_round_votes(&meme.id).await, Ok(1));

        store.fail_next(1);
        assert!(matches!(store.round_votes(&meme.id).await, Err(StoreError::Unavailable(_))));
        assert_eq!(store.round_votes(&meme.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(2, 1);
        let now = OffsetDateTime::now_utc();

        assert!(limiter.check_at("client", now).is_ok());
        assert!(limiter.check_at("client", now).is_ok());
        let limited = limiter.check_at("client", now + Duration::seconds(10)).unwrap_err();
        assert_eq!(limited.retry_after_secs, 50);
        assert!(limiter.check_at("someone-else", now).is_ok());
        assert!(limiter.check_at("client", now + Duration::seconds(61)).is_ok());
    }

    fn lookup(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults_and_trust_key() {
        assert!(matches!(Config::from_lookup(lookup(&[])), Err(ConfigError::MissingTrustKey)));

        let config = Config::from_lookup(lookup(&[("FRAME_TRUST_KEY", TRUST_KEY.into())])).unwrap();
        assert_eq!(config.rounds.len(), 1);
        assert_eq!(config.rounds[0].id.as_str(), "popcat-vs-brett");
        assert_eq!(config.rounds[0].candidates, vec![candidate("POPCAT"), candidate("BRETT")]);
        assert_eq!(config.identity, IdentityMode::Verified { trust_key: TRUST_KEY.into() });
        assert_eq!(config.submit_timeout, StdDuration::from_millis(5000));
        assert_eq!(config.retry_attempts, 3);

        let unverified = Config::from_lookup(lookup(&[("IDENTITY_MODE", "unverified".into())])).unwrap();
        assert_eq!(unverified.identity, IdentityMode::Unverified);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let base = ("FRAME_TRUST_KEY", TRUST_KEY.to_string());

        let timeout = Config::from_lookup(lookup(&[base.clone(), ("SUBMIT_TIMEOUT_MS", "soon".into())]));
        assert!(matches!(timeout, Err(ConfigError::Invalid { key: "SUBMIT_TIMEOUT_MS", .. })));

        let window = Config::from_lookup(lookup(&[
            base.clone(),
            ("ROUND_STARTS_AT", "2024-12-06T12:30:00Z".into()),
            ("ROUND_ENDS_AT", "2024-12-01T12:30:00Z".into()),
        ]));
        assert!(matches!(window, Err(ConfigError::Round(_))));

        let mode = Config::from_lookup(lookup(&[base, ("IDENTITY_MODE", "trust-me".into())]));
        assert!(matches!(mode, Err(ConfigError::Invalid { key: "IDENTITY_MODE", .. })));
    }

    #[test]
    fn test_config_reads_round_list() {
        let rounds = vec![open_round("first"), closed_round("second")];
        let config = Config::from_lookup(lookup(&[
            ("IDENTITY_MODE", "unverified".into()),
            ("VOTE_ROUNDS", serde_json::to_string(&rounds).unwrap()),
        ]))
        .unwrap();
        assert_eq!(config.rounds.len(), 2);
        assert_eq!(config.rounds[1].id.as_str(), "second");

        let duplicated = vec![open_round("first"), open_round("first")];
        let result = Config::from_lookup(lookup(&[
            ("IDENTITY_MODE", "unverified".into()),
            ("VOTE_ROUNDS", serde_json::to_string(&duplicated).unwrap()),
        ]));
        assert!(matches!(result, Err(ConfigError::DuplicateRound(_))));
    }

    async fn http_client(rounds: Vec<VotingRound>) -> (Client, IdentityVerifier) {
        init_test_tracing();
        let config = Config::from_lookup(lookup(&[
            ("FRAME_TRUST_KEY", TRUST_KEY.into()),
            ("VOTE_ROUNDS", serde_json::to_string(&rounds).unwrap()),
        ]))
        .unwrap();
        let svc = VoteService::from_config(&config, Arc::new(MemoryStore::new()));
        let client = Client::tracked(build_rocket(&config, svc)).await.unwrap();
        (client, IdentityVerifier::new_with_key(TRUST_KEY))
    }

    fn vote_body(verifier: &IdentityVerifier, fid: u64, symbol: &str) -> String {
        let claim = IdentityClaim {
            fid: Some(fid),
            profile: Profile::default(),
            proof: verifier.issue(fid, OffsetDateTime::now_utc(), Duration::minutes(5)),
        };
        serde_json::to_string(&request(claim, symbol)).unwrap()
    }

    #[rocket::async_test]
    async fn test_http_vote_flow() {
        let (client, verifier) = http_client(vec![open_round("meme")]).await;

        let response = client.post("/api/rounds/meme/votes")
            .header(ContentType::JSON)
            .body(vote_body(&verifier, 21, "POPCAT"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let result: VoteResult = response.into_json().await.unwrap();
        assert!(result.is_accepted());
        assert_eq!(result.snapshot.unwrap().total, 1);

        let response = client.post("/api/rounds/meme/votes")
            .header(ContentType::JSON)
            .body(vote_body(&verifier, 21, "BRETT"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        let result: VoteResult = response.into_json().await.unwrap();
        assert_eq!(result.reason, Some(RejectReason::AlreadyVoted));

        let tally: TallySnapshot = client.get("/api/rounds/meme/tally").dispatch().await.into_json().await.unwrap();
        assert_eq!(tally.votes_for(&candidate("POPCAT")), Some(1));

        let response = client.get("/api/rounds/meme/votes/21").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let vote: Vote = response.into_json().await.unwrap();
        assert_eq!(vote.candidate, candidate("POPCAT"));

        let response = client.get("/api/rounds/meme/votes/22").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_http_rejections() {
        let (client, verifier) = http_client(vec![open_round("meme"), closed_round("done")]).await;

        let closed = client.post("/api/rounds/done/votes")
            .header(ContentType::JSON)
            .body(vote_body(&verifier, 1, "POPCAT"))
            .dispatch()
            .await;
        assert_eq!(closed.status(), Status::Forbidden);

        let forged = client.post("/api/rounds/meme/votes")
            .header(ContentType::JSON)
            .body(vote_body(&IdentityVerifier::new_with_key("forged"), 1, "POPCAT"))
            .dispatch()
            .await;
        assert_eq!(forged.status(), Status::Unauthorized);

        let missing = client.post("/api/rounds/nope/votes")
            .header(ContentType::JSON)
            .body(vote_body(&verifier, 1, "POPCAT"))
            .dispatch()
            .await;
        assert_eq!(missing.status(), Status::NotFound);

        let bad_candidate = client.post("/api/rounds/meme/votes")
            .header(ContentType::JSON)
            .body(vote_body(&verifier, 1, "DOGE"))
            .dispatch()
            .await;
        assert_eq!(bad_candidate.status(), Status::BadRequest);

        assert_eq!(client.get("/api/rounds/nope/tally").dispatch().await.status(), Status::NotFound);
        assert_eq!(client.get("/api/rounds/Not_A_Slug").dispatch().await.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn test_http_round_views() {
        let (client, _) = http_client(vec![open_round("meme"), closed_round("done")]).await;

        let rounds: Vec<RoundView> = client.get("/api/rounds").dispatch().await.into_json().await.unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].phase, RoundPhase::Open);
        assert_eq!(rounds[1].phase, RoundPhase::Closed);
        assert_eq!(rounds[1].countdown, Countdown::default());

        let view: RoundView = client.get("/api/rounds/meme").dispatch().await.into_json().await.unwrap();
        assert_eq!(view.pledges.len(), 2);
        assert!(view.pledges[0].message.starts_with("I voted for $POPCAT to outperform $BRETT."));
        assert!(view.countdown.hours <= 1);
    }

    #[rocket::async_test]
    async fn test_http_rate_limit() {
        let rounds = vec![open_round("meme")];
        let config = Config::from_lookup(lookup(&[
            ("FRAME_TRUST_KEY", TRUST_KEY.into()),
            ("VOTE_ROUNDS", serde_json::to_string(&rounds).unwrap()),
            ("SUBMIT_RATE_LIMIT", "2".into()),
        ]))
        .unwrap();
        let svc = VoteService::from_config(&config, Arc::new(MemoryStore::new()));
        let client = Client::tracked(build_rocket(&config, svc)).await.unwrap();
        let verifier = IdentityVerifier::new_with_key(TRUST_KEY);

        let mut statuses = Vec::new();
        for fid in 1..=3 {
            let response = client.post("/api/rounds/meme/votes")
                .header(ContentType::JSON)
                .body(vote_body(&verifier, fid, "BRETT"))
                .dispatch()
                .await;
            statuses.push(response.status());
        }
        assert_eq!(statuses, vec![Status::Created, Status::Created, Status::TooManyRequests]);
    }

    #[rocket::async_test]
    async fn test_cors_only_for_allowed_origins() {
        let (client, _) = http_client(vec![open_round("meme")]).await;

        let response = client.get("/api/rounds")
            .header(Header::new("Origin", "https://warpcast.com"))
            .dispatch()
            .await;
        assert_eq!(response.headers().get_one("Access-Control-Allow-Origin"), Some("https://warpcast.com"));

        let response = client.get("/api/rounds")
            .header(Header::new("Origin", "https://elsewhere.example"))
            .dispatch()
            .await;
        assert!(response.headers().get_one("Access-Control-Allow-Origin").is_none());

        let preflight = client.options("/api/rounds/meme/votes").dispatch().await;
        assert_eq!(preflight.status(), Status::Ok);
    }

    #[tokio::test]
    async fn test_committed_insert_with_lost_reply_is_accepted() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(vec![open_round("meme")], store.clone());
        let round = rid("meme");

        store.lose_next_replies(1);
        let result = svc.submit(&round, request(claim(&svc, 7), "POPCAT")).await;
        assert!(result.is_accepted(), "{:?}", result.reason);
        assert_eq!(result.snapshot.unwrap().total, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(svc.snapshot(&round).unwrap().votes_for(&candidate("POPCAT")), Some(1));

        let again = svc.submit(&round, request(claim(&svc, 7), "BRETT")).await;
        assert_eq!(again.reason, Some(RejectReason::AlreadyVoted));
    }

    #[tokio::test]
    async fn test_retried_insert_still_detects_earlier_vote() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(vec![open_round("meme")], store.clone());
        let round = rid("meme");

        assert!(svc.submit(&round, request(claim(&svc, 8), "BRETT")).await.is_accepted());
        store.fail_next(1);
        let result = svc.submit(&round, request(claim(&svc, 8), "POPCAT")).await;
        assert_eq!(result.reason, Some(RejectReason::AlreadyVoted));
        assert_eq!(svc.snapshot(&round).unwrap().total, 1);
    }

    #[test]
    fn test_cors_origin_matching() {
        let cors = CORS::new(vec!["https://warpcast.com".into(), "http://localhost".into()]);

        assert!(cors.allows("https://warpcast.com"));
        assert!(cors.allows("http://localhost:8000"));
        assert!(!cors.allows("https://warpcast.com.evil.example"));
        assert!(!cors.allows("http://localhost.evil.example"));
        assert!(!cors.allows("https://warpcast.co"));
    }

    #[rocket::async_test]
    async fn test_http_rate_limit_ignores_forwarded_for() {
        let rounds = vec![open_round("meme")];
        let config = Config::from_lookup(lookup(&[
            ("FRAME_TRUST_KEY", TRUST_KEY.into()),
            ("VOTE_ROUNDS", serde_json::to_string(&rounds).unwrap()),
            ("SUBMIT_RATE_LIMIT", "2".into()),
        ]))
        .unwrap();
        let svc = VoteService::from_config(&config, Arc::new(MemoryStore::new()));
        let client = Client::tracked(build_rocket(&config, svc)).await.unwrap();
        let verifier = IdentityVerifier::new_with_key(TRUST_KEY);

        let mut statuses = Vec::new();
        for fid in 1..=3 {
            let response = client.post("/api/rounds/meme/votes")
                .header(ContentType::JSON)
                .header(Header::new("X-Forwarded-For", format!("10.0.0.{fid}")))
                .body(vote_body(&verifier, fid, "POPCAT"))
                .dispatch()
                .await;
            statuses.push(response.status());
        }
        assert_eq!(statuses, vec![Status::Created, Status::Created, Status::TooManyRequests]);
    }

    #[rocket::async_test]
    async fn test_http_tally_stream_sends_current_snapshot() {
        use rocket::tokio::io::AsyncReadExt;

        let (client, verifier) = http_client(vec![open_round("meme")]).await;
        let response = client.post("/api/rounds/meme/votes")
            .header(ContentType::JSON)
            .body(vote_body(&verifier, 31, "BRETT"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let response = client.get("/api/rounds/meme/tally/stream").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::EventStream));
        let mut stream = Box::pin(response);

        let mut received = Vec::new();
        let mut chunk = [0u8; 1024];
        while !String::from_utf8_lossy(&received).contains("\n\n") {
            let read = tokio::time::timeout(StdDuration::from_secs(2), stream.read(&mut chunk))
                .await
                .expect("no tally event delivered")
                .unwrap();
            assert!(read > 0, "stream ended before the first event");
            received.extend_from_slice(&chunk[..read]);
        }

        let text = String::from_utf8(received).unwrap();
        let event = text.split("\n\n").next().unwrap();
        let name = event.lines().find_map(|line| line.strip_prefix("event:")).map(str::trim);
        let data = event.lines().find_map(|line| line.strip_prefix("data:")).map(str::trim).unwrap();
        assert_eq!(name, Some("tally"));

        let snapshot: TallySnapshot = serde_json::from_str(data).unwrap();
        assert_eq!(snapshot.round_id, rid("meme"));
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.votes_for(&candidate("BRETT")), Some(1));
    }
}
