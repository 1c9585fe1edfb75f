//! Login, session ceilings, expiry and the background sweeper, driven through
//! `AccountManager::process`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use chrono::Duration;

use cloud_iam::identity::{SESSION_EXPIRED, WRONG_ACCOUNT_CREDENTIALS, WRONG_USER_CREDENTIALS};
use cloud_iam::{ApiBody, ApiReply, EntityStore, ErrorKind, IdentityConfig};
use common::{list_users, Fixture};

fn short_sessions() -> IdentityConfig {
    IdentityConfig { max_concurrent_sessions: 2, session_timeout_secs: 60, session_cleanup_interval_secs: 30, ..Default::default() }
}

#[test]
fn third_concurrent_login_hits_the_ceiling() {
    let f = Fixture::with_config(short_sessions());
    let admin = f.admin();
    f.create_account(&admin.uuid, "acme", "acme-pw");

    let acme = f.login_account("acme", "acme-pw");
    f.create_user(&acme.uuid, "ops", "ops-pw");
    f.login_account("acme", "acme-pw");
    let err = f.err(None, ApiBody::LogInByAccount { account_name: "acme".into(), password: "acme-pw".into() });
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert!(err.message.contains("max allowed: 2"), "{}", err.message);

    // user sessions of the same account are counted separately
    f.login_user("acme", "ops", "ops-pw");
    f.login_user("acme", "ops", "ops-pw");
    assert!(f.err(None, ApiBody::LogInByUser {
        account_uuid: None,
        account_name: Some("acme".into()),
        user_name: "ops".into(),
        password: "ops-pw".into(),
    })
    .message
    .ends_with("max allowed: 2"));
}

#[test]
fn wrong_password_creates_no_session() {
    let f = Fixture::new();
    let admin = f.admin();
    f.create_account(&admin.uuid, "acme", "acme-pw");
    let before = f.store.session_count();

    let err = f.err(None, ApiBody::LogInByAccount { account_name: "acme".into(), password: "nope".into() });
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(err.message, WRONG_ACCOUNT_CREDENTIALS);

    let err = f.err(None, ApiBody::LogInByAccount { account_name: "nobody".into(), password: "acme-pw".into() });
    assert_eq!(err.message, WRONG_ACCOUNT_CREDENTIALS);

    let err = f.err(
        None,
        ApiBody::LogInByUser { account_uuid: None, account_name: Some("acme".into()), user_name: "ghost".into(), password: "x".into() },
    );
    assert_eq!(err.message, WRONG_USER_CREDENTIALS);
    assert_eq!(f.store.session_count(), before);
}

#[test]
fn expired_session_is_rejected_and_removed() {
    let f = Fixture::with_config(short_sessions());
    let admin = f.admin();
    f.create_account(&admin.uuid, "acme", "acme-pw");
    let s = f.login_account("acme", "acme-pw");
    f.ok(Some(&s.uuid), list_users());

    f.store.advance(Duration::seconds(60));
    let err = f.err(Some(&s.uuid), list_users());
    assert_eq!(err.kind, ErrorKind::InvalidSession);
    assert_eq!(err.message, SESSION_EXPIRED);
    assert!(matches!(f.ok(None, ApiBody::ValidateSession { session_uuid: s.uuid.clone() }), ApiReply::SessionValid(false)));
}

#[test]
fn sweep_removes_every_expired_session() {
    let f = Fixture::with_config(short_sessions());
    let admin = f.admin();
    f.create_account(&admin.uuid, "acme", "acme-pw");
    let s1 = f.login_account("acme", "acme-pw");
    let s2 = f.login_account("acme", "acme-pw");

    f.store.advance(Duration::seconds(61));
    // the admin session shares the same clock
    assert_eq!(f.mgr.sessions().sweep_expired().unwrap(), 3);
    for s in [&s1, &s2] {
        assert!(!f.mgr.sessions().is_cached(&s.uuid));
        assert_eq!(f.err(Some(&s.uuid), list_users()).message, SESSION_EXPIRED);
    }
    assert_eq!(f.store.session_count(), 0);
}

#[test]
fn logout_then_validate_reports_unknown() {
    let f = Fixture::new();
    let admin = f.admin();
    assert!(matches!(f.ok(None, ApiBody::ValidateSession { session_uuid: admin.uuid.clone() }), ApiReply::SessionValid(true)));
    assert!(matches!(f.ok(None, ApiBody::LogOut { session_uuid: admin.uuid.clone() }), ApiReply::Done));
    // idempotent
    assert!(matches!(f.ok(None, ApiBody::LogOut { session_uuid: admin.uuid.clone() }), ApiReply::Done));
    assert!(matches!(f.ok(None, ApiBody::ValidateSession { session_uuid: admin.uuid.clone() }), ApiReply::SessionValid(false)));
    assert_eq!(f.err(Some(&admin.uuid), list_users()).kind, ErrorKind::InvalidSession);
}

#[test]
fn sessions_stay_consistent_under_concurrent_traffic() {
    let f = Fixture::with_config(IdentityConfig { max_concurrent_sessions: 4, session_timeout_secs: 60, ..Default::default() });
    let sm = f.mgr.sessions().clone();

    let old: Vec<String> = (0..12).map(|i| sm.create_session("acme", Some(&format!("old-{}", i))).unwrap().uuid).collect();
    f.store.advance(Duration::seconds(30));
    let young: Vec<String> = (0..12).map(|i| sm.create_session("acme", Some(&format!("young-{}", i))).unwrap().uuid).collect();
    // the first generation is now expired
    f.store.advance(Duration::seconds(30));
    let (leaving, staying) = young.split_at(6);
    let every: Vec<&String> = old.iter().chain(young.iter()).collect();
    let admitted = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    for u in every.iter() {
                        let _ = sm.validate(u);
                    }
                }
            });
        }
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..5 {
                    if sm.create_session("acme", Some("ops")).is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
        scope.spawn(|| {
            for u in leaving.iter() {
                sm.logout(u).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..20 {
                sm.sweep_expired().unwrap();
            }
        });
    });

    assert_eq!(admitted.into_inner(), 4);
    assert_eq!(f.store.count_sessions("acme", Some("ops")).unwrap(), 4);
    for u in old.iter().chain(leaving.iter()) {
        assert!(sm.validate(u).is_err(), "session {} came back", u);
        assert!(!sm.is_cached(u));
        assert!(!f.store.session_exists(u).unwrap());
    }
    for u in staying.iter() {
        assert!(sm.validate(u).is_ok());
    }
    for u in every.iter() {
        assert_eq!(sm.is_cached(u), f.store.session_exists(u).unwrap(), "cache and store disagree on {}", u);
    }
    assert_eq!(sm.cached_len(), f.store.session_count());
    assert_eq!(f.store.session_count(), staying.len() + 4);
}

#[test]
fn missing_session_uuid_is_rejected() {
    let f = Fixture::new();
    let err = f.err(None, list_users());
    assert_eq!(err.kind, ErrorKind::InvalidSession);
    assert!(err.message.contains("is null"), "{}", err.message);
}

#[test]
fn no_runtime_means_no_sweeper() {
    let f = Fixture::new();
    assert!(!f.mgr.is_sweeping());
}

#[tokio::test]
async fn sweeper_runs_until_stopped() {
    let f = Fixture::new();
    assert!(f.mgr.is_sweeping());
    f.mgr.stop();
    assert!(!f.mgr.is_sweeping());
    f.mgr.stop();
}

#[tokio::test]
async fn sweeper_clears_expired_sessions_on_its_interval() {
    let cfg = IdentityConfig { session_cleanup_interval_secs: 1, ..short_sessions() };
    let f = Fixture::with_config(cfg);
    f.admin();
    assert_eq!(f.store.session_count(), 1);

    f.store.advance(Duration::seconds(61));
    tokio::time::sleep(StdDuration::from_millis(1500)).await;
    assert_eq!(f.store.session_count(), 0);
}
