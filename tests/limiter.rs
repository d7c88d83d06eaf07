use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use turnstile::gate::{GateOutcome, RequestGate};
use turnstile::ratelimit::{ManualClock, PolicyTable, Preset, RateLimitConfig, RateLimiter};

fn manual_limiter(start: u64) -> (Arc<RateLimiter>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    (Arc::new(RateLimiter::with_clock(clock.clone())), clock)
}

#[test]
fn parallel_checks_never_exceed_the_ceiling() {
    let (limiter, _clock) = manual_limiter(0);
    let config = RateLimitConfig::new(50, 60_000).unwrap();
    let admitted = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    if limiter.check("shared", &config).allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 50);
    assert_eq!(limiter.entry("shared").unwrap().count, 50);
}

#[test]
fn parallel_identifiers_get_full_budgets() {
    let (limiter, _clock) = manual_limiter(0);
    let config = Preset::Export.config();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                let id = format!("user-{}", i);
                (0..5).filter(|_| limiter.check(&id, &config).allowed).count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 3);
    }
    assert_eq!(limiter.len(), 16);
}

#[test]
fn window_reopens_regardless_of_denials() {
    let (limiter, clock) = manual_limiter(10_000);
    let config = Preset::Auth.config();

    for _ in 0..5 {
        assert!(limiter.check("ip:1.2.3.4", &config).allowed);
    }
    for _ in 0..20 {
        let denied = limiter.check("ip:1.2.3.4", &config);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_time, 910_000);
    }

    clock.set(910_001);
    let reopened = limiter.check("ip:1.2.3.4", &config);
    assert!(reopened.allowed);
    assert_eq!(reopened.remaining, 4);
}

#[test]
fn cleanup_with_mixed_entries() {
    let (limiter, clock) = manual_limiter(0);
    let short = RateLimitConfig::new(10, 1_000).unwrap();
    let long = RateLimitConfig::new(10, 100_000).unwrap();

    for i in 0..10 {
        let config = if i % 2 == 0 { &short } else { &long };
        limiter.check(&format!("id-{}", i), config);
    }

    clock.set(5_000);
    assert_eq!(limiter.cleanup(), 5);

    let mut remaining = Vec::new();
    limiter
        .store()
        .for_each(|id, entry| remaining.push((id.to_string(), entry.window_end)));
    remaining.sort();

    assert_eq!(remaining.len(), 5);
    assert!(remaining.iter().all(|(_, end)| *end == 100_000));
}

#[test]
fn gate_end_to_end_with_overrides() {
    let (limiter, clock) = manual_limiter(0);
    let mut policies = PolicyTable::with_presets();
    policies.insert("sms", RateLimitConfig::new(2, 1_000).unwrap());
    let gate = RequestGate::new(limiter, Arc::new(policies));

    assert!(gate.admit("sms", "tenant-1").unwrap().is_admitted());
    assert!(gate.admit("sms", "tenant-1").unwrap().is_admitted());

    match gate.admit("sms", "tenant-1").unwrap() {
        GateOutcome::TooManyRequests(headers) => {
            assert_eq!(headers.limit, 2);
            assert_eq!(headers.reset_time, "1970-01-01T00:00:01.000Z");
            assert_eq!(headers.retry_after_secs, Some(1));
        }
        other => panic!("expected denial, got {:?}", other),
    }

    clock.set(1_001);
    assert!(gate.admit("sms", "tenant-1").unwrap().is_admitted());
}
