use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use slotbook::manifest::{Description, Manifest, Policy, Resource, Slot, UiSet, Window};
use slotbook::{Interval, Store};

const SLOTS: usize = 10;

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn hour(i: i64) -> Interval {
    let start = epoch() + TimeDelta::hours(i);
    Interval::new(start, start + TimeDelta::minutes(59))
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.1}µs, p50={:.1}µs, p95={:.1}µs, p99={:.1}µs, max={:.1}µs",
        latencies.len(),
        avg.as_secs_f64() * 1e6,
        percentile(latencies, 50.0).as_secs_f64() * 1e6,
        percentile(latencies, 95.0).as_secs_f64() * 1e6,
        percentile(latencies, 99.0).as_secs_f64() * 1e6,
        latencies.last().unwrap().as_secs_f64() * 1e6,
    );
}

fn manifest() -> Manifest {
    let mut m = Manifest::default();
    m.descriptions.insert(
        "d".into(),
        Description {
            name: "bench".into(),
            kind: "slot".into(),
            ..Description::default()
        },
    );
    m.ui_sets.insert("us".into(), UiSet::default());
    m.windows.insert(
        "w".into(),
        Window {
            allowed: vec![Interval::new(epoch(), epoch() + TimeDelta::days(3650))],
            denied: vec![],
        },
    );
    let mut policy = Policy {
        description: "d".into(),
        ..Policy::default()
    };
    for i in 0..SLOTS {
        let (r, s) = (format!("r-{i}"), format!("sl-{i}"));
        m.resources.insert(
            r.clone(),
            Resource {
                description: "d".into(),
                topic_stub: r.clone(),
                ..Resource::default()
            },
        );
        m.slots.insert(
            s.clone(),
            Slot {
                description: "d".into(),
                policy: "p".into(),
                resource: r,
                ui_set: "us".into(),
                window: "w".into(),
            },
        );
        policy.slots.push(s);
    }
    m.policies.insert("p".into(), policy);
    m
}

fn fresh_store() -> Arc<Store> {
    let store = Store::with_clock(Arc::new(epoch));
    store.replace_manifest(manifest()).unwrap();
    Arc::new(store)
}

fn phase1_sequential() {
    let store = fresh_store();
    let n = 20_000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        store.make_booking("p", "sl-0", "u-0", hour(i as i64)).unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

async fn phase2_concurrent() {
    let store = fresh_store();
    let n_tasks = SLOTS;
    let n_per_task = 2_000;

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let store = store.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let slot = format!("sl-{task}");
            let user = format!("u-{task}");
            for j in 0..n_per_task {
                store.make_booking("p", &slot, &user, hour(j as i64)).unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load() {
    let store = fresh_store();
    for i in 0..500 {
        store.make_booking("p", "sl-0", "u-r", hour(i * 2)).unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 1..5 {
        let store = store.clone();
        let stop = stop.clone();
        writers.push(tokio::task::spawn_blocking(move || {
            let slot = format!("sl-{w}");
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = store.make_booking("p", &slot, "u-w", hour(i));
                i += 1;
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        readers.push(tokio::task::spawn_blocking(move || {
            let mut latencies = Vec::with_capacity(2_000);
            for _ in 0..2_000 {
                let t = Instant::now();
                let free = store.get_availability("p", "sl-0").unwrap();
                assert!(!free.is_empty());
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("availability query", &mut all);
}

fn phase4_prune() {
    let store = fresh_store();
    let n = 50_000;
    for i in 0..n {
        let slot = format!("sl-{}", i % SLOTS);
        store
            .make_booking("p", &slot, "u-p", hour((i / SLOTS) as i64))
            .unwrap();
    }
    // Half of the bookings have ended.
    let half = epoch() + TimeDelta::hours((n / SLOTS / 2) as i64);
    store.set_clock(Arc::new(move || half));

    let t = Instant::now();
    let report = store.prune_all();
    println!(
        "  pruned {} of {n} bookings in {:.2}ms",
        report.bookings,
        t.elapsed().as_secs_f64() * 1000.0
    );
    let t = Instant::now();
    store.prune_all();
    println!("  idle pass in {:.1}µs", t.elapsed().as_secs_f64() * 1e6);
}

#[tokio::main]
async fn main() {
    println!("=== slotbook stress benchmark ===");

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential();

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] prune pass");
    phase4_prune();

    println!("\n=== benchmark complete ===");
}
