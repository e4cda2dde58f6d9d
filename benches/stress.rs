use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use slotbook::catalog::{InMemoryCatalog, Service};
use slotbook::{BookingError, BookingQuery, BookingStatus, Caller, Engine};

const SERVICES: usize = 10;
const CLIENTS: usize = 64;
const REQUESTS_PER_CLIENT: usize = 200;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

#[derive(Default)]
struct ClientStats {
    create: Vec<Duration>,
    transition: Vec<Duration>,
    accepted: usize,
    conflicts: usize,
}

/// Each client hammers random services with 30-minute requests on a handful
/// of days, confirming every booking it wins.
async fn client(engine: Arc<Engine>, services: Arc<Vec<Ulid>>, seed: usize) -> ClientStats {
    let user = Caller::user(Ulid::new());
    let staff = Caller::staff(Ulid::new());
    let mut stats = ClientStats::default();

    for i in 0..REQUESTS_PER_CLIENT {
        let n = seed.wrapping_mul(31).wrapping_add(i.wrapping_mul(17));
        let svc = services[n % services.len()];
        let date = NaiveDate::from_ymd_opt(2025, 6, 1 + (n % 7) as u32).unwrap_or_default();
        let time = format!("{:02}:{:02}", 8 + (n / 7) % 10, ((n / 70) % 4) * 15);

        let started = Instant::now();
        let result = engine.create_booking(&user, svc, date, &time).await;
        stats.create.push(started.elapsed());
        match result {
            Ok(b) => {
                stats.accepted += 1;
                let started = Instant::now();
                let _ = engine.transition_booking(&staff, b.id, BookingStatus::Confirmed).await;
                stats.transition.push(started.elapsed());
            }
            Err(BookingError::SlotUnavailable { .. }) => stats.conflicts += 1,
            Err(e) => eprintln!("unexpected error: {e}"),
        }
    }
    stats
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join(format!("slotbook_bench_{}", Ulid::new()));
    let catalog = Arc::new(InMemoryCatalog::new());
    let services: Vec<Ulid> = (0..SERVICES)
        .map(|_| {
            let id = Ulid::new();
            catalog.upsert(Service::new(id, 30, 0));
            id
        })
        .collect();
    let services = Arc::new(services);
    let engine = Arc::new(
        Engine::new(dir.join("bookings.wal"), catalog, Duration::from_secs(5))
            .expect("open engine"),
    );

    println!("stress: {CLIENTS} clients x {REQUESTS_PER_CLIENT} creates over {SERVICES} services");
    let wall = Instant::now();
    let handles: Vec<_> = (0..CLIENTS)
        .map(|seed| tokio::spawn(client(engine.clone(), services.clone(), seed)))
        .collect();

    let mut create = Vec::new();
    let mut transition = Vec::new();
    let (mut accepted, mut conflicts) = (0, 0);
    for h in handles {
        let s = h.await.expect("client task");
        create.extend(s.create);
        transition.extend(s.transition);
        accepted += s.accepted;
        conflicts += s.conflicts;
    }
    let elapsed = wall.elapsed();

    println!(
        "  {accepted} accepted, {conflicts} conflicts in {:.2}s ({:.0} creates/s)",
        elapsed.as_secs_f64(),
        create.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("create_booking", &mut create);
    print_latency("transition_booking", &mut transition);

    let started = Instant::now();
    let page = engine
        .list_bookings(&Caller::admin(Ulid::new()), &BookingQuery::default())
        .await
        .expect("list");
    println!(
        "  list_bookings over {} bookings: {:.3}ms",
        page.total,
        started.elapsed().as_secs_f64() * 1000.0
    );

    let started = Instant::now();
    engine.compact_wal().await.expect("compact");
    println!("  compact_wal: {:.3}ms", started.elapsed().as_secs_f64() * 1000.0);

    let _ = std::fs::remove_dir_all(&dir);
}
