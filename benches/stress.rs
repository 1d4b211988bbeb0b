use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use slotbook::config::EngineConfig;
use slotbook::engine::{Engine, NewBooking, NewService};
use slotbook::model::{Contact, DaySchedule, Resource, WeeklySchedule};
use slotbook::notify::NotifyHub;
use slotbook::store::MemoryStore;
use slotbook::time::TimeOfDay;

const RESOURCES: usize = 10;
const DAYS: u64 = 28;

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

fn contact(n: usize) -> Contact {
    Contact {
        name: format!("Guest {n}"),
        email: format!("guest{n}@example.com"),
        phone: None,
        additional_information: None,
    }
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

fn day(offset: u64) -> NaiveDate {
    first_day().checked_add_days(Days::new(offset)).unwrap()
}

struct Setup {
    engine: Arc<Engine>,
    service_id: Ulid,
    resources: Vec<Resource>,
}

async fn setup() -> Setup {
    let engine = Arc::new(Engine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(NotifyHub::new()),
        EngineConfig::default(),
    ));
    let open_all_week = WeeklySchedule::uniform(DaySchedule::working(
        TimeOfDay::hm(8, 0),
        TimeOfDay::hm(22, 0),
    ));
    let service_id = engine
        .create_service(NewService {
            name: "Stress".into(),
            slot_steps: 30,
            max_duration: 2,
            schedule: Some(open_all_week),
        })
        .await
        .unwrap()
        .id;

    let mut resources = Vec::new();
    for i in 0..RESOURCES {
        resources.push(
            engine
                .create_resource(service_id, format!("Lane {i:02}"))
                .await
                .unwrap(),
        );
    }
    println!("  created {} resources", resources.len());
    Setup {
        engine,
        service_id,
        resources,
    }
}

fn booking(s: &Setup, resource: usize, date: NaiveDate, start: u32, n: usize) -> NewBooking {
    NewBooking {
        service_id: s.service_id,
        resource_id: s.resources[resource].id,
        date,
        start_time: TimeOfDay::from_minutes(start).unwrap(),
        end_time: TimeOfDay::from_minutes(start + 60).unwrap(),
        contact: contact(n),
    }
}

/// Non-overlapping hour bookings on one resource, one after another.
async fn phase1_sequential(s: &Setup) {
    let mut latencies = Vec::new();
    let start = Instant::now();
    for d in 0..DAYS {
        for hour in 8..21u32 {
            let t = Instant::now();
            s.engine
                .create_booking(booking(s, 0, day(d), hour * 60, latencies.len()))
                .await
                .unwrap();
            latencies.push(t.elapsed());
        }
    }
    let elapsed = start.elapsed();
    println!(
        "  {} bookings in {:.2}s ({:.0} ops/s)",
        latencies.len(),
        elapsed.as_secs_f64(),
        latencies.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("create_booking", &mut latencies);
}

/// Many tasks fight over the same half-hour grid. Overlapping attempts must
/// lose, and the grid must end up with no double bookings.
async fn phase2_contention(s: &Setup) {
    let tasks = 64;
    let per_task = 50;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let date = day(DAYS + 1);

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..tasks {
        let engine = s.engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        let requests: Vec<_> = (0..per_task)
            .map(|i| {
                let resource = (task + i) % RESOURCES;
                let slot = ((task * 7 + i * 3) % 26) as u32;
                booking(s, resource, date, 8 * 60 + slot * 30, task * per_task + i)
            })
            .collect();
        handles.push(tokio::spawn(async move {
            for new in requests {
                match engine.create_booking(new).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(_) => lost.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let elapsed = start.elapsed();
    let won = won.load(Ordering::Relaxed);
    let lost = lost.load(Ordering::Relaxed);
    println!(
        "  {tasks} tasks x {per_task} attempts: {won} won, {lost} lost in {:.2}s ({:.0} ops/s)",
        elapsed.as_secs_f64(),
        (won + lost) as f64 / elapsed.as_secs_f64()
    );

    let bookings = s.engine.bookings_for_date(s.service_id, date).await.unwrap();
    assert_eq!(bookings.len(), won);
    for r in &s.resources {
        let mut spans: Vec<_> = bookings
            .iter()
            .filter(|b| b.resource_id == r.id)
            .map(|b| b.span())
            .collect();
        spans.sort_by_key(|sp| sp.start);
        for pair in spans.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]), "double booking on {}", r.name);
        }
    }
    println!("  no overlapping bookings");
}

/// Day and week views while writers keep invalidating the cache.
async fn phase3_reads_under_load(s: &Setup) {
    let writers = 8;
    let mut handles = Vec::new();
    for w in 0..writers {
        let engine = s.engine.clone();
        let requests: Vec<_> = (0..DAYS)
            .map(|d| booking(s, 1 + w % (RESOURCES - 1), day(d), 14 * 60 + (w as u32 % 4) * 30, w))
            .collect();
        handles.push(tokio::spawn(async move {
            for new in requests {
                let _ = engine.create_booking(new).await;
            }
        }));
    }

    let mut day_latencies = Vec::new();
    let mut week_latencies = Vec::new();
    for d in 0..DAYS {
        let t = Instant::now();
        s.engine.day_view(s.service_id, day(d)).await.unwrap();
        day_latencies.push(t.elapsed());
        if d % 7 == 0 {
            let t = Instant::now();
            s.engine.week_view(s.service_id, day(d)).await.unwrap();
            week_latencies.push(t.elapsed());
        }
    }
    for h in handles {
        h.await.unwrap();
    }
    print_latency("day_view", &mut day_latencies);
    print_latency("week_view", &mut week_latencies);
}

#[tokio::main]
async fn main() {
    println!("=== slotbook stress benchmark ===\n");

    println!("[setup]");
    let s = setup().await;

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&s).await;

    println!("\n[phase 2] contended booking races");
    phase2_contention(&s).await;

    println!("\n[phase 3] view latency under write load");
    phase3_reads_under_load(&s).await;

    println!("\n=== benchmark complete ===");
}
