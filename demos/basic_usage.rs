// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic tiered-cache usage example.
//!
//! Demonstrates:
//! 1. Creating and starting the engine
//! 2. Writing entries with TTLs, tags and priorities
//! 3. Reading them back and watching promotion
//! 4. Tag invalidation and eviction under a small budget
//! 5. Tracked allocations and a simulated memory pressure spike
//! 6. Displaying metrics
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tiered_cache::{
    CacheConfig, CacheEngine, EvictionStrategy, SetOptions, SimulatedMemoryProbe,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           tiered-cache: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the engine
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring tiered-cache...");

    let config = CacheConfig {
        max_memory_bytes: 4 * 1024,
        eviction_strategy: EvictionStrategy::Lru,
        promotion_access_threshold: 3,
        ..Default::default()
    };
    let probe = Arc::new(SimulatedMemoryProbe::new(0.40));
    let engine = CacheEngine::with_probe(config, probe.clone())?;
    engine.start()?;
    println!("   └─ State: {}\n", engine.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write entries
    // ─────────────────────────────────────────────────────────────────────────
    println!("✍️  Writing entries...");
    for i in 1..=5 {
        let key = format!("user:{i}");
        let value = format!("{{\"name\":\"user-{i}\"}}");
        let options = SetOptions::with_ttl(Duration::from_secs(300))
            .tag("users")
            .priority(i as u8);
        engine.cache_set(key.as_bytes(), value.into_bytes(), options)?;
        println!(
            "   └─ {key} → tier L{}",
            engine.hierarchy().tier_of(key.as_bytes()).map_or(0, |t| t + 1)
        );
    }
    engine.cache_set(b"config:theme", b"dark".to_vec(), SetOptions::default().tag("config"))?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Read back and promote
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Reading user:1 repeatedly...");
    for _ in 0..8 {
        engine.cache_get(b"user:1");
    }
    println!(
        "   └─ user:1 now in tier L{}",
        engine.hierarchy().tier_of(b"user:1").map_or(0, |t| t + 1)
    );
    println!("   └─ missing key → {:?}", engine.cache_get(b"user:404"));

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Invalidation and eviction
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 Invalidating tag 'users'...");
    let removed = engine.cache_invalidate_tags(["users"]);
    println!("   └─ removed {removed} entries");

    println!("\n📥 Overfilling the 4 KiB budget with 1 KiB blobs...");
    for i in 0..8 {
        engine.cache_set(format!("blob:{i}").as_bytes(), vec![i as u8; 1000], SetOptions::default())?;
    }
    let stats = engine.get_statistics();
    println!(
        "   └─ entries={} bytes={} evictions={}",
        stats.entry_count, stats.total_size_bytes, stats.eviction_count
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Allocations and memory pressure
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧠 Allocating and freeing tracked buffers...");
    let ids: Vec<_> = (1..=6)
        .map(|i| engine.allocate_memory(i * 700, "buffer"))
        .collect::<Result<_, _>>()?;
    for id in &ids[..4] {
        engine.deallocate_memory(*id);
    }
    let memory = engine.get_memory_statistics();
    println!(
        "   └─ live={} in_use={}B pooled={}B",
        memory.live_allocations, memory.bytes_in_use, memory.pooled_bytes
    );

    println!("\n🔥 Simulating 95% system memory...");
    probe.set(0.95);
    let report = engine.tick();
    let memory = engine.get_memory_statistics();
    println!("   └─ level={} strategy={}", report.pressure.level, report.pressure.strategy);
    println!("   └─ pooled blocks after check: {}", memory.pooled_blocks);

    probe.set(0.40);
    let report = engine.tick();
    println!("   └─ relieved: level={} strategy={}", report.pressure.level, report.pressure.strategy);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Statistics and metrics
    // ─────────────────────────────────────────────────────────────────────────
    let stats = engine.get_statistics();
    println!("\n📊 Cache statistics:");
    println!(
        "   └─ hits={} misses={} hit_ratio={:.2} avg_access={:?}",
        stats.hit_count, stats.miss_count, stats.hit_ratio, stats.average_access_time
    );
    for tier in &stats.tiers {
        println!(
            "   └─ L{}: entries={} bytes={} hits={}",
            tier.tier + 1,
            tier.entries,
            tier.bytes,
            tier.hits
        );
    }

    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    engine.shutdown().await;
    println!("   └─ State: {}\n", engine.state());

    Ok(())
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, sum) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("   │  └─ {}{} count={} avg={:.6}", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
