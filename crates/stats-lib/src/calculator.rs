//! Metric derivation from raw snapshots
//!
//! Pure functions: the same snapshot always yields the same result, and
//! undefined inputs (no elapsed time, no limit, unknown platform) degrade to
//! `0.0` instead of failing. Formulas follow the Docker CLI's `docker stats`.

use crate::models::{CalculatedMetrics, ContainerRef, PlatformTag, RawSnapshot};

/// CPU utilization in percent of a single core (linux can exceed 100)
pub fn cpu_percentage(platform: PlatformTag, snapshot: &RawSnapshot) -> f64 {
    match platform {
        PlatformTag::Linux => linux_cpu_percentage(snapshot),
        PlatformTag::Windows => windows_cpu_percentage(snapshot),
        PlatformTag::Unknown => 0.0,
    }
}

fn linux_cpu_percentage(snapshot: &RawSnapshot) -> f64 {
    let now = &snapshot.cpu_stats;
    let prev = &snapshot.precpu_stats;

    // Signed deltas: a counter that went backwards must not wrap around
    let cpu_delta = now.cpu_usage.total_usage as f64 - prev.cpu_usage.total_usage as f64;
    let system_delta = now.system_cpu_usage as f64 - prev.system_cpu_usage as f64;

    let online_cpus = match now.online_cpus {
        0 => now.cpu_usage.percpu_usage.len() as f64,
        n => n as f64,
    };

    if system_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / system_delta) * online_cpus * 100.0
    } else {
        0.0
    }
}

fn windows_cpu_percentage(snapshot: &RawSnapshot) -> f64 {
    // Windows reports CPU time in 100ns intervals
    let elapsed_intervals = match (snapshot.read, snapshot.preread) {
        (Some(read), Some(preread)) => (read - preread).num_nanoseconds().unwrap_or(0) / 100,
        _ => 0,
    };
    let possible_intervals = elapsed_intervals as f64 * f64::from(snapshot.num_procs);
    let used_intervals = snapshot.cpu_stats.cpu_usage.total_usage as f64
        - snapshot.precpu_stats.cpu_usage.total_usage as f64;

    if possible_intervals > 0.0 {
        used_intervals / possible_intervals * 100.0
    } else {
        0.0
    }
}

/// Memory in use, in bytes.
///
/// On linux this is `usage - cache`. The result is not clamped: a daemon
/// reporting more cache than usage produces a negative value, which is
/// passed through to the output unchanged.
pub fn memory_usage(platform: PlatformTag, snapshot: &RawSnapshot) -> f64 {
    let memory = &snapshot.memory_stats;
    match platform {
        PlatformTag::Linux => memory.usage as f64 - memory.cache() as f64,
        PlatformTag::Windows => memory.privateworkingset as f64,
        PlatformTag::Unknown => 0.0,
    }
}

/// Memory limit in bytes; only linux surfaces one
pub fn memory_limit(platform: PlatformTag, snapshot: &RawSnapshot) -> f64 {
    match platform {
        PlatformTag::Linux => snapshot.memory_stats.limit as f64,
        PlatformTag::Windows | PlatformTag::Unknown => 0.0,
    }
}

/// Memory usage as a percentage of the limit; 0 when there is no limit
pub fn memory_percentage(platform: PlatformTag, snapshot: &RawSnapshot) -> f64 {
    let limit = memory_limit(platform, snapshot);
    if limit != 0.0 {
        memory_usage(platform, snapshot) / limit * 100.0
    } else {
        0.0
    }
}

/// Derive the full output record for one snapshot
pub fn calculate(
    container: &ContainerRef,
    platform: PlatformTag,
    snapshot: &RawSnapshot,
) -> CalculatedMetrics {
    CalculatedMetrics {
        os: platform,
        id: container.id.clone(),
        name: container.display_name().to_string(),
        image: container.image.clone(),
        cpu_percentage: cpu_percentage(platform, snapshot),
        memory_usage: memory_usage(platform, snapshot),
        memory_limit: memory_limit(platform, snapshot),
        memory_percentage: memory_percentage(platform, snapshot),
    }
}
