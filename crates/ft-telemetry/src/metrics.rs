use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

use ahash::AHashMap;

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Fixed-bucket histogram. Bucket counts are non-cumulative internally and
/// summed on export.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_bits: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // f64 sum stored as bits; CAS loop stands in for an atomic float add.
        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if let Some(i) = self.buckets.iter().position(|b| value <= *b) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Buckets (seconds) sized for HTTP handlers and remote round trips.
fn duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Label pairs sorted by key, so `[("a", ..), ("b", ..)]` and
/// `[("b", ..), ("a", ..)]` name the same series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        v.sort();
        Self(v)
    }

    /// `{key="value",...}`, or an empty string for no labels.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Counters, gauges and histograms behind `RwLock`ed maps of atomics.
///
/// Series are created on first use. Lock poisoning is ignored: every value
/// is an atomic, so a panicking writer cannot leave a series half-updated.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<AHashMap<String, AtomicI64>>,
    histograms: RwLock<AHashMap<String, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Counters -----------------------------------------------------------

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(c) = map.get(&key) {
                c.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&key).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    // -- Gauges -------------------------------------------------------------

    pub fn set_gauge(&self, name: &str, value: i64) {
        {
            let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(g) = map.get(name) {
                g.store(value, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.gauges.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn get_gauge(&self, name: &str) -> i64 {
        let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).map(|g| g.load(Ordering::Relaxed)).unwrap_or(0)
    }

    // -- Histograms ---------------------------------------------------------

    pub fn record_histogram(&self, name: &str, value: f64) {
        {
            let map = self.histograms.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(h) = map.get(name) {
                h.observe(value);
                return;
            }
        }
        let mut map = self.histograms.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(name.to_string())
            .or_insert_with(|| Histogram::new(duration_buckets()))
            .observe(value);
    }

    /// `(count, sum)` for a histogram, zeros if it was never recorded.
    pub fn histogram_totals(&self, name: &str) -> (u64, f64) {
        let map = self.histograms.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name)
            .map(|h| (h.count(), h.sum()))
            .unwrap_or((0, 0.0))
    }

    // -- Export -------------------------------------------------------------

    /// Prometheus text exposition format, families sorted by name.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        {
            let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            let mut series: Vec<(&String, &Labels, u64)> = map
                .iter()
                .map(|((name, labels), v)| (name, labels, v.load(Ordering::Relaxed)))
                .collect();
            series.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            let mut last: Option<&String> = None;
            for (name, labels, value) in series {
                if last != Some(name) {
                    let _ = writeln!(out, "# TYPE {name} counter");
                    last = Some(name);
                }
                let _ = writeln!(out, "{name}{} {value}", labels.prometheus_str());
            }
        }

        {
            let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                let _ = writeln!(out, "# TYPE {name} gauge");
                let _ = writeln!(out, "{name} {}", map[name].load(Ordering::Relaxed));
            }
        }

        {
            let map = self.histograms.read().unwrap_or_else(PoisonError::into_inner);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                let h = &map[name];
                let _ = writeln!(out, "# TYPE {name} histogram");
                let mut cumulative = 0u64;
                for (boundary, count) in h.buckets.iter().zip(&h.counts) {
                    cumulative += count.load(Ordering::Relaxed);
                    let _ = writeln!(out, "{name}_bucket{{le=\"{boundary}\"}} {cumulative}");
                }
                let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", h.count());
                let _ = writeln!(out, "{name}_sum {}", h.sum());
                let _ = writeln!(out, "{name}_count {}", h.count());
            }
        }

        out
    }

    /// Same data as a JSON object, keyed by series.
    pub fn render_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<String, serde_json::Value> = {
            let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            map.iter()
                .map(|((name, labels), v)| {
                    (
                        format!("{name}{}", labels.prometheus_str()),
                        serde_json::json!(v.load(Ordering::Relaxed)),
                    )
                })
                .collect()
        };
        let gauges: serde_json::Map<String, serde_json::Value> = {
            let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            map.iter()
                .map(|(name, v)| (name.clone(), serde_json::json!(v.load(Ordering::Relaxed))))
                .collect()
        };
        let histograms: serde_json::Map<String, serde_json::Value> = {
            let map = self.histograms.read().unwrap_or_else(PoisonError::into_inner);
            map.iter()
                .map(|(name, h)| {
                    (
                        name.clone(),
                        serde_json::json!({ "count": h.count(), "sum": h.sum() }),
                    )
                })
                .collect()
        };

        serde_json::json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

/// Process-wide collector shared by the gateway and the tracker loop.
pub fn global_metrics() -> &'static MetricsCollector {
    static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
    INSTANCE.get_or_init(MetricsCollector::new)
}
