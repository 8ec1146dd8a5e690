// Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use llm_core::GenerationOutcome;
use serde::Serialize;

/// Latency samples kept for percentiles
const MAX_SAMPLES: usize = 1000;

/// Per-endpoint metrics
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    request_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    min_latency_ms: Arc<AtomicU64>,
    max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_SAMPLES))),
        }
    }

    pub fn record_request(&self, latency: Duration) {
        let latency_ms = latency.as_millis() as u64;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == MAX_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count();
        if count == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count(),
            error_count: self.error_count(),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Story generation and speech synthesis counters
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    generations: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
    timed_out: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    total_generation_ms: Arc<AtomicU64>,
    story_chars: Arc<AtomicU64>,
    syntheses: Arc<AtomicU64>,
    synthesis_failures: Arc<AtomicU64>,
    skipped_syntheses: Arc<AtomicU64>,
    total_synthesis_ms: Arc<AtomicU64>,
    audio_bytes: Arc<AtomicU64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_generation(&self, outcome: &GenerationOutcome, elapsed: Duration) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        self.total_generation_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        let counter = match outcome {
            GenerationOutcome::Completed(_) => &self.completed,
            GenerationOutcome::TimedOut(_) => &self.timed_out,
            GenerationOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.story_chars
            .fetch_add(outcome.text().chars().count() as u64, Ordering::Relaxed);
    }

    pub fn record_synthesis(&self, elapsed: Duration, audio_bytes: u64) {
        self.syntheses.fetch_add(1, Ordering::Relaxed);
        self.total_synthesis_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.audio_bytes.fetch_add(audio_bytes, Ordering::Relaxed);
    }

    pub fn record_synthesis_failure(&self) {
        self.synthesis_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_synthesis(&self) {
        self.skipped_syntheses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let average = |total: &AtomicU64, count: u64| {
            if count == 0 {
                0.0
            } else {
                load(total) as f64 / count as f64
            }
        };
        let generations = load(&self.generations);
        let syntheses = load(&self.syntheses);
        PipelineStats {
            generations,
            completed: load(&self.completed),
            timed_out: load(&self.timed_out),
            failed: load(&self.failed),
            avg_generation_ms: average(&self.total_generation_ms, generations),
            story_chars: load(&self.story_chars),
            syntheses,
            synthesis_failures: load(&self.synthesis_failures),
            skipped_syntheses: load(&self.skipped_syntheses),
            avg_synthesis_ms: average(&self.total_synthesis_ms, syntheses),
            audio_bytes: load(&self.audio_bytes),
        }
    }
}

/// Everything the server tracks
#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub story: EndpointMetrics,
    pub pipeline: PipelineMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub story: EndpointStats,
    pub pipeline: PipelineStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PipelineStats {
    pub generations: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub avg_generation_ms: f64,
    pub story_chars: u64,
    pub syntheses: u64,
    pub synthesis_failures: u64,
    pub skipped_syntheses: u64,
    pub avg_synthesis_ms: f64,
    pub audio_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_stats() {
        let metrics = EndpointMetrics::new();
        assert_eq!(metrics.stats().min_latency_ms, 0);

        for ms in [30, 10, 20] {
            metrics.record_request(Duration::from_millis(ms));
        }
        metrics.record_error();

        let stats = metrics.stats();
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.min_latency_ms, 10);
        assert_eq!(stats.max_latency_ms, 30);
        assert_eq!(stats.p50_latency_ms, 20);
        assert!((stats.avg_latency_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_samples_are_bounded() {
        let metrics = EndpointMetrics::new();
        for ms in 0..(MAX_SAMPLES as u64 + 10) {
            metrics.record_request(Duration::from_millis(ms));
        }
        assert_eq!(metrics.latency_samples.lock().unwrap().len(), MAX_SAMPLES);
        assert_eq!(metrics.stats().min_latency_ms, 0);
    }

    #[test]
    fn test_pipeline_stats() {
        let metrics = PipelineMetrics::new();
        metrics.record_generation(
            &GenerationOutcome::Completed("Once".to_string()),
            Duration::from_millis(100),
        );
        metrics.record_generation(
            &GenerationOutcome::TimedOut("Once more".to_string()),
            Duration::from_millis(300),
        );
        metrics.record_synthesis(Duration::from_millis(50), 417);
        metrics.record_skipped_synthesis();

        let stats = metrics.stats();
        assert_eq!(stats.generations, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.story_chars, 13);
        assert!((stats.avg_generation_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(stats.syntheses, 1);
        assert_eq!(stats.skipped_syntheses, 1);
        assert_eq!(stats.audio_bytes, 417);
    }
}
