//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (job creation, terminal outcomes)
//! - Pipeline (per-stage duration)
//! - Ledger (credits reserved and refunded)
//! - Rate limiting and webhook delivery

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Jobs accepted total.
pub static JOBS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("gateway_jobs_created_total", "Total jobs accepted").unwrap()
});

/// Jobs reaching a terminal state, by status.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_job_outcomes_total", "Total jobs by terminal status"),
        &["status"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "gateway_stage_duration_seconds",
            "Duration of pipeline stage calls",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["stage", "result"], // result: "success", "failed", "timeout"
    )
    .unwrap()
});

// =============================================================================
// Ledger Metrics
// =============================================================================

/// Credits reserved total.
pub static CREDITS_RESERVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("gateway_credits_reserved_total", "Total credits reserved").unwrap()
});

/// Credits refunded total.
pub static CREDITS_REFUNDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("gateway_credits_refunded_total", "Total credits refunded").unwrap()
});

// =============================================================================
// Rate Limit and Webhook Metrics
// =============================================================================

/// Requests rejected by the rate limiter.
pub static RATE_LIMIT_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "gateway_rate_limit_rejections_total",
        "Total requests rejected by the rate limiter",
    )
    .unwrap()
});

/// Webhook delivery attempts by result.
pub static WEBHOOK_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_webhook_deliveries_total",
            "Total webhook delivery attempts",
        ),
        &["result"], // "delivered", "rejected", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOB_OUTCOMES.clone()),
        // Pipeline
        Box::new(STAGE_DURATION.clone()),
        // Ledger
        Box::new(CREDITS_RESERVED.clone()),
        Box::new(CREDITS_REFUNDED.clone()),
        // Rate limit / webhooks
        Box::new(RATE_LIMIT_REJECTIONS.clone()),
        Box::new(WEBHOOK_DELIVERIES.clone()),
    ]
}
