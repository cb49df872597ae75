//! acarshub - ACARS/VDL-M2/HFDL/Inmarsat/Iridium datalink message ingestion,
//! enrichment, persistence, alerting, time-series aggregation and real-time
//! delivery.

pub mod alert_engine;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod events;
pub mod formatters;
pub mod ingest;
pub mod instance_lock;
pub mod listeners;
pub mod log_format;
pub mod metrics;
pub mod queue;
pub mod reference;
pub mod scheduler;
pub mod startup;
pub mod timeseries;
pub mod web;
