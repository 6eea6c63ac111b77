//! Live state aggregation and derived views for the Citywatch dashboard.
//!
//! Channel updates flow through one queue into the engine, which merges
//! them into the snapshot store and recomputes every derived view once per
//! batch. Predictions are cached separately and only change on refresh.
//!
//! # Modules
//!
//! - [`channel`] -- [`ChannelAdapter`] contract and the in-process
//!   [`LocalChannelAdapter`].
//! - [`config`] -- Configuration loading from `citywatch-config.yaml` into
//!   strongly-typed structs.
//! - [`derive`] -- Pure derivations from a snapshot (stats, alerts, map
//!   markers, traffic trend, overview, chart series, gauges).
//! - [`engine`] -- The single-queue [`Engine`] loop and the [`Dashboard`]
//!   read handle.
//! - [`prediction`] -- [`PredictionCache`], the [`PredictionSource`] trait,
//!   and the HTTP source.
//! - [`store`] -- [`SnapshotStore`]: latest value per channel.
//! - [`validate`] -- Payload range checks.
//!
//! [`ChannelAdapter`]: channel::ChannelAdapter
//! [`LocalChannelAdapter`]: channel::LocalChannelAdapter
//! [`Engine`]: engine::Engine
//! [`Dashboard`]: engine::Dashboard
//! [`PredictionCache`]: prediction::PredictionCache
//! [`PredictionSource`]: prediction::PredictionSource
//! [`SnapshotStore`]: store::SnapshotStore

pub mod channel;
pub mod config;
pub mod derive;
pub mod engine;
pub mod prediction;
pub mod store;
pub mod validate;
