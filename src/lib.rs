//! sfci library crate.
//!
//! The primary interface is the `sfci` binary. The library exposes the
//! promotion workflow, pipeline steps and their supporting types so that
//! integration tests (and other tools) can drive them directly.
//!
//! # Crate layout
//!
//! - [`request`]: validated promotion input and the derived branch name.
//! - [`promote`]: [`BranchPromoter`](promote::BranchPromoter) and its state
//!   machine.
//! - [`report`]: the immutable promotion report and its on-disk artifacts.
//! - [`hosting`]: the hosting-service seam and its `gh` implementation.
//! - [`pipeline`]: Salesforce CI steps driven through the `sf` and `npm` CLIs.
//! - [`config`], [`telemetry`], [`time`]: ambient support.

pub mod config;
pub mod error;
pub mod hosting;
pub mod pipeline;
pub mod promote;
pub mod report;
pub mod request;
pub mod telemetry;
pub mod time;
