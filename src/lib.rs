//! # CI Repo Map
//!
//! Discovers which repositories of a GitHub organization belong to which
//! CI (configuration item) numbers, and reports the change and incident
//! tickets tagged against those repositories over a date window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Code search │──▶│  Raw map    │──▶│ Consolidated │──▶ publish
//! │ repo.meta   │   │ CI → repos  │   │ + spreadsheet│
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │ Tag report   │
//!                                     │ CHG / INC    │
//!                                     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment |
//! | [`models`] | Core data types |
//! | [`extract`] | CI token pattern |
//! | [`github`] | Code host trait and GitHub client |
//! | [`scan`] | Organization code search scan |
//! | [`merge`] | Spreadsheet consolidation |
//! | [`discover`] | Discovery and merge jobs |
//! | [`window`] | Report date window |
//! | [`report`] | Ticket report job |
//! | [`publish`] | Commit outputs to a repository |
//! | [`export`] | JSON and workbook outputs |
//! | [`workbook`] | Minimal xlsx reader/writer |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod discover;
pub mod export;
pub mod extract;
pub mod github;
pub mod logging;
pub mod merge;
pub mod models;
pub mod publish;
pub mod report;
pub mod scan;
pub mod window;
pub mod workbook;
