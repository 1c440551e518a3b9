//! # news-harvest
//!
//! A checkpointed, resumable news collection pipeline for ranked entity
//! catalogs.
//!
//! Collection runs in two stages, each an instance of the same pipeline:
//! the **links** stage searches news for every entity in the catalog and
//! collects candidate article URLs; the **content** stage fetches each URL
//! and extracts the article text. Every completed item is committed to a
//! SQLite checkpoint store before the run moves on, so a multi-hour job can
//! be killed and restarted at any point and only re-does unfinished work.
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Catalog │──▶│  Driver  │──▶│  Adapter  │──▶│ SQLite   │
//! │ (JSONL) │   │ skip done│   │ RSS/HTML  │   │ ckpt db  │
//! └─────────┘   └────┬─────┘   └───────────┘   └────┬─────┘
//!                    │  retry supervisor            │
//!                    ▼                              ▼
//!               ┌─────────┐                   ┌──────────┐
//!               │  CLI    │                   │ artifact │
//!               │ (nhv)   │                   │ json/bin │
//!               └─────────┘                   │ /csv     │
//!                                             └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`catalog`] | Work catalog loaders |
//! | [`checkpoint`] | Durable checkpoint store |
//! | [`fetch`] | Fetch adapters (news search, article extraction) |
//! | [`pipeline`] | Item processor and run driver |
//! | [`retry`] | Outer retry supervisor |
//! | [`export`] | Output finalizer (json / binary / columnar) |
//! | [`progress`] | Progress reporting on stderr |
//! | [`stats`] | Checkpoint status summary |
//! | [`db`] | Database connection |
//! | [`error`] | Error taxonomy |

pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod stats;

pub use error::{Error, FetchError, Result};
pub use models::{Aggregate, ItemResult, Stage, WorkItem};
