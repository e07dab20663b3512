//! trivia-oracle - match-or-learn answer engine for trivia rounds
//!
//! Watches structured question messages from a trivia source, fingerprints
//! any attached image, looks the fingerprint (or a country name) up in a
//! local knowledge base and answers after a human-like delay. When nothing
//! matches it waits for the "No one got it right!" disclosure and records
//! the revealed answer for next time.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use trivia_oracle::{Config, Fingerprinter, Oracle, StdioGateway};
//!
//! let config = Config::load(&Config::resolve_path(None))?;
//! let fingerprinter = Fingerprinter::http(config.fetch_timeout())?;
//! let (events, receiver) = tokio::sync::broadcast::channel(256);
//! let oracle = Oracle::new(config, fingerprinter, Arc::new(StdioGateway::stdout()), events.clone());
//!
//! oracle.run(receiver, shutdown).await;
//! ```
//!
//! # Architecture
//!
//! ```text
//! chat event ──► classifier ──► resolver ──► knowledge store
//!                                  │  hit            ▲
//!                                  ▼                 │ commit
//!                           reply scheduler    learning window
//!                                                    ▲
//!                          disclosure event ─────────┘
//! ```

pub mod classifier;
pub mod config;
pub mod disclosure;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod learning;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::{Config, DelayRange};
pub use engine::{Oracle, RoundReport};
pub use error::{OracleError, OracleResult};
pub use fingerprint::{fingerprint_bytes, Fingerprinter, HttpImageFetcher, ImageFetcher};
pub use gateway::{pump_events, LineGateway, Outbound, StdioGateway};
pub use learning::{LearningOutcome, LearningSubscriber, PendingFact};
pub use resolver::{AnswerResolver, Resolution};
pub use scheduler::{ChatGateway, ReplyScheduler};
pub use store::{KnowledgeStore, KnowledgeTable};
pub use types::*;
