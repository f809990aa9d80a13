//! # notesort
//!
//! Turns an unstructured pile of free-text notes into a normalized,
//! category-indexed knowledge base.
//!
//! A classifier (Gemini, OpenAI or Ollama) does the semantic work; this crate
//! owns identity, record shapes, taxonomy normalization and the final join,
//! and keeps those consistent across stages that are run and re-run
//! independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐
//! │ ingest  │──▶│ extract  │──▶│ normalize │──▶│  index  │
//! │ inbox→  │   │ per note │   │ one call  │   │  join   │
//! └────┬────┘   └────┬─────┘   └─────┬─────┘   └────┬────┘
//!      ▼             ▼               ▼              ▼
//!  notes.json  extractions.json  taxonomy.json  index.json
//! ```
//!
//! Every snapshot is replaced wholesale on a successful run.
//!
//! ## Quick Start
//!
//! ```bash
//! notesort ingest          # capture notes from the inbox
//! notesort extract         # classify each note
//! notesort normalize       # consolidate labels into a taxonomy
//! notesort index           # build the category index
//! notesort show "Books to Read"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Note, extraction and index records |
//! | [`taxonomy`] | Canonical mapping, inversion, coverage |
//! | [`intake`] | Inbox scanning and relocation |
//! | [`ingest`] | Note Store stage |
//! | [`classifier`] | Classification backends |
//! | [`extraction`] | Extraction stage |
//! | [`normalize`] | Taxonomy Normalizer stage |
//! | [`index`] | Category Indexer stage |
//! | [`audit`] | Cross-snapshot consistency checks |
//! | [`snapshot`] | Atomic JSON snapshots |

pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extraction;
pub mod index;
pub mod ingest;
pub mod intake;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod show;
pub mod snapshot;
pub mod status;
pub mod taxonomy;
