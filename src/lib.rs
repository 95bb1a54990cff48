//! # Triage Engine
//!
//! Knowledge retrieval and exception-driven remediation synthesis for
//! incident support: index free-text documents and source files for
//! semantic and lexical retrieval, parse stack traces into structured
//! exception facts, and synthesize ranked, source-attributed fix actions
//! through a chain of language-model providers with a deterministic
//! fallback.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`models`] | Core data types: documents, chunks, matches, facts, actions |
//! | [`config`] | TOML configuration with validated defaults |
//! | [`error`] | Classified provider and sync failures |
//! | [`store`] | Storage abstraction, SQLite and in-memory backends |
//! | [`chunk`] | Line-tracked document chunking |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`lexical`] | Keyword/title/type fallback ranker |
//! | [`search`] | RAG composer: similarity search with lexical fallback |
//! | [`ingest`] | Document create/update/delete with best-effort indexing |
//! | [`extract`] | Exception fact extraction from log text |
//! | [`remediate`] | Template fix synthesis from facts and code context |
//! | [`llm`] | Language-model providers, prompt, and response parsing |
//! | [`orchestrator`] | Provider fallback chain and deterministic analysis |
//! | [`repo_sync`] | Repository content sync via a contents API |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod lexical;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod remediate;
pub mod repo_sync;
pub mod search;
pub mod store;
