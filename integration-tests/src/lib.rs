//! End-to-end scenarios wiring `orchestrator-db` and `orchestrator-runtime`
//! together against a real SQLite store (§8). No library surface of its
//! own — everything lives under `tests/`; this crate's only job is running
//! scenarios no single crate's unit tests can see across.
