//! Test-only crate: integration and property tests live under `tests/`.
