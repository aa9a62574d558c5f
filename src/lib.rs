//! Root crate for the APEX orchestration kernel workspace.
//!
//! This crate carries no library code of its own — it exists to hold
//! workspace-level dev-dependencies and the end-to-end scenario tests
//! under `tests/`. All functionality lives in the `apex-*` member
//! crates; see `SPEC_FULL.md` for the module-to-crate mapping.
