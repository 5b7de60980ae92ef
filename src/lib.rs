//! Integration test package for the feedflow workspace. The tests live in
//! `tests/`; this library target is intentionally empty.
