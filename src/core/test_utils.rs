//! Test utilities for arena-based scan sessions.
