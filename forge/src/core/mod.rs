//! Pure, deterministic logic: problem specification and file set handling.
//! No I/O; fully testable in isolation.

pub mod fileset;
pub mod spec;
