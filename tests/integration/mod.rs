//! End-to-end tests of the patch engine against archives on disk.

mod backup_restore;
mod engine_flow;
mod failure_modes;
mod fixtures;
