//! Integration test suite for the Sats wallet engine.
//!
//! End-to-end flows (derive, build, sign, submit, sync) and synchronizer
//! reconciliation run against the scripted provider in [`helpers`].

pub mod helpers;
