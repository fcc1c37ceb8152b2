#![deny(clippy::unwrap_used)]

//! Automated course turnin through a gateway and a lab workstation.
//!
//! See [`turnin`] for the phases and [`turnin::SubmissionController`] for the
//! entry point a UI calls.

pub mod turnin;
