//! jobscout - autonomous job search
//!
//! Turns a resume and job preferences into a ranked list of matching
//! postings: builds a candidate profile, plans search queries, drives an
//! external search surface page by page, deduplicates what it finds, and
//! scores each listing's fit. A checkpointed state machine sequences the
//! steps and decides when to stop.

pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod extract;
pub mod id;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod profile;
pub mod scoring;
pub mod storage;

pub use error::{Result, ScoutError};
