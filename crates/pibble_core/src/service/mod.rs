//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into transactional use-cases.
//! - Own transaction boundaries; repositories never begin transactions.

pub mod completion_service;
pub mod deadline_service;
pub mod poller;
