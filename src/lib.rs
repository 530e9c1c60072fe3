//! Declaration/payment reconciliation and recovery core
//!
//! Keeps driver trip declarations, cashier payment receipts and the
//! derived recovery status consistent despite being loosely-linked
//! documents updated concurrently by different roles, with no enforced
//! foreign key between the two collections.

pub mod actor;
pub mod declaration;
pub mod error;
pub mod matcher;
pub mod payment;
pub mod recovery;
pub mod resolver;
pub mod service;
pub mod status;
pub mod store;
pub mod trace;
