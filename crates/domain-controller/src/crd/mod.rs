pub mod domain;

pub use domain::{Domain, DomainCondition, DomainCrd, DomainStatus, ReclaimPolicy};
