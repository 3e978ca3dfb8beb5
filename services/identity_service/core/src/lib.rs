//! Pure domain for the identity/authorization/agent-memory control plane:
//! entities (§3), repository traits (C1), service-capability traits
//! (C3-C10), the policy rule evaluator (C5), and the HTTP DTOs shared by
//! `api` handlers. Nothing here performs I/O — that's `infra`'s job.

pub mod dto;
pub mod model;
pub mod policy_eval;
pub mod repository;
pub mod service;
