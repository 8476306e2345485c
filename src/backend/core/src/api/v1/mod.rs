//! V1 API for Conveyor Core.

pub mod jobs;
pub mod routes;
