//! Test support: mock transports for exercising the pipeline without a
//! running broker.

pub mod mocks;
