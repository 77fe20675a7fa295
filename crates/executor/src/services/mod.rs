pub mod execution_service;

pub use execution_service::ExecutionService;
