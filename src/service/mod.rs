//! CrudService: generic CRUD over any storage backend. RequestValidator: payload rules.

mod crud;
mod validation;
pub use crud::CrudService;
pub use validation::RequestValidator;
