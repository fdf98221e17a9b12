//! CrudService: queries and mutations over a `Database`, with request validation.

mod crud;
mod validation;
pub use crud::CrudService;
pub use validation::RequestValidator;
