pub mod validation;

pub use validation::InputValidator;
