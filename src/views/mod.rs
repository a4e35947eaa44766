pub mod escape;
pub mod page;
pub mod results;
