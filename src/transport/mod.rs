pub mod acl;
pub mod errors;
pub mod types;
