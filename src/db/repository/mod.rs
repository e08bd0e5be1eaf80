pub mod document;
pub mod explanation;
pub mod instance;
pub mod organization;
pub mod patient;
pub mod variant;
