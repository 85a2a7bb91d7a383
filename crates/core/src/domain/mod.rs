pub mod image;
pub mod submission;
