pub mod skills;
pub mod vacancy;
