pub mod estimate;
pub mod init;
pub mod simulate;
pub mod step;
pub mod validate;
