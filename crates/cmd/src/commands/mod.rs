pub mod cohort;
pub mod extract;
pub mod init;
pub mod materialize;
pub mod status;
