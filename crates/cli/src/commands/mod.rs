pub mod gate;
pub mod init;
pub mod queue;
pub mod run;
pub mod scan;
pub mod status;
pub mod stop;
pub mod truncate;
