pub mod repair;
pub mod run;
pub mod status;
