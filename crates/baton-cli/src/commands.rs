pub mod run;
pub mod workflows;
