pub mod interactive;
pub mod serve;
