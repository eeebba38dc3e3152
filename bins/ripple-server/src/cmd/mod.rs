pub mod connection;
pub mod emit;
pub mod serve;
