pub mod config;
pub mod console;
pub mod curtain;
pub mod gpio;
pub mod motor;
