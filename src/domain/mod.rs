pub mod ports;
pub mod request;
