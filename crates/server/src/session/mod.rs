pub mod connection_session;
pub mod transport;
