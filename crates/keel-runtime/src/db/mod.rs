mod connection;

pub use connection::SqlxConnection;
