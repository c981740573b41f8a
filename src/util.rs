pub mod checksum;
pub mod directory_lock;
pub mod http_transport;
