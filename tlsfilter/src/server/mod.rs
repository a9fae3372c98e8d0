pub(crate) mod hs;
mod server_conn;

pub use server_conn::ServerConfig;
